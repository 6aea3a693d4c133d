//! Target debug architectures. Only ARM ADIv5/ADIv6 + Cortex-M is implemented.

pub mod arm;
