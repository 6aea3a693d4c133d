//! The crate-wide error type, composing the per-layer error enums.

use crate::architecture::arm::ArmError;
use crate::flashing::FlashError;
use crate::probe::DebugProbeError;

/// The overarching error type which contains all possible errors as variants.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An error with the usage of the probe occurred (transport I/O, malformed
    /// responses, unsupported protocol).
    #[error("an error with the probe occurred")]
    Probe(#[from] DebugProbeError),

    /// An ADIv5/Cortex-M specific error occurred.
    #[error("an ARM debug architecture error occurred")]
    Arm(#[from] ArmError),

    /// A flash-loading or flash-orchestration error occurred.
    #[error("flashing failed")]
    Flash(#[from] FlashError),

    /// The long-running operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,
}
