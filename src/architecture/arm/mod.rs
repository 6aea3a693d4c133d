//! ARM ADIv5 debug architecture: the DP/AP register engine, ROM table
//! walking, and the Cortex-M halt/reset controller.

pub mod ap;
pub mod communication_interface;
pub mod core;
pub mod dp;
pub mod romtable;
pub mod sequences;

pub use communication_interface::ArmCommunicationInterface;

/// A register that lives at a fixed address within its port (DP or AP).
pub trait Register: Clone + From<u32> + Into<u32> {
    const ADDRESS: u8;
    const NAME: &'static str;
}

/// Errors from the ADIv5 transaction layer: anything above raw probe I/O.
#[derive(thiserror::Error, Debug)]
pub enum ArmError {
    #[error(transparent)]
    Probe(#[from] crate::probe::DebugProbeError),

    #[error("the DP reported a sticky error (CTRL/STAT.STICKYERR set)")]
    StickyError,

    #[error("the target did not come out of reset within the expected time")]
    ResetTimeout,

    #[error("the target did not halt within the expected time")]
    HaltTimeout,

    #[error("a core register access did not complete within the expected time")]
    RegisterTimeout,

    #[error("ROM table entry at {0:#010x} is not present")]
    RomTableEntryNotPresent(u64),

    #[error("algorithm invocation exceeded its timeout")]
    AlgorithmTimeout,
}
