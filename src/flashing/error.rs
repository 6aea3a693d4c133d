use crate::architecture::arm::ArmError;

/// Errors from ELF parsing, algorithm invocation, and flash orchestration.
#[derive(thiserror::Error, Debug)]
pub enum FlashError {
    #[error(transparent)]
    Arm(#[from] ArmError),

    #[error("flash loader image is not a valid ELF container")]
    BadFlm(#[source] goblin::error::Error),

    #[error("flash loader image is missing required symbol `{0}`")]
    MissingSymbol(&'static str),

    #[error("flash loader image section layout does not match the expected PrgCode/PrgData/PrgData(ZI) order")]
    BadSectionLayout,

    #[error("flash loader image has no PT_LOAD segment covering the FlashDevice symbol")]
    FlashDeviceNotLoaded,

    #[error("the device pack has no RAM region (no region start address has bit 0x2000_0000 set)")]
    NoRamRegion,

    #[error("algorithm image plus program buffers do not fit the target RAM region ({needed} bytes needed, {available} available)")]
    AlgorithmDoesNotFit { needed: u32, available: u32 },

    #[error("flash algorithm routine `{name}` returned error code {code:#x}")]
    AlgorithmFailed { name: &'static str, code: u32 },

    #[error("flash algorithm routine `{name}` did not halt within its timeout")]
    AlgorithmTimeout { name: &'static str },

    #[error("readback verification failed at address {address:#010x}: expected fingerprint {expected:#010x}, got {actual:#010x}")]
    VerifyMismatch {
        address: u32,
        expected: u32,
        actual: u32,
    },

    #[error("requested range {start:#010x}..{end:#010x} extends past the flash device bounds {device_start:#010x}..{device_end:#010x}")]
    RangeOutOfDevice {
        start: u32,
        end: u32,
        device_start: u32,
        device_end: u32,
    },

    #[error("the flash region is not erased and the erase policy is `none`")]
    NotErased,

    #[error("the flash algorithm does not support whole-chip erase")]
    ChipEraseNotSupported,

    #[error("operation cancelled")]
    Cancelled,
}
