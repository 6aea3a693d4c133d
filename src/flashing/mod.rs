//! Flash programming: load a Keil FLM into target RAM and drive it through
//! halt-mode debugging to erase and program the device's non-volatile
//! memory.

mod error;
mod flash_algorithm;
mod flash_device;
mod flasher;
mod loader;
mod pdsc;
mod progress;

pub use error::FlashError;
pub use flash_algorithm::{FlashAlgorithm, RawFlashAlgorithm};
pub use flash_device::{FlashDevice, FlashRegion, MemoryType, SectorDescriptor};
pub use loader::{ErasePolicy, FlashLoader, PostProgramAction, ProgramSegment, VerifyPolicy};
pub use pdsc::{AlgorithmBinding, RamRegion};
pub use progress::{FlashProgress, ProgressEvent};
