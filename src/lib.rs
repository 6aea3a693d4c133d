//! A host-side driver for programming ARM Cortex-M microcontrollers through a
//! CMSIS-DAP debug probe over USB.
//!
//! The crate is layered, bottom to top:
//!
//! - [`probe::cmsisdap`] — the CMSIS-DAP wire protocol over an HID or
//!   WinUSB-style bulk endpoint pair.
//! - [`architecture::arm`] — the ADIv5 SWD/DP/AP transaction engine and
//!   CoreSight ROM-table discovery.
//! - [`flashing`] — the Cortex-M flash-programming engine: FLM loading,
//!   algorithm invocation, and erase/program/verify orchestration.
//!
//! Out of scope, by design: JTAG, SWO trace capture, run-control beyond
//! halt/reset, multi-core targets, and ARMv8-M security extensions.

pub mod architecture;
pub mod error;
pub mod flashing;
pub mod probe;

pub use error::Error;

/// The wire protocol negotiated with a debug probe.
///
/// Only SWD is exercised end to end by this crate; `Jtag` is accepted by the
/// probe-level connect request but nothing above the probe layer speaks it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireProtocol {
    Swd,
    Jtag,
}

impl std::fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireProtocol::Swd => write!(f, "SWD"),
            WireProtocol::Jtag => write!(f, "JTAG"),
        }
    }
}
