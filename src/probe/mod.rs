//! Probe transport and the CMSIS-DAP probe driver.

pub mod cmsisdap;

#[cfg(test)]
pub(crate) mod mock;

use crate::WireProtocol;

/// Errors that can occur at the probe / transport layer, below the ADIv5
/// transaction semantics.
#[derive(thiserror::Error, Debug)]
pub enum DebugProbeError {
    /// A USB write or read returned the wrong length, or timed out.
    #[error("transport I/O error: {0}")]
    TransportIo(String),

    /// The probe responded to a command with a status byte indicating
    /// failure, or with a command byte that didn't match the request.
    #[error("probe protocol error: {0}")]
    ProbeProtocol(String),

    /// The requested wire protocol is not implemented by this probe's
    /// capability byte.
    #[error("unsupported wire protocol: {0}")]
    UnsupportedProtocol(WireProtocol),

    /// No probe matching the given selector could be opened.
    #[error("unable to open probe: {0}")]
    UnableToOpenProbe(&'static str),

    /// A probe-specific error that doesn't fit the generic taxonomy above.
    #[error(transparent)]
    ProbeSpecific(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Describes a probe found during enumeration, before it is opened.
///
/// Immutable after enumeration; the opaque `handle` stays valid only as long
/// as the backing OS device handle has not been released.
#[derive(Debug, Clone)]
pub struct DebugProbeInfo {
    /// Human readable identification, usually the USB product string.
    pub identifier: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
}

/// Which of the two ADIv5 register spaces an access targets.
pub use cmsisdap::commands::transfer::PortKind;

/// The raw register-level operations any debug probe driver must provide.
///
/// This is the seam between the transport-specific command codec
/// ([`cmsisdap`]) and the transport-independent ADIv5 DP/AP engine in
/// [`crate::architecture::arm`].
pub trait RawDapAccess {
    /// Read a single 32-bit DP or AP register.
    fn raw_read_register(&mut self, port: PortKind, address: u8) -> Result<u32, DebugProbeError>;

    /// Write a single 32-bit DP or AP register.
    fn raw_write_register(
        &mut self,
        port: PortKind,
        address: u8,
        value: u32,
    ) -> Result<(), DebugProbeError>;

    /// Read a contiguous run of the same register (used for `DRW`-backed
    /// memory block transfers).
    fn raw_read_block(
        &mut self,
        port: PortKind,
        address: u8,
        values: &mut [u32],
    ) -> Result<(), DebugProbeError>;

    /// Write a contiguous run of the same register.
    fn raw_write_block(
        &mut self,
        port: PortKind,
        address: u8,
        values: &[u32],
    ) -> Result<(), DebugProbeError>;

    /// Request a target reset through whatever mechanism this probe exposes
    /// (CMSIS-DAP: toggling the `nRESET` pin).
    fn target_reset_assert(&mut self) -> Result<(), DebugProbeError>;
    fn target_reset_deassert(&mut self) -> Result<(), DebugProbeError>;

    /// Tear down the debug session. Called as a best-effort recovery step
    /// after a failed flash operation, and at the end of a normal session.
    fn disconnect(&mut self) -> Result<(), DebugProbeError>;
}

impl std::fmt::Display for DebugProbeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.serial_number {
            Some(sn) => write!(
                f,
                "{} (VID {:04x} PID {:04x} SN {})",
                self.identifier, self.vendor_id, self.product_id, sn
            ),
            None => write!(
                f,
                "{} (VID {:04x} PID {:04x})",
                self.identifier, self.vendor_id, self.product_id
            ),
        }
    }
}
