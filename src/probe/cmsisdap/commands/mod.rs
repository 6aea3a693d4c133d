//! CMSIS-DAP command encoding and dispatch (spec §4.2, wire catalog in §6.1).
//!
//! The codec is a pure function: every `Request` knows how to serialize
//! itself, every `Response` knows how to parse itself, and all session state
//! (packet size, packet count, negotiated protocol, ...) lives above this
//! module. [`send_command`] is the single place a frame crosses the wire.

pub mod general;
pub mod swd;
pub mod swj;
pub mod transfer;

use std::ops::Deref;

use crate::probe::DebugProbeError;

use super::device::CmsisDapDevice;

/// Errors specific to the CMSIS-DAP command layer.
#[derive(thiserror::Error, Debug)]
pub enum CmsisDapError {
    #[error("unexpected answer to command (expected category {expected:#04x}, got {got:#04x})")]
    UnexpectedAnswer { expected: u8, got: u8 },

    #[error("the probe responded with DAP_ERROR to {0}")]
    ErrorResponse(&'static str),

    #[error("not enough data in the probe's response")]
    NotEnoughData,

    #[error("more than 256 bits requested in a single SWJ sequence")]
    TooMuchData,
}

impl From<CmsisDapError> for DebugProbeError {
    fn from(error: CmsisDapError) -> Self {
        DebugProbeError::ProbeSpecific(Box::new(error))
    }
}

/// The one-byte status every CMSIS-DAP command responds with, after its
/// echoed command byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    DapOk,
    DapError,
}

impl Status {
    pub fn from_byte(value: u8) -> Result<Self, CmsisDapError> {
        match value {
            0x00 => Ok(Status::DapOk),
            0xFF => Ok(Status::DapError),
            _ => Err(CmsisDapError::NotEnoughData),
        }
    }
}

/// A CMSIS-DAP command byte (the first byte of every request/response).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Category(pub u8);

impl Deref for Category {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A request that can be encoded into a CMSIS-DAP frame.
pub trait Request {
    const CATEGORY: Category;

    /// Encode this request's payload (everything after the command byte)
    /// into `buffer` starting at `offset`, returning the number of bytes
    /// written.
    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError>;
}

/// A response that can be decoded from a CMSIS-DAP frame.
pub trait Response: Sized {
    /// Decode this response's payload from `buffer` starting at `offset`
    /// (`buffer[0]` is always the echoed command byte, already checked by
    /// [`send_command`]).
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError>;
}

/// Encode `request`, send it, read back the response frame, and decode it.
pub fn send_command<Req: Request, Res: Response>(
    device: &mut CmsisDapDevice,
    request: &Req,
) -> Result<Res, DebugProbeError> {
    let mut buffer = vec![0u8; device.max_packet_size()];

    buffer[0] = *Req::CATEGORY;
    let payload_len = request.to_bytes(&mut buffer, 1)?;
    let frame_len = payload_len + 1;

    device.write(&buffer[..frame_len])?;
    trace_buffer("tx", &buffer[..frame_len]);

    let n = device.read(&mut buffer)?;
    trace_buffer("rx", &buffer[..n]);

    verify_command_echo(*Req::CATEGORY, buffer[0])?;

    Ok(Res::from_bytes(&buffer[..n], 1)?)
}

/// Every response's first byte must echo the command byte that was sent;
/// a probe that answers out of order or misframes a packet shows up here
/// first.
fn verify_command_echo(expected: u8, got: u8) -> Result<(), CmsisDapError> {
    if expected == got {
        Ok(())
    } else {
        Err(CmsisDapError::UnexpectedAnswer { expected, got })
    }
}

/// Trace-log a buffer, trimming trailing zero padding so HID frames don't
/// flood the log.
fn trace_buffer(name: &str, buf: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let len = buf.len();
    let cut = buf
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    let end = len.min(cut.max(1));
    tracing::trace!("{name}: {:02x?}...", &buf[..end]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_command_byte_is_accepted() {
        assert!(verify_command_echo(0x05, 0x05).is_ok());
    }

    #[test]
    fn mismatched_command_byte_is_rejected() {
        let err = verify_command_echo(0x05, 0x02).unwrap_err();
        assert!(matches!(
            err,
            CmsisDapError::UnexpectedAnswer {
                expected: 0x05,
                got: 0x02,
            }
        ));
    }
}
