//! Framed request/response transport over a bidirectional USB endpoint pair.
//!
//! Two probe classes are supported: CMSIS-DAP v1, which rides on a HID
//! report pipe and must always move exactly one max-packet-sized frame per
//! direction, and CMSIS-DAP v2, which rides on a vendor/WinUSB bulk pipe
//! where the USB transfer length is authoritative.

use std::time::Duration;

use crate::probe::DebugProbeError;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

/// An opened CMSIS-DAP probe transport.
pub enum CmsisDapDevice {
    /// CMSIS-DAP v1 over HID. `report_size` is the negotiated HID report
    /// size, i.e. the exact length every OUT transfer must be.
    #[cfg(feature = "cmsisdap_v1")]
    V1 {
        handle: hidapi::HidDevice,
        report_size: usize,
    },

    /// CMSIS-DAP v2 over WinUSB/bulk. Frames are transmitted verbatim.
    V2 {
        handle: rusb::DeviceHandle<rusb::Context>,
        out_ep: u8,
        in_ep: u8,
        max_packet_size: usize,
    },
}

impl CmsisDapDevice {
    /// The size every OUT frame must be padded to (HID) or simply the
    /// maximum useful frame size (bulk).
    pub fn max_packet_size(&self) -> usize {
        match self {
            #[cfg(feature = "cmsisdap_v1")]
            CmsisDapDevice::V1 { report_size, .. } => *report_size,
            CmsisDapDevice::V2 {
                max_packet_size, ..
            } => *max_packet_size,
        }
    }

    /// Write `frame` to the probe, applying the HID zero-padding discipline
    /// for v1 devices. Returns the number of significant bytes accepted.
    pub fn write(&self, frame: &[u8]) -> Result<usize, DebugProbeError> {
        match self {
            #[cfg(feature = "cmsisdap_v1")]
            CmsisDapDevice::V1 { handle, report_size } => {
                if frame.len() > *report_size {
                    return Err(DebugProbeError::TransportIo(format!(
                        "frame of {} bytes exceeds HID report size {}",
                        frame.len(),
                        report_size
                    )));
                }
                // HID OUT transfers must always be exactly one full report.
                // Byte 0 is the HID report ID, left at zero.
                let mut padded = vec![0u8; report_size + 1];
                padded[1..1 + frame.len()].copy_from_slice(frame);
                let n = handle
                    .write(&padded)
                    .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;
                if n == 0 {
                    return Err(DebugProbeError::TransportIo(
                        "HID write accepted zero bytes".into(),
                    ));
                }
                Ok(frame.len())
            }
            CmsisDapDevice::V2 {
                handle, out_ep, ..
            } => {
                let n = handle
                    .write_bulk(*out_ep, frame, DEFAULT_TIMEOUT)
                    .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;
                if n == 0 {
                    return Err(DebugProbeError::TransportIo(
                        "bulk OUT transfer wrote zero bytes".into(),
                    ));
                }
                Ok(n)
            }
        }
    }

    /// Read a response frame into `buf`, returning the logical length.
    ///
    /// For HID the logical length is unknown a priori: it is the position of
    /// the last non-zero byte plus one. For bulk transports the USB transfer
    /// length is authoritative. A read of zero bytes, or a timeout, is an
    /// error.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, DebugProbeError> {
        match self {
            #[cfg(feature = "cmsisdap_v1")]
            CmsisDapDevice::V1 { handle, .. } => {
                let n = handle
                    .read_timeout(buf, DEFAULT_TIMEOUT.as_millis() as i32)
                    .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;
                if n == 0 {
                    return Err(DebugProbeError::TransportIo(
                        "HID read timed out".into(),
                    ));
                }
                let logical_len = buf[..n]
                    .iter()
                    .rposition(|&b| b != 0)
                    .map(|p| p + 1)
                    .unwrap_or(0);
                if logical_len == 0 {
                    return Err(DebugProbeError::TransportIo(
                        "HID response was all zero bytes".into(),
                    ));
                }
                Ok(logical_len)
            }
            CmsisDapDevice::V2 { handle, in_ep, .. } => {
                let n = handle
                    .read_bulk(*in_ep, buf, DEFAULT_TIMEOUT)
                    .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;
                if n == 0 {
                    return Err(DebugProbeError::TransportIo(
                        "bulk IN transfer returned zero bytes".into(),
                    ));
                }
                Ok(n)
            }
        }
    }

    /// Discard anything left in the IN pipe from a prior session, so
    /// requests and responses don't get out of sync. Reads until a read
    /// times out or returns nothing.
    pub fn drain(&self) {
        tracing::debug!("draining probe of any pending data");
        match self {
            #[cfg(feature = "cmsisdap_v1")]
            CmsisDapDevice::V1 { handle, report_size } => {
                let mut discard = vec![0u8; report_size + 1];
                loop {
                    match handle.read_timeout(&mut discard, DRAIN_TIMEOUT.as_millis() as i32) {
                        Ok(n) if n != 0 => continue,
                        _ => break,
                    }
                }
            }
            CmsisDapDevice::V2 {
                handle,
                in_ep,
                max_packet_size,
                ..
            } => {
                let mut discard = vec![0u8; *max_packet_size];
                loop {
                    match handle.read_bulk(*in_ep, &mut discard, DRAIN_TIMEOUT) {
                        Ok(n) if n != 0 => continue,
                        _ => break,
                    }
                }
            }
        }
    }
}
