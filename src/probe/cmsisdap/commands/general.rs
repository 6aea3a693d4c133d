//! `Info` (0x00), `HostStatus` (0x01), `Connect` (0x02), `Disconnect` (0x03).

use super::{Category, CmsisDapError, Request, Response, Status};

/// `DAP_Info` sub-command IDs this driver cares about.
#[derive(Copy, Clone, Debug)]
#[repr(u8)]
enum InfoId {
    FirmwareVersion = 0x04,
    Capabilities = 0xF0,
    PacketCount = 0xFE,
    PacketSize = 0xFF,
}

struct InfoRequest(InfoId);

impl Request for InfoRequest {
    const CATEGORY: Category = Category(0x00);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        buffer[offset] = self.0 as u8;
        Ok(1)
    }
}

struct InfoResponse(Vec<u8>);

impl Response for InfoResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        let len = *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)? as usize;
        let data = buffer
            .get(offset + 1..offset + 1 + len)
            .ok_or(CmsisDapError::NotEnoughData)?;
        Ok(InfoResponse(data.to_vec()))
    }
}

/// Decoded `DAP_Info(Capabilities)` byte, per spec §3.
#[derive(Copy, Clone, Debug, Default)]
pub struct Capabilities {
    pub swd: bool,
    pub jtag: bool,
    pub swo_uart: bool,
    pub swo_manchester: bool,
    pub atomic_commands: bool,
    pub test_domain_timer: bool,
    pub swo_streaming_trace: bool,
}

impl From<u8> for Capabilities {
    fn from(byte: u8) -> Self {
        Capabilities {
            swd: byte & 0x01 != 0,
            jtag: byte & 0x02 != 0,
            swo_uart: byte & 0x04 != 0,
            swo_manchester: byte & 0x08 != 0,
            atomic_commands: byte & 0x10 != 0,
            test_domain_timer: byte & 0x20 != 0,
            swo_streaming_trace: byte & 0x40 != 0,
        }
    }
}

/// Fetch the probe's firmware version string.
pub fn firmware_version(
    device: &mut super::super::device::CmsisDapDevice,
) -> Result<String, crate::probe::DebugProbeError> {
    let resp: InfoResponse =
        super::send_command(device, &InfoRequest(InfoId::FirmwareVersion))?;
    Ok(String::from_utf8_lossy(&resp.0).trim_end_matches('\0').to_string())
}

/// Fetch the probe's capability byte (spec §3: probe session capabilities).
pub fn capabilities(
    device: &mut super::super::device::CmsisDapDevice,
) -> Result<Capabilities, crate::probe::DebugProbeError> {
    let resp: InfoResponse = super::send_command(device, &InfoRequest(InfoId::Capabilities))?;
    let byte = *resp.0.first().ok_or(CmsisDapError::NotEnoughData)?;
    Ok(Capabilities::from(byte))
}

/// Fetch the maximum number of packets the probe can have outstanding,
/// which bounds pipelining depth for block transfers (spec §4.4).
pub fn packet_count(
    device: &mut super::super::device::CmsisDapDevice,
) -> Result<u8, crate::probe::DebugProbeError> {
    let resp: InfoResponse = super::send_command(device, &InfoRequest(InfoId::PacketCount))?;
    Ok(*resp.0.first().ok_or(CmsisDapError::NotEnoughData)?)
}

/// Fetch the maximum packet size in bytes.
pub fn packet_size(
    device: &mut super::super::device::CmsisDapDevice,
) -> Result<u16, crate::probe::DebugProbeError> {
    let resp: InfoResponse = super::send_command(device, &InfoRequest(InfoId::PacketSize))?;
    let bytes: [u8; 2] = resp
        .0
        .get(0..2)
        .ok_or(CmsisDapError::NotEnoughData)?
        .try_into()
        .map_err(|_| CmsisDapError::NotEnoughData)?;
    Ok(u16::from_le_bytes(bytes))
}

/// `DAP_HostStatus` (0x01): LED/session signalling, no functional effect.
pub struct HostStatusRequest {
    kind: u8,
    state: u8,
}

impl HostStatusRequest {
    pub fn connected(connected: bool) -> Self {
        HostStatusRequest {
            kind: 0,
            state: connected as u8,
        }
    }

    pub fn running(running: bool) -> Self {
        HostStatusRequest {
            kind: 1,
            state: running as u8,
        }
    }
}

impl Request for HostStatusRequest {
    const CATEGORY: Category = Category(0x01);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        buffer[offset] = self.kind;
        buffer[offset + 1] = self.state;
        Ok(2)
    }
}

pub struct HostStatusResponse(pub Status);

impl Response for HostStatusResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        Ok(HostStatusResponse(Status::from_byte(
            *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)?,
        )?))
    }
}

/// `DAP_Connect` (0x02): selects the wire protocol the probe drives.
#[derive(Copy, Clone, Debug)]
pub enum ConnectRequest {
    DefaultPort,
    Swd,
    Jtag,
}

impl Request for ConnectRequest {
    const CATEGORY: Category = Category(0x02);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        buffer[offset] = match self {
            ConnectRequest::DefaultPort => 0,
            ConnectRequest::Swd => 1,
            ConnectRequest::Jtag => 2,
        };
        Ok(1)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectResponse {
    SuccessfulInitForSwd,
    SuccessfulInitForJtag,
    InitFailed,
}

impl Response for ConnectResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        match *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)? {
            1 => Ok(ConnectResponse::SuccessfulInitForSwd),
            2 => Ok(ConnectResponse::SuccessfulInitForJtag),
            _ => Ok(ConnectResponse::InitFailed),
        }
    }
}

/// `DAP_Disconnect` (0x03).
pub struct DisconnectRequest;

impl Request for DisconnectRequest {
    const CATEGORY: Category = Category(0x03);

    fn to_bytes(&self, _buffer: &mut [u8], _offset: usize) -> Result<usize, CmsisDapError> {
        Ok(0)
    }
}

pub struct DisconnectResponse(pub Status);

impl Response for DisconnectResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        Ok(DisconnectResponse(Status::from_byte(
            *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)?,
        )?))
    }
}
