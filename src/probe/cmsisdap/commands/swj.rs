//! `SWJ_Pins` (0x10), `SWJ_Clock` (0x11), `SWJ_Sequence` (0x12).
//!
//! `SWJ_Sequence` is the one place the driver pushes raw bits onto the wire:
//! line resets, the JTAG-to-SWD switch sequence, and the ADIv6 dormant-state
//! activation sequence are all just specific bit patterns sent through here.

use super::{Category, CmsisDapError, Request, Response};

bitfield::bitfield! {
    /// GPIO-style pins exposed by `SWJ_Pins`.
    #[derive(Copy, Clone)]
    pub struct Pins(u8);
    impl Debug;
    pub nreset, set_nreset: 7;
    pub ntrst, set_ntrst: 5;
    pub tdo, set_tdo: 3;
    pub tdi, set_tdi: 2;
    pub swdio_tms, set_swdio_tms: 1;
    pub swclk_tck, set_swclk_tck: 0;
}

impl Pins {
    pub fn none() -> Self {
        Pins(0)
    }
}

/// `DAP_SWJ_Pins`: directly drive or sample the probe's JTAG/SWD pins, used
/// here only for toggling `nRESET` for a hardware reset.
pub struct PinsRequest {
    pub output: Pins,
    pub select: Pins,
    pub wait_us: u32,
}

impl Request for PinsRequest {
    const CATEGORY: Category = Category(0x10);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        buffer[offset] = self.output.0;
        buffer[offset + 1] = self.select.0;
        buffer[offset + 2..offset + 6].copy_from_slice(&self.wait_us.to_le_bytes());
        Ok(6)
    }
}

pub struct PinsResponse(pub Pins);

impl Response for PinsResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        Ok(PinsResponse(Pins(
            *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)?,
        )))
    }
}

/// `DAP_SWJ_Clock`: requested SWCLK frequency in Hz. The probe clamps to
/// whatever it can actually drive.
pub struct ClockRequest(pub u32);

impl Request for ClockRequest {
    const CATEGORY: Category = Category(0x11);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        buffer[offset..offset + 4].copy_from_slice(&self.0.to_le_bytes());
        Ok(4)
    }
}

pub struct ClockResponse;

impl Response for ClockResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        match *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)? {
            0x00 => Ok(ClockResponse),
            _ => Err(CmsisDapError::ErrorResponse("DAP_SWJ_Clock")),
        }
    }
}

/// `DAP_SWJ_Sequence`: clock out `bit_count` bits of `data`, LSB first
/// within each byte, MOSI on SWDIO.
///
/// The wire encodes a count of 256 as `0x00`; `bit_count` must be in
/// `1..=256`.
pub struct SequenceRequest<'a> {
    pub bit_count: u16,
    pub data: &'a [u8],
}

impl Request for SequenceRequest<'_> {
    const CATEGORY: Category = Category(0x12);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        if self.bit_count == 0 || self.bit_count > 256 {
            return Err(CmsisDapError::TooMuchData);
        }
        let byte_count = self.data.len();
        buffer[offset] = if self.bit_count == 256 {
            0
        } else {
            self.bit_count as u8
        };
        buffer[offset + 1..offset + 1 + byte_count].copy_from_slice(self.data);
        Ok(1 + byte_count)
    }
}

pub struct SequenceResponse;

impl Response for SequenceResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        match *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)? {
            0x00 => Ok(SequenceResponse),
            _ => Err(CmsisDapError::ErrorResponse("DAP_SWJ_Sequence")),
        }
    }
}
