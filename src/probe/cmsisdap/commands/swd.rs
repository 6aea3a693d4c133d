//! `SWD_Configure` (0x13).

use super::{Category, CmsisDapError, Request, Response};

/// Turnaround clock period, as a cycle count minus one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TurnaroundCycles {
    Cycles1,
    Cycles2,
    Cycles3,
    Cycles4,
}

/// `DAP_SWD_Configure`: turnaround period and whether a data phase is
/// always generated, even after a `WAIT`/`FAULT` acknowledge.
pub struct ConfigureRequest {
    pub turnaround: TurnaroundCycles,
    pub always_data_phase: bool,
}

impl Default for ConfigureRequest {
    fn default() -> Self {
        ConfigureRequest {
            turnaround: TurnaroundCycles::Cycles1,
            always_data_phase: false,
        }
    }
}

impl Request for ConfigureRequest {
    const CATEGORY: Category = Category(0x13);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        let turnaround_bits = match self.turnaround {
            TurnaroundCycles::Cycles1 => 0,
            TurnaroundCycles::Cycles2 => 1,
            TurnaroundCycles::Cycles3 => 2,
            TurnaroundCycles::Cycles4 => 3,
        };
        let mut byte = turnaround_bits;
        if self.always_data_phase {
            byte |= 1 << 2;
        }
        buffer[offset] = byte;
        Ok(1)
    }
}

pub struct ConfigureResponse;

impl Response for ConfigureResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        match *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)? {
            0x00 => Ok(ConfigureResponse),
            _ => Err(CmsisDapError::ErrorResponse("DAP_SWD_Configure")),
        }
    }
}
