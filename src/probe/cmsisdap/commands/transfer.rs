//! `TransferConfigure` (0x04), `Transfer` (0x05), `TransferBlock` (0x06).
//!
//! These three carry every DP/AP register access and every memory block
//! read or write; everything above this module (the ADIv5 engine) is built
//! on top of [`InnerTransferRequest`] and [`BlockAccess`].

use super::{Category, CmsisDapError, Request, Response};

/// `DAP_TransferConfigure`.
///
/// `wait_retry` is the number of times the probe retries a transaction that
/// comes back `WAIT` before giving up; `0xFFFF` (not `0xFF`) asks the probe
/// to retry as many times as its own firmware allows.
pub struct ConfigureRequest {
    pub idle_cycles: u8,
    pub wait_retry: u16,
    pub match_retry: u16,
}

impl Default for ConfigureRequest {
    fn default() -> Self {
        ConfigureRequest {
            idle_cycles: 0,
            wait_retry: 0xFFFF,
            match_retry: 0,
        }
    }
}

impl Request for ConfigureRequest {
    const CATEGORY: Category = Category(0x04);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        buffer[offset] = self.idle_cycles;
        buffer[offset + 1..offset + 3].copy_from_slice(&self.wait_retry.to_le_bytes());
        buffer[offset + 3..offset + 5].copy_from_slice(&self.match_retry.to_le_bytes());
        Ok(5)
    }
}

pub struct ConfigureResponse;

impl Response for ConfigureResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        match *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)? {
            0x00 => Ok(ConfigureResponse),
            _ => Err(CmsisDapError::ErrorResponse("DAP_TransferConfigure")),
        }
    }
}

/// Which register within a port is being addressed, and which port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortKind {
    Dp,
    Ap,
}

/// A single DP or AP register access, as it appears inside a `Transfer`
/// request's per-item `transfer_request` byte.
#[derive(Copy, Clone, Debug)]
pub struct InnerTransferRequest {
    pub port: PortKind,
    pub address: u8,
    pub write: Option<u32>,
}

impl InnerTransferRequest {
    fn request_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.port == PortKind::Ap {
            byte |= 1 << 0;
        }
        if self.write.is_none() {
            byte |= 1 << 1; // RnW
        }
        byte |= (self.address & 0x0C) << 0; // A2/A3 occupy bits 2-3 directly
        byte
    }
}

/// Acknowledge code returned for each transfer item (spec §4.2 Transfer
/// acknowledgements).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Wait,
    Fault,
    NoAck,
    ProtocolError,
    ValueMismatch,
}

impl Ack {
    fn from_byte(byte: u8) -> Ack {
        if byte & 0x08 != 0 {
            return Ack::ProtocolError;
        }
        if byte & 0x10 != 0 {
            return Ack::ValueMismatch;
        }
        match byte & 0x07 {
            0x01 => Ack::Ok,
            0x02 => Ack::Wait,
            0x04 => Ack::Fault,
            _ => Ack::NoAck,
        }
    }

    /// Whether this ack means the caller should back off and retry the
    /// whole transaction (a fresh `SELECT` bank reload may also be needed
    /// for `Fault`, handled one layer up).
    pub fn is_retryable(self) -> bool {
        matches!(self, Ack::Wait)
    }
}

/// `DAP_Transfer`: up to 255 DP/AP accesses in one USB round trip.
pub struct TransferRequest<'a> {
    pub dap_index: u8,
    pub items: &'a [InnerTransferRequest],
}

impl Request for TransferRequest<'_> {
    const CATEGORY: Category = Category(0x05);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        let mut pos = offset;
        buffer[pos] = self.dap_index;
        pos += 1;
        buffer[pos] = self.items.len() as u8;
        pos += 1;
        for item in self.items {
            buffer[pos] = item.request_byte();
            pos += 1;
            if let Some(value) = item.write {
                buffer[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
                pos += 4;
            }
        }
        Ok(pos - offset)
    }
}

/// Decoded `DAP_Transfer` response: one ack for the whole batch (the last
/// item's, per CMSIS-DAP semantics a batch stops at the first non-OK ack)
/// plus the values read back.
pub struct TransferResponse {
    pub transfer_count: u8,
    pub ack: Ack,
    pub reads: Vec<u32>,
}

impl Response for TransferResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        let transfer_count = *buffer.get(offset).ok_or(CmsisDapError::NotEnoughData)?;
        let ack_byte = *buffer.get(offset + 1).ok_or(CmsisDapError::NotEnoughData)?;
        let ack = Ack::from_byte(ack_byte);

        let mut reads = Vec::new();
        let mut pos = offset + 2;
        while pos + 4 <= buffer.len() && reads.len() < transfer_count as usize {
            let bytes: [u8; 4] = buffer[pos..pos + 4]
                .try_into()
                .map_err(|_| CmsisDapError::NotEnoughData)?;
            reads.push(u32::from_le_bytes(bytes));
            pos += 4;
        }

        Ok(TransferResponse {
            transfer_count,
            ack,
            reads,
        })
    }
}

/// A single read-or-write direction for `DAP_TransferBlock`: every item in
/// the block shares the same register, only the data differs.
pub enum BlockAccess<'a> {
    Read { port: PortKind, address: u8, count: u16 },
    Write { port: PortKind, address: u8, data: &'a [u32] },
}

pub struct TransferBlockRequest<'a> {
    pub dap_index: u8,
    pub access: BlockAccess<'a>,
}

impl Request for TransferBlockRequest<'_> {
    const CATEGORY: Category = Category(0x06);

    fn to_bytes(&self, buffer: &mut [u8], offset: usize) -> Result<usize, CmsisDapError> {
        let mut pos = offset;
        buffer[pos] = self.dap_index;
        pos += 1;

        match &self.access {
            BlockAccess::Read { port, address, count } => {
                buffer[pos..pos + 2].copy_from_slice(&count.to_le_bytes());
                pos += 2;
                let mut req = 0u8;
                if *port == PortKind::Ap {
                    req |= 1 << 0;
                }
                req |= 1 << 1; // RnW
                req |= (*address & 0x0C) << 0;
                buffer[pos] = req;
                pos += 1;
            }
            BlockAccess::Write { port, address, data } => {
                if data.len() > u16::MAX as usize {
                    return Err(CmsisDapError::TooMuchData);
                }
                buffer[pos..pos + 2].copy_from_slice(&(data.len() as u16).to_le_bytes());
                pos += 2;
                let mut req = 0u8;
                if *port == PortKind::Ap {
                    req |= 1 << 0;
                }
                req |= (*address & 0x0C) << 0;
                buffer[pos] = req;
                pos += 1;
                for word in data.iter() {
                    buffer[pos..pos + 4].copy_from_slice(&word.to_le_bytes());
                    pos += 4;
                }
            }
        }
        Ok(pos - offset)
    }
}

pub struct TransferBlockResponse {
    pub transfer_count: u16,
    pub ack: Ack,
    pub reads: Vec<u32>,
}

impl Response for TransferBlockResponse {
    fn from_bytes(buffer: &[u8], offset: usize) -> Result<Self, CmsisDapError> {
        let count_bytes: [u8; 2] = buffer
            .get(offset..offset + 2)
            .ok_or(CmsisDapError::NotEnoughData)?
            .try_into()
            .map_err(|_| CmsisDapError::NotEnoughData)?;
        let transfer_count = u16::from_le_bytes(count_bytes);
        let ack = Ack::from_byte(*buffer.get(offset + 2).ok_or(CmsisDapError::NotEnoughData)?);

        let mut reads = Vec::new();
        let mut pos = offset + 3;
        while pos + 4 <= buffer.len() && reads.len() < transfer_count as usize {
            let bytes: [u8; 4] = buffer[pos..pos + 4]
                .try_into()
                .map_err(|_| CmsisDapError::NotEnoughData)?;
            reads.push(u32::from_le_bytes(bytes));
            pos += 4;
        }

        Ok(TransferBlockResponse {
            transfer_count,
            ack,
            reads,
        })
    }
}
