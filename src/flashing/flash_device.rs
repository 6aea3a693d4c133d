//! The `FlashDevice` descriptor: the little-endian packed structure every
//! Keil flash loader module carries, describing the NVM it programs.

use scroll::{Pread, LE};

use super::error::FlashError;

/// How the device's flash is attached to the core.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryType {
    Unknown,
    OnChip,
    Ext8Bit,
    Ext16Bit,
    Ext32Bit,
    ExtSpi,
}

impl From<u16> for MemoryType {
    fn from(raw: u16) -> Self {
        match raw {
            1 => MemoryType::OnChip,
            2 => MemoryType::Ext8Bit,
            3 => MemoryType::Ext16Bit,
            4 => MemoryType::Ext32Bit,
            5 => MemoryType::ExtSpi,
            _ => MemoryType::Unknown,
        }
    }
}

/// One row of the sector size table: every sector from `sector_start` up to
/// the next row's `sector_start` (or the device end) is `sector_size` bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SectorDescriptor {
    pub sector_size: u32,
    pub sector_start: u32,
}

const NAME_LEN: usize = 128;
const MAX_SECTORS: usize = 512;
const SECTOR_SENTINEL: SectorDescriptor = SectorDescriptor {
    sector_size: 0xFFFF_FFFF,
    sector_start: 0xFFFF_FFFF,
};

/// The parsed `FlashDevice` structure, read out of the FLM's data section.
#[derive(Clone, Debug)]
pub struct FlashDevice {
    pub version: u16,
    pub name: String,
    pub memory_type: MemoryType,
    pub base_address: u32,
    pub total_size: u32,
    pub page_size: u32,
    pub erased_byte_value: u8,
    pub program_timeout_ms: u32,
    pub erase_timeout_ms: u32,
    pub sectors: Vec<SectorDescriptor>,
}

/// A contiguous run of flash addressed by a `FlashDevice`, handed to callers
/// that need the whole address range rather than its constituent sectors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashRegion {
    pub start: u32,
    pub end: u32,
}

impl FlashDevice {
    /// Parse a `FlashDevice` out of raw little-endian bytes read from the
    /// FLM's data section at the symbol's offset.
    pub fn parse(data: &[u8]) -> Result<FlashDevice, FlashError> {
        let mut offset = 0usize;

        let version: u16 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;

        let name_bytes = data
            .get(offset..offset + NAME_LEN)
            .ok_or(FlashError::FlashDeviceNotLoaded)?;
        offset += NAME_LEN;
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let raw_type: u16 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let base_address: u32 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let total_size: u32 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let page_size: u32 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let _reserved: u32 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let erased_byte_value: u8 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let program_timeout_ms: u32 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
        let erase_timeout_ms: u32 = data
            .gread_with(&mut offset, LE)
            .map_err(|_| FlashError::FlashDeviceNotLoaded)?;

        let mut sectors = Vec::new();
        for _ in 0..MAX_SECTORS {
            let sector_size: u32 = data
                .gread_with(&mut offset, LE)
                .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
            let sector_start: u32 = data
                .gread_with(&mut offset, LE)
                .map_err(|_| FlashError::FlashDeviceNotLoaded)?;
            let entry = SectorDescriptor {
                sector_size,
                sector_start,
            };
            if entry == SECTOR_SENTINEL {
                break;
            }
            sectors.push(entry);
        }

        if sectors.is_empty() {
            return Err(FlashError::FlashDeviceNotLoaded);
        }

        Ok(FlashDevice {
            version,
            name,
            memory_type: raw_type.into(),
            base_address,
            total_size,
            page_size,
            erased_byte_value,
            program_timeout_ms,
            erase_timeout_ms,
            sectors,
        })
    }

    pub fn region(&self) -> FlashRegion {
        FlashRegion {
            start: self.base_address,
            end: self.base_address + self.total_size,
        }
    }

    /// The sector containing `address`, or `None` if `address` is outside
    /// the device.
    pub fn sector_containing(&self, address: u32) -> Option<SectorDescriptor> {
        let region = self.region();
        if address < region.start || address >= region.end {
            return None;
        }
        let offset = address - region.start;
        self.sectors
            .iter()
            .rev()
            .find(|s| s.sector_start <= offset)
            .copied()
    }

    /// Iterate over every sector in the device, in address order.
    pub fn iter_sectors(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let region = self.region();
        let mut addr = region.start;
        let mut idx = 0usize;
        std::iter::from_fn(move || {
            if addr >= region.end {
                return None;
            }
            if let Some(next) = self.sectors.get(idx + 1) {
                if region.start + next.sector_start <= addr {
                    idx += 1;
                }
            }
            let size = self.sectors[idx].sector_size;
            let out = (addr, size);
            addr += size;
            Some(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u16.to_le_bytes()); // version
        let mut name = [0u8; NAME_LEN];
        name[..4].copy_from_slice(b"DEMO");
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&1u16.to_le_bytes()); // OnChip
        buf.extend_from_slice(&0x0800_0000u32.to_le_bytes()); // base_address
        buf.extend_from_slice(&0x0002_0000u32.to_le_bytes()); // total_size: 128 KiB
        buf.extend_from_slice(&1024u32.to_le_bytes()); // page_size
        buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
        buf.push(0xFF); // erased_byte_value
        buf.extend_from_slice(&3000u32.to_le_bytes()); // program_timeout_ms
        buf.extend_from_slice(&30000u32.to_le_bytes()); // erase_timeout_ms
        buf.extend_from_slice(&0x800u32.to_le_bytes()); // sector 0: 2 KiB sectors
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // sentinel
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        buf
    }

    #[test]
    fn parses_version_name_and_sectors() {
        let device = FlashDevice::parse(&sample_bytes()).unwrap();
        assert_eq!(device.name, "DEMO");
        assert_eq!(device.memory_type, MemoryType::OnChip);
        assert_eq!(device.page_size, 1024);
        assert_eq!(device.sectors.len(), 1);
        assert_eq!(device.sectors[0].sector_size, 0x800);
    }

    #[test]
    fn region_spans_base_to_base_plus_total_size() {
        let device = FlashDevice::parse(&sample_bytes()).unwrap();
        let region = device.region();
        assert_eq!(region.start, 0x0800_0000);
        assert_eq!(region.end, 0x0800_0000 + 0x0002_0000);
    }

    #[test]
    fn iter_sectors_covers_the_whole_region_in_fixed_size_steps() {
        let device = FlashDevice::parse(&sample_bytes()).unwrap();
        let sectors: Vec<(u32, u32)> = device.iter_sectors().collect();
        assert_eq!(sectors.len(), (0x0002_0000 / 0x800) as usize);
        assert_eq!(sectors[0], (0x0800_0000, 0x800));
        assert_eq!(sectors[1], (0x0800_0800, 0x800));
    }

    #[test]
    fn sector_containing_finds_the_right_row_with_mixed_sector_sizes() {
        let mut device = FlashDevice::parse(&sample_bytes()).unwrap();
        device.sectors = vec![
            SectorDescriptor {
                sector_size: 0x4000,
                sector_start: 0,
            },
            SectorDescriptor {
                sector_size: 0x2000,
                sector_start: 0x1_0000,
            },
        ];
        let first = device.sector_containing(device.base_address + 0x8000).unwrap();
        assert_eq!(first.sector_size, 0x4000);
        let second = device
            .sector_containing(device.base_address + 0x1_2000)
            .unwrap();
        assert_eq!(second.sector_size, 0x2000);
        assert!(device.sector_containing(device.base_address - 1).is_none());
    }
}
