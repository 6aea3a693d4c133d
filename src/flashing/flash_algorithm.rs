//! Parses a Keil Flash Loader Module (FLM) ELF image, extracts the
//! `FlashDevice` descriptor and entrypoint addresses, and places the
//! resulting code image in target RAM with a halt-shim prefix.

use goblin::elf::program_header::PF_R;
use goblin::elf::Elf;
use goblin::elf64::section_header::{SHT_NOBITS, SHT_PROGBITS};

use super::error::FlashError;
use super::flash_device::FlashDevice;

/// The fixed symbols every FLM must export.
const REQUIRED_SYMBOLS: [&str; 6] = [
    "Init",
    "UnInit",
    "EraseChip",
    "EraseSector",
    "ProgramPage",
    "FlashDevice",
];

/// Thumb routine prepended to the algorithm image: when an entrypoint
/// returns to LR it falls into this, which parks the core in a busy loop
/// observable as `S_HALT`.
const HALT_SHIM: [u32; 8] = [
    0xE00A_BE00,
    0x062D_780D,
    0x2408_4068,
    0xD300_0040,
    0x1E64_4058,
    0x1C49_D1FA,
    0x2A00_1E52,
    0x4770_D1F2,
];

const HALT_SHIM_BYTES: u32 = (HALT_SHIM.len() * 4) as u32;
const STACK_SLACK: u32 = 0x400;

/// The flash loader image as extracted from the ELF, before its code is
/// relocated into a specific target's RAM.
#[derive(Clone, Debug)]
pub struct RawFlashAlgorithm {
    /// RO code followed immediately by RW data; ZI space is implied by
    /// `zi_size` and not present in these bytes.
    pub code: Vec<u8>,
    pub zi_size: u32,
    pub pc_init: Option<u32>,
    pub pc_uninit: Option<u32>,
    pub pc_erase_chip: Option<u32>,
    pub pc_erase_sector: u32,
    pub pc_program_page: u32,
    pub flash_device: FlashDevice,
}

impl RawFlashAlgorithm {
    /// Parse an FLM ELF image.
    pub fn parse(bytes: &[u8]) -> Result<RawFlashAlgorithm, FlashError> {
        if bytes.len() < 4 || &bytes[0..4] != b"\x7FELF" {
            return Err(FlashError::BadSectionLayout);
        }

        let elf = Elf::parse(bytes).map_err(FlashError::BadFlm)?;

        let mut symbols = std::collections::HashMap::new();
        for sym in &elf.syms {
            if let Some(name) = elf.strtab.get_at(sym.st_name) {
                symbols.insert(name, sym.st_value as u32);
            }
        }
        for required in REQUIRED_SYMBOLS {
            if !symbols.contains_key(required) {
                return Err(FlashError::MissingSymbol(required));
            }
        }

        let prg_code = elf
            .section_headers
            .iter()
            .find(|s| {
                elf.shdr_strtab.get_at(s.sh_name) == Some("PrgCode") && s.sh_type == SHT_PROGBITS
            })
            .ok_or(FlashError::BadSectionLayout)?;

        let is_prg_data = |s: &&goblin::elf::SectionHeader| {
            elf.shdr_strtab.get_at(s.sh_name) == Some("PrgData")
        };
        let prg_data_rw = elf
            .section_headers
            .iter()
            .filter(is_prg_data)
            .find(|s| s.sh_type == SHT_PROGBITS)
            .ok_or(FlashError::BadSectionLayout)?;
        let prg_data_zi = elf
            .section_headers
            .iter()
            .filter(is_prg_data)
            .find(|s| s.sh_type == SHT_NOBITS);

        if prg_code.sh_addr != 0 {
            return Err(FlashError::BadSectionLayout);
        }
        let ro_end = prg_code.sh_addr + prg_code.sh_size;
        if prg_data_rw.sh_addr != ro_end {
            return Err(FlashError::BadSectionLayout);
        }
        let rw_end = prg_data_rw.sh_addr + prg_data_rw.sh_size;

        let zi_size = match prg_data_zi {
            Some(zi) if zi.sh_addr == rw_end => zi.sh_size as u32,
            Some(_) => return Err(FlashError::BadSectionLayout),
            None => 0,
        };

        let mut code = vec![0u8; ro_end as usize];
        let ro_bytes = &bytes[prg_code.sh_offset as usize
            ..(prg_code.sh_offset + prg_code.sh_size) as usize];
        code[..ro_bytes.len()].copy_from_slice(ro_bytes);

        let rw_bytes = &bytes[prg_data_rw.sh_offset as usize
            ..(prg_data_rw.sh_offset + prg_data_rw.sh_size) as usize];
        code.extend_from_slice(rw_bytes);

        let flash_device_addr = symbols["FlashDevice"];
        let segment = elf
            .program_headers
            .iter()
            .find(|ph| {
                (ph.p_flags & PF_R) != 0
                    && flash_device_addr >= ph.p_vaddr as u32
                    && flash_device_addr < (ph.p_vaddr + ph.p_memsz) as u32
            })
            .ok_or(FlashError::FlashDeviceNotLoaded)?;
        let file_offset =
            segment.p_offset as u32 + (flash_device_addr - segment.p_vaddr as u32);
        let flash_device_bytes = bytes
            .get(file_offset as usize..)
            .ok_or(FlashError::FlashDeviceNotLoaded)?;
        let flash_device = FlashDevice::parse(flash_device_bytes)?;

        Ok(RawFlashAlgorithm {
            code,
            zi_size,
            pc_init: symbols.get("Init").copied(),
            pc_uninit: symbols.get("UnInit").copied(),
            pc_erase_chip: symbols.get("EraseChip").copied(),
            pc_erase_sector: symbols["EraseSector"],
            pc_program_page: symbols["ProgramPage"],
            flash_device,
        })
    }
}

/// A flash algorithm placed in a specific target's RAM, ready to be
/// downloaded and invoked.
#[derive(Clone, Debug)]
pub struct FlashAlgorithm {
    pub algo_base: u32,
    pub algo_size: u32,
    pub pc_init: Option<u32>,
    pub pc_uninit: Option<u32>,
    pub pc_erase_chip: Option<u32>,
    pub pc_erase_sector: u32,
    pub pc_program_page: u32,
    pub static_base: u32,
    pub program_buffer_address: u32,
    pub program_buffer_size: u32,
    pub breakpoint: u32,
    pub stack_pointer: u32,
    /// The halt-shim followed by the relocated code, as 32-bit words ready
    /// to write to `algo_base`.
    pub instructions: Vec<u32>,
    pub flash_device: FlashDevice,
}

impl FlashAlgorithm {
    /// Place `raw` in RAM starting at `ram_base`, spanning at most
    /// `ram_size` bytes.
    pub fn place(
        raw: RawFlashAlgorithm,
        ram_base: u32,
        ram_size: u32,
    ) -> Result<FlashAlgorithm, FlashError> {
        let code_len = raw.code.len() as u32;
        let code_and_zi = code_len + raw.zi_size;
        let code_size_aligned = (code_and_zi + 3) & !3;

        let algo_base = ram_base;
        let code_start = algo_base + HALT_SHIM_BYTES;

        let program_buffer_address = (code_start + code_size_aligned + 3) & !3;
        let program_buffer_size = raw.flash_device.page_size;
        let stack_pointer = program_buffer_address + program_buffer_size + STACK_SLACK;

        let needed = stack_pointer - ram_base;
        if needed > ram_size {
            return Err(FlashError::AlgorithmDoesNotFit {
                needed,
                available: ram_size,
            });
        }

        let relocate = |off: u32| code_start + off;

        let mut padded_code = raw.code;
        while padded_code.len() % 4 != 0 {
            padded_code.push(0);
        }

        let mut instructions: Vec<u32> = HALT_SHIM.to_vec();
        instructions.extend(padded_code.chunks_exact(4).map(|c| {
            u32::from_le_bytes([c[0], c[1], c[2], c[3]])
        }));

        Ok(FlashAlgorithm {
            algo_base,
            algo_size: HALT_SHIM_BYTES + code_size_aligned,
            pc_init: raw.pc_init.map(relocate),
            pc_uninit: raw.pc_uninit.map(relocate),
            pc_erase_chip: raw.pc_erase_chip.map(relocate),
            pc_erase_sector: relocate(raw.pc_erase_sector),
            pc_program_page: relocate(raw.pc_program_page),
            static_base: code_start,
            program_buffer_address,
            program_buffer_size,
            breakpoint: algo_base | 1,
            stack_pointer,
            instructions,
            flash_device: raw.flash_device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashing::flash_device::{MemoryType, SectorDescriptor};

    fn sample_flash_device() -> FlashDevice {
        FlashDevice {
            version: 1,
            name: "DEMO".into(),
            memory_type: MemoryType::OnChip,
            base_address: 0x0800_0000,
            total_size: 0x2_0000,
            page_size: 1024,
            erased_byte_value: 0xFF,
            program_timeout_ms: 3000,
            erase_timeout_ms: 30000,
            sectors: vec![SectorDescriptor {
                sector_size: 0x800,
                sector_start: 0,
            }],
        }
    }

    fn sample_raw(code_len: usize, zi_size: u32) -> RawFlashAlgorithm {
        RawFlashAlgorithm {
            code: vec![0u8; code_len],
            zi_size,
            pc_init: Some(0),
            pc_uninit: Some(4),
            pc_erase_chip: None,
            pc_erase_sector: 8,
            pc_program_page: 12,
            flash_device: sample_flash_device(),
        }
    }

    #[test]
    fn places_code_after_the_halt_shim() {
        let algo = FlashAlgorithm::place(sample_raw(64, 0), 0x2000_0000, 0x1000).unwrap();
        assert_eq!(algo.algo_base, 0x2000_0000);
        assert_eq!(algo.static_base, 0x2000_0000 + HALT_SHIM_BYTES);
        assert_eq!(algo.pc_init, Some(algo.static_base));
        assert_eq!(algo.pc_program_page, algo.static_base + 12);
        assert_eq!(algo.breakpoint, 0x2000_0000 | 1);
    }

    #[test]
    fn program_buffer_follows_code_and_stack_follows_buffer() {
        let algo = FlashAlgorithm::place(sample_raw(64, 16), 0x2000_0000, 0x1000).unwrap();
        assert!(algo.program_buffer_address >= algo.static_base + 64 + 16);
        assert_eq!(algo.program_buffer_size, 1024);
        assert_eq!(
            algo.stack_pointer,
            algo.program_buffer_address + algo.program_buffer_size + STACK_SLACK
        );
    }

    #[test]
    fn errors_when_the_layout_does_not_fit_in_ram() {
        let result = FlashAlgorithm::place(sample_raw(64, 0), 0x2000_0000, 32);
        assert!(matches!(
            result,
            Err(FlashError::AlgorithmDoesNotFit { .. })
        ));
    }

    #[test]
    fn instructions_start_with_the_halt_shim() {
        let algo = FlashAlgorithm::place(sample_raw(8, 0), 0x2000_0000, 0x1000).unwrap();
        assert_eq!(&algo.instructions[..HALT_SHIM.len()], &HALT_SHIM[..]);
    }
}
