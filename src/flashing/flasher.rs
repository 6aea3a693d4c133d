//! Downloads a placed [`FlashAlgorithm`] to target RAM and drives its
//! entrypoints through halt-mode debugging.

use std::time::Duration;

use crate::architecture::arm::core::cortex_m::{self, AlgorithmRegisters};
use crate::architecture::arm::ArmCommunicationInterface;

use super::error::FlashError;
use super::flash_algorithm::FlashAlgorithm;

/// A cheap, non-collision-resistant content fingerprint: a running XOR over
/// 32-bit words. Used for verify passes where a byte-exact compare isn't
/// required.
pub fn xor_fingerprint(words: impl IntoIterator<Item = u32>) -> u32 {
    words.into_iter().fold(0u32, |acc, w| acc ^ w)
}

/// Write the algorithm's instructions to `algo.algo_base`, optionally
/// reading them back and comparing fingerprints.
pub fn download_algorithm(
    iface: &mut ArmCommunicationInterface,
    algo: &FlashAlgorithm,
    verify: bool,
) -> Result<(), FlashError> {
    iface.write_block_32(algo.algo_base, &algo.instructions)?;

    if verify {
        let mut readback = vec![0u32; algo.instructions.len()];
        iface.read_block_32(algo.algo_base, &mut readback)?;
        let expected = xor_fingerprint(algo.instructions.iter().copied());
        let actual = xor_fingerprint(readback.iter().copied());
        if expected != actual {
            return Err(FlashError::VerifyMismatch {
                address: algo.algo_base,
                expected,
                actual,
            });
        }
    }

    Ok(())
}

fn registers_for(
    algo: &FlashAlgorithm,
    pc: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
) -> AlgorithmRegisters {
    AlgorithmRegisters {
        r0,
        r1,
        r2,
        r3,
        r9: algo.static_base,
        sp: algo.stack_pointer,
        pc,
        lr: algo.breakpoint,
    }
}

fn invoke(
    iface: &mut ArmCommunicationInterface,
    name: &'static str,
    algo: &FlashAlgorithm,
    pc: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    timeout: Duration,
) -> Result<(), FlashError> {
    let registers = registers_for(algo, pc, r0, r1, r2, r3);
    let result = cortex_m::call_function_and_wait(iface, registers, timeout).map_err(|e| {
        if matches!(e, crate::architecture::arm::ArmError::AlgorithmTimeout) {
            FlashError::AlgorithmTimeout { name }
        } else {
            FlashError::Arm(e)
        }
    })?;

    if result != 0 {
        return Err(FlashError::AlgorithmFailed { name, code: result });
    }
    Ok(())
}

/// `fnc` as passed to `Init`/`UnInit`: 1 = erase, 2 = program, 3 = verify.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlgorithmFunction {
    Erase = 1,
    Program = 2,
    Verify = 3,
}

pub fn init(
    iface: &mut ArmCommunicationInterface,
    algo: &FlashAlgorithm,
    clock: u32,
    function: AlgorithmFunction,
) -> Result<(), FlashError> {
    let Some(pc_init) = algo.pc_init else {
        return Ok(());
    };
    invoke(
        iface,
        "Init",
        algo,
        pc_init,
        algo.flash_device.base_address,
        clock,
        function as u32,
        0,
        Duration::from_secs(2),
    )
}

pub fn uninit(
    iface: &mut ArmCommunicationInterface,
    algo: &FlashAlgorithm,
    function: AlgorithmFunction,
) -> Result<(), FlashError> {
    let Some(pc_uninit) = algo.pc_uninit else {
        return Ok(());
    };
    invoke(
        iface,
        "UnInit",
        algo,
        pc_uninit,
        function as u32,
        0,
        0,
        0,
        Duration::from_secs(2),
    )
}

pub fn erase_chip(
    iface: &mut ArmCommunicationInterface,
    algo: &FlashAlgorithm,
) -> Result<(), FlashError> {
    let Some(pc_erase_chip) = algo.pc_erase_chip else {
        return Err(FlashError::ChipEraseNotSupported);
    };
    invoke(
        iface,
        "EraseChip",
        algo,
        pc_erase_chip,
        0,
        0,
        0,
        0,
        Duration::from_millis(algo.flash_device.erase_timeout_ms as u64),
    )
}

pub fn erase_sector(
    iface: &mut ArmCommunicationInterface,
    algo: &FlashAlgorithm,
    sector_address: u32,
) -> Result<(), FlashError> {
    invoke(
        iface,
        "EraseSector",
        algo,
        algo.pc_erase_sector,
        sector_address,
        0,
        0,
        0,
        Duration::from_millis(algo.flash_device.erase_timeout_ms as u64),
    )
}

/// Write `bytes` into the target-side program buffer and call
/// `ProgramPage(address, bytes.len(), program_buffer)`.
pub fn program_page(
    iface: &mut ArmCommunicationInterface,
    algo: &FlashAlgorithm,
    address: u32,
    bytes: &[u8],
) -> Result<(), FlashError> {
    let words: Vec<u32> = bytes
        .chunks(4)
        .map(|c| {
            let empty = algo.flash_device.erased_byte_value;
            u32::from_le_bytes([
                c[0],
                c.get(1).copied().unwrap_or(empty),
                c.get(2).copied().unwrap_or(empty),
                c.get(3).copied().unwrap_or(empty),
            ])
        })
        .collect();

    iface.write_block_32(algo.program_buffer_address, &words)?;

    invoke(
        iface,
        "ProgramPage",
        algo,
        algo.pc_program_page,
        address,
        bytes.len() as u32,
        algo.program_buffer_address,
        0,
        Duration::from_millis(algo.flash_device.program_timeout_ms as u64),
    )
}
