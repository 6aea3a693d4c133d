//! Cortex-M halt/reset orchestration and flash algorithm invocation.
//!
//! Everything here drives the target by stopping the core and stepping on
//! its register file through DCRSR/DCRDR; there is no reliance on any
//! monitor running on the target.

use std::time::{Duration, Instant};

use super::{Aircr, CoreRegister, Demcr, Dhcsr, AIRCR, DCRDR, DCRSR, DEMCR, DHCSR};
use crate::architecture::arm::communication_interface::ArmCommunicationInterface;
use crate::architecture::arm::ArmError;

const HALT_TIMEOUT: Duration = Duration::from_millis(500);
const RESET_TIMEOUT: Duration = Duration::from_millis(500);
const REGISTER_TIMEOUT: Duration = Duration::from_millis(100);

/// `DebugCoreStart`: enable halting debug, without actually halting.
pub fn core_start(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let current = Dhcsr::from(iface.read_word_32(DHCSR)?);
    if current.c_debugen() {
        return Ok(());
    }
    let mut dhcsr = Dhcsr::from(0);
    dhcsr.set_c_debugen(true);
    iface.write_word_32(DHCSR, dhcsr.into())
}

/// Halt the core, if it isn't halted already, and wait for `S_HALT`.
pub fn halt(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let mut dhcsr = Dhcsr::from(0);
    dhcsr.set_c_debugen(true);
    dhcsr.set_c_halt(true);
    iface.write_word_32(DHCSR, dhcsr.into())?;
    wait_for_halt(iface)
}

fn wait_for_halt(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let start = Instant::now();
    while start.elapsed() < HALT_TIMEOUT {
        let dhcsr = Dhcsr::from(iface.read_word_32(DHCSR)?);
        if dhcsr.s_halt() {
            return Ok(());
        }
    }
    Err(ArmError::HaltTimeout)
}

/// Resume the core, keeping halting debug enabled.
pub fn resume(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let mut dhcsr = Dhcsr::from(0);
    dhcsr.set_c_debugen(true);
    iface.write_word_32(DHCSR, dhcsr.into())
}

/// `ResetCatchSet`: arm `VC_CORERESET` so the core halts at the reset
/// vector on the next reset, and clear any stale halt status.
pub fn reset_catch_set(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let mut demcr = Demcr::from(iface.read_word_32(DEMCR)?);
    demcr.set_vc_corereset(true);
    iface.write_word_32(DEMCR, demcr.into())?;
    let _ = iface.read_word_32(DHCSR)?;
    Ok(())
}

/// `ResetCatchClear`.
pub fn reset_catch_clear(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let mut demcr = Demcr::from(iface.read_word_32(DEMCR)?);
    demcr.set_vc_corereset(false);
    iface.write_word_32(DEMCR, demcr.into())
}

/// `ResetSystem`: request `SYSRESETREQ` and wait for `S_RESET_ST` to clear.
pub fn reset_system(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let mut aircr = Aircr::from(0);
    aircr.set_sysresetreq(true);
    iface.write_word_32(AIRCR, aircr.into())?;

    let start = Instant::now();
    while start.elapsed() < RESET_TIMEOUT {
        match iface.read_word_32(DHCSR) {
            Ok(raw) if !Dhcsr::from(raw).s_reset_st() => return Ok(()),
            Ok(_) => continue,
            Err(_) => continue,
        }
    }
    Err(ArmError::ResetTimeout)
}

/// Reset and halt at the reset vector: arm the catch, reset, wait for halt,
/// then disarm the catch so a later free-running reset behaves normally.
pub fn reset_and_halt(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    core_start(iface)?;
    reset_catch_set(iface)?;
    reset_system(iface)?;
    wait_for_halt(iface)?;
    reset_catch_clear(iface)
}

/// A plain system reset with no attempt to catch the core at the vector.
pub fn reset(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    reset_system(iface)
}

fn write_core_register(
    iface: &mut ArmCommunicationInterface,
    register: CoreRegister,
    value: u32,
) -> Result<(), ArmError> {
    iface.write_word_32(DCRDR, value)?;
    // Bit 16 of DCRSR selects a write; bits 0-4 are the register index.
    iface.write_word_32(DCRSR, register.dcrsr_index() | (1 << 16))?;
    wait_for_regrdy(iface)
}

fn read_core_register(
    iface: &mut ArmCommunicationInterface,
    register: CoreRegister,
) -> Result<u32, ArmError> {
    iface.write_word_32(DCRSR, register.dcrsr_index())?;
    wait_for_regrdy(iface)?;
    iface.read_word_32(DCRDR)
}

fn wait_for_regrdy(iface: &mut ArmCommunicationInterface) -> Result<(), ArmError> {
    let start = Instant::now();
    while start.elapsed() < REGISTER_TIMEOUT {
        if Dhcsr::from(iface.read_word_32(DHCSR)?).s_regrdy() {
            return Ok(());
        }
    }
    Err(ArmError::RegisterTimeout)
}

/// The core register file an algorithm invocation programs before resuming.
pub struct AlgorithmRegisters {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r9: u32,
    pub sp: u32,
    pub pc: u32,
    /// The breakpoint address the algorithm returns to; written into LR.
    pub lr: u32,
}

/// Program the register file, resume, wait for the core to halt again at
/// `lr`, and return R0 as the algorithm's return value.
///
/// The core must already be halted. `xPSR` is forced to `0x0100_0000`
/// (Thumb state, no exception active) since every flash algorithm is plain
/// Thumb code.
pub fn call_function_and_wait(
    iface: &mut ArmCommunicationInterface,
    registers: AlgorithmRegisters,
    timeout: Duration,
) -> Result<u32, ArmError> {
    write_core_register(iface, CoreRegister::R0, registers.r0)?;
    write_core_register(iface, CoreRegister::R1, registers.r1)?;
    write_core_register(iface, CoreRegister::R2, registers.r2)?;
    write_core_register(iface, CoreRegister::R3, registers.r3)?;
    write_core_register(iface, CoreRegister::R9, registers.r9)?;
    write_core_register(iface, CoreRegister::Sp, registers.sp)?;
    write_core_register(iface, CoreRegister::Lr, registers.lr)?;
    write_core_register(iface, CoreRegister::Xpsr, 0x0100_0000)?;
    write_core_register(iface, CoreRegister::Pc, registers.pc)?;

    resume(iface)?;

    let start = Instant::now();
    loop {
        let dhcsr = Dhcsr::from(iface.read_word_32(DHCSR)?);
        if dhcsr.s_halt() && dhcsr.s_regrdy() {
            break;
        }
        if start.elapsed() > timeout {
            return Err(ArmError::AlgorithmTimeout);
        }
    }

    read_core_register(iface, CoreRegister::R0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::arm::ArmCommunicationInterface;
    use crate::probe::mock::MockProbe;

    fn iface_with(probe: MockProbe) -> ArmCommunicationInterface {
        let mut iface = ArmCommunicationInterface::new(Box::new(probe));
        iface.connect().expect("mock connect always succeeds");
        iface
    }

    #[test]
    fn halt_is_idempotent_and_leaves_s_halt_set() {
        let mut iface = iface_with(MockProbe::new());
        halt(&mut iface).unwrap();
        assert!(Dhcsr::from(iface.read_word_32(DHCSR).unwrap()).s_halt());

        halt(&mut iface).unwrap();
        assert!(Dhcsr::from(iface.read_word_32(DHCSR).unwrap()).s_halt());
    }

    #[test]
    fn reset_and_halt_latches_then_clears_s_reset_st() {
        let mut iface = iface_with(MockProbe::new());
        reset_and_halt(&mut iface).unwrap();

        // By the time reset_and_halt returns, the reset has completed and
        // the catch at the vector has taken effect.
        let dhcsr = Dhcsr::from(iface.read_word_32(DHCSR).unwrap());
        assert!(!dhcsr.s_reset_st());
        assert!(dhcsr.s_halt());
    }

    #[test]
    fn call_function_and_wait_returns_r0_on_halt() {
        let mut iface = iface_with(MockProbe::new());
        halt(&mut iface).unwrap();

        let registers = AlgorithmRegisters {
            r0: 0x1111_2222,
            r1: 0,
            r2: 0,
            r3: 0,
            r9: 0,
            sp: 0x2000_1000,
            pc: 0x2000_0021,
            lr: 0x2000_0001,
        };
        let result =
            call_function_and_wait(&mut iface, registers, Duration::from_millis(100)).unwrap();
        assert_eq!(result, 0x1111_2222);
    }

    #[test]
    fn call_function_and_wait_times_out_if_core_never_halts() {
        let mut probe = MockProbe::new();
        probe.auto_halt_on_resume = false;
        let mut iface = iface_with(probe);
        halt(&mut iface).unwrap();

        let registers = AlgorithmRegisters {
            r0: 0,
            r1: 0,
            r2: 0,
            r3: 0,
            r9: 0,
            sp: 0x2000_1000,
            pc: 0x2000_0021,
            lr: 0x2000_0001,
        };
        let result = call_function_and_wait(&mut iface, registers, Duration::from_millis(1));
        assert!(matches!(result, Err(ArmError::AlgorithmTimeout)));
    }
}
