//! Cortex-M System Control Space (SCS) register layout and the halt/reset
//! controller built on top of it.

pub mod cortex_m;

use bitfield::bitfield;

/// Base address of the System Control Space, fixed by the architecture.
pub const SCS_BASE: u32 = 0xE000_E000;

pub const CPUID: u32 = SCS_BASE;
pub const ICSR: u32 = SCS_BASE + 0x004;
pub const VTOR: u32 = SCS_BASE + 0x008;
pub const AIRCR: u32 = SCS_BASE + 0x00C;
pub const DHCSR: u32 = SCS_BASE + 0xDF0;
pub const DCRSR: u32 = SCS_BASE + 0xDF4;
pub const DCRDR: u32 = SCS_BASE + 0xDF8;
pub const DEMCR: u32 = SCS_BASE + 0xDFC;

bitfield! {
    /// Debug Halting Control and Status Register.
    #[derive(Clone, Copy)]
    pub struct Dhcsr(u32);
    impl Debug;
    pub s_reset_st, _: 25;
    pub s_retire_st, _: 24;
    pub s_lockup, _: 19;
    pub s_sleep, _: 18;
    pub s_halt, _: 17;
    pub s_regrdy, _: 16;
    pub c_snapstall, set_c_snapstall: 5;
    pub c_maskints, set_c_maskints: 3;
    pub c_step, set_c_step: 2;
    pub c_halt, set_c_halt: 1;
    pub c_debugen, set_c_debugen: 0;
}

/// The fixed key that must be written to the top halfword of DHCSR for a
/// write to take effect.
const DHCSR_DBGKEY: u32 = 0xA05F_0000;

impl From<u32> for Dhcsr {
    fn from(raw: u32) -> Self {
        Dhcsr(raw & 0x0000_FFFF)
    }
}

impl From<Dhcsr> for u32 {
    fn from(raw: Dhcsr) -> Self {
        (raw.0 & 0x0000_FFFF) | DHCSR_DBGKEY
    }
}

bitfield! {
    /// Debug Exception and Monitor Control Register.
    #[derive(Clone, Copy)]
    pub struct Demcr(u32);
    impl Debug;
    pub trcena, set_trcena: 24;
    pub vc_harderr, set_vc_harderr: 10;
    pub vc_corereset, set_vc_corereset: 0;
}

impl From<u32> for Demcr {
    fn from(raw: u32) -> Self {
        Demcr(raw)
    }
}

impl From<Demcr> for u32 {
    fn from(raw: Demcr) -> Self {
        raw.0
    }
}

bitfield! {
    /// Application Interrupt and Reset Control Register.
    #[derive(Clone, Copy)]
    pub struct Aircr(u32);
    impl Debug;
    pub sysresetreq, set_sysresetreq: 2;
    pub vectclractive, set_vectclractive: 1;
}

const AIRCR_VECTKEY: u32 = 0x05FA_0000;

impl From<u32> for Aircr {
    fn from(raw: u32) -> Self {
        Aircr(raw)
    }
}

impl From<Aircr> for u32 {
    fn from(raw: Aircr) -> Self {
        (raw.0 & 0x0000_FFFF) | AIRCR_VECTKEY
    }
}

/// The sixteen core registers, as addressed through DCRSR/DCRDR.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoreRegister {
    R0,
    R1,
    R2,
    R3,
    R9,
    Sp,
    Lr,
    Pc,
    Xpsr,
}

impl CoreRegister {
    pub fn dcrsr_index(self) -> u32 {
        match self {
            CoreRegister::R0 => 0,
            CoreRegister::R1 => 1,
            CoreRegister::R2 => 2,
            CoreRegister::R3 => 3,
            CoreRegister::R9 => 9,
            CoreRegister::Sp => 13,
            CoreRegister::Lr => 14,
            CoreRegister::Pc => 15,
            CoreRegister::Xpsr => 16,
        }
    }
}
