//! An in-memory stand-in for a real probe, used to exercise the DP/AP
//! engine and the Cortex-M halt/reset controller without any USB hardware.
//!
//! Modeled on the teacher's `MockMemoryAp`: a small register file plus a
//! byte-addressed memory backing store, with just enough behavior to make
//! the halt/reset/register-transfer state machines observable.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{DebugProbeError, PortKind, RawDapAccess};

const DHCSR: u32 = 0xE000_EDF0;
const DCRSR: u32 = 0xE000_EDF4;
const DCRDR: u32 = 0xE000_EDF8;
const DEMCR: u32 = 0xE000_EDFC;
const AIRCR: u32 = 0xE000_E00C;

const CSW_ADDR: u8 = 0x00;
const TAR_ADDR: u8 = 0x04;
const DRW_ADDR: u8 = 0x0C;

/// A mock debug port plus a single mock AHB-AP over a flat memory image.
pub struct MockProbe {
    pub dpidr: u32,
    pub idr: u32,
    pub base: u32,
    ctrl: u32,
    select: u32,
    csw: u32,
    tar: u32,
    memory: HashMap<u32, u32>,
    core_regs: HashMap<u32, u32>,
    dcrdr_scratch: u32,
    debugen: bool,
    halted: bool,
    vc_corereset: bool,
    reset_countdown: u32,
    /// When false, the core never reports `S_HALT` again after a resume —
    /// used to exercise the algorithm-invocation timeout path.
    pub auto_halt_on_resume: bool,
    /// When set, every simulated algorithm run halts with R0 forced to this
    /// value instead of echoing back whatever was last written to R0 —
    /// stands in for a flash algorithm's actual return value, since the
    /// mock never executes real code.
    pub force_r0_on_halt: Option<u32>,

    /// Count of writes to `SELECT`, shared so a test can still read it once
    /// the probe has been moved into a `Box<dyn RawDapAccess>`.
    select_writes: Rc<Cell<u32>>,
    disconnected: Rc<Cell<bool>>,
}

impl MockProbe {
    pub fn new() -> Self {
        MockProbe {
            dpidr: 0x2BA0_1477,
            idr: 0x2400_0000,
            base: 0xE00F_F001,
            ctrl: 0,
            select: 0,
            csw: 0,
            tar: 0,
            memory: HashMap::new(),
            core_regs: HashMap::new(),
            dcrdr_scratch: 0,
            debugen: false,
            halted: false,
            vc_corereset: false,
            reset_countdown: 0,
            auto_halt_on_resume: true,
            force_r0_on_halt: None,
            select_writes: Rc::new(Cell::new(0)),
            disconnected: Rc::new(Cell::new(false)),
        }
    }

    /// A handle that keeps reporting the live `SELECT` write count after
    /// `self` has been boxed into a `Box<dyn RawDapAccess>`.
    pub fn select_writes_handle(&self) -> Rc<Cell<u32>> {
        self.select_writes.clone()
    }

    /// A handle that reports whether `disconnect()` was ever called.
    pub fn disconnected_handle(&self) -> Rc<Cell<bool>> {
        self.disconnected.clone()
    }

    fn read_memory(&self, address: u32) -> u32 {
        match address {
            DHCSR => self.dhcsr_value(),
            DEMCR => {
                if self.vc_corereset {
                    1
                } else {
                    0
                }
            }
            DCRDR => self.dcrdr_scratch,
            _ => *self.memory.get(&address).unwrap_or(&0),
        }
    }

    fn write_memory(&mut self, address: u32, value: u32) {
        match address {
            DHCSR => {
                let c_halt = value & (1 << 1) != 0;
                let was_halted = self.halted;
                self.debugen = value & 1 != 0;
                if c_halt {
                    self.halted = true;
                } else if self.debugen && was_halted {
                    // A resume: only a core that was actually halted can run
                    // again, so a plain "enable debug" write never flips this.
                    self.halted = self.auto_halt_on_resume;
                    if self.halted {
                        if let Some(r0) = self.force_r0_on_halt {
                            self.core_regs.insert(0, r0);
                        }
                    }
                }
            }
            DEMCR => self.vc_corereset = value & 1 != 0,
            AIRCR => {
                if value & (1 << 2) != 0 {
                    self.reset_countdown = 2;
                    self.halted = false;
                }
            }
            DCRDR => self.dcrdr_scratch = value,
            DCRSR => {
                let index = value & 0x1F;
                let is_write = value & (1 << 16) != 0;
                if is_write {
                    self.core_regs.insert(index, self.dcrdr_scratch);
                } else {
                    self.dcrdr_scratch = *self.core_regs.get(&index).unwrap_or(&0);
                }
            }
            _ => {
                self.memory.insert(address, value);
            }
        }
    }

    fn dhcsr_value(&mut self) -> u32 {
        let mut resetting = false;
        if self.reset_countdown > 0 {
            self.reset_countdown -= 1;
            resetting = self.reset_countdown > 0;
            if !resetting && self.vc_corereset {
                self.halted = true;
            }
        }
        let mut value = 0u32;
        if resetting {
            value |= 1 << 25;
        }
        if self.halted {
            value |= 1 << 17;
        }
        value |= 1 << 16; // S_REGRDY: the mock never delays a register access.
        if self.debugen {
            value |= 1;
        }
        value
    }
}

impl Default for MockProbe {
    fn default() -> Self {
        MockProbe::new()
    }
}

impl RawDapAccess for MockProbe {
    fn raw_read_register(&mut self, port: PortKind, address: u8) -> Result<u32, DebugProbeError> {
        match port {
            PortKind::Dp => Ok(match address {
                0x0 => self.dpidr,
                0x4 => self.ctrl,
                0x8 => self.select,
                _ => 0,
            }),
            PortKind::Ap => match address {
                CSW_ADDR => Ok(self.csw),
                TAR_ADDR => Ok(self.tar),
                DRW_ADDR => {
                    let value = self.read_memory(self.tar);
                    self.tar = self.tar.wrapping_add(4);
                    Ok(value)
                }
                0xF8 => Ok(self.base),
                0xFC => Ok(self.idr),
                _ => Ok(0),
            },
        }
    }

    fn raw_write_register(
        &mut self,
        port: PortKind,
        address: u8,
        value: u32,
    ) -> Result<(), DebugProbeError> {
        match port {
            PortKind::Dp => {
                match address {
                    // Ack power-up immediately and report a healthy
                    // transaction status (READ_OK set, STICKYERR clear) so
                    // `connect()`'s health check passes against a mock DP.
                    0x4 => self.ctrl = value | (1 << 31) | (1 << 29) | (1 << 6),
                    0x8 => {
                        self.select = value;
                        self.select_writes.set(self.select_writes.get() + 1);
                    }
                    _ => {}
                }
                Ok(())
            }
            PortKind::Ap => {
                match address {
                    CSW_ADDR => self.csw = value,
                    TAR_ADDR => self.tar = value,
                    DRW_ADDR => {
                        self.write_memory(self.tar, value);
                        self.tar = self.tar.wrapping_add(4);
                    }
                    _ => {}
                }
                Ok(())
            }
        }
    }

    fn raw_read_block(
        &mut self,
        port: PortKind,
        address: u8,
        values: &mut [u32],
    ) -> Result<(), DebugProbeError> {
        for v in values.iter_mut() {
            *v = self.raw_read_register(port, address)?;
        }
        Ok(())
    }

    fn raw_write_block(
        &mut self,
        port: PortKind,
        address: u8,
        values: &[u32],
    ) -> Result<(), DebugProbeError> {
        for &v in values {
            self.raw_write_register(port, address, v)?;
        }
        Ok(())
    }

    fn target_reset_assert(&mut self) -> Result<(), DebugProbeError> {
        Ok(())
    }

    fn target_reset_deassert(&mut self) -> Result<(), DebugProbeError> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DebugProbeError> {
        self.disconnected.set(true);
        Ok(())
    }
}
