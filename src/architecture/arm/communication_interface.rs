//! The ADIv5 DP/AP transaction engine: SELECT bank caching, the debug port
//! connect sequence, and word/block memory access through the AHB-AP.

use crate::probe::{PortKind, RawDapAccess};

use super::ap::{Csw, Drw, Idr, Tar};
use super::dp::{Abort, Ctrl, Dpidr, Select};
use super::{ArmError, Register};

/// The single AHB-AP's register address is fixed at 0 for every target this
/// driver supports (spec scope: a single memory access port).
const AP_SELECT: u8 = 0;

/// The literal CSW value the ADIv5 connect sequence programs once debug and
/// system power-up have acked (connect step 6), independent of whatever CSW
/// configuration later memory accesses program through `ensure_word_csw`.
const CONNECT_CSW: u32 = 0x2300_0052;

/// Drives the DP and a single AHB-AP over a [`RawDapAccess`] probe,
/// maintaining the `SELECT` register bank cache so repeated accesses to the
/// same bank don't re-issue a write that would have no effect.
pub struct ArmCommunicationInterface {
    probe: Box<dyn RawDapAccess>,
    current_select: Option<Select>,
    current_ap_csw: Option<Csw>,
}

impl ArmCommunicationInterface {
    pub fn new(probe: Box<dyn RawDapAccess>) -> Self {
        ArmCommunicationInterface {
            probe,
            current_select: None,
            current_ap_csw: None,
        }
    }

    /// Run the ADIv5 connect sequence: read DPIDR, clear any sticky errors
    /// via ABORT, power up the debug and system domains through CTRL/STAT,
    /// and wait for both power-up acks to latch.
    pub fn connect(&mut self) -> Result<Dpidr, ArmError> {
        let dpidr = self.read_dp_register::<Dpidr>()?;
        tracing::debug!("DPIDR: {:?} ({})", dpidr, dpidr.jep106());

        let mut abort = Abort::default();
        abort.set_stkerrclr(true);
        abort.set_wderrclr(true);
        abort.set_orunerrclr(true);
        abort.set_stkcmpclr(true);
        self.write_dp_register(abort)?;

        let mut ctrl = Ctrl::default();
        ctrl.set_csyspwrupreq(true);
        ctrl.set_cdbgpwrupreq(true);
        self.write_dp_register(ctrl)?;

        for _ in 0..32 {
            let ctrl = self.read_dp_register::<Ctrl>()?;
            if ctrl.csyspwrupack() && ctrl.cdbgpwrupack() {
                self.health_check()?;
                self.write_ap_register(Csw::from(CONNECT_CSW))?;
                self.current_ap_csw = Some(Csw::from(CONNECT_CSW));
                return Ok(dpidr);
            }
        }
        Err(ArmError::ResetTimeout)
    }

    /// Check CTRL/STAT for a clean bill of health: `STICKYERR` clear and
    /// `READOK` set. An unhealthy DP means the next transaction would
    /// silently build on a stale error.
    fn health_check(&mut self) -> Result<(), ArmError> {
        let ctrl = self.read_dp_register::<Ctrl>()?;
        if ctrl.is_healthy() {
            Ok(())
        } else {
            Err(ArmError::StickyError)
        }
    }

    fn read_dp_register<R: Register>(&mut self) -> Result<R, ArmError> {
        self.select_dp_bank()?;
        let value = self.probe.raw_read_register(PortKind::Dp, R::ADDRESS)?;
        Ok(R::from(value))
    }

    fn write_dp_register<R: Register>(&mut self, register: R) -> Result<(), ArmError> {
        self.select_dp_bank()?;
        self.probe
            .raw_write_register(PortKind::Dp, R::ADDRESS, register.into())?;
        Ok(())
    }

    /// On ADIv5, only address 0x4 is banked, the rest are don't care; every
    /// legacy DP register this driver touches (ABORT/CTRL/SELECT/RDBUFF/
    /// DPIDR) lives in bank 0, so the bank is fixed rather than derived from
    /// a register's own wire address.
    fn select_dp_bank(&mut self) -> Result<(), ArmError> {
        let needs_select = match &self.current_select {
            Some(s) => s.dp_bank_sel() != 0,
            None => true,
        };
        if needs_select {
            let mut select = self.current_select.clone().unwrap_or_default();
            select.set_dp_bank_sel(0);
            self.probe
                .raw_write_register(PortKind::Dp, Select::ADDRESS, select.clone().into())?;
            self.current_select = Some(select);
        }
        Ok(())
    }

    fn select_ap_bank(&mut self, address: u8) -> Result<(), ArmError> {
        let bank = address & 0xF0;
        let mut select = self.current_select.clone().unwrap_or_default();
        if select.ap_sel() != AP_SELECT || select.ap_bank_sel() != (bank >> 4) {
            select.set_ap_sel(AP_SELECT);
            select.set_ap_bank_sel(bank >> 4);
            self.probe
                .raw_write_register(PortKind::Dp, Select::ADDRESS, select.clone().into())?;
            self.current_select = Some(select);
        }
        Ok(())
    }

    fn read_ap_register<R: Register>(&mut self) -> Result<R, ArmError> {
        self.select_ap_bank(R::ADDRESS)?;
        let value = self.probe.raw_read_register(PortKind::Ap, R::ADDRESS)?;
        Ok(R::from(value))
    }

    fn write_ap_register<R: Register>(&mut self, register: R) -> Result<(), ArmError> {
        self.select_ap_bank(R::ADDRESS)?;
        self.probe
            .raw_write_register(PortKind::Ap, R::ADDRESS, register.into())?;
        Ok(())
    }

    /// Ensure CSW is configured for 32-bit auto-incrementing transfers
    /// before doing any TAR/DRW access, skipping the write if it's already
    /// in that state.
    fn ensure_word_csw(&mut self) -> Result<(), ArmError> {
        let target = Csw::for_word_access();
        let current_raw: Option<u32> = self.current_ap_csw.as_ref().map(|c| u32::from(c.clone()));
        if current_raw != Some(u32::from(target.clone())) {
            self.write_ap_register(target.clone())?;
            self.current_ap_csw = Some(target);
        }
        Ok(())
    }

    pub fn read_idr(&mut self) -> Result<Idr, ArmError> {
        self.read_ap_register::<Idr>()
    }

    pub fn read_base(&mut self) -> Result<super::ap::Base, ArmError> {
        self.read_ap_register::<super::ap::Base>()
    }

    /// Read a single 32-bit word from target memory.
    pub fn read_word_32(&mut self, address: u32) -> Result<u32, ArmError> {
        self.ensure_word_csw()?;
        self.write_ap_register(Tar::from(address))?;
        Ok(self.read_ap_register::<Drw>()?.data())
    }

    /// Write a single 32-bit word to target memory.
    pub fn write_word_32(&mut self, address: u32, data: u32) -> Result<(), ArmError> {
        self.ensure_word_csw()?;
        self.write_ap_register(Tar::from(address))?;
        self.write_ap_register(Drw::from(data))
    }

    /// Read consecutive 32-bit words starting at `address`, chunked at the
    /// AP's 1 KiB auto-increment boundary and pipelined by the probe layer.
    pub fn read_block_32(&mut self, address: u32, data: &mut [u32]) -> Result<(), ArmError> {
        self.ensure_word_csw()?;
        for (offset, chunk) in chunk_by_autoincrement_boundary(address, data.len()) {
            self.write_ap_register(Tar::from(offset))?;
            self.probe
                .raw_read_block(PortKind::Ap, Drw::ADDRESS, &mut data[chunk])?;
        }
        Ok(())
    }

    /// Write consecutive 32-bit words starting at `address`.
    pub fn write_block_32(&mut self, address: u32, data: &[u32]) -> Result<(), ArmError> {
        self.ensure_word_csw()?;
        for (offset, chunk) in chunk_by_autoincrement_boundary(address, data.len()) {
            self.write_ap_register(Tar::from(offset))?;
            self.probe
                .raw_write_block(PortKind::Ap, Drw::ADDRESS, &data[chunk])?;
        }
        Ok(())
    }

    pub fn probe_mut(&mut self) -> &mut dyn RawDapAccess {
        self.probe.as_mut()
    }
}

/// The AHB-AP auto-increments TAR only within a 1 KiB (0x400-byte) window;
/// crossing that boundary within one block transfer wraps TAR back to its
/// start, corrupting the access. Split the request accordingly.
const AUTOINCREMENT_BOUNDARY: u32 = 0x400;

fn chunk_by_autoincrement_boundary(
    start_address: u32,
    word_count: usize,
) -> Vec<(u32, std::ops::Range<usize>)> {
    let mut chunks = Vec::new();
    let mut address = start_address;
    let mut index = 0usize;
    while index < word_count {
        let bytes_to_boundary = AUTOINCREMENT_BOUNDARY - (address % AUTOINCREMENT_BOUNDARY);
        let words_to_boundary = (bytes_to_boundary / 4) as usize;
        let take = words_to_boundary.min(word_count - index);
        chunks.push((address, index..index + take));
        address += (take * 4) as u32;
        index += take;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::MockProbe;

    #[test]
    fn boundary_chunking_splits_on_1kib() {
        let chunks = chunk_by_autoincrement_boundary(0x3F0, 8);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], (0x3F0, 0..4));
        assert_eq!(chunks[1], (0x400, 4..8));
    }

    #[test]
    fn boundary_chunking_single_chunk_when_aligned() {
        let chunks = chunk_by_autoincrement_boundary(0x1000, 16);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], (0x1000, 0..16));
    }

    fn connected_interface() -> ArmCommunicationInterface {
        let probe = MockProbe::new();
        let mut iface = ArmCommunicationInterface::new(Box::new(probe));
        iface.connect().expect("mock connect always succeeds");
        iface
    }

    /// Reading two registers in the same DP bank must only write `SELECT`
    /// once; reading a register in a different bank must write it again.
    #[test]
    fn select_bank_is_cached_across_same_bank_accesses() {
        let probe = MockProbe::new();
        let select_writes = probe.select_writes_handle();
        let mut iface = ArmCommunicationInterface::new(Box::new(probe));
        iface.connect().unwrap();

        iface.read_dp_register::<Ctrl>().unwrap();
        let after_first = select_writes.get();
        iface.read_dp_register::<Ctrl>().unwrap();
        let after_second = select_writes.get();
        assert_eq!(
            after_first, after_second,
            "second read in the same bank must not re-issue SELECT"
        );

        iface.read_ap_register::<Idr>().unwrap();
        let after_bank_change = select_writes.get();
        assert!(
            after_bank_change > after_second,
            "switching to the AP bank must write SELECT again"
        );
    }

    #[test]
    fn word_write_then_read_round_trips() {
        let mut iface = connected_interface();
        iface.write_word_32(0x2000_0000, 0xdead_beef).unwrap();
        assert_eq!(iface.read_word_32(0x2000_0000).unwrap(), 0xdead_beef);
    }

    #[test]
    fn block_write_then_read_round_trips_across_boundary() {
        let mut iface = connected_interface();
        // 256 words starting just before a 1 KiB auto-increment boundary:
        // this block transfer must span the chunking split and still
        // round-trip correctly.
        let address = 0x2000_03F0;
        let written: Vec<u32> = (0..256).map(|i| i * 7 + 1).collect();
        iface.write_block_32(address, &written).unwrap();

        let mut read_back = vec![0u32; written.len()];
        iface.read_block_32(address, &mut read_back).unwrap();
        assert_eq!(read_back, written);
    }
}
