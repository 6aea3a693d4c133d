//! High level debug-port bring-up: the sequence of operations a session
//! runs once after a probe attaches, before any flashing work starts.

use super::communication_interface::ArmCommunicationInterface;
use super::core::cortex_m;
use super::romtable::{self, Component, ComponentEntry};
use super::ArmError;

/// The set of CoreSight component base addresses discovered for the
/// attached core.
#[derive(Debug, Clone)]
pub struct DebugComponents {
    pub entries: Vec<ComponentEntry>,
}

impl DebugComponents {
    pub fn scs_base(&self) -> Option<u32> {
        Component::find(&self.entries, Component::Scs)
    }
}

/// Bring up the debug port: connect the DP, read the AHB-AP's `BASE`
/// register, walk the ROM table it points to, and enable halting debug on
/// the core.
pub fn connect_and_discover(
    iface: &mut ArmCommunicationInterface,
) -> Result<DebugComponents, ArmError> {
    iface.connect()?;

    let idr = iface.read_idr()?;
    tracing::info!("AHB-AP IDR: {:?}", idr);

    let base = iface.read_base()?;
    if !base.present() {
        return Err(ArmError::RomTableEntryNotPresent(0));
    }
    let table_base = base.base_address() << 12;

    let entries = romtable::walk(iface, table_base)?;
    cortex_m::core_start(iface)?;

    Ok(DebugComponents { entries })
}
