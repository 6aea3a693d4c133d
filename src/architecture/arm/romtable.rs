//! CoreSight ROM table walking.
//!
//! Every Cortex-M debug component (SCS, DWT, FPB, ITM, TPIU, ETM) advertises
//! its base address through a fixed-layout ROM table rooted at the AHB-AP's
//! `BASE` register. The table is a flat array of 32-bit entries; bit 0 of
//! each entry is a presence flag, and the rest (masked to a 4 KiB page) is
//! an offset from the table's own base address.

use super::communication_interface::ArmCommunicationInterface;
use super::ArmError;

/// The Cortex-M debug components this driver cares about, in the fixed
/// order they appear in a standard Cortex-M ROM table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Component {
    Scs,
    Dwt,
    Fpb,
    Itm,
    Tpiu,
    Etm,
}

const LAYOUT: [Component; 6] = [
    Component::Scs,
    Component::Dwt,
    Component::Fpb,
    Component::Itm,
    Component::Tpiu,
    Component::Etm,
];

/// A component discovered in the ROM table, with its resolved absolute
/// base address.
#[derive(Copy, Clone, Debug)]
pub struct ComponentEntry {
    pub component: Component,
    pub base_address: u32,
}

/// Walk the ROM table rooted at `table_base`, returning every entry marked
/// present.
///
/// `table_base` is the value read from the AHB-AP's `BASE` register with
/// the format/present bits already stripped off by the caller.
pub fn walk(
    memory: &mut ArmCommunicationInterface,
    table_base: u32,
) -> Result<Vec<ComponentEntry>, ArmError> {
    let mut found = Vec::new();

    for (index, component) in LAYOUT.iter().enumerate() {
        let entry_address = table_base + (index as u32) * 4;
        let raw = memory.read_word_32(entry_address)?;

        let present = raw & 0x1 != 0;
        if !present {
            tracing::debug!("ROM table entry {index} ({component:?}) not present");
            continue;
        }

        let offset = (raw & !0xFFF) as i32;
        let base_address = (table_base as i64 + offset as i64) as u32;
        tracing::debug!("ROM table entry {index}: {component:?} at {base_address:#010x}");

        found.push(ComponentEntry {
            component: *component,
            base_address,
        });
    }

    Ok(found)
}

impl Component {
    pub fn find(entries: &[ComponentEntry], component: Component) -> Option<u32> {
        entries
            .iter()
            .find(|e| e.component == component)
            .map(|e| e.base_address)
    }
}
