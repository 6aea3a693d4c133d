//! A narrow reader for the parts of a PDSC (Device Pack Descriptor) XML
//! document the flash loader needs: the device's SRAM region and the flash
//! algorithm(s) bound to it. Everything else in a PDSC is opaque metadata
//! owned by the front-end, not parsed here.

use super::error::FlashError;

/// The Cortex-M SRAM alias bit: every RAM region usable for algorithm
/// placement has this bit set in its start address.
const SRAM_ALIAS_BIT: u32 = 0x2000_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RamRegion {
    pub start: u32,
    pub size: u32,
}

/// A `<algorithm>` entry bound to a device: the FLM file to load and the RAM
/// region it should be placed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlgorithmBinding {
    pub file_name: String,
    pub ram: RamRegion,
}

/// Find the named device's RAM region and algorithm bindings in a PDSC
/// document.
pub fn device_algorithms(
    pdsc_xml: &str,
    device_name: &str,
) -> Result<Vec<AlgorithmBinding>, FlashError> {
    let doc = roxmltree::Document::parse(pdsc_xml).map_err(|_| FlashError::NoRamRegion)?;

    let device = doc
        .descendants()
        .find(|n| n.has_tag_name("device") && n.attribute("Dname") == Some(device_name))
        .ok_or(FlashError::NoRamRegion)?;

    let ram = device
        .descendants()
        .filter(|n| n.has_tag_name("memory"))
        .filter_map(|n| {
            let start = parse_hex(n.attribute("start")?)?;
            let size = parse_hex(n.attribute("size")?)?;
            Some(RamRegion { start, size })
        })
        .find(|region| region.start & SRAM_ALIAS_BIT != 0)
        .ok_or(FlashError::NoRamRegion)?;

    let bindings = device
        .descendants()
        .filter(|n| n.has_tag_name("algorithm"))
        .filter_map(|n| {
            Some(AlgorithmBinding {
                file_name: n.attribute("file_name")?.to_string(),
                ram,
            })
        })
        .collect();

    Ok(bindings)
}

fn parse_hex(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <package>
          <devices>
            <device Dname="STM32F103C8">
              <memory id="IRAM1" start="0x20000000" size="0x5000" />
              <memory id="IROM1" start="0x08000000" size="0x10000" />
              <algorithm name="STM32F1xx_512.FLM" file_name="Flash/STM32F1xx_512.FLM"
                         start="0x08000000" size="0x10000" default="1" />
            </device>
          </devices>
        </package>
    "#;

    #[test]
    fn finds_sram_region_and_algorithm() {
        let bindings = device_algorithms(SAMPLE, "STM32F103C8").unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].file_name, "Flash/STM32F1xx_512.FLM");
        assert_eq!(bindings[0].ram.start, 0x2000_0000);
        assert_eq!(bindings[0].ram.size, 0x5000);
    }

    #[test]
    fn unknown_device_errors() {
        assert!(device_algorithms(SAMPLE, "nonexistent").is_err());
    }
}
