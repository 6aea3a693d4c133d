//! USB enumeration: finding the CMSIS-DAP endpoint pair.
//!
//! The transport requires exactly one bulk IN and one bulk OUT endpoint in a
//! single interface whose interface string contains, case-insensitively,
//! "DAP". Interface class `0xFF` indicates vendor/WinUSB framing (frames
//! sent verbatim); class `0x03` indicates HID framing (fixed-size padding).

use std::time::Duration;

use crate::probe::{DebugProbeError, DebugProbeInfo};

use super::device::CmsisDapDevice;

const USB_CLASS_HID: u8 = 0x03;
const USB_CLASS_VENDOR: u8 = 0xFF;

fn is_cmsis_dap(s: &str) -> bool {
    s.to_ascii_lowercase().contains("dap")
}

/// Enumerate connected USB devices, returning every interface that looks
/// like a CMSIS-DAP probe.
pub fn list_cmsisdap_devices() -> Vec<DebugProbeInfo> {
    let Ok(context) = rusb::Context::new() else {
        tracing::warn!("failed to create a libusb context");
        return Vec::new();
    };

    let Ok(devices) = context.devices() else {
        return Vec::new();
    };

    let mut probes = Vec::new();
    for device in devices.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        let Ok(handle) = device.open() else {
            continue;
        };

        let languages = handle.read_languages(Duration::from_millis(100)).ok();
        let Some(lang) = languages.and_then(|l| l.first().copied()) else {
            continue;
        };

        let product = handle
            .read_product_string(lang, &descriptor, Duration::from_millis(100))
            .unwrap_or_default();
        let serial = handle
            .read_serial_number_string(lang, &descriptor, Duration::from_millis(100))
            .ok();

        let Ok(config) = device.active_config_descriptor() else {
            continue;
        };

        let interface_matches = config.interfaces().any(|iface| {
            iface.descriptors().any(|desc| {
                desc.description_string_index()
                    .and_then(|idx| {
                        handle
                            .read_string_descriptor(lang, idx, Duration::from_millis(100))
                            .ok()
                    })
                    .is_some_and(|s| is_cmsis_dap(&s))
            })
        });

        if interface_matches || is_cmsis_dap(&product) {
            probes.push(DebugProbeInfo {
                identifier: product,
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                serial_number: serial,
            });
        }
    }

    probes
}

/// Open the first CMSIS-DAP interface found on `device`, returning a bulk
/// (v2) transport.
///
/// Selects the single interface whose string descriptor contains "DAP",
/// requiring it to expose exactly one bulk IN and one bulk OUT endpoint.
pub fn open_bulk_device(
    device: &rusb::Device<rusb::Context>,
) -> Result<CmsisDapDevice, DebugProbeError> {
    let config = device
        .active_config_descriptor()
        .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;

    let mut handle = device
        .open()
        .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;

    let lang = handle
        .read_languages(Duration::from_millis(100))
        .ok()
        .and_then(|l| l.first().copied())
        .ok_or_else(|| DebugProbeError::TransportIo("no USB string languages".into()))?;

    for interface in config.interfaces() {
        for desc in interface.descriptors() {
            let is_dap = desc
                .description_string_index()
                .and_then(|idx| {
                    handle
                        .read_string_descriptor(lang, idx, Duration::from_millis(100))
                        .ok()
                })
                .is_some_and(|s| is_cmsis_dap(&s));

            if !is_dap || desc.class_code() != USB_CLASS_VENDOR {
                continue;
            }

            let mut out_ep = None;
            let mut in_ep = None;
            let mut max_packet_size = 0usize;
            for ep in desc.endpoint_descriptors() {
                if ep.transfer_type() != rusb::TransferType::Bulk {
                    continue;
                }
                max_packet_size = max_packet_size.max(ep.max_packet_size() as usize);
                match ep.direction() {
                    rusb::Direction::Out => out_ep = Some(ep.address()),
                    rusb::Direction::In => in_ep = Some(ep.address()),
                }
            }

            if let (Some(out_ep), Some(in_ep)) = (out_ep, in_ep) {
                handle
                    .claim_interface(interface.number())
                    .map_err(|e| DebugProbeError::TransportIo(e.to_string()))?;

                return Ok(CmsisDapDevice::V2 {
                    handle,
                    out_ep,
                    in_ep,
                    max_packet_size,
                });
            }
        }
    }

    Err(DebugProbeError::UnableToOpenProbe(
        "no interface exposing a DAP bulk endpoint pair was found",
    ))
}
