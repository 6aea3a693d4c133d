//! The CMSIS-DAP probe driver: session state, the SWD connect sequence, and
//! the raw register/block access primitives the ADIv5 engine builds on.

pub mod commands;
mod device;
mod tools;

use std::time::Duration;

use commands::general::{self, Capabilities, ConnectRequest, ConnectResponse};
use commands::swd;
use commands::swj::{self, Pins};
use commands::transfer::{Ack, BlockAccess, InnerTransferRequest, PortKind, TransferBlockRequest, TransferRequest};

use crate::probe::{DebugProbeError, DebugProbeInfo, RawDapAccess};
use crate::WireProtocol;

pub use device::CmsisDapDevice;

/// Fixed 128-bit ADIv6 dormant-state selection alert, per the ARM Debug
/// Interface architecture specification. Bytes are sent LSB-first.
const DORMANT_SELECTION_ALERT: [u8; 16] = [
    0x92, 0xF3, 0x09, 0x62, 0x95, 0x2D, 0x85, 0x86, 0xE9, 0xAF, 0xDD, 0xE3, 0xA2, 0x0E, 0xBC, 0x19,
];

/// 8-bit activation code that selects the SWD-DP after the dormant-state
/// selection alert.
const SWD_ACTIVATION_CODE: u8 = 0x1A;

/// The 16-bit JTAG-to-SWD switch sequence (sent LSB first).
const JTAG_TO_SWD_SEQUENCE: u16 = 0xE79E;

/// The 16-bit SWD-to-dormant transition sequence (sent LSB first).
const SWD_TO_DORMANT_SEQUENCE: u16 = 0xE3BC;

/// The 40-bit JTAG-to-dormant transition sequence, sent LSB first (the low
/// 32 bits are `0x33BBBBBA`, padded with one all-zero byte to reach 40
/// bits).
const JTAG_TO_DORMANT_SEQUENCE: [u8; 5] = [0xBA, 0xBB, 0xBB, 0x33, 0x00];

const MAX_WAIT_RETRIES: usize = 8;

/// A handle to an attached CMSIS-DAP debug probe.
pub struct CmsisDap {
    device: CmsisDapDevice,
    firmware_version: String,
    capabilities: Capabilities,
    packet_count: u8,
    protocol: Option<WireProtocol>,
    connected: bool,
    speed_khz: u32,
}

impl std::fmt::Debug for CmsisDap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsisDap")
            .field("firmware_version", &self.firmware_version)
            .field("capabilities", &self.capabilities)
            .field("protocol", &self.protocol)
            .finish()
    }
}

/// Enumerate every CMSIS-DAP probe currently visible over USB.
pub fn list_probes() -> Vec<DebugProbeInfo> {
    tools::list_cmsisdap_devices()
}

impl CmsisDap {
    /// Open a specific USB device as a CMSIS-DAP v2 (bulk) probe and query
    /// its capabilities and packet limits.
    pub fn open(raw: &rusb::Device<rusb::Context>) -> Result<Self, DebugProbeError> {
        let mut device = tools::open_bulk_device(raw)?;
        device.drain();
        Self::from_device(device)
    }

    fn from_device(mut device: CmsisDapDevice) -> Result<Self, DebugProbeError> {
        let firmware_version = general::firmware_version(&mut device).unwrap_or_default();
        let capabilities = general::capabilities(&mut device)?;
        let packet_count = general::packet_count(&mut device).unwrap_or(1);

        tracing::info!(
            "opened CMSIS-DAP probe, firmware {firmware_version:?}, capabilities {capabilities:?}"
        );

        Ok(CmsisDap {
            device,
            firmware_version,
            capabilities,
            packet_count,
            protocol: None,
            connected: false,
            speed_khz: 1_000,
        })
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Select which wire protocol subsequent `attach` calls should use.
    pub fn select_protocol(&mut self, protocol: WireProtocol) -> Result<(), DebugProbeError> {
        match protocol {
            WireProtocol::Swd if self.capabilities.swd => {
                self.protocol = Some(protocol);
                Ok(())
            }
            WireProtocol::Jtag if self.capabilities.jtag => {
                self.protocol = Some(protocol);
                Ok(())
            }
            other => Err(DebugProbeError::UnsupportedProtocol(other)),
        }
    }

    /// Ask the probe to drive a given SWCLK frequency. The probe clamps to
    /// whatever it can actually generate.
    pub fn set_speed(&mut self, speed_khz: u32) -> Result<(), DebugProbeError> {
        let _: swj::ClockResponse =
            commands::send_command(&mut self.device, &swj::ClockRequest(speed_khz * 1_000))?;
        self.speed_khz = speed_khz;
        Ok(())
    }

    /// Run the full connect sequence: select the protocol, line-reset,
    /// switch the target debug port into SWD, and configure transfer
    /// retries and turnaround timing (spec §4.3 / §4.4).
    pub fn attach(&mut self) -> Result<(), DebugProbeError> {
        self.connect_if_needed()?;
        self.set_speed(self.speed_khz)?;

        let _: commands::transfer::ConfigureResponse = commands::send_command(
            &mut self.device,
            &commands::transfer::ConfigureRequest::default(),
        )?;

        self.configure_swd()?;
        self.switch_to_swd()?;

        let _: Result<general::HostStatusResponse, _> =
            commands::send_command(&mut self.device, &general::HostStatusRequest::connected(true));

        self.connected = true;
        Ok(())
    }

    pub fn detach(&mut self) -> Result<(), DebugProbeError> {
        let response: general::DisconnectResponse =
            commands::send_command(&mut self.device, &general::DisconnectRequest)?;
        let _: Result<general::HostStatusResponse, _> = commands::send_command(
            &mut self.device,
            &general::HostStatusRequest::connected(false),
        );
        self.connected = false;
        match response.0 {
            commands::Status::DapOk => Ok(()),
            commands::Status::DapError => Err(DebugProbeError::ProbeProtocol(
                "probe rejected DAP_Disconnect".into(),
            )),
        }
    }

    fn connect_if_needed(&mut self) -> Result<(), DebugProbeError> {
        if self.connected {
            return Ok(());
        }
        let request = match self.protocol {
            Some(WireProtocol::Swd) => ConnectRequest::Swd,
            Some(WireProtocol::Jtag) => ConnectRequest::Jtag,
            None => ConnectRequest::DefaultPort,
        };
        let response: ConnectResponse = commands::send_command(&mut self.device, &request)?;
        self.protocol = Some(match response {
            ConnectResponse::SuccessfulInitForSwd => WireProtocol::Swd,
            ConnectResponse::SuccessfulInitForJtag => WireProtocol::Jtag,
            ConnectResponse::InitFailed => {
                return Err(DebugProbeError::ProbeProtocol(
                    "DAP_Connect reported init failure".into(),
                ))
            }
        });
        Ok(())
    }

    fn configure_swd(&mut self) -> Result<(), DebugProbeError> {
        let _: swd::ConfigureResponse =
            commands::send_command(&mut self.device, &swd::ConfigureRequest::default())?;
        Ok(())
    }

    fn swj_sequence(&mut self, bit_count: u16, data: &[u8]) -> Result<(), DebugProbeError> {
        let _: swj::SequenceResponse = commands::send_command(
            &mut self.device,
            &swj::SequenceRequest { bit_count, data },
        )?;
        Ok(())
    }

    /// At least 50 SWCLK cycles with SWDIO high, per the ADIv5 line reset
    /// requirement, followed by >=8 idle cycles.
    fn line_reset(&mut self) -> Result<(), DebugProbeError> {
        self.swj_sequence(51, &[0xFF; 7])?;
        self.swj_sequence(8, &[0x00])
    }

    /// Bring the target debug port up in SWD mode, covering both the legacy
    /// JTAG-to-SWD switch sequence and, as a fallback, the ADIv6 dormant
    /// state activation sequence.
    fn switch_to_swd(&mut self) -> Result<(), DebugProbeError> {
        self.line_reset()?;
        self.swj_sequence(16, &JTAG_TO_SWD_SEQUENCE.to_le_bytes())?;
        self.line_reset()?;
        self.swj_sequence(8, &[0x00])?;

        // Probing an ADIv6 dormant-state target: drop out of whichever
        // interface might still be selected (SWD-to-dormant, line-reset,
        // JTAG-to-dormant), then 8 idle-high cycles, the fixed selection
        // alert, 4 idle-low cycles, and the SWD activation code.
        if self.read_dpidr().is_err() {
            tracing::debug!("legacy SWD switch failed, trying dormant-state activation");
            self.line_reset()?;
            self.swj_sequence(16, &SWD_TO_DORMANT_SEQUENCE.to_le_bytes())?;
            self.line_reset()?;
            self.swj_sequence(40, &JTAG_TO_DORMANT_SEQUENCE)?;
            self.swj_sequence(8, &[0xFF])?;
            self.swj_sequence(128, &DORMANT_SELECTION_ALERT)?;
            self.swj_sequence(4, &[0x00])?;
            self.swj_sequence(8, &[SWD_ACTIVATION_CODE])?;
            self.line_reset()?;
        }
        Ok(())
    }

    fn read_dpidr(&mut self) -> Result<u32, DebugProbeError> {
        self.raw_read_register(PortKind::Dp, 0x00)
    }

    /// Toggle `nRESET` through `DAP_SWJ_Pins`.
    fn set_reset_pin(&mut self, asserted: bool) -> Result<(), DebugProbeError> {
        let mut select = Pins::none();
        select.set_nreset(true);
        let mut output = Pins::none();
        output.set_nreset(!asserted);
        let _: swj::PinsResponse = commands::send_command(
            &mut self.device,
            &swj::PinsRequest {
                output,
                select,
                wait_us: 0,
            },
        )?;
        Ok(())
    }

    /// Drain one round of `WAIT` acks, sleeping briefly between attempts;
    /// the probe itself already retries per its `TransferConfigure`
    /// `wait_retry` setting, this is the host-side backstop.
    fn retry_on_wait<T>(
        &mut self,
        mut attempt: impl FnMut(&mut Self) -> Result<(Ack, T), DebugProbeError>,
    ) -> Result<T, DebugProbeError> {
        for _ in 0..MAX_WAIT_RETRIES {
            let (ack, value) = attempt(self)?;
            match ack {
                Ack::Ok => return Ok(value),
                Ack::Wait => std::thread::sleep(Duration::from_micros(100)),
                Ack::Fault => {
                    return Err(DebugProbeError::ProbeProtocol(
                        "transfer acknowledged FAULT".into(),
                    ))
                }
                Ack::ProtocolError => {
                    return Err(DebugProbeError::ProbeProtocol(
                        "SWD protocol error (parity or framing)".into(),
                    ))
                }
                Ack::ValueMismatch => {
                    return Err(DebugProbeError::ProbeProtocol(
                        "value-match transfer mismatched".into(),
                    ))
                }
                Ack::NoAck => {
                    return Err(DebugProbeError::ProbeProtocol(
                        "target did not respond (NO_ACK)".into(),
                    ))
                }
            }
        }
        Err(DebugProbeError::ProbeProtocol(
            "exceeded retry budget waiting on WAIT acknowledge".into(),
        ))
    }
}

impl RawDapAccess for CmsisDap {
    fn raw_read_register(&mut self, port: PortKind, address: u8) -> Result<u32, DebugProbeError> {
        self.retry_on_wait(|this| {
            let item = InnerTransferRequest {
                port,
                address,
                write: None,
            };
            let response: commands::transfer::TransferResponse = commands::send_command(
                &mut this.device,
                &TransferRequest {
                    dap_index: 0,
                    items: std::slice::from_ref(&item),
                },
            )?;
            let value = *response.reads.first().ok_or_else(|| {
                DebugProbeError::ProbeProtocol("read transfer returned no data".into())
            })?;
            Ok((response.ack, value))
        })
    }

    fn raw_write_register(
        &mut self,
        port: PortKind,
        address: u8,
        value: u32,
    ) -> Result<(), DebugProbeError> {
        self.retry_on_wait(|this| {
            let item = InnerTransferRequest {
                port,
                address,
                write: Some(value),
            };
            let response: commands::transfer::TransferResponse = commands::send_command(
                &mut this.device,
                &TransferRequest {
                    dap_index: 0,
                    items: std::slice::from_ref(&item),
                },
            )?;
            Ok((response.ack, ()))
        })
    }

    fn raw_read_block(
        &mut self,
        port: PortKind,
        address: u8,
        values: &mut [u32],
    ) -> Result<(), DebugProbeError> {
        let max_words = (self.device.max_packet_size().saturating_sub(4)) / 4;
        for chunk in values.chunks_mut(max_words.max(1)) {
            let count = chunk.len() as u16;
            let response: commands::transfer::TransferBlockResponse = self.retry_on_wait(|this| {
                let response: commands::transfer::TransferBlockResponse = commands::send_command(
                    &mut this.device,
                    &TransferBlockRequest {
                        dap_index: 0,
                        access: BlockAccess::Read {
                            port,
                            address,
                            count,
                        },
                    },
                )?;
                let ack = response.ack;
                Ok((ack, response))
            })?;
            chunk.copy_from_slice(&response.reads[..chunk.len()]);
        }
        Ok(())
    }

    fn raw_write_block(
        &mut self,
        port: PortKind,
        address: u8,
        values: &[u32],
    ) -> Result<(), DebugProbeError> {
        let max_words = (self.device.max_packet_size().saturating_sub(4)) / 4;
        for chunk in values.chunks(max_words.max(1)) {
            self.retry_on_wait(|this| {
                let response: commands::transfer::TransferBlockResponse = commands::send_command(
                    &mut this.device,
                    &TransferBlockRequest {
                        dap_index: 0,
                        access: BlockAccess::Write {
                            port,
                            address,
                            data: chunk,
                        },
                    },
                )?;
                Ok((response.ack, ()))
            })?;
        }
        Ok(())
    }

    fn target_reset_assert(&mut self) -> Result<(), DebugProbeError> {
        self.set_reset_pin(true)
    }

    fn target_reset_deassert(&mut self) -> Result<(), DebugProbeError> {
        self.set_reset_pin(false)
    }

    fn disconnect(&mut self) -> Result<(), DebugProbeError> {
        self.detach()
    }
}
