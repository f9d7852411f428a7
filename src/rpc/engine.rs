//! Protocol engine — dispatches decoded commands against the device state.
//!
//! **Transport-decoupled**: the engine does not own the link. Callers feed
//! one frame at a time via [`ProtocolEngine::handle_frame`] together with a
//! [`Ports`] bundle; every report produced is sent on `ports.link` before
//! the call returns. Periodic work (historic batches, realtime frames, OTA
//! idle timeout, deferred reboot) runs from [`ProtocolEngine::tick`].
//!
//! Long-running operations are mutually exclusive:
//!
//! ```text
//!              REQUEST_HISTORIC          OTA_START
//!  None ─────────────────────▶ Historic    None ───────────▶ Ota
//!    Historic + OTA_START        → ERROR 0x04
//!    Ota + REQUEST_HISTORIC      → ERROR 0x04
//! ```

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::app::ports::Ports;
use crate::app::state::{
    AlarmConfig, DeviceState, MAX_PASS_LEN, MAX_SSID_LEN, persist_wifi_credentials,
};
use crate::config::DeviceConfig;

use super::codec::{
    Command, DecodeError, ErrorCode, PROTOCOL_VERSION, Report, TimeSync, decode_command, opcode,
    to_centi,
};
use super::historic::{HistoricTransfer, StartOutcome};
use super::ota::OtaSession;
use super::stream::RealtimeStream;
use super::transport::Link;

/// Reports produced by a single dispatch.
pub type Reports = heapless::Vec<Report, 2>;

/// Which long-running operation currently owns the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongOperation {
    None,
    Historic,
    Ota,
}

pub struct ProtocolEngine {
    config: DeviceConfig,
    historic: HistoricTransfer,
    ota: OtaSession,
    stream: RealtimeStream,
    /// Uptime at which a committed image should be booted.
    reboot_at_ms: Option<u64>,
}

impl ProtocolEngine {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            historic: HistoricTransfer::new(),
            ota: OtaSession::new(),
            stream: RealtimeStream::new(),
            reboot_at_ms: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn long_operation(&self) -> LongOperation {
        if self.ota.is_receiving() {
            LongOperation::Ota
        } else if self.historic.is_active() {
            LongOperation::Historic
        } else {
            LongOperation::None
        }
    }

    pub fn historic(&self) -> &HistoricTransfer {
        &self.historic
    }

    pub fn ota(&self) -> &OtaSession {
        &self.ota
    }

    pub fn stream(&self) -> &RealtimeStream {
        &self.stream
    }

    pub fn reboot_pending(&self) -> bool {
        self.reboot_at_ms.is_some()
    }

    // ── Link lifecycle ────────────────────────────────────────

    pub fn on_connect(&mut self, state: &mut DeviceState, mtu: u16) {
        state.connected = true;
        info!("RPC: peer connected (mtu {})", mtu);
    }

    /// Cancel everything tied to the connection. No reports are sent.
    pub fn on_disconnect(&mut self, state: &mut DeviceState, ports: &mut Ports<'_>) {
        state.connected = false;
        state.realtime_enabled = false;
        self.stream.disable();
        self.historic.abort(ports.history);
        self.ota.abort(ports.update);
        info!("RPC: peer disconnected");
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Decode one link write, dispatch it and send the resulting reports.
    pub fn handle_frame(&mut self, frame: &[u8], state: &mut DeviceState, ports: &mut Ports<'_>) {
        let command = match decode_command(frame) {
            Ok(command) => command,
            Err(DecodeError::UnknownOpcode(op)) => {
                warn!("RPC: unknown opcode 0x{:02X}", op);
                send(ports.link, &Report::Error(ErrorCode::UnknownCommand));
                return;
            }
            Err(e @ DecodeError::Length {
                opcode: opcode::OTA_START,
                ..
            }) => {
                warn!("RPC: {}", e);
                send(ports.link, &Report::Error(ErrorCode::Length));
                return;
            }
            Err(e) => {
                debug!("RPC: dropped frame: {}", e);
                return;
            }
        };

        for report in &self.dispatch(command, state, ports) {
            send(ports.link, report);
        }
    }

    /// Apply one command. Returns the reports to send, in order.
    pub fn dispatch(
        &mut self,
        command: Command<'_>,
        state: &mut DeviceState,
        ports: &mut Ports<'_>,
    ) -> Reports {
        let mut out = Reports::new();
        let now_ms = ports.clock.uptime_ms();

        let report = match command {
            Command::ProtocolVersion => Some(Report::ProtocolVersion(PROTOCOL_VERSION)),

            Command::TimeSync(ts) => match to_epoch(&ts) {
                Some(secs) => {
                    ports.clock.set_local_time(secs);
                    state.last_time_sync_ms = Some(now_ms);
                    ports.display.show_time_synced();
                    info!("RPC: clock set to {}", secs);
                    Some(Report::Ack)
                }
                None => {
                    debug!("RPC: time sync out of range, ignored");
                    None
                }
            },

            Command::WifiCredentials { ssid, password } => {
                match (core::str::from_utf8(ssid), core::str::from_utf8(password)) {
                    (Ok(ssid), Ok(password))
                        if ssid.len() <= MAX_SSID_LEN && password.len() <= MAX_PASS_LEN =>
                    {
                        if let Err(e) = persist_wifi_credentials(ports.storage, ssid, password) {
                            warn!("RPC: wifi credentials not persisted: {}", e);
                        }
                        ports.system.start_wifi_connection();
                        info!("RPC: wifi credentials updated (ssid '{}')", ssid);
                        Some(Report::Ack)
                    }
                    _ => {
                        debug!("RPC: wifi credentials rejected");
                        None
                    }
                }
            }

            Command::SetEngineeringMode(on) => {
                state.engineering_mode = on;
                if let Err(e) = state.persist_engineering_mode(ports.storage) {
                    warn!("RPC: engineering mode not persisted: {}", e);
                }
                ports.display.refresh();
                Some(Report::Ack)
            }

            Command::RequestEngModeStatus => Some(Report::EngineeringMode(state.engineering_mode)),

            Command::RequestStatus => Some(Report::Status(state.box_status)),

            Command::RequestEnv => Some(match state.sensor {
                Some(r) => Report::Environment {
                    temperature_centi: to_centi(r.temperature),
                    humidity_centi: to_centi(r.humidity),
                },
                None => Report::Error(ErrorCode::SensorInvalid),
            }),

            Command::RequestHistoric => self.start_historic(ports, now_ms),

            Command::EnableRealtime => {
                state.realtime_enabled = true;
                self.stream.enable(self.config.realtime_interval_ms, now_ms);
                Some(Report::Ack)
            }

            Command::DisableRealtime => {
                state.realtime_enabled = false;
                self.stream.disable();
                Some(Report::Ack)
            }

            Command::SetAlarm {
                hour,
                minute,
                enabled,
            } => {
                match AlarmConfig::new(hour, minute, enabled) {
                    Some(alarm) => {
                        state.alarm = alarm;
                        if let Err(e) = state.persist_alarm(ports.storage) {
                            warn!("RPC: alarm not persisted: {}", e);
                        }
                        info!("RPC: alarm set to {}", alarm);
                    }
                    None => debug!("RPC: alarm {}:{} out of range, ignored", hour, minute),
                }
                // The companion app waits for this ack even on a rejected value.
                Some(Report::Ack)
            }

            Command::OtaStart { total_size } => {
                if self.historic.is_active() {
                    warn!("RPC: OTA_START refused, historic transfer active");
                    Some(Report::Error(ErrorCode::Access))
                } else {
                    match self.ota.start(ports.update, total_size, now_ms) {
                        Ok(()) => Some(Report::Ack),
                        Err(e) => {
                            warn!("RPC: {}", e);
                            Some(Report::Error(e.code()))
                        }
                    }
                }
            }

            Command::OtaData(chunk) => match self.ota.write_chunk(ports.update, chunk, now_ms) {
                Ok(percent) => {
                    ports.display.show_update_progress(percent);
                    None
                }
                Err(e) => {
                    warn!("RPC: {}", e);
                    Some(Report::Error(e.code()))
                }
            },

            Command::OtaEnd => match self.ota.finish(ports.update) {
                Ok(()) => {
                    let at = now_ms + u64::from(self.config.reboot_delay_ms);
                    self.reboot_at_ms = Some(at);
                    info!("RPC: reboot scheduled at {} ms", at);
                    Some(Report::Ack)
                }
                Err(e) => {
                    warn!("RPC: {}", e);
                    Some(Report::Error(e.code()))
                }
            },
        };

        if let Some(report) = report {
            let _ = out.push(report);
        }
        out
    }

    fn start_historic(&mut self, ports: &mut Ports<'_>, now_ms: u64) -> Option<Report> {
        if self.ota.is_receiving() {
            warn!("RPC: REQUEST_HISTORIC refused, OTA in progress");
            return Some(Report::Error(ErrorCode::Access));
        }
        match self.historic.start(ports.history, now_ms) {
            Ok(StartOutcome::Started) | Ok(StartOutcome::AlreadyActive) => None,
            Ok(StartOutcome::Empty) => Some(Report::HistoricEnd),
            Err(e) => {
                warn!("RPC: historic open failed: {}", e);
                Some(Report::Error(ErrorCode::Access))
            }
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// One pass of periodic work. Call after draining inbound events.
    pub fn tick(&mut self, state: &mut DeviceState, ports: &mut Ports<'_>) {
        // The Disconnected event may have been dropped on a full channel.
        if state.connected && !ports.link.is_connected() {
            warn!("RPC: link down without disconnect event");
            self.on_disconnect(state, ports);
        }

        let now_ms = ports.clock.uptime_ms();

        if let Err(e) = self
            .ota
            .check_timeout(ports.update, now_ms, self.config.ota_idle_timeout_ms)
        {
            warn!("RPC: {}", e);
            if state.connected {
                send(ports.link, &Report::Error(e.code()));
            }
        }

        if let Some(at) = self.reboot_at_ms {
            if now_ms >= at {
                self.reboot_at_ms = None;
                info!("RPC: rebooting into new image");
                ports.system.reboot();
                return;
            }
        }

        if self.historic.is_active() {
            // Unsynced clocks count from boot.
            let wall_now = ports
                .clock
                .local_time()
                .unwrap_or((now_ms / 1000) as i64);
            let max_payload = ports.link.max_payload();
            let reports = self.historic.step(
                ports.history,
                state.connected,
                max_payload,
                wall_now,
                now_ms,
            );
            for report in &reports {
                send(ports.link, report);
            }
        }

        if state.realtime_enabled && state.connected && self.stream.tick(now_ms) {
            match state.sensor {
                Some(r) => {
                    let report = Report::Environment {
                        temperature_centi: to_centi(r.temperature),
                        humidity_centi: to_centi(r.humidity),
                    };
                    if !send(ports.link, &report) {
                        self.stream.record_drop();
                        debug!(
                            "RPC: realtime frames dropped so far: {}",
                            self.stream.dropped_count()
                        );
                    }
                }
                None => debug!("RPC: realtime skipped, sensor invalid"),
            }
        }
    }

    /// Notify the peer that a slot's medication was taken.
    pub fn report_medication_taken(
        &mut self,
        slot: u8,
        state: &DeviceState,
        ports: &mut Ports<'_>,
    ) -> bool {
        if !state.connected || slot > 7 {
            return false;
        }
        send(ports.link, &Report::MedicationTaken(slot))
    }
}

/// Send one report as a single notification. Returns `false` if dropped.
fn send(link: &mut dyn Link, report: &Report) -> bool {
    let frame = report.encode();
    match link.send(&frame) {
        Ok(()) => true,
        Err(e) => {
            debug!("RPC: report 0x{:02X} dropped: {}", report.tag(), e);
            false
        }
    }
}

/// TIME_SYNC fields → seconds since the epoch (local time, years from 2000).
fn to_epoch(ts: &TimeSync) -> Option<i64> {
    NaiveDate::from_ymd_opt(
        2000 + i32::from(ts.year_offset),
        u32::from(ts.month),
        u32::from(ts.day),
    )?
    .and_hms_opt(
        u32::from(ts.hour),
        u32::from(ts.minute),
        u32::from(ts.second),
    )
    .map(|dt| dt.and_utc().timestamp())
}

// ── Tests ────────────────────────────────────────────────────
