//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the protocol engine, the device state and the alarm
//! scheduler. It exposes a hardware-agnostic API; all I/O flows through the
//! [`Ports`] bundle injected at each call, so the whole service is testable
//! with mock adapters.
//!
//! ```text
//!  LinkEvent ──▶ ┌────────────────────────┐ ──▶ Link (notify)
//!                │       AppService       │
//!  Ports     ◀──│ Engine · State · Alarm  │
//!                └────────────────────────┘
//! ```
//!
//! One control-loop pass is: [`AppService::drain`] every pending event,
//! then [`AppService::tick`].

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info};

use crate::config::DeviceConfig;
use crate::rpc::channels::LinkEvent;
use crate::rpc::engine::{LongOperation, ProtocolEngine};

use super::alarm::AlarmScheduler;
use super::ports::{Ports, Sample};
use super::state::{DeviceState, SensorReading};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    engine: ProtocolEngine,
    state: DeviceState,
    alarm: AlarmScheduler,
    history_interval_ms: u32,
    last_sample_ms: u64,
    tick_count: u64,
}

impl AppService {
    /// Construct the service from configuration and restored state.
    pub fn new(config: DeviceConfig, state: DeviceState) -> Self {
        let alarm = AlarmScheduler::new(config.alarm_check_interval_ms);
        let history_interval_ms = config.history_interval_ms;
        Self {
            engine: ProtocolEngine::new(config),
            state,
            alarm,
            history_interval_ms,
            last_sample_ms: 0,
            tick_count: 0,
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Apply one link event to completion, including its reports.
    pub fn handle_event(&mut self, event: LinkEvent, ports: &mut Ports<'_>) {
        match event {
            LinkEvent::Connected { mtu } => self.engine.on_connect(&mut self.state, mtu),
            LinkEvent::Frame(frame) => self.engine.handle_frame(&frame, &mut self.state, ports),
            LinkEvent::MtuChanged { mtu } => debug!("RPC: mtu now {}", mtu),
            LinkEvent::Disconnected => self.engine.on_disconnect(&mut self.state, ports),
        }
    }

    /// Drain every queued event. Returns how many were handled.
    pub fn drain<const N: usize>(
        &mut self,
        events: &Channel<CriticalSectionRawMutex, LinkEvent, N>,
        ports: &mut Ports<'_>,
    ) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_receive() {
            self.handle_event(event, ports);
            handled += 1;
        }
        handled
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Periodic work: protocol engine, then the medication alarm.
    pub fn tick(&mut self, ports: &mut Ports<'_>) {
        self.tick_count += 1;
        self.engine.tick(&mut self.state, ports);

        let now_ms = ports.clock.uptime_ms();
        if self
            .alarm
            .poll(&mut self.state, ports.clock.local_time(), now_ms)
        {
            ports.system.sound_alarm();
        }
    }

    // ── Device-side events ────────────────────────────────────

    /// New sensor reading, or `None` when the sensor read failed.
    pub fn update_sensor(&mut self, reading: Option<SensorReading>) {
        if reading.is_none() && self.state.sensor.is_some() {
            info!("SENSOR: reading lost, cache invalid");
        }
        self.state.sensor = reading;
    }

    /// User acknowledged the ringing alarm.
    pub fn dismiss_alarm(&mut self) {
        if self.state.alarm_ringing {
            info!("ALARM: dismissed");
        }
        self.state.alarm_ringing = false;
    }

    /// A slot was emptied; tell the app if one is listening.
    pub fn report_medication_taken(&mut self, slot: u8, ports: &mut Ports<'_>) -> bool {
        self.engine
            .report_medication_taken(slot, &self.state, ports)
    }

    /// The next ring-store sample, once per history interval.
    ///
    /// Withheld while a historic transfer holds the store open or while the
    /// sensor cache is invalid.
    pub fn history_sample_due(&mut self, now_ms: u64, signal_strength: i16) -> Option<Sample> {
        if now_ms.saturating_sub(self.last_sample_ms) < u64::from(self.history_interval_ms) {
            return None;
        }
        if self.engine.long_operation() == LongOperation::Historic {
            return None;
        }
        let reading = self.state.sensor?;
        self.last_sample_ms = now_ms;
        Some(Sample::new(
            reading.temperature,
            reading.humidity,
            signal_strength,
        ))
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
