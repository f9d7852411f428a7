//! Device context — the mutable state the protocol core works on.
//!
//! One [`DeviceState`] exists per boot. It is handed by `&mut` to the
//! dispatcher and the tick; nothing else mutates it. Persistent fields are
//! written through [`StoragePort`] on change and restored by
//! [`DeviceState::load`] at boot. Persistence is best effort: the
//! in-memory copy is authoritative until the next restart.

use core::fmt;

use log::{info, warn};

use super::ports::{StorageError, StoragePort};

/// Preferences namespace for device settings and history metadata.
pub const META_NS: &str = "medbox-meta";
/// Preferences namespace for network credentials.
pub const WIFI_NS: &str = "wifi";

/// Preference keys.
pub mod key {
    pub const ENG_MODE: &str = "engMode";
    pub const ALARM_HOUR: &str = "alarmH";
    pub const ALARM_MINUTE: &str = "alarmM";
    pub const ALARM_ON: &str = "alarmOn";
    pub const HIST_COUNT: &str = "hist_count";
    pub const HIST_INDEX: &str = "hist_index";
    pub const LAST_TEMP: &str = "last_temp";
    pub const LAST_HUM: &str = "last_hum";
    pub const SSID: &str = "ssid";
    pub const PASS: &str = "pass";
}

/// Longest SSID / passphrase accepted from the app (802.11 / WPA2 limits).
pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASS_LEN: usize = 64;

/// Box status bitmask reported by REQUEST_STATUS. One bit per slot.
pub const DEFAULT_BOX_STATUS: u8 = 0b0000_1111;

// ── Alarm ─────────────────────────────────────────────────────

/// Daily medication alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmConfig {
    hour: u8,
    minute: u8,
    enabled: bool,
}

impl AlarmConfig {
    /// `None` unless `hour < 24 && minute < 60`.
    pub fn new(hour: u8, minute: u8, enabled: bool) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self {
            hour,
            minute,
            enabled,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Display for AlarmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02} ({})",
            self.hour,
            self.minute,
            if self.enabled { "on" } else { "off" }
        )
    }
}

// ── Sensor cache ──────────────────────────────────────────────

/// Last good temperature / humidity reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
}

// ── Device state ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub connected: bool,
    pub realtime_enabled: bool,
    pub engineering_mode: bool,
    pub alarm: AlarmConfig,
    /// Latched when the alarm fires; cleared by the user dismissing it.
    pub alarm_ringing: bool,
    pub box_status: u8,
    /// `None` while the sensor has never produced (or lost) a valid reading.
    pub sensor: Option<SensorReading>,
    /// Uptime of the last TIME_SYNC, for the display's sync icon.
    pub last_time_sync_ms: Option<u64>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            connected: false,
            realtime_enabled: false,
            engineering_mode: false,
            alarm: AlarmConfig::default(),
            alarm_ringing: false,
            box_status: DEFAULT_BOX_STATUS,
            sensor: None,
            last_time_sync_ms: None,
        }
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted fields. Missing or corrupt keys keep defaults.
    pub fn load(storage: &dyn StoragePort) -> Self {
        let mut state = Self::default();

        state.engineering_mode = read_u8(storage, key::ENG_MODE).is_some_and(|v| v != 0);

        let hour = read_u8(storage, key::ALARM_HOUR).unwrap_or(0);
        let minute = read_u8(storage, key::ALARM_MINUTE).unwrap_or(0);
        let enabled = read_u8(storage, key::ALARM_ON).is_some_and(|v| v != 0);
        match AlarmConfig::new(hour, minute, enabled) {
            Some(alarm) => state.alarm = alarm,
            None => warn!("STATE: stored alarm {}:{} out of range, ignored", hour, minute),
        }

        let temperature = read_f32(storage, key::LAST_TEMP).unwrap_or(0.0);
        let humidity = read_f32(storage, key::LAST_HUM).unwrap_or(0.0);
        if temperature != 0.0 || humidity != 0.0 {
            state.sensor = Some(SensorReading {
                temperature,
                humidity,
            });
        }

        info!(
            "STATE: loaded (eng={}, alarm={}, sensor={})",
            state.engineering_mode,
            state.alarm,
            state.sensor.is_some()
        );
        state
    }

    pub fn persist_engineering_mode(
        &self,
        storage: &mut dyn StoragePort,
    ) -> Result<(), StorageError> {
        storage.write(META_NS, key::ENG_MODE, &[u8::from(self.engineering_mode)])
    }

    pub fn persist_alarm(&self, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        storage.write(META_NS, key::ALARM_HOUR, &[self.alarm.hour])?;
        storage.write(META_NS, key::ALARM_MINUTE, &[self.alarm.minute])?;
        storage.write(META_NS, key::ALARM_ON, &[u8::from(self.alarm.enabled)])
    }
}

/// Persist WiFi credentials for the network collaborator.
pub fn persist_wifi_credentials(
    storage: &mut dyn StoragePort,
    ssid: &str,
    password: &str,
) -> Result<(), StorageError> {
    storage.write(WIFI_NS, key::SSID, ssid.as_bytes())?;
    storage.write(WIFI_NS, key::PASS, password.as_bytes())
}

fn read_u8(storage: &dyn StoragePort, k: &str) -> Option<u8> {
    let mut buf = [0u8; 1];
    match storage.read(META_NS, k, &mut buf) {
        Ok(1) => Some(buf[0]),
        _ => None,
    }
}

fn read_f32(storage: &dyn StoragePort, k: &str) -> Option<f32> {
    let mut buf = [0u8; 4];
    match storage.read(META_NS, k, &mut buf) {
        Ok(4) => Some(f32::from_le_bytes(buf)),
        _ => None,
    }
}
