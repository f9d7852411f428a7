//! Device configuration parameters
//!
//! Timing and capacity knobs for the protocol core. Values are compiled-in
//! defaults; a provisioned device may override them with a postcard blob
//! stored under `medbox-meta/devcfg`.

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{StorageError, StoragePort};
use crate::app::state::META_NS;

const CONFIG_KEY: &str = "devcfg";
const MAX_CONFIG_BLOB: usize = 64;

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Streaming ---
    /// Interval between realtime environment notifications (milliseconds)
    pub realtime_interval_ms: u32,

    // --- History ring store ---
    /// Interval between recorded history samples (milliseconds)
    pub history_interval_ms: u32,
    /// Number of samples the ring store holds before overwriting
    pub history_capacity: u32,

    // --- OTA ---
    /// Abort a Receiving session after this long without DATA/END (milliseconds)
    pub ota_idle_timeout_ms: u32,
    /// Delay between a committed image and the restart (milliseconds)
    pub reboot_delay_ms: u32,

    // --- Alarm ---
    /// Wall-clock polling interval for the medication alarm (milliseconds)
    pub alarm_check_interval_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            realtime_interval_ms: 2000,

            history_interval_ms: 60_000, // 1/min
            history_capacity: 4800,      // ~3.3 days

            ota_idle_timeout_ms: 30_000,
            reboot_delay_ms: 1000,

            alarm_check_interval_ms: 1000,
        }
    }
}

impl DeviceConfig {
    /// Reject values that would stall the tick loop or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.realtime_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("realtime_interval_ms"));
        }
        if self.history_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("history_interval_ms"));
        }
        if self.alarm_check_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("alarm_check_interval_ms"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Load the stored override, falling back to defaults when absent,
    /// corrupt or invalid.
    pub fn load(storage: &dyn StoragePort) -> Self {
        let mut buf = [0u8; MAX_CONFIG_BLOB];
        let len = match storage.read(META_NS, CONFIG_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => {
                info!("CONFIG: no stored config, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!("CONFIG: read failed ({}), using defaults", e);
                return Self::default();
            }
        };

        let cfg: Self = match postcard::from_bytes(&buf[..len]) {
            Ok(cfg) => cfg,
            Err(_) => {
                warn!("CONFIG: stored blob corrupt, using defaults");
                return Self::default();
            }
        };
        if let Err(e) = cfg.validate() {
            warn!("CONFIG: stored config rejected ({}), using defaults", e);
            return Self::default();
        }
        info!("CONFIG: loaded from storage ({} bytes)", len);
        cfg
    }

    pub fn save(&self, storage: &mut dyn StoragePort) -> Result<(), ConfigError> {
        self.validate()?;
        let bytes = postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)?;
        storage
            .write(META_NS, CONFIG_KEY, &bytes)
            .map_err(ConfigError::Storage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    ZeroInterval(&'static str),
    ZeroCapacity,
    Encode,
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInterval(field) => write!(f, "{} must be non-zero", field),
            Self::ZeroCapacity => write!(f, "history_capacity must be non-zero"),
            Self::Encode => write!(f, "config serialisation failed"),
            Self::Storage(e) => write!(f, "config storage: {}", e),
        }
    }
}
