//! Log-backed board services.
//!
//! Implements [`SystemPort`] and [`DisplayPort`] by writing what the core
//! asked for to the ESP-IDF logger (UART / USB-CDC in production). The
//! screen, buzzer and WiFi collaborators live outside this crate; they
//! pick the same requests up from here. `reboot` is real on target.

use log::{info, warn};

use crate::app::ports::{DisplayPort, SystemPort};

#[derive(Debug, Default)]
pub struct LogBoard {
    last_progress: Option<u8>,
    /// Simulation: reboot requests seen so far.
    #[cfg(not(feature = "espidf"))]
    reboots: u32,
}

impl LogBoard {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(not(feature = "espidf"))]
    pub fn reboot_count(&self) -> u32 {
        self.reboots
    }
}

impl SystemPort for LogBoard {
    fn reboot(&mut self) {
        warn!("SYS: restarting");
        #[cfg(feature = "espidf")]
        unsafe {
            esp_idf_svc::sys::esp_restart();
        }
        #[cfg(not(feature = "espidf"))]
        {
            self.reboots += 1;
        }
    }

    fn start_wifi_connection(&mut self) {
        info!("SYS | wifi reconnect requested");
    }

    fn sound_alarm(&mut self) {
        info!("SYS | alarm sounding");
    }
}

impl DisplayPort for LogBoard {
    fn refresh(&mut self) {
        info!("UI | refresh");
    }

    fn show_time_synced(&mut self) {
        info!("UI | time synced");
    }

    fn show_update_progress(&mut self, percent: u8) {
        // Only log on whole-step changes; OTA_DATA arrives many times a second.
        if self.last_progress != Some(percent) {
            if percent % 10 == 0 {
                info!("UI | update {}%", percent);
            }
            self.last_progress = Some(percent);
        }
    }
}
