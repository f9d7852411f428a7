//! ESP32 clock adapter.
//!
//! Implements [`ClockPort`]:
//!
//! - **`feature = "espidf"`**: `esp_timer_get_time()` for uptime (monotonic,
//!   microsecond precision) and `gettimeofday` / `settimeofday` for the wall
//!   clock set by TIME_SYNC.
//! - **otherwise**: `std::time::Instant` plus a wall-clock offset, for
//!   host-side testing and simulation.

use crate::app::ports::ClockPort;

/// Anything earlier is an unsynchronised RTC (e.g. 1970 after power-on).
#[cfg(feature = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

pub struct Esp32Clock {
    #[cfg(not(feature = "espidf"))]
    start: std::time::Instant,
    /// Simulation: wall time at `start`, once synced.
    #[cfg(not(feature = "espidf"))]
    wall_at_start: Option<i64>,
}

impl Default for Esp32Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(feature = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(feature = "espidf"))]
            wall_at_start: None,
        }
    }
}

#[cfg(feature = "espidf")]
impl ClockPort for Esp32Clock {
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    fn local_time(&self) -> Option<i64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = tv.tv_sec as i64;
        (secs >= EPOCH_2020).then_some(secs)
    }

    fn set_local_time(&mut self, secs: i64) {
        let tv = esp_idf_svc::sys::timeval {
            tv_sec: secs as _,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) } != 0 {
            log::warn!("CLOCK: settimeofday failed");
        }
    }
}

#[cfg(not(feature = "espidf"))]
impl ClockPort for Esp32Clock {
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn local_time(&self) -> Option<i64> {
        self.wall_at_start
            .map(|w| w + self.start.elapsed().as_secs() as i64)
    }

    fn set_local_time(&mut self, secs: i64) {
        self.wall_at_start = Some(secs - self.start.elapsed().as_secs() as i64);
    }
}
