//! Daily medication alarm check.
//!
//! Polled from the control loop at most once per
//! `alarm_check_interval_ms`. Fires when the wall clock reads exactly
//! `hh:mm:00` for the configured alarm and latches `alarm_ringing` so the
//! same minute cannot fire twice.

use chrono::{DateTime, Timelike};
use log::info;

use super::state::DeviceState;

pub struct AlarmScheduler {
    interval_ms: u32,
    last_check_ms: Option<u64>,
}

impl AlarmScheduler {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_check_ms: None,
        }
    }

    /// Returns `true` when the alarm fires on this call.
    ///
    /// `local_time` is seconds since the epoch in local time, `None` when
    /// the clock has never been synchronised.
    pub fn poll(&mut self, state: &mut DeviceState, local_time: Option<i64>, now_ms: u64) -> bool {
        if let Some(last) = self.last_check_ms {
            if now_ms.saturating_sub(last) < u64::from(self.interval_ms) {
                return false;
            }
        }
        self.last_check_ms = Some(now_ms);

        if !state.alarm.enabled() || state.alarm_ringing {
            return false;
        }
        let Some(now) = local_time.and_then(|t| DateTime::from_timestamp(t, 0)) else {
            return false;
        };

        if now.hour() == u32::from(state.alarm.hour())
            && now.minute() == u32::from(state.alarm.minute())
            && now.second() == 0
        {
            state.alarm_ringing = true;
            info!("ALARM: medication due ({})", state.alarm);
            return true;
        }
        false
    }
}
