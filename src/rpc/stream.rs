//! Realtime environment push.
//!
//! While enabled, the engine sends one `REPORT_ENV` every interval. The
//! subscription lives only as long as the connection.

/// Stream subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not subscribed, no frames sent.
    Inactive,
    /// Streaming at the configured interval.
    Active { interval_ms: u32 },
}

pub struct RealtimeStream {
    state: StreamState,
    last_sent_ms: u64,
    /// Frames the link refused.
    dropped_count: u32,
}

impl RealtimeStream {
    pub fn new() -> Self {
        Self {
            state: StreamState::Inactive,
            last_sent_ms: 0,
            dropped_count: 0,
        }
    }

    /// Start streaming. The first frame goes out one interval from `now_ms`.
    pub fn enable(&mut self, interval_ms: u32, now_ms: u64) {
        self.state = StreamState::Active {
            interval_ms: interval_ms.max(100), // Floor at 100ms (10 Hz)
        };
        self.last_sent_ms = now_ms;
    }

    pub fn disable(&mut self) {
        self.state = StreamState::Inactive;
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, StreamState::Active { .. })
    }

    /// Returns `true` when a frame is due, and restarts the interval.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        match self.state {
            StreamState::Active { interval_ms } => {
                if now_ms.saturating_sub(self.last_sent_ms) >= u64::from(interval_ms) {
                    self.last_sent_ms = now_ms;
                    true
                } else {
                    false
                }
            }
            StreamState::Inactive => false,
        }
    }

    pub fn record_drop(&mut self) {
        self.dropped_count = self.dropped_count.saturating_add(1);
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn dropped_count(&self) -> u32 {
        self.dropped_count
    }
}

impl Default for RealtimeStream {
    fn default() -> Self {
        Self::new()
    }
}
