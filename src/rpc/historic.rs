//! Chunked historic-data transfer.
//!
//! Streams the ring store oldest-to-newest over the notify channel, one
//! MTU-sized `REPORT_HISTORIC_POINT` frame per control tick, then a
//! `REPORT_HISTORIC_END`.
//!
//! ```text
//!   REQUEST_HISTORIC          tick (batch)           next_index >= total
//!  Idle ───────────────▶ Active ──────────▶ Active ─────────────────────▶ Idle
//!                          │                                   (END sent)
//!                          └── disconnect / read error ──────────────▶ Idle
//! ```

use log::{info, warn};

use crate::app::ports::{HistoryError, HistoryPort};

use super::codec::{
    ErrorCode, HISTORIC_HEADER_LEN, HISTORIC_POINT_LEN, HistoricPoint, MAX_POINTS_PER_FRAME,
    Report, to_centi,
};

/// Points that fit one notification of `max_payload` bytes.
///
/// Always at least one point, never more than a frame can count.
pub fn max_points_per_frame(max_payload: usize) -> usize {
    (max_payload.saturating_sub(HISTORIC_HEADER_LEN) / HISTORIC_POINT_LEN)
        .clamp(1, MAX_POINTS_PER_FRAME)
}

/// Transient state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSession {
    pub next_index: u32,
    pub total: u32,
    pub started_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricState {
    Idle,
    Active(TransferSession),
}

/// Result of a `REQUEST_HISTORIC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session is now Active; frames follow on subsequent ticks.
    Started,
    /// The store is empty; the caller sends END right away.
    Empty,
    /// A session was already running; request ignored.
    AlreadyActive,
}

/// Reports produced by one tick: at most a points frame plus END.
pub type StepReports = heapless::Vec<Report, 2>;

pub struct HistoricTransfer {
    state: HistoricState,
}

impl HistoricTransfer {
    pub fn new() -> Self {
        Self {
            state: HistoricState::Idle,
        }
    }

    pub fn state(&self) -> HistoricState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, HistoricState::Active(_))
    }

    /// Idle → Active. Opens the store and snapshots its sample count.
    pub fn start(
        &mut self,
        history: &mut dyn HistoryPort,
        now_ms: u64,
    ) -> Result<StartOutcome, HistoryError> {
        if self.is_active() {
            return Ok(StartOutcome::AlreadyActive);
        }
        if history.capacity() == 0 {
            return Err(HistoryError::OutOfRange);
        }

        history.open()?;

        let total = history.count().min(history.capacity());
        if total == 0 {
            history.close();
            info!("HIST: store empty, nothing to send");
            return Ok(StartOutcome::Empty);
        }

        self.state = HistoricState::Active(TransferSession {
            next_index: 0,
            total,
            started_at_ms: now_ms,
        });
        info!("HIST: transfer started ({} samples)", total);
        Ok(StartOutcome::Started)
    }

    /// Advance one batch.
    ///
    /// `wall_now` is the current local time used to back-date each sample;
    /// `now_ms` is uptime for the duration log.
    pub fn step(
        &mut self,
        history: &mut dyn HistoryPort,
        connected: bool,
        max_payload: usize,
        wall_now: i64,
        now_ms: u64,
    ) -> StepReports {
        let mut out = StepReports::new();
        let HistoricState::Active(mut session) = self.state else {
            return out;
        };

        if !connected {
            warn!("HIST: link lost at {}/{}, aborting", session.next_index, session.total);
            self.abort(history);
            return out;
        }

        let batch = max_points_per_frame(max_payload) as u32;
        let capacity = u64::from(history.capacity());
        let write_index = u64::from(history.write_index());
        let interval_secs = i64::from(history.sample_interval_ms() / 1000);

        let mut points = heapless::Vec::<HistoricPoint, MAX_POINTS_PER_FRAME>::new();
        while (points.len() as u32) < batch && session.next_index < session.total {
            let physical = (write_index + capacity - u64::from(session.total)
                + u64::from(session.next_index))
                % capacity;
            let sample = match history.read_at(physical as u32) {
                Ok(s) => s,
                Err(e) => {
                    warn!("HIST: read of slot {} failed: {}", physical, e);
                    self.abort(history);
                    let _ = out.push(Report::Error(ErrorCode::Access));
                    return out;
                }
            };
            let age = i64::from(session.total - 1 - session.next_index) * interval_secs;
            let _ = points.push(HistoricPoint {
                timestamp: (wall_now - age) as i32,
                temperature_centi: to_centi(sample.temperature),
                humidity_centi: to_centi(sample.humidity),
            });
            session.next_index += 1;
        }

        if !points.is_empty() {
            let _ = out.push(Report::HistoricPoints(points));
        }

        if session.next_index >= session.total {
            history.close();
            self.state = HistoricState::Idle;
            let _ = out.push(Report::HistoricEnd);
            info!(
                "HIST: transfer finished in {} ms",
                now_ms.saturating_sub(session.started_at_ms)
            );
        } else {
            self.state = HistoricState::Active(session);
        }
        out
    }

    /// Drop the session and release the store. Silent.
    pub fn abort(&mut self, history: &mut dyn HistoryPort) {
        if self.is_active() {
            history.close();
        }
        self.state = HistoricState::Idle;
    }
}

impl Default for HistoricTransfer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
