//! Over-the-air firmware update session.
//!
//! Flow: OTA_START → N × OTA_DATA → OTA_END → (delay) → reboot
//!
//! The session only tracks sequencing and byte accounting; the partition
//! itself sits behind [`UpdatePort`] (the `esp-ota` crate on target, an
//! in-memory image on host). Every failure path calls `UpdatePort::abort`
//! so the inactive partition never holds a half-written image that could
//! be committed later.

use core::fmt;
use log::{info, warn};

use crate::app::ports::{UpdateError, UpdatePort};

use super::codec::ErrorCode;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// OTA_START while a session is Receiving.
    AlreadyReceiving,
    /// OTA_DATA / OTA_END with no session.
    WrongSequence,
    BeginFailed(UpdateError),
    /// Chunk would exceed the size announced in OTA_START.
    Overflow { total_size: u32, attempted: u64 },
    /// The partition accepted fewer bytes than offered.
    ShortWrite { offered: usize, accepted: usize },
    WriteFailed(UpdateError),
    /// OTA_END before all announced bytes arrived.
    Incomplete { expected: u32, received: u32 },
    CommitFailed(UpdateError),
    /// No DATA / END within the idle timeout.
    TimedOut,
}

impl OtaError {
    /// Wire error code reported to the peer.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyReceiving | Self::WrongSequence => ErrorCode::WrongSequence,
            Self::Overflow { .. } => ErrorCode::Length,
            Self::BeginFailed(_)
            | Self::ShortWrite { .. }
            | Self::WriteFailed(_)
            | Self::Incomplete { .. }
            | Self::CommitFailed(_)
            | Self::TimedOut => ErrorCode::Access,
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReceiving => write!(f, "ota session already receiving"),
            Self::WrongSequence => write!(f, "ota command out of sequence"),
            Self::BeginFailed(e) => write!(f, "ota begin failed: {}", e),
            Self::Overflow {
                total_size,
                attempted,
            } => write!(f, "ota chunk overflows image ({} > {})", attempted, total_size),
            Self::ShortWrite { offered, accepted } => {
                write!(f, "ota short write ({} of {} bytes)", accepted, offered)
            }
            Self::WriteFailed(e) => write!(f, "ota write failed: {}", e),
            Self::Incomplete { expected, received } => {
                write!(f, "ota image incomplete ({}/{} bytes)", received, expected)
            }
            Self::CommitFailed(e) => write!(f, "ota commit failed: {}", e),
            Self::TimedOut => write!(f, "ota session timed out"),
        }
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        total_size: u32,
        bytes_received: u32,
        last_activity_ms: u64,
    },
}

pub struct OtaSession {
    state: OtaState,
}

impl OtaSession {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    pub fn is_receiving(&self) -> bool {
        matches!(self.state, OtaState::Receiving { .. })
    }

    /// Idle → Receiving. Reserves the inactive partition.
    pub fn start(
        &mut self,
        update: &mut dyn UpdatePort,
        total_size: u32,
        now_ms: u64,
    ) -> Result<(), OtaError> {
        if self.is_receiving() {
            return Err(OtaError::AlreadyReceiving);
        }

        update.begin(total_size).map_err(|e| {
            warn!("OTA: begin({}) failed: {}", total_size, e);
            OtaError::BeginFailed(e)
        })?;

        self.state = OtaState::Receiving {
            total_size,
            bytes_received: 0,
            last_activity_ms: now_ms,
        };
        info!("OTA: begin ({} bytes)", total_size);
        Ok(())
    }

    /// Append one chunk. Returns progress in percent.
    ///
    /// Any failure aborts the session and the partition write.
    pub fn write_chunk(
        &mut self,
        update: &mut dyn UpdatePort,
        data: &[u8],
        now_ms: u64,
    ) -> Result<u8, OtaError> {
        let OtaState::Receiving {
            total_size,
            bytes_received,
            ..
        } = self.state
        else {
            return Err(OtaError::WrongSequence);
        };

        let attempted = u64::from(bytes_received) + data.len() as u64;
        if attempted > u64::from(total_size) {
            self.abort(update);
            return Err(OtaError::Overflow {
                total_size,
                attempted,
            });
        }

        match update.write(data) {
            Ok(accepted) if accepted == data.len() => {}
            Ok(accepted) => {
                self.abort(update);
                return Err(OtaError::ShortWrite {
                    offered: data.len(),
                    accepted,
                });
            }
            Err(e) => {
                self.abort(update);
                return Err(OtaError::WriteFailed(e));
            }
        }

        let bytes_received = attempted as u32;
        self.state = OtaState::Receiving {
            total_size,
            bytes_received,
            last_activity_ms: now_ms,
        };
        Ok(progress_percent(bytes_received, total_size))
    }

    /// Receiving → Idle. Validates and commits the image.
    ///
    /// On success the caller schedules the reboot.
    pub fn finish(&mut self, update: &mut dyn UpdatePort) -> Result<(), OtaError> {
        let OtaState::Receiving {
            total_size,
            bytes_received,
            ..
        } = self.state
        else {
            return Err(OtaError::WrongSequence);
        };

        if bytes_received != total_size {
            self.abort(update);
            return Err(OtaError::Incomplete {
                expected: total_size,
                received: bytes_received,
            });
        }

        self.state = OtaState::Idle;
        update.commit().map_err(|e| {
            warn!("OTA: commit failed: {}", e);
            OtaError::CommitFailed(e)
        })?;
        info!("OTA: image committed ({} bytes)", total_size);
        Ok(())
    }

    /// Discard the session. Silent; idempotent.
    pub fn abort(&mut self, update: &mut dyn UpdatePort) {
        if let OtaState::Receiving {
            total_size,
            bytes_received,
            ..
        } = self.state
        {
            warn!("OTA: aborted at {}/{} bytes", bytes_received, total_size);
            update.abort();
        }
        self.state = OtaState::Idle;
    }

    /// Abort a session that has been silent for longer than `timeout_ms`.
    pub fn check_timeout(
        &mut self,
        update: &mut dyn UpdatePort,
        now_ms: u64,
        timeout_ms: u32,
    ) -> Result<(), OtaError> {
        if let OtaState::Receiving {
            last_activity_ms, ..
        } = self.state
        {
            if now_ms.saturating_sub(last_activity_ms) > u64::from(timeout_ms) {
                self.abort(update);
                return Err(OtaError::TimedOut);
            }
        }
        Ok(())
    }
}

impl Default for OtaSession {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_percent(received: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    (u64::from(received) * 100 / u64::from(total)) as u8
}

// ── Tests ─────────────────────────────────────────────────────
