//! Port traits — the hexagonal boundary between the protocol core and the
//! rest of the appliance.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ProtocolEngine / AppService (domain)
//! ```
//!
//! Driven adapters (NVS, the history file, the OTA partition, the clock,
//! the display and buzzer) implement these traits. The core reaches them
//! through [`Ports`], a bundle of trait objects handed to every dispatch
//! and tick, so the domain never touches hardware directly.

use core::fmt;

use crate::rpc::transport::Link;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / preferences)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage (the preferences collaborator).
///
/// Keys are namespaced to prevent collisions between subsystems
/// (`"wifi"`, `"medbox-meta"`).
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// History port (driven adapter: domain ← ring store)
// ───────────────────────────────────────────────────────────────

/// Size of one serialised [`Sample`] record in the ring store.
pub const SAMPLE_RECORD_LEN: usize = 10;

/// One environmental sample as stored in the ring store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub temperature: f32,
    pub humidity: f32,
    pub signal_strength: i16,
}

impl Sample {
    pub fn new(temperature: f32, humidity: f32, signal_strength: i16) -> Self {
        Self {
            temperature,
            humidity,
            signal_strength,
        }
    }

    /// Fixed little-endian record: `f32 temp | f32 hum | i16 rssi`.
    pub fn to_record(&self) -> [u8; SAMPLE_RECORD_LEN] {
        let mut out = [0u8; SAMPLE_RECORD_LEN];
        out[0..4].copy_from_slice(&self.temperature.to_le_bytes());
        out[4..8].copy_from_slice(&self.humidity.to_le_bytes());
        out[8..10].copy_from_slice(&self.signal_strength.to_le_bytes());
        out
    }

    pub fn from_record(rec: &[u8; SAMPLE_RECORD_LEN]) -> Self {
        Self {
            temperature: f32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]),
            humidity: f32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]),
            signal_strength: i16::from_le_bytes([rec[8], rec[9]]),
        }
    }
}

/// Read side of the fixed-capacity circular sample log.
///
/// The historic transfer opens the store once, reads physical slots in
/// oldest-to-newest order, then closes it. Implementations must not
/// mutate `count` / `write_index` while a reader holds the store open.
pub trait HistoryPort {
    /// Open the backing medium for reading.
    fn open(&mut self) -> Result<(), HistoryError>;

    /// Read the sample at physical slot `index` (`0..capacity`).
    fn read_at(&mut self, index: u32) -> Result<Sample, HistoryError>;

    /// Release the backing medium. Idempotent.
    fn close(&mut self);

    /// Number of valid samples (saturates at `capacity`).
    fn count(&self) -> u32;

    /// Physical slot the next sample will be written to.
    fn write_index(&self) -> u32;

    fn capacity(&self) -> u32;

    /// Interval between consecutive samples in milliseconds.
    fn sample_interval_ms(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Update port (driven adapter: domain → OTA partition)
// ───────────────────────────────────────────────────────────────

/// Writer for the inactive firmware partition.
///
/// The running image is never touched: `abort` discards the partial
/// image, and only a successful `commit` switches the boot partition.
pub trait UpdatePort {
    /// Reserve space for an image of `size` bytes.
    fn begin(&mut self, size: u32) -> Result<(), UpdateError>;

    /// Append bytes. Returns how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, UpdateError>;

    /// Validate the accumulated image and mark it bootable.
    fn commit(&mut self) -> Result<(), UpdateError>;

    /// Discard any partial image.
    fn abort(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic and wall-clock time source.
pub trait ClockPort {
    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;

    /// Local wall-clock time as seconds since the epoch, or `None` if the
    /// clock has never been synchronised.
    fn local_time(&self) -> Option<i64>;

    /// Set the local wall clock (TIME_SYNC).
    fn set_local_time(&mut self, secs: i64);
}

// ───────────────────────────────────────────────────────────────
// System / display ports (driven adapters: domain → board services)
// ───────────────────────────────────────────────────────────────

/// Board-level services the core triggers but does not implement.
pub trait SystemPort {
    /// Restart into whatever partition is marked bootable.
    fn reboot(&mut self);

    /// Reconnect WiFi using the credentials just persisted.
    fn start_wifi_connection(&mut self);

    /// Drive the buzzer / LED for a due medication alarm.
    fn sound_alarm(&mut self);
}

/// Screen collaborator. Only notified; never queried.
pub trait DisplayPort {
    /// Redraw the current screen set (e.g. engineering mode toggled).
    fn refresh(&mut self);

    /// Show the "time synced" status icon.
    fn show_time_synced(&mut self);

    /// Firmware update progress, 0–100.
    fn show_update_progress(&mut self, percent: u8);
}

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Every collaborator the protocol core needs for one dispatch or tick.
///
/// Built fresh by the caller so each field can borrow a different adapter.
pub struct Ports<'a> {
    pub link: &'a mut dyn Link,
    pub storage: &'a mut dyn StoragePort,
    pub history: &'a mut dyn HistoryPort,
    pub update: &'a mut dyn UpdatePort,
    pub clock: &'a mut dyn ClockPort,
    pub system: &'a mut dyn SystemPort,
    pub display: &'a mut dyn DisplayPort,
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`HistoryPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// The backing file could not be opened.
    OpenFailed,
    /// `read_at` called without a successful `open`.
    NotOpen,
    /// Physical index outside `0..capacity`.
    OutOfRange,
    /// Short or failed read / write.
    IoError,
}

/// Errors from [`UpdatePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// No partition large enough for the announced image.
    InsufficientSpace,
    /// No update in progress.
    NotStarted,
    /// Flash write failed.
    WriteFailed,
    /// Image failed size / checksum validation.
    ValidationFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "history store open failed"),
            Self::NotOpen => write!(f, "history store not open"),
            Self::OutOfRange => write!(f, "history index out of range"),
            Self::IoError => write!(f, "history I/O error"),
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientSpace => write!(f, "insufficient space for image"),
            Self::NotStarted => write!(f, "no update in progress"),
            Self::WriteFailed => write!(f, "update write failed"),
            Self::ValidationFailed => write!(f, "image validation failed"),
        }
    }
}
