//! Mock board for integration tests.
//!
//! Records every notification, reboot and display call so tests can assert
//! on the full exchange without a radio or flash. Storage is the host
//! [`NvsAdapter`] and history is a real [`FileHistoryStore`] in a temp dir.

use medbox::adapters::history_file::FileHistoryStore;
use medbox::adapters::nvs::NvsAdapter;
use medbox::app::ports::{
    ClockPort, DisplayPort, Ports, Sample, StorageError, StoragePort, SystemPort, UpdateError,
    UpdatePort,
};
use medbox::rpc::codec::Report;
use medbox::rpc::transport::{Link, LinkError};

// ── Link ──────────────────────────────────────────────────────

pub struct MockLink {
    pub connected: bool,
    pub mtu: usize,
    pub sent: Vec<Vec<u8>>,
}

#[allow(dead_code)]
impl MockLink {
    /// Decoded reports sent since the last call.
    pub fn take_reports(&mut self) -> Vec<Report> {
        self.sent
            .drain(..)
            .map(|f| Report::decode(&f).expect("device sent an undecodable frame"))
            .collect()
    }
}

impl Link for MockLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        if frame.len() > self.max_payload() {
            return Err(LinkError::MtuExceeded);
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

// ── Storage ───────────────────────────────────────────────────

/// Host NVS that records every write as `(namespace, key)`.
#[allow(dead_code)]
pub struct CountingStorage {
    pub inner: NvsAdapter,
    pub writes: Vec<(String, String)>,
}

#[allow(dead_code)]
impl CountingStorage {
    pub fn new() -> Self {
        Self {
            inner: NvsAdapter::new().expect("nvs"),
            writes: Vec::new(),
        }
    }

    pub fn writes_to(&self, namespace: &str, key: &str) -> usize {
        self.writes
            .iter()
            .filter(|(ns, k)| ns == namespace && k == key)
            .count()
    }
}

impl StoragePort for CountingStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.inner.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.writes.push((namespace.to_string(), key.to_string()));
        self.inner.write(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.inner.delete(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.inner.exists(namespace, key)
    }
}

// ── Update partition ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCall {
    Begin(u32),
    Write(usize),
    Commit,
    Abort,
}

#[derive(Default)]
pub struct MockPartition {
    pub calls: Vec<UpdateCall>,
    pub image: Vec<u8>,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub committed: bool,
}

impl UpdatePort for MockPartition {
    fn begin(&mut self, size: u32) -> Result<(), UpdateError> {
        self.calls.push(UpdateCall::Begin(size));
        if self.fail_begin {
            return Err(UpdateError::InsufficientSpace);
        }
        self.image.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, UpdateError> {
        self.calls.push(UpdateCall::Write(data.len()));
        self.image.extend_from_slice(data);
        Ok(data.len())
    }

    fn commit(&mut self) -> Result<(), UpdateError> {
        self.calls.push(UpdateCall::Commit);
        if self.fail_commit {
            return Err(UpdateError::ValidationFailed);
        }
        self.committed = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.calls.push(UpdateCall::Abort);
        self.image.clear();
    }
}

// ── Clock ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockClock {
    pub uptime_ms: u64,
    pub wall: Option<i64>,
}

impl ClockPort for MockClock {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms
    }

    fn local_time(&self) -> Option<i64> {
        // Wall time advances with uptime once set.
        self.wall.map(|w| w + (self.uptime_ms / 1000) as i64)
    }

    fn set_local_time(&mut self, secs: i64) {
        self.wall = Some(secs - (self.uptime_ms / 1000) as i64);
    }
}

// ── Board services ────────────────────────────────────────────

#[derive(Default)]
pub struct MockSystem {
    pub reboots: u32,
    pub wifi_restarts: u32,
    pub alarms: u32,
}

impl SystemPort for MockSystem {
    fn reboot(&mut self) {
        self.reboots += 1;
    }

    fn start_wifi_connection(&mut self) {
        self.wifi_restarts += 1;
    }

    fn sound_alarm(&mut self) {
        self.alarms += 1;
    }
}

#[derive(Default)]
pub struct MockDisplay {
    pub refreshes: u32,
    pub synced: u32,
    pub progress: Vec<u8>,
}

impl DisplayPort for MockDisplay {
    fn refresh(&mut self) {
        self.refreshes += 1;
    }

    fn show_time_synced(&mut self) {
        self.synced += 1;
    }

    fn show_update_progress(&mut self, percent: u8) {
        self.progress.push(percent);
    }
}

// ── Board bundle ──────────────────────────────────────────────

pub struct MockBoard {
    pub link: MockLink,
    pub nvs: NvsAdapter,
    pub history: FileHistoryStore,
    pub update: MockPartition,
    pub clock: MockClock,
    pub system: MockSystem,
    pub display: MockDisplay,
    _dir: tempfile::TempDir,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new(capacity: u32) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = FileHistoryStore::new(dir.path().join("history.bin"), capacity, 60_000);
        history.ensure_file().expect("history file");
        Self {
            link: MockLink {
                connected: false,
                mtu: 23,
                sent: Vec::new(),
            },
            nvs: NvsAdapter::new().expect("nvs"),
            history,
            update: MockPartition::default(),
            clock: MockClock::default(),
            system: MockSystem::default(),
            display: MockDisplay::default(),
            _dir: dir,
        }
    }

    pub fn ports(&mut self) -> Ports<'_> {
        Ports {
            link: &mut self.link,
            storage: &mut self.nvs,
            history: &mut self.history,
            update: &mut self.update,
            clock: &mut self.clock,
            system: &mut self.system,
            display: &mut self.display,
        }
    }

    /// Fill the ring store with samples whose temperature is `first..`.
    pub fn record(&mut self, first: u32, n: u32) {
        for i in first..first + n {
            let sample = Sample::new(i as f32, 50.0, -60);
            self.history
                .append(&sample, &mut self.nvs)
                .expect("append");
        }
    }

    pub fn advance(&mut self, ms: u64) {
        self.clock.uptime_ms += ms;
    }
}
