//! File-backed ring store for environmental samples.
//!
//! The file is pre-allocated to `capacity × SAMPLE_RECORD_LEN` bytes and
//! written in place, so flash usage never grows. `count` and `write_index`
//! live in NVS next to the last reading so they survive a reboot:
//!
//! ```text
//!   slot:   0      1      2     ...   capacity-1
//!          [rec]  [rec]  [rec]  ...  [rec]
//!                         ▲
//!                    write_index  (next slot to overwrite)
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::app::ports::{
    HistoryError, HistoryPort, SAMPLE_RECORD_LEN, Sample, StorageError, StoragePort,
};
use crate::app::state::{META_NS, key};

pub struct FileHistoryStore {
    path: PathBuf,
    capacity: u32,
    interval_ms: u32,
    count: u32,
    write_index: u32,
    /// Held open for the duration of a historic transfer.
    reader: Option<File>,
}

impl FileHistoryStore {
    pub fn new(path: impl AsRef<Path>, capacity: u32, interval_ms: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            capacity,
            interval_ms,
            count: 0,
            write_index: 0,
            reader: None,
        }
    }

    /// Restore `count` / `write_index` from NVS. Out-of-range values (e.g.
    /// after the capacity shrank) reset the ring.
    pub fn load_metadata(&mut self, storage: &dyn StoragePort) {
        let count = read_u32(storage, key::HIST_COUNT).unwrap_or(0);
        let index = read_u32(storage, key::HIST_INDEX).unwrap_or(0);
        if count > self.capacity || index >= self.capacity.max(1) {
            warn!(
                "HIST: stored metadata (count={}, index={}) exceeds capacity {}, resetting",
                count, index, self.capacity
            );
            self.count = 0;
            self.write_index = 0;
            return;
        }
        self.count = count;
        self.write_index = index;
        info!("HIST: {} samples, next slot {}", self.count, self.write_index);
    }

    /// Make sure the backing file exists at its full size.
    pub fn ensure_file(&self) -> Result<(), HistoryError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| {
                warn!("HIST: cannot create {}: {}", self.path.display(), e);
                HistoryError::OpenFailed
            })?;
        let want = u64::from(self.capacity) * SAMPLE_RECORD_LEN as u64;
        let len = file.metadata().map_err(|_| HistoryError::IoError)?.len();
        if len != want {
            file.set_len(want).map_err(|_| HistoryError::IoError)?;
            debug!("HIST: resized {} from {} to {} bytes", self.path.display(), len, want);
        }
        Ok(())
    }

    /// Record one sample at `write_index` and persist the new counters
    /// together with the reading itself.
    ///
    /// Refused while a transfer holds the store open, so the reader's view
    /// of `count` / `write_index` stays fixed.
    pub fn append(
        &mut self,
        sample: &Sample,
        storage: &mut dyn StoragePort,
    ) -> Result<(), HistoryError> {
        if self.reader.is_some() {
            debug!("HIST: append skipped, transfer in progress");
            return Err(HistoryError::IoError);
        }
        if self.capacity == 0 {
            return Err(HistoryError::OutOfRange);
        }
        self.ensure_file()?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|_| HistoryError::OpenFailed)?;
        file.seek(SeekFrom::Start(self.offset(self.write_index)))
            .map_err(|_| HistoryError::IoError)?;
        file.write_all(&sample.to_record())
            .map_err(|_| HistoryError::IoError)?;
        file.flush().map_err(|_| HistoryError::IoError)?;

        self.write_index = (self.write_index + 1) % self.capacity;
        self.count = (self.count + 1).min(self.capacity);

        if let Err(e) = self.persist(sample, storage) {
            warn!("HIST: metadata not persisted: {}", e);
        }
        Ok(())
    }

    fn persist(&self, sample: &Sample, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        storage.write(META_NS, key::HIST_COUNT, &self.count.to_le_bytes())?;
        storage.write(META_NS, key::HIST_INDEX, &self.write_index.to_le_bytes())?;
        storage.write(META_NS, key::LAST_TEMP, &sample.temperature.to_le_bytes())?;
        storage.write(META_NS, key::LAST_HUM, &sample.humidity.to_le_bytes())
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn offset(&self, index: u32) -> u64 {
        u64::from(index) * SAMPLE_RECORD_LEN as u64
    }
}

impl HistoryPort for FileHistoryStore {
    fn open(&mut self) -> Result<(), HistoryError> {
        if self.reader.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(|e| {
            warn!("HIST: open {} failed: {}", self.path.display(), e);
            HistoryError::OpenFailed
        })?;
        self.reader = Some(file);
        Ok(())
    }

    fn read_at(&mut self, index: u32) -> Result<Sample, HistoryError> {
        if index >= self.capacity {
            return Err(HistoryError::OutOfRange);
        }
        let offset = self.offset(index);
        let file = self.reader.as_mut().ok_or(HistoryError::NotOpen)?;
        let mut rec = [0u8; SAMPLE_RECORD_LEN];
        file.seek(SeekFrom::Start(offset))
            .map_err(|_| HistoryError::IoError)?;
        file.read_exact(&mut rec)
            .map_err(|_| HistoryError::IoError)?;
        Ok(Sample::from_record(&rec))
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn write_index(&self) -> u32 {
        self.write_index
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn sample_interval_ms(&self) -> u32 {
        self.interval_ms
    }
}

fn read_u32(storage: &dyn StoragePort, k: &str) -> Option<u32> {
    let mut buf = [0u8; 4];
    match storage.read(META_NS, k, &mut buf) {
        Ok(4) => Some(u32::from_le_bytes(buf)),
        _ => None,
    }
}
