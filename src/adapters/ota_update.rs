//! Firmware partition adapter — backed by the `esp-ota` crate.
//!
//! Implements [`UpdatePort`]. On target, `esp-ota` wraps the ESP-IDF OTA
//! partition API: writes go to the inactive slot, and dropping an
//! unfinished `OtaUpdate` aborts it. On host, the image is collected in
//! memory so tests can inspect it.

use log::{info, warn};

use crate::app::ports::{UpdateError, UpdatePort};

/// Largest image the OTA slots can hold.
pub const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

pub struct PartitionUpdater {
    expected_size: Option<u32>,
    written: u32,
    #[cfg(feature = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(feature = "espidf"))]
    image: Vec<u8>,
    #[cfg(not(feature = "espidf"))]
    committed: bool,
}

impl PartitionUpdater {
    pub fn new() -> Self {
        Self {
            expected_size: None,
            written: 0,
            #[cfg(feature = "espidf")]
            ota_update: None,
            #[cfg(not(feature = "espidf"))]
            image: Vec::new(),
            #[cfg(not(feature = "espidf"))]
            committed: false,
        }
    }

    /// Simulation: the image accepted so far (or the committed one).
    #[cfg(not(feature = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Simulation: whether an image has been marked bootable.
    #[cfg(not(feature = "espidf"))]
    pub fn is_committed(&self) -> bool {
        self.committed
    }
}

impl Default for PartitionUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdatePort for PartitionUpdater {
    fn begin(&mut self, size: u32) -> Result<(), UpdateError> {
        if size == 0 || size > MAX_FIRMWARE_SIZE {
            warn!("OTA: image size {} out of range", size);
            return Err(UpdateError::InsufficientSpace);
        }

        #[cfg(feature = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                UpdateError::InsufficientSpace
            })?;
            self.ota_update = Some(update);
        }

        #[cfg(not(feature = "espidf"))]
        {
            self.image.clear();
            self.committed = false;
        }

        self.expected_size = Some(size);
        self.written = 0;
        info!("OTA: partition opened for {} bytes", size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, UpdateError> {
        let Some(expected) = self.expected_size else {
            return Err(UpdateError::NotStarted);
        };
        // Never accept past the announced size.
        let room = expected.saturating_sub(self.written) as usize;
        let n = data.len().min(room);

        #[cfg(feature = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(UpdateError::NotStarted);
            };
            update.write(&data[..n]).map_err(|e| {
                warn!("esp-ota write failed: {:?}", e);
                UpdateError::WriteFailed
            })?;
        }

        #[cfg(not(feature = "espidf"))]
        self.image.extend_from_slice(&data[..n]);

        self.written += n as u32;
        Ok(n)
    }

    fn commit(&mut self) -> Result<(), UpdateError> {
        let Some(expected) = self.expected_size.take() else {
            return Err(UpdateError::NotStarted);
        };
        if self.written != expected {
            self.abort();
            return Err(UpdateError::ValidationFailed);
        }

        #[cfg(feature = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                return Err(UpdateError::NotStarted);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                UpdateError::ValidationFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                UpdateError::ValidationFailed
            })?;
        }

        #[cfg(not(feature = "espidf"))]
        {
            self.committed = true;
        }

        info!("OTA: image verified and set as boot partition");
        Ok(())
    }

    fn abort(&mut self) {
        // Dropping an unfinished esp-ota handle aborts the partition write.
        #[cfg(feature = "espidf")]
        {
            self.ota_update = None;
        }
        #[cfg(not(feature = "espidf"))]
        self.image.clear();

        self.expected_size = None;
        self.written = 0;
    }
}

/// Mark the running image valid so the bootloader cancels any pending
/// rollback. Call once the firmware has booted far enough to be trusted.
#[cfg(feature = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(feature = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}
