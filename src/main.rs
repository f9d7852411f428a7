//! SmartMedBox Firmware — Main Entry Point
//!
//! Composition root: builds the adapters, restores persisted state and runs
//! the control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleLink        NvsAdapter     FileHistoryStore   Esp32Clock   │
//! │  (Link)         (Storage)      (History)          (Clock)      │
//! │  PartitionUpdater              LogBoard                        │
//! │  (Update)                      (System + Display)              │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  ProtocolEngine · Historic · OTA · Stream · Alarm      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  LINK_EVENTS (Bluedroid callbacks → control loop)              │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use log::{info, warn};

use medbox::adapters::ble::{BleLink, DEVICE_NAME};
use medbox::adapters::history_file::FileHistoryStore;
use medbox::adapters::log_sink::LogBoard;
use medbox::adapters::nvs::NvsAdapter;
use medbox::adapters::ota_update::{self, PartitionUpdater};
use medbox::adapters::time::Esp32Clock;
use medbox::app::ports::{ClockPort, Ports, Sample, StoragePort};
use medbox::app::service::AppService;
use medbox::app::state::DeviceState;
use medbox::config::DeviceConfig;
use medbox::rpc::channels::LINK_EVENTS;

/// Mount point of the SPIFFS data partition.
const FS_BASE: &str = "/spiffs";
const HISTORY_PATH: &str = "/spiffs/history.dat";

/// Control loop period.
const LOOP_INTERVAL_MS: u32 = 50;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SmartMedBox v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ────────────────────────────────
    ota_update::check_rollback();

    // ── 2. Persistent storage ─────────────────────────────────
    let mut nvs = NvsAdapter::new().map_err(medbox::error::Error::from)?;
    let config = DeviceConfig::load(&nvs);
    let state = DeviceState::load(&nvs);

    if let Err(e) = mount_storage() {
        // History is unavailable this boot; REQUEST_HISTORIC reports access errors.
        warn!("SPIFFS mount failed ({}), history disabled", e);
    }
    let mut history = FileHistoryStore::new(
        HISTORY_PATH,
        config.history_capacity,
        config.history_interval_ms,
    );
    history.load_metadata(&nvs);
    if let Err(e) = history.ensure_file() {
        warn!("HIST: backing file unavailable: {}", e);
    }

    // ── 3. Construct adapters ─────────────────────────────────
    let mut ble = BleLink::new(DEVICE_NAME);
    ble.start();

    let mut clock = Esp32Clock::new();
    let mut updater = PartitionUpdater::new();
    let mut system = LogBoard::new();
    let mut screen = LogBoard::new();

    // ── 4. Construct app service ──────────────────────────────
    let mut app = AppService::new(config, state);

    info!("System ready. Entering control loop.");

    // ── 5. Control loop ───────────────────────────────────────
    loop {
        {
            let mut ports = Ports {
                link: &mut ble,
                storage: &mut nvs,
                history: &mut history,
                update: &mut updater,
                clock: &mut clock,
                system: &mut system,
                display: &mut screen,
            };
            app.drain(&LINK_EVENTS, &mut ports);
            app.tick(&mut ports);
        }

        if let Some(sample) = app.history_sample_due(clock.uptime_ms(), wifi_rssi()) {
            if let Err(e) = record_sample(&mut history, &sample, &mut nvs) {
                warn!("HIST: sample not recorded: {}", e);
            }
        }

        FreeRtos::delay_ms(LOOP_INTERVAL_MS);
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn record_sample(
    history: &mut FileHistoryStore,
    sample: &Sample,
    storage: &mut dyn StoragePort,
) -> medbox::error::Result<()> {
    history.append(sample, storage)?;
    Ok(())
}

fn mount_storage() -> Result<()> {
    let base = std::ffi::CString::new(FS_BASE)?;
    let conf = esp_idf_svc::sys::esp_vfs_spiffs_conf_t {
        base_path: base.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: true,
    };
    // SPIFFS keeps the base path pointer; the mount lives until reboot.
    esp_idf_svc::sys::esp!(unsafe { esp_idf_svc::sys::esp_vfs_spiffs_register(&conf) })?;
    core::mem::forget(base);
    info!("SPIFFS mounted at {}", FS_BASE);
    Ok(())
}

/// Station RSSI, or 0 while WiFi is not associated.
fn wifi_rssi() -> i16 {
    let mut info: esp_idf_svc::sys::wifi_ap_record_t = Default::default();
    match esp_idf_svc::sys::esp!(unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut info) }) {
        Ok(()) => i16::from(info.rssi),
        Err(_) => 0,
    }
}
