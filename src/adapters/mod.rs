//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                 |
//! |----------------|--------------------|-----------------------------|
//! | `ble`          | Link               | Bluedroid GATT server       |
//! | `history_file` | HistoryPort        | Pre-allocated sample file   |
//! | `log_sink`     | SystemPort         | Serial log, esp_restart     |
//! |                | DisplayPort        |                             |
//! | `nvs`          | StoragePort        | NVS / in-memory store       |
//! | `ota_update`   | UpdatePort         | esp-ota partition writer    |
//! | `time`         | ClockPort          | ESP32 system timer / RTC    |

pub mod ble;
pub mod history_file;
pub mod log_sink;
pub mod nvs;
pub mod ota_update;
pub mod time;
