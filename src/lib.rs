//! SmartMedBox firmware library.
//!
//! Exposes the protocol core and its adapters for the firmware binary and
//! for host-side integration testing. All ESP-IDF-specific code is guarded
//! by `#[cfg(feature = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod rpc;

mod esp_link_shims;
