//! Application core — pure domain logic, zero I/O.
//!
//! Device state, the medication alarm and the service that drives the
//! protocol engine. All interaction with hardware happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable without
//! real peripherals.

pub mod alarm;
pub mod ports;
pub mod service;
pub mod state;
