//! Unified error type for the SmartMedBox firmware core.
//!
//! Each subsystem owns a small `Copy` error enum; this module folds them
//! into one [`Error`] so the control loop and `main` can handle failures
//! uniformly. None of these are fatal to the device: every failure path in
//! the protocol core degrades to an Idle state.

use core::fmt;

use crate::app::ports::{HistoryError, StorageError, UpdateError};
use crate::config::ConfigError;
use crate::rpc::codec::DecodeError;
use crate::rpc::ota::OtaError;
use crate::rpc::transport::LinkError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An inbound frame could not be decoded.
    Decode(DecodeError),
    /// The firmware update state machine rejected an operation.
    Ota(OtaError),
    /// The history ring store failed.
    History(HistoryError),
    /// Key/value persistence failed.
    Storage(StorageError),
    /// The update partition writer failed.
    Update(UpdateError),
    /// The BLE link refused a notification.
    Link(LinkError),
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::History(e) => write!(f, "history: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

impl From<HistoryError> for Error {
    fn from(e: HistoryError) -> Self {
        Self::History(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<UpdateError> for Error {
    fn from(e: UpdateError) -> Self {
        Self::Update(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
