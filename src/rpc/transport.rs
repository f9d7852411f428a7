//! Link abstraction — the single-peer notify channel.
//!
//! Concrete implementation: BLE GATT notify characteristic
//! (`adapters::ble::BleLink`).
//!
//! Inbound writes and disconnects do not flow through this trait; the
//! BLE host task posts them as [`LinkEvent`](super::channels::LinkEvent)s
//! so they are processed on the control loop.

use core::fmt;

/// ATT notification header overhead subtracted from the negotiated MTU.
pub const ATT_OVERHEAD: usize = 3;

/// Outbound half of the link.
pub trait Link {
    /// Whether a peer is currently connected.
    fn is_connected(&self) -> bool;

    /// Negotiated ATT MTU (23 until the peer requests more).
    fn mtu(&self) -> usize;

    /// Queue one frame as a single notification. Fire-and-forget.
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Largest frame that fits in one notification.
    fn max_payload(&self) -> usize {
        self.mtu().saturating_sub(ATT_OVERHEAD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NotConnected,
    MtuExceeded,
    Io,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no peer connected"),
            Self::MtuExceeded => write!(f, "frame exceeds MTU"),
            Self::Io => write!(f, "notify failed"),
        }
    }
}
