//! BLE host → control loop event channel.
//!
//! GATT callbacks run on the Bluedroid task. They never touch protocol
//! state; they post a [`LinkEvent`] here and the control loop drains the
//! channel before each tick, so dispatch and the state machines are only
//! ever entered from one context.
//!
//! ```text
//! ┌──────────────┐  LinkEvent   ┌──────────────┐
//! │  BLE host    │─────────────▶│ Control loop │
//! │  callbacks   │              │ (sync)       │
//! └──────────────┘              └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use super::codec::MAX_FRAME_LEN;

/// Something that happened on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected { mtu: u16 },
    /// One write to the command characteristic.
    Frame(Vec<u8, MAX_FRAME_LEN>),
    MtuChanged { mtu: u16 },
    Disconnected,
}

impl LinkEvent {
    /// Copy a GATT write into an event. Oversized writes are truncated to
    /// the largest ATT value and will fail length checks downstream.
    pub fn frame(data: &[u8]) -> Self {
        let n = data.len().min(MAX_FRAME_LEN);
        let mut v = Vec::new();
        let _ = v.extend_from_slice(&data[..n]);
        Self::Frame(v)
    }
}

/// Channel depth for link events.
pub const EVENT_DEPTH: usize = 16;

/// Inbound event channel: BLE host task → control loop.
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, EVENT_DEPTH> = Channel::new();
