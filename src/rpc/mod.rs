//! BLE command protocol.
//!
//! Single-byte-opcode command/report protocol carried over one GATT write
//! characteristic (inbound) and one notify characteristic (outbound).
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Protocol Stack                          │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │ Channels │──▶│  Codec   │──▶│  Engine (dispatcher)  │  │
//! │  │(LinkEvent)│  │ (decode) │   │  → DeviceState        │  │
//! │  └──────────┘   └──────────┘   └───────────────────────┘  │
//! │                                     │         │            │
//! │                      ┌──────────────┘         ▼            │
//! │                      ▼               ┌─────────────────┐   │
//! │  ┌──────────┐   ┌──────────┐        │ Historic · OTA   │   │
//! │  │   Link   │◀──│  Codec   │◀───────│ Stream (tick)    │   │
//! │  │ (notify) │   │ (encode) │        └─────────────────┘   │
//! │  └──────────┘   └──────────┘                              │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod codec;
pub mod engine;
pub mod historic;
pub mod ota;
pub mod stream;
pub mod transport;
