//! Command / report frame codec.
//!
//! Wire format (one frame per GATT write or notification):
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Opcode / tag │ Fixed-layout payload (N B)   │
//! │ (1B)         │ multi-byte ints little-endian│
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! Decoding is stateless and total: every byte sequence maps to either a
//! [`Command`] or a [`DecodeError`]. Encoding a [`Report`] cannot fail for
//! in-range inputs. The codec has no side effects, so a wire-format change
//! never touches protocol logic.

use core::fmt;

/// Version byte carried in `REPORT_PROTO_VER`.
pub const PROTOCOL_VERSION: u8 = 2;

/// Historic frame header: tag + count.
pub const HISTORIC_HEADER_LEN: usize = 2;
/// One historic point: `i32 ts | i16 temp×100 | i16 hum×100`.
pub const HISTORIC_POINT_LEN: usize = 8;
/// Upper bound on points per historic frame (fits a 517-byte ATT MTU).
pub const MAX_POINTS_PER_FRAME: usize = 64;
/// Largest frame the codec ever produces.
pub const MAX_FRAME_LEN: usize = HISTORIC_HEADER_LEN + MAX_POINTS_PER_FRAME * HISTORIC_POINT_LEN;

/// Encoded outbound frame.
pub type Frame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Inbound opcodes.
pub mod opcode {
    pub const PROTOCOL_VERSION: u8 = 0x01;
    pub const TIME_SYNC: u8 = 0x11;
    pub const WIFI_CREDENTIALS: u8 = 0x12;
    pub const SET_ENGINEERING_MODE: u8 = 0x13;
    pub const REQUEST_ENG_MODE_STATUS: u8 = 0x14;
    pub const REQUEST_STATUS: u8 = 0x20;
    pub const REQUEST_ENV: u8 = 0x30;
    pub const REQUEST_HISTORIC: u8 = 0x31;
    pub const ENABLE_REALTIME: u8 = 0x32;
    pub const DISABLE_REALTIME: u8 = 0x33;
    pub const SET_ALARM: u8 = 0x41;
    pub const OTA_START: u8 = 0xA0;
    pub const OTA_DATA: u8 = 0xA1;
    pub const OTA_END: u8 = 0xA2;
}

/// Outbound report tags.
pub mod tag {
    pub const REPORT_PROTO_VER: u8 = 0x71;
    pub const REPORT_STATUS: u8 = 0x80;
    pub const REPORT_TAKEN: u8 = 0x81;
    pub const ACK: u8 = 0x82;
    pub const REPORT_ENG_MODE_STATUS: u8 = 0x83;
    pub const REPORT_ENV: u8 = 0x90;
    pub const REPORT_HISTORIC_POINT: u8 = 0x91;
    pub const REPORT_HISTORIC_END: u8 = 0x92;
    pub const ERROR: u8 = 0xEE;
}

// ── Inbound ───────────────────────────────────────────────────

/// TIME_SYNC payload, raw as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSync {
    pub year_offset: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// A decoded inbound command. Payload slices borrow the inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    ProtocolVersion,
    TimeSync(TimeSync),
    WifiCredentials { ssid: &'a [u8], password: &'a [u8] },
    SetEngineeringMode(bool),
    RequestEngModeStatus,
    RequestStatus,
    RequestEnv,
    RequestHistoric,
    EnableRealtime,
    DisableRealtime,
    SetAlarm { hour: u8, minute: u8, enabled: bool },
    OtaStart { total_size: u32 },
    OtaData(&'a [u8]),
    OtaEnd,
}

impl Command<'_> {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::ProtocolVersion => opcode::PROTOCOL_VERSION,
            Self::TimeSync(_) => opcode::TIME_SYNC,
            Self::WifiCredentials { .. } => opcode::WIFI_CREDENTIALS,
            Self::SetEngineeringMode(_) => opcode::SET_ENGINEERING_MODE,
            Self::RequestEngModeStatus => opcode::REQUEST_ENG_MODE_STATUS,
            Self::RequestStatus => opcode::REQUEST_STATUS,
            Self::RequestEnv => opcode::REQUEST_ENV,
            Self::RequestHistoric => opcode::REQUEST_HISTORIC,
            Self::EnableRealtime => opcode::ENABLE_REALTIME,
            Self::DisableRealtime => opcode::DISABLE_REALTIME,
            Self::SetAlarm { .. } => opcode::SET_ALARM,
            Self::OtaStart { .. } => opcode::OTA_START,
            Self::OtaData(_) => opcode::OTA_DATA,
            Self::OtaEnd => opcode::OTA_END,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length write.
    Empty,
    /// Opcode / tag not in the protocol table.
    UnknownOpcode(u8),
    /// Frame length does not match the opcode's layout.
    Length { opcode: u8, len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode 0x{:02X}", op),
            Self::Length { opcode, len } => {
                write!(f, "bad length {} for opcode 0x{:02X}", len, opcode)
            }
        }
    }
}

fn expect_len(op: u8, frame: &[u8], exact: usize) -> Result<(), DecodeError> {
    if frame.len() == exact {
        Ok(())
    } else {
        Err(DecodeError::Length {
            opcode: op,
            len: frame.len(),
        })
    }
}

fn expect_min_len(op: u8, frame: &[u8], min: usize) -> Result<(), DecodeError> {
    if frame.len() >= min {
        Ok(())
    } else {
        Err(DecodeError::Length {
            opcode: op,
            len: frame.len(),
        })
    }
}

/// Decode one inbound frame.
pub fn decode_command(frame: &[u8]) -> Result<Command<'_>, DecodeError> {
    let (&op, payload) = frame.split_first().ok_or(DecodeError::Empty)?;

    match op {
        opcode::PROTOCOL_VERSION => {
            expect_len(op, frame, 1)?;
            Ok(Command::ProtocolVersion)
        }
        opcode::TIME_SYNC => {
            expect_len(op, frame, 7)?;
            Ok(Command::TimeSync(TimeSync {
                year_offset: payload[0],
                month: payload[1],
                day: payload[2],
                hour: payload[3],
                minute: payload[4],
                second: payload[5],
            }))
        }
        opcode::WIFI_CREDENTIALS => decode_wifi(frame),
        opcode::SET_ENGINEERING_MODE => {
            expect_len(op, frame, 2)?;
            Ok(Command::SetEngineeringMode(payload[0] == 0x01))
        }
        opcode::REQUEST_ENG_MODE_STATUS => {
            expect_len(op, frame, 1)?;
            Ok(Command::RequestEngModeStatus)
        }
        opcode::REQUEST_STATUS => Ok(Command::RequestStatus),
        opcode::REQUEST_ENV => Ok(Command::RequestEnv),
        opcode::REQUEST_HISTORIC => Ok(Command::RequestHistoric),
        opcode::ENABLE_REALTIME => Ok(Command::EnableRealtime),
        opcode::DISABLE_REALTIME => Ok(Command::DisableRealtime),
        opcode::SET_ALARM => {
            expect_min_len(op, frame, 4)?;
            Ok(Command::SetAlarm {
                hour: payload[0],
                minute: payload[1],
                enabled: payload[2] != 0,
            })
        }
        opcode::OTA_START => {
            expect_min_len(op, frame, 5)?;
            let total_size = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            Ok(Command::OtaStart { total_size })
        }
        opcode::OTA_DATA => Ok(Command::OtaData(payload)),
        opcode::OTA_END => Ok(Command::OtaEnd),
        other => Err(DecodeError::UnknownOpcode(other)),
    }
}

/// `0x12 | ssidLen | ssid… | passLen | pass…`
fn decode_wifi(frame: &[u8]) -> Result<Command<'_>, DecodeError> {
    let bad = DecodeError::Length {
        opcode: opcode::WIFI_CREDENTIALS,
        len: frame.len(),
    };
    if frame.len() < 3 {
        return Err(bad);
    }
    let ssid_len = frame[1] as usize;
    let pass_len_at = 2 + ssid_len;
    let Some(&pass_len) = frame.get(pass_len_at) else {
        return Err(bad);
    };
    if frame.len() != 3 + ssid_len + pass_len as usize {
        return Err(bad);
    }
    Ok(Command::WifiCredentials {
        ssid: &frame[2..pass_len_at],
        password: &frame[pass_len_at + 1..],
    })
}

// ── Outbound ──────────────────────────────────────────────────

/// Wire error codes carried by the `ERROR` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Sensor cache holds no valid reading.
    SensorInvalid,
    /// Opcode not recognised.
    UnknownCommand,
    /// OTA DATA/END without START, or START while already receiving.
    WrongSequence,
    /// Storage / update partition failure, or channel busy.
    Access,
    /// Payload too short or would overflow the announced size.
    Length,
}

impl ErrorCode {
    pub const fn code(self) -> u8 {
        match self {
            Self::SensorInvalid => 0x02,
            Self::UnknownCommand | Self::WrongSequence => 0x03,
            Self::Access => 0x04,
            Self::Length => 0x05,
        }
    }

    /// 0x03 is shared on the wire; it decodes as [`ErrorCode::UnknownCommand`].
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x02 => Some(Self::SensorInvalid),
            0x03 => Some(Self::UnknownCommand),
            0x04 => Some(Self::Access),
            0x05 => Some(Self::Length),
            _ => None,
        }
    }
}

/// One sample inside a `REPORT_HISTORIC_POINT` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricPoint {
    pub timestamp: i32,
    pub temperature_centi: i16,
    pub humidity_centi: i16,
}

/// Scale a physical reading to the wire's hundredths. Saturates; NaN → 0.
pub fn to_centi(value: f32) -> i16 {
    (value * 100.0) as i16
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    ProtocolVersion(u8),
    Status(u8),
    MedicationTaken(u8),
    Ack,
    EngineeringMode(bool),
    Environment {
        temperature_centi: i16,
        humidity_centi: i16,
    },
    HistoricPoints(heapless::Vec<HistoricPoint, MAX_POINTS_PER_FRAME>),
    HistoricEnd,
    Error(ErrorCode),
}

impl Report {
    pub fn tag(&self) -> u8 {
        match self {
            Self::ProtocolVersion(_) => tag::REPORT_PROTO_VER,
            Self::Status(_) => tag::REPORT_STATUS,
            Self::MedicationTaken(_) => tag::REPORT_TAKEN,
            Self::Ack => tag::ACK,
            Self::EngineeringMode(_) => tag::REPORT_ENG_MODE_STATUS,
            Self::Environment { .. } => tag::REPORT_ENV,
            Self::HistoricPoints(_) => tag::REPORT_HISTORIC_POINT,
            Self::HistoricEnd => tag::REPORT_HISTORIC_END,
            Self::Error(_) => tag::ERROR,
        }
    }

    /// Serialise into a single frame.
    pub fn encode(&self) -> Frame {
        let mut out = Frame::new();
        // Every layout is bounded by MAX_FRAME_LEN, so pushes cannot fail.
        let mut put = |bytes: &[u8]| {
            let _ = out.extend_from_slice(bytes);
        };
        put(&[self.tag()]);
        match self {
            Self::ProtocolVersion(v) | Self::Status(v) | Self::MedicationTaken(v) => put(&[*v]),
            Self::EngineeringMode(on) => put(&[u8::from(*on)]),
            Self::Environment {
                temperature_centi,
                humidity_centi,
            } => {
                put(&temperature_centi.to_le_bytes());
                put(&humidity_centi.to_le_bytes());
            }
            Self::HistoricPoints(points) => {
                put(&[points.len() as u8]);
                for p in points {
                    put(&p.timestamp.to_le_bytes());
                    put(&p.temperature_centi.to_le_bytes());
                    put(&p.humidity_centi.to_le_bytes());
                }
            }
            Self::Error(code) => put(&[code.code()]),
            Self::Ack | Self::HistoricEnd => {}
        }
        out
    }

    /// Parse an outbound frame (peer side / test harness).
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let (&t, payload) = frame.split_first().ok_or(DecodeError::Empty)?;
        let bad = DecodeError::Length {
            opcode: t,
            len: frame.len(),
        };
        let byte = || match payload {
            [b] => Ok(*b),
            _ => Err(bad),
        };
        match t {
            tag::REPORT_PROTO_VER => Ok(Self::ProtocolVersion(byte()?)),
            tag::REPORT_STATUS => Ok(Self::Status(byte()?)),
            tag::REPORT_TAKEN => Ok(Self::MedicationTaken(byte()?)),
            tag::ACK if payload.is_empty() => Ok(Self::Ack),
            tag::REPORT_ENG_MODE_STATUS => Ok(Self::EngineeringMode(byte()? != 0)),
            tag::REPORT_ENV => match payload {
                [t0, t1, h0, h1] => Ok(Self::Environment {
                    temperature_centi: i16::from_le_bytes([*t0, *t1]),
                    humidity_centi: i16::from_le_bytes([*h0, *h1]),
                }),
                _ => Err(bad),
            },
            tag::REPORT_HISTORIC_POINT => {
                let (&count, body) = payload.split_first().ok_or(bad)?;
                if body.len() != count as usize * HISTORIC_POINT_LEN {
                    return Err(bad);
                }
                let mut points = heapless::Vec::new();
                for chunk in body.chunks_exact(HISTORIC_POINT_LEN) {
                    let point = HistoricPoint {
                        timestamp: i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                        temperature_centi: i16::from_le_bytes([chunk[4], chunk[5]]),
                        humidity_centi: i16::from_le_bytes([chunk[6], chunk[7]]),
                    };
                    points.push(point).map_err(|_| bad)?;
                }
                Ok(Self::HistoricPoints(points))
            }
            tag::REPORT_HISTORIC_END if payload.is_empty() => Ok(Self::HistoricEnd),
            tag::ERROR => ErrorCode::from_code(byte()?)
                .map(Self::Error)
                .ok_or(bad),
            tag::ACK | tag::REPORT_HISTORIC_END => Err(bad),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
