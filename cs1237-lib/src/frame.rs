//! The framed binary telemetry protocol.
//!
//! Generation 1 ("telemetry") frames look like
//! `AA 55 | LEN | KIND | PAYLOAD[LEN-1] | CHECKSUM | 0D 0A`, where LEN
//! counts the kind byte plus the payload and CHECKSUM is the XOR of
//! everything from LEN through the payload. Generation 2 ("voltage stream")
//! is a fixed 10-byte frame `AA 55 | f32 LE volts | u16 LE pga | 0D 0A`
//! with no kind and no checksum. The two generations are incompatible and
//! deliberately not unified; a [`FrameDecoder`] is built for one of them.
//!
//! Encoding is pure and total for well-formed values. Decoding never fails:
//! malformed input is discarded a byte at a time and the decoder keeps
//! accumulating, which is the expected behavior while resynchronizing after
//! line noise.

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use tracing::trace;
use zerocopy::byteorder::big_endian::{I32 as I32be, U32 as U32be};
use zerocopy::byteorder::little_endian::{F32 as F32le, U16 as U16le};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::register::{Channel, Gain, Rate};

pub const FRAME_HEADER: [u8; 2] = [0xAA, 0x55];
pub const FRAME_TRAILER: [u8; 2] = [0x0D, 0x0A];

/// Upper bound on LEN; anything larger is treated as corruption rather than
/// allowed to stall the decoder waiting for bytes that never come.
const MAX_LEN: usize = 32;

const VOLTAGE_FRAME_LEN: usize = 10;

/// Message kind carried in a generation-1 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum FrameKind {
    Sample = 0x01,
    Error = 0x03,
    Status = 0x04,
    SetGain = 0xA1,
    SetRate = 0xA2,
    SetChannel = 0xA3,
    SetPower = 0xA4,
    ConfigAck = 0xB1,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Error codes carried in Error (0x03) frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    ReadFailed = 0x01,
    VerificationFailed = 0x02,
    Timeout = 0x03,
    /// Emitted by firmware variants that refuse the temperature channel at
    /// gain != 1 instead of forcing unity gain themselves. This core
    /// resolves the constraint automatically and never sends it.
    TemperatureRequiresUnityGain = 0x04,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Which configuration field a ConfigAck (0xB1) acknowledges. The values
/// double as the kind bytes of the corresponding set-requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ConfigKind {
    Gain = 0xA1,
    Rate = 0xA2,
    Channel = 0xA3,
    Power = 0xA4,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
struct SamplePayload {
    value: I32be,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
struct StatusPayload {
    gain: u8,
    rate: u8,
    channel: u8,
    good_reads: U32be,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
struct VoltagePayload {
    volts: F32le,
    pga: U16le,
}

/// One decoded (or encodable) frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Raw sign-extended ADC value, generation 1.
    Sample { value: i32 },
    /// Converted voltage plus active PGA factor, generation 2.
    Voltage { volts: f32, pga: u16 },
    Error { code: ErrorCode },
    Status {
        gain: Gain,
        rate: Rate,
        channel: Channel,
        good_reads: u32,
    },
    SetGain { gain: Gain },
    SetRate { rate: Rate },
    SetChannel { channel: Channel },
    SetPower { down: bool },
    ConfigAck { of: ConfigKind, value: u8 },
    /// Checksum-valid frame of a kind this build does not interpret.
    /// Surfaced rather than dropped so callers can log or forward it.
    Unknown { kind: u8, payload: Bytes },
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Sample { .. } | Frame::Voltage { .. } => FrameKind::Sample,
            Frame::Error { .. } => FrameKind::Error,
            Frame::Status { .. } => FrameKind::Status,
            Frame::SetGain { .. } => FrameKind::SetGain,
            Frame::SetRate { .. } => FrameKind::SetRate,
            Frame::SetChannel { .. } => FrameKind::SetChannel,
            Frame::SetPower { .. } => FrameKind::SetPower,
            Frame::ConfigAck { .. } => FrameKind::ConfigAck,
            Frame::Unknown { kind, .. } => FrameKind::from_primitive(*kind),
        }
    }

    /// Serialize into a self-delimited byte sequence.
    pub fn encode(&self) -> Bytes {
        if let Frame::Voltage { volts, pga } = self {
            let payload = VoltagePayload {
                volts: F32le::new(*volts),
                pga: U16le::new(*pga),
            };
            let mut buf = BytesMut::with_capacity(VOLTAGE_FRAME_LEN);
            buf.put_slice(&FRAME_HEADER);
            buf.put_slice(payload.as_bytes());
            buf.put_slice(&FRAME_TRAILER);
            return buf.freeze();
        }

        let (kind, payload) = self.kind_and_payload();
        let len = (payload.len() + 1) as u8;
        let mut buf = BytesMut::with_capacity(payload.len() + 7);
        buf.put_slice(&FRAME_HEADER);
        buf.put_u8(len);
        buf.put_u8(kind);
        buf.put_slice(&payload);
        let mut checksum = len ^ kind;
        for b in &payload {
            checksum ^= b;
        }
        buf.put_u8(checksum);
        buf.put_slice(&FRAME_TRAILER);
        buf.freeze()
    }

    fn kind_and_payload(&self) -> (u8, Vec<u8>) {
        match self {
            Frame::Sample { value } => {
                let payload = SamplePayload { value: I32be::new(*value) };
                (FrameKind::Sample.into(), payload.as_bytes().to_vec())
            }
            Frame::Voltage { .. } => unreachable!("voltage frames use the fixed layout"),
            Frame::Error { code } => (FrameKind::Error.into(), vec![(*code).into()]),
            Frame::Status { gain, rate, channel, good_reads } => {
                let payload = StatusPayload {
                    gain: (*gain).into(),
                    rate: (*rate).into(),
                    channel: (*channel).into(),
                    good_reads: U32be::new(*good_reads),
                };
                (FrameKind::Status.into(), payload.as_bytes().to_vec())
            }
            Frame::SetGain { gain } => (ConfigKind::Gain.into(), vec![(*gain).into()]),
            Frame::SetRate { rate } => (ConfigKind::Rate.into(), vec![(*rate).into()]),
            Frame::SetChannel { channel } => (ConfigKind::Channel.into(), vec![(*channel).into()]),
            Frame::SetPower { down } => (ConfigKind::Power.into(), vec![*down as u8]),
            Frame::ConfigAck { of, value } => {
                (FrameKind::ConfigAck.into(), vec![(*of).into(), *value])
            }
            Frame::Unknown { kind, payload } => (*kind, payload.to_vec()),
        }
    }
}

fn parse_payload(kind: u8, payload: &[u8]) -> Option<Frame> {
    match FrameKind::from_primitive(kind) {
        FrameKind::Sample => {
            let p = SamplePayload::read_from_bytes(payload).ok()?;
            Some(Frame::Sample { value: p.value.get() })
        }
        FrameKind::Error => {
            let [code] = payload else { return None };
            Some(Frame::Error { code: ErrorCode::from_primitive(*code) })
        }
        FrameKind::Status => {
            let p = StatusPayload::read_from_bytes(payload).ok()?;
            Some(Frame::Status {
                gain: Gain::try_from(p.gain).ok()?,
                rate: Rate::try_from(p.rate).ok()?,
                channel: Channel::try_from(p.channel).ok()?,
                good_reads: p.good_reads.get(),
            })
        }
        FrameKind::SetGain => {
            let [code] = payload else { return None };
            Some(Frame::SetGain { gain: Gain::try_from(*code).ok()? })
        }
        FrameKind::SetRate => {
            let [code] = payload else { return None };
            Some(Frame::SetRate { rate: Rate::try_from(*code).ok()? })
        }
        FrameKind::SetChannel => {
            let [code] = payload else { return None };
            Some(Frame::SetChannel { channel: Channel::try_from(*code).ok()? })
        }
        FrameKind::SetPower => match payload {
            [0] => Some(Frame::SetPower { down: false }),
            [1] => Some(Frame::SetPower { down: true }),
            _ => None,
        },
        FrameKind::ConfigAck => {
            let [of, value] = payload else { return None };
            Some(Frame::ConfigAck {
                of: ConfigKind::try_from(*of).ok()?,
                value: *value,
            })
        }
        FrameKind::Unknown(k) => Some(Frame::Unknown {
            kind: k,
            payload: Bytes::copy_from_slice(payload),
        }),
    }
}

/// Which frame generation a decoder speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Generation {
    #[default]
    Telemetry,
    VoltageStream,
}

enum Step {
    NeedMore,
    Emit(Frame, usize),
    Skip(usize),
}

/// Streaming frame reassembler. Restartable byte by byte: bytes may arrive
/// in any grouping, and garbage between frames is skipped one byte at a
/// time so a genuine frame starting inside it is never lost.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    generation: Generation,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Decoder for generation-1 telemetry frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder for generation-2 fixed voltage frames.
    pub fn voltage_stream() -> Self {
        Self {
            generation: Generation::VoltageStream,
            buf: Vec::new(),
        }
    }

    /// Feed one byte; returns a frame if this byte completed one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.buf.push(byte);
        loop {
            match self.try_parse() {
                Step::NeedMore => return None,
                Step::Emit(frame, consumed) => {
                    self.buf.drain(..consumed);
                    return Some(frame);
                }
                Step::Skip(n) => {
                    trace!("discarding {n} byte(s) while resynchronizing");
                    self.buf.drain(..n);
                }
            }
        }
    }

    /// Feed a chunk; returns every frame completed by it, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Bytes currently buffered awaiting completion.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn try_parse(&self) -> Step {
        let buf = &self.buf;
        if buf.is_empty() {
            return Step::NeedMore;
        }
        if buf[0] != FRAME_HEADER[0] {
            // Jump straight to the next candidate header byte.
            let skip = buf[1..]
                .iter()
                .position(|&b| b == FRAME_HEADER[0])
                .map_or(buf.len(), |i| i + 1);
            return Step::Skip(skip);
        }
        if buf.len() < 2 {
            return Step::NeedMore;
        }
        if buf[1] != FRAME_HEADER[1] {
            return Step::Skip(1);
        }
        match self.generation {
            Generation::Telemetry => Self::try_parse_telemetry(buf),
            Generation::VoltageStream => Self::try_parse_voltage(buf),
        }
    }

    fn try_parse_telemetry(buf: &[u8]) -> Step {
        if buf.len() < 3 {
            return Step::NeedMore;
        }
        let len = buf[2] as usize;
        if len == 0 || len > MAX_LEN {
            return Step::Skip(1);
        }
        let total = len + 6;
        if buf.len() < total {
            return Step::NeedMore;
        }
        let frame = &buf[..total];
        if frame[total - 2..] != FRAME_TRAILER {
            return Step::Skip(1);
        }
        let checksum = frame[2..3 + len].iter().fold(0u8, |acc, &b| acc ^ b);
        if checksum != frame[3 + len] {
            return Step::Skip(1);
        }
        match parse_payload(frame[3], &frame[4..3 + len]) {
            Some(decoded) => Step::Emit(decoded, total),
            None => Step::Skip(1),
        }
    }

    fn try_parse_voltage(buf: &[u8]) -> Step {
        if buf.len() < VOLTAGE_FRAME_LEN {
            return Step::NeedMore;
        }
        let frame = &buf[..VOLTAGE_FRAME_LEN];
        if frame[VOLTAGE_FRAME_LEN - 2..] != FRAME_TRAILER {
            return Step::Skip(1);
        }
        // No checksum in this generation; the trailer is the only guard.
        let p = match VoltagePayload::read_from_bytes(&frame[2..8]) {
            Ok(p) => p,
            Err(_) => return Step::Skip(1),
        };
        Step::Emit(
            Frame::Voltage {
                volts: p.volts.get(),
                pga: p.pga.get(),
            },
            VOLTAGE_FRAME_LEN,
        )
    }
}
