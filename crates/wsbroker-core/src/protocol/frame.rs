//! RFC 6455 frame codec (panic-free).
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.
//!
//! Wire layout:
//! - byte 0: FIN | RSV1 | RSV2 | RSV3 | opcode(4)
//! - byte 1: MASK | length class(7): 0..=125 literal, 126 => u16 BE, 127 => u64 BE
//! - mask key (u32 BE) when MASK is set
//! - payload

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WsBrokerError};
use crate::protocol::close;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

const FIN_BIT: u8 = 0x80;
const RSV1_BIT: u8 = 0x40;
const RSV2_BIT: u8 = 0x20;
const RSV3_BIT: u8 = 0x10;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_BITS: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// Frame opcode (4 bits on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse the low nibble of byte 0. Reserved opcodes are a protocol error.
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(WsBrokerError::Protocol(format!(
                "reserved opcode 0x{other:X}"
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, ping and pong.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Continuation => "continuation",
            Opcode::Text => "text",
            Opcode::Binary => "binary",
            Opcode::Close => "close",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
        }
    }
}

/// Which wire encoding carries the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    /// 0..=125, stored in byte 1.
    Inline,
    /// 126..=65535, stored in a 16-bit extension.
    Extended16,
    /// Anything larger, stored in a 64-bit extension.
    Extended64,
}

impl LengthClass {
    /// Minimal class able to represent `len`.
    pub fn for_len(len: u64) -> Self {
        if len <= 125 {
            LengthClass::Inline
        } else if len <= u64::from(u16::MAX) {
            LengthClass::Extended16
        } else {
            LengthClass::Extended64
        }
    }

    /// Bytes following byte 1 that hold the length.
    pub fn extension_len(self) -> usize {
        match self {
            LengthClass::Inline => 0,
            LengthClass::Extended16 => 2,
            LengthClass::Extended64 => 8,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment of a message.
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: Opcode,
    /// Masking key; present iff the MASK bit is set.
    pub mask: Option<u32>,
    /// Payload length, independent of the wire length class.
    pub length: u64,
}

impl FrameHeader {
    /// Final, unmasked header with no reserved bits.
    pub fn new(opcode: Opcode, length: u64) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            length,
        }
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    pub fn length_class(&self) -> LengthClass {
        LengthClass::for_len(self.length)
    }

    /// Number of bytes `encode` writes for this header.
    pub fn encoded_len(&self) -> usize {
        let mask = if self.is_masked() { 4 } else { 0 };
        2 + self.length_class().extension_len() + mask
    }

    /// Append the wire form of this header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= FIN_BIT;
        }
        if self.rsv1 {
            b0 |= RSV1_BIT;
        }
        if self.rsv2 {
            b0 |= RSV2_BIT;
        }
        if self.rsv3 {
            b0 |= RSV3_BIT;
        }
        dst.put_u8(b0);

        let mask_bit = if self.is_masked() { MASK_BIT } else { 0 };
        match self.length_class() {
            LengthClass::Inline => dst.put_u8(mask_bit | self.length as u8),
            LengthClass::Extended16 => {
                dst.put_u8(mask_bit | LEN_16);
                dst.put_u16(self.length as u16);
            }
            LengthClass::Extended64 => {
                dst.put_u8(mask_bit | LEN_64);
                dst.put_u64(self.length);
            }
        }

        if let Some(key) = self.mask {
            dst.put_u32(key);
        }
    }

    /// Session-level checks applied after decoding and before the payload is read.
    pub fn validate(&self, max_payload: u64) -> Result<()> {
        if self.opcode.is_control() {
            if !self.fin {
                return Err(WsBrokerError::Protocol(
                    "control frames must not be fragmented".into(),
                ));
            }
            if self.length > MAX_CONTROL_PAYLOAD {
                return Err(WsBrokerError::Protocol(format!(
                    "control frame payload of {} bytes exceeds {MAX_CONTROL_PAYLOAD}",
                    self.length
                )));
            }
        }
        if self.length > max_payload {
            return Err(WsBrokerError::MessageTooBig {
                len: self.length,
                max: max_payload,
            });
        }
        Ok(())
    }
}

/// Total header size implied by byte 1 (the MASK bit and the length class).
pub fn header_len(second_byte: u8) -> usize {
    let ext = match second_byte & LEN_BITS {
        LEN_16 => 2,
        LEN_64 => 8,
        _ => 0,
    };
    let mask = if second_byte & MASK_BIT != 0 { 4 } else { 0 };
    2 + ext + mask
}

fn need<B: Buf>(buf: &B, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(WsBrokerError::TruncatedStream(format!(
            "{what}: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

/// Decode one frame header from `buf`.
pub fn decode_header<B: Buf>(buf: &mut B) -> Result<FrameHeader> {
    need(buf, 2, "frame header")?;
    let b0 = buf.get_u8();
    let b1 = buf.get_u8();

    let opcode = Opcode::from_u8(b0 & OPCODE_BITS)?;
    let masked = b1 & MASK_BIT != 0;

    let length = match b1 & LEN_BITS {
        LEN_16 => {
            need(buf, 2, "16-bit length")?;
            u64::from(buf.get_u16())
        }
        LEN_64 => {
            need(buf, 8, "64-bit length")?;
            let len = buf.get_u64();
            if len >> 63 != 0 {
                return Err(WsBrokerError::Protocol(
                    "most significant bit of 64-bit length must be 0".into(),
                ));
            }
            len
        }
        n => u64::from(n),
    };

    let mask = if masked {
        need(buf, 4, "mask key")?;
        Some(buf.get_u32())
    } else {
        None
    };

    let header = FrameHeader {
        fin: b0 & FIN_BIT != 0,
        rsv1: b0 & RSV1_BIT != 0,
        rsv2: b0 & RSV2_BIT != 0,
        rsv3: b0 & RSV3_BIT != 0,
        opcode,
        mask,
        length,
    };
    tracing::trace!(
        fin = header.fin,
        opcode = header.opcode.as_str(),
        masked = masked,
        length = header.length,
        "decoded frame header"
    );
    Ok(header)
}

/// Read exactly `header.length` payload bytes, unmasking them when needed.
pub fn decode_payload<B: Buf>(buf: &mut B, header: &FrameHeader) -> Result<Bytes> {
    let len = usize::try_from(header.length).map_err(|_| {
        WsBrokerError::Protocol(format!(
            "payload length {} exceeds platform limits",
            header.length
        ))
    })?;
    if len == 0 {
        return Ok(Bytes::new());
    }
    need(buf, len, "payload")?;

    let mut payload = vec![0u8; len];
    buf.copy_to_slice(&mut payload);
    if let Some(key) = header.mask {
        unmask(key, &mut payload);
    }
    Ok(Bytes::from(payload))
}

/// XOR `payload` with the 32-bit key, consuming key bytes in big-endian order.
///
/// Masking and unmasking are the same operation.
pub fn unmask(key: u32, payload: &mut [u8]) {
    let key = key.to_be_bytes();
    for (byte, k) in payload.iter_mut().zip(key.iter().cycle()) {
        *byte ^= k;
    }
}

/// One header plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Final, unmasked frame whose header length matches `payload`.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader::new(opcode, payload.len() as u64),
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, Bytes::from(text.into()))
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn ping() -> Self {
        Self::new(Opcode::Ping, Bytes::new())
    }

    pub fn pong() -> Self {
        Self::new(Opcode::Pong, Bytes::new())
    }

    /// Close frame carrying only the 2-byte status code.
    pub fn close(code: u16) -> Self {
        Self::close_with_reason(code, "")
    }

    pub fn close_with_reason(code: u16, reason: &str) -> Self {
        Self::new(Opcode::Close, close::close_payload(code, reason))
    }

    /// Set the masking key (client role).
    pub fn masked(mut self, key: u32) -> Self {
        self.header.mask = Some(key);
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Wire bytes. The header length always follows the payload, and the
    /// payload is masked whenever a key is set.
    pub fn encode(&self) -> Bytes {
        let header = FrameHeader {
            length: self.payload.len() as u64,
            ..self.header
        };
        let mut dst = BytesMut::with_capacity(header.encoded_len() + self.payload.len());
        header.encode(&mut dst);

        let start = dst.len();
        dst.extend_from_slice(&self.payload);
        if let Some(key) = header.mask {
            unmask(key, &mut dst[start..]);
        }
        dst.freeze()
    }

    /// Decode a complete frame from an in-memory buffer.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let header = decode_header(buf)?;
        let payload = decode_payload(buf, &header)?;
        Ok(Self { header, payload })
    }
}
