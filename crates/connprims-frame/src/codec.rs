use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kinds;

/// Frame header: magic (2) + length (4) + kind (2) + sequence (8) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Magic bytes: "CP" (0x43 0x50).
pub const MAGIC: [u8; 2] = [0x43, 0x50];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest payload the length field can describe.
pub const UNLIMITED_PAYLOAD: usize = u32::MAX as usize;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the payload is, see [`crate::kinds`].
    pub kind: u16,
    /// Sequence number attached by the sender.
    pub seq: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: u16, seq: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            seq,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Fail unless this frame has the given kind.
    pub fn expect_kind(self, kind: u16) -> Result<Self> {
        if self.kind == kind {
            Ok(self)
        } else {
            Err(FrameError::UnexpectedKind {
                expected: kinds::kind_name(kind),
                found: kinds::kind_name(self.kind),
            })
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬───────────┬──────────┬────────────┬────────────────┐
/// │ Magic (2B) │ Length    │ Kind     │ Seq        │ Payload        │
/// │ 0x43 0x50  │ (4B LE)   │ (2B LE)  │ (8B LE)    │ (Length bytes) │
/// │ "CP"       │           │          │            │                │
/// └────────────┴───────────┴──────────┴────────────┴────────────────┘
/// ```
pub fn encode_frame(kind: u16, seq: u64, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: UNLIMITED_PAYLOAD,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(kind);
    dst.put_u64_le(seq);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut header = &src[2..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let kind = header.get_u16_le();
    let seq = header.get_u64_le();

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { kind, seq, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, both directions. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
