use bytes::{Bytes, BytesMut};

use crate::encoding::{Binary, Codec};
use crate::error::{FrameError, Result};
use crate::varint;

/// Default maximum payload size: 8 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Frame type, stored in the low two bits of the header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Request = 0,
    Response = 1,
    Error = 2,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(FrameType::Request),
            1 => Ok(FrameType::Response),
            2 => Ok(FrameType::Error),
            other => Err(FrameError::InvalidType(other)),
        }
    }
}

/// Routing fields of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub service_id: u32,
    pub method_id: u32,
    /// Correlates a reply with its request. 0 means no reply is expected.
    pub call_id: u32,
}

impl FrameHeader {
    pub fn new(frame_type: FrameType, service_id: u32, method_id: u32, call_id: u32) -> Self {
        Self {
            frame_type,
            service_id,
            method_id,
            call_id,
        }
    }

    /// The header for a reply of `frame_type` to this frame.
    pub fn reply(&self, frame_type: FrameType) -> Self {
        Self {
            frame_type,
            ..*self
        }
    }

    /// True for requests that must not be answered.
    pub fn is_no_reply(&self) -> bool {
        self.frame_type == FrameType::Request && self.call_id == 0
    }

    /// `(service_id << 2) | type`, the first varint after the length.
    pub fn packed(&self) -> u64 {
        (u64::from(self.service_id) << 2) | self.frame_type as u64
    }

    /// Split a packed header field into frame type and service id.
    pub fn unpack(packed: u64) -> Result<(FrameType, u32)> {
        let frame_type = FrameType::try_from((packed & 0b11) as u8)?;
        let service = packed >> 2;
        let service_id = u32::try_from(service).map_err(|_| FrameError::FieldOverflow {
            field: "service id",
            value: service,
        })?;
        Ok((frame_type, service_id))
    }

    /// Encoded size of the three header varints.
    pub fn encoding_length(&self) -> usize {
        varint::encoding_length(self.packed())
            + varint::encoding_length(u64::from(self.method_id))
            + varint::encoding_length(u64::from(self.call_id))
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (length prefix + header + payload).
    pub fn wire_size(&self) -> usize {
        let length = self.header.encoding_length() + self.payload.len();
        varint::encoding_length(length as u64) + length
    }

    /// Encode this frame with a raw payload.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&self.header, &self.payload, &Binary, dst)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────────┬────────────┬──────────┬──────────┐
/// │ length       │ header                  │ method     │ id       │ payload  │
/// │ varint       │ varint                  │ varint     │ varint   │ codec    │
/// │              │ (service << 2) | type   │            │          │          │
/// └──────────────┴─────────────────────────┴────────────┴──────────┴──────────┘
/// ```
///
/// `length` counts every byte after itself. On error `dst` is left as it
/// was before the call.
pub fn encode_frame<C>(header: &FrameHeader, value: &C::Value, codec: &C, dst: &mut BytesMut) -> Result<()>
where
    C: Codec + ?Sized,
{
    let payload_len = codec.encoding_length(value);
    let length = header.encoding_length() + payload_len;

    let frame_start = dst.len();
    dst.reserve(varint::encoding_length(length as u64) + length);
    varint::encode(length as u64, dst);
    varint::encode(header.packed(), dst);
    varint::encode(u64::from(header.method_id), dst);
    varint::encode(u64::from(header.call_id), dst);

    let start = dst.len();
    if let Err(err) = codec.encode(value, dst) {
        dst.truncate(frame_start);
        return Err(err.into());
    }
    let written = dst.len() - start;
    if written != payload_len {
        dst.truncate(frame_start);
        return Err(FrameError::LengthMismatch {
            declared: payload_len,
            written,
        });
    }

    Ok(())
}

/// Configuration for frame parsing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 8 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
