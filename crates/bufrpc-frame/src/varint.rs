//! Base-128 varints.
//!
//! Seven value bits per byte, least significant group first, with the high
//! bit set on every byte except the last.

use bytes::BufMut;

use crate::error::{FrameError, Result};

/// Maximum encoded width of a varint field, in bytes.
pub const MAX_VARINT_LEN: usize = 8;

/// Largest value that fits in [`MAX_VARINT_LEN`] bytes (56 bits).
pub const MAX_VARINT: u64 = (1 << (7 * MAX_VARINT_LEN)) - 1;

/// Number of bytes `value` occupies once encoded.
pub fn encoding_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Append the varint encoding of `value` to `dst`.
pub fn encode(mut value: u64, dst: &mut impl BufMut) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decode one varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed, or `Ok(None)` if
/// `src` ends before the varint terminates.
pub fn decode(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut decoder = VarintDecoder::default();
    for &byte in src {
        if let Some(decoded) = decoder.push(byte)? {
            return Ok(Some(decoded));
        }
    }
    Ok(None)
}

/// Resumable decoder for a single varint field.
///
/// Bytes are pushed one at a time; partial state survives between pushes so
/// a field split across input chunks decodes the same as a contiguous one.
#[derive(Debug, Default, Clone)]
pub struct VarintDecoder {
    value: u64,
    shift: u32,
    consumed: usize,
}

impl VarintDecoder {
    /// Feed one byte.
    ///
    /// Returns `(value, encoded_len)` once the terminating byte arrives and
    /// resets for the next field.
    pub fn push(&mut self, byte: u8) -> Result<Option<(u64, usize)>> {
        self.value |= u64::from(byte & 0x7f) << self.shift;
        self.consumed += 1;

        if byte & 0x80 == 0 {
            let decoded = (self.value, self.consumed);
            *self = Self::default();
            return Ok(Some(decoded));
        }

        if self.consumed >= MAX_VARINT_LEN {
            return Err(FrameError::MalformedVarint {
                max: MAX_VARINT_LEN,
            });
        }

        self.shift += 7;
        Ok(None)
    }

    /// Bytes consumed by the field currently being decoded.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// True when no partial field is buffered.
    pub fn is_empty(&self) -> bool {
        self.consumed == 0
    }
}
