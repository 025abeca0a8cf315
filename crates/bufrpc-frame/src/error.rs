/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A varint field ran past its maximum width without terminating.
    #[error("malformed varint (no terminating byte within {max} bytes)")]
    MalformedVarint { max: usize },

    /// The length prefix is too short to hold the header fields.
    #[error("frame length too short to hold the {0}")]
    TruncatedHeader(&'static str),

    /// The payload exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: u64, max: usize },

    /// The header carries a type tag outside Request/Response/Error.
    #[error("invalid frame type {0}")]
    InvalidType(u8),

    /// A decoded id does not fit its field.
    #[error("{field} {value} out of range")]
    FieldOverflow { field: &'static str, value: u64 },

    /// A payload codec wrote a different number of bytes than it reported.
    #[error("payload codec wrote {written} bytes, reported {declared}")]
    LengthMismatch { declared: usize, written: usize },

    /// A payload codec failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The parser hit a fatal error earlier and rejects further input.
    #[error("parser destroyed")]
    Destroyed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

/// Errors raised by payload codecs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload bytes could not be decoded into a value.
    #[error("decode error: {0}")]
    Decode(String),

    /// The value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
