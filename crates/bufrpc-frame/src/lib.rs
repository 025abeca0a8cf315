//! Varint-framed wire format for bufrpc.
//!
//! This is the lowest layer of bufrpc. Every message on the stream is framed as:
//! - A varint length covering everything after itself
//! - A varint header packing the service id and the frame type
//! - A varint method id and a varint call id
//! - A payload produced by a pluggable [`Codec`]
//!
//! The [`Parser`] reassembles frames from chunks split at any byte boundary.

pub mod codec;
pub mod encoding;
pub mod error;
#[cfg(feature = "async")]
pub mod framed;
pub mod parser;
pub mod varint;

pub use codec::{encode_frame, Frame, FrameConfig, FrameHeader, FrameType, DEFAULT_MAX_FRAME_SIZE};
pub use encoding::{Binary, Codec, ErrorEncoding, Json, Null, RemoteError, SharedErrorCodec};
pub use error::{CodecError, FrameError, Result};
#[cfg(feature = "async")]
pub use framed::FrameCodec;
pub use parser::Parser;
