//! Payload codecs.
//!
//! A [`Codec`] turns a typed value into payload bytes and back, and reports
//! the exact encoded size up front so a frame's length prefix can be written
//! before its payload.

use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Encoding strategy for one payload type.
pub trait Codec: Send + Sync + 'static {
    /// The value carried in the payload.
    type Value: Send + 'static;

    /// Append the encoding of `value` to `dst`.
    ///
    /// Must write exactly [`Codec::encoding_length`] bytes.
    fn encode(&self, value: &Self::Value, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Decode a complete payload.
    fn decode(&self, src: Bytes) -> Result<Self::Value, CodecError>;

    /// Encoded size of `value` in bytes.
    fn encoding_length(&self, value: &Self::Value) -> usize;
}

/// Error codec shared across methods of an endpoint.
pub type SharedErrorCodec = Arc<dyn Codec<Value = RemoteError>>;

/// Raw bytes, passed through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Binary;

impl Codec for Binary {
    type Value = Bytes;

    fn encode(&self, value: &Bytes, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.put_slice(value);
        Ok(())
    }

    fn decode(&self, src: Bytes) -> Result<Bytes, CodecError> {
        Ok(src)
    }

    fn encoding_length(&self, value: &Bytes) -> usize {
        value.len()
    }
}

/// No payload: encodes to zero bytes and decodes anything to `()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Null;

impl Codec for Null {
    type Value = ();

    fn encode(&self, _value: &(), _dst: &mut BytesMut) -> Result<(), CodecError> {
        Ok(())
    }

    fn decode(&self, _src: Bytes) -> Result<(), CodecError> {
        Ok(())
    }

    fn encoding_length(&self, _value: &()) -> usize {
        0
    }
}

/// An error reported by the remote side of a call.
///
/// Serializable so methods can carry it as `Json<RemoteError>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Default error codec: the error message as UTF-8 bytes.
///
/// Invalid UTF-8 from the peer is replaced rather than rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorEncoding;

impl Codec for ErrorEncoding {
    type Value = RemoteError;

    fn encode(&self, value: &RemoteError, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.put_slice(value.message.as_bytes());
        Ok(())
    }

    fn decode(&self, src: Bytes) -> Result<RemoteError, CodecError> {
        Ok(RemoteError::new(String::from_utf8_lossy(&src)))
    }

    fn encoding_length(&self, value: &RemoteError) -> usize {
        value.message.len()
    }
}

/// JSON payloads via serde.
pub struct Json<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Json<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Json")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Codec for Json<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn encode(&self, value: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
        serde_json::to_writer(dst.writer(), value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, src: Bytes) -> Result<T, CodecError> {
        serde_json::from_slice(&src).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encoding_length(&self, value: &T) -> usize {
        let mut counter = ByteCounter(0);
        // A value that fails to serialize reports 0 here and fails in `encode`.
        match serde_json::to_writer(&mut counter, value) {
            Ok(()) => counter.0,
            Err(_) => 0,
        }
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
