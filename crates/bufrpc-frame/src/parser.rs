//! Streaming frame parser.
//!
//! Consumes byte chunks of any size, split at any boundary, and emits each
//! frame as soon as its last byte arrives. Varint fields and payloads that
//! straddle chunks are resumed on the next call to [`Parser::recv`].

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{Frame, FrameConfig, FrameHeader, FrameType};
use crate::error::{FrameError, Result};
use crate::varint::VarintDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length,
    Header,
    Method,
    Id,
    Payload,
}

/// Resumable frame parser.
///
/// Any error, from the input or from the frame callback, destroys the parser;
/// every later call to [`Parser::recv`] fails with [`FrameError::Destroyed`].
#[derive(Debug)]
pub struct Parser {
    state: State,
    varint: VarintDecoder,
    /// Bytes of the current frame not yet consumed, after the length prefix.
    remaining: u64,
    frame_type: FrameType,
    service_id: u32,
    method_id: u32,
    call_id: u32,
    partial: Option<BytesMut>,
    config: FrameConfig,
    destroyed: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Create a parser with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a parser with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            state: State::Length,
            varint: VarintDecoder::default(),
            remaining: 0,
            frame_type: FrameType::Request,
            service_id: 0,
            method_id: 0,
            call_id: 0,
            partial: None,
            config,
            destroyed: false,
        }
    }

    /// Feed one chunk of input.
    ///
    /// `on_frame` is called for every completed frame with the frame and the
    /// bytes of `chunk` that follow it. A payload lying entirely inside
    /// `chunk` is handed out as a slice of it without copying.
    ///
    /// Taking `&mut self` rules out a second `recv` while one is in flight.
    pub fn recv<F, E>(&mut self, chunk: Bytes, mut on_frame: F) -> std::result::Result<(), E>
    where
        F: FnMut(Frame, &[u8]) -> std::result::Result<(), E>,
        E: From<FrameError>,
    {
        if self.destroyed {
            return Err(FrameError::Destroyed.into());
        }

        let result = self.consume(&chunk, &mut on_frame);
        if result.is_err() {
            self.destroyed = true;
            self.partial = None;
        }
        result
    }

    fn consume<F, E>(&mut self, chunk: &Bytes, on_frame: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(Frame, &[u8]) -> std::result::Result<(), E>,
        E: From<FrameError>,
    {
        let mut offset = 0;
        while offset < chunk.len() {
            if self.state == State::Payload {
                offset = self.read_payload(chunk, offset, on_frame)?;
                continue;
            }

            let byte = chunk[offset];
            offset += 1;
            if let Some((value, consumed)) = self.varint.push(byte)? {
                self.next_state(value, consumed)?;
                if self.state == State::Payload && self.remaining == 0 {
                    self.emit(Bytes::new(), &chunk[offset..], on_frame)?;
                }
            }
        }

        if self.state == State::Payload {
            trace!(missing = self.remaining, "payload spans chunks");
        }
        Ok(())
    }

    fn next_state(&mut self, value: u64, consumed: usize) -> Result<()> {
        match self.state {
            State::Length => {
                if value == 0 {
                    trace!("skipping empty frame");
                    return Ok(());
                }
                self.remaining = value;
                self.state = State::Header;
            }
            State::Header => {
                self.take_header_bytes(consumed, "method id")?;
                let (frame_type, service_id) = FrameHeader::unpack(value)?;
                self.frame_type = frame_type;
                self.service_id = service_id;
                self.state = State::Method;
            }
            State::Method => {
                self.take_header_bytes(consumed, "call id")?;
                self.method_id = narrow(value, "method id")?;
                self.state = State::Id;
            }
            State::Id => {
                let consumed = consumed as u64;
                if consumed > self.remaining {
                    return Err(FrameError::TruncatedHeader("call id"));
                }
                self.remaining -= consumed;
                self.call_id = narrow(value, "call id")?;

                if self.remaining > self.config.max_frame_size as u64 {
                    return Err(FrameError::FrameTooLarge {
                        size: self.remaining,
                        max: self.config.max_frame_size,
                    });
                }
                self.state = State::Payload;
            }
            State::Payload => unreachable!("payload bytes are not varint-decoded"),
        }
        Ok(())
    }

    /// Charge a header varint against the frame length, leaving room for the
    /// next field.
    fn take_header_bytes(&mut self, consumed: usize, next: &'static str) -> Result<()> {
        let consumed = consumed as u64;
        if consumed >= self.remaining {
            return Err(FrameError::TruncatedHeader(next));
        }
        self.remaining -= consumed;
        Ok(())
    }

    fn read_payload<F, E>(
        &mut self,
        chunk: &Bytes,
        offset: usize,
        on_frame: &mut F,
    ) -> std::result::Result<usize, E>
    where
        F: FnMut(Frame, &[u8]) -> std::result::Result<(), E>,
        E: From<FrameError>,
    {
        // Bounded by max_frame_size, which is a usize.
        let needed = self.remaining as usize;
        let available = chunk.len() - offset;

        if available >= needed {
            let end = offset + needed;
            let payload = match self.partial.take() {
                Some(mut buf) => {
                    buf.extend_from_slice(&chunk[offset..end]);
                    buf.freeze()
                }
                None => chunk.slice(offset..end),
            };
            self.emit(payload, &chunk[end..], on_frame)?;
            return Ok(end);
        }

        let buf = self
            .partial
            .get_or_insert_with(|| BytesMut::with_capacity(needed));
        buf.extend_from_slice(&chunk[offset..]);
        self.remaining -= available as u64;
        Ok(chunk.len())
    }

    fn emit<F, E>(&mut self, payload: Bytes, trailing: &[u8], on_frame: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(Frame, &[u8]) -> std::result::Result<(), E>,
    {
        let header = FrameHeader::new(self.frame_type, self.service_id, self.method_id, self.call_id);
        self.state = State::Length;
        self.remaining = 0;

        trace!(
            frame_type = ?header.frame_type,
            service_id = header.service_id,
            method_id = header.method_id,
            call_id = header.call_id,
            payload_len = payload.len(),
            "frame parsed"
        );
        on_frame(Frame { header, payload }, trailing)
    }

    /// Payload bytes still needed to finish the current frame, if a payload
    /// is being assembled.
    pub fn missing(&self) -> Option<usize> {
        (self.state == State::Payload).then_some(self.remaining as usize)
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == State::Length && self.varint.is_empty()
    }

    /// True once a fatal error has been hit.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Update maximum payload size for subsequent frames.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current parser configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn narrow(value: u64, field: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| FrameError::FieldOverflow { field, value })
}
