//! `tokio_util::codec` adapter for raw frame streams.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::parser::Parser;

/// Decodes and encodes whole [`Frame`]s with raw payloads.
///
/// Use with `FramedRead`/`FramedWrite` to speak the wire format without an
/// RPC endpoint, e.g. in tools and protocol tests.
#[derive(Debug, Default)]
pub struct FrameCodec {
    parser: Parser,
    ready: VecDeque<Frame>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            parser: Parser::with_config(config),
            ready: VecDeque::new(),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let chunk = src.split().freeze();
        let ready = &mut self.ready;
        self.parser.recv(chunk, |frame, _| {
            ready.push_back(frame);
            Ok::<(), FrameError>(())
        })?;

        Ok(self.ready.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.parser.is_idle() {
            Ok(None)
        } else {
            Err(FrameError::ConnectionClosed)
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.encode(dst)
    }
}
