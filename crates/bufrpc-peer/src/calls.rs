//! Outstanding-call bookkeeping.
//!
//! Call ids index a growable slot array. Freed ids go on a stack and are
//! handed out again before the array grows, so a long-lived connection with
//! many short calls keeps a small id space. Slot 0 is never allocated: call
//! id 0 marks requests that expect no reply.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bufrpc_frame::{Codec, CodecError, FrameType, SharedErrorCodec};
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};

/// A call waiting for its reply.
pub(crate) trait PendingCall: Send {
    /// `(service_id, method_id)` the reply must carry.
    fn target(&self) -> (u32, u32);

    /// Decode a Response or Error payload and settle the caller.
    ///
    /// On a decode failure the caller receives the codec error as well.
    fn settle(self: Box<Self>, frame_type: FrameType, payload: Bytes) -> std::result::Result<(), CodecError>;

    /// Settle the caller with `err` without a reply.
    fn fail(self: Box<Self>, err: RpcError);
}

/// Pending call for a method whose response decodes with `Res`.
pub(crate) struct TypedCall<Res: Codec> {
    pub(crate) service_id: u32,
    pub(crate) method_id: u32,
    pub(crate) response: Arc<Res>,
    pub(crate) error: SharedErrorCodec,
    pub(crate) tx: oneshot::Sender<Result<Res::Value>>,
}

impl<Res: Codec> PendingCall for TypedCall<Res> {
    fn target(&self) -> (u32, u32) {
        (self.service_id, self.method_id)
    }

    fn settle(self: Box<Self>, frame_type: FrameType, payload: Bytes) -> std::result::Result<(), CodecError> {
        let outcome = match frame_type {
            FrameType::Error => self.error.decode(payload).map(|err| Err(RpcError::Remote(err))),
            _ => self.response.decode(payload).map(Ok),
        };

        match outcome {
            Ok(result) => {
                // The caller may have dropped its future; that is not an error here.
                let _ = self.tx.send(result);
                Ok(())
            }
            Err(err) => {
                let _ = self.tx.send(Err(RpcError::Codec(err.clone())));
                Err(err)
            }
        }
    }

    fn fail(self: Box<Self>, err: RpcError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Call table keyed by call id.
pub(crate) struct CallTable {
    slots: Vec<Option<Box<dyn PendingCall>>>,
    free: Vec<u32>,
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTable {
    pub(crate) fn new() -> Self {
        Self {
            // Slot 0 is the no-reply sentinel.
            slots: vec![None],
            free: Vec::new(),
        }
    }

    /// Store `call` and return its id. Never returns 0.
    pub(crate) fn allocate(&mut self, call: Box<dyn PendingCall>) -> Result<u32> {
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = Some(call);
            return Ok(id);
        }

        let id = u32::try_from(self.slots.len()).map_err(|_| RpcError::CallIdsExhausted)?;
        self.slots.push(Some(call));
        Ok(id)
    }

    /// Remove and return the call for `id`, releasing the id.
    pub(crate) fn complete(&mut self, id: u32) -> Option<Box<dyn PendingCall>> {
        if id == 0 {
            return None;
        }
        let call = self.slots.get_mut(id as usize)?.take()?;
        self.free.push(id);
        Some(call)
    }

    /// Fail every pending call with `ConnectionClosed(reason)` and clear the
    /// table.
    pub(crate) fn reject_all(&mut self, reason: &str) -> usize {
        let mut rejected = 0;
        for call in self.slots.drain(..).flatten() {
            call.fail(RpcError::ConnectionClosed(reason.to_string()));
            rejected += 1;
        }
        self.slots.push(None);
        self.free.clear();
        rejected
    }

    /// Number of allocated call ids.
    pub(crate) fn inflight(&self) -> usize {
        self.slots.len() - 1 - self.free.len()
    }
}

/// Future resolving to the reply of a request.
///
/// The request frame is already queued when this is returned; dropping the
/// future abandons the reply but does not cancel the call.
#[must_use = "the reply is lost if the future is dropped"]
pub struct ResponseFuture<T> {
    state: ResponseState<T>,
}

enum ResponseState<T> {
    Waiting(oneshot::Receiver<Result<T>>),
    Failed(Option<RpcError>),
}

impl<T> ResponseFuture<T> {
    pub(crate) fn waiting(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: ResponseState::Waiting(rx),
        }
    }

    pub(crate) fn failed(err: RpcError) -> Self {
        Self {
            state: ResponseState::Failed(Some(err)),
        }
    }
}

impl<T> Unpin for ResponseFuture<T> {}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            ResponseState::Waiting(rx) => Pin::new(rx).poll(cx).map(|received| {
                received.unwrap_or_else(|_| Err(RpcError::ConnectionClosed("endpoint dropped".to_string())))
            }),
            ResponseState::Failed(err) => Poll::Ready(Err(err
                .take()
                .unwrap_or_else(|| RpcError::ConnectionClosed("response already taken".to_string())))),
        }
    }
}

impl<T> std::fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            ResponseState::Waiting(_) => "waiting",
            ResponseState::Failed(_) => "failed",
        };
        f.debug_struct("ResponseFuture").field("state", &state).finish()
    }
}
