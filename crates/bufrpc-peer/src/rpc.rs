//! The RPC endpoint: call table, dispatch, and teardown.
//!
//! An [`Rpc`] is transport-agnostic. Incoming bytes are pushed in with
//! [`Rpc::recv`], and encoded frames are pulled out through the
//! [`Outgoing`] queue. [`crate::connection`] wires both ends to a stream.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use bufrpc_frame::{encode_frame, Codec, Frame, FrameError, FrameHeader, FrameType, Parser, RemoteError};
use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::calls::{CallTable, ResponseFuture, TypedCall};
use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use crate::registry::{Method, Registry, Service};

/// A multiplexed RPC endpoint.
///
/// Cloning is cheap; clones share the same connection state.
#[derive(Clone)]
pub struct Rpc {
    shared: Arc<Shared>,
}

struct Shared {
    config: RpcConfig,
    registry: Registry,
    parser: Mutex<Parser>,
    state: Mutex<CallState>,
    outgoing_tx: mpsc::UnboundedSender<Bytes>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    shutdown: CancellationToken,
}

struct CallState {
    calls: CallTable,
    closed: Option<String>,
}

impl Default for Rpc {
    fn default() -> Self {
        Self::new(RpcConfig::default())
    }
}

impl Rpc {
    pub fn new(config: RpcConfig) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                parser: Mutex::new(Parser::with_config(config.frame_config())),
                config,
                registry: Registry::default(),
                state: Mutex::new(CallState {
                    calls: CallTable::new(),
                    closed: None,
                }),
                outgoing_tx,
                outgoing_rx: Mutex::new(Some(outgoing_rx)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.shared.config
    }

    /// Define a service, or return the existing one with the same id.
    ///
    /// Without an id the next unused slot is taken.
    pub fn define_service(&self, id: impl Into<Option<u32>>) -> Service {
        let entry = self.shared.registry.define_service(id.into());
        Service::new(self.clone(), entry)
    }

    /// Number of requests sent and still waiting for a reply.
    pub fn inflight_requests(&self) -> usize {
        self.lock_state().calls.inflight()
    }

    /// Feed a chunk of bytes received from the peer.
    ///
    /// Every complete frame in `chunk` is dispatched before this returns.
    /// Any error is fatal: the endpoint is destroyed and every pending call
    /// fails with `ConnectionClosed`.
    ///
    /// # Panics
    ///
    /// Panics if called again while a previous call is still running, or
    /// outside a tokio runtime when a request handler has to be started.
    pub fn recv(&self, chunk: impl Into<Bytes>) -> Result<()> {
        let mut parser = match self.shared.parser.try_lock() {
            Ok(parser) => parser,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => panic!("cannot recursively receive data"),
        };

        if let Some(reason) = self.close_reason() {
            return Err(RpcError::ConnectionClosed(reason));
        }

        let result = parser.recv(chunk.into(), |frame, _| self.dispatch(frame));
        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    /// Take the queue of encoded outgoing frames. Only the first call
    /// returns `Some`.
    pub fn take_outgoing(&self) -> Option<Outgoing> {
        let rx = self
            .shared
            .outgoing_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(Outgoing {
            rx,
            shutdown: self.shared.shutdown.clone(),
        })
    }

    /// Tear down the endpoint.
    ///
    /// Pending calls fail with `ConnectionClosed(reason)`, later requests
    /// fail immediately, and the outgoing queue ends once drained. Calling
    /// this again has no effect.
    pub fn destroy(&self, reason: impl Into<String>) {
        self.close(reason.into());
    }

    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// The reason given when the endpoint was torn down.
    pub fn close_reason(&self) -> Option<String> {
        self.lock_state().closed.clone()
    }

    /// Wait until the endpoint is torn down.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }

    pub(crate) fn send_request<Req: Codec, Res: Codec>(
        &self,
        method: &Method<Req, Res>,
        value: &Req::Value,
    ) -> ResponseFuture<Res::Value> {
        let (tx, rx) = oneshot::channel();
        let call = Box::new(TypedCall {
            service_id: method.service_id,
            method_id: method.id,
            response: Arc::clone(&method.response),
            error: Arc::clone(&method.error),
            tx,
        });

        let mut state = self.lock_state();
        if let Some(reason) = &state.closed {
            return ResponseFuture::failed(RpcError::ConnectionClosed(reason.clone()));
        }
        let call_id = match state.calls.allocate(call) {
            Ok(call_id) => call_id,
            Err(err) => return ResponseFuture::failed(err),
        };

        let header = FrameHeader::new(FrameType::Request, method.service_id, method.id, call_id);
        let mut buf = BytesMut::new();
        if let Err(err) = encode_frame(&header, value, &*method.request, &mut buf) {
            drop(state.calls.complete(call_id));
            debug!(service_id = method.service_id, method_id = method.id, error = %err, "request encode failed");
            return ResponseFuture::failed(encode_error(err));
        }

        trace!(service_id = method.service_id, method_id = method.id, call_id, "request queued");
        let _ = self.shared.outgoing_tx.send(buf.freeze());
        ResponseFuture::waiting(rx)
    }

    pub(crate) fn send_no_reply<Req: Codec, Res: Codec>(&self, method: &Method<Req, Res>, value: &Req::Value) -> Result<()> {
        let header = FrameHeader::new(FrameType::Request, method.service_id, method.id, 0);
        let mut buf = BytesMut::new();
        encode_frame(&header, value, &*method.request, &mut buf).map_err(encode_error)?;

        let state = self.lock_state();
        if let Some(reason) = &state.closed {
            return Err(RpcError::ConnectionClosed(reason.clone()));
        }
        trace!(service_id = method.service_id, method_id = method.id, "no-reply request queued");
        let _ = self.shared.outgoing_tx.send(buf.freeze());
        Ok(())
    }

    /// Tear down after a fatal error.
    pub(crate) fn fail(&self, err: &RpcError) {
        if self.is_closed() {
            return;
        }
        warn!(error = %err, "rpc endpoint failed");
        self.close(err.to_string());
    }

    fn close(&self, reason: String) {
        let mut state = self.lock_state();
        if state.closed.is_some() {
            return;
        }
        let rejected = state.calls.reject_all(&reason);
        debug!(%reason, rejected, "rpc endpoint destroyed");
        state.closed = Some(reason);
        drop(state);
        self.shared.shutdown.cancel();
    }

    fn dispatch(&self, frame: Frame) -> Result<()> {
        if let Some(reason) = self.close_reason() {
            return Err(RpcError::ConnectionClosed(reason));
        }

        trace!(
            frame_type = ?frame.header.frame_type,
            service_id = frame.header.service_id,
            method_id = frame.header.method_id,
            call_id = frame.header.call_id,
            len = frame.payload.len(),
            "frame received"
        );

        match frame.header.frame_type {
            FrameType::Request => self.on_request(frame),
            FrameType::Response | FrameType::Error => self.on_reply(frame),
        }
    }

    fn on_request(&self, frame: Frame) -> Result<()> {
        let header = frame.header;
        let handler = self
            .shared
            .registry
            .lookup(header.service_id, header.method_id)
            .and_then(|method| method.handler.clone());

        let Some(handler) = handler else {
            if header.is_no_reply() {
                debug!(
                    service_id = header.service_id,
                    method_id = header.method_id,
                    "ignoring no-reply request for unknown method"
                );
                return Ok(());
            }
            debug!(
                service_id = header.service_id,
                method_id = header.method_id,
                call_id = header.call_id,
                "request for unknown method"
            );
            let err = RemoteError::new(format!(
                "unknown method (service {}, method {})",
                header.service_id, header.method_id
            ));
            let mut buf = BytesMut::new();
            encode_frame(
                &header.reply(FrameType::Error),
                &err,
                &*self.shared.config.error_encoding,
                &mut buf,
            )?;
            self.push(buf.freeze());
            return Ok(());
        };

        let pending = match handler.call(header, frame.payload) {
            Ok(pending) => pending,
            Err(err) if header.is_no_reply() => {
                debug!(
                    service_id = header.service_id,
                    method_id = header.method_id,
                    error = %err,
                    "discarding undecodable no-reply request"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let rpc = self.clone();
        tokio::spawn(async move {
            match pending.await {
                Ok(Some(reply)) => rpc.push(reply),
                Ok(None) => {}
                Err(err) => rpc.fail(&RpcError::Frame(err)),
            }
        });
        Ok(())
    }

    fn on_reply(&self, frame: Frame) -> Result<()> {
        let header = frame.header;
        let call = self
            .lock_state()
            .calls
            .complete(header.call_id)
            .ok_or(RpcError::UnknownCallId(header.call_id))?;

        let (expected_service, expected_method) = call.target();
        if (header.service_id, header.method_id) != (expected_service, expected_method) {
            let err = RpcError::UnexpectedReply {
                call_id: header.call_id,
                service_id: header.service_id,
                method_id: header.method_id,
                expected_service,
                expected_method,
            };
            call.fail(RpcError::ConnectionClosed(err.to_string()));
            return Err(err);
        }

        call.settle(header.frame_type, frame.payload)?;
        Ok(())
    }

    /// Queue an encoded frame unless the endpoint is closed.
    fn push(&self, frame: Bytes) {
        let state = self.lock_state();
        if state.closed.is_some() {
            trace!(len = frame.len(), "dropping outgoing frame after close");
            return;
        }
        let _ = self.shared.outgoing_tx.send(frame);
    }

    fn lock_state(&self) -> MutexGuard<'_, CallState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Rpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Rpc")
            .field("inflight", &state.calls.inflight())
            .field("closed", &state.closed)
            .finish()
    }
}

fn encode_error(err: FrameError) -> RpcError {
    match err {
        FrameError::Codec(err) => RpcError::Codec(err),
        other => RpcError::Frame(other),
    }
}

/// Encoded frames waiting to be written to the peer.
pub struct Outgoing {
    rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
}

impl Outgoing {
    /// Next frame to write. Returns `None` once the endpoint is closed and
    /// every frame queued before that has been taken.
    pub async fn next(&mut self) -> Option<Bytes> {
        tokio::select! {
            biased;
            frame = self.rx.recv() => frame,
            () = self.shutdown.cancelled() => self.rx.try_recv().ok(),
        }
    }

    /// Take a frame if one is ready.
    pub fn try_next(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for Outgoing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outgoing").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use bufrpc_frame::{CodecError, Json};
    use serde::{Deserialize, Serialize};

    use super::*;

    fn frame_bytes(frame_type: FrameType, service_id: u32, method_id: u32, call_id: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        Frame::new(
            FrameHeader::new(frame_type, service_id, method_id, call_id),
            Bytes::copy_from_slice(payload),
        )
        .encode(&mut buf)
        .unwrap();
        buf.freeze()
    }

    fn parse(bytes: Bytes) -> Vec<Frame> {
        let mut frames = Vec::new();
        Parser::new()
            .recv(bytes, |frame, _| {
                frames.push(frame);
                Ok::<(), FrameError>(())
            })
            .unwrap();
        frames
    }

    async fn next_frame(outgoing: &mut Outgoing) -> Frame {
        let bytes = tokio::time::timeout(Duration::from_secs(5), outgoing.next())
            .await
            .expect("timed out waiting for outgoing frame")
            .expect("outgoing queue ended");
        let mut frames = parse(bytes);
        assert_eq!(frames.len(), 1);
        frames.remove(0)
    }

    #[tokio::test]
    async fn unknown_method_gets_one_error_frame() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();

        rpc.recv(frame_bytes(FrameType::Request, 4, 2, 7, b"x")).unwrap();

        let reply = next_frame(&mut outgoing).await;
        assert_eq!(reply.header, FrameHeader::new(FrameType::Error, 4, 2, 7));
        assert!(std::str::from_utf8(&reply.payload).unwrap().contains("unknown method"));
        assert!(outgoing.try_next().is_none());
        assert!(!rpc.is_closed());
    }

    #[tokio::test]
    async fn method_without_handler_is_unknown() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        let _method = rpc.define_service(1).define_method(1).define();

        rpc.recv(frame_bytes(FrameType::Request, 1, 1, 3, b"")).unwrap();

        let reply = next_frame(&mut outgoing).await;
        assert_eq!(reply.header.frame_type, FrameType::Error);
        assert_eq!(reply.header.call_id, 3);
    }

    #[tokio::test]
    async fn no_reply_requests_produce_nothing() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        rpc.define_service(0).define_method(0).on_request(move |payload: Bytes| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(payload.clone());
                Ok(payload)
            }
        });

        rpc.recv(frame_bytes(FrameType::Request, 0, 0, 0, b"fire")).unwrap();
        // Unknown method with no reply expected is ignored too.
        rpc.recv(frame_bytes(FrameType::Request, 9, 9, 0, b"lost")).unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.as_ref(), b"fire");
        tokio::task::yield_now().await;
        assert!(outgoing.try_next().is_none());
        assert!(!rpc.is_closed());
    }

    #[tokio::test]
    async fn failing_no_reply_handler_sends_nothing() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        rpc.define_service(0)
            .define_method(0)
            .on_request(|payload: Bytes| async move {
                Err::<Bytes, _>(RemoteError::new(format!("rejected {}", payload.len())))
            });

        rpc.recv(frame_bytes(FrameType::Request, 0, 0, 0, b"quiet")).unwrap();
        // A request that expects a reply queues behind anything the first one produced.
        rpc.recv(frame_bytes(FrameType::Request, 0, 0, 1, b"loud")).unwrap();

        let reply = next_frame(&mut outgoing).await;
        assert_eq!(reply.header, FrameHeader::new(FrameType::Error, 0, 0, 1));
        assert_eq!(reply.payload.as_ref(), b"rejected 4");
        assert!(outgoing.try_next().is_none());
        assert!(!rpc.is_closed());
    }

    #[tokio::test]
    async fn undecodable_no_reply_request_is_discarded() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        rpc.define_service(0)
            .define_method(0)
            .request_encoding(Json::<Sum>::new())
            .response_encoding(Json::<i64>::new())
            .on_request(|sum: Sum| async move { Ok(sum.terms.iter().sum()) });

        rpc.recv(frame_bytes(FrameType::Request, 0, 0, 0, b"not json")).unwrap();
        assert!(!rpc.is_closed());
        assert!(outgoing.try_next().is_none());

        rpc.recv(frame_bytes(FrameType::Request, 0, 0, 1, br#"{"terms":[2,3]}"#)).unwrap();
        let reply = next_frame(&mut outgoing).await;
        assert_eq!(reply.header, FrameHeader::new(FrameType::Response, 0, 0, 1));
        assert_eq!(reply.payload.as_ref(), b"5");
    }

    #[tokio::test]
    async fn handler_result_is_sent_back() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        rpc.define_service(2).define_method(5).on_request(|payload: Bytes| async move {
            if payload.is_empty() {
                Err(RemoteError::new("empty"))
            } else {
                Ok(Bytes::from(payload.to_ascii_uppercase()))
            }
        });

        rpc.recv(frame_bytes(FrameType::Request, 2, 5, 1, b"hi")).unwrap();
        let reply = next_frame(&mut outgoing).await;
        assert_eq!(reply.header, FrameHeader::new(FrameType::Response, 2, 5, 1));
        assert_eq!(reply.payload.as_ref(), b"HI");

        rpc.recv(frame_bytes(FrameType::Request, 2, 5, 2, b"")).unwrap();
        let reply = next_frame(&mut outgoing).await;
        assert_eq!(reply.header, FrameHeader::new(FrameType::Error, 2, 5, 2));
        assert_eq!(reply.payload.as_ref(), b"empty");
    }

    #[tokio::test]
    async fn unknown_call_id_is_fatal() {
        let rpc = Rpc::default();
        let err = rpc.recv(frame_bytes(FrameType::Response, 0, 0, 42, b"")).unwrap_err();

        assert!(matches!(err, RpcError::UnknownCallId(42)));
        assert!(rpc.is_closed());
        assert!(rpc.recv(Bytes::new()).unwrap_err().is_connection_closed());
    }

    #[tokio::test]
    async fn oversized_frame_rejects_pending_calls() {
        let rpc = Rpc::new(RpcConfig {
            max_frame_size: 16,
            ..RpcConfig::default()
        });
        let method = rpc.define_service(0).define_method(0).define();
        let pending = method.request(Bytes::from_static(b"ping"));
        assert_eq!(rpc.inflight_requests(), 1);

        let err = rpc
            .recv(frame_bytes(FrameType::Response, 0, 0, 1, &[0u8; 64]))
            .unwrap_err();
        assert!(matches!(err, RpcError::Frame(FrameError::FrameTooLarge { .. })));

        assert!(pending.await.unwrap_err().is_connection_closed());
        assert_eq!(rpc.inflight_requests(), 0);
    }

    #[tokio::test]
    async fn destroy_rejects_every_pending_call() {
        let rpc = Rpc::default();
        let method = rpc.define_service(0).define_method(0).define();
        let calls: Vec<_> = (0..3).map(|_| method.request(Bytes::from_static(b"x"))).collect();
        assert_eq!(rpc.inflight_requests(), 3);

        rpc.destroy("shutting down");
        rpc.destroy("again");
        assert_eq!(rpc.close_reason().as_deref(), Some("shutting down"));

        for call in calls {
            match call.await.unwrap_err() {
                RpcError::ConnectionClosed(reason) => assert_eq!(reason, "shutting down"),
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(rpc.inflight_requests(), 0);
    }

    #[tokio::test]
    async fn request_after_close_fails_immediately() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        let method = rpc.define_service(0).define_method(0).define();
        rpc.destroy("done");

        assert!(method.request(Bytes::new()).await.unwrap_err().is_connection_closed());
        assert!(method.request_no_reply(Bytes::new()).unwrap_err().is_connection_closed());
        assert!(outgoing.next().await.is_none());
    }

    #[tokio::test]
    async fn out_of_order_replies_reach_their_callers() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        let method = rpc.define_service(1).define_method(1).define();

        let first = method.request(Bytes::from_static(b"a"));
        let second = method.request(Bytes::from_static(b"b"));
        let ids: Vec<u32> = [next_frame(&mut outgoing).await, next_frame(&mut outgoing).await]
            .iter()
            .map(|frame| frame.header.call_id)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        rpc.recv(frame_bytes(FrameType::Response, 1, 1, 2, b"B")).unwrap();
        rpc.recv(frame_bytes(FrameType::Error, 1, 1, 1, b"nope")).unwrap();

        assert_eq!(second.await.unwrap().as_ref(), b"B");
        match first.await.unwrap_err() {
            RpcError::Remote(err) => assert_eq!(err.message, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn call_ids_are_reused() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        let method = rpc.define_service(0).define_method(0).define();

        for _ in 0..3 {
            let pending = method.request(Bytes::new());
            let sent = next_frame(&mut outgoing).await;
            assert_eq!(sent.header.call_id, 1);
            rpc.recv(frame_bytes(FrameType::Response, 0, 0, 1, b"")).unwrap();
            pending.await.unwrap();
        }
    }

    #[tokio::test]
    async fn mismatched_reply_is_fatal() {
        let rpc = Rpc::default();
        let method = rpc.define_service(3).define_method(1).define();
        let pending = method.request(Bytes::new());

        let err = rpc.recv(frame_bytes(FrameType::Response, 3, 2, 1, b"")).unwrap_err();
        assert!(matches!(err, RpcError::UnexpectedReply { expected_method: 1, .. }));
        assert!(pending.await.unwrap_err().is_connection_closed());
        assert!(rpc.is_closed());
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sum {
        terms: Vec<i64>,
    }

    #[tokio::test]
    async fn undecodable_request_is_fatal() {
        let rpc = Rpc::default();
        rpc.define_service(0)
            .define_method(0)
            .request_encoding(Json::<Sum>::new())
            .response_encoding(Json::<i64>::new())
            .on_request(|sum: Sum| async move { Ok(sum.terms.iter().sum()) });

        let err = rpc.recv(frame_bytes(FrameType::Request, 0, 0, 1, b"not json")).unwrap_err();
        assert!(matches!(err, RpcError::Codec(CodecError::Decode(_))));
        assert!(rpc.is_closed());
    }

    #[tokio::test]
    async fn undecodable_reply_fails_call_and_endpoint() {
        let rpc = Rpc::default();
        let method = rpc
            .define_service(0)
            .define_method(0)
            .response_encoding(Json::<i64>::new())
            .define();
        let pending = method.request(Bytes::new());

        let err = rpc.recv(frame_bytes(FrameType::Response, 0, 0, 1, b"{")).unwrap_err();
        assert!(matches!(err, RpcError::Codec(_)));
        assert!(matches!(pending.await.unwrap_err(), RpcError::Codec(_)));
    }

    #[test]
    fn outgoing_is_taken_once() {
        let rpc = Rpc::default();
        assert!(rpc.take_outgoing().is_some());
        assert!(rpc.take_outgoing().is_none());
    }

    #[tokio::test]
    async fn request_encode_failure_releases_id() {
        let rpc = Rpc::default();
        let mut outgoing = rpc.take_outgoing().unwrap();
        let method = rpc
            .define_service(0)
            .define_method(0)
            .request_encoding(Json::<BTreeMap<(i32, i32), i32>>::new())
            .define();

        // JSON object keys must be strings.
        let value = BTreeMap::from([((1, 2), 3)]);
        let err = method.request(value).await.unwrap_err();
        assert!(matches!(err, RpcError::Codec(CodecError::Encode(_))));
        assert_eq!(rpc.inflight_requests(), 0);
        assert!(!rpc.is_closed());
        assert!(outgoing.try_next().is_none());

        let pending = method.request(BTreeMap::new());
        assert_eq!(next_frame(&mut outgoing).await.header.call_id, 1);
        drop(pending);
    }
}
