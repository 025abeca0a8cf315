//! Service and method registry.
//!
//! Services and methods are addressed by small integer ids and stored in
//! sparse tables that grow on demand: defining id 5 first still allocates
//! slots 0 through 5. Handlers are type-erased behind [`RequestHandler`] so the
//! dispatch engine can route raw payloads without knowing method types.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bufrpc_frame::{
    encode_frame, Binary, Codec, CodecError, FrameError, FrameHeader, FrameType, RemoteError, SharedErrorCodec,
};
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::calls::ResponseFuture;
use crate::error::Result;
use crate::rpc::Rpc;

/// Boxed future for handler results.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Encoded reply frame, or `None` for requests that expect no reply.
pub(crate) type ReplyFuture = BoxFuture<std::result::Result<Option<Bytes>, FrameError>>;

/// A request handler with its codecs, erased to bytes in and frame out.
pub(crate) trait RequestHandler: Send + Sync {
    /// Decode `payload` and start the handler.
    fn call(&self, header: FrameHeader, payload: Bytes) -> std::result::Result<ReplyFuture, CodecError>;
}

struct TypedHandler<Req, Res, F, Fut> {
    request: Arc<Req>,
    response: Arc<Res>,
    error: SharedErrorCodec,
    handler: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<Req, Res, F, Fut> RequestHandler for TypedHandler<Req, Res, F, Fut>
where
    Req: Codec,
    Res: Codec,
    F: Fn(Req::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Res::Value, RemoteError>> + Send + 'static,
{
    fn call(&self, header: FrameHeader, payload: Bytes) -> std::result::Result<ReplyFuture, CodecError> {
        let value = self.request.decode(payload)?;
        let pending = (self.handler)(value);
        let response = Arc::clone(&self.response);
        let error = Arc::clone(&self.error);

        Ok(Box::pin(async move {
            let outcome = pending.await;
            if header.is_no_reply() {
                if let Err(err) = outcome {
                    debug!(
                        service_id = header.service_id,
                        method_id = header.method_id,
                        %err,
                        "discarding no-reply handler error"
                    );
                }
                return Ok(None);
            }
            encode_reply(&header, outcome, &*response, &*error).map(Some)
        }))
    }
}

/// Encode a handler outcome as a Response or Error frame.
///
/// A response that fails to encode is reported to the caller as an Error
/// frame instead.
fn encode_reply<Res>(
    header: &FrameHeader,
    outcome: std::result::Result<Res::Value, RemoteError>,
    response: &Res,
    error: &dyn Codec<Value = RemoteError>,
) -> std::result::Result<Bytes, FrameError>
where
    Res: Codec + ?Sized,
{
    let mut buf = BytesMut::new();
    let err = match outcome {
        Ok(value) => match encode_frame(&header.reply(FrameType::Response), &value, response, &mut buf) {
            Ok(()) => return Ok(buf.freeze()),
            Err(err) => {
                buf.clear();
                RemoteError::new(format!("failed to encode response: {err}"))
            }
        },
        Err(err) => err,
    };
    encode_frame(&header.reply(FrameType::Error), &err, error, &mut buf)?;
    Ok(buf.freeze())
}

pub(crate) struct MethodEntry {
    pub(crate) handler: Option<Arc<dyn RequestHandler>>,
}

pub(crate) struct ServiceEntry {
    id: u32,
    methods: RwLock<Vec<Option<Arc<MethodEntry>>>>,
}

impl ServiceEntry {
    fn insert_method(&self, id: Option<u32>, entry: MethodEntry) -> u32 {
        let mut methods = write(&self.methods);
        let id = insert_slot(&mut methods, id, Arc::new(entry));
        debug!(service_id = self.id, method_id = id, "method defined");
        id
    }

    fn method(&self, id: u32) -> Option<Arc<MethodEntry>> {
        read(&self.methods).get(id as usize)?.clone()
    }
}

/// Sparse id-indexed table of services.
#[derive(Default)]
pub(crate) struct Registry {
    services: RwLock<Vec<Option<Arc<ServiceEntry>>>>,
}

impl Registry {
    /// Return the service with `id`, creating it if needed. Without an id the
    /// next unused slot is taken.
    pub(crate) fn define_service(&self, id: Option<u32>) -> Arc<ServiceEntry> {
        let mut services = write(&self.services);
        if let Some(existing) = id.and_then(|id| services.get(id as usize).cloned().flatten()) {
            return existing;
        }

        let slot = id.unwrap_or_else(|| next_id(&services));
        let entry = Arc::new(ServiceEntry {
            id: slot,
            methods: RwLock::new(Vec::new()),
        });
        insert_slot(&mut services, Some(slot), Arc::clone(&entry));
        debug!(service_id = slot, "service defined");
        entry
    }

    pub(crate) fn lookup(&self, service_id: u32, method_id: u32) -> Option<Arc<MethodEntry>> {
        let service = read(&self.services).get(service_id as usize)?.clone()?;
        service.method(method_id)
    }
}

fn next_id<T>(table: &[Option<T>]) -> u32 {
    u32::try_from(table.len()).unwrap_or(u32::MAX)
}

fn insert_slot<T>(table: &mut Vec<Option<T>>, id: Option<u32>, value: T) -> u32 {
    let id = id.unwrap_or_else(|| next_id(table));
    let index = id as usize;
    if table.len() <= index {
        table.resize_with(index + 1, || None);
    }
    table[index] = Some(value);
    id
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A service defined on an endpoint.
#[derive(Clone)]
pub struct Service {
    rpc: Rpc,
    entry: Arc<ServiceEntry>,
}

impl Service {
    pub(crate) fn new(rpc: Rpc, entry: Arc<ServiceEntry>) -> Self {
        Self { rpc, entry }
    }

    pub fn id(&self) -> u32 {
        self.entry.id
    }

    /// Start defining a method. Without an id the next unused slot is taken.
    ///
    /// Request and response payloads default to [`Binary`]; errors default
    /// to the endpoint's error encoding.
    pub fn define_method(&self, id: impl Into<Option<u32>>) -> MethodBuilder<Binary, Binary> {
        MethodBuilder {
            service: self.clone(),
            id: id.into(),
            request: Binary,
            response: Binary,
            error: None,
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service").field("id", &self.entry.id).finish()
    }
}

/// Builder for a method's codecs and handler.
#[must_use = "a method is only registered by `define` or `on_request`"]
pub struct MethodBuilder<Req, Res> {
    service: Service,
    id: Option<u32>,
    request: Req,
    response: Res,
    error: Option<SharedErrorCodec>,
}

impl<Req: Codec, Res: Codec> MethodBuilder<Req, Res> {
    /// Codec for request payloads.
    pub fn request_encoding<C: Codec>(self, codec: C) -> MethodBuilder<C, Res> {
        MethodBuilder {
            service: self.service,
            id: self.id,
            request: codec,
            response: self.response,
            error: self.error,
        }
    }

    /// Codec for response payloads.
    pub fn response_encoding<C: Codec>(self, codec: C) -> MethodBuilder<Req, C> {
        MethodBuilder {
            service: self.service,
            id: self.id,
            request: self.request,
            response: codec,
            error: self.error,
        }
    }

    /// Codec for error payloads, overriding the endpoint default.
    pub fn error_encoding<C: Codec<Value = RemoteError>>(mut self, codec: C) -> Self {
        self.error = Some(Arc::new(codec));
        self
    }

    /// Register a method without a request handler, for calling the peer.
    ///
    /// Incoming requests for it are answered as unknown.
    pub fn define(self) -> Method<Req, Res> {
        self.install(|_, _, _| None)
    }

    /// Register a method that serves incoming requests with `handler`.
    ///
    /// `Ok` is sent back as a Response frame and `Err` as an Error frame.
    /// Nothing is sent for requests that expect no reply.
    pub fn on_request<F, Fut>(self, handler: F) -> Method<Req, Res>
    where
        F: Fn(Req::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Res::Value, RemoteError>> + Send + 'static,
    {
        self.install(move |request, response, error| {
            let typed: Arc<dyn RequestHandler> = Arc::new(TypedHandler {
                request,
                response,
                error,
                handler,
                _marker: PhantomData,
            });
            Some(typed)
        })
    }

    fn install<H>(self, make_handler: H) -> Method<Req, Res>
    where
        H: FnOnce(Arc<Req>, Arc<Res>, SharedErrorCodec) -> Option<Arc<dyn RequestHandler>>,
    {
        let MethodBuilder {
            service,
            id,
            request,
            response,
            error,
        } = self;

        let request = Arc::new(request);
        let response = Arc::new(response);
        let error = error.unwrap_or_else(|| Arc::clone(&service.rpc.config().error_encoding));
        let handler = make_handler(Arc::clone(&request), Arc::clone(&response), Arc::clone(&error));
        let id = service.entry.insert_method(id, MethodEntry { handler });

        Method {
            rpc: service.rpc,
            service_id: service.entry.id,
            id,
            request,
            response,
            error,
        }
    }
}

/// A method handle used to call the peer.
pub struct Method<Req: Codec, Res: Codec> {
    pub(crate) rpc: Rpc,
    pub(crate) service_id: u32,
    pub(crate) id: u32,
    pub(crate) request: Arc<Req>,
    pub(crate) response: Arc<Res>,
    pub(crate) error: SharedErrorCodec,
}

impl<Req: Codec, Res: Codec> Method<Req, Res> {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn service_id(&self) -> u32 {
        self.service_id
    }

    /// Send a request and wait for the reply.
    ///
    /// The request is queued before this returns. Fails immediately with
    /// `ConnectionClosed` if the endpoint has been torn down.
    pub fn request(&self, value: Req::Value) -> ResponseFuture<Res::Value> {
        self.rpc.send_request(self, &value)
    }

    /// Send a request that the peer must not answer.
    pub fn request_no_reply(&self, value: Req::Value) -> Result<()> {
        self.rpc.send_no_reply(self, &value)
    }
}

impl<Req: Codec, Res: Codec> Clone for Method<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            rpc: self.rpc.clone(),
            service_id: self.service_id,
            id: self.id,
            request: Arc::clone(&self.request),
            response: Arc::clone(&self.response),
            error: Arc::clone(&self.error),
        }
    }
}

impl<Req: Codec, Res: Codec> std::fmt::Debug for Method<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("service_id", &self.service_id)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bufrpc_frame::{ErrorEncoding, Null, Parser};

    use super::*;

    #[test]
    fn sparse_service_ids_grow_table() {
        let registry = Registry::default();
        let five = registry.define_service(Some(5));
        assert_eq!(five.id, 5);
        assert_eq!(read(&registry.services).len(), 6);

        let two = registry.define_service(Some(2));
        assert_eq!(two.id, 2);
        assert_eq!(read(&registry.services).len(), 6);

        let next = registry.define_service(None);
        assert_eq!(next.id, 6);
    }

    #[test]
    fn redefining_service_returns_existing() {
        let registry = Registry::default();
        let first = registry.define_service(Some(3));
        let again = registry.define_service(Some(3));
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn methods_get_auto_and_explicit_ids() {
        let registry = Registry::default();
        let service = registry.define_service(Some(0));

        assert_eq!(service.insert_method(Some(4), MethodEntry { handler: None }), 4);
        assert_eq!(service.insert_method(None, MethodEntry { handler: None }), 5);
        assert_eq!(service.insert_method(Some(1), MethodEntry { handler: None }), 1);

        assert!(registry.lookup(0, 4).is_some());
        assert!(registry.lookup(0, 1).is_some());
        assert!(registry.lookup(0, 2).is_none());
        assert!(registry.lookup(0, 99).is_none());
        assert!(registry.lookup(7, 4).is_none());
    }

    fn parse_one(bytes: Bytes) -> bufrpc_frame::Frame {
        let mut frames = Vec::new();
        Parser::new()
            .recv(bytes, |frame, _| {
                frames.push(frame);
                Ok::<(), FrameError>(())
            })
            .unwrap();
        assert_eq!(frames.len(), 1);
        frames.remove(0)
    }

    #[test]
    fn reply_encodes_response_and_error() {
        let header = FrameHeader::new(FrameType::Request, 2, 3, 9);

        let ok = encode_reply(&header, Ok(Bytes::from_static(b"fine")), &Binary, &ErrorEncoding).unwrap();
        let frame = parse_one(ok);
        assert_eq!(frame.header, FrameHeader::new(FrameType::Response, 2, 3, 9));
        assert_eq!(frame.payload.as_ref(), b"fine");

        let failed = encode_reply::<Null>(&header, Err(RemoteError::new("bad input")), &Null, &ErrorEncoding).unwrap();
        let frame = parse_one(failed);
        assert_eq!(frame.header.frame_type, FrameType::Error);
        assert_eq!(frame.payload.as_ref(), b"bad input");
    }

    struct Unencodable;

    impl Codec for Unencodable {
        type Value = u8;

        fn encode(&self, _value: &u8, _dst: &mut BytesMut) -> std::result::Result<(), CodecError> {
            Err(CodecError::Encode("never".to_string()))
        }

        fn decode(&self, _src: Bytes) -> std::result::Result<u8, CodecError> {
            Ok(0)
        }

        fn encoding_length(&self, _value: &u8) -> usize {
            1
        }
    }

    #[test]
    fn unencodable_response_becomes_error_frame() {
        let header = FrameHeader::new(FrameType::Request, 0, 0, 1);
        let bytes = encode_reply(&header, Ok(7), &Unencodable, &ErrorEncoding).unwrap();
        let frame = parse_one(bytes);

        assert_eq!(frame.header.frame_type, FrameType::Error);
        assert!(std::str::from_utf8(&frame.payload)
            .unwrap()
            .starts_with("failed to encode response"));
    }
}
