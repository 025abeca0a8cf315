use bufrpc_frame::{CodecError, FrameError, RemoteError};

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer answered the call with an error.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// A reply referenced a call id with no pending call.
    #[error("no pending call for id {0}")]
    UnknownCallId(u32),

    /// A reply was routed to a different method than its call.
    #[error("reply for call {call_id} names service {service_id} method {method_id}, expected service {expected_service} method {expected_method}")]
    UnexpectedReply {
        call_id: u32,
        service_id: u32,
        method_id: u32,
        expected_service: u32,
        expected_method: u32,
    },

    /// Every call id is in use.
    #[error("call ids exhausted")]
    CallIdsExhausted,

    /// The endpoint's outgoing stream is already attached to a connection.
    #[error("outgoing stream already taken")]
    AlreadyAttached,

    /// The connection was torn down.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Transport I/O failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// True for the error delivered to calls cut short by teardown.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, RpcError::ConnectionClosed(_))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
