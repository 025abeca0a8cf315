//! Multiplexed binary RPC over any ordered byte stream.
//!
//! Two peers each define numbered services and methods, call each other's
//! methods concurrently, and get replies back in whatever order the other
//! side produces them. Payloads go through pluggable codecs.
//!
//! # Crate Structure
//!
//! - [`frame`]: varint framing, payload codecs, and the streaming parser
//! - [`peer`]: the RPC endpoint and connection driver (behind `peer` feature)

/// Re-export frame types.
pub mod frame {
    pub use bufrpc_frame::*;
}

/// Re-export endpoint types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use bufrpc_peer::*;
}

#[cfg(feature = "peer")]
pub use bufrpc_peer::{connection, Method, Rpc, RpcConfig, RpcError};
pub use bufrpc_frame::{Binary, Codec, ErrorEncoding, Json, Null, RemoteError};
