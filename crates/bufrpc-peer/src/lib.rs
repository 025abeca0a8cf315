//! Multiplexed request/response endpoint.
//!
//! Both sides of a connection are symmetric: each can define services and
//! methods to serve, and call the methods the other side serves. Many calls
//! can be in flight at once and replies may arrive in any order.
//!
//! ```no_run
//! use bufrpc_peer::{connection, Rpc};
//! use bytes::Bytes;
//!
//! # async fn demo(stream: tokio::net::UnixStream) -> bufrpc_peer::Result<()> {
//! let rpc = Rpc::default();
//! let upper = rpc.define_service(1).define_method(1).define();
//! let driver = connection::spawn(rpc.clone(), stream);
//!
//! let reply = upper.request(Bytes::from_static(b"hi")).await?;
//! assert_eq!(reply.as_ref(), b"HI");
//!
//! rpc.destroy("done");
//! # let _ = driver.await;
//! # Ok(())
//! # }
//! ```

mod calls;
pub mod config;
pub mod connection;
pub mod error;
mod registry;
mod rpc;

pub use calls::ResponseFuture;
pub use config::{RpcConfig, DEFAULT_READ_BUFFER_SIZE};
pub use error::{Result, RpcError};
pub use registry::{Method, MethodBuilder, Service};
pub use rpc::{Outgoing, Rpc};
