//! Drive an [`Rpc`] over a byte stream.
//!
//! Works with anything implementing `AsyncRead + AsyncWrite`: Unix sockets,
//! TCP streams, or in-memory duplex pipes.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, RpcError};
use crate::rpc::{Outgoing, Rpc};

/// Pump bytes between `stream` and `rpc` until the endpoint closes.
///
/// Reaching end of input destroys the endpoint with "stream ended". An I/O
/// failure destroys it with the error. Frames queued before teardown are
/// still written out, then the write half is shut down.
///
/// Fails with `AlreadyAttached` if the endpoint's outgoing queue was taken.
pub async fn run<S>(rpc: &Rpc, stream: S) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    let mut outgoing = rpc.take_outgoing().ok_or(RpcError::AlreadyAttached)?;
    let (mut reader, mut writer) = tokio::io::split(stream);

    let (read, write) = tokio::join!(
        read_loop(rpc, &mut reader),
        write_loop(rpc, &mut outgoing, &mut writer)
    );
    read.and(write)
}

/// Spawn [`run`] on the current runtime.
pub fn spawn<S>(rpc: Rpc, stream: S) -> JoinHandle<Result<()>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move { run(&rpc, stream).await })
}

async fn read_loop<R>(rpc: &Rpc, reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let read_size = rpc.config().read_buffer_size.max(1);
    let mut buf = BytesMut::with_capacity(read_size);

    loop {
        buf.reserve(read_size);
        let read = tokio::select! {
            read = reader.read_buf(&mut buf) => read,
            () = rpc.closed() => return Ok(()),
        };

        match read {
            Ok(0) => {
                debug!("stream ended");
                rpc.destroy("stream ended");
                return Ok(());
            }
            // `recv` tears the endpoint down itself on error.
            Ok(_) => rpc.recv(buf.split().freeze())?,
            Err(err) => {
                let err = RpcError::Io(err);
                rpc.fail(&err);
                return Err(err);
            }
        }
    }
}

async fn write_loop<W>(rpc: &Rpc, outgoing: &mut Outgoing, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outgoing.next().await {
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        if let Err(err) = written.await {
            let err = RpcError::Io(err);
            rpc.fail(&err);
            return Err(err);
        }
    }

    // The peer may already be gone.
    let _ = writer.shutdown().await;
    Ok(())
}
