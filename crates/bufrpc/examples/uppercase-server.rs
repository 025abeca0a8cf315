//! Uppercase server: accepts TCP peers and answers service 1 / method 1 with
//! the request payload uppercased.
//!
//! Run with:
//!   cargo run --example uppercase-server -- --addr 127.0.0.1:7400 --log-format json
//!
//! Every connection gets its own endpoint.

use bufrpc::{connection, RemoteError, Rpc};
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "uppercase-server", about = "Serve uppercase calls over TCP")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:7400")]
    addr: String,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

fn endpoint() -> Rpc {
    let rpc = Rpc::default();
    rpc.define_service(1)
        .define_method(1)
        .on_request(|payload: Bytes| async move {
            if payload.is_empty() {
                return Err(RemoteError::new("nothing to uppercase"));
            }
            Ok(Bytes::from(payload.to_ascii_uppercase()))
        });
    rpc
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_format, args.log_level);

    let listener = TcpListener::bind(&args.addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "peer connected");

        tokio::spawn(async move {
            let rpc = endpoint();
            match connection::run(&rpc, stream).await {
                Ok(()) => tracing::info!(%peer, "peer disconnected"),
                Err(err) => tracing::warn!(%peer, error = %err, "connection failed"),
            }
        });
    }
}
