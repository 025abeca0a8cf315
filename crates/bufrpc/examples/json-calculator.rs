//! Two endpoints in one process talking JSON over a loopback TCP connection.
//!
//! Run with:
//!   cargo run --example json-calculator
//!
//! The server side exposes `sum` (answered) and `log` (fire-and-forget); the
//! client issues several sums concurrently and awaits them in reverse order.

use bufrpc::{connection, Json, Null, RemoteError, Rpc};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};

const CALCULATOR: u32 = 7;
const SUM: u32 = 0;
const LOG: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SumRequest {
    terms: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SumResponse {
    total: i64,
}

fn server() -> Rpc {
    let rpc = Rpc::default();
    let calculator = rpc.define_service(CALCULATOR);
    calculator
        .define_method(SUM)
        .request_encoding(Json::<SumRequest>::new())
        .response_encoding(Json::<SumResponse>::new())
        .on_request(|req: SumRequest| async move {
            req.terms
                .iter()
                .try_fold(0i64, |acc, term| acc.checked_add(*term))
                .map(|total| SumResponse { total })
                .ok_or_else(|| RemoteError::new("sum overflows i64"))
        });
    calculator
        .define_method(LOG)
        .request_encoding(Json::<String>::new())
        .response_encoding(Null)
        .on_request(|line: String| async move {
            tracing::info!(%line, "client says");
            Ok(())
        });
    rpc
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let serving = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let rpc = server();
        connection::run(&rpc, stream).await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    });

    let client = Rpc::default();
    let calculator = client.define_service(CALCULATOR);
    let sum = calculator
        .define_method(SUM)
        .request_encoding(Json::<SumRequest>::new())
        .response_encoding(Json::<SumResponse>::new())
        .define();
    let log = calculator
        .define_method(LOG)
        .request_encoding(Json::<String>::new())
        .response_encoding(Null)
        .define();

    let driver = connection::spawn(client.clone(), TcpStream::connect(addr).await?);

    log.request_no_reply("starting".to_string())?;
    let pending: Vec<_> = (1..=4)
        .map(|n| sum.request(SumRequest { terms: (1..=n * 10).collect() }))
        .collect();
    for (n, call) in pending.into_iter().enumerate().rev() {
        let response = call.await?;
        println!("sum(1..={}) = {}", (n + 1) * 10, response.total);
    }

    match sum.request(SumRequest { terms: vec![i64::MAX, 1] }).await {
        Err(err) => println!("overflow rejected: {err}"),
        Ok(response) => println!("unexpected total {}", response.total),
    }

    client.destroy("done");
    driver.await??;
    if let Err(err) = serving.await? {
        eprintln!("server side ended with: {err}");
    }
    Ok(())
}
