//! Echo round trip - an in-process echo server and a pipelined client.
//!
//! This demo shows:
//! - Building a connection with the fluent builder
//! - Packing requests and unpacking responses
//! - Callback-style and awaitable requests sharing one socket
//! - Draining with `gentle_shutdown`
//!
//! ```text
//! cargo run --example echo
//! ```
//!
//! Demos live under `demos/` and are registered explicitly in `Cargo.toml`
//! (`autoexamples = false`) because `examples/` holds unrelated reference code.

use std::time::Duration;

use iproto_client::codec::{pack, unpack};
use iproto_client::{Connection, RequestResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Accept one peer and send every byte straight back.
async fn echo_server(listener: TcpListener) -> std::io::Result<()> {
    let (mut socket, _) = listener.accept().await?;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        socket.write_all(&buf[..n]).await?;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = listener.local_addr()?;
    tokio::spawn(echo_server(listener));

    let conn = Connection::builder(endpoint)
        .read_timeout(Duration::from_millis(500))
        .log_sink(|line| eprintln!("{line}"))
        .build();

    // Fire a handful of callback-style requests without waiting.
    let (tx, mut rx) = mpsc::unbounded_channel();
    for id in 0u32..5 {
        let tx = tx.clone();
        conn.write(pack(100, 0, (id, format!("item-{id}"))), move |result| {
            let _ = tx.send(result);
        });
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        match result {
            RequestResult::Ok(mut packet) => {
                let (id, name): (u32, String) = unpack(&mut packet)?;
                println!("sync {} -> ({id}, {name})", packet.sync());
            }
            other => println!("request failed: {:?}", other.code()),
        }
    }

    // The same connection also serves awaitable requests.
    let result = conn.request(pack(101, 0, ("hello",))).await?;
    if let Some(mut packet) = result.into_packet() {
        let (greeting,): (String,) = unpack(&mut packet)?;
        println!("awaited -> {greeting}");
    }

    while !conn.gentle_shutdown() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
