//! # Relay Client
//!
//! Small interactive client for poking at a running relay: every frame the
//! relay sends is printed, every line typed on stdin is sent as a text frame.
//! EOF on stdin closes the connection.

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Relay WebSocket endpoint
    #[clap(short, long, default_value = "ws://127.0.0.1:9000/ws")]
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (ws, _) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    println!("Connected to {}", args.url);
    let (mut write, mut read) = ws.split();

    let printer = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => println!("{}", text.as_str()),
                Ok(Message::Binary(bytes)) => println!("<{} binary bytes>", bytes.len()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
            }
        }
        println!("Relay closed the connection");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        write.send(Message::text(line)).await?;
    }

    write.close().await?;
    let _ = printer.await;
    Ok(())
}
