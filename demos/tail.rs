//! Tail an SSE endpoint over a raw socket and print every event
//!
//! Run with: cargo run --example tail -- <host> <port> <path> [--tls] [--blank-line]
//! Set `RUST_LOG=sseer_net=trace` to watch the read loop.

use std::{thread, time::Duration};

use sseer_net::{config::DriverConfig, connection::TransportConnector, framing::Framing};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(host), Some(port), Some(path)) = (args.first(), args.get(1), args.get(2)) else {
        eprintln!("usage: tail <host> <port> <path> [--tls] [--blank-line]");
        std::process::exit(2);
    };
    let port: u16 = port.parse()?;
    let encrypted = args.iter().any(|arg| arg == "--tls");

    let mut config = DriverConfig::default();
    if args.iter().any(|arg| arg == "--blank-line") {
        config = config.framing(Framing::BlankLine);
    }

    let batches = sseer_net::open_with(
        &TransportConnector::new(encrypted),
        config,
        host,
        port,
        path,
    )?;
    println!("Connected to {host}:{port}{path}");

    for batch in batches {
        let batch = batch?;
        if batch.is_empty() {
            thread::sleep(Duration::from_millis(25));
            continue;
        }

        for event in batch {
            println!("Event type: {}", event.event);
            println!("Data: {}", event.data);
            if let Some(id) = &event.id {
                println!("ID: {id}");
            }
            if let Some(retry) = event.retry_delay() {
                println!("Retry: {:?}", retry);
            }
            println!("---");
        }
    }

    println!("Stream ended");
    Ok(())
}
