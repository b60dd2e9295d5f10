//! Read [Server-Sent Events](https://html.spec.whatwg.org/multipage/server-sent-events.html) (SSE)
//! straight off a TCP or TLS socket without blocking the calling thread.
//!
//! `sseer-net` is layered like so:
//!
//! - [`open`] / [`open_with`] - connect, send a minimal `GET`, and hand back an [`EventBatches`].
//! - [`EventBatches`] - a non-blocking read loop. Each poll does one read and returns the
//!   [`Event`][event::Event]s that read completed. It's an [`Iterator`], and
//!   [`into_stream`][EventBatches::into_stream] gives a [`Stream`][futures_core::Stream].
//! - [`framing`] - splitting the buffered bytes into records.
//! - [`parser`] - the SSE line grammar and [`decode_record`][parser::decode_record].
//! - [`connection`] - the [`Connection`][connection::Connection] and
//!   [`Connector`][connection::Connector] traits plus plaintext and TLS implementations.
//!
//! # Quick start
//!
//! ```no_run
//! # fn main() -> Result<(), sseer_net::errors::Error> {
//! let batches = sseer_net::open("example.com", 443, "/events", true)?;
//!
//! for batch in batches {
//!     let batch = batch?;
//!     if batch.is_empty() {
//!         // nothing arrived, do something else for a bit
//!         std::thread::sleep(std::time::Duration::from_millis(50));
//!         continue;
//!     }
//!     for event in batch {
//!         println!("{}: {}", event.event, event.data);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Framing
//!
//! By default records are pulled out of each read with [`Framing::Parity`][framing::Framing::Parity]
//! and the buffer is emptied afterwards, so a record split across two reads is lost.
//! [`Framing::BlankLine`][framing::Framing::BlankLine] keeps incomplete records around until the
//! rest arrives:
//!
//! ```no_run
//! use sseer_net::{config::DriverConfig, connection::Plaintext, framing::Framing};
//!
//! # fn main() -> Result<(), sseer_net::errors::Error> {
//! let config = DriverConfig::default().framing(Framing::BlankLine);
//! let batches = sseer_net::open_with(&Plaintext, config, "localhost", 8080, "/events")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! | Feature | Default | Description |
//! | --- | --- | --- |
//! | `tls` | on | TLS connections via [`rustls`] with the webpki root store. |
//! | `serde` | off | Derives [`Serialize`][::serde::Serialize] and [`Deserialize`][::serde::Deserialize] on [`Event`][event::Event]. |

pub mod config;
pub mod connection;
pub(crate) mod constants;
pub mod errors;
pub mod event;
pub mod event_stream;
pub mod framing;
pub mod parser;

pub use constants::DEFAULT_READ_CHUNK;
pub use event_stream::{BatchStream, EventBatches, Polled};

use crate::{
    config::DriverConfig,
    connection::{Connector, Transport, TransportConnector},
    errors::Error,
};

/// Connects to `hostname:port` (over TLS if `encrypted`), requests `path` and returns the event batches with the default [`DriverConfig`]
pub fn open(
    hostname: &str,
    port: u16,
    path: &str,
    encrypted: bool,
) -> Result<EventBatches<Transport>, Error> {
    open_with(
        &TransportConnector::new(encrypted),
        DriverConfig::default(),
        hostname,
        port,
        path,
    )
}

/// Like [`open`] but with your own [`Connector`] and [`DriverConfig`]
pub fn open_with<K: Connector>(
    connector: &K,
    config: DriverConfig,
    hostname: &str,
    port: u16,
    path: &str,
) -> Result<EventBatches<K::Conn>, Error> {
    let conn = connector.connect(hostname, port)?;
    EventBatches::start(conn, path, config)
}
