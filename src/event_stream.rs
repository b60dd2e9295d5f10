use core::{
    iter::FusedIterator,
    pin::Pin,
    task::{Context, Poll},
};
use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use futures_core::Stream;

use crate::{
    config::DriverConfig,
    connection::Connection,
    constants::{HEADER_END, STATUS_LINE_PREFIX},
    errors::Error,
    event::Event,
    framing::{self, Framing},
    parser::decode_record,
};

/// Outcome of a single [`EventBatches::poll_batch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Polled {
    /// A read came in, these are the records it completed. May be empty.
    Batch(Vec<Event>),
    /// Nothing to read right now, poll again later
    WouldBlock,
    /// The peer hung up, or the stream already finished
    End,
}

#[derive(Debug)]
enum DriverState<C> {
    Streaming {
        conn: C,
        /// Still looking for the end of the HTTP response headers
        first_chunk: bool,
    },
    Closed,
}

/// Reads SSE off a non-blocking [`Connection`] one read at a time.
///
/// Each [`poll_batch`][Self::poll_batch] does at most one read and never waits on the socket. Every
/// successful read produces a batch of events, possibly empty. A read that would block produces
/// [`Polled::WouldBlock`], which the [`Iterator`] and [`Stream`] impls surface as an empty batch.
///
/// The connection is released as soon as the stream ends or errors, or when this is dropped.
#[derive(Debug)]
pub struct EventBatches<C: Connection> {
    state: DriverState<C>,
    buffer: BytesMut,
    config: DriverConfig,
}

/// True while `buffer` starts with, or is the start of, `HTTP/`
fn could_be_status_line(buffer: &[u8]) -> bool {
    let len = buffer.len().min(STATUS_LINE_PREFIX.len());
    buffer[..len] == STATUS_LINE_PREFIX[..len]
}

fn read_chunk<C: Connection>(
    conn: &mut C,
    buffer: &mut BytesMut,
    chunk_size: usize,
) -> io::Result<usize> {
    // an empty read buffer would come back as Ok(0) and look like a hang up
    let chunk_size = chunk_size.max(1);
    let start = buffer.len();
    buffer.resize(start + chunk_size, 0);
    let res = loop {
        match conn.read(&mut buffer[start..]) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            res => break res,
        }
    };
    buffer.truncate(start + res.as_ref().copied().unwrap_or(0));
    res
}

impl<C: Connection> EventBatches<C> {
    /// Writes the request line for `path` to `conn` then switches it to non-blocking mode
    pub fn start(mut conn: C, path: &str, config: DriverConfig) -> Result<Self, Error> {
        let request = config.request_style.request_line(path);
        conn.write_all(request.as_bytes())
            .and_then(|_| conn.flush())
            .map_err(Error::Request)?;
        tracing::debug!(path, style = ?config.request_style, "request sent");

        conn.make_nonblocking().map_err(Error::Transport)?;

        Ok(Self {
            state: DriverState::Streaming {
                conn,
                first_chunk: true,
            },
            buffer: BytesMut::with_capacity(config.read_chunk_size.max(1)),
            config,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, DriverState::Closed)
    }

    /// Bytes read but not yet part of a yielded event
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Does one non-blocking read and decodes whatever records it completed.
    ///
    /// Errors close the connection, after which every call returns [`Polled::End`].
    pub fn poll_batch(&mut self) -> Result<Polled, Error> {
        let read = match &mut self.state {
            DriverState::Streaming { conn, .. } => {
                read_chunk(conn, &mut self.buffer, self.config.read_chunk_size)
            }
            DriverState::Closed => return Ok(Polled::End),
        };

        match read {
            Ok(0) => {
                tracing::debug!("peer closed the connection");
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        bytes = self.buffer.len(),
                        "discarding incomplete record"
                    );
                    self.buffer.clear();
                }
                self.close();
                return Ok(Polled::End);
            }
            Ok(read) => tracing::trace!(bytes = read, "read"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Polled::WouldBlock),
            Err(e) => {
                tracing::debug!(error = %e, "read failed");
                self.close();
                return Err(Error::Transport(e));
            }
        }

        if let DriverState::Streaming { first_chunk, .. } = &mut self.state
            && *first_chunk
        {
            if !could_be_status_line(&self.buffer) {
                tracing::debug!("response has no headers");
                *first_chunk = false;
            } else {
                match memchr::memmem::find(&self.buffer, HEADER_END) {
                    Some(boundary) => {
                        tracing::debug!(bytes = boundary, "stripped response headers");
                        self.buffer.advance(boundary + HEADER_END.len());
                        *first_chunk = false;
                    }
                    // only the very first read is checked for headers with parity framing
                    None if self.config.framing == Framing::Parity => *first_chunk = false,
                    None => return Ok(Polled::Batch(Vec::new())),
                }
            }
        }

        match self.decode_buffer() {
            Ok(events) => {
                tracing::trace!(events = events.len(), "decoded batch");
                Ok(Polled::Batch(events))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode record");
                self.close();
                Err(e)
            }
        }
    }

    fn decode_buffer(&mut self) -> Result<Vec<Event>, Error> {
        let records = framing::split(&mut self.buffer, self.config.framing)?;
        records
            .iter()
            .map(|record| decode_record(record).map_err(Error::from))
            .collect()
    }

    fn close(&mut self) {
        self.buffer.clear();
        if let DriverState::Streaming { mut conn, .. } =
            core::mem::replace(&mut self.state, DriverState::Closed)
        {
            conn.close();
            tracing::debug!("connection released");
        }
    }
}

impl<C: Connection> Drop for EventBatches<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connection> Iterator for EventBatches<C> {
    type Item = Result<Vec<Event>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.poll_batch() {
            Ok(Polled::Batch(events)) => Some(Ok(events)),
            Ok(Polled::WouldBlock) => Some(Ok(Vec::new())),
            Ok(Polled::End) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<C: Connection> FusedIterator for EventBatches<C> {}

impl<C: Connection> EventBatches<C> {
    /// Wraps this in a [`Stream`] yielding the same items as the [`Iterator`] impl
    pub fn into_stream(self) -> BatchStream<C> {
        BatchStream { inner: self }
    }
}

/// [`Stream`] over an [`EventBatches`], see [`EventBatches::into_stream`].
///
/// Never returns [`Poll::Pending`], an empty batch is the "nothing yet" signal so the caller decides how long to wait.
#[derive(Debug)]
pub struct BatchStream<C: Connection> {
    inner: EventBatches<C>,
}

impl<C: Connection> BatchStream<C> {
    pub fn into_inner(self) -> EventBatches<C> {
        self.inner
    }
}

impl<C: Connection + Unpin> Stream for BatchStream<C> {
    type Item = Result<Vec<Event>, Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().inner.next())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        io::{Read, Write},
        rc::Rc,
    };

    use bytes_utils::Str;

    use super::*;
    use crate::{config::RequestStyle, errors::DecodeError};

    #[derive(Debug, Default)]
    struct Scripted {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Rc<RefCell<Vec<u8>>>,
        nonblocking: Rc<Cell<bool>>,
        closed: Rc<Cell<bool>>,
    }

    impl Scripted {
        fn new(reads: impl IntoIterator<Item = io::Result<&'static [u8]>>) -> Self {
            Self {
                reads: reads
                    .into_iter()
                    .map(|read| read.map(<[u8]>::to_vec))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.reads.push_front(Ok(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for Scripted {
        fn make_nonblocking(&mut self) -> io::Result<()> {
            self.nonblocking.set(true);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    fn chunk(bytes: &'static [u8]) -> io::Result<&'static [u8]> {
        Ok(bytes)
    }

    fn would_block() -> io::Result<&'static [u8]> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn message(data: &'static str) -> Event {
        Event {
            data: Str::from_static(data),
            ..Event::default()
        }
    }

    const HEADERS: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n";

    #[test]
    fn sends_request_then_goes_nonblocking() {
        let conn = Scripted::default();
        let written = conn.written.clone();
        let nonblocking = conn.nonblocking.clone();

        let _batches = EventBatches::start(conn, "/events", DriverConfig::default()).unwrap();
        assert_eq!(
            &written.borrow()[..],
            b"GET /events HTTP/1.0\r\nConnection: keep-alive\r\n\r\n"
        );
        assert!(nonblocking.get());

        let conn = Scripted::default();
        let written = conn.written.clone();
        let config = DriverConfig::default().request_style(RequestStyle::Http11Bare);
        let _batches = EventBatches::start(conn, "/", config).unwrap();
        assert_eq!(&written.borrow()[..], b"GET / HTTP/1.1\n\n");
    }

    #[test]
    fn headers_and_record_in_first_read() {
        let mut first_read = HEADERS.to_vec();
        first_read.extend_from_slice(b"9\r\ndata: hi!\r\n");
        let conn = Scripted::new([chunk(&*first_read.leak())]);

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("hi!")]);
        assert!(batches.next().is_none());
    }

    #[test]
    fn headers_and_record_in_first_read_blank_line() {
        let mut first_read = HEADERS.to_vec();
        first_read.extend_from_slice(b"event: ping\ndata: hi\n\n");
        let conn = Scripted::new([chunk(&*first_read.leak())]);

        let config = DriverConfig::default().framing(Framing::BlankLine);
        let mut batches = EventBatches::start(conn, "/", config).unwrap();
        assert_eq!(
            batches.next().unwrap().unwrap(),
            vec![Event {
                event: Str::from_static("ping"),
                ..message("hi")
            }]
        );
    }

    #[test]
    fn would_block_yields_empty_batch() {
        let conn = Scripted::new([
            would_block(),
            chunk(HEADERS),
            would_block(),
            chunk(b"1\r\ndata: a\r\n"),
        ]);

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.poll_batch().unwrap(), Polled::WouldBlock);
        assert_eq!(batches.poll_batch().unwrap(), Polled::Batch(vec![]));
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        assert!(!batches.is_closed());
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("a")]);
        assert!(batches.next().is_none());
    }

    #[test]
    fn zero_read_ends_cleanly() {
        let conn = Scripted::new([chunk(HEADERS)]);
        let closed = conn.closed.clone();

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        assert!(!closed.get());
        assert!(batches.next().is_none());
        assert!(closed.get());
        assert!(batches.is_closed());
        // fused
        assert!(batches.next().is_none());
        assert_eq!(batches.poll_batch().unwrap(), Polled::End);
    }

    #[test]
    fn headers_only_stripped_once() {
        let conn = Scripted::new([chunk(HEADERS), chunk(b"5\r\ndata: a\r\n\r\n")]);

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        // the second \r\n\r\n is not a header boundary, the empty field after it comes through as its own record
        assert_eq!(
            batches.next().unwrap().unwrap(),
            vec![message("a"), Event::default()]
        );
    }

    #[test]
    fn no_headers_in_first_read() {
        let conn = Scripted::new([chunk(b"1\r\ndata: a\r\n")]);

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("a")]);
    }

    #[test]
    fn parity_clears_buffer_after_each_batch() {
        let conn = Scripted::new([chunk(b"1\r\ndata: a\r\n1"), chunk(b"\r\ndata: b\r\n")]);

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("a")]);
        assert_eq!(batches.buffered(), 0);
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("b")]);
    }

    #[test]
    fn blank_line_keeps_tail_across_reads() {
        let conn = Scripted::new([
            chunk(b"HTTP/1.1 200 OK\r\n"),
            chunk(b"\r\ndata: a\n"),
            would_block(),
            chunk(b"\ndata: b\n\n"),
        ]);

        let config = DriverConfig::default().framing(Framing::BlankLine);
        let mut batches = EventBatches::start(conn, "/", config).unwrap();
        // headers not finished yet
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        assert_eq!(batches.buffered(), b"data: a\n".len());
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        assert_eq!(
            batches.next().unwrap().unwrap(),
            vec![message("a"), message("b")]
        );
        assert_eq!(batches.buffered(), 0);
        assert!(batches.next().is_none());
    }

    #[test]
    fn headerless_blank_line_body() {
        let conn = Scripted::new([chunk(b"data: a\n\n"), chunk(b"data: b\n\n")]);

        let config = DriverConfig::default().framing(Framing::BlankLine);
        let mut batches = EventBatches::start(conn, "/", config).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("a")]);
        assert_eq!(batches.next().unwrap().unwrap(), vec![message("b")]);
        assert!(batches.next().is_none());
    }

    #[test]
    fn headerless_crlf_body_keeps_first_record() {
        let conn = Scripted::new([chunk(b"data: a\r\n\r\ndata: b\r\n\r\n")]);

        let config = DriverConfig::default().framing(Framing::BlankLine);
        let mut batches = EventBatches::start(conn, "/", config).unwrap();
        assert_eq!(
            batches.next().unwrap().unwrap(),
            vec![message("a"), message("b")]
        );
    }

    #[test]
    fn zero_chunk_size_still_reads() {
        let conn = Scripted::new([chunk(b"data: a\n\n")]);

        let config = DriverConfig {
            framing: Framing::BlankLine,
            read_chunk_size: 0,
            ..Default::default()
        };
        let events = EventBatches::start(conn, "/", config)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .concat();
        assert_eq!(events, vec![message("a")]);
    }

    #[test]
    fn small_reads() {
        let mut body = HEADERS.to_vec();
        body.extend_from_slice(b"data: x\n\n");
        let conn = Scripted::new([chunk(&*body.leak())]);

        let config = DriverConfig::default()
            .framing(Framing::BlankLine)
            .read_chunk_size(4);
        let events = EventBatches::start(conn, "/", config)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .concat();
        assert_eq!(events, vec![message("x")]);
    }

    #[test]
    fn decode_error_ends_stream() {
        let conn = Scripted::new([chunk(b"1\r\nretry: abc\r\n"), chunk(b"1\r\ndata: a\r\n")]);
        let closed = conn.closed.clone();

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        let err = batches.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::InvalidRetry { .. })
        ));
        assert!(closed.get());
        assert!(batches.next().is_none());
    }

    #[test]
    fn bad_utf8_ends_stream() {
        let conn = Scripted::new([chunk(b"1\r\ndata: \xFF\r\n")]);

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert!(matches!(
            batches.next().unwrap(),
            Err(Error::Decode(DecodeError::Utf8Error(_)))
        ));
        assert!(batches.next().is_none());
    }

    #[test]
    fn transport_error_ends_stream() {
        let conn = Scripted::new([Err(io::ErrorKind::ConnectionReset.into())]);
        let closed = conn.closed.clone();

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        let err = batches.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Transport(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert!(!err.is_connect_err());
        assert!(closed.get());
        assert!(batches.next().is_none());
    }

    #[test]
    fn dropping_releases_connection() {
        let conn = Scripted::new([would_block()]);
        let closed = conn.closed.clone();

        let mut batches = EventBatches::start(conn, "/", DriverConfig::default()).unwrap();
        assert_eq!(batches.next().unwrap().unwrap(), vec![]);
        drop(batches);
        assert!(closed.get());
    }

    #[tokio::test]
    async fn as_stream() {
        let conn = Scripted::new([
            chunk(HEADERS),
            would_block(),
            chunk(b"1\r\nevent: add\ndata: 73857293\r\n1\r\nretry: 10\ndata: 2153\r\n"),
        ]);

        use futures::TryStreamExt;

        let batches = EventBatches::start(conn, "/", DriverConfig::default())
            .unwrap()
            .into_stream()
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(
            batches,
            vec![
                vec![],
                vec![],
                vec![
                    Event {
                        event: Str::from_static("add"),
                        ..message("73857293")
                    },
                    Event {
                        retry: Some(10),
                        ..message("2153")
                    }
                ]
            ]
        );
    }
}
