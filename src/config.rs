//! Knobs for [`EventBatches`][crate::event_stream::EventBatches]

use crate::{constants::DEFAULT_READ_CHUNK, framing::Framing};

/// Which request line gets written to the socket. It's the only thing ever sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStyle {
    /// `GET <path> HTTP/1.0\r\nConnection: keep-alive\r\n\r\n`
    #[default]
    Http10KeepAlive,
    /// `GET <path> HTTP/1.1\n\n`
    Http11Bare,
}

impl RequestStyle {
    pub fn request_line(&self, path: &str) -> String {
        match self {
            RequestStyle::Http10KeepAlive => {
                format!("GET {path} HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")
            }
            RequestStyle::Http11Bare => format!("GET {path} HTTP/1.1\n\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub request_style: RequestStyle,
    pub framing: Framing,
    /// Max bytes asked for per read, zero is read as one byte
    pub read_chunk_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            request_style: RequestStyle::default(),
            framing: Framing::default(),
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl DriverConfig {
    pub fn request_style(mut self, request_style: RequestStyle) -> Self {
        self.request_style = request_style;
        self
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Sets the read size, clamped to at least one byte since a zero length read means the peer hung up
    pub fn read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size.max(1);
        self
    }
}
