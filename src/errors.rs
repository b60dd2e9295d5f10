//! [`Error`][core::error::Error] implementations used across the crate

use core::{
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::Utf8Error,
};
use std::io;

/// A single record could not be turned into an [Event][crate::event::Event]
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The record had invalid utf8
    Utf8Error(Utf8Error),
    /// The `retry` field was not a base 10 integer
    InvalidRetry {
        value: String,
        source: ParseIntError,
    },
}

impl From<Utf8Error> for DecodeError {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::Utf8Error(e) => e.fmt(f),
            DecodeError::InvalidRetry { value, source } => {
                write!(f, "invalid retry value {value:?}: {source}")
            }
        }
    }
}

impl core::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            DecodeError::Utf8Error(e) => Some(e),
            DecodeError::InvalidRetry { source, .. } => Some(source),
        }
    }
}

/// Everything that can end an SSE connection early. Running out of data (would block) and the peer hanging up are not errors.
#[derive(Debug)]
pub enum Error {
    /// Couldn't establish the TCP connection
    Connect(io::Error),
    /// Hostname can't be used for SNI / certificate validation
    #[cfg(feature = "tls")]
    InvalidServerName(rustls::pki_types::InvalidDnsNameError),
    /// TLS setup or handshake failed
    #[cfg(feature = "tls")]
    Tls(io::Error),
    /// Writing the request line failed
    Request(io::Error),
    /// Something went wrong with the socket while streaming
    Transport(io::Error),
    /// A record could not be decoded
    Decode(DecodeError),
}

impl Error {
    /// Whether this error happened before the stream produced anything
    pub fn is_connect_err(&self) -> bool {
        match self {
            Error::Connect(_) | Error::Request(_) => true,
            #[cfg(feature = "tls")]
            Error::InvalidServerName(_) | Error::Tls(_) => true,
            Error::Transport(_) | Error::Decode(_) => false,
        }
    }

    pub fn is_decode_err(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Decode(DecodeError::Utf8Error(value))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Connect(e) => write!(f, "failed to connect: {e}"),
            #[cfg(feature = "tls")]
            Error::InvalidServerName(e) => write!(f, "invalid server name: {e}"),
            #[cfg(feature = "tls")]
            Error::Tls(e) => write!(f, "tls handshake failed: {e}"),
            Error::Request(e) => write!(f, "failed to send request: {e}"),
            Error::Transport(e) => e.fmt(f),
            Error::Decode(e) => e.fmt(f),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Connect(e) | Error::Request(e) | Error::Transport(e) => Some(e),
            #[cfg(feature = "tls")]
            Error::Tls(e) => Some(e),
            #[cfg(feature = "tls")]
            Error::InvalidServerName(e) => Some(e),
            Error::Decode(e) => Some(e),
        }
    }
}
