//! Byte streams the driver can read SSE from, and the strategies that open them
//!
//! A [`Connector`] turns a host and port into a [`Connection`]. [`Plaintext`] gives a bare
//! [`TcpStream`], [`Tls`] (requires `tls` feature) wraps one in rustls and finishes the handshake
//! before handing it over. [`TransportConnector`] picks between the two at runtime.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

use crate::errors::Error;

/// A bidirectional byte stream that can be switched into non-blocking mode.
///
/// Once non-blocking, [`read`][Read::read] must fail with [`io::ErrorKind::WouldBlock`] when
/// there's nothing to read and return `Ok(0)` only when the peer has hung up.
pub trait Connection: Read + Write {
    fn make_nonblocking(&mut self) -> io::Result<()>;

    /// Best effort goodbye to the peer, called right before the connection is dropped
    fn close(&mut self) {}
}

impl Connection for TcpStream {
    fn make_nonblocking(&mut self) -> io::Result<()> {
        self.set_nonblocking(true)
    }

    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Produces a connection for a host and port. The connection is still blocking when it comes back.
pub trait Connector {
    type Conn: Connection;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, Error>;
}

fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, Error> {
    tracing::debug!(host, port, "connecting");
    TcpStream::connect((host, port)).map_err(Error::Connect)
}

/// Plain TCP, no encryption
#[derive(Debug, Clone, Copy, Default)]
pub struct Plaintext;

impl Connector for Plaintext {
    type Conn = TcpStream;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, Error> {
        connect_tcp(host, port)
    }
}

#[cfg(feature = "tls")]
pub use tls::{Tls, TlsStream};

#[cfg(feature = "tls")]
mod tls {
    use std::{
        io::{self, Read, Write},
        net::{Shutdown, TcpStream},
        sync::Arc,
    };

    use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned, pki_types::ServerName};

    use super::{Connection, Connector, connect_tcp};
    use crate::errors::Error;

    /// TLS over TCP, verified against the webpki root store by default
    #[derive(Debug, Clone)]
    pub struct Tls {
        config: Arc<ClientConfig>,
    }

    impl Tls {
        pub fn new() -> Result<Self, Error> {
            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::ring::default_provider(),
            ))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(io::Error::other(e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

            Ok(Self::with_config(Arc::new(config)))
        }

        /// Use a custom rustls config, e.g. with a private root store
        pub fn with_config(config: Arc<ClientConfig>) -> Self {
            Self { config }
        }
    }

    impl Connector for Tls {
        type Conn = TlsStream;

        fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, Error> {
            let server_name = ServerName::try_from(host)
                .map_err(Error::InvalidServerName)?
                .to_owned();
            let mut conn = ClientConnection::new(self.config.clone(), server_name)
                .map_err(|e| Error::Tls(io::Error::other(e)))?;
            let mut sock = connect_tcp(host, port)?;

            // socket is still blocking here so this runs the handshake to completion
            while conn.is_handshaking() {
                conn.complete_io(&mut sock).map_err(Error::Tls)?;
            }
            tracing::debug!(
                host,
                version = ?conn.protocol_version(),
                "tls handshake complete"
            );

            Ok(TlsStream(StreamOwned::new(conn, sock)))
        }
    }

    /// A rustls client session over a [`TcpStream`]
    #[derive(Debug)]
    pub struct TlsStream(StreamOwned<ClientConnection, TcpStream>);

    impl Read for TlsStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf) {
                // plenty of servers hang up without a close_notify, treat it the same as a clean close
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("peer closed without close_notify");
                    Ok(0)
                }
                res => res,
            }
        }
    }

    impl Write for TlsStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

    impl Connection for TlsStream {
        fn make_nonblocking(&mut self) -> io::Result<()> {
            self.0.sock.set_nonblocking(true)
        }

        fn close(&mut self) {
            let StreamOwned { conn, sock, .. } = &mut self.0;
            conn.send_close_notify();
            while conn.wants_write() {
                if !matches!(conn.write_tls(sock), Ok(written) if written > 0) {
                    break;
                }
            }
            let _ = sock.shutdown(Shutdown::Both);
        }
    }
}

/// Either kind of connection, for when encryption is decided at runtime
#[derive(Debug)]
pub enum Transport {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream>),
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.read(buf),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.write(buf),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.flush(),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => stream.flush(),
        }
    }
}

impl Connection for Transport {
    fn make_nonblocking(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.make_nonblocking(),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => stream.make_nonblocking(),
        }
    }

    fn close(&mut self) {
        match self {
            Transport::Plain(stream) => Connection::close(stream),
            #[cfg(feature = "tls")]
            Transport::Tls(stream) => stream.close(),
        }
    }
}

/// Opens a [`Transport`], encrypted or not
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportConnector {
    pub encrypted: bool,
}

impl TransportConnector {
    pub fn new(encrypted: bool) -> Self {
        Self { encrypted }
    }
}

impl Connector for TransportConnector {
    type Conn = Transport;

    #[cfg(feature = "tls")]
    fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, Error> {
        if self.encrypted {
            Ok(Transport::Tls(Box::new(Tls::new()?.connect(host, port)?)))
        } else {
            Ok(Transport::Plain(Plaintext.connect(host, port)?))
        }
    }

    #[cfg(not(feature = "tls"))]
    fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, Error> {
        if self.encrypted {
            return Err(Error::Connect(io::Error::new(
                io::ErrorKind::Unsupported,
                "encrypted connections need the `tls` feature",
            )));
        }
        Ok(Transport::Plain(Plaintext.connect(host, port)?))
    }
}
