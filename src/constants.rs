use bytes_utils::Str;

pub(crate) const LF: u8 = b'\n';
pub(crate) const CR: u8 = b'\r';

pub(crate) const CRLF: &[u8; 2] = b"\r\n";
// end of the HTTP response header block
pub(crate) const HEADER_END: &[u8; 4] = b"\r\n\r\n";
pub(crate) const STATUS_LINE_PREFIX: &[u8; 5] = b"HTTP/";

pub(crate) const EMPTY_STR: Str = Str::from_static("");
pub(crate) const MESSAGE_STR: Str = Str::from_static("message");

/// Largest single read the driver asks the socket for by default
pub const DEFAULT_READ_CHUNK: usize = 8192;
