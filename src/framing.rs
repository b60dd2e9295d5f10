//! Splitting the accumulation buffer into records
//!
//! Two framings are available:
//!
//! - [`Framing::Parity`] splits on every `\r\n` and keeps the fields at odd indices. Whatever is
//!   left over at the end of the buffer is thrown away, the buffer is always consumed whole.
//!   This lines up with bodies where each record travels between a pair of `\r\n`s (such as a size line followed by the record).
//! - [`Framing::BlankLine`] ends a record at a blank line (cr, lf or crlf terminated) and leaves
//!   any incomplete trailing record in the buffer for the next read.

use core::str::Utf8Error;

use bytes::{Bytes, BytesMut};
use bytes_utils::Str;

use crate::constants::{CR, CRLF, LF};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Odd indexed `\r\n` fields are records, the whole buffer is consumed every pass
    #[default]
    Parity,
    /// Records end at a blank line, the incomplete tail is kept
    BlankLine,
}

fn validate_bytes(val: Bytes) -> Result<Str, Utf8Error> {
    match str::from_utf8(val.as_ref()) {
        // Safety: we just checked the bytes are valid utf8
        Ok(_) => Ok(unsafe { Str::from_inner_unchecked(val) }),
        Err(e) => Err(e),
    }
}

/// Splits `chunk` on `\r\n` and returns every odd indexed field as a record
pub fn split_parity(chunk: &Bytes) -> Result<Vec<Str>, Utf8Error> {
    let mut records = Vec::new();
    let mut field_start = 0;
    let mut field_index = 0;

    for delimiter in memchr::memmem::find_iter(chunk, CRLF) {
        if field_index % 2 == 1 {
            records.push(validate_bytes(chunk.slice(field_start..delimiter))?);
        }
        field_start = delimiter + CRLF.len();
        field_index += 1;
    }

    // whatever follows the last delimiter
    if field_index % 2 == 1 {
        records.push(validate_bytes(chunk.slice(field_start..))?);
    }

    Ok(records)
}

/// Finds the next EOL, returns the non-inclusive end of the line and the inclusive start of the remainder.
/// Returns [None] when there is no EOL, or when the slice ends in a cr that might still turn into crlf.
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let first_match = memchr::memchr2(CR, LF, bytes)?;

    match bytes[first_match] {
        LF => Some((first_match, first_match + 1)),
        CR => {
            if first_match + 1 >= bytes.len() {
                return None; // need more data to see if it's CRLF or just CR
            }

            if bytes[first_match + 1] == LF {
                Some((first_match, first_match + 2))
            } else {
                Some((first_match, first_match + 1))
            }
        }
        _ => unreachable!(),
    }
}

/// Pulls every blank line terminated record out of `buffer`, leaving the incomplete tail behind.
/// Runs of blank lines between records produce nothing.
pub fn split_blank_line(buffer: &mut BytesMut) -> Result<Vec<Str>, Utf8Error> {
    let mut boundaries = Vec::new();
    let mut pos = 0;
    let mut record_start = 0;

    while let Some((line_end, rem_start)) = find_eol(&buffer[pos..]) {
        if line_end == 0 {
            if pos > record_start {
                boundaries.push((record_start, pos));
            }
            record_start = pos + rem_start;
        }
        pos += rem_start;
    }

    let consumed = buffer.split_to(record_start).freeze();
    boundaries
        .into_iter()
        .map(|(start, end)| validate_bytes(consumed.slice(start..end)))
        .collect()
}

/// Extracts records from `buffer` according to `framing`. After this returns `buffer` only holds bytes that weren't part of a returned record.
pub fn split(buffer: &mut BytesMut, framing: Framing) -> Result<Vec<Str>, Utf8Error> {
    match framing {
        Framing::Parity => split_parity(&buffer.split().freeze()),
        Framing::BlankLine => split_blank_line(buffer),
    }
}
