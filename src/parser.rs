//! Line grammar for SSE records and the decoder that turns one record into an [Event]

use bytes_utils::{Str, StrMut};

use crate::{errors::DecodeError, event::Event};

/// A full line from an SSE record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventLine<'a> {
    Comment,
    Field {
        field_name: FieldName,
        field_value: &'a str,
    },
    Empty,
}

/// Field names the decoder understands, anything else gets thrown away into [FieldName::Ignored]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Ignored,
}

impl FieldName {
    fn from_name(name: &str) -> Self {
        match name {
            "event" => FieldName::Event,
            "data" => FieldName::Data,
            "id" => FieldName::Id,
            "retry" => FieldName::Retry,
            _ => FieldName::Ignored,
        }
    }
}

/// Reads a single line (without its EOL). The name is everything up to the first colon, the value is everything after it minus one leading space.
/// A line with no colon is all name and the value is empty.
pub fn parse_line(line: &str) -> RawEventLine<'_> {
    if line.is_empty() {
        return RawEventLine::Empty;
    }

    match memchr::memchr(b':', line.as_bytes()) {
        Some(0) => RawEventLine::Comment,
        Some(colon_pos) => {
            let value = &line[colon_pos + 1..];
            // strip single leading space if present
            let value = value.strip_prefix(' ').unwrap_or(value);
            RawEventLine::Field {
                field_name: FieldName::from_name(&line[..colon_pos]),
                field_value: value,
            }
        }
        None => RawEventLine::Field {
            field_name: FieldName::from_name(line),
            field_value: "",
        },
    }
}

/// Splits a record into lines on cr, lf or crlf. crlf produces an extra empty line which [parse_line] reads as [RawEventLine::Empty], and the decoder skips those anyway
fn lines(record: &str) -> impl Iterator<Item = &str> {
    record.split(['\r', '\n'])
}

#[derive(Debug)]
struct EventBuilder {
    data: StrMut,
    event: Option<Str>,
    id: Option<Str>,
    retry: Option<i64>,
}

impl EventBuilder {
    fn new() -> Self {
        Self {
            data: StrMut::new(),
            event: None,
            id: None,
            retry: None,
        }
    }

    fn add(&mut self, line: RawEventLine<'_>) -> Result<(), DecodeError> {
        match line {
            RawEventLine::Field {
                field_name: FieldName::Data,
                field_value,
            } => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(field_value);
            }
            RawEventLine::Field {
                field_name: FieldName::Event,
                field_value,
            } => self.event = Some(Str::from(field_value)),
            RawEventLine::Field {
                field_name: FieldName::Id,
                field_value,
            } => self.id = Some(Str::from(field_value)),
            RawEventLine::Field {
                field_name: FieldName::Retry,
                field_value,
            } => {
                let millis = field_value.trim_ascii().parse::<i64>().map_err(|source| {
                    DecodeError::InvalidRetry {
                        value: field_value.to_owned(),
                        source,
                    }
                })?;
                self.retry = Some(millis);
            }
            RawEventLine::Comment
            | RawEventLine::Empty
            | RawEventLine::Field {
                field_name: FieldName::Ignored,
                ..
            } => (),
        }
        Ok(())
    }

    fn finish(self) -> Event {
        let default = Event::default();
        Event {
            data: self.data.freeze(),
            event: self.event.unwrap_or(default.event),
            id: self.id,
            retry: self.retry,
        }
    }
}

/// Decodes one record into an [Event]. Fields missing from the record keep their [defaults](Event::default).
///
/// Fails only when `retry` isn't a base 10 integer, unknown fields and comments are skipped.
pub fn decode_record(record: &str) -> Result<Event, DecodeError> {
    let mut builder = EventBuilder::new();
    for line in lines(record) {
        builder.add(parse_line(line))?;
    }
    Ok(builder.finish())
}
