//! Representation of SSE events based primarily off <https://html.spec.whatwg.org/multipage/server-sent-events.html>

use core::time::Duration;

use bytes_utils::Str;

use crate::constants::{EMPTY_STR, MESSAGE_STR};

/// A single decoded record from an SSE stream. Every record decodes into a fresh [Event], nothing is shared between them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Payload, `data` lines joined with `\n`
    pub data: Str,
    /// Event type, `"message"` unless the record names one
    pub event: Str,
    /// Last event id, if the record set one
    pub id: Option<Str>,
    /// Reconnection delay the server asked for in milliseconds, exactly as sent (may be negative)
    pub retry: Option<i64>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            data: EMPTY_STR,
            event: MESSAGE_STR,
            id: None,
            retry: None,
        }
    }
}

impl Event {
    /// [`retry`](Event::retry) as a [Duration], negative values clamp to zero
    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry
            .map(|millis| Duration::from_millis(millis.max(0).unsigned_abs()))
    }
}
