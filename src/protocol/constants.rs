//! Protocol constants

/// Content type announced by the stream preamble
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Header carrying the id of the last event a reconnecting client saw
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Default per-session queue depth before new messages are shed
pub const DEFAULT_MAX_QUEUED_MESSAGES: usize = 32;

/// Field prefixes
pub const FIELD_RETRY: &[u8] = b"retry: ";
pub const FIELD_ID: &[u8] = b"id: ";
pub const FIELD_EVENT: &[u8] = b"event: ";
pub const FIELD_DATA: &[u8] = b"data: ";

/// Line terminator used for every field and for the closing blank line
pub const LINE_END: &[u8] = b"\r\n";
