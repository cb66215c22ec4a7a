//! Event frame encoding
//!
//! A frame is one text block in the Server-Sent Events format:
//!
//! ```text
//! retry: 3000\r\n        (only when retry != 0)
//! id: 5\r\n              (only when id != 0)
//! event: update\r\n      (only when an event name is given)
//! data: line1\r\n        (one per line of the message)
//! data: line2\r\n
//! \r\n                   (blank line terminates the frame)
//! ```
//!
//! `\r\n`, `\n\r`, `\r` and `\n` each count as a single line separator, so a
//! CRLF pair never produces an empty data line between its two halves.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{FIELD_DATA, FIELD_EVENT, FIELD_ID, FIELD_RETRY, LINE_END};

/// Encode a single event into its wire frame
pub fn encode_event(message: &str, event: Option<&str>, id: u32, retry: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame_capacity(message, event));

    if retry != 0 {
        put_field(&mut buf, FIELD_RETRY, retry.to_string().as_bytes());
    }
    if id != 0 {
        put_field(&mut buf, FIELD_ID, id.to_string().as_bytes());
    }
    if let Some(event) = event {
        put_field(&mut buf, FIELD_EVENT, event.as_bytes());
    }

    let data = message.as_bytes();
    let mut start = 0;

    loop {
        match find_line_break(&data[start..]) {
            None => {
                put_field(&mut buf, FIELD_DATA, &data[start..]);
                buf.put_slice(LINE_END);
                break;
            }
            Some((offset, separator_len)) => {
                put_field(&mut buf, FIELD_DATA, &data[start..start + offset]);
                start += offset + separator_len;

                if start >= data.len() {
                    buf.put_slice(LINE_END);
                    break;
                }
            }
        }
    }

    buf.freeze()
}

/// Locate the next line separator, returning its offset and length (1 or 2)
fn find_line_break(data: &[u8]) -> Option<(usize, usize)> {
    let pos = data.iter().position(|&b| b == b'\r' || b == b'\n')?;
    let len = match (data[pos], data.get(pos + 1)) {
        (b'\r', Some(b'\n')) | (b'\n', Some(b'\r')) => 2,
        _ => 1,
    };
    Some((pos, len))
}

fn put_field(buf: &mut BytesMut, name: &[u8], value: &[u8]) {
    buf.put_slice(name);
    buf.put_slice(value);
    buf.put_slice(LINE_END);
}

fn frame_capacity(message: &str, event: Option<&str>) -> usize {
    // Rough upper bound: fixed fields plus one "data: " prefix per byte-sized line
    let lines = message.bytes().filter(|&b| b == b'\n' || b == b'\r').count() + 1;
    64 + event.map_or(0, str::len) + message.len() + lines * (FIELD_DATA.len() + LINE_END.len())
}

/// An event waiting to be encoded
///
/// Convenience builder over [`encode_event`] for callers that assemble events
/// in several steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFrame {
    /// Message payload, may span several lines
    pub message: String,
    /// Event name (`event:` field)
    pub event: Option<String>,
    /// Event id (`id:` field, omitted when 0)
    pub id: u32,
    /// Reconnect delay in milliseconds (`retry:` field, omitted when 0)
    pub retry: u32,
}

impl EventFrame {
    /// Create a frame carrying only data
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the event name
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the event id
    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Set the client reconnect delay
    pub fn retry(mut self, retry_ms: u32) -> Self {
        self.retry = retry_ms;
        self
    }

    /// Encode into wire bytes
    pub fn encode(&self) -> Bytes {
        encode_event(&self.message, self.event.as_deref(), self.id, self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Extract the `data:` payloads of a single frame
    fn data_lines(frame: &[u8]) -> Vec<String> {
        let text = std::str::from_utf8(frame).unwrap();
        assert!(text.ends_with("\r\n\r\n"), "frame not terminated: {:?}", text);
        text.split("\r\n")
            .filter_map(|line| line.strip_prefix("data: "))
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_plain_message() {
        let frame = encode_event("hello", None, 0, 0);
        assert_eq!(&frame[..], b"data: hello\r\n\r\n");
    }

    #[test]
    fn test_all_fields() {
        let frame = encode_event("line1\nline2", Some("update"), 5, 3000);
        assert_eq!(
            &frame[..],
            b"retry: 3000\r\nid: 5\r\nevent: update\r\ndata: line1\r\ndata: line2\r\n\r\n"
        );
    }

    #[test]
    fn test_empty_message() {
        let frame = encode_event("", None, 0, 0);
        assert_eq!(&frame[..], b"data: \r\n\r\n");
    }

    #[test]
    fn test_crlf_is_one_separator() {
        assert_eq!(
            &encode_event("a\r\nb", None, 0, 0)[..],
            b"data: a\r\ndata: b\r\n\r\n"
        );
        assert_eq!(
            &encode_event("a\n\rb", None, 0, 0)[..],
            b"data: a\r\ndata: b\r\n\r\n"
        );
        assert_eq!(
            &encode_event("a\rb", None, 0, 0)[..],
            b"data: a\r\ndata: b\r\n\r\n"
        );
    }

    #[test]
    fn test_repeated_separators_keep_empty_lines() {
        assert_eq!(
            &encode_event("a\n\nb", None, 0, 0)[..],
            b"data: a\r\ndata: \r\ndata: b\r\n\r\n"
        );
        assert_eq!(
            &encode_event("a\r\n\r\nb", None, 0, 0)[..],
            b"data: a\r\ndata: \r\ndata: b\r\n\r\n"
        );
    }

    #[test]
    fn test_trailing_separator() {
        assert_eq!(&encode_event("a\n", None, 0, 0)[..], b"data: a\r\n\r\n");
        assert_eq!(&encode_event("\n", None, 0, 0)[..], b"data: \r\n\r\n");
    }

    #[test]
    fn test_event_only_and_id_only() {
        assert_eq!(
            &encode_event("x", Some("ping"), 0, 0)[..],
            b"event: ping\r\ndata: x\r\n\r\n"
        );
        assert_eq!(&encode_event("x", None, 42, 0)[..], b"id: 42\r\ndata: x\r\n\r\n");
        assert_eq!(
            &encode_event("x", None, 0, 1500)[..],
            b"retry: 1500\r\ndata: x\r\n\r\n"
        );
    }

    #[test]
    fn test_data_round_trip() {
        let messages = [
            "single",
            "two\nlines",
            "three\nshort\nlines",
            "blank\n\nmiddle",
            "",
            "unicode ✓\nsecond ✓",
        ];

        for message in messages {
            for separator in ["\n", "\r\n", "\r"] {
                let input = message.replace('\n', separator);
                let frame = encode_event(&input, Some("e"), 7, 0);
                let rejoined = data_lines(&frame).join(separator);
                assert_eq!(rejoined, input, "round trip failed for {:?}", input);
            }
        }
    }

    #[test]
    fn test_event_frame_builder() {
        let frame = EventFrame::new("line1\nline2")
            .event("update")
            .id(5)
            .retry(3000);

        assert_eq!(frame.encode(), encode_event("line1\nline2", Some("update"), 5, 3000));
    }
}
