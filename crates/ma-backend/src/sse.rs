//! Incremental Server-Sent Events decoder.
//!
//! Bytes are fed as they arrive from the network; complete events come out.
//! Chunk boundaries may fall anywhere, including inside a UTF-8 sequence.

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field). None if not specified.
    pub event_type: Option<String>,
    /// The event data (from `data:` field(s)), joined with newlines.
    pub data: String,
}

/// Push-based SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line.
    pending: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.pending);
                let line = String::from_utf8_lossy(&raw);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(event) = self.process_line(line) {
                    events.push(event);
                }
            } else {
                self.pending.push(byte);
            }
        }
        events
    }

    /// Flush whatever is buffered once the byte stream has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        // Blank line terminates the event
        if line.is_empty() {
            return self.take_event();
        }

        // Lines without a colon, and comment lines, carry nothing we use
        let (field, value) = line.split_once(':')?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event_type = None;
            return None;
        }
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: ping\ndata: {}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event_type: Some("ping".to_string()),
                data: "{}".to_string(),
            }]
        );
    }

    #[test]
    fn event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: content_block_delta\nda").is_empty());
        assert!(decoder.feed(b"ta: {\"a\":1}").is_empty());
        let events = decoder.feed(b"\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("content_block_delta"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: héllo\n\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let events = decoder.feed(&bytes[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\ndata: two\n\n");
        assert_eq!(events[0].data, "one\ntwo");
        assert!(events[0].event_type.is_none());
    }

    #[test]
    fn crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: done\r\ndata: x\r\n\r\n");
        assert_eq!(events[0].event_type.as_deref(), Some("done"));
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn comments_and_unknown_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keepalive\nid: 7\nretry: 100\ndata: ok\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn event_without_data_is_dropped() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: lonely\n\n").is_empty());
        // The dangling type must not leak into the next event
        let events = decoder.feed(b"data: next\n\n");
        assert!(events[0].event_type.is_none());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: message_stop\ndata: {}").is_empty());
        let event = decoder.finish().unwrap();
        assert_eq!(event.event_type.as_deref(), Some("message_stop"));
        assert_eq!(event.data, "{}");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn several_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: a\n\ndata: b\n\ndata: c\n\n");
        let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }
}
