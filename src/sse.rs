//! Incremental decoder of the server-sent events wire format.

/// A complete event received on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Splits a byte stream into [`SseEvent`]s.
///
/// Chunks may end anywhere, including inside a line or a multi-byte character. A blank line ends
/// the current event. Fields other than `event` and `data` are ignored, as are comment lines
/// starting with `:`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> SseDecoder {
        SseDecoder::default()
    }

    /// Feed the next chunk of the stream and return events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the pending event, if any. Called when the stream ends without a trailing blank
    /// line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let _ = self.process_line(&String::from_utf8_lossy(&line));
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.trim().is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field.trim(), value.trim()),
            None => (line.trim(), ""),
        };
        match field {
            "data" => {
                if !value.is_empty() {
                    self.data.push(value.to_owned());
                }
            }
            "event" => self.event = Some(value.to_owned()).filter(|event| !event.is_empty()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{SseDecoder, SseEvent};

    fn data(data: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: data.to_owned(),
        }
    }

    #[test]
    fn blank_line_ends_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"features\":{}}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec![data("{\"features\":{}}")]);
    }

    #[test]
    fn event_name_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: features\ndata: line1\ndata: line2\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("features".to_owned()),
                data: "line1\nline2".to_owned(),
            }]
        );
    }

    #[test]
    fn chunks_split_anywhere() {
        let payload = "data: {\"v\":\"é\"}\r\n\r\ndata: 2\n\n".as_bytes();
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for byte in payload {
            events.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(events, vec![data("{\"v\":\"é\"}"), data("2")]);
    }

    #[test]
    fn unknown_fields_and_comments_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nid: 7\nretry: 1000\ndata: x\nfoo\n\n");
        assert_eq!(events, vec![data("x")]);
    }

    #[test]
    fn empty_events_are_dropped() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: ping\n\n\n").is_empty());
        // the event name does not leak into the next event
        assert_eq!(decoder.push(b"data: x\n\n"), vec![data("x")]);
    }

    #[test]
    fn finish_flushes_pending_data() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: a\ndata: b").is_empty());
        assert_eq!(decoder.finish(), Some(data("a\nb")));
        assert_eq!(decoder.finish(), None);
    }
}
