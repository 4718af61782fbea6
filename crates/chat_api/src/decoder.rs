use crate::events::{StreamEvent, DONE_MARKER, OBS_MARKER, STEP_MARKER};

/// Incremental decoder for the newline-framed reply protocol.
///
/// Bytes are held raw until a complete line arrives, so chunk boundaries may
/// fall anywhere: mid-line, inside a reserved marker, or inside a multi-byte
/// code point. Lines are only decoded once terminated.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    carry: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete events.
    ///
    /// Stops at the done marker: the decoder marks itself finished and any
    /// buffered or later-fed bytes are discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }

        self.carry.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.carry.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=split).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);

            let event = classify_line(&line);
            if event.is_terminal() {
                self.done = true;
                self.carry.clear();
                events.push(event);
                return events;
            }

            events.push(event);
        }

        events
    }

    /// Flush the carry buffer at end of input.
    ///
    /// A stream that closes with a non-empty tail that is not the done marker
    /// yields that tail as one final trimmed content fragment (servers that
    /// omit the trailing marker). A whitespace-only tail is discarded.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }

        self.done = true;
        let tail = std::mem::take(&mut self.carry);
        let tail = String::from_utf8_lossy(&tail);
        let trimmed = tail.trim();

        if trimmed.is_empty() {
            return None;
        }
        if trimmed == DONE_MARKER {
            return Some(StreamEvent::Completion);
        }

        Some(StreamEvent::ContentFragment {
            text: trimmed.to_string(),
        })
    }

    /// Decode a complete input in one shot, including the end-of-input flush.
    pub fn decode_all(input: &[u8]) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input);
        events.extend(decoder.finish());
        events
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn is_empty_carry(&self) -> bool {
        self.carry.is_empty()
    }
}

/// Classify one complete line, marker checks in reserved order.
fn classify_line(line: &str) -> StreamEvent {
    if let Some(rest) = line.strip_prefix(STEP_MARKER) {
        return StreamEvent::Step {
            text: rest.trim().to_string(),
        };
    }
    if let Some(rest) = line.strip_prefix(OBS_MARKER) {
        return StreamEvent::Observation {
            text: rest.trim().to_string(),
        };
    }
    if line == DONE_MARKER {
        return StreamEvent::Completion;
    }

    StreamEvent::ContentFragment {
        text: format!("{line}\n"),
    }
}
