use bytes::Bytes;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// The frame being assembled: an optional event name plus the `data` lines
/// seen since the last blank line.
#[derive(Debug, Default)]
struct Frame {
    name: Option<String>,
    payload: Vec<String>,
}

impl Frame {
    fn take(&mut self) -> Option<SseEvent> {
        if self.name.is_none() && self.payload.is_empty() {
            return None;
        }
        let frame = std::mem::take(self);
        Some(SseEvent {
            event: frame.name,
            data: frame.payload.join("\n"),
        })
    }
}

/// Incremental SSE parser. TCP does not preserve line boundaries, so bytes
/// accumulate until a `\n`-terminated line is complete; a `data:` line whose
/// JSON payload has not closed yet is held back and re-joined with whatever
/// follows (some upstreams split one JSON document across frames).
#[derive(Debug, Default)]
pub struct SseParser {
    pending: String,
    frame: Frame,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.pending.push_str(chunk);
        let mut out = Vec::new();
        while let Some(line) = self.take_line() {
            self.consume_line(&line, &mut out);
        }
        out
    }

    /// Drain whatever is still buffered at upstream EOF, truncated or not.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let mut line = std::mem::take(&mut self.pending);
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            self.consume_line(&line, &mut out);
        }
        out.extend(self.frame.take());
        out
    }

    /// Pop the next complete line. A line carrying unfinished JSON loses its
    /// newline and stays at the front of the buffer, so later bytes extend
    /// the same line until the document closes.
    fn take_line(&mut self) -> Option<String> {
        loop {
            let end = self.pending.find('\n')?;
            let mut line = self.pending[..end].to_string();
            if line.ends_with('\r') {
                line.pop();
            }
            if holds_unfinished_json(&line) {
                let tail = self.pending.split_off(end + 1);
                self.pending = line;
                self.pending.push_str(&tail);
                if !self.pending.contains('\n') {
                    return None;
                }
                continue;
            }
            self.pending.drain(..=end);
            return Some(line);
        }
    }

    fn consume_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            out.extend(self.frame.take());
            return;
        }
        if line.starts_with(':') {
            return;
        }

        // A field line without a colon is a field with an empty value.
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.trim_start()),
            None => (line, ""),
        };
        match field {
            "event" => self.frame.name = (!value.is_empty()).then(|| value.to_string()),
            "data" => self.frame.payload.push(value.to_string()),
            _ => {}
        }
    }
}

/// A `data:` line whose JSON document does not close yet. `[DONE]` and
/// non-JSON payloads are never held back.
fn holds_unfinished_json(line: &str) -> bool {
    let Some(payload) = line.strip_prefix("data:") else {
        return false;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return false;
    }
    let opens_json = payload.starts_with('{') || payload.starts_with('[');
    opens_json && !(payload.ends_with('}') || payload.ends_with(']'))
}
