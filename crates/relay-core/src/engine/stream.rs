use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

use relay_protocol::claude::stream::{StreamEnvelope, StreamEvent};
use relay_protocol::claude::types::ErrorDetail;
use relay_protocol::openai::chat::ChatCompletionChunk;
use relay_protocol::openai::responses::{ResponseEnvelope, ResponseEvent};
use relay_protocol::sse::{SseEvent, SseParser};
use relay_storage::UsageUpdate;
use relay_transform::claude2openai_chat::stream::{ChatStreamItem, ClaudeToChatStreamState};
use relay_transform::codex2openai_chat::stream::CodexToChatStreamState;

/// How upstream frames are rewritten for this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFormat {
    /// Native Anthropic client: frames pass through byte-faithfully.
    ClaudePassthrough,
    /// OpenAI-Chat client served from an Anthropic upstream.
    ChatFromClaude,
    /// Native Responses client.
    CodexPassthrough,
    /// OpenAI-Chat client served from the Responses upstream.
    ChatFromCodex,
}

/// One frame headed to the client.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    Bytes(Bytes),
    Chunk(ChatCompletionChunk),
    Done,
}

/// An error hidden inside a 200 OK stream, decoded to its real status.
#[derive(Debug, Clone)]
pub struct EmbeddedError {
    pub status: u16,
    pub message: String,
}

enum Policy {
    ClaudePassthrough,
    ChatFromClaude(ClaudeToChatStreamState),
    CodexPassthrough,
    ChatFromCodex(CodexToChatStreamState),
}

/// Translates a parsed SSE event stream for one client, watching for
/// embedded error frames and collecting usage along the way.
pub struct StreamRewriter {
    parser: SseParser,
    policy: Policy,
    usage: UsageAcc,
}

impl StreamRewriter {
    pub fn new(format: ClientFormat, created: i64) -> Self {
        let policy = match format {
            ClientFormat::ClaudePassthrough => Policy::ClaudePassthrough,
            ClientFormat::ChatFromClaude => {
                Policy::ChatFromClaude(ClaudeToChatStreamState::new(created))
            }
            ClientFormat::CodexPassthrough => Policy::CodexPassthrough,
            ClientFormat::ChatFromCodex => {
                Policy::ChatFromCodex(CodexToChatStreamState::new(created))
            }
        };
        Self {
            parser: SseParser::new(),
            policy,
            usage: UsageAcc::default(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &Bytes) -> Result<Vec<ClientFrame>, EmbeddedError> {
        let events = self.parser.push_bytes(chunk);
        self.handle_events(events)
    }

    /// Upstream EOF: drain whatever the line buffer still holds.
    pub fn finish(&mut self) -> Result<Vec<ClientFrame>, EmbeddedError> {
        let events = self.parser.finish();
        self.handle_events(events)
    }

    pub fn usage(&self, fallback_model: &str) -> UsageUpdate {
        self.usage.to_update(fallback_model)
    }

    fn handle_events(&mut self, events: Vec<SseEvent>) -> Result<Vec<ClientFrame>, EmbeddedError> {
        let mut frames = Vec::new();
        for event in events {
            frames.extend(self.handle_event(event)?);
        }
        Ok(frames)
    }

    fn handle_event(&mut self, event: SseEvent) -> Result<Vec<ClientFrame>, EmbeddedError> {
        if event.data == "[DONE]" {
            return Ok(match self.policy {
                Policy::ClaudePassthrough | Policy::CodexPassthrough => {
                    vec![ClientFrame::Bytes(Bytes::from_static(b"data: [DONE]\n\n"))]
                }
                _ => vec![ClientFrame::Done],
            });
        }
        if event.data.is_empty() {
            return Ok(Vec::new());
        }

        // An `event: error` frame carries the real failure, possibly inside
        // a gzip blob; under HTTP 200 this is the only place it shows up.
        if event.event.as_deref() == Some("error") {
            return Err(decode_error_frame(&event.data));
        }

        match &mut self.policy {
            Policy::ClaudePassthrough => {
                if let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(&event.data) {
                    if let StreamEnvelope::Known(StreamEvent::Error { error }) = &envelope {
                        return Err(decode_error_detail(error));
                    }
                    self.usage.observe_claude(&envelope);
                }
                Ok(vec![ClientFrame::Bytes(reencode_frame(&event))])
            }
            Policy::ChatFromClaude(state) => {
                let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(&event.data) else {
                    return Ok(Vec::new());
                };
                self.usage.observe_claude(&envelope);
                let mut frames = Vec::new();
                for item in state.transform_event(envelope) {
                    match item {
                        ChatStreamItem::Chunk(chunk) => frames.push(ClientFrame::Chunk(chunk)),
                        ChatStreamItem::Done => frames.push(ClientFrame::Done),
                        ChatStreamItem::Error(detail) => return Err(decode_error_detail(&detail)),
                    }
                }
                Ok(frames)
            }
            Policy::CodexPassthrough => {
                if let Ok(envelope) = serde_json::from_str::<ResponseEnvelope>(&event.data) {
                    self.usage.observe_codex(&envelope);
                }
                Ok(vec![ClientFrame::Bytes(reencode_frame(&event))])
            }
            Policy::ChatFromCodex(state) => {
                let Ok(envelope) = serde_json::from_str::<ResponseEnvelope>(&event.data) else {
                    return Ok(Vec::new());
                };
                self.usage.observe_codex(&envelope);
                let mut frames = Vec::new();
                for item in state.transform_event(envelope) {
                    match item {
                        ChatStreamItem::Chunk(chunk) => frames.push(ClientFrame::Chunk(chunk)),
                        ChatStreamItem::Done => frames.push(ClientFrame::Done),
                        ChatStreamItem::Error(detail) => return Err(decode_error_detail(&detail)),
                    }
                }
                Ok(frames)
            }
        }
    }
}

pub fn encode_chunk(chunk: &ChatCompletionChunk) -> Bytes {
    match serde_json::to_string(chunk) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(_) => Bytes::new(),
    }
}

pub fn encode_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

fn reencode_frame(event: &SseEvent) -> Bytes {
    let mut out = String::new();
    if let Some(name) = &event.event {
        out.push_str("event: ");
        out.push_str(name);
        out.push('\n');
    }
    out.push_str("data: ");
    out.push_str(&event.data);
    out.push_str("\n\n");
    Bytes::from(out)
}

fn decode_error_frame(data: &str) -> EmbeddedError {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(data) {
        let detail: Option<ErrorDetail> = value
            .get("error")
            .cloned()
            .and_then(|e| serde_json::from_value(e).ok());
        if let Some(detail) = detail {
            return decode_error_detail(&detail);
        }
    }
    EmbeddedError {
        status: classify_error_text(data),
        message: data.to_string(),
    }
}

fn decode_error_detail(detail: &ErrorDetail) -> EmbeddedError {
    if let Some(details) = &detail.details {
        let expanded = gunzip_if_needed(details);
        return EmbeddedError {
            status: classify_error_text(&expanded),
            message: expanded,
        };
    }
    let text = format!("{} {}", detail.kind, detail.message);
    EmbeddedError {
        status: classify_error_text(&text),
        message: text,
    }
}

/// `details` may hold a gzip blob, either as raw bytes or in the
/// unicode-escaped form (`…`) a JSON decoder produces from it.
fn gunzip_if_needed(details: &str) -> String {
    let bytes = gzip_candidate_bytes(details);
    match bytes {
        Some(bytes) => {
            let mut decoder = GzDecoder::new(bytes.as_slice());
            let mut out = Vec::new();
            match decoder.read_to_end(&mut out) {
                Ok(_) => String::from_utf8_lossy(&out).to_string(),
                Err(_) => details.to_string(),
            }
        }
        None => details.to_string(),
    }
}

fn gzip_candidate_bytes(details: &str) -> Option<Vec<u8>> {
    let mut chars = details.chars();
    let (first, second) = (chars.next()?, chars.next()?);
    if first != '\u{1f}' || second != '\u{8b}' {
        return None;
    }
    // Each scalar value below 0x100 is one original byte.
    details
        .chars()
        .map(|c| {
            let code = c as u32;
            (code <= 0xff).then_some(code as u8)
        })
        .collect()
}

/// Map a decoded error body to the HTTP status the classifier should see.
fn classify_error_text(text: &str) -> u16 {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(status) = value.get("status").and_then(|s| s.as_u64()) {
            return status as u16;
        }
    }
    let lower = text.to_ascii_lowercase();
    if lower.contains("overloaded") {
        529
    } else if lower.contains("unauthorized")
        || lower.contains("authentication")
        || (lower.contains("invalid") && (lower.contains("key") || lower.contains("token")))
    {
        401
    } else if lower.contains("forbidden") || lower.contains("permission") {
        403
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        429
    } else {
        502
    }
}

#[derive(Debug, Default)]
struct UsageAcc {
    model: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_tokens: u64,
    cache_read_tokens: u64,
}

impl UsageAcc {
    fn observe_claude(&mut self, envelope: &StreamEnvelope) {
        match envelope {
            StreamEnvelope::Known(StreamEvent::MessageStart { message }) => {
                self.model = Some(message.model.clone());
                let usage = &message.usage;
                self.input_tokens = usage.input_tokens.unwrap_or(0);
                self.output_tokens = usage.output_tokens.unwrap_or(0);
                self.cache_creation_tokens = usage.cache_creation_input_tokens.unwrap_or(0);
                self.cache_read_tokens = usage.cache_read_input_tokens.unwrap_or(0);
            }
            StreamEnvelope::Known(StreamEvent::MessageDelta { usage, .. }) => {
                if let Some(usage) = usage {
                    // The delta carries the final output count.
                    if let Some(output) = usage.output_tokens {
                        self.output_tokens = output;
                    }
                    if let Some(input) = usage.input_tokens {
                        self.input_tokens = input;
                    }
                }
            }
            _ => {}
        }
    }

    fn observe_codex(&mut self, envelope: &ResponseEnvelope) {
        if let ResponseEnvelope::Known(ResponseEvent::Completed { response }) = envelope
            && let Some(usage) = &response.usage
        {
            self.input_tokens = usage.input_tokens;
            self.output_tokens = usage.output_tokens;
        }
    }

    fn to_update(&self, fallback_model: &str) -> UsageUpdate {
        UsageUpdate {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| fallback_model.to_string()),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(payload: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn unicode_escape(bytes: &[u8]) -> String {
        // What a JSON decoder yields for `…`: one scalar per
        // original byte.
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    #[test]
    fn gzipped_details_decode_to_the_embedded_status() {
        let blob = gzip(r#"{"error":"overloaded","status":529}"#);
        let details = unicode_escape(&blob);
        let detail = ErrorDetail {
            kind: "error".to_string(),
            message: "stream error".to_string(),
            details: Some(details),
        };
        let decoded = decode_error_detail(&detail);
        assert_eq!(decoded.status, 529);
        assert!(decoded.message.contains("overloaded"));
    }

    #[test]
    fn plain_details_classify_by_keyword() {
        let detail = ErrorDetail {
            kind: "authentication_error".to_string(),
            message: "invalid api key".to_string(),
            details: None,
        };
        assert_eq!(decode_error_detail(&detail).status, 401);

        let detail = ErrorDetail {
            kind: "error".to_string(),
            message: "Rate limit exceeded".to_string(),
            details: None,
        };
        assert_eq!(decode_error_detail(&detail).status, 429);
    }

    #[test]
    fn embedded_error_event_surfaces_under_http_200() {
        let blob = gzip(r#"{"error":"overloaded","status":529}"#);
        let payload = serde_json::json!({
            "type": "error",
            "error": {
                "type": "overloaded_error",
                "message": "Overloaded",
                "details": unicode_escape(&blob),
            }
        });
        let mut rewriter = StreamRewriter::new(ClientFormat::ChatFromClaude, 0);
        let frame = format!("event: error\ndata: {payload}\n\n");
        let err = rewriter
            .push_chunk(&Bytes::from(frame))
            .expect_err("embedded error must interrupt the stream");
        assert_eq!(err.status, 529);
    }

    #[test]
    fn passthrough_frames_survive_byte_for_byte() {
        let mut rewriter = StreamRewriter::new(ClientFormat::ClaudePassthrough, 0);
        let frame = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n";
        let frames = rewriter.push_chunk(&Bytes::from(frame)).unwrap();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            ClientFrame::Bytes(bytes) => {
                assert_eq!(std::str::from_utf8(bytes).unwrap(), frame);
            }
            _ => panic!("expected raw bytes"),
        }
    }

    #[test]
    fn usage_tracks_message_start_and_final_delta() {
        let mut rewriter = StreamRewriter::new(ClientFormat::ChatFromClaude, 0);
        let start = r#"data: {"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4-20250514","role":"assistant","usage":{"input_tokens":100,"cache_read_input_tokens":40,"output_tokens":1}}}"#;
        let delta = r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":25}}"#;
        rewriter
            .push_chunk(&Bytes::from(format!("{start}\n\n{delta}\n\n")))
            .unwrap();
        let usage = rewriter.usage("fallback");
        assert_eq!(usage.model, "claude-sonnet-4-20250514");
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 25);
        assert_eq!(usage.cache_read_tokens, 40);
    }
}
