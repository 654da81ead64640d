use std::collections::HashMap;

use relay_protocol::claude::stream::{
    ContentBlockDelta, StreamContentBlock, StreamEnvelope, StreamEvent,
};
use relay_protocol::claude::types::ErrorDetail;
use relay_protocol::openai::chat::{ChatCompletionChunk, ChunkDelta};

/// One translated item headed for the client.
#[derive(Debug, Clone)]
pub enum ChatStreamItem {
    Chunk(ChatCompletionChunk),
    Done,
    Error(ErrorDetail),
}

/// Anthropic stream events rewritten as OpenAI chunks. Thinking blocks are
/// surfaced as ordinary content wrapped in `<think>…</think>`; the bracket
/// state is keyed by upstream message id so interleaved messages on one
/// connection cannot share it.
#[derive(Debug)]
pub struct ClaudeToChatStreamState {
    created: i64,
    model: String,
    current_message: String,
    in_thinking: HashMap<String, bool>,
}

impl ClaudeToChatStreamState {
    pub fn new(created: i64) -> Self {
        Self {
            created,
            model: "unknown".to_string(),
            current_message: "unknown".to_string(),
            in_thinking: HashMap::new(),
        }
    }

    pub fn transform_event(&mut self, envelope: StreamEnvelope) -> Vec<ChatStreamItem> {
        let event = match envelope {
            StreamEnvelope::Known(event) => event,
            StreamEnvelope::Unknown(_) => return Vec::new(),
        };

        match event {
            StreamEvent::MessageStart { message } => {
                self.current_message = message.id.clone();
                self.model = message.model.clone();
                self.in_thinking.insert(message.id, false);
                vec![ChatStreamItem::Chunk(self.chunk(
                    ChunkDelta {
                        role: Some("assistant".to_string()),
                        content: None,
                    },
                    None,
                ))]
            }
            StreamEvent::ContentBlockStart { content_block, .. } => {
                self.map_block_start(content_block)
            }
            StreamEvent::ContentBlockDelta { delta, .. } => self.map_block_delta(delta),
            StreamEvent::MessageDelta { .. } => Vec::new(),
            StreamEvent::MessageStop => {
                let mut out = Vec::new();
                if self.thinking() {
                    out.push(ChatStreamItem::Chunk(self.text_chunk("</think>")));
                }
                self.in_thinking.remove(&self.current_message);
                out.push(ChatStreamItem::Chunk(
                    self.chunk(ChunkDelta::default(), Some("stop".to_string())),
                ));
                out.push(ChatStreamItem::Done);
                out
            }
            StreamEvent::Error { error } => vec![ChatStreamItem::Error(error)],
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => Vec::new(),
        }
    }

    fn map_block_start(&mut self, block: StreamContentBlock) -> Vec<ChatStreamItem> {
        match block {
            StreamContentBlock::Thinking { thinking } => {
                self.set_thinking(true);
                let mut out = vec![ChatStreamItem::Chunk(self.text_chunk("<think>"))];
                if !thinking.is_empty() {
                    out.push(ChatStreamItem::Chunk(self.text_chunk(&thinking)));
                }
                out
            }
            StreamContentBlock::Text { text } => {
                let mut out = Vec::new();
                if self.thinking() {
                    out.push(ChatStreamItem::Chunk(self.text_chunk("</think>\n\n")));
                    self.set_thinking(false);
                }
                if !text.is_empty() {
                    out.push(ChatStreamItem::Chunk(self.text_chunk(&text)));
                }
                out
            }
            StreamContentBlock::RedactedThinking { .. } | StreamContentBlock::ToolUse { .. } => {
                Vec::new()
            }
        }
    }

    fn map_block_delta(&mut self, delta: ContentBlockDelta) -> Vec<ChatStreamItem> {
        match delta {
            ContentBlockDelta::TextDelta { text } if !text.is_empty() => {
                vec![ChatStreamItem::Chunk(self.text_chunk(&text))]
            }
            ContentBlockDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                vec![ChatStreamItem::Chunk(self.text_chunk(&thinking))]
            }
            _ => Vec::new(),
        }
    }

    fn thinking(&self) -> bool {
        self.in_thinking
            .get(&self.current_message)
            .copied()
            .unwrap_or(false)
    }

    fn set_thinking(&mut self, value: bool) {
        self.in_thinking.insert(self.current_message.clone(), value);
    }

    fn text_chunk(&self, text: &str) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: None,
                content: Some(text.to_string()),
            },
            None,
        )
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk::new(
            format!("chatcmpl-{}", self.current_message),
            self.created,
            self.model.clone(),
        )
        .with_delta(delta, finish_reason)
    }
}
