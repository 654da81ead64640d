use relay_protocol::claude::types::ErrorDetail;
use relay_protocol::openai::chat::{ChatCompletionChunk, ChunkDelta};
use relay_protocol::openai::responses::{ResponseEnvelope, ResponseEvent, ResponsesUsage};

use crate::claude2openai_chat::stream::ChatStreamItem;

const CODEX_MODEL: &str = "gpt-5-codex";

/// Responses stream events rewritten as OpenAI chat chunks. Only the events
/// a Chat Completions client can represent are forwarded; the rest drop.
#[derive(Debug)]
pub struct CodexToChatStreamState {
    id: String,
    created: i64,
    finish_emitted: bool,
    usage: Option<ResponsesUsage>,
}

impl CodexToChatStreamState {
    pub fn new(created: i64) -> Self {
        Self {
            id: format!("chatcmpl-{created}"),
            created,
            finish_emitted: false,
            usage: None,
        }
    }

    pub fn usage(&self) -> Option<&ResponsesUsage> {
        self.usage.as_ref()
    }

    pub fn transform_event(&mut self, envelope: ResponseEnvelope) -> Vec<ChatStreamItem> {
        let event = match envelope {
            ResponseEnvelope::Known(event) => event,
            ResponseEnvelope::Unknown(_) => return Vec::new(),
        };

        match event {
            ResponseEvent::Created { .. } => vec![ChatStreamItem::Chunk(self.chunk(
                ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: None,
                },
                None,
            ))],
            ResponseEvent::OutputTextDelta { delta } if !delta.is_empty() => {
                vec![ChatStreamItem::Chunk(self.chunk(
                    ChunkDelta {
                        role: None,
                        content: Some(delta),
                    },
                    None,
                ))]
            }
            ResponseEvent::Completed { response } => {
                self.usage = response.usage;
                self.finish()
            }
            ResponseEvent::Done => self.finish(),
            ResponseEvent::Failed { response } => vec![ChatStreamItem::Error(ErrorDetail {
                kind: "upstream_error".to_string(),
                message: response.to_string(),
                details: None,
            })],
            ResponseEvent::OutputTextDelta { .. } | ResponseEvent::OutputTextDone { .. } => {
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<ChatStreamItem> {
        if self.finish_emitted {
            return vec![ChatStreamItem::Done];
        }
        self.finish_emitted = true;
        vec![
            ChatStreamItem::Chunk(self.chunk(ChunkDelta::default(), Some("stop".to_string()))),
            ChatStreamItem::Done,
        ]
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk::new(self.id.clone(), self.created, CODEX_MODEL)
            .with_delta(delta, finish_reason)
    }
}
