use relay_protocol::openai::chat::{
    AssistantMessage, ChatChoice, ChatCompletion, ChatCompletionChunk, ChatUsage,
};

/// Accumulates streamed chunks into a single `chat.completion` response for
/// clients that asked for `stream=false` while the upstream call always
/// streams.
#[derive(Debug, Default)]
pub struct ChatCollapse {
    id: String,
    created: i64,
    model: String,
    content: String,
    finish_reason: Option<String>,
    usage: ChatUsage,
}

impl ChatCollapse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &ChatCompletionChunk) {
        if self.id.is_empty() {
            self.id = chunk.id.clone();
            self.created = chunk.created;
            self.model = chunk.model.clone();
        }
        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content {
                self.content.push_str(text);
            }
            if let Some(reason) = &choice.finish_reason {
                self.finish_reason = Some(reason.clone());
            }
        }
    }

    pub fn set_usage(&mut self, usage: ChatUsage) {
        self.usage = usage;
    }

    pub fn finish(self) -> ChatCompletion {
        ChatCompletion {
            id: self.id,
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model,
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: self.content,
                },
                finish_reason: self.finish_reason.unwrap_or_else(|| "stop".to_string()),
            }],
            usage: self.usage,
        }
    }
}
