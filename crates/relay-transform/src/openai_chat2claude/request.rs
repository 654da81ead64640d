use relay_protocol::claude::types::{
    CacheControl, ContentBlock, CreateMessageBody, Message, MessageContent, Metadata, SystemBlock,
    SystemField, ThinkingConfig,
};
use relay_protocol::openai::chat::{ChatCompletionRequest, ChatContent};

use crate::CLIENT_IDENTITY_PREAMBLE;

const DEFAULT_TARGET_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 32000;
const THINKING_BUDGET_TOKENS: u32 = 30000;

/// OpenAI model names and convenience aliases mapped onto Claude models. A
/// `-thinking` suffix selects the same model with thinking enabled.
const MODEL_MAPPING: &[(&str, &str)] = &[
    ("gpt-4", DEFAULT_TARGET_MODEL),
    ("gpt-4-turbo", DEFAULT_TARGET_MODEL),
    ("gpt-3.5-turbo", DEFAULT_TARGET_MODEL),
    ("claude-sonnet-4", DEFAULT_TARGET_MODEL),
    ("claude-sonnet-3.5", DEFAULT_TARGET_MODEL),
    ("claude-haiku", DEFAULT_TARGET_MODEL),
    ("claude-sonnet-4-20250514", DEFAULT_TARGET_MODEL),
    ("claude-sonnet-4-20250514-thinking", DEFAULT_TARGET_MODEL),
    ("claude-sonnet-4-5-20250929", "claude-sonnet-4-5-20250929"),
    ("claude-opus-4-1-20250805", "claude-opus-4-1-20250805"),
];

#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub body: CreateMessageBody,
    pub thinking: bool,
}

/// Build an Anthropic Messages request from an OpenAI Chat Completions one.
/// Parameters Claude rejects (`frequency_penalty`, `presence_penalty`,
/// `logit_bias`, `n`, `best_of`, `user`, `stop`) are dropped by construction;
/// passing them through triggers upstream 5xx.
pub fn convert_request(chat: &ChatCompletionRequest) -> TranslatedRequest {
    let thinking = chat.model.ends_with("-thinking");
    let model = map_model(&chat.model);

    let messages = convert_messages(&chat.messages);
    let system = build_system(extract_system_text(&chat.messages));

    let temperature = if thinking {
        // Upstream constraint: thinking requires temperature 1.
        1.0
    } else {
        chat.temperature.unwrap_or(1.0)
    };

    let body = CreateMessageBody {
        model,
        max_tokens: chat.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: Some(system),
        temperature: Some(temperature),
        top_p: None,
        // Streaming is forced on the wire; non-streaming clients are served
        // by collapsing the stream afterwards.
        stream: Some(true),
        stop_sequences: None,
        metadata: Some(Metadata {
            user_id: Some("user_openai_adapter_session".to_string()),
        }),
        thinking: thinking.then(|| ThinkingConfig::enabled(THINKING_BUDGET_TOKENS)),
        extra: Default::default(),
    };

    TranslatedRequest { body, thinking }
}

fn map_model(model: &str) -> String {
    MODEL_MAPPING
        .iter()
        .find(|(source, _)| *source == model)
        .map(|(_, target)| (*target).to_string())
        .unwrap_or_else(|| DEFAULT_TARGET_MODEL.to_string())
}

fn convert_messages(
    messages: &[relay_protocol::openai::chat::ChatMessage],
) -> Vec<Message> {
    messages
        .iter()
        .filter(|msg| msg.role != "system")
        .map(|msg| Message {
            role: msg.role.clone(),
            content: convert_content(msg.content.as_ref()),
        })
        .collect()
}

fn convert_content(content: Option<&ChatContent>) -> MessageContent {
    match content {
        Some(ChatContent::Text(text)) => {
            MessageContent::Blocks(vec![ContentBlock::text(text.clone())])
        }
        Some(ChatContent::Parts(parts)) => MessageContent::Blocks(
            parts
                .iter()
                .map(|part| {
                    let text = part
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| part.to_string());
                    ContentBlock::text(text)
                })
                .collect(),
        ),
        None => MessageContent::Blocks(vec![ContentBlock::text(String::new())]),
    }
}

fn extract_system_text(
    messages: &[relay_protocol::openai::chat::ChatMessage],
) -> Option<String> {
    messages
        .iter()
        .find(|msg| msg.role == "system")
        .and_then(|msg| msg.content.as_ref())
        .map(ChatContent::joined_text)
        .filter(|text| !text.is_empty())
}

fn build_system(client_system: Option<String>) -> SystemField {
    let combined = match client_system {
        Some(text) => format!("{CLIENT_IDENTITY_PREAMBLE}\n\n{text}"),
        None => CLIENT_IDENTITY_PREAMBLE.to_string(),
    };
    SystemField::Blocks(vec![SystemBlock {
        kind: "text".to_string(),
        text: combined,
        cache_control: Some(CacheControl::ephemeral()),
    }])
}
