use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::claude::types::JsonObject;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl InputContent {
    pub fn input_text(text: impl Into<String>) -> Self {
        Self {
            kind: "input_text".to_string(),
            text: text.into(),
        }
    }

    pub fn output_text(text: impl Into<String>) -> Self {
        Self {
            kind: "output_text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<InputContent>,
}

impl InputItem {
    pub fn message(role: impl Into<String>, content: Vec<InputContent>) -> Self {
        Self {
            kind: "message".to_string(),
            role: role.into(),
            content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
    pub strict: bool,
}

/// The Responses ("Codex") request body. The upstream audits this shape:
/// requests missing the instructions string or the tool table are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub instructions: String,
    pub input: Vec<InputItem>,
    pub tools: Vec<FunctionTool>,
    pub tool_choice: String,
    pub parallel_tool_calls: bool,
    pub stream: bool,
    pub store: bool,
    pub include: Vec<String>,
    pub prompt_cache_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsesUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedResponse {
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
    #[serde(flatten)]
    pub extra: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseEvent {
    #[serde(rename = "response.created")]
    Created {
        #[serde(default)]
        response: JsonValue,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "response.completed")]
    Completed {
        #[serde(default)]
        response: CompletedResponse,
    },
    #[serde(rename = "response.done")]
    Done,
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: JsonValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Known(ResponseEvent),
    Unknown(JsonValue),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_output_text_delta() {
        let event: ResponseEnvelope =
            serde_json::from_str(r#"{"type":"response.output_text.delta","delta":"hi"}"#).unwrap();
        assert!(matches!(
            event,
            ResponseEnvelope::Known(ResponseEvent::OutputTextDelta { ref delta }) if delta == "hi"
        ));
    }

    #[test]
    fn decodes_completed_usage() {
        let event: ResponseEnvelope = serde_json::from_str(
            r#"{"type":"response.completed","response":{"usage":{"input_tokens":10,"output_tokens":3,"total_tokens":13}}}"#,
        )
        .unwrap();
        match event {
            ResponseEnvelope::Known(ResponseEvent::Completed { response }) => {
                let usage = response.usage.unwrap();
                assert_eq!(usage.total_tokens, 13);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
