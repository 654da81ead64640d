use relay_protocol::openai::chat::{ChatCompletionRequest, ChatContent};
use relay_protocol::openai::responses::{
    FunctionTool, InputContent, InputItem, ResponsesRequest,
};
use uuid::Uuid;

use super::instructions::CODEX_INSTRUCTIONS;

const CODEX_MODEL: &str = "gpt-5-codex";

/// Build an OpenAI Responses request from a Chat Completions one. The
/// upstream validates the instructions string, the tool table and the
/// environment-context turn, so all three are always attached.
pub fn convert_request(chat: &ChatCompletionRequest) -> ResponsesRequest {
    let mut input = vec![InputItem::message(
        "user",
        vec![InputContent::input_text(environment_context())],
    )];

    for msg in &chat.messages {
        let text = msg
            .content
            .as_ref()
            .map(ChatContent::joined_text)
            .unwrap_or_default();
        match msg.role.as_str() {
            // System text is already covered by the instructions string.
            "system" => continue,
            "assistant" => input.push(InputItem::message(
                "assistant",
                vec![InputContent::output_text(text)],
            )),
            _ => input.push(InputItem::message(
                "user",
                vec![InputContent::input_text(text)],
            )),
        }
    }

    ResponsesRequest {
        model: CODEX_MODEL.to_string(),
        instructions: CODEX_INSTRUCTIONS.to_string(),
        input,
        tools: tool_table(),
        tool_choice: "auto".to_string(),
        parallel_tool_calls: false,
        stream: true,
        store: false,
        include: vec!["reasoning.encrypted_content".to_string()],
        prompt_cache_key: Uuid::new_v4().to_string(),
    }
}

fn environment_context() -> String {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".to_string());
    let shell = if cfg!(windows) { "powershell.exe" } else { "bash" };
    format!(
        "<environment_context>\n  <cwd>{cwd}</cwd>\n  <approval_policy>on-request</approval_policy>\n  <sandbox_mode>workspace-write</sandbox_mode>\n  <network_access>enabled</network_access>\n  <shell>{shell}</shell>\n</environment_context>"
    )
}

fn tool_table() -> Vec<FunctionTool> {
    vec![
        FunctionTool {
            kind: "function".to_string(),
            name: "shell".to_string(),
            description: "Runs a shell command and returns its output.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The command to execute"
                    },
                    "justification": {
                        "type": "string",
                        "description": "Only set if with_escalated_permissions is true."
                    },
                    "timeout_ms": {
                        "type": "number",
                        "description": "The timeout for the command in milliseconds"
                    },
                    "with_escalated_permissions": {
                        "type": "boolean",
                        "description": "Whether to request escalated permissions"
                    },
                    "workdir": {
                        "type": "string",
                        "description": "The working directory to execute the command in"
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
            strict: false,
        },
        FunctionTool {
            kind: "function".to_string(),
            name: "update_plan".to_string(),
            description: "Updates the task plan.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "explanation": {"type": "string"},
                    "plan": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "status": {
                                    "type": "string",
                                    "description": "One of: pending, in_progress, completed"
                                },
                                "step": {"type": "string"}
                            },
                            "required": ["step", "status"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["plan"],
                "additionalProperties": false
            }),
            strict: false,
        },
        FunctionTool {
            kind: "function".to_string(),
            name: "view_image".to_string(),
            description: "Attach a local image to the conversation context.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Local filesystem path to an image file"
                    }
                },
                "required": ["path"],
                "additionalProperties": false
            }),
            strict: false,
        },
    ]
}
