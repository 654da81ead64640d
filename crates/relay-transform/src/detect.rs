use serde_json::Value as JsonValue;

const OPENAI_SPECIFIC_PARAMS: &[&str] = &[
    "frequency_penalty",
    "presence_penalty",
    "logit_bias",
    "best_of",
    "n",
    "user",
];

const OPENAI_MODEL_PATTERNS: &[&str] = &["gpt-", "text-", "davinci", "curie", "babbage", "ada"];

/// Decide whether a request body is OpenAI Chat Completions rather than
/// Anthropic Messages. Anthropic-specific fields win ties: clients that
/// already speak the Messages dialect must never be re-translated.
pub fn is_openai_chat(body: &JsonValue) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    if !obj.contains_key("model") || !obj.contains_key("messages") {
        return false;
    }

    if has_anthropic_features(body) {
        return false;
    }

    if has_string_content(body) || has_openai_params(body) {
        return true;
    }

    let mut indicators = 0;
    if is_openai_model_name(obj.get("model").and_then(|m| m.as_str()).unwrap_or("")) {
        indicators += 1;
    }
    if obj.contains_key("temperature") || obj.contains_key("top_p") {
        indicators += 1;
    }
    indicators >= 2
}

fn has_string_content(body: &JsonValue) -> bool {
    body.get("messages")
        .and_then(|m| m.as_array())
        .map(|messages| {
            messages
                .iter()
                .any(|msg| msg.get("content").map(JsonValue::is_string).unwrap_or(false))
        })
        .unwrap_or(false)
}

fn has_openai_params(body: &JsonValue) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    OPENAI_SPECIFIC_PARAMS
        .iter()
        .any(|param| obj.contains_key(*param))
}

fn is_openai_model_name(model: &str) -> bool {
    let model = model.to_ascii_lowercase();
    OPENAI_MODEL_PATTERNS
        .iter()
        .any(|pattern| model.contains(pattern))
}

fn has_anthropic_features(body: &JsonValue) -> bool {
    let Some(obj) = body.as_object() else {
        return false;
    };
    if obj.contains_key("system") || obj.contains_key("anthropic_version") {
        return true;
    }
    obj.get("messages")
        .and_then(|m| m.as_array())
        .map(|messages| {
            messages.iter().any(|msg| {
                msg.get("content")
                    .and_then(|c| c.as_array())
                    .map(|blocks| {
                        blocks.iter().any(|block| {
                            matches!(
                                block.get("type").and_then(|t| t.as_str()),
                                Some("text") | Some("image")
                            )
                        })
                    })
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}
