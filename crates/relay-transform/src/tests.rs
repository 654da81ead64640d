use relay_protocol::claude::stream::{
    ContentBlockDelta, MessageDeltaBody, StreamContentBlock, StreamEnvelope, StreamEvent,
    StreamMessage,
};
use relay_protocol::claude::types::{
    CacheControl, ContentBlock, CreateMessageBody, Message, MessageContent, SystemBlock,
    SystemField, Usage,
};
use relay_protocol::openai::chat::ChatCompletionRequest;

use crate::claude2openai_chat::stream::{ChatStreamItem, ClaudeToChatStreamState};
use crate::codex2openai_chat::stream::CodexToChatStreamState;
use crate::openai_chat2claude::request::convert_request;
use crate::rules::{
    ConversionKind, ModelRule, apply_model_rules, enforce_cache_control_cap, CACHE_CONTROL_CAP,
};
use crate::stream2nostream::ChatCollapse;
use crate::{CLIENT_IDENTITY_PREAMBLE, detect};

fn chat_request(json: serde_json::Value) -> ChatCompletionRequest {
    serde_json::from_value(json).unwrap()
}

#[test]
fn detects_openai_by_string_content() {
    let body = serde_json::json!({
        "model": "claude-sonnet-4-20250514",
        "messages": [{"role": "user", "content": "hello"}]
    });
    assert!(detect::is_openai_chat(&body));
}

#[test]
fn detects_openai_by_specific_params() {
    let body = serde_json::json!({
        "model": "whatever",
        "messages": [{"role": "user", "content": [{"type": "blob"}]}],
        "frequency_penalty": 0
    });
    assert!(detect::is_openai_chat(&body));
}

#[test]
fn anthropic_features_win_over_openai_signals() {
    let body = serde_json::json!({
        "model": "gpt-4",
        "system": "be helpful",
        "messages": [{"role": "user", "content": "hello"}]
    });
    assert!(!detect::is_openai_chat(&body));

    let blocks = serde_json::json!({
        "model": "claude-sonnet-4-20250514",
        "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
        "max_tokens": 100
    });
    assert!(!detect::is_openai_chat(&blocks));
}

#[test]
fn converted_request_strips_rejected_params_and_forces_stream() {
    let chat = chat_request(serde_json::json!({
        "model": "gpt-4",
        "messages": [
            {"role": "system", "content": "answer briefly"},
            {"role": "user", "content": "hi"}
        ],
        "temperature": 0.3,
        "frequency_penalty": 0,
        "presence_penalty": 0,
        "n": 1,
        "user": "abc"
    }));
    let translated = convert_request(&chat);
    assert!(!translated.thinking);

    let body = &translated.body;
    assert_eq!(body.model, "claude-sonnet-4-20250514");
    assert_eq!(body.max_tokens, 32000);
    assert_eq!(body.stream, Some(true));
    assert_eq!(body.temperature, Some(0.3));
    assert_eq!(body.messages.len(), 1);

    let json = serde_json::to_value(body).unwrap();
    for forbidden in ["frequency_penalty", "presence_penalty", "n", "best_of", "user", "stop"] {
        assert!(json.get(forbidden).is_none(), "{forbidden} must not survive");
    }

    match body.system.as_ref().unwrap() {
        SystemField::Blocks(blocks) => {
            assert_eq!(blocks.len(), 1);
            assert!(blocks[0].text.starts_with(CLIENT_IDENTITY_PREAMBLE));
            assert!(blocks[0].text.ends_with("answer briefly"));
            assert!(blocks[0].cache_control.is_some());
        }
        other => panic!("unexpected system field: {other:?}"),
    }
}

#[test]
fn thinking_suffix_enables_thinking_and_pins_temperature() {
    let chat = chat_request(serde_json::json!({
        "model": "claude-sonnet-4-20250514-thinking",
        "messages": [{"role": "user", "content": "think hard"}],
        "temperature": 0.2,
        "max_tokens": 512
    }));
    let translated = convert_request(&chat);
    assert!(translated.thinking);
    assert_eq!(translated.body.model, "claude-sonnet-4-20250514");
    assert_eq!(translated.body.temperature, Some(1.0));
    assert_eq!(translated.body.max_tokens, 512);
    let thinking = translated.body.thinking.as_ref().unwrap();
    assert_eq!(thinking.budget_tokens, 30000);
}

fn content_of(items: &[ChatStreamItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            ChatStreamItem::Chunk(chunk) => chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn thinking_stream_is_bracketed_exactly_once() {
    let mut state = ClaudeToChatStreamState::new(1_700_000_000);
    let mut items = Vec::new();

    let events = vec![
        StreamEvent::MessageStart {
            message: StreamMessage {
                id: "msg_1".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                role: "assistant".to_string(),
                usage: Usage::default(),
            },
        },
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: StreamContentBlock::Thinking {
                thinking: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::ThinkingDelta {
                thinking: "let me think".to_string(),
            },
        },
        StreamEvent::ContentBlockStop { index: 0 },
        StreamEvent::ContentBlockStart {
            index: 1,
            content_block: StreamContentBlock::Text {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 1,
            delta: ContentBlockDelta::TextDelta {
                text: "the answer".to_string(),
            },
        },
        StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some("end_turn".to_string()),
                stop_sequence: None,
            },
            usage: Some(Usage {
                output_tokens: Some(12),
                ..Usage::default()
            }),
        },
        StreamEvent::MessageStop,
    ];

    for event in events {
        items.extend(state.transform_event(StreamEnvelope::Known(event)));
    }

    let text = content_of(&items);
    assert_eq!(text, "<think>let me think</think>\n\nthe answer");
    assert_eq!(text.matches("<think>").count(), 1);
    assert_eq!(text.matches("</think>").count(), 1);

    let finish: Vec<_> = items
        .iter()
        .filter_map(|item| match item {
            ChatStreamItem::Chunk(chunk) => chunk
                .choices
                .first()
                .and_then(|choice| choice.finish_reason.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finish, vec!["stop".to_string()]);
    assert!(matches!(items.last(), Some(ChatStreamItem::Done)));
}

#[test]
fn message_stop_inside_thinking_closes_the_bracket() {
    let mut state = ClaudeToChatStreamState::new(0);
    let mut items = Vec::new();
    for event in [
        StreamEvent::MessageStart {
            message: StreamMessage {
                id: "msg_2".to_string(),
                model: "m".to_string(),
                role: "assistant".to_string(),
                usage: Usage::default(),
            },
        },
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: StreamContentBlock::Thinking {
                thinking: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::ThinkingDelta {
                thinking: "unfinished".to_string(),
            },
        },
        StreamEvent::MessageStop,
    ] {
        items.extend(state.transform_event(StreamEnvelope::Known(event)));
    }
    assert_eq!(content_of(&items), "<think>unfinished</think>");
}

#[test]
fn cache_control_cap_keeps_first_three_markers() {
    let marked = |text: &str| ContentBlock {
        cache_control: Some(CacheControl::ephemeral()),
        ..ContentBlock::text(text)
    };
    let mut body = CreateMessageBody {
        model: "m".to_string(),
        max_tokens: 10,
        messages: vec![
            Message {
                role: "user".to_string(),
                content: MessageContent::Blocks(vec![marked("a"), marked("b")]),
            },
            Message {
                role: "user".to_string(),
                content: MessageContent::Blocks(vec![marked("c")]),
            },
        ],
        system: Some(SystemField::Blocks(vec![
            SystemBlock {
                kind: "text".to_string(),
                text: "s1".to_string(),
                cache_control: Some(CacheControl::ephemeral()),
            },
            SystemBlock {
                kind: "text".to_string(),
                text: "s2".to_string(),
                cache_control: Some(CacheControl::ephemeral()),
            },
        ])),
        temperature: None,
        top_p: None,
        stream: None,
        stop_sequences: None,
        metadata: None,
        thinking: None,
        extra: Default::default(),
    };

    let kept = enforce_cache_control_cap(&mut body, CACHE_CONTROL_CAP);
    assert_eq!(kept, 3);

    // Document order: both system markers survive, then the first message
    // marker; the rest are stripped.
    let system_markers = match body.system.as_ref().unwrap() {
        SystemField::Blocks(blocks) => blocks
            .iter()
            .filter(|b| b.cache_control.is_some())
            .count(),
        _ => 0,
    };
    assert_eq!(system_markers, 2);

    let message_markers: Vec<bool> = body
        .messages
        .iter()
        .flat_map(|msg| match &msg.content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.cache_control.is_some())
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        })
        .collect();
    assert_eq!(message_markers, vec![true, false, false]);
}

#[test]
fn full_format_rule_rewrites_content_and_injects_preamble() {
    let mut body = CreateMessageBody {
        model: "claude-3-5-haiku-20241022".to_string(),
        max_tokens: 100,
        messages: vec![Message {
            role: "user".to_string(),
            content: MessageContent::Text("plain".to_string()),
        }],
        system: Some(SystemField::Text("existing".to_string())),
        temperature: None,
        top_p: None,
        stream: None,
        stop_sequences: None,
        metadata: None,
        thinking: None,
        extra: Default::default(),
    };
    let rules = vec![ModelRule {
        source_model: "claude-3-5-haiku-20241022".to_string(),
        target_model: "claude-sonnet-4-5-20250929".to_string(),
        kind: ConversionKind::FullFormat,
    }];

    apply_model_rules(&mut body, &rules);

    assert_eq!(body.model, "claude-sonnet-4-5-20250929");
    assert!(matches!(
        body.messages[0].content,
        MessageContent::Blocks(ref blocks) if blocks.len() == 1
    ));
    match body.system.as_ref().unwrap() {
        SystemField::Blocks(blocks) => {
            assert_eq!(blocks[0].text, CLIENT_IDENTITY_PREAMBLE);
            assert!(blocks[0].cache_control.is_some());
            assert_eq!(blocks[1].text, "existing");
        }
        other => panic!("unexpected system field: {other:?}"),
    }
}

#[test]
fn simple_rename_rule_only_touches_the_model() {
    let mut body = CreateMessageBody {
        model: "claude-sonnet-4-20250514".to_string(),
        max_tokens: 100,
        messages: vec![Message {
            role: "user".to_string(),
            content: MessageContent::Text("plain".to_string()),
        }],
        system: None,
        temperature: None,
        top_p: None,
        stream: None,
        stop_sequences: None,
        metadata: None,
        thinking: None,
        extra: Default::default(),
    };
    let rules = vec![ModelRule {
        source_model: "claude-sonnet-4-20250514".to_string(),
        target_model: "claude-sonnet-4-5-20250929".to_string(),
        kind: ConversionKind::SimpleRename,
    }];

    apply_model_rules(&mut body, &rules);

    assert_eq!(body.model, "claude-sonnet-4-5-20250929");
    assert!(matches!(body.messages[0].content, MessageContent::Text(_)));
    assert!(body.system.is_none());
}

#[test]
fn collapse_joins_text_deltas_into_one_completion() {
    let mut state = ClaudeToChatStreamState::new(1);
    let mut collapse = ChatCollapse::new();

    let events = vec![
        StreamEvent::MessageStart {
            message: StreamMessage {
                id: "msg_3".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                role: "assistant".to_string(),
                usage: Usage::default(),
            },
        },
        StreamEvent::ContentBlockStart {
            index: 0,
            content_block: StreamContentBlock::Text {
                text: String::new(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::TextDelta {
                text: "foo".to_string(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::TextDelta {
                text: " ".to_string(),
            },
        },
        StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::TextDelta {
                text: "bar".to_string(),
            },
        },
        StreamEvent::MessageStop,
    ];
    for event in events {
        for item in state.transform_event(StreamEnvelope::Known(event)) {
            if let ChatStreamItem::Chunk(chunk) = item {
                collapse.push_chunk(&chunk);
            }
        }
    }

    let completion = collapse.finish();
    assert_eq!(completion.object, "chat.completion");
    assert_eq!(completion.choices[0].message.content, "foo bar");
    assert_eq!(completion.choices[0].finish_reason, "stop");
}

#[test]
fn codex_request_carries_instructions_tools_and_environment() {
    let chat = chat_request(serde_json::json!({
        "model": "gpt-4",
        "messages": [
            {"role": "system", "content": "ignored"},
            {"role": "user", "content": "run the tests"},
            {"role": "assistant", "content": "running"}
        ]
    }));
    let req = crate::openai_chat2codex::request::convert_request(&chat);

    assert_eq!(req.model, "gpt-5-codex");
    assert!(req.instructions.starts_with("You are Codex, based on GPT-5."));
    assert_eq!(req.tools.len(), 3);
    assert_eq!(req.tools[0].name, "shell");
    assert!(req.stream);
    assert!(!req.store);
    assert!(!req.prompt_cache_key.is_empty());

    // First input turn is the synthetic environment context.
    assert_eq!(req.input[0].role, "user");
    assert!(req.input[0].content[0].text.starts_with("<environment_context>"));
    // System text never becomes an input turn.
    assert_eq!(req.input.len(), 3);
    assert_eq!(req.input[1].content[0].kind, "input_text");
    assert_eq!(req.input[2].content[0].kind, "output_text");
}

#[test]
fn codex_stream_translates_to_chat_chunks() {
    use relay_protocol::openai::responses::{ResponseEnvelope, ResponseEvent};

    let mut state = CodexToChatStreamState::new(7);
    let mut items = Vec::new();
    for event in [
        ResponseEvent::Created {
            response: serde_json::Value::Null,
        },
        ResponseEvent::OutputTextDelta {
            delta: "hello".to_string(),
        },
        ResponseEvent::Completed {
            response: serde_json::from_value(serde_json::json!({
                "usage": {"input_tokens": 5, "output_tokens": 2, "total_tokens": 7}
            }))
            .unwrap(),
        },
    ] {
        items.extend(state.transform_event(ResponseEnvelope::Known(event)));
    }

    assert_eq!(content_of(&items), "hello");
    assert!(matches!(items.last(), Some(ChatStreamItem::Done)));
    assert_eq!(state.usage().unwrap().total_tokens, 7);
}
