use relay_protocol::claude::types::{
    CacheControl, ContentBlock, CreateMessageBody, MessageContent, SystemBlock, SystemField,
};

use crate::CLIENT_IDENTITY_PREAMBLE;

/// Anthropic accepts four cache markers per request; three is the value that
/// holds up empirically across the mirror upstreams.
pub const CACHE_CONTROL_CAP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    SimpleRename,
    FullFormat,
}

#[derive(Debug, Clone)]
pub struct ModelRule {
    pub source_model: String,
    pub target_model: String,
    pub kind: ConversionKind,
}

/// Apply the first matching model-conversion rule in configuration order.
pub fn apply_model_rules(body: &mut CreateMessageBody, rules: &[ModelRule]) {
    let Some(rule) = rules.iter().find(|rule| rule.source_model == body.model) else {
        return;
    };
    body.model = rule.target_model.clone();
    if rule.kind == ConversionKind::FullFormat {
        rewrite_to_full_format(body);
    }
}

/// `full_format` upgrades a bare-string request to the block shape and
/// injects the client-identity preamble with an ephemeral cache marker.
fn rewrite_to_full_format(body: &mut CreateMessageBody) {
    for message in &mut body.messages {
        if let MessageContent::Text(text) = &message.content {
            message.content = MessageContent::Blocks(vec![ContentBlock::text(text.clone())]);
        }
    }

    let mut blocks = vec![SystemBlock {
        kind: "text".to_string(),
        text: CLIENT_IDENTITY_PREAMBLE.to_string(),
        cache_control: Some(CacheControl::ephemeral()),
    }];
    match body.system.take() {
        Some(SystemField::Text(text)) => blocks.push(SystemBlock {
            kind: "text".to_string(),
            text,
            cache_control: None,
        }),
        Some(SystemField::Blocks(existing)) => blocks.extend(existing),
        None => {}
    }
    body.system = Some(SystemField::Blocks(blocks));
}

/// Strip cache markers beyond the cap, counting across `system` and message
/// content in document order.
pub fn enforce_cache_control_cap(body: &mut CreateMessageBody, cap: usize) -> usize {
    let mut kept = 0;

    if let Some(SystemField::Blocks(blocks)) = &mut body.system {
        for block in blocks {
            strip_over_cap(&mut block.cache_control, &mut kept, cap);
        }
    }

    for message in &mut body.messages {
        if let MessageContent::Blocks(blocks) = &mut message.content {
            for block in blocks {
                strip_over_cap(&mut block.cache_control, &mut kept, cap);
            }
        }
    }

    kept
}

fn strip_over_cap(slot: &mut Option<CacheControl>, kept: &mut usize, cap: usize) {
    if slot.is_none() {
        return;
    }
    if *kept < cap {
        *kept += 1;
    } else {
        *slot = None;
    }
}
