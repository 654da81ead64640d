/// Which dialect the client spoke, decided from the path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDialect {
    /// Anthropic Messages (`…/v1/messages` anywhere in the path).
    Messages,
    /// OpenAI Chat Completions (`…/v1/chat/completions`).
    Chat,
    /// OpenAI Responses; the leading `openai/` segment is stripped because
    /// the responses-pool base URLs already encode it.
    Responses,
}

#[derive(Debug, Clone)]
pub struct InboundPath {
    pub dialect: InboundDialect,
    /// Path appended to the selected entry's base URL.
    pub upstream_path: String,
}

/// Normalize an arbitrary inbound path. Clients arrive with all kinds of
/// prefixes (`/api/v1/messages`, `/claude/v1/chat/completions`), so the
/// markers are searched rather than matched exactly.
pub fn classify_path(path: &str) -> Option<InboundPath> {
    let trimmed = path.trim_start_matches('/');

    if let Some(rest) = trimmed.strip_prefix("openai/") {
        return Some(InboundPath {
            dialect: InboundDialect::Responses,
            upstream_path: format!("/{rest}"),
        });
    }
    if trimmed == "openai" {
        return Some(InboundPath {
            dialect: InboundDialect::Responses,
            upstream_path: "/responses".to_string(),
        });
    }

    if trimmed.contains("v1/chat/completions") {
        return Some(InboundPath {
            dialect: InboundDialect::Chat,
            upstream_path: "/v1/messages".to_string(),
        });
    }

    if trimmed.contains("v1/messages") {
        return Some(InboundPath {
            dialect: InboundDialect::Messages,
            upstream_path: "/v1/messages".to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_endpoints_from_arbitrary_prefixes() {
        let p = classify_path("/api/v1/messages").unwrap();
        assert_eq!(p.dialect, InboundDialect::Messages);
        assert_eq!(p.upstream_path, "/v1/messages");

        let p = classify_path("/claude/v1/chat/completions").unwrap();
        assert_eq!(p.dialect, InboundDialect::Chat);
        assert_eq!(p.upstream_path, "/v1/messages");
    }

    #[test]
    fn openai_prefix_routes_to_responses_and_is_stripped() {
        let p = classify_path("/openai/responses").unwrap();
        assert_eq!(p.dialect, InboundDialect::Responses);
        assert_eq!(p.upstream_path, "/responses");
    }

    #[test]
    fn unknown_paths_are_rejected() {
        assert!(classify_path("/v2/other").is_none());
        assert!(classify_path("/").is_none());
    }
}
