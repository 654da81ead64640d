use uuid::Uuid;

/// The header set the Claude CLI sends, reproduced field for field; the
/// mirror upstreams audit these and reject requests missing them.
pub fn claude_identity_headers(thinking: bool, stainless_timeout_secs: u64) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = vec![
        ("connection", "keep-alive".to_string()),
        ("accept", "application/json".to_string()),
        ("x-stainless-retry-count", "0".to_string()),
        ("x-stainless-timeout", stainless_timeout_secs.to_string()),
        ("x-stainless-lang", "js".to_string()),
        ("x-stainless-package-version", "0.55.1".to_string()),
        ("x-stainless-os", "Windows".to_string()),
        ("x-stainless-arch", "x64".to_string()),
        ("x-stainless-runtime", "node".to_string()),
        ("x-stainless-runtime-version", "v22.17.0".to_string()),
        (
            "anthropic-dangerous-direct-browser-access",
            "true".to_string(),
        ),
        ("anthropic-version", "2023-06-01".to_string()),
        ("x-app", "cli".to_string()),
        (
            "user-agent",
            "claude-cli/1.0.77 (external, cli)".to_string(),
        ),
        ("content-type", "application/json".to_string()),
        ("x-stainless-helper-method", "stream".to_string()),
        ("accept-language", "*".to_string()),
        ("sec-fetch-mode", "cors".to_string()),
        ("accept-encoding", "gzip, deflate".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let beta = if thinking {
        "claude-code-20250219,interleaved-thinking-2025-05-14,fine-grained-tool-streaming-2025-05-14"
    } else {
        "fine-grained-tool-streaming-2025-05-14"
    };
    headers.push(("anthropic-beta".to_string(), beta.to_string()));
    headers
}

/// The Codex CLI header set. `conversation_id` and `session_id` share one
/// fresh uuid; `originator` is a hard upstream requirement.
pub fn codex_headers(key: &str, base_url: &str) -> Vec<(String, String)> {
    let session_id = Uuid::new_v4().to_string();
    vec![
        ("authorization".to_string(), format!("Bearer {key}")),
        ("version".to_string(), "0.42.0".to_string()),
        (
            "openai-beta".to_string(),
            "responses=experimental".to_string(),
        ),
        ("conversation_id".to_string(), session_id.clone()),
        ("session_id".to_string(), session_id),
        ("accept".to_string(), "text/event-stream".to_string()),
        ("content-type".to_string(), "application/json".to_string()),
        (
            "user-agent".to_string(),
            "codex_cli_rs/0.42.0 (Windows 10.0.19045; x86_64) unknown".to_string(),
        ),
        ("originator".to_string(), "codex_cli_rs".to_string()),
        ("host".to_string(), host_of(base_url)),
    ]
}

fn host_of(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction_handles_paths_and_ports() {
        assert_eq!(host_of("https://api.example.com/openai"), "api.example.com");
        assert_eq!(host_of("http://10.0.0.1:3688/api"), "10.0.0.1:3688");
        assert_eq!(host_of("api.example.com"), "api.example.com");
    }

    #[test]
    fn thinking_mode_switches_beta_header() {
        let standard = claude_identity_headers(false, 60);
        let thinking = claude_identity_headers(true, 60);
        let beta = |set: &[(String, String)]| {
            set.iter()
                .find(|(k, _)| k == "anthropic-beta")
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        assert!(!beta(&standard).contains("interleaved-thinking"));
        assert!(beta(&thinking).contains("interleaved-thinking-2025-05-14"));
    }
}
