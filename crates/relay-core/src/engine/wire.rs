use bytes::Bytes;
use uuid::Uuid;

/// Join a configured base URL with the normalized upstream path.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn bearer_auth(key: &str) -> (String, String) {
    ("authorization".to_string(), format!("Bearer {key}"))
}

/// Headers injected on retry attempts so no intermediary replays the
/// previous attempt's cached failure.
pub fn retry_defeat_headers(attempt: u32) -> Vec<(String, String)> {
    vec![
        ("connection".to_string(), "close".to_string()),
        ("x-request-id".to_string(), Uuid::new_v4().to_string()),
        (
            "cache-control".to_string(),
            "no-cache, no-store, must-revalidate".to_string(),
        ),
        ("x-retry-count".to_string(), attempt.to_string()),
    ]
}

/// Replace-or-append: retry headers must win over the base set.
pub fn merge_headers(
    base: &[(String, String)],
    overrides: Vec<(String, String)>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = base.to_vec();
    for (name, value) in overrides {
        match merged
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, slot)) => *slot = value,
            None => merged.push((name, value)),
        }
    }
    merged
}

/// Retries mutate headers, so the length must be restated per attempt.
pub fn set_content_length(headers: &mut Vec<(String, String)>, body: &Bytes) {
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case("content-length"));
    headers.push(("content-length".to_string(), body.len().to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://up.example/", "/v1/messages"),
            "https://up.example/v1/messages"
        );
        assert_eq!(
            join_url("https://up.example/code", "v1/messages"),
            "https://up.example/code/v1/messages"
        );
    }

    #[test]
    fn merge_headers_overrides_case_insensitively() {
        let base = vec![("Connection".to_string(), "keep-alive".to_string())];
        let merged = merge_headers(&base, vec![("connection".to_string(), "close".to_string())]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].1, "close");
    }

    #[test]
    fn content_length_is_replaced_not_duplicated() {
        let mut headers = vec![("content-length".to_string(), "1".to_string())];
        set_content_length(&mut headers, &Bytes::from_static(b"hello"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].1, "5");
    }
}
