use bytes::Bytes;
use http::StatusCode;

/// Terminal proxy-originated error: a status plus the exact body the client
/// will see. Upstream statuses are forwarded verbatim and never pass through
/// this type.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: error_envelope(message, "invalid_request_error", "invalid_request"),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: error_envelope(
                "invalid API key provided",
                "authentication_error",
                "invalid_api_key",
            ),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: error_envelope(message, "not_found_error", "unknown_path"),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            body: error_envelope(message, "upstream_error", "all_retries_exhausted"),
        }
    }
}

/// The JSON error envelope every proxy-originated error body uses.
pub fn error_envelope(
    message: impl Into<String>,
    error_type: &str,
    code: &str,
) -> Bytes {
    let body = serde_json::json!({
        "error": {
            "message": message.into(),
            "type": error_type,
            "code": code,
        }
    });
    Bytes::from(body.to_string())
}
