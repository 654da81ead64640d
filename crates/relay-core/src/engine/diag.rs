use tracing::{error, warn};

use relay_storage::FlowLogs;

pub fn debug_enabled() -> bool {
    std::env::var("PROXY_DEBUG").map(|v| v == "1").unwrap_or(false)
}

/// Per-request diagnostic accumulator. Individual failures are surfaced
/// immediately so operators see progress; the full trail is replayed in one
/// block only when the request finally fails.
#[derive(Debug)]
pub struct DiagBuffer {
    trace_id: String,
    entries: Vec<String>,
}

impl DiagBuffer {
    pub fn new(trace_id: &str) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, flow: &FlowLogs, message: String) {
        warn!(trace_id = %self.trace_id, "{message}");
        if debug_enabled() {
            eprintln!("[{}] {message}", self.trace_id);
        }
        flow.request.append(&format!("[{}] {message}", self.trace_id));
        self.entries.push(message);
    }

    /// Permanent failure: replay everything that went wrong at once.
    pub fn flush_failure(&self, flow: &FlowLogs) {
        if self.entries.is_empty() {
            return;
        }
        let combined = self.entries.join(" | ");
        error!(
            trace_id = %self.trace_id,
            attempts = self.entries.len(),
            "request failed after all retries: {combined}"
        );
        flow.response
            .append(&format!("[{}] FAILED: {combined}", self.trace_id));
    }
}
