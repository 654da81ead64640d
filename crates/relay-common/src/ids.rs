use uuid::Uuid;

/// Trace ids are time-ordered so request logs interleave readably.
pub fn new_trace_id() -> String {
    Uuid::now_v7().to_string()
}
