use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use time::OffsetDateTime;
use time::macros::format_description;

const DEFAULT_MAX_BYTES: u64 = 3 * 1024 * 1024;

/// Append-only text log truncated from the head once it exceeds the size
/// cap, so the tail of recent activity always survives.
#[derive(Debug)]
pub struct RollingLog {
    path: PathBuf,
    max_bytes: u64,
    lock: Mutex<()>,
}

impl RollingLog {
    pub fn new(path: PathBuf) -> Self {
        Self::with_max_bytes(path, DEFAULT_MAX_BYTES)
    }

    pub fn with_max_bytes(path: PathBuf, max_bytes: u64) -> Self {
        Self {
            path,
            max_bytes,
            lock: Mutex::new(()),
        }
    }

    /// Best effort: logging must never fail a request.
    pub fn append(&self, line: &str) {
        let Ok(_guard) = self.lock.lock() else {
            return;
        };
        let stamped = match timestamp() {
            Some(ts) => format!("{ts} {line}\n"),
            None => format!("{line}\n"),
        };
        if let Some(dir) = self.path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        let write = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(stamped.as_bytes()));
        if write.is_err() {
            return;
        }
        self.truncate_head_if_needed();
    }

    fn truncate_head_if_needed(&self) {
        let Ok(meta) = fs::metadata(&self.path) else {
            return;
        };
        if meta.len() <= self.max_bytes {
            return;
        }
        let Ok(content) = fs::read(&self.path) else {
            return;
        };
        let keep_from = content.len().saturating_sub(self.max_bytes as usize);
        // Cut on a line boundary so the head of the kept tail is readable.
        let keep_from = content[keep_from..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| keep_from + pos + 1)
            .unwrap_or(keep_from);
        let _ = fs::write(&self.path, &content[keep_from..]);
    }
}

fn timestamp() -> Option<String> {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc().format(&fmt).ok()
}

/// The two diagnostic channels: one for request-side attempts, one for
/// response-side outcomes.
#[derive(Debug)]
pub struct FlowLogs {
    pub request: RollingLog,
    pub response: RollingLog,
}

impl FlowLogs {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            request: RollingLog::new(dir.join("request_flow.log")),
            response: RollingLog::new(dir.join("response_flow.log")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_truncation_keeps_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = RollingLog::with_max_bytes(dir.path().join("flow.log"), 256);
        for i in 0..64 {
            log.append(&format!("entry number {i}"));
        }
        let content = fs::read_to_string(dir.path().join("flow.log")).unwrap();
        assert!(content.len() <= 300);
        assert!(content.contains("entry number 63"));
        assert!(!content.contains("entry number 0\n"));
        // The kept head starts on a line boundary, i.e. with a timestamp.
        assert!(content.starts_with("20"));
    }
}
