use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use relay_common::UpstreamEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Normal,
    Warning,
}

/// Runtime state of one pool entry. Lives here and nowhere else; the
/// configuration snapshot stays immutable.
#[derive(Debug, Clone)]
pub struct EntryState {
    pub error_count: u32,
    pub cooldown_until: Option<OffsetDateTime>,
    pub status: EntryStatus,
}

impl Default for EntryState {
    fn default() -> Self {
        Self {
            error_count: 0,
            cooldown_until: None,
            status: EntryStatus::Normal,
        }
    }
}

impl EntryState {
    pub fn clear(&mut self) {
        self.error_count = 0;
        self.cooldown_until = None;
        self.status = EntryStatus::Normal;
    }
}

/// Tunables the selector and error recorder need; derived from the
/// configuration snapshot per request.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub error_threshold: u32,
    pub cooldown: Duration,
    pub primary_check_interval: Duration,
}

/// One dialect's ordered, tiered upstream collection plus its rotation
/// state. Guarded by a single mutex; never held across I/O.
#[derive(Debug)]
pub struct Pool {
    pub label: &'static str,
    pub entries: Vec<UpstreamEntry>,
    pub states: Vec<EntryState>,
    pub active_index: Option<usize>,
    pub using_backup: bool,
    pub backup_started_at: Option<OffsetDateTime>,
    pub last_primary_check_at: Option<OffsetDateTime>,
}

pub type PoolHandle = Arc<Mutex<Pool>>;

impl Pool {
    pub fn new(label: &'static str, entries: Vec<UpstreamEntry>) -> Self {
        let states = entries.iter().map(|_| EntryState::default()).collect();
        let active_index = if entries.is_empty() { None } else { Some(0) };
        Self {
            label,
            entries,
            states,
            active_index,
            using_backup: false,
            backup_started_at: None,
            last_primary_check_at: None,
        }
    }

    pub fn handle(label: &'static str, entries: Vec<UpstreamEntry>) -> PoolHandle {
        Arc::new(Mutex::new(Self::new(label, entries)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Swap in a fresh configuration snapshot. Runtime counters reset; the
    /// next selection recomputes the cursor from scratch.
    pub fn replace_entries(&mut self, entries: Vec<UpstreamEntry>) {
        self.states = entries.iter().map(|_| EntryState::default()).collect();
        self.active_index = if entries.is_empty() { None } else { Some(0) };
        self.entries = entries;
        self.using_backup = false;
        self.backup_started_at = None;
        self.last_primary_check_at = None;
    }
}
