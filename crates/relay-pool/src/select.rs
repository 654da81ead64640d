use time::OffsetDateTime;
use tracing::warn;

use relay_common::{Tier, UpstreamEntry};

use crate::state::{EntryStatus, Pool, PoolSettings};

/// The entry a request should go to, cloned out of the pool so the mutex is
/// released before any I/O starts.
#[derive(Debug, Clone)]
pub struct Selected {
    pub index: usize,
    pub entry: UpstreamEntry,
}

/// Recompute the preferred entry. Pure over (pool, now) apart from the
/// documented side effects: expired cooldowns clear, and the backup-probe
/// clock advances.
pub fn select(pool: &mut Pool, settings: &PoolSettings, now: OffsetDateTime) -> Option<Selected> {
    if pool.is_empty() {
        pool.active_index = None;
        return None;
    }

    if pool.using_backup {
        return select_while_on_backup(pool, settings, now);
    }

    if let Some(idx) = first_available_primary(pool, now) {
        pool.active_index = Some(idx);
        return Some(selected(pool, idx));
    }

    if let Some(idx) = first_available_backup(pool, now) {
        pool.active_index = Some(idx);
        pool.using_backup = true;
        pool.backup_started_at = Some(now);
        pool.last_primary_check_at = None;
        return Some(selected(pool, idx));
    }

    force_continue(pool)
}

fn select_while_on_backup(
    pool: &mut Pool,
    settings: &PoolSettings,
    now: OffsetDateTime,
) -> Option<Selected> {
    let probe_due = match pool.last_primary_check_at {
        None => true,
        Some(last) => now - last >= settings.primary_check_interval,
    };
    if probe_due {
        pool.last_primary_check_at = Some(now);
        if let Some(idx) = first_available_primary(pool, now) {
            pool.active_index = Some(idx);
            pool.using_backup = false;
            pool.backup_started_at = None;
            pool.last_primary_check_at = None;
            return Some(selected(pool, idx));
        }
    }

    if let Some(current) = pool.active_index
        && is_available(pool, current, now)
    {
        return Some(selected(pool, current));
    }

    if let Some(idx) = first_available_backup(pool, now) {
        pool.active_index = Some(idx);
        return Some(selected(pool, idx));
    }

    force_continue(pool)
}

/// Nothing is available; stay on the current cursor so traffic keeps moving
/// rather than failing outright.
fn force_continue(pool: &mut Pool) -> Option<Selected> {
    let idx = pool.active_index.unwrap_or(0);
    pool.active_index = Some(idx);
    warn!(
        pool = pool.label,
        entry = %pool.entries[idx].name,
        "no upstream available, continuing on current entry"
    );
    Some(selected(pool, idx))
}

fn selected(pool: &Pool, index: usize) -> Selected {
    Selected {
        index,
        entry: pool.entries[index].clone(),
    }
}

fn first_available_primary(pool: &mut Pool, now: OffsetDateTime) -> Option<usize> {
    first_available_in_tier(pool, Tier::Primary, now)
}

fn first_available_backup(pool: &mut Pool, now: OffsetDateTime) -> Option<usize> {
    first_available_in_tier(pool, Tier::Backup, now)
}

fn first_available_in_tier(pool: &mut Pool, tier: Tier, now: OffsetDateTime) -> Option<usize> {
    for idx in 0..pool.len() {
        if pool.entries[idx].tier != tier {
            continue;
        }
        if is_available(pool, idx, now) {
            return Some(idx);
        }
    }
    None
}

/// enabled ∧ day-gate ∧ cooldown elapsed. An elapsed cooldown clears the
/// entry's error state before the check so recovery is observable.
fn is_available(pool: &mut Pool, index: usize, now: OffsetDateTime) -> bool {
    let entry = &pool.entries[index];
    if !entry.enabled {
        return false;
    }
    let weekday = now.weekday().number_days_from_monday() as usize;
    if !entry.day_mask.allows(weekday) {
        return false;
    }
    if let Some(until) = pool.states[index].cooldown_until {
        if until > now {
            return false;
        }
        pool.states[index].clear();
    }
    true
}

/// 2xx from this entry: counters clear, warning status lifts.
pub fn record_success(pool: &mut Pool, index: usize) {
    if let Some(state) = pool.states.get_mut(index) {
        state.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecorded {
    pub error_count: u32,
    pub cooled_down: bool,
}

/// Bump the entry's error counter; crossing the threshold starts a cooldown
/// and flips the entry to warning.
pub fn record_error(
    pool: &mut Pool,
    index: usize,
    settings: &PoolSettings,
    now: OffsetDateTime,
) -> ErrorRecorded {
    let Some(state) = pool.states.get_mut(index) else {
        return ErrorRecorded {
            error_count: 0,
            cooled_down: false,
        };
    };
    state.error_count += 1;
    let cooled_down = state.error_count >= settings.error_threshold;
    if cooled_down {
        state.cooldown_until = Some(now + settings.cooldown);
        state.status = EntryStatus::Warning;
        warn!(
            pool = pool.label,
            entry = %pool.entries[index].name,
            errors = state.error_count,
            cooldown_secs = settings.cooldown.as_secs(),
            "error threshold crossed, entry cooling down"
        );
    }
    ErrorRecorded {
        error_count: pool.states[index].error_count,
        cooled_down,
    }
}
