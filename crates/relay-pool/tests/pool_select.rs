use std::time::Duration;

use time::{OffsetDateTime, Weekday};

use relay_common::{DayMask, Tier, UpstreamDialect, UpstreamEntry};
use relay_pool::select::{record_error, record_success};
use relay_pool::state::{EntryStatus, Pool, PoolSettings};
use relay_pool::{Selected, select};

// 2025-10-01 12:00:00 UTC, a Wednesday.
const WEDNESDAY_NOON: i64 = 1_759_276_800 + 12 * 3600;

fn wednesday() -> OffsetDateTime {
    let now = OffsetDateTime::from_unix_timestamp(WEDNESDAY_NOON).unwrap();
    assert_eq!(now.weekday(), Weekday::Wednesday);
    now
}

fn settings() -> PoolSettings {
    PoolSettings {
        error_threshold: 3,
        cooldown: Duration::from_secs(600),
        primary_check_interval: Duration::from_secs(30),
    }
}

fn entry(name: &str, tier: Tier) -> UpstreamEntry {
    UpstreamEntry {
        name: name.to_string(),
        base_url: format!("https://{name}.example"),
        key: format!("sk-{name}-0123456789"),
        tier,
        dialect: UpstreamDialect::Messages,
        enabled: true,
        day_mask: DayMask::default(),
        activation_enabled: false,
        activation_time: "08:00".to_string(),
    }
}

fn entry_for_day(name: &str, day: usize) -> UpstreamEntry {
    let mut mask = [0u8; 7];
    mask[day] = 1;
    UpstreamEntry {
        day_mask: DayMask(mask),
        ..entry(name, Tier::Primary)
    }
}

fn name_of(selected: &Option<Selected>) -> String {
    selected.as_ref().map(|s| s.entry.name.clone()).unwrap_or_default()
}

#[test]
fn empty_pool_selects_nothing() {
    let mut pool = Pool::new("messages", Vec::new());
    assert!(select(&mut pool, &settings(), wednesday()).is_none());
    assert_eq!(pool.active_index, None);
}

#[test]
fn first_configured_primary_wins() {
    let mut pool = Pool::new(
        "messages",
        vec![
            entry("first", Tier::Primary),
            entry("second", Tier::Primary),
            entry("backup", Tier::Backup),
        ],
    );
    let selected = select(&mut pool, &settings(), wednesday());
    assert_eq!(name_of(&selected), "first");
    assert_eq!(pool.active_index, Some(0));
    assert!(!pool.using_backup);
}

#[test]
fn one_hot_day_masks_pick_the_weekday_entry() {
    let mut pool = Pool::new(
        "messages",
        vec![
            entry_for_day("mon", 0),
            entry_for_day("tue", 1),
            entry_for_day("wed", 2),
            entry_for_day("thu", 3),
            entry_for_day("fri", 4),
            entry_for_day("sat", 5),
            entry_for_day("sun", 6),
            entry("backup", Tier::Backup),
        ],
    );
    let now = wednesday();
    let selected = select(&mut pool, &settings(), now);
    assert_eq!(name_of(&selected), "wed");

    // Cool the Wednesday entry down: selection walks to the backup, never
    // to Thursday's entry.
    for _ in 0..3 {
        record_error(&mut pool, 2, &settings(), now);
    }
    let selected = select(&mut pool, &settings(), now);
    assert_eq!(name_of(&selected), "backup");
    assert!(pool.using_backup);
}

#[test]
fn threshold_crossing_sets_cooldown_and_warning() {
    let mut pool = Pool::new("messages", vec![entry("a", Tier::Primary)]);
    let now = wednesday();

    let first = record_error(&mut pool, 0, &settings(), now);
    assert!(!first.cooled_down);
    let second = record_error(&mut pool, 0, &settings(), now);
    assert!(!second.cooled_down);
    assert_eq!(pool.states[0].status, EntryStatus::Normal);

    let third = record_error(&mut pool, 0, &settings(), now);
    assert!(third.cooled_down);
    assert_eq!(pool.states[0].status, EntryStatus::Warning);
    assert_eq!(pool.states[0].cooldown_until, Some(now + Duration::from_secs(600)));
}

#[test]
fn cooldown_expires_exactly_at_the_deadline() {
    let mut pool = Pool::new(
        "messages",
        vec![entry("cooling", Tier::Primary), entry("other", Tier::Primary)],
    );
    let now = wednesday();
    for _ in 0..3 {
        record_error(&mut pool, 0, &settings(), now);
    }
    let deadline = now + Duration::from_secs(600);

    let just_before = deadline - Duration::from_millis(1);
    let selected = select(&mut pool, &settings(), just_before);
    assert_eq!(name_of(&selected), "other");

    let just_after = deadline + Duration::from_millis(1);
    let selected = select(&mut pool, &settings(), just_after);
    assert_eq!(name_of(&selected), "cooling");
    // Eligibility clears the counters.
    assert_eq!(pool.states[0].error_count, 0);
    assert_eq!(pool.states[0].status, EntryStatus::Normal);
}

#[test]
fn success_clears_error_state() {
    let mut pool = Pool::new("messages", vec![entry("a", Tier::Primary)]);
    let now = wednesday();
    record_error(&mut pool, 0, &settings(), now);
    record_error(&mut pool, 0, &settings(), now);
    assert_eq!(pool.states[0].error_count, 2);

    record_success(&mut pool, 0);
    assert_eq!(pool.states[0].error_count, 0);
    assert_eq!(pool.states[0].cooldown_until, None);
}

#[test]
fn backup_promotion_and_primary_recovery_probe() {
    let mut pool = Pool::new(
        "messages",
        vec![entry("primary", Tier::Primary), entry("backup", Tier::Backup)],
    );
    let cfg = settings();
    let t0 = wednesday();

    for _ in 0..3 {
        record_error(&mut pool, 0, &cfg, t0);
    }
    let selected = select(&mut pool, &cfg, t0);
    assert_eq!(name_of(&selected), "backup");
    assert!(pool.using_backup);
    assert_eq!(pool.backup_started_at, Some(t0));

    // First selection on backup probes immediately and stamps the clock;
    // the primary is still cooling, so the backup stays.
    let t1 = t0 + Duration::from_secs(5);
    let selected = select(&mut pool, &cfg, t1);
    assert_eq!(name_of(&selected), "backup");
    assert_eq!(pool.last_primary_check_at, Some(t1));

    // Shorten the cooldown so the primary recovers while the probe
    // interval is still running: no switch before the next probe.
    pool.states[0].cooldown_until = Some(t1 + Duration::from_secs(10));
    let t2 = t1 + Duration::from_secs(20);
    let selected = select(&mut pool, &cfg, t2);
    assert_eq!(name_of(&selected), "backup");
    assert!(pool.using_backup);

    // Probe due: the recovered primary is adopted again.
    let t3 = t1 + Duration::from_secs(31);
    let selected = select(&mut pool, &cfg, t3);
    assert_eq!(name_of(&selected), "primary");
    assert!(!pool.using_backup);
    assert_eq!(pool.backup_started_at, None);
}

#[test]
fn force_continue_when_everything_is_cooling() {
    let mut pool = Pool::new(
        "messages",
        vec![entry("a", Tier::Primary), entry("b", Tier::Backup)],
    );
    let cfg = settings();
    let now = wednesday();
    for idx in 0..2 {
        for _ in 0..3 {
            record_error(&mut pool, idx, &cfg, now);
        }
    }

    // Both entries are cooling; the selector keeps the current cursor
    // rather than returning nothing.
    let selected = select(&mut pool, &cfg, now + Duration::from_secs(1));
    assert!(selected.is_some());
    assert_eq!(pool.active_index, Some(selected.unwrap().index));
}

#[test]
fn disabled_entries_are_never_selected() {
    let mut disabled = entry("disabled", Tier::Primary);
    disabled.enabled = false;
    let mut pool = Pool::new("messages", vec![disabled, entry("live", Tier::Primary)]);
    let selected = select(&mut pool, &settings(), wednesday());
    assert_eq!(name_of(&selected), "live");
}
