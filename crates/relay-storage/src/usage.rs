use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio::sync::Mutex;

use crate::StorageError;
use crate::config_file::write_json_atomic;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_cache_creation_tokens: u64,
    #[serde(default)]
    pub total_cache_read_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl UsageTotals {
    fn add(&mut self, update: &UsageUpdate) {
        self.total_requests += 1;
        self.total_input_tokens += update.input_tokens;
        self.total_cache_creation_tokens += update.cache_creation_tokens;
        self.total_cache_read_tokens += update.cache_read_tokens;
        self.total_output_tokens += update.output_tokens;
        self.total_tokens += update.total();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    #[serde(flatten)]
    pub totals: UsageTotals,
    /// Request counts per model within the period.
    #[serde(default)]
    pub models: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageDocument {
    #[serde(default)]
    pub summary: UsageTotals,
    #[serde(default)]
    pub by_model: BTreeMap<String, UsageTotals>,
    #[serde(default)]
    pub daily: BTreeMap<String, PeriodRecord>,
    #[serde(default)]
    pub weekly: BTreeMap<String, PeriodRecord>,
    #[serde(default)]
    pub monthly: BTreeMap<String, PeriodRecord>,
    #[serde(default)]
    pub generated_at: String,
}

/// One completed request's token counts.
#[derive(Debug, Clone, Default)]
pub struct UsageUpdate {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl UsageUpdate {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

/// The on-disk usage accumulator. Counters only ever grow; every record
/// call rewrites the file via tempfile-then-rename under the store mutex.
#[derive(Debug)]
pub struct UsageStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UsageStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub async fn record(
        &self,
        update: &UsageUpdate,
        now: OffsetDateTime,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_or_default()?;
        apply(&mut doc, update, now)?;
        write_json_atomic(&self.path, &doc)?;
        Ok(())
    }

    pub fn read_or_default(&self) -> Result<UsageDocument, StorageError> {
        if !self.path.exists() {
            return Ok(UsageDocument::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn apply(
    doc: &mut UsageDocument,
    update: &UsageUpdate,
    now: OffsetDateTime,
) -> Result<(), StorageError> {
    doc.summary.add(update);
    doc.by_model
        .entry(update.model.clone())
        .or_default()
        .add(update);

    for key in [day_key(now)?, week_key(now), month_key(now)?] {
        let record = match key.kind {
            PeriodKind::Daily => doc.daily.entry(key.value).or_default(),
            PeriodKind::Weekly => doc.weekly.entry(key.value).or_default(),
            PeriodKind::Monthly => doc.monthly.entry(key.value).or_default(),
        };
        record.totals.add(update);
        *record.models.entry(update.model.clone()).or_default() += 1;
    }

    doc.generated_at = now.format(&Rfc3339)?;
    Ok(())
}

enum PeriodKind {
    Daily,
    Weekly,
    Monthly,
}

struct PeriodKey {
    kind: PeriodKind,
    value: String,
}

fn day_key(now: OffsetDateTime) -> Result<PeriodKey, StorageError> {
    let fmt = format_description!("[year]-[month]-[day]");
    Ok(PeriodKey {
        kind: PeriodKind::Daily,
        value: now.format(&fmt)?,
    })
}

/// ISO week key, weeks starting Monday (e.g. `2026-W05`).
fn week_key(now: OffsetDateTime) -> PeriodKey {
    let (iso_year, iso_week, _) = now.date().to_iso_week_date();
    PeriodKey {
        kind: PeriodKind::Weekly,
        value: format!("{iso_year}-W{iso_week:02}"),
    }
}

fn month_key(now: OffsetDateTime) -> Result<PeriodKey, StorageError> {
    let fmt = format_description!("[year]-[month]");
    Ok(PeriodKey {
        kind: PeriodKind::Monthly,
        value: now.format(&fmt)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(model: &str, input: u64, output: u64) -> UsageUpdate {
        UsageUpdate {
            model: model.to_string(),
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    fn noon() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_759_276_800 + 12 * 3600).unwrap()
    }

    #[tokio::test]
    async fn records_accumulate_and_never_decrement() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::new(dir.path().join("token_stats.json"));
        let now = noon();

        store.record(&update("claude-sonnet-4-20250514", 100, 10), now).await.unwrap();
        store.record(&update("claude-sonnet-4-20250514", 50, 5), now).await.unwrap();
        store.record(&update("gpt-5-codex", 20, 2), now).await.unwrap();

        let doc = store.read_or_default().unwrap();
        assert_eq!(doc.summary.total_requests, 3);
        assert_eq!(doc.summary.total_input_tokens, 170);
        assert_eq!(doc.summary.total_output_tokens, 17);
        assert_eq!(doc.summary.total_tokens, 187);

        let sonnet = &doc.by_model["claude-sonnet-4-20250514"];
        assert_eq!(sonnet.total_requests, 2);
        assert_eq!(sonnet.total_input_tokens, 150);

        assert_eq!(doc.daily.len(), 1);
        let day = doc.daily.values().next().unwrap();
        assert_eq!(day.totals.total_requests, 3);
        assert_eq!(day.models["gpt-5-codex"], 1);
        assert!(!doc.generated_at.is_empty());
    }

    #[tokio::test]
    async fn period_keys_have_the_documented_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::new(dir.path().join("token_stats.json"));
        let now = noon(); // 2025-10-01

        store.record(&update("m", 1, 1), now).await.unwrap();
        let doc = store.read_or_default().unwrap();
        assert!(doc.daily.contains_key("2025-10-01"));
        assert!(doc.weekly.contains_key("2025-W40"));
        assert!(doc.monthly.contains_key("2025-10"));
    }

    #[tokio::test]
    async fn file_on_disk_is_always_complete_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token_stats.json");
        let store = UsageStore::new(path.clone());
        let now = noon();

        for i in 0..10 {
            store.record(&update("m", i, 1), now).await.unwrap();
            let raw = fs::read_to_string(&path).unwrap();
            let parsed: UsageDocument = serde_json::from_str(&raw).unwrap();
            assert_eq!(parsed.summary.total_requests, i + 1);
        }
    }
}
