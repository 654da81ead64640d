use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use relay_common::{ProxyConfig, UpstreamEntry};
use relay_pool::state::{Pool, PoolHandle, PoolSettings};
use relay_pool::AdaptiveTimeout;
use relay_storage::{FlowLogs, StorageError, UsageStore};

/// Which upstream pool a request runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Messages,
    Responses,
}

/// Process-wide state, built once at bootstrap and injected everywhere.
/// Live requests capture the configuration snapshot they started with;
/// reloads swap the pointer atomically.
pub struct AppState {
    pub config_path: PathBuf,
    config: ArcSwap<ProxyConfig>,
    pub messages_pool: PoolHandle,
    pub responses_pool: PoolHandle,
    pub adaptive: AdaptiveTimeout,
    pub usage: UsageStore,
    pub flow: FlowLogs,
}

impl AppState {
    pub fn new(config_path: PathBuf, config: ProxyConfig, data_dir: PathBuf) -> Self {
        let messages_pool = Pool::handle("messages", enabled(&config.api_configs));
        let responses_pool = Pool::handle("responses", enabled(&config.codex_configs));
        Self {
            config_path,
            config: ArcSwap::from_pointee(config),
            messages_pool,
            responses_pool,
            adaptive: AdaptiveTimeout::new(),
            usage: UsageStore::new(data_dir.join("token_stats.json")),
            flow: FlowLogs::new(data_dir.join("logs")),
        }
    }

    pub fn config(&self) -> Arc<ProxyConfig> {
        self.config.load_full()
    }

    /// Re-read the config file and swap the snapshot. Pools rebuild with
    /// fresh runtime state; requests already in flight keep their captured
    /// snapshot.
    pub async fn reload(&self) -> Result<(), StorageError> {
        let next = relay_storage::reload(&self.config_path)?;
        self.messages_pool
            .lock()
            .await
            .replace_entries(enabled(&next.api_configs));
        self.responses_pool
            .lock()
            .await
            .replace_entries(enabled(&next.codex_configs));
        info!(
            api_configs = next.api_configs.len(),
            codex_configs = next.codex_configs.len(),
            retry_configs = next.retry_configs.len(),
            model_conversions = next.model_conversions.len(),
            "configuration reloaded"
        );
        self.config.store(Arc::new(next));
        Ok(())
    }

    pub fn pool(&self, kind: PoolKind) -> &PoolHandle {
        match kind {
            PoolKind::Messages => &self.messages_pool,
            PoolKind::Responses => &self.responses_pool,
        }
    }

    pub fn pool_settings(&self, kind: PoolKind, config: &ProxyConfig) -> PoolSettings {
        let timeouts = &config.timeout_settings;
        let error_threshold = match kind {
            PoolKind::Messages => timeouts.api_error_threshold,
            PoolKind::Responses => timeouts.codex_error_threshold,
        };
        PoolSettings {
            error_threshold,
            cooldown: timeouts.cooldown(),
            primary_check_interval: timeouts.primary_check_interval(),
        }
    }

    /// Static-table client auth. A hit yields nothing but permission: the
    /// upstream credential is resolved from the selected entry at send time.
    pub fn authenticate_user_key(&self, key: &str) -> bool {
        self.config.load().lookup_user_key(key).is_some()
    }
}

fn enabled(entries: &[UpstreamEntry]) -> Vec<UpstreamEntry> {
    entries.iter().filter(|e| e.enabled).cloned().collect()
}
