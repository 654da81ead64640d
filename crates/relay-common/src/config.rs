use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Backup,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Primary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamDialect {
    Messages,
    Responses,
    OpenaiAdapter,
}

impl Default for UpstreamDialect {
    fn default() -> Self {
        UpstreamDialect::Messages
    }
}

/// Monday-indexed weekday gate. `[1,1,1,1,1,1,1]` means always available,
/// matching the `time_enabled` array the config file has always used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMask(pub [u8; 7]);

impl DayMask {
    pub fn allows(&self, monday_indexed_day: usize) -> bool {
        self.0.get(monday_indexed_day).copied().unwrap_or(0) != 0
    }
}

impl Default for DayMask {
    fn default() -> Self {
        DayMask([1; 7])
    }
}

fn default_true() -> bool {
    true
}

fn default_activation_time() -> String {
    "08:00".to_string()
}

/// One configured backend. Runtime state (error counters, cooldowns) never
/// lives here; it belongs to the owning pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamEntry {
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    pub key: String,
    #[serde(default, rename = "type")]
    pub tier: Tier,
    #[serde(default)]
    pub dialect: UpstreamDialect,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "time_enabled")]
    pub day_mask: DayMask,
    /// Consumed by the external activation cron only; persisted verbatim.
    #[serde(default)]
    pub activation_enabled: bool,
    #[serde(default = "default_activation_time")]
    pub activation_time: String,
}

/// One rung of the strategy-retry ladder. Independent of the main pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRung {
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    pub key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionKind {
    SimpleRename,
    FullFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConversionRule {
    #[serde(default)]
    pub name: String,
    pub source_model: String,
    pub target_model: String,
    pub conversion_type: ConversionKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SwitchApi,
    StrategyRetry,
    NormalRetry,
}

/// Two lookup tables, keyed by decimal HTTP status and by transport error
/// kind. Each carries a `default` key; a hard-coded fallback covers tables
/// with no default at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorStrategyTable {
    #[serde(default)]
    pub http_status_codes: BTreeMap<String, Strategy>,
    #[serde(default)]
    pub network_errors: BTreeMap<String, Strategy>,
}

impl ErrorStrategyTable {
    pub fn for_status(&self, status: u16) -> Strategy {
        if let Some(s) = self.http_status_codes.get(&status.to_string()) {
            return *s;
        }
        if let Some(s) = self.http_status_codes.get("default") {
            return *s;
        }
        Strategy::StrategyRetry
    }

    pub fn for_transport(&self, kind: &str) -> Strategy {
        if let Some(s) = self.network_errors.get(kind) {
            return *s;
        }
        if let Some(s) = self.network_errors.get("default") {
            return *s;
        }
        Strategy::SwitchApi
    }
}

impl Default for ErrorStrategyTable {
    fn default() -> Self {
        let mut http = BTreeMap::new();
        for code in [400, 404, 408, 429, 500, 502, 503, 504, 520, 521, 522, 524] {
            http.insert(code.to_string(), Strategy::StrategyRetry);
        }
        http.insert("401".to_string(), Strategy::SwitchApi);
        http.insert("403".to_string(), Strategy::SwitchApi);
        http.insert("default".to_string(), Strategy::StrategyRetry);

        let mut network = BTreeMap::new();
        network.insert("ReadError".to_string(), Strategy::SwitchApi);
        network.insert("ConnectError".to_string(), Strategy::SwitchApi);
        network.insert("ReadTimeout".to_string(), Strategy::StrategyRetry);
        network.insert("default".to_string(), Strategy::SwitchApi);

        Self {
            http_status_codes: http,
            network_errors: network,
        }
    }
}

macro_rules! timeout_default {
    ($fn_name:ident, $value:expr) => {
        fn $fn_name() -> f64 {
            $value
        }
    };
}

timeout_default!(d_connect, 60.0);
timeout_default!(d_write, 60.0);
timeout_default!(d_pool, 120.0);
timeout_default!(d_streaming_read, 60.0);
timeout_default!(d_non_streaming_read, 60.0);
timeout_default!(d_extended_connect, 90.0);
timeout_default!(d_codex_connect, 30.0);
timeout_default!(d_stream_retry_wait, 1.0);
timeout_default!(d_strategy_retry_read, 200.0);

fn d_cooldown_seconds() -> u64 {
    600
}

fn d_error_threshold() -> u32 {
    3
}

fn d_codex_base_timeout() -> u64 {
    60
}

fn d_primary_check_interval() -> u64 {
    30
}

fn d_max_retries() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "d_connect")]
    pub connect_timeout: f64,
    #[serde(default = "d_write")]
    pub write_timeout: f64,
    #[serde(default = "d_pool")]
    pub pool_timeout: f64,
    #[serde(default = "d_streaming_read")]
    pub streaming_read_timeout: f64,
    #[serde(default = "d_non_streaming_read")]
    pub non_streaming_read_timeout: f64,
    #[serde(default = "d_extended_connect")]
    pub extended_connect_timeout: f64,
    #[serde(default = "d_cooldown_seconds")]
    pub api_cooldown_seconds: u64,
    #[serde(default = "d_error_threshold")]
    pub api_error_threshold: u32,
    #[serde(default = "d_error_threshold")]
    pub codex_error_threshold: u32,
    #[serde(default = "d_codex_base_timeout")]
    pub codex_base_timeout: u64,
    #[serde(default = "d_codex_base_timeout")]
    pub codex_timeout_increment: u64,
    #[serde(default = "d_codex_connect")]
    pub codex_connect_timeout: f64,
    #[serde(default = "d_primary_check_interval")]
    pub primary_api_check_interval: u64,
    #[serde(default = "d_stream_retry_wait")]
    pub stream_retry_wait: f64,
    #[serde(default = "d_strategy_retry_read")]
    pub strategy_retry_read_timeout: f64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub modify_retry_headers: bool,
}

impl TimeoutSettings {
    pub fn connect(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout)
    }

    pub fn streaming_read(&self) -> Duration {
        Duration::from_secs_f64(self.streaming_read_timeout)
    }

    pub fn non_streaming_read(&self) -> Duration {
        Duration::from_secs_f64(self.non_streaming_read_timeout)
    }

    pub fn strategy_retry_read(&self) -> Duration {
        Duration::from_secs_f64(self.strategy_retry_read_timeout)
    }

    pub fn codex_connect(&self) -> Duration {
        Duration::from_secs_f64(self.codex_connect_timeout)
    }

    pub fn codex_base(&self) -> Duration {
        Duration::from_secs(self.codex_base_timeout)
    }

    pub fn codex_increment(&self) -> Duration {
        Duration::from_secs(self.codex_timeout_increment)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.api_cooldown_seconds)
    }

    pub fn primary_check_interval(&self) -> Duration {
        Duration::from_secs(self.primary_api_check_interval)
    }

    pub fn stream_retry_wait(&self) -> Duration {
        Duration::from_secs_f64(self.stream_retry_wait)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_timeout: d_connect(),
            write_timeout: d_write(),
            pool_timeout: d_pool(),
            streaming_read_timeout: d_streaming_read(),
            non_streaming_read_timeout: d_non_streaming_read(),
            extended_connect_timeout: d_extended_connect(),
            api_cooldown_seconds: d_cooldown_seconds(),
            api_error_threshold: d_error_threshold(),
            codex_error_threshold: d_error_threshold(),
            codex_base_timeout: d_codex_base_timeout(),
            codex_timeout_increment: d_codex_base_timeout(),
            codex_connect_timeout: d_codex_connect(),
            primary_api_check_interval: d_primary_check_interval(),
            stream_retry_wait: d_stream_retry_wait(),
            strategy_retry_read_timeout: d_strategy_retry_read(),
            max_retries: d_max_retries(),
            modify_retry_headers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSettings {
    #[serde(default = "default_true")]
    pub enable_cache_control_limit: bool,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enable_cache_control_limit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKeyEntry {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// The whole on-disk configuration. Every section has serde defaults so a
/// partial or older file loads cleanly; the storage layer writes the healed
/// form back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Entries of the messages pool. `dialect = openai_adapter` entries are
    /// ordinary members reserved for translated OpenAI-Chat traffic.
    #[serde(default)]
    pub api_configs: Vec<UpstreamEntry>,
    /// Entries of the responses pool.
    #[serde(default)]
    pub codex_configs: Vec<UpstreamEntry>,
    #[serde(default)]
    pub retry_configs: Vec<RetryRung>,
    #[serde(default)]
    pub model_conversions: Vec<ModelConversionRule>,
    #[serde(default)]
    pub timeout_settings: TimeoutSettings,
    #[serde(default)]
    pub error_handling_strategies: ErrorStrategyTable,
    #[serde(default)]
    pub optimization_settings: OptimizationSettings,
    #[serde(default)]
    pub user_keys: Vec<UserKeyEntry>,
}

impl ProxyConfig {
    pub fn enabled_retry_rungs(&self) -> Vec<&RetryRung> {
        self.retry_configs.iter().filter(|r| r.enabled).collect()
    }

    pub fn enabled_model_conversions(&self) -> Vec<&ModelConversionRule> {
        self.model_conversions
            .iter()
            .filter(|r| r.enabled)
            .collect()
    }

    pub fn lookup_user_key(&self, key: &str) -> Option<&UserKeyEntry> {
        self.user_keys
            .iter()
            .find(|entry| entry.enabled && entry.key == key)
    }
}
