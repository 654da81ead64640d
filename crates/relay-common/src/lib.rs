pub mod config;
pub mod error;
pub mod ids;

pub use config::{
    ConversionKind, DayMask, ErrorStrategyTable, ModelConversionRule, OptimizationSettings,
    ProxyConfig, RetryRung, Strategy, Tier, TimeoutSettings, UpstreamDialect, UpstreamEntry,
    UserKeyEntry,
};
pub use error::{ProxyError, error_envelope};
pub use ids::new_trace_id;
