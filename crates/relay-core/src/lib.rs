pub mod bootstrap;
pub mod classify;
pub mod engine;
pub mod state;
pub mod upstream_client;

pub use classify::{InboundDialect, InboundPath, classify_path};
pub use engine::{Engine, EngineResponse};
pub use relay_common::ProxyError;
pub use state::AppState;
