use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::state::AppState;

pub struct BootArgs {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
}

pub fn bootstrap(args: BootArgs) -> anyhow::Result<Arc<AppState>> {
    let config = relay_storage::load_or_init(&args.config_path)
        .with_context(|| format!("load config from {}", args.config_path.display()))?;

    info!(
        path = %args.config_path.display(),
        api_configs = config.api_configs.len(),
        codex_configs = config.codex_configs.len(),
        retry_configs = config.retry_configs.len(),
        model_conversions = config.model_conversions.len(),
        user_keys = config.user_keys.len(),
        "configuration loaded"
    );

    Ok(Arc::new(AppState::new(
        args.config_path,
        config,
        args.data_dir,
    )))
}
