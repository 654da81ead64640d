use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use relay_common::ProxyConfig;

use crate::StorageError;

/// Write JSON next to the target and rename over it. Any concurrent reader
/// sees either the old or the new document, never a torn one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Load the configuration, filling defaults for anything missing. A file
/// written by an older build heals itself: the completed form is saved back.
pub fn load_or_init(path: &Path) -> Result<ProxyConfig, StorageError> {
    if !path.exists() {
        let config = ProxyConfig::default();
        save(path, &config)?;
        return Ok(config);
    }

    let raw = fs::read_to_string(path)?;
    let config: ProxyConfig = serde_json::from_str(&raw)?;

    let healed = serde_json::to_value(&config)?;
    let original: serde_json::Value = serde_json::from_str(&raw)?;
    if healed != original {
        save(path, &config)?;
    }
    Ok(config)
}

/// Re-read the file after an external edit. Returns an error (and leaves the
/// caller's snapshot untouched) unless the whole file parses.
pub fn reload(path: &Path) -> Result<ProxyConfig, StorageError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save(path: &Path, config: &ProxyConfig) -> Result<(), StorageError> {
    write_json_atomic(path, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_initializes_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_configs.json");
        let config = load_or_init(&path).unwrap();
        assert!(config.api_configs.is_empty());
        assert_eq!(config.timeout_settings.max_retries, 4);
        assert!(path.exists());
    }

    #[test]
    fn partial_file_heals_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_configs.json");
        fs::write(
            &path,
            r#"{"api_configs": [{"base_url": "https://up.example", "key": "sk-test-0123456789"}]}"#,
        )
        .unwrap();

        let config = load_or_init(&path).unwrap();
        assert_eq!(config.api_configs.len(), 1);

        // The healed file now carries every section.
        let healed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(healed.get("timeout_settings").is_some());
        assert!(healed.get("error_handling_strategies").is_some());
    }

    #[test]
    fn reload_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_configs.json");
        fs::write(&path, "{not json").unwrap();
        assert!(reload(&path).is_err());
    }
}
