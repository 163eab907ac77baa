//! Config file read/write with atomic backup rotation.

use crate::schema::RuntimeConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Number of rolling backups to keep.
const MAX_BACKUPS: usize = 5;

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "TETHER_CONFIG_DIR";

/// Settings persistence file within the config directory.
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Resolve the Tether config directory.
/// Priority: `TETHER_CONFIG_DIR` env > `~/.tether/` > `./.tether/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".tether"))
        .unwrap_or_else(|| PathBuf::from(".tether"))
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Resolve the path of the persisted settings store.
pub fn settings_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(RuntimeConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: RuntimeConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write config to disk atomically (write to temp file, rename).
///
/// Creates a rolling backup of the previous config before overwriting.
pub async fn write_config(config: &RuntimeConfig, path: &Path) -> Result<()> {
    // Ensure parent directory exists.
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    // Create backup of existing config.
    if path.exists() {
        rotate_backups(path).await?;
    }

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize config to YAML")?;

    // Write to temp file, then rename for atomicity.
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, yaml.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp config: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path).await.with_context(|| {
        format!("Failed to rename temp config to: {}", path.display())
    })?;

    info!(path = %path.display(), "Wrote config");
    Ok(())
}

/// Load, modify, and write back the config at `path`.
///
/// Used to persist runtime changes such as module toggles.
pub async fn update_config<F>(path: &Path, update: F) -> Result<RuntimeConfig>
where
    F: FnOnce(&mut RuntimeConfig),
{
    let mut config = load_config(path).await?;
    update(&mut config);
    write_config(&config, path).await?;
    Ok(config)
}

fn backup_path(path: &Path, generation: usize) -> PathBuf {
    path.with_extension(format!("yaml.bak.{generation}"))
}

/// Shift `config.yaml.bak.N` up one generation, dropping the oldest, then
/// copy the current file to `.bak.1`. Failures are logged, never fatal.
async fn rotate_backups(path: &Path) -> Result<()> {
    for generation in (1..MAX_BACKUPS).rev() {
        let older = backup_path(path, generation);
        if !older.exists() {
            continue;
        }
        if let Err(e) = fs::rename(&older, backup_path(path, generation + 1)).await {
            warn!(backup = %older.display(), error = %e, "Failed to rotate config backup");
        }
    }

    let newest = backup_path(path, 1);
    if let Err(e) = fs::copy(path, &newest).await {
        warn!(backup = %newest.display(), error = %e, "Failed to create config backup");
    }
    Ok(())
}
