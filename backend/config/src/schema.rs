//! Configuration schema.
//!
//! Every section is optional on disk; [`crate::apply_all_defaults`] fills
//! the gaps and the `*_settings()` accessors fall back to the same
//! defaults, so callers never see a missing value.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::*;
use crate::toggles::ModuleToggles;

/// Root configuration object (`config.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Namespace root for persisted settings keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_root: Option<String>,

    /// Remote catalog URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalogs: Vec<String>,

    /// Enable/disable map keyed by module URL.
    #[serde(default)]
    pub modules: ModuleToggles,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HooksConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Retries after the first failed attempt.
    pub max_retries: Option<u32>,
    /// Linear backoff unit: attempt `n` waits `n × retryDelayMs`.
    pub retry_delay_ms: Option<u64>,
    /// How long a module waits for each dependency to load.
    pub dependency_timeout_ms: Option<u64>,
    /// Append a timestamp query parameter to module fetches.
    pub cache_bust: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    pub base_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// Directory for rolling JSON log files. Console only when absent.
    pub dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved views
// ---------------------------------------------------------------------------

/// Loader section with every value filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub dependency_timeout: Duration,
    pub cache_bust: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        RuntimeConfig::default().loader_settings()
    }
}

/// Hooks section with every value filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct HookSettings {
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl RuntimeConfig {
    pub fn settings_root(&self) -> &str {
        self.settings_root.as_deref().unwrap_or(DEFAULT_SETTINGS_ROOT)
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        let loader = self.loader.clone().unwrap_or_default();
        LoaderSettings {
            max_retries: loader.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_millis(
                loader.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
            dependency_timeout: Duration::from_millis(
                loader
                    .dependency_timeout_ms
                    .unwrap_or(DEFAULT_DEPENDENCY_TIMEOUT_MS),
            ),
            cache_bust: loader.cache_bust.unwrap_or(true),
        }
    }

    pub fn hook_settings(&self) -> HookSettings {
        let hooks = self.hooks.clone().unwrap_or_default();
        HookSettings {
            base_delay_ms: hooks.base_delay_ms.unwrap_or(DEFAULT_HOOK_BASE_DELAY_MS),
            backoff_factor: hooks.backoff_factor.unwrap_or(DEFAULT_HOOK_BACKOFF_FACTOR),
            max_delay_ms: hooks.max_delay_ms.unwrap_or(DEFAULT_HOOK_MAX_DELAY_MS),
            max_attempts: hooks.max_attempts.unwrap_or(DEFAULT_HOOK_MAX_ATTEMPTS),
        }
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.logging
            .as_ref()
            .and_then(|l| l.dir.as_deref())
            .map(PathBuf::from)
    }
}
