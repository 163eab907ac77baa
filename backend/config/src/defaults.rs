//! Config defaults: fills absent sections of a freshly loaded config.

use crate::schema::{HooksConfig, LoaderConfig, LoggingConfig, RuntimeConfig};

pub const DEFAULT_SETTINGS_ROOT: &str = "tether";

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_DEPENDENCY_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_HOOK_BASE_DELAY_MS: u64 = 100;
pub const DEFAULT_HOOK_BACKOFF_FACTOR: f64 = 1.5;
pub const DEFAULT_HOOK_MAX_DELAY_MS: u64 = 5_000;
pub const DEFAULT_HOOK_MAX_ATTEMPTS: u32 = 10;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: RuntimeConfig) -> RuntimeConfig {
    let config = apply_root_defaults(config);
    let config = apply_loader_defaults(config);
    let config = apply_hook_defaults(config);
    apply_logging_defaults(config)
}

fn apply_root_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    if config.settings_root.is_none() {
        config.settings_root = Some(DEFAULT_SETTINGS_ROOT.to_string());
    }
    config
}

fn apply_loader_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let loader = config.loader.get_or_insert_with(LoaderConfig::default);
    loader.max_retries.get_or_insert(DEFAULT_MAX_RETRIES);
    loader.retry_delay_ms.get_or_insert(DEFAULT_RETRY_DELAY_MS);
    loader
        .dependency_timeout_ms
        .get_or_insert(DEFAULT_DEPENDENCY_TIMEOUT_MS);
    loader.cache_bust.get_or_insert(true);
    config
}

fn apply_hook_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let hooks = config.hooks.get_or_insert_with(HooksConfig::default);
    hooks.base_delay_ms.get_or_insert(DEFAULT_HOOK_BASE_DELAY_MS);
    hooks.backoff_factor.get_or_insert(DEFAULT_HOOK_BACKOFF_FACTOR);
    hooks.max_delay_ms.get_or_insert(DEFAULT_HOOK_MAX_DELAY_MS);
    hooks.max_attempts.get_or_insert(DEFAULT_HOOK_MAX_ATTEMPTS);
    config
}

fn apply_logging_defaults(mut config: RuntimeConfig) -> RuntimeConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    config
}
