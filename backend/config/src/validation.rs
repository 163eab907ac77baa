//! Config validation: checks with user-friendly error messages.

use thiserror::Error;
use url::Url;

use crate::schema::RuntimeConfig;

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All findings of one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &RuntimeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_root(config, &mut report);
    validate_urls(config, &mut report);
    validate_loader(config, &mut report);
    validate_hooks(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_root(config: &RuntimeConfig, report: &mut ValidationReport) {
    if let Some(root) = &config.settings_root {
        if root.trim().is_empty() {
            report.error("settingsRoot", "Settings root cannot be empty");
        } else if root.contains('.') {
            report.warn(
                "settingsRoot",
                "Settings root contains '.'; persisted keys will be ambiguous",
            );
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn validate_urls(config: &RuntimeConfig, report: &mut ValidationReport) {
    for (i, catalog) in config.catalogs.iter().enumerate() {
        if !is_http_url(catalog) {
            report.error(
                format!("catalogs[{i}]"),
                format!("'{catalog}' is not an http(s) URL"),
            );
        }
    }
    for (url, _) in config.modules.iter() {
        if !is_http_url(url) {
            report.warn(
                format!("modules.{url}"),
                "Module key is not an http(s) URL; it can only match a built-in",
            );
        }
    }
    if config.catalogs.is_empty() && config.modules.is_empty() {
        report.warn("modules", "No catalogs or modules configured; nothing will load");
    }
}

fn validate_loader(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(loader) = &config.loader else { return };
    if loader.dependency_timeout_ms == Some(0) {
        report.error(
            "loader.dependencyTimeoutMs",
            "dependencyTimeoutMs must be > 0",
        );
    }
    if let Some(retries) = loader.max_retries {
        if retries > 10 {
            report.warn(
                "loader.maxRetries",
                format!("{retries} retries with linear backoff can stall startup"),
            );
        }
    }
}

fn validate_hooks(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(hooks) = &config.hooks else { return };
    if hooks.max_attempts == Some(0) {
        report.error("hooks.maxAttempts", "maxAttempts must be >= 1");
    }
    if let Some(factor) = hooks.backoff_factor {
        if factor < 1.0 {
            report.error("hooks.backoffFactor", "backoffFactor must be >= 1.0");
        }
    }
    if let (Some(base), Some(max)) = (hooks.base_delay_ms, hooks.max_delay_ms) {
        if base > max {
            report.warn("hooks.baseDelayMs", "baseDelayMs exceeds maxDelayMs");
        }
    }
}

fn validate_logging(config: &RuntimeConfig, report: &mut ValidationReport) {
    let Some(level) = config.logging.as_ref().and_then(|l| l.level.as_deref()) else {
        return;
    };
    if !matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        report.warn(
            "logging.level",
            format!("Unknown level '{level}'; treated as an env-filter directive"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::HooksConfig;

    fn with_module() -> RuntimeConfig {
        let mut cfg = RuntimeConfig::default();
        cfg.modules.set("https://example.com/a.json", true);
        cfg
    }

    #[test]
    fn defaulted_config_is_valid() {
        let report = validate(&apply_all_defaults(with_module()));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    }

    #[test]
    fn empty_config_warns_nothing_to_load() {
        let report = validate(&RuntimeConfig::default());
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "modules");
    }

    #[test]
    fn zero_attempts_and_low_factor_are_errors() {
        let mut cfg = with_module();
        cfg.hooks = Some(HooksConfig {
            max_attempts: Some(0),
            backoff_factor: Some(0.5),
            ..Default::default()
        });
        let report = validate(&cfg);
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["hooks.maxAttempts", "hooks.backoffFactor"]);
    }

    #[test]
    fn non_http_catalog_is_error() {
        let mut cfg = with_module();
        cfg.catalogs.push("ftp://example.com/catalog.json".into());
        cfg.settings_root = Some(" ".into());
        let report = validate(&cfg);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().any(|e| e.path == "catalogs[0]"));
    }
}
