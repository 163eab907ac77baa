//! Setting declarations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Declared kind of a setting. Drives validation and how a settings UI
/// would render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Number,
    BigInt,
    Boolean,
    Select,
    Slider,
    /// Duration in milliseconds.
    Timespan,
    Component,
    Custom,
}

impl SettingType {
    /// Whether `min`/`max` bounds are enforced by clamping.
    pub fn is_bounded(self) -> bool {
        matches!(self, Self::Number | Self::Timespan)
    }
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::BigInt => "bigint",
            Self::Boolean => "boolean",
            Self::Select => "select",
            Self::Slider => "slider",
            Self::Timespan => "timespan",
            Self::Component => "component",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// One entry of a `select` setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Declaration of a single setting key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingDefinition {
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub restart_needed: bool,
}

/// Definitions for one module, keyed by top-level setting key.
pub type SettingsDefinitions = BTreeMap<String, SettingDefinition>;

impl SettingDefinition {
    pub fn new(setting_type: SettingType, default: Value) -> Self {
        Self {
            setting_type,
            default,
            description: String::new(),
            min: None,
            max: None,
            options: Vec::new(),
            hidden: false,
            category: None,
            restart_needed: false,
        }
    }

    pub fn string(default: impl Into<String>) -> Self {
        Self::new(SettingType::String, Value::String(default.into()))
    }

    pub fn number(default: f64) -> Self {
        Self::new(SettingType::Number, json!(default))
    }

    pub fn bigint(default: i64) -> Self {
        Self::new(SettingType::BigInt, json!(default))
    }

    pub fn boolean(default: bool) -> Self {
        Self::new(SettingType::Boolean, Value::Bool(default))
    }

    /// A `select` whose default is the first option's value.
    pub fn select(options: Vec<SelectOption>) -> Self {
        let default = options.first().map(|o| o.value.clone()).unwrap_or(Value::Null);
        Self {
            options,
            ..Self::new(SettingType::Select, default)
        }
    }

    pub fn slider(min: f64, max: f64, default: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::new(SettingType::Slider, json!(default))
        }
    }

    pub fn timespan(default_ms: u64) -> Self {
        Self::new(SettingType::Timespan, json!(default_ms))
    }

    pub fn component() -> Self {
        Self::new(SettingType::Component, Value::Null)
    }

    pub fn custom(default: Value) -> Self {
        Self::new(SettingType::Custom, default)
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn restart_needed(mut self) -> Self {
        self.restart_needed = true;
        self
    }

    /// Clamp a numeric value into `[min, max]` for bounded types.
    ///
    /// Returns `None` when the value is already acceptable (or the type is
    /// not bounded, or the value is not a number).
    pub fn clamp(&self, value: &Value) -> Option<Value> {
        if !self.setting_type.is_bounded() {
            return None;
        }
        let n = value.as_f64()?;
        let mut clamped = n;
        if let Some(min) = self.min {
            clamped = clamped.max(min);
        }
        if let Some(max) = self.max {
            clamped = clamped.min(max);
        }
        if clamped == n {
            return None;
        }
        // Keep integers integral so `1` does not turn into `1.0`.
        if clamped.fract() == 0.0 && clamped.abs() < i64::MAX as f64 {
            Some(json!(clamped as i64))
        } else {
            Some(json!(clamped))
        }
    }
}
