//! Reactive, validated, persisted settings for Tether modules.
//!
//! - [`SettingsStore`]: observable JSON object with dotted-path access
//! - [`SettingDefinition`]: typed declaration with bounds and display hints
//! - [`PluginSettings`]: a module's namespace wired to a [`KeyValueStore`]
//! - [`SettingsRegistry`]: one namespace per module

pub mod definition;
pub mod persist;
pub mod plugin_settings;
pub mod registry;
pub mod store;

pub use definition::{SelectOption, SettingDefinition, SettingType, SettingsDefinitions};
pub use persist::{JsonFileStore, KeyValueStore, MemoryStore};
pub use plugin_settings::{PluginSettings, define_plugin_settings, namespaced_key};
pub use registry::SettingsRegistry;
pub use store::{SettingChange, SettingsListener, SettingsStore, Subscription};
