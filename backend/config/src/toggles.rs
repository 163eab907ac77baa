//! Persisted module enable/disable map, keyed by module URL.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleToggles(BTreeMap<String, bool>);

impl ModuleToggles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit setting for `url`, or `default` if it has none.
    pub fn is_enabled(&self, url: &str, default: bool) -> bool {
        self.0.get(url).copied().unwrap_or(default)
    }

    /// Returns the previous setting.
    pub fn set(&mut self, url: impl Into<String>, enabled: bool) -> Option<bool> {
        self.0.insert(url.into(), enabled)
    }

    /// Record `enabled` only if `url` has no entry yet. Returns true if it
    /// was inserted.
    pub fn seed(&mut self, url: &str, enabled: bool) -> bool {
        if self.0.contains_key(url) {
            return false;
        }
        self.0.insert(url.to_string(), enabled);
        true
    }

    pub fn remove(&mut self, url: &str) -> Option<bool> {
        self.0.remove(url)
    }

    pub fn enabled_urls(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(url, enabled)| (url.as_str(), *enabled))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, bool)> for ModuleToggles {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_does_not_override() {
        let mut toggles = ModuleToggles::new();
        toggles.set("https://x/a.json", false);
        assert!(!toggles.seed("https://x/a.json", true));
        assert!(toggles.seed("https://x/b.json", true));
        assert_eq!(toggles.enabled_urls(), vec!["https://x/b.json"]);
        assert!(!toggles.is_enabled("https://x/a.json", true));
        assert!(toggles.is_enabled("https://x/unknown.json", true));
    }

    #[test]
    fn serializes_as_plain_map() {
        let toggles: ModuleToggles = [("https://x/a.json".to_string(), true)].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&toggles).unwrap(),
            serde_json::json!({"https://x/a.json": true})
        );
    }
}
