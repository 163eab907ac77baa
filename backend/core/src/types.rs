use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a module in the live registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive an id from a module URL: the last non-empty path segment
    /// with its extension stripped (`.../plugins/AutoTag.js` → `AutoTag`).
    ///
    /// Falls back to the host name, then to the raw string, so the result
    /// is never empty for a non-empty input.
    pub fn from_url(raw: &str) -> Self {
        let parsed = url::Url::parse(raw).ok();
        let segment = match &parsed {
            Some(u) => u
                .path_segments()
                .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string)),
            None => raw
                .split(['?', '#'])
                .next()
                .and_then(|p| p.rsplit('/').find(|s| !s.is_empty()))
                .map(str::to_string),
        };

        let id = match segment {
            Some(seg) => match seg.rsplit_once('.') {
                Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
                _ => seg,
            },
            None => parsed
                .as_ref()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| raw.to_string()),
        };
        Self(id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Descriptive data for a module. Built-in modules have no `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    pub id: ModuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Build or version token.
    #[serde(default)]
    pub build: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub required_dependencies: Vec<ModuleId>,
    #[serde(default)]
    pub optional_dependencies: Vec<ModuleId>,
}

impl ModuleMetadata {
    pub fn new(id: impl Into<ModuleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            authors: Vec::new(),
            build: String::new(),
            url: None,
            tags: Vec::new(),
            required_dependencies: Vec::new(),
            optional_dependencies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn requires(mut self, dependency: impl Into<ModuleId>) -> Self {
        self.required_dependencies.push(dependency.into());
        self
    }

    pub fn optionally_requires(mut self, dependency: impl Into<ModuleId>) -> Self {
        self.optional_dependencies.push(dependency.into());
        self
    }

    pub fn is_builtin(&self) -> bool {
        self.url.is_none()
    }

    pub fn has_dependencies(&self) -> bool {
        !self.required_dependencies.is_empty() || !self.optional_dependencies.is_empty()
    }
}
