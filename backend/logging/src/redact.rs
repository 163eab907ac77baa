//! Redaction of module payloads.
//!
//! Event payloads come from third-party module code, so they pass through
//! here before reaching the console. Values under credential-like keys are
//! masked outright; every remaining string is scrubbed for tokens and phone
//! numbers.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const MASK: &str = "[REDACTED]";

static TELEPHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});
static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});
static SENSITIVE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(token|password|secret|authorization|api[_-]?key|cookie)$").unwrap()
});

/// Scrub tokens and phone numbers from free text.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = TELEPHONE_RE.replace_all(input, "[REDACTED_PHONE]");
    API_KEY_RE
        .replace_all(&redacted, "[REDACTED_TOKEN]")
        .into_owned()
}

/// Redacted copy of a JSON payload.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_sensitive_data(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let v = if SENSITIVE_KEY_RE.is_match(key) {
                        Value::String(MASK.to_string())
                    } else {
                        redact_value(v)
                    };
                    (key.clone(), v)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
