//! `${VAR}` substitution on string leaves of the config tree.
//!
//! Only uppercase `[A-Z_][A-Z0-9_]*` names are recognised. `$${VAR}` is an
//! escape and becomes the literal text `${VAR}`.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

/// Group 1 is the optional escape `$`, group 2 the variable name.
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute against the process environment. Unset or empty variables
/// are an error.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, |name| std::env::var(name).ok())
}

/// Substitute using `lookup` instead of the process environment.
pub fn resolve_env_vars_with(value: &Value, lookup: impl Fn(&str) -> Option<String>) -> Result<Value> {
    let mut out = value.clone();
    substitute(&mut out, &lookup, &mut String::new())?;
    Ok(out)
}

fn substitute(
    value: &mut Value,
    lookup: &dyn Fn(&str) -> Option<String>,
    path: &mut String,
) -> Result<(), MissingEnvVarError> {
    match value {
        Value::String(s) if s.contains('$') => *s = substitute_str(s, lookup, path)?,
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                substitute(item, lookup, path)?;
                path.truncate(len);
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                let len = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(key);
                substitute(item, lookup, path)?;
                path.truncate(len);
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_str(
    s: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    let mut missing = None;
    let replaced = REFERENCE.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match lookup(name).filter(|v| !v.is_empty()) {
            Some(v) => v,
            None => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });
    match missing {
        Some(err) => Err(err),
        None => Ok(replaced.into_owned()),
    }
}

/// All variable names referenced in the tree, sorted and deduplicated.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.extend(
                REFERENCE
                    .captures_iter(s)
                    .filter(|c| c[1].is_empty())
                    .map(|c| c[2].to_string()),
            ),
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut vars = Vec::new();
    walk(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}
