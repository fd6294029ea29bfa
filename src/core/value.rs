use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// A dynamically-typed configuration value extracted from a workflow.
///
/// XAML attribute dictionaries and nested property elements are untyped;
/// this variant preserves them losslessly through recursive serialization.
/// Maps use `BTreeMap` so serialized output is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Parse a raw attribute/text value into the most specific variant.
    ///
    /// XAML carries everything as text; booleans and plain numbers are
    /// promoted, everything else stays a string.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "True" | "true" => return ConfigValue::Bool(true),
            "False" | "false" => return ConfigValue::Bool(false),
            _ => {}
        }

        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() {
                return ConfigValue::Number(n);
            }
        }

        ConfigValue::String(raw.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Canonical single-line rendering used by the identity hasher.
    ///
    /// Deterministic for equal values: map keys are already sorted, lists
    /// keep document order.
    pub fn canonical_string(&self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Number(n) => {
                // Render integral values without a trailing ".0" so that
                // "5" hashes identically however it was promoted.
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            ConfigValue::String(s) => s.clone(),
            ConfigValue::List(items) => {
                let parts: Vec<String> =
                    items.iter().map(|v| v.canonical_string()).collect();
                format!("[{}]", parts.join(","))
            }
            ConfigValue::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.canonical_string()))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(raw: &str) -> Self {
        ConfigValue::from_raw(raw)
    }
}
