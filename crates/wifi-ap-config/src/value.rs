//! Configuration values and the merged key/value map.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A merged configuration view keyed by representation-format keys
/// (`wifi.ssid`). Iteration is lexicographic.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// A single configuration value.
///
/// On disk every value is text; the literals `true` and `false` are lifted
/// to [`ConfigValue::Bool`] when read so on/off flags travel as JSON
/// booleans over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
}

impl ConfigValue {
    /// Build a value from unescaped file text.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match text.as_str() {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(text),
        }
    }

    /// Borrow the text of a [`ConfigValue::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(_) => None,
        }
    }

    /// Get the flag of a [`ConfigValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
