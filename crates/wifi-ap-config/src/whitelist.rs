//! Key whitelist derived from the default configuration layer.
//!
//! Every key the default file defines is a key clients may set. The set is
//! loaded once at daemon startup and never changes afterwards.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::ConfigError;
use crate::codec;
use crate::value::ConfigMap;

/// Why a write request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No default configuration file available")]
    MissingWhitelist,

    #[error("Invalid key \"{0}\"")]
    InvalidKey(String),
}

/// The set of representation-format keys accepted in write requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    keys: BTreeSet<String>,
}

impl Whitelist {
    /// A whitelist with no keys; every write is refused.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse the keys of a default configuration file, discarding values.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let whitelist = Self::parse(&String::from_utf8_lossy(&content));
        info!(path = %path.display(), keys = whitelist.len(), "Loaded configuration whitelist");
        Ok(whitelist)
    }

    /// Parse the keys out of default-file text.
    pub fn parse(content: &str) -> Self {
        codec::logical_lines(content)
            .filter_map(|line| codec::split_line(&line).map(|(key, _)| codec::storage_to_repr(key)))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Check that every key of `items` is whitelisted.
    ///
    /// An empty whitelist rejects every request. Otherwise the first unknown
    /// key (in lexicographic order) is reported and nothing may be applied.
    pub fn validate(&self, items: &ConfigMap) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::MissingWhitelist);
        }
        match items.keys().find(|key| !self.contains(key)) {
            Some(key) => Err(ValidationError::InvalidKey(key.clone())),
            None => Ok(()),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Whitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}
