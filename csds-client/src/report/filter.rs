//! Node id filtering.

use regex::Regex;

use crate::client::config::FilterMode;
use crate::error::Result;

/// A compiled node id filter.
#[derive(Debug, Clone)]
pub enum NodeFilter {
    /// Keep ids starting with the pattern.
    Prefix(String),
    /// Keep ids ending with the pattern.
    Suffix(String),
    /// Keep ids matching the regular expression anywhere.
    Regex(Regex),
}

impl NodeFilter {
    /// Compile `pattern` for `mode`.
    ///
    /// Returns `None` for an empty pattern, which keeps every id.
    pub fn new(mode: FilterMode, pattern: &str) -> Result<Option<Self>> {
        if pattern.is_empty() {
            return Ok(None);
        }
        let filter = match mode {
            FilterMode::Prefix => Self::Prefix(pattern.to_string()),
            FilterMode::Suffix => Self::Suffix(pattern.to_string()),
            FilterMode::Regex => Self::Regex(Regex::new(pattern)?),
        };
        Ok(Some(filter))
    }

    /// Whether `node_id` passes the filter.
    pub fn matches(&self, node_id: &str) -> bool {
        match self {
            Self::Prefix(prefix) => node_id.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => node_id.ends_with(suffix.as_str()),
            Self::Regex(regex) => regex.is_match(node_id),
        }
    }
}
