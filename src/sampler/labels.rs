//! Label sets identifying a measurement group
//!
//! Labels are stored sorted so the same pairs always produce the same group
//! key, whatever order the caller built them in.
//!
//! Key format: `key=value` pairs sorted by key, joined with `,`. A `\`, `,`
//! or `=` inside a key or value is escaped with `\`, so two different label
//! sets never share a key.
//!
//! Examples:
//! - `op=read`
//! - `host=web01,op=write`
//! - `query=a\=1\,b\=2`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An immutable set of key-value labels with a precomputed group key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Labels {
    entries: BTreeMap<String, String>,
    key: String,
}

impl Labels {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        let key = Self::compute_key(&entries);
        Labels { entries, key }
    }

    pub fn empty() -> Self {
        Labels {
            entries: BTreeMap::new(),
            key: String::new(),
        }
    }

    /// Create labels from a slice of (key, value) tuples
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().copied().collect()
    }

    /// Parse labels from "key=value,key2=value2" format
    ///
    /// Pairs without `=` or with an empty key are skipped.
    pub fn parse(s: &str) -> Self {
        s.split(',')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    None
                } else {
                    Some((key, value.trim()))
                }
            })
            .collect()
    }

    /// Canonical group key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn compute_key(entries: &BTreeMap<String, String>) -> String {
        let mut key = String::new();
        for (i, (k, v)) in entries.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            push_escaped(&mut key, k);
            key.push('=');
            push_escaped(&mut key, v);
        }
        key
    }
}

fn push_escaped(key: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, '\\' | ',' | '=') {
            key.push('\\');
        }
        key.push(c);
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Labels {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self::new(entries)
    }
}

impl From<Labels> for BTreeMap<String, String> {
    fn from(labels: Labels) -> Self {
        labels.entries
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
