// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered, case-insensitive string-keyed map of [`Value`]s or nested
//! dictionaries.

use crate::value::Value;
use std::fmt;

/// One dictionary entry: either a leaf value or a nested dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    Dict(Dictionary),
}

impl Entry {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Dict(_) => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Entry::Dict(d) => Some(d),
            Entry::Value(_) => None,
        }
    }
}

impl From<Value> for Entry {
    fn from(v: Value) -> Self {
        Entry::Value(v)
    }
}
impl From<Dictionary> for Entry {
    fn from(d: Dictionary) -> Self {
        Entry::Dict(d)
    }
}

/// Error raised on key insertion or lookup.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum DictionaryError {
    #[error("key '{0}' already present with differing case")]
    CaseCollision(String),
    #[error("key '{0}' not found")]
    MissingKey(String),
}

/// An ordered mapping from string key to [`Entry`].
///
/// Keys are stored lower-cased internally; the original casing of the first
/// insertion is retained alongside it purely for rendering, so that
/// `to_string()` output resembles what a human typed. Insertion order is
/// preserved (an ordered `Vec` of entries, not a hash map) so rendering and
/// iteration are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(String, String, Entry)>, // (lower key, original key, entry)
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, lower_key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _, _)| k == lower_key)
    }

    /// Insert a value under `key`. Returns [`DictionaryError::CaseCollision`]
    /// if an entry with the same lower-cased key but a *different* original
    /// casing already exists (per spec.md §3: "duplicate insertion with
    /// differing case is an error").
    pub fn insert(&mut self, key: impl Into<String>, entry: impl Into<Entry>) -> Result<(), DictionaryError> {
        let key = key.into();
        let lower = key.to_ascii_lowercase();
        let entry = entry.into();
        if let Some(idx) = self.find(&lower) {
            let (_, existing_original, _) = &self.entries[idx];
            if existing_original != &key {
                return Err(DictionaryError::CaseCollision(key));
            }
            self.entries[idx].2 = entry;
        } else {
            self.entries.push((lower, key, entry));
        }
        Ok(())
    }

    /// Like [`Self::insert`] but overwrites unconditionally, used by
    /// `Configuration::update_from` where the caller already validated
    /// shape compatibility.
    pub fn set(&mut self, key: impl Into<String>, entry: impl Into<Entry>) {
        let key = key.into();
        let lower = key.to_ascii_lowercase();
        if let Some(idx) = self.find(&lower) {
            self.entries[idx].2 = entry.into();
        } else {
            self.entries.push((lower, key, entry.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        let lower = key.to_ascii_lowercase();
        self.find(&lower).map(|idx| &self.entries[idx].2)
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        let lower = key.to_ascii_lowercase();
        self.find(&lower).map(|idx| self.entries.remove(idx).2)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.find(&key.to_ascii_lowercase()).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, orig, _)| orig.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(_, orig, e)| (orig.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattened view where nested dictionary keys are joined with `.`.
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        self.flatten_into(String::new(), &mut out);
        out
    }

    fn flatten_into(&self, prefix: String, out: &mut Vec<(String, Value)>) {
        for (_, orig, entry) in &self.entries {
            let full_key = if prefix.is_empty() { orig.clone() } else { format!("{prefix}.{orig}") };
            match entry {
                Entry::Value(v) => out.push((full_key, v.clone())),
                Entry::Dict(d) => d.flatten_into(full_key, out),
            }
        }
    }

    /// Multi-line rendering, two-space indent per nesting level.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        for (_, orig, entry) in &self.entries {
            match entry {
                Entry::Value(v) => out.push_str(&format!("{indent}{orig}: {v}\n")),
                Entry::Dict(d) => {
                    out.push_str(&format!("{indent}{orig}:\n"));
                    d.render_into(depth + 1, out);
                }
            }
        }
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lower_cases_keys() {
        let mut d = Dictionary::new();
        d.insert("Foo", Value::Int(1)).unwrap();
        assert!(d.contains_key("foo"));
        assert!(d.contains_key("FOO"));
    }

    #[test]
    fn duplicate_with_differing_case_is_an_error() {
        let mut d = Dictionary::new();
        d.insert("Foo", Value::Int(1)).unwrap();
        let err = d.insert("foo", Value::Int(2)).unwrap_err();
        assert_eq!(err, DictionaryError::CaseCollision("foo".into()));
    }

    #[test]
    fn reinsert_with_same_casing_overwrites() {
        let mut d = Dictionary::new();
        d.insert("foo", Value::Int(1)).unwrap();
        d.insert("foo", Value::Int(2)).unwrap();
        assert_eq!(d.get("foo").unwrap().as_value(), Some(&Value::Int(2)));
    }

    #[test]
    fn flatten_joins_nested_keys_with_dot() {
        let mut inner = Dictionary::new();
        inner.insert("bar", Value::Int(7)).unwrap();
        let mut outer = Dictionary::new();
        outer.insert("foo", inner).unwrap();
        let flat = outer.flatten();
        assert_eq!(flat, vec![("foo.bar".to_string(), Value::Int(7))]);
    }

    #[test]
    fn recursive_equality_holds_for_nested_dicts() {
        let mut a = Dictionary::new();
        a.insert("x", Value::Bool(true)).unwrap();
        let mut b = Dictionary::new();
        b.insert("x", Value::Bool(true)).unwrap();
        assert_eq!(a, b);
    }
}
