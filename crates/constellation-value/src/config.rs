// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `Configuration`: a [`Dictionary`] annotated with a used-keys set, typed
//! getters, and validation helpers.

use crate::dictionary::{Dictionary, Entry};
use crate::value::{Value, ValueArray, ValueError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filter applied by [`Configuration::to_string_filtered`] and satellite
/// `get_config` (spec.md §4.6): `All` renders everything, `User` hides
/// keys starting with `_`, `Internal` renders only keys starting with `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    User,
    Internal,
}

/// The configuration error taxonomy from spec.md §7 ("Configuration
/// error"): unknown key, type mismatch, value out of range, or a failed
/// path-existence check.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("configuration key '{key}': {source}")]
    TypeMismatch { key: String, source: ValueError },
    #[error("configuration key '{0}' must be a dictionary")]
    NotASection(String),
    #[error("path for key '{key}' does not exist: {path}")]
    PathDoesNotExist { key: String, path: String },
    #[error("Cyclic dependency detected: {0}")]
    CyclicDependency(String),
}

/// A [`Dictionary`] plus the set of keys that have been read via a typed
/// getter. Reading marks usage (spec.md Invariant 3); an end-of-lifecycle
/// sweep (`unused_keys`) returns everything that was never read, for
/// warning diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    dict: Dictionary,
    used: HashSet<String>,
}

impl Configuration {
    pub fn new(dict: Dictionary) -> Self {
        Self { dict, used: HashSet::new() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    fn mark_used(&mut self, key: &str) {
        self.used.insert(key.to_ascii_lowercase());
    }

    /// Keys read so far via a typed getter. Subset of `self.dict`'s keys
    /// (spec.md Invariant: "used-keys set of a Configuration is a subset
    /// of its keys").
    pub fn used_keys(&self) -> &HashSet<String> {
        &self.used
    }

    /// Keys never read via a typed getter — surfaced at shutdown as
    /// warnings per spec.md §3.
    pub fn unused_keys(&self) -> Vec<String> {
        self.dict
            .keys()
            .map(str::to_ascii_lowercase)
            .filter(|k| !self.used.contains(k))
            .collect()
    }

    fn entry(&mut self, key: &str) -> Result<&Entry, ConfigError> {
        self.mark_used(key);
        self.dict.get(key).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
    }

    fn value(&mut self, key: &str) -> Result<&Value, ConfigError> {
        match self.entry(key)? {
            Entry::Value(v) => Ok(v),
            Entry::Dict(_) => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                source: ValueError::KindMismatch { expected: "scalar", found: "dictionary" },
            }),
        }
    }

    pub fn get_bool(&mut self, key: &str) -> Result<bool, ConfigError> {
        self.value(key)?.as_bool().map_err(|e| ConfigError::TypeMismatch { key: key.to_string(), source: e })
    }

    pub fn get_i64(&mut self, key: &str) -> Result<i64, ConfigError> {
        self.value(key)?.as_int().map_err(|e| ConfigError::TypeMismatch { key: key.to_string(), source: e })
    }

    /// Typed integer getter with implicit narrowing and a range check
    /// (spec.md §3, §8 boundary-behaviour scenario).
    pub fn get_narrow<T>(&mut self, key: &str) -> Result<T, ConfigError>
    where
        T: TryFrom<i64>,
    {
        self.value(key)?.get_narrow::<T>().map_err(|e| ConfigError::TypeMismatch { key: key.to_string(), source: e })
    }

    pub fn get_f64(&mut self, key: &str) -> Result<f64, ConfigError> {
        self.value(key)?.as_double().map_err(|e| ConfigError::TypeMismatch { key: key.to_string(), source: e })
    }

    pub fn get_string(&mut self, key: &str) -> Result<String, ConfigError> {
        self.value(key)?.as_str().map(str::to_string).map_err(|e| ConfigError::TypeMismatch { key: key.to_string(), source: e })
    }

    /// Decode an enum from its stored variant name.
    pub fn get_enum<T: Clone>(&mut self, key: &str, variants: &[(&str, T)]) -> Result<T, ConfigError> {
        self.value(key)?.as_enum(variants).map_err(|e| ConfigError::TypeMismatch { key: key.to_string(), source: e })
    }

    pub fn get_i64_array(&mut self, key: &str) -> Result<Vec<i64>, ConfigError> {
        match self.value(key)? {
            Value::Array(ValueArray::Int(v)) => Ok(v.clone()),
            other => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                source: ValueError::KindMismatch { expected: "int[]", found: other.kind_name() },
            }),
        }
    }

    pub fn get_f64_array(&mut self, key: &str) -> Result<Vec<f64>, ConfigError> {
        match self.value(key)? {
            Value::Array(ValueArray::Double(v)) => Ok(v.clone()),
            other => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                source: ValueError::KindMismatch { expected: "double[]", found: other.kind_name() },
            }),
        }
    }

    pub fn get_string_array(&mut self, key: &str) -> Result<Vec<String>, ConfigError> {
        match self.value(key)? {
            Value::Array(ValueArray::String(v)) => Ok(v.clone()),
            other => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                source: ValueError::KindMismatch { expected: "string[]", found: other.kind_name() },
            }),
        }
    }

    /// Default-valued getter: inserts `default` under `key` if absent, then
    /// marks it used and returns it — matching spec.md's "default-valued
    /// getters that insert the default and mark it used".
    pub fn get_bool_or(&mut self, key: &str, default: bool) -> bool {
        if !self.dict.contains_key(key) {
            self.dict.set(key.to_string(), Value::Bool(default));
        }
        self.get_bool(key).unwrap_or(default)
    }

    pub fn get_i64_or(&mut self, key: &str, default: i64) -> i64 {
        if !self.dict.contains_key(key) {
            self.dict.set(key.to_string(), Value::Int(default));
        }
        self.get_i64(key).unwrap_or(default)
    }

    pub fn get_string_or(&mut self, key: &str, default: impl Into<String>) -> String {
        let default = default.into();
        if !self.dict.contains_key(key) {
            self.dict.set(key.to_string(), Value::String(default.clone()));
        }
        self.get_string(key).unwrap_or(default)
    }

    /// Optional getter: returns `Ok(None)` instead of `UnknownKey` when the
    /// key is absent; still marks the key used so a later sweep doesn't
    /// flag it.
    pub fn get_optional_string(&mut self, key: &str) -> Result<Option<String>, ConfigError> {
        self.mark_used(key);
        if !self.dict.contains_key(key) {
            return Ok(None);
        }
        self.get_string(key).map(Some)
    }

    pub fn get_optional_i64(&mut self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.mark_used(key);
        if !self.dict.contains_key(key) {
            return Ok(None);
        }
        self.get_i64(key).map(Some)
    }

    /// Path-typed getter: normalises to an absolute path, optionally
    /// requiring existence on disk.
    pub fn get_path(&mut self, key: &str, require_exists: bool) -> Result<PathBuf, ConfigError> {
        let raw = self.get_string(key)?;
        let path = Path::new(&raw);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        };
        if require_exists && !absolute.exists() {
            return Err(ConfigError::PathDoesNotExist { key: key.to_string(), path: absolute.display().to_string() });
        }
        Ok(absolute)
    }

    /// Sub-section access: a `Configuration` view over a nested dictionary.
    /// The returned view's used-keys tracking is independent, matching the
    /// per-Configuration `used` invariant.
    pub fn section(&mut self, key: &str) -> Result<Configuration, ConfigError> {
        self.mark_used(key);
        match self.dict.get(key) {
            Some(Entry::Dict(d)) => Ok(Configuration::new(d.clone())),
            Some(Entry::Value(_)) => Err(ConfigError::NotASection(key.to_string())),
            None => Err(ConfigError::UnknownKey(key.to_string())),
        }
    }

    /// Split keys into `(user, internal)` dictionaries based on a leading
    /// `_`, used by the satellite's `get_config` (spec.md §4.6).
    pub fn split_internal(&self) -> (Dictionary, Dictionary) {
        let mut user = Dictionary::new();
        let mut internal = Dictionary::new();
        for (key, entry) in self.dict.iter() {
            if key.starts_with('_') {
                internal.set(key.to_string(), entry.clone());
            } else {
                user.set(key.to_string(), entry.clone());
            }
        }
        (user, internal)
    }

    pub fn to_string_filtered(&self, filter: KeyFilter) -> String {
        let (user, internal) = self.split_internal();
        match filter {
            KeyFilter::All => self.dict.render(),
            KeyFilter::User => user.render(),
            KeyFilter::Internal => internal.render(),
        }
    }

    /// Type-preserving update from another `Configuration`: scalar
    /// overwrites scalar of the same kind, array overwrites array of the
    /// same element kind, and nested dictionaries merge recursively. A
    /// shape mismatch is a [`ConfigError::TypeMismatch`].
    pub fn update_from(&mut self, other: &Configuration) -> Result<(), ConfigError> {
        for (key, entry) in other.dict.iter() {
            match (self.dict.get(key), entry) {
                (None, _) => self.dict.set(key.to_string(), entry.clone()),
                (Some(Entry::Value(existing)), Entry::Value(incoming)) => {
                    if std::mem::discriminant(existing) != std::mem::discriminant(incoming) {
                        return Err(ConfigError::TypeMismatch {
                            key: key.to_string(),
                            source: ValueError::KindMismatch {
                                expected: existing.kind_name(),
                                found: incoming.kind_name(),
                            },
                        });
                    }
                    self.dict.set(key.to_string(), incoming.clone());
                }
                (Some(Entry::Dict(existing)), Entry::Dict(incoming)) => {
                    let mut sub = Configuration::new(existing.clone());
                    sub.update_from(&Configuration::new(incoming.clone()))?;
                    self.dict.set(key.to_string(), sub.dict);
                }
                (Some(existing), incoming) => {
                    let expected = match existing {
                        Entry::Value(v) => v.kind_name(),
                        Entry::Dict(_) => "dictionary",
                    };
                    let found = match incoming {
                        Entry::Value(v) => v.kind_name(),
                        Entry::Dict(_) => "dictionary",
                    };
                    return Err(ConfigError::TypeMismatch {
                        key: key.to_string(),
                        source: ValueError::KindMismatch { expected, found },
                    });
                }
            }
        }
        Ok(())
    }
}

/// Validate a dependency graph expressed as `name -> [starts-after names]`
/// for cycles, used by the controller's pre-flight checks over a set of
/// satellite configurations (spec.md §8 scenario 6).
pub fn validate_no_cycles(deps: &std::collections::HashMap<String, Vec<String>>) -> Result<(), ConfigError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    let mut marks: std::collections::HashMap<&str, Mark> =
        deps.keys().map(|k| (k.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        node: &'a str,
        deps: &'a std::collections::HashMap<String, Vec<String>>,
        marks: &mut std::collections::HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), ConfigError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                path.push(node);
                let cycle_start = path.iter().position(|n| *n == node).unwrap_or(0);
                let cycle = path[cycle_start..].join(" -> ");
                return Err(ConfigError::CyclicDependency(cycle));
            }
            _ => {}
        }
        marks.insert(node, Mark::InProgress);
        path.push(node);
        if let Some(children) = deps.get(node) {
            for child in children {
                visit(child.as_str(), deps, marks, path)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for name in deps.keys() {
        let mut path = Vec::new();
        visit(name.as_str(), deps, &mut marks, &mut path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict_with(key: &str, v: Value) -> Dictionary {
        let mut d = Dictionary::new();
        d.insert(key, v).unwrap();
        d
    }

    #[test]
    fn get_marks_key_used() {
        let mut cfg = Configuration::new(dict_with("a", Value::Int(1)));
        assert!(!cfg.used_keys().contains("a"));
        let _ = cfg.get_i64("a").unwrap();
        assert!(cfg.used_keys().contains("a"));
    }

    #[test]
    fn unused_keys_returns_everything_never_read() {
        let mut d = Dictionary::new();
        d.insert("a", Value::Int(1)).unwrap();
        d.insert("b", Value::Int(2)).unwrap();
        let mut cfg = Configuration::new(d);
        let _ = cfg.get_i64("a").unwrap();
        assert_eq!(cfg.unused_keys(), vec!["b".to_string()]);
    }

    #[test]
    fn narrow_getter_range_checks() {
        let mut cfg = Configuration::new(dict_with("a", Value::Int(i64::from(i32::MAX) + 1)));
        let result: Result<i32, _> = cfg.get_narrow("a");
        assert!(matches!(result, Err(ConfigError::TypeMismatch { .. })));
    }

    #[test]
    fn default_getter_inserts_and_marks_used() {
        let mut cfg = Configuration::empty();
        let v = cfg.get_i64_or("missing", 7);
        assert_eq!(v, 7);
        assert!(cfg.dictionary().contains_key("missing"));
        assert!(cfg.used_keys().contains("missing"));
    }

    #[test]
    fn optional_getter_returns_none_for_absent_key() {
        let mut cfg = Configuration::empty();
        assert_eq!(cfg.get_optional_string("nope").unwrap(), None);
    }

    #[test]
    fn split_internal_separates_underscore_keys() {
        let mut d = Dictionary::new();
        d.insert("a", Value::Int(1)).unwrap();
        d.insert("_c", Value::Bool(true)).unwrap();
        let cfg = Configuration::new(d);
        let rendered_user = cfg.to_string_filtered(KeyFilter::User);
        let rendered_internal = cfg.to_string_filtered(KeyFilter::Internal);
        assert!(rendered_user.contains('a'));
        assert!(!rendered_user.contains("_c"));
        assert!(rendered_internal.contains("_c"));
    }

    #[test]
    fn update_from_rejects_kind_change() {
        let mut cfg = Configuration::new(dict_with("a", Value::Int(1)));
        let incoming = Configuration::new(dict_with("a", Value::String("x".into())));
        assert!(matches!(cfg.update_from(&incoming), Err(ConfigError::TypeMismatch { .. })));
    }

    #[test]
    fn update_from_merges_nested_dictionaries() {
        let mut inner_old = Dictionary::new();
        inner_old.insert("x", Value::Int(1)).unwrap();
        let mut outer_old = Dictionary::new();
        outer_old.insert("section", inner_old).unwrap();
        let mut cfg = Configuration::new(outer_old);

        let mut inner_new = Dictionary::new();
        inner_new.insert("x", Value::Int(2)).unwrap();
        let mut outer_new = Dictionary::new();
        outer_new.insert("section", inner_new).unwrap();
        let incoming = Configuration::new(outer_new);

        cfg.update_from(&incoming).unwrap();
        let mut section = cfg.section("section").unwrap();
        assert_eq!(section.get_i64("x").unwrap(), 2);
    }

    #[test]
    fn cyclic_dependency_is_detected() {
        let mut deps = std::collections::HashMap::new();
        deps.insert("x".to_string(), vec!["y".to_string()]);
        deps.insert("y".to_string(), vec!["x".to_string()]);
        let err = validate_no_cycles(&deps).unwrap_err();
        match err {
            ConfigError::CyclicDependency(msg) => assert!(msg.contains("x") && msg.contains("y")),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn acyclic_dependency_graph_validates() {
        let mut deps = std::collections::HashMap::new();
        deps.insert("x".to_string(), vec!["y".to_string()]);
        deps.insert("y".to_string(), vec![]);
        assert!(validate_no_cycles(&deps).is_ok());
    }

    #[test]
    fn configuration_round_trip_scenario() {
        let mut d = Dictionary::new();
        d.insert("a", Value::Int(1)).unwrap();
        d.insert(
            "b",
            Value::Array(ValueArray::Double(vec![1.5, 2.5])),
        )
        .unwrap();
        d.insert("_c", Value::Bool(true)).unwrap();
        let mut cfg = Configuration::new(d);

        assert_eq!(cfg.get_i64("a").unwrap(), 1);
        assert_eq!(cfg.get_f64_array("b").unwrap(), vec![1.5, 2.5]);
        assert!(cfg.get_bool("_c").unwrap());

        let rendered = cfg.to_string_filtered(KeyFilter::User);
        assert!(rendered.contains('a'));
        assert!(rendered.contains('b'));
        assert!(!rendered.contains("_c"));
    }
}
