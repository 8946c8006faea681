// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Canonical satellite names (`type.name`) and run identifiers, per
//! spec.md §3 "Canonical name".

use std::fmt;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum NameError {
    #[error("canonical name must be of the form 'type.name', got '{0}'")]
    MissingSeparator(String),
    #[error("canonical name part '{0}' must match [A-Za-z0-9_]+")]
    InvalidPart(String),
    #[error("run identifier '{0}' must match [A-Za-z0-9_-]+")]
    InvalidRunId(String),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_run_id_char(c: char) -> bool {
    is_name_char(c) || c == '-'
}

/// `type.name`, matched case-insensitively for equality and hashing.
#[derive(Debug, Clone)]
pub struct CanonicalName {
    satellite_type: String,
    satellite_name: String,
}

impl CanonicalName {
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let (ty, name) = raw
            .split_once('.')
            .ok_or_else(|| NameError::MissingSeparator(raw.to_string()))?;
        if ty.is_empty() || !ty.chars().all(is_name_char) {
            return Err(NameError::InvalidPart(ty.to_string()));
        }
        if name.is_empty() || !name.chars().all(is_name_char) {
            return Err(NameError::InvalidPart(name.to_string()));
        }
        Ok(Self { satellite_type: ty.to_string(), satellite_name: name.to_string() })
    }

    pub fn new(satellite_type: impl Into<String>, satellite_name: impl Into<String>) -> Result<Self, NameError> {
        let satellite_type = satellite_type.into();
        let satellite_name = satellite_name.into();
        if satellite_type.is_empty() || !satellite_type.chars().all(is_name_char) {
            return Err(NameError::InvalidPart(satellite_type));
        }
        if satellite_name.is_empty() || !satellite_name.chars().all(is_name_char) {
            return Err(NameError::InvalidPart(satellite_name));
        }
        Ok(Self { satellite_type, satellite_name })
    }

    pub fn satellite_type(&self) -> &str {
        &self.satellite_type
    }

    pub fn satellite_name(&self) -> &str {
        &self.satellite_name
    }

    fn lower(&self) -> String {
        format!("{}.{}", self.satellite_type, self.satellite_name).to_ascii_lowercase()
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.satellite_type, self.satellite_name)
    }
}

impl PartialEq for CanonicalName {
    fn eq(&self, other: &Self) -> bool {
        self.lower() == other.lower()
    }
}
impl Eq for CanonicalName {}

impl std::hash::Hash for CanonicalName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.lower().hash(state);
    }
}

/// Validate a run identifier: `[A-Za-z0-9_-]+` (spec.md §3: run identifiers
/// additionally allow `-`).
pub fn validate_run_id(raw: &str) -> Result<(), NameError> {
    if raw.is_empty() || !raw.chars().all(is_run_id_char) {
        return Err(NameError::InvalidRunId(raw.to_string()));
    }
    Ok(())
}
