// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command Registry: name → `{callable, arity, description, allowed-states}`
//! (spec.md §4.5).

use crate::state::State;
use constellation_value::{Value, ValueError};
use std::collections::HashMap;
use thiserror::Error;

/// Standard and transition verbs a user-defined command name must not
/// collide with (spec.md §4.3).
const RESERVED_VERBS: &[&str] = &[
    "get_name",
    "get_version",
    "get_commands",
    "get_state",
    "get_status",
    "get_config",
    "get_run_id",
    "shutdown",
    "initialize",
    "launch",
    "land",
    "reconfigure",
    "start",
    "stop",
    "interrupt",
    "failure",
    "initialized",
    "launched",
    "landed",
    "reconfigured",
    "started",
    "stopped",
    "interrupted",
];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("command name must not be empty")]
    EmptyName,
    #[error("command name '{0}' contains a character outside [A-Za-z0-9_]")]
    InvalidCharacters(String),
    #[error("command '{0}' is already registered")]
    Duplicate(String),
    #[error("command name '{0}' collides with a standard or transition verb")]
    ReservedName(String),
}

/// Error raised while dispatching an already-registered command.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("command '{name}' is not allowed in state {state}")]
    WrongState { name: String, state: State },
    #[error("command '{name}' expects {expected} argument(s), {given} given")]
    ArityMismatch { name: String, expected: usize, given: usize },
    #[error("command '{name}' argument {index}: {source}")]
    ArgumentType { name: String, index: usize, source: ValueError },
    #[error("command '{name}' return value could not be converted to a Value: {reason}")]
    UnsupportedReturn { name: String, reason: String },
}

/// The declared shape of one positional argument, used to coerce an
/// incoming `Value` before the callable runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    Double,
    String,
}

impl ParamType {
    fn coerce(self, v: &Value) -> Result<(), ValueError> {
        match self {
            ParamType::Bool => v.as_bool().map(|_| ()),
            ParamType::Int => v.as_int().map(|_| ()),
            ParamType::Double => v.as_double().map(|_| ()),
            ParamType::String => v.as_str().map(|_| ()),
        }
    }
}

pub type Callable = Box<dyn FnMut(&[Value]) -> Result<Value, String> + Send>;

pub struct CommandEntry {
    pub callable: Callable,
    pub params: Vec<ParamType>,
    pub description: String,
    pub allowed_states: Vec<State>,
}

impl CommandEntry {
    fn is_hidden(name: &str) -> bool {
        name.starts_with('_')
    }
}

fn is_valid_charset(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// User-defined command table, keyed by lower-cased name.
#[derive(Default)]
pub struct CommandRegistry {
    entries: HashMap<String, CommandEntry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Rejected per spec.md §4.5: empty name, invalid
    /// charset, duplicate, or collision with a standard/transition verb.
    pub fn register(
        &mut self,
        name: &str,
        callable: Callable,
        params: Vec<ParamType>,
        description: impl Into<String>,
        allowed_states: Vec<State>,
    ) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let lower = name.to_ascii_lowercase();
        if !is_valid_charset(&lower) {
            return Err(RegistryError::InvalidCharacters(name.to_string()));
        }
        if RESERVED_VERBS.contains(&lower.as_str()) {
            return Err(RegistryError::ReservedName(name.to_string()));
        }
        if self.entries.contains_key(&lower) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.entries.insert(lower, CommandEntry { callable, params, description: description.into(), allowed_states });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Names visible in `get_commands`: hidden (`_`-prefixed) names are
    /// omitted from the listing but remain invocable.
    pub fn visible_commands(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(name, _)| !CommandEntry::is_hidden(name))
            .map(|(name, entry)| (name.clone(), entry.description.clone()))
            .collect();
        out.sort();
        out
    }

    /// Coerce `args` element-wise to the declared parameter types, check the
    /// current state is in the command's allowed set, and invoke it.
    pub fn dispatch(&mut self, name: &str, current_state: State, args: &[Value]) -> Result<Value, DispatchError> {
        let lower = name.to_ascii_lowercase();
        let entry = self.entries.get_mut(&lower).ok_or_else(|| DispatchError::Unknown(name.to_string()))?;

        if !entry.allowed_states.is_empty() && !entry.allowed_states.contains(&current_state) {
            return Err(DispatchError::WrongState { name: lower, state: current_state });
        }
        if args.len() != entry.params.len() {
            return Err(DispatchError::ArityMismatch { name: lower, expected: entry.params.len(), given: args.len() });
        }
        for (index, (param, arg)) in entry.params.iter().zip(args).enumerate() {
            param.coerce(arg).map_err(|source| DispatchError::ArgumentType { name: lower.clone(), index, source })?;
        }
        (entry.callable)(args).map_err(|reason| DispatchError::UnsupportedReturn { name: lower.clone(), reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_int() -> Callable {
        Box::new(|args: &[Value]| args[0].as_int().map(Value::Int).map_err(|e| e.to_string()))
    }

    #[test]
    fn registration_rejects_empty_name() {
        let mut reg = CommandRegistry::new();
        assert_eq!(reg.register("", echo_int(), vec![ParamType::Int], "", vec![]), Err(RegistryError::EmptyName));
    }

    #[test]
    fn registration_rejects_invalid_characters() {
        let mut reg = CommandRegistry::new();
        let err = reg.register("echo-int", echo_int(), vec![ParamType::Int], "", vec![]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidCharacters(_)));
    }

    #[test]
    fn registration_rejects_reserved_verbs() {
        let mut reg = CommandRegistry::new();
        let err = reg.register("initialize", echo_int(), vec![], "", vec![]).unwrap_err();
        assert_eq!(err, RegistryError::ReservedName("initialize".to_string()));
    }

    #[test]
    fn registration_rejects_duplicates() {
        let mut reg = CommandRegistry::new();
        reg.register("echo_int", echo_int(), vec![ParamType::Int], "", vec![]).unwrap();
        let err = reg.register("echo_int", echo_int(), vec![ParamType::Int], "", vec![]).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("echo_int".to_string()));
    }

    #[test]
    fn hidden_commands_are_invocable_but_not_listed() {
        let mut reg = CommandRegistry::new();
        reg.register("_internal_ping", Box::new(|_| Ok(Value::Bool(true))), vec![], "", vec![]).unwrap();
        assert!(reg.visible_commands().is_empty());
        assert!(reg.contains("_internal_ping"));
        assert_eq!(reg.dispatch("_internal_ping", State::Orbit, &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn arity_mismatch_reports_expected_and_given() {
        let mut reg = CommandRegistry::new();
        reg.register("echo_int", echo_int(), vec![ParamType::Int], "", vec![]).unwrap();
        let err = reg.dispatch("echo_int", State::Orbit, &[Value::Int(1), Value::Int(2)]).unwrap_err();
        assert_eq!(err, DispatchError::ArityMismatch { name: "echo_int".to_string(), expected: 1, given: 2 });
    }

    #[test]
    fn argument_type_mismatch_is_reported_with_index() {
        let mut reg = CommandRegistry::new();
        reg.register("echo_int", echo_int(), vec![ParamType::Int], "", vec![]).unwrap();
        let err = reg.dispatch("echo_int", State::Orbit, &[Value::String("x".into())]).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { index: 0, .. }));
    }

    #[test]
    fn state_scope_mismatch_is_reported() {
        let mut reg = CommandRegistry::new();
        reg.register("echo_int", echo_int(), vec![ParamType::Int], "", vec![State::Run]).unwrap();
        let err = reg.dispatch("echo_int", State::Orbit, &[Value::Int(1)]).unwrap_err();
        assert_eq!(err, DispatchError::WrongState { name: "echo_int".to_string(), state: State::Orbit });
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut reg = CommandRegistry::new();
        assert_eq!(reg.dispatch("nope", State::Orbit, &[]).unwrap_err(), DispatchError::Unknown("nope".to_string()));
    }
}
