// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end scenarios from spec.md §8, exercised directly against the FSM
//! and command registry (without the command-socket wire format, which
//! belongs to `constellation-satellite`).

use constellation_fsm::{CommandRegistry, DispatchError, Fsm, ParamType, SatelliteHooks, State, Transition};
use constellation_value::{Configuration, Value};

#[test]
fn illegal_command_is_rejected_and_state_is_unchanged() {
    let fsm = Fsm::new(SatelliteHooks::default());
    assert_eq!(fsm.state(), State::New);

    let err = fsm.react(Transition::Start, constellation_fsm::Payload::None).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("not allowed"), "expected an error mentioning 'not allowed', got: {message}");
    assert_eq!(fsm.state(), State::New);
}

#[test]
fn user_command_arity_mismatch_reports_expected_and_given() {
    let mut registry = CommandRegistry::new();
    registry
        .register(
            "echo_int",
            Box::new(|args| args[0].as_int().map(Value::Int).map_err(|e| e.to_string())),
            vec![ParamType::Int],
            "echoes one integer",
            vec![],
        )
        .unwrap();

    let err = registry.dispatch("echo_int", State::Orbit, &[Value::Int(1), Value::Int(2)]).unwrap_err();
    match err {
        DispatchError::ArityMismatch { expected, given, .. } => {
            assert_eq!(expected, 1);
            assert_eq!(given, 2);
        }
        other => panic!("expected ArityMismatch, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("expects 1"));
    assert!(message.contains("2 given"));
}

#[test]
fn configuration_round_trip_through_initialize() {
    use constellation_value::{Dictionary, ValueArray};

    let mut hooks = SatelliteHooks::default();
    hooks.initializing = Box::new(|cfg: &mut Configuration| {
        let _ = cfg.get_i64("a")?;
        Ok(())
    });
    let fsm = Fsm::new(hooks);

    let mut dict = Dictionary::new();
    dict.insert("a", Value::Int(1)).unwrap();
    dict.insert("b", Value::Array(ValueArray::Double(vec![1.5, 2.5]))).unwrap();
    dict.insert("_c", Value::Bool(true)).unwrap();

    fsm.react(Transition::Initialize, constellation_fsm::Payload::Config(Configuration::new(dict))).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while fsm.state() != State::Init && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(fsm.state(), State::Init);

    let mut stored = fsm.config();
    assert_eq!(stored.get_i64("a").unwrap(), 1);
    assert_eq!(stored.get_f64_array("b").unwrap(), vec![1.5, 2.5]);
    assert!(stored.get_bool("_c").unwrap());
}
