// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use constellation_fsm::{CommandRegistry, SatelliteHooks};
use constellation_proto::cursor::{Reader, Writer};
use constellation_proto::{decode_value, encode_dict, encode_value, Body, Header, Message, VerbType};
use constellation_satellite::{handle_request, Satellite};
use constellation_value::{Dictionary, Value};
use std::time::SystemTime;

fn satellite() -> std::sync::Arc<Satellite> {
    Satellite::new("Sensor", "a", "1.0.0", SatelliteHooks::default(), CommandRegistry::new()).unwrap()
}

fn request(verb_type: VerbType, verb_name: &str, payload: Vec<u8>) -> Message {
    Message { header: Header { sender: "Controller.main".into(), wall_clock: SystemTime::now(), tags: Dictionary::new() }, body: Body { verb_type, verb_name: verb_name.to_string() }, payload }
}

fn string_value(msg: &Message) -> String {
    let mut r = Reader::new(&msg.payload);
    match decode_value(&mut r).unwrap() {
        Value::String(s) => s,
        other => panic!("expected a string payload, got {other:?}"),
    }
}

#[test]
fn non_request_verb_type_yields_error() {
    let sat = satellite();
    let reply = handle_request(&sat, request(VerbType::Success, "get_name", Vec::new()));
    assert_eq!(reply.body.verb_type, VerbType::Error);
}

#[test]
fn unknown_verb_yields_unknown() {
    let sat = satellite();
    let reply = handle_request(&sat, request(VerbType::Request, "frobnicate", Vec::new()));
    assert_eq!(reply.body.verb_type, VerbType::Unknown);
}

#[test]
fn get_name_reports_canonical_name() {
    let sat = satellite();
    let reply = handle_request(&sat, request(VerbType::Request, "get_name", Vec::new()));
    assert_eq!(reply.body.verb_type, VerbType::Success);
    assert_eq!(string_value(&reply), "Sensor.a");
}

#[test]
fn illegal_start_from_new_is_invalid_and_mentions_not_allowed() {
    let sat = satellite();
    let mut w = Writer::new();
    encode_value(&mut w, &Value::String("run_0".into()));
    let reply = handle_request(&sat, request(VerbType::Request, "start", w.into_bytes()));
    assert_eq!(reply.body.verb_type, VerbType::Invalid);
    assert_eq!(reply.body.verb_name, "start");
    assert!(string_value(&reply).contains("not allowed"));
    assert_eq!(sat.fsm().state(), constellation_fsm::State::New);
}

#[test]
fn initialize_without_dictionary_payload_is_incomplete() {
    let sat = satellite();
    let reply = handle_request(&sat, request(VerbType::Request, "initialize", b"not a dictionary".to_vec()));
    assert_eq!(reply.body.verb_type, VerbType::Incomplete);
}

#[test]
fn initialize_with_dictionary_payload_is_accepted_and_runs_asynchronously() {
    let sat = satellite();
    let mut dict = Dictionary::new();
    dict.insert("foo", Value::Int(1)).unwrap();
    let mut w = Writer::new();
    encode_dict(&mut w, &dict);

    let reply = handle_request(&sat, request(VerbType::Request, "initialize", w.into_bytes()));
    assert_eq!(reply.body.verb_type, VerbType::Success);
    assert!(string_value(&reply).contains("being initiated"));

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while sat.fsm().state() != constellation_fsm::State::Init && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(sat.fsm().state(), constellation_fsm::State::Init);
}

#[test]
fn reconfigure_is_not_implemented_unless_opted_in() {
    let sat = satellite();
    let mut dict = Dictionary::new();
    dict.insert("foo", Value::Int(2)).unwrap();
    let mut w = Writer::new();
    encode_dict(&mut w, &dict);
    let reply = handle_request(&sat, request(VerbType::Request, "reconfigure", w.into_bytes()));
    assert_eq!(reply.body.verb_type, VerbType::NotImplemented);
}

#[test]
fn shutdown_is_invalid_outside_shutdownable_states() {
    let sat = satellite();
    let mut dict = Dictionary::new();
    let mut w = Writer::new();
    encode_dict(&mut w, &dict);
    handle_request(&sat, request(VerbType::Request, "initialize", w.into_bytes()));
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while sat.fsm().state() != constellation_fsm::State::Init && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    handle_request(&sat, request(VerbType::Request, "launch", Vec::new()));
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while sat.fsm().state() != constellation_fsm::State::Orbit && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let reply = handle_request(&sat, request(VerbType::Request, "shutdown", Vec::new()));
    assert_eq!(reply.body.verb_type, VerbType::Invalid);
}

#[test]
fn user_command_arity_mismatch_is_incomplete_with_diagnostic() {
    let mut registry = CommandRegistry::new();
    registry
        .register(
            "echo_int",
            Box::new(|args: &[Value]| args[0].as_int().map(Value::Int).map_err(|e| e.to_string())),
            vec![constellation_fsm::ParamType::Int],
            "echoes one integer",
            vec![],
        )
        .unwrap();
    let sat = Satellite::new("Sensor", "a", "1.0.0", SatelliteHooks::default(), registry).unwrap();

    let mut w = Writer::new();
    encode_value(&mut w, &Value::Array(constellation_value::ValueArray::Int(vec![1, 2])));
    let reply = handle_request(&sat, request(VerbType::Request, "echo_int", w.into_bytes()));
    assert_eq!(reply.body.verb_type, VerbType::Incomplete);
    let message = string_value(&reply);
    assert!(message.contains("expects 1"));
    assert!(message.contains("2 given"));
}
