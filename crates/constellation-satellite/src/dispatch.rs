// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CSCP verb dispatch (spec.md §4.3): turns one decoded request `Message`
//! into a reply `Message`, routing standard verbs, transition verbs, and
//! user-defined commands registered via the Command Registry.

use crate::core::Satellite;
use constellation_fsm::{DispatchError, FsmError, Payload, State, Transition};
use constellation_proto::cursor::{Reader, Writer};
use constellation_proto::{decode_dict, decode_value, encode_dict, encode_value, Body, Header, Message, VerbType};
use constellation_value::{validate_run_id, Value, ValueArray};
use std::sync::Arc;
use std::time::SystemTime;

const STANDARD_VERBS: &[&str] = &["get_name", "get_version", "get_commands", "get_state", "get_status", "get_config", "get_run_id", "shutdown"];
const TRANSITION_VERBS: &[&str] = &["initialize", "launch", "land", "reconfigure", "start", "stop"];

fn reply(sender: &str, verb_type: VerbType, verb_name: &str, payload: Vec<u8>) -> Message {
    Message {
        header: Header { sender: sender.to_string(), wall_clock: SystemTime::now(), tags: Default::default() },
        body: Body { verb_type, verb_name: verb_name.to_string() },
        payload,
    }
}

fn string_payload(s: impl Into<String>) -> Vec<u8> {
    let mut w = Writer::new();
    encode_value(&mut w, &Value::String(s.into()));
    w.into_bytes()
}

fn value_array_to_args(bytes: &[u8]) -> Result<Vec<Value>, String> {
    let mut r = Reader::new(bytes);
    let value = decode_value(&mut r).map_err(|e| e.to_string())?;
    match value {
        Value::Array(arr) => Ok(match arr {
            ValueArray::Bool(items) => items.into_iter().map(Value::Bool).collect(),
            ValueArray::Int(items) => items.into_iter().map(Value::Int).collect(),
            ValueArray::Double(items) => items.into_iter().map(Value::Double).collect(),
            ValueArray::String(items) => items.into_iter().map(Value::String).collect(),
            ValueArray::Time(items) => items.into_iter().map(Value::Time).collect(),
        }),
        Value::Nothing => Ok(Vec::new()),
        other => Err(format!("expected an array payload, got a {}", other.kind_name())),
    }
}

/// Handle one decoded request and produce the reply to send back.
pub fn handle_request(satellite: &Arc<Satellite>, request: Message) -> Message {
    let sender = satellite.canonical_name();

    if request.body.verb_type != VerbType::Request {
        return reply(&sender, VerbType::Error, &request.body.verb_name, string_payload("Can only handle CSCP messages with REQUEST type"));
    }

    let verb = request.body.verb_name.to_ascii_lowercase();

    if STANDARD_VERBS.contains(&verb.as_str()) {
        return standard_verb(satellite, &sender, &verb, &request.payload);
    }
    if TRANSITION_VERBS.contains(&verb.as_str()) {
        return transition_verb(satellite, &sender, &verb, &request.payload);
    }
    if satellite.registry.lock().contains(&verb) {
        return user_verb(satellite, &sender, &verb, &request.payload);
    }

    reply(&sender, VerbType::Unknown, &verb, string_payload(format!("unknown verb '{verb}'")))
}

fn standard_verb(satellite: &Arc<Satellite>, sender: &str, verb: &str, _payload: &[u8]) -> Message {
    match verb {
        "get_name" => reply(sender, VerbType::Success, verb, string_payload(satellite.canonical_name())),
        "get_version" => reply(sender, VerbType::Success, verb, string_payload(satellite.version().to_string())),
        "get_commands" => {
            let commands = satellite.registry.lock().visible_commands();
            let mut dict = constellation_value::Dictionary::new();
            for (name, description) in commands {
                let _ = dict.insert(name, Value::String(description));
            }
            let mut w = Writer::new();
            encode_dict(&mut w, &dict);
            reply(sender, VerbType::Success, verb, w.into_bytes())
        }
        "get_state" => reply(sender, VerbType::Success, verb, string_payload(satellite.fsm().state().name())),
        "get_status" => reply(sender, VerbType::Success, verb, string_payload(satellite.status())),
        "get_config" => {
            // Keys beginning with `_` are split out under the INTERNAL
            // filter (spec.md §4.6); `get_config` reports the user-facing
            // dictionary only.
            let (user, _internal) = satellite.config().split_internal();
            let mut w = Writer::new();
            encode_dict(&mut w, &user);
            reply(sender, VerbType::Success, verb, w.into_bytes())
        }
        "get_run_id" => reply(sender, VerbType::Success, verb, string_payload(satellite.fsm().last_run_id().unwrap_or_default())),
        "shutdown" => {
            let state = satellite.fsm().state();
            if matches!(state, State::New | State::Init | State::Safe | State::Error) {
                satellite.shutdown_requested.store(true, std::sync::atomic::Ordering::Release);
                reply(sender, VerbType::Success, verb, string_payload("Satellite is shutting down"))
            } else {
                reply(sender, VerbType::Invalid, verb, string_payload(format!("shutdown is not allowed in state {state}")))
            }
        }
        _ => unreachable!("verb '{verb}' is in STANDARD_VERBS but not handled"),
    }
}

fn transition_verb(satellite: &Arc<Satellite>, sender: &str, verb: &str, payload: &[u8]) -> Message {
    let transition = match verb {
        "initialize" => Transition::Initialize,
        "launch" => Transition::Launch,
        "land" => Transition::Land,
        "reconfigure" => Transition::Reconfigure,
        "start" => Transition::Start,
        "stop" => Transition::Stop,
        _ => unreachable!("verb '{verb}' is in TRANSITION_VERBS but not handled"),
    };

    if verb == "reconfigure" && !satellite.fsm().reconfigure_supported() {
        return reply(sender, VerbType::NotImplemented, verb, string_payload("this satellite does not support reconfigure"));
    }

    let fsm_payload = match transition {
        Transition::Initialize | Transition::Reconfigure => {
            let mut r = Reader::new(payload);
            match decode_dict(&mut r) {
                Ok(dict) => Payload::Config(constellation_value::Configuration::new(dict)),
                Err(_) => return reply(sender, VerbType::Incomplete, verb, string_payload("expected a Dictionary payload")),
            }
        }
        Transition::Start => {
            let mut r = Reader::new(payload);
            let value = match decode_value(&mut r) {
                Ok(v) => v,
                Err(_) => return reply(sender, VerbType::Incomplete, verb, string_payload("expected a string run identifier payload")),
            };
            let run_id = match value.as_str() {
                Ok(s) => s.to_string(),
                Err(_) => return reply(sender, VerbType::Incomplete, verb, string_payload("expected a string run identifier payload")),
            };
            if let Err(e) = validate_run_id(&run_id) {
                return reply(sender, VerbType::Incomplete, verb, string_payload(e.to_string()));
            }
            Payload::RunId(run_id)
        }
        _ => Payload::None,
    };

    match satellite.fsm().react(transition, fsm_payload) {
        Ok(()) => reply(sender, VerbType::Success, verb, string_payload(format!("Transition {verb} is being initiated"))),
        Err(FsmError::NotAllowed { state, .. }) => {
            reply(sender, VerbType::Invalid, verb, string_payload(format!("transition '{verb}' is not allowed in state {state}")))
        }
        Err(e) => reply(sender, VerbType::Invalid, verb, string_payload(e.to_string())),
    }
}

fn user_verb(satellite: &Arc<Satellite>, sender: &str, verb: &str, payload: &[u8]) -> Message {
    let args = match value_array_to_args(payload) {
        Ok(args) => args,
        Err(reason) => return reply(sender, VerbType::Incomplete, verb, string_payload(format!("malformed payload: {reason}"))),
    };

    let current_state = satellite.fsm().state();
    let result = satellite.registry.lock().dispatch(verb, current_state, &args);
    match result {
        Ok(value) => {
            let mut w = Writer::new();
            encode_value(&mut w, &value);
            reply(sender, VerbType::Success, verb, w.into_bytes())
        }
        Err(DispatchError::Unknown(name)) => reply(sender, VerbType::Unknown, verb, string_payload(format!("unknown command '{name}'"))),
        Err(DispatchError::WrongState { state, .. }) => {
            reply(sender, VerbType::Invalid, verb, string_payload(format!("command '{verb}' is not allowed in state {state}")))
        }
        Err(e @ DispatchError::ArityMismatch { .. }) => reply(sender, VerbType::Incomplete, verb, string_payload(e.to_string())),
        Err(e @ DispatchError::ArgumentType { .. }) => reply(sender, VerbType::Incomplete, verb, string_payload(e.to_string())),
        Err(e @ DispatchError::UnsupportedReturn { .. }) => reply(sender, VerbType::Incomplete, verb, string_payload(e.to_string())),
    }
}
