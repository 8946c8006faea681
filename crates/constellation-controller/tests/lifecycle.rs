// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use constellation_controller::Peer;
use constellation_fsm::{CommandRegistry, SatelliteHooks, State};
use constellation_satellite::responder::CommandResponder;
use constellation_satellite::Satellite;
use constellation_value::{Dictionary, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

fn spawn_satellite() -> (std::sync::Arc<Satellite>, CommandResponder) {
    let mut registry = CommandRegistry::new();
    registry
        .register("ping", Box::new(|_args: &[Value]| Ok(Value::String("pong".into()))), vec![], "replies pong", vec![])
        .unwrap();
    let sat = Satellite::new("Sensor", "lifecycle", "1.0.0", SatelliteHooks::default(), registry).unwrap();
    let responder = CommandResponder::bind(sat.clone(), loopback(0)).unwrap();
    (sat, responder)
}

fn wait_for_state(sat: &Satellite, target: State) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while sat.fsm().state() != target && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(sat.fsm().state(), target);
}

#[test]
fn peer_connect_primes_name_state_and_commands() {
    let (sat, responder) = spawn_satellite();
    let peer = Peer::connect(responder.local_addr()).unwrap();

    assert_eq!(peer.name, "Sensor.lifecycle");
    assert_eq!(peer.state(), State::New);
    assert!(peer.commands().contains(&"ping".to_string()));

    sat.shutdown();
}

#[test]
fn peer_drives_satellite_through_initialize() {
    let (sat, responder) = spawn_satellite();
    let peer = Peer::connect(responder.local_addr()).unwrap();

    let mut dict = Dictionary::new();
    dict.insert("gain", Value::Int(7)).unwrap();
    let reply = peer.send_dict_command("initialize", &dict).unwrap();
    assert_eq!(reply.body.verb_type, constellation_proto::VerbType::Success);

    wait_for_state(&sat, State::Init);
    assert_eq!(sat.config().get_i64("gain").unwrap(), 7);

    sat.shutdown();
}

#[test]
fn peer_user_command_round_trips() {
    let (sat, responder) = spawn_satellite();
    let peer = Peer::connect(responder.local_addr()).unwrap();

    let reply = peer.send_command("ping", Value::Array(constellation_value::ValueArray::Int(vec![]))).unwrap();
    assert_eq!(reply.body.verb_type, constellation_proto::VerbType::Success);

    sat.shutdown();
}
