// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One tracked satellite: its command connection, last-known state, and
//! the command names it advertised (spec.md §4.7).

use constellation_fsm::State;
use constellation_proto::cursor::{Reader, Writer};
use constellation_proto::{decode_dict, decode_value, encode_dict, encode_value, Body, Header, Message, VerbType};
use constellation_value::{Dictionary, Value};
use parking_lot::Mutex;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error talking to peer: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer replied with verb-type {0:?}: {1}")]
    Rejected(VerbType, String),
    #[error("malformed reply payload: {0}")]
    Malformed(String),
}

/// A satellite the controller has discovered and opened a command
/// connection to. One connection, one request in flight at a time
/// (spec.md §4.3, §6).
pub struct Peer {
    pub name: String,
    pub command_addr: SocketAddr,
    heartbeat_addr: Mutex<Option<SocketAddr>>,
    monitoring_addr: Mutex<Option<SocketAddr>>,
    stream: Mutex<TcpStream>,
    state: Mutex<State>,
    commands: Mutex<Vec<String>>,
}

impl Peer {
    /// Open the command connection and prime the record with `get_name`,
    /// `get_state` and `get_commands` (spec.md §4.7: CHIRP only carries a
    /// host-hash, so the canonical name used as the peer-map key is learned
    /// here, not off the wire). The heartbeat address is learned
    /// separately, from a `HEARTBEAT` CHIRP offer that may arrive before
    /// or after this one; set it with `set_heartbeat_addr`.
    pub fn connect(command_addr: SocketAddr) -> Result<Self, PeerError> {
        let stream = TcpStream::connect(command_addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        let peer = Self {
            name: String::new(),
            command_addr,
            heartbeat_addr: Mutex::new(None),
            monitoring_addr: Mutex::new(None),
            stream: Mutex::new(stream),
            state: Mutex::new(State::New),
            commands: Mutex::new(Vec::new()),
        };
        peer.prime()
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn heartbeat_addr(&self) -> Option<SocketAddr> {
        *self.heartbeat_addr.lock()
    }

    pub fn set_heartbeat_addr(&self, addr: SocketAddr) {
        *self.heartbeat_addr.lock() = Some(addr);
    }

    pub fn monitoring_addr(&self) -> Option<SocketAddr> {
        *self.monitoring_addr.lock()
    }

    pub fn set_monitoring_addr(&self, addr: SocketAddr) {
        *self.monitoring_addr.lock() = Some(addr);
    }

    /// Issue one CSCP request and wait for its reply over this peer's
    /// connection.
    pub fn request(&self, verb: &str, payload: Vec<u8>) -> Result<Message, PeerError> {
        let mut stream = self.stream.lock();
        let request = Message {
            header: Header { sender: "Controller".to_string(), wall_clock: SystemTime::now(), tags: Dictionary::new() },
            body: Body { verb_type: VerbType::Request, verb_name: verb.to_string() },
            payload,
        };
        request.write_to(&mut *stream)?;
        Ok(Message::read_from(&mut *stream)?)
    }

    fn prime(mut self) -> Result<Self, PeerError> {
        let name_reply = self.request("get_name", Vec::new())?;
        if name_reply.body.verb_type != VerbType::Success {
            return Err(PeerError::Rejected(name_reply.body.verb_type, describe(&name_reply)));
        }
        self.name = decode_string(&name_reply.payload)?;

        let state_reply = self.request("get_state", Vec::new())?;
        if state_reply.body.verb_type != VerbType::Success {
            return Err(PeerError::Rejected(state_reply.body.verb_type, describe(&state_reply)));
        }
        let state_name = decode_string(&state_reply.payload)?;
        let state = State::ALL
            .iter()
            .find(|s| s.name() == state_name)
            .copied()
            .ok_or_else(|| PeerError::Malformed(format!("unknown state name '{state_name}'")))?;
        *self.state.lock() = state;

        let commands_reply = self.request("get_commands", Vec::new())?;
        if commands_reply.body.verb_type != VerbType::Success {
            return Err(PeerError::Rejected(commands_reply.body.verb_type, describe(&commands_reply)));
        }
        let mut r = Reader::new(&commands_reply.payload);
        let dict = decode_dict(&mut r).map_err(|e| PeerError::Malformed(e.to_string()))?;
        *self.commands.lock() = dict.iter().map(|(name, _)| name.to_string()).collect();
        Ok(self)
    }

    /// Issue a transition verb with a pre-encoded payload, updating the
    /// peer's cached state to the accepted target is not done here: the
    /// authoritative state comes back through the heartbeat stream, not
    /// the SUCCESS acknowledgement (spec.md §4.3: "the transition itself
    /// executes asynchronously").
    pub fn send_command(&self, verb: &str, payload: Value) -> Result<Message, PeerError> {
        let mut w = Writer::new();
        encode_value(&mut w, &payload);
        self.request(verb, w.into_bytes())
    }

    /// Issue a transition verb whose payload is a configuration dictionary
    /// (`initialize`/`reconfigure`, spec.md §4.6), rather than a scalar
    /// `Value`.
    pub fn send_dict_command(&self, verb: &str, payload: &Dictionary) -> Result<Message, PeerError> {
        let mut w = Writer::new();
        encode_dict(&mut w, payload);
        self.request(verb, w.into_bytes())
    }

    /// Close the command connection, e.g. on a CHIRP `DEPART` or a
    /// heartbeat loss (spec.md §4.7). Best-effort: the peer may already
    /// have closed its end.
    pub fn close(&self) {
        let _ = self.stream.lock().shutdown(Shutdown::Both);
    }
}

fn decode_string(bytes: &[u8]) -> Result<String, PeerError> {
    let mut r = Reader::new(bytes);
    match decode_value(&mut r).map_err(|e| PeerError::Malformed(e.to_string()))? {
        Value::String(s) => Ok(s),
        other => Err(PeerError::Malformed(format!("expected a string, got a {}", other.kind_name()))),
    }
}

fn describe(msg: &Message) -> String {
    decode_string(&msg.payload).unwrap_or_default()
}
