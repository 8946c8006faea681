// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # constellation-proto
//!
//! Framed, length-prefixed wire codecs for each of Constellation's
//! protocols: CHIRP (discovery), CHP (heartbeat), CSCP (command), and the
//! self-describing dictionary encoding they all build on.

pub mod chirp;
pub mod chp;
pub mod cmdp;
pub mod cscp;
pub mod cursor;
pub mod dict_codec;
pub mod ident;

pub use chirp::{ChirpMessage, Digest16, MsgType, ServiceKind, CHIRP_DATAGRAM_LEN};
pub use chp::Beacon;
pub use cmdp::StatMessage;
pub use cscp::{Body, Header, Message, VerbType};
pub use cursor::{Reader, SerError, SerResult, Writer};
pub use dict_codec::{decode_dict, decode_dict_bytes, decode_value, encode_dict, encode_dict_bytes, encode_value};
pub use ident::{ProtocolId, ProtocolMismatch, CDTP1, CDTP2, CHP1, CMDP1, CSCP1};
