// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The measurement queue (spec.md §4.7): a facade that serialises
//! `initialize -> launch -> start -> (await condition) -> stop` over the
//! whole peer group, with a configurable run-id generator and an abort
//! channel, grounded on the bounded-channel request/cancel shape used
//! throughout the discovery control channel.
//!
//! The `await condition` step gates on a [`MeasurementCondition`]: a plain
//! predicate, an elapsed-time bound (`TimerCondition`), or a remote metric
//! crossing a threshold (`MetricCondition`), the last grounded on the
//! `MetricCondition`/`TimerCondition` pair from the original controller's
//! measurement module — ported here onto this workspace's CMDP push
//! (`constellation-controller::metrics::MetricSubscriber`) rather than the
//! original's ZeroMQ subscription.

use crate::controller::Controller;
use crate::metrics::MetricSubscriber;
use crate::peer::PeerError;
use constellation_proto::VerbType;
use constellation_value::{validate_run_id, Dictionary, Value};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("peer '{0}' rejected {1}: {2}")]
    Rejected(String, &'static str, String),
    #[error("peer '{0}' is unreachable for {1}: {2}")]
    Peer(String, &'static str, #[source] PeerError),
    #[error("run was aborted during {0}")]
    Aborted(&'static str),
    #[error("generated run id '{0}' is not a valid run id")]
    InvalidRunId(String),
}

/// Generates the run id passed to `start` on every measurement. The
/// default draws eight lowercase-hex characters with `fastrand`; tests and
/// callers that need deterministic or externally assigned ids can supply
/// their own.
pub type RunIdGenerator = Box<dyn Fn() -> String + Send>;

pub fn default_run_id_generator() -> RunIdGenerator {
    Box::new(|| {
        let mut id = String::with_capacity(8);
        for _ in 0..8 {
            id.push(std::char::from_digit(fastrand::u32(0..16), 16).unwrap());
        }
        format!("run-{id}")
    })
}

/// A handle to abort an in-flight measurement. Dropping it has no effect;
/// call `abort()` explicitly.
#[derive(Clone)]
pub struct AbortHandle {
    sender: Sender<()>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.sender.send(());
    }
}

/// The `await condition` step of a measurement: polled at `poll_interval`
/// until it reports satisfied, or the run is aborted.
pub trait MeasurementCondition {
    fn is_satisfied(&self) -> bool;

    /// Human-readable description, for logging what a run is waiting on.
    fn describe(&self) -> String;
}

/// Wraps an arbitrary predicate closure as a condition, for callers that
/// don't need `TimerCondition`/`MetricCondition`'s bookkeeping.
pub struct PredicateCondition<F: Fn() -> bool> {
    predicate: F,
}

impl<F: Fn() -> bool> PredicateCondition<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F: Fn() -> bool> MeasurementCondition for PredicateCondition<F> {
    fn is_satisfied(&self) -> bool {
        (self.predicate)()
    }

    fn describe(&self) -> String {
        "custom predicate".to_string()
    }
}

/// Satisfied once `duration` has elapsed since construction.
pub struct TimerCondition {
    deadline: Instant,
    duration: Duration,
}

impl TimerCondition {
    pub fn new(duration: Duration) -> Self {
        Self { deadline: Instant::now() + duration, duration }
    }
}

impl MeasurementCondition for TimerCondition {
    fn is_satisfied(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn describe(&self) -> String {
        format!("timer of {:?}", self.duration)
    }
}

/// How a `MetricCondition` relates the latest sample to its target. The
/// default, `GreaterEqual`, matches the comparator the original
/// `MetricCondition` defaults to (`std::greater_equal<>()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl Comparator {
    fn symbol(self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::GreaterEqual => ">=",
            Comparator::Less => "<",
            Comparator::LessEqual => "<=",
            Comparator::Equal => "==",
            Comparator::NotEqual => "!=",
        }
    }

    /// Applies this comparator to a sample against the target. `Value` has
    /// no total order, so numeric, string and time pairs are compared on
    /// their own scalar; any other pairing (including a kind mismatch)
    /// never satisfies the condition.
    fn apply(self, sample: &Value, target: &Value) -> bool {
        use std::cmp::Ordering;
        let ordering = match (sample, target) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let Some(ordering) = ordering else { return false };
        match self {
            Comparator::Greater => ordering == Ordering::Greater,
            Comparator::GreaterEqual => ordering != Ordering::Less,
            Comparator::Less => ordering == Ordering::Less,
            Comparator::LessEqual => ordering != Ordering::Greater,
            Comparator::Equal => ordering == Ordering::Equal,
            Comparator::NotEqual => ordering != Ordering::Equal,
        }
    }
}

/// Satisfied once a remote satellite publishes `metric` crossing `target`
/// under `comparator`, ported from the original `MetricCondition` (CMDP
/// pub/sub there, a `MetricSubscriber` push-cache here).
pub struct MetricCondition {
    remote: String,
    metric: String,
    target: Value,
    comparator: Comparator,
    subscriber: MetricSubscriber,
}

impl MetricCondition {
    /// Subscribes to `remote`'s monitoring endpoint and watches `metric`
    /// for the first sample where `comparator(sample, target)` holds.
    pub fn new(controller: &Controller, remote: &str, metric: &str, target: Value, comparator: Comparator) -> Result<Self, MeasurementError> {
        let subscriber = controller
            .subscribe_metric(remote)
            .map_err(|e| MeasurementError::Peer(remote.to_string(), "subscribe metric", PeerError::Io(io_error(e))))?;
        Ok(Self { remote: remote.to_string(), metric: metric.to_string(), target, comparator, subscriber })
    }
}

impl MeasurementCondition for MetricCondition {
    fn is_satisfied(&self) -> bool {
        match self.subscriber.latest(&self.metric) {
            Some(sample) => self.comparator.apply(&sample, &self.target),
            None => false,
        }
    }

    fn describe(&self) -> String {
        format!("{}.{} {} {:?}", self.remote, self.metric, self.comparator.symbol(), self.target)
    }
}

fn io_error(e: crate::controller::ControllerError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

pub struct MeasurementQueue {
    run_id_generator: RunIdGenerator,
}

impl Default for MeasurementQueue {
    fn default() -> Self {
        Self { run_id_generator: default_run_id_generator() }
    }
}

impl MeasurementQueue {
    pub fn with_run_id_generator(generator: RunIdGenerator) -> Self {
        Self { run_id_generator: generator }
    }

    /// Run one measurement to completion: `initialize(config)` on every
    /// peer, then `launch`, then `start(run_id)`, then wait until either
    /// `condition` returns `true` or the abort channel fires, then `stop`.
    /// Each step fans the verb to the whole group and fails fast on the
    /// first peer that rejects or is unreachable; the returned abort
    /// handle is only meaningful once `start` has gone out (earlier
    /// aborts are moot, since there is nothing running yet).
    pub fn run(
        &self,
        controller: &Controller,
        config: Dictionary,
        condition: &dyn MeasurementCondition,
        poll_interval: Duration,
    ) -> (AbortHandle, Receiver<Result<String, MeasurementError>>) {
        let (abort_tx, abort_rx) = channel::bounded(1);
        let (result_tx, result_rx) = channel::bounded(1);
        let run_id = (self.run_id_generator)();

        let outcome = self.drive(controller, config, &run_id, condition, poll_interval, &abort_rx);
        let _ = result_tx.send(outcome);

        (AbortHandle { sender: abort_tx }, result_rx)
    }

    fn drive(
        &self,
        controller: &Controller,
        config: Dictionary,
        run_id: &str,
        condition: &dyn MeasurementCondition,
        poll_interval: Duration,
        abort_rx: &Receiver<()>,
    ) -> Result<String, MeasurementError> {
        if validate_run_id(run_id).is_err() {
            return Err(MeasurementError::InvalidRunId(run_id.to_string()));
        }

        broadcast_dict_and_check(controller, "initialize", &config)?;
        broadcast_and_check(controller, "launch", Value::Nothing, "launch")?;
        broadcast_and_check(controller, "start", Value::String(run_id.to_string()), "start")?;

        log::debug!("[constellation-controller] awaiting {}", condition.describe());
        loop {
            if condition.is_satisfied() {
                break;
            }
            match abort_rx.recv_timeout(poll_interval) {
                Ok(()) => {
                    let _ = broadcast_and_check(controller, "stop", Value::Nothing, "stop");
                    return Err(MeasurementError::Aborted("await condition"));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        broadcast_and_check(controller, "stop", Value::Nothing, "stop")?;
        Ok(run_id.to_string())
    }
}

fn broadcast_and_check(controller: &Controller, verb: &str, payload: Value, step: &'static str) -> Result<(), MeasurementError> {
    check_replies(controller.broadcast(verb, payload), step)
}

fn broadcast_dict_and_check(controller: &Controller, verb: &str, payload: &Dictionary) -> Result<(), MeasurementError> {
    check_replies(controller.broadcast_dict(verb, payload), "initialize")
}

fn check_replies(replies: Vec<(String, Result<constellation_proto::Message, PeerError>)>, step: &'static str) -> Result<(), MeasurementError> {
    for (name, result) in replies {
        match result {
            Ok(reply) if reply.body.verb_type == VerbType::Success => {}
            Ok(reply) => {
                let message = describe_payload(&reply.payload);
                return Err(MeasurementError::Rejected(name, step, message));
            }
            Err(e) => return Err(MeasurementError::Peer(name, step, e)),
        }
    }
    Ok(())
}

fn describe_payload(bytes: &[u8]) -> String {
    use constellation_proto::cursor::Reader;
    use constellation_proto::decode_value;
    let mut r = Reader::new(bytes);
    match decode_value(&mut r) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_run_id_generator_produces_valid_ids() {
        let gen = default_run_id_generator();
        for _ in 0..20 {
            let id = gen();
            assert!(validate_run_id(&id).is_ok(), "generated id '{id}' failed validation");
        }
    }

    #[test]
    fn predicate_condition_wraps_a_closure() {
        let flag = std::cell::Cell::new(false);
        let condition = PredicateCondition::new(|| flag.get());
        assert!(!condition.is_satisfied());
        flag.set(true);
        assert!(condition.is_satisfied());
    }

    #[test]
    fn timer_condition_is_satisfied_after_its_duration_elapses() {
        let condition = TimerCondition::new(Duration::from_millis(20));
        assert!(!condition.is_satisfied());
        std::thread::sleep(Duration::from_millis(40));
        assert!(condition.is_satisfied());
    }

    #[test]
    fn comparator_greater_equal_matches_its_symbol_and_default() {
        assert_eq!(Comparator::GreaterEqual.symbol(), ">=");
        assert!(Comparator::GreaterEqual.apply(&Value::Int(5), &Value::Int(5)));
        assert!(Comparator::GreaterEqual.apply(&Value::Int(6), &Value::Int(5)));
        assert!(!Comparator::GreaterEqual.apply(&Value::Int(4), &Value::Int(5)));
    }

    #[test]
    fn comparator_compares_mixed_int_and_double_samples() {
        assert!(Comparator::Greater.apply(&Value::Double(21.5), &Value::Int(20)));
        assert!(!Comparator::Greater.apply(&Value::Int(20), &Value::Double(21.5)));
    }

    #[test]
    fn comparator_rejects_mismatched_kinds() {
        assert!(!Comparator::Equal.apply(&Value::String("x".to_string()), &Value::Int(1)));
    }
}
