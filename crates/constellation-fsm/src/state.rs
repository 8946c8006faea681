// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The 13-state lifecycle automaton (spec.md §3 "State", §4.4).
//!
//! Upper-case variants are steady states in which the satellite awaits a
//! command; lower-case variants are transitional states in which a worker
//! thread is executing user code. Codes are stable over the wire (they
//! appear in every heartbeat beacon).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    New = 0,
    Initializing = 1,
    Init = 2,
    Launching = 3,
    Orbit = 4,
    Landing = 5,
    Reconfiguring = 6,
    Starting = 7,
    Run = 8,
    Stopping = 9,
    Interrupting = 10,
    Safe = 11,
    Error = 12,
}

impl State {
    pub const ALL: [State; 13] = [
        State::New,
        State::Initializing,
        State::Init,
        State::Launching,
        State::Orbit,
        State::Landing,
        State::Reconfiguring,
        State::Starting,
        State::Run,
        State::Stopping,
        State::Interrupting,
        State::Safe,
        State::Error,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        State::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Steady states are named in upper case and await a command; every
    /// other state is transitional (a worker is executing user code).
    pub fn is_steady(self) -> bool {
        matches!(self, State::New | State::Init | State::Orbit | State::Run | State::Safe | State::Error)
    }

    pub fn is_transitional(self) -> bool {
        !self.is_steady()
    }

    pub fn name(self) -> &'static str {
        match self {
            State::New => "NEW",
            State::Initializing => "initializing",
            State::Init => "INIT",
            State::Launching => "launching",
            State::Orbit => "ORBIT",
            State::Landing => "landing",
            State::Reconfiguring => "reconfiguring",
            State::Starting => "starting",
            State::Run => "RUN",
            State::Stopping => "stopping",
            State::Interrupting => "interrupting",
            State::Safe => "SAFE",
            State::Error => "ERROR",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One step of the automaton. Commands (controller-issued) are the subset
/// excluding the `*ed` completions and `failure` — see [`Transition::is_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Initialize,
    Initialized,
    Launch,
    Launched,
    Land,
    Landed,
    Reconfigure,
    Reconfigured,
    Start,
    Started,
    Stop,
    Stopped,
    Interrupt,
    Interrupted,
    Failure,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Initialize => "initialize",
            Transition::Initialized => "initialized",
            Transition::Launch => "launch",
            Transition::Launched => "launched",
            Transition::Land => "land",
            Transition::Landed => "landed",
            Transition::Reconfigure => "reconfigure",
            Transition::Reconfigured => "reconfigured",
            Transition::Start => "start",
            Transition::Started => "started",
            Transition::Stop => "stop",
            Transition::Stopped => "stopped",
            Transition::Interrupt => "interrupt",
            Transition::Interrupted => "interrupted",
            Transition::Failure => "failure",
        }
    }

    /// Parse a controller-facing verb name (`initialize`, `launch`, ...)
    /// into the command subset of transitions. Completion transitions
    /// (`*ed`) are internal and never parsed from a verb name.
    pub fn parse_command(verb: &str) -> Option<Self> {
        match verb {
            "initialize" => Some(Transition::Initialize),
            "launch" => Some(Transition::Launch),
            "land" => Some(Transition::Land),
            "reconfigure" => Some(Transition::Reconfigure),
            "start" => Some(Transition::Start),
            "stop" => Some(Transition::Stop),
            "interrupt" => Some(Transition::Interrupt),
            _ => None,
        }
    }

    pub fn is_command(self) -> bool {
        !matches!(
            self,
            Transition::Initialized
                | Transition::Launched
                | Transition::Landed
                | Transition::Reconfigured
                | Transition::Started
                | Transition::Stopped
                | Transition::Interrupted
                | Transition::Failure
        )
    }

    /// The state this transition drives the satellite to, independent of
    /// the source state (every transition in §4.4's table has exactly one
    /// target). `failure`'s target is always `ERROR`, though §9(b) makes it
    /// a no-op self-loop when already there — `react` handles that case.
    pub fn target(self) -> State {
        match self {
            Transition::Initialize => State::Initializing,
            Transition::Initialized => State::Init,
            Transition::Launch => State::Launching,
            Transition::Launched => State::Orbit,
            Transition::Land => State::Landing,
            Transition::Landed => State::Init,
            Transition::Reconfigure => State::Reconfiguring,
            Transition::Reconfigured => State::Orbit,
            Transition::Start => State::Starting,
            Transition::Started => State::Run,
            Transition::Stop => State::Stopping,
            Transition::Stopped => State::Orbit,
            Transition::Interrupt => State::Interrupting,
            Transition::Interrupted => State::Safe,
            Transition::Failure => State::Error,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `allowed(state, transition)` per spec.md §4.4's table. `Transition::Failure`
/// is allowed from every state (including `ERROR`, where it is a no-op —
/// see [`crate::engine::Fsm::react`]).
pub fn allowed(state: State, transition: Transition) -> bool {
    if transition == Transition::Failure {
        return true;
    }
    match (state, transition) {
        (State::New, Transition::Initialize) => true,
        (State::Initializing, Transition::Initialized) => true,
        (State::Init, Transition::Initialize) => true,
        (State::Init, Transition::Launch) => true,
        (State::Launching, Transition::Launched) => true,
        (State::Orbit, Transition::Land) => true,
        (State::Orbit, Transition::Reconfigure) => true,
        (State::Orbit, Transition::Start) => true,
        (State::Orbit, Transition::Interrupt) => true,
        (State::Landing, Transition::Landed) => true,
        (State::Reconfiguring, Transition::Reconfigured) => true,
        (State::Starting, Transition::Started) => true,
        (State::Run, Transition::Stop) => true,
        (State::Run, Transition::Interrupt) => true,
        (State::Stopping, Transition::Stopped) => true,
        (State::Interrupting, Transition::Interrupted) => true,
        (State::Safe, Transition::Initialize) => true,
        (State::Error, Transition::Initialize) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_matches_the_table_for_every_state() {
        assert!(allowed(State::New, Transition::Initialize));
        assert!(!allowed(State::New, Transition::Launch));
        assert!(allowed(State::Orbit, Transition::Interrupt));
        assert!(allowed(State::Run, Transition::Interrupt));
        assert!(!allowed(State::Init, Transition::Start));
    }

    #[test]
    fn failure_is_allowed_from_every_state() {
        for s in State::ALL {
            assert!(allowed(s, Transition::Failure));
        }
    }

    #[test]
    fn error_only_allows_initialize_besides_failure() {
        for t in [
            Transition::Launch,
            Transition::Land,
            Transition::Reconfigure,
            Transition::Start,
            Transition::Stop,
            Transition::Interrupt,
        ] {
            assert!(!allowed(State::Error, t));
        }
        assert!(allowed(State::Error, Transition::Initialize));
    }

    #[test]
    fn codes_round_trip() {
        for s in State::ALL {
            assert_eq!(State::from_code(s.code()), Some(s));
        }
        assert_eq!(State::from_code(200), None);
    }

    #[test]
    fn steady_classification_matches_casing_convention() {
        for s in State::ALL {
            assert_eq!(s.is_steady(), s.name().chars().next().unwrap().is_ascii_uppercase());
        }
    }

    #[test]
    fn scenario_trace_is_each_step_allowed() {
        let trace = [
            (State::New, Transition::Initialize),
            (State::Initializing, Transition::Initialized),
            (State::Init, Transition::Launch),
            (State::Launching, Transition::Launched),
            (State::Orbit, Transition::Start),
            (State::Starting, Transition::Started),
            (State::Run, Transition::Stop),
            (State::Stopping, Transition::Stopped),
            (State::Orbit, Transition::Land),
            (State::Landing, Transition::Landed),
        ];
        for (state, transition) in trace {
            assert!(allowed(state, transition), "{state} -{transition}-> should be allowed");
            assert_eq!(transition.target(), match transition {
                Transition::Initialize => State::Initializing,
                Transition::Initialized => State::Init,
                Transition::Launch => State::Launching,
                Transition::Launched => State::Orbit,
                Transition::Start => State::Starting,
                Transition::Started => State::Run,
                Transition::Stop => State::Stopping,
                Transition::Stopped => State::Orbit,
                Transition::Land => State::Landing,
                Transition::Landed => State::Init,
                _ => unreachable!(),
            });
        }
    }
}
