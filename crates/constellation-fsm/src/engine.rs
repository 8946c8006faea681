// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The FSM engine: atomic state word, mutex-serialized `react`, a single
//! reusable transition worker, and the RUN-dedicated worker (spec.md §4.4).

use crate::error::FsmError;
use crate::hooks::SatelliteHooks;
use crate::state::{allowed, State, Transition};
use crate::token::CancellationToken;
use constellation_value::Configuration;
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Payload threaded from a command into the transition it drives.
#[derive(Clone)]
pub enum Payload {
    None,
    Config(Configuration),
    RunId(String),
    Interrupt { peer: String, reason: String },
}

impl Payload {
    fn reason(&self) -> String {
        match self {
            Payload::Interrupt { reason, .. } => reason.clone(),
            _ => String::new(),
        }
    }
}

/// Invoked on every state change, on the mutex holder — must not reenter
/// FSM methods (spec.md §4.4).
pub type StateObserver = Box<dyn Fn(State, State) + Send>;

struct WorkItem {
    transition: Transition,
    previous: State,
    payload: Payload,
}

struct Shared {
    hooks: Mutex<SatelliteHooks>,
    config: Mutex<Configuration>,
    last_run_id: Mutex<Option<String>>,
    last_failure_reason: Mutex<Option<String>>,
    observers: Mutex<Vec<StateObserver>>,
}

/// The 13-state automaton plus its worker plumbing. One `Fsm` per satellite
/// process.
pub struct Fsm {
    state: AtomicU8,
    react_mutex: Mutex<()>,
    reconfigure_supported: AtomicBool,
    initialized_once: AtomicBool,
    shared: Arc<Shared>,
    worker_tx: Mutex<Option<Sender<WorkItem>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    run_token: Mutex<Option<CancellationToken>>,
    run_ready: Arc<(Mutex<bool>, Condvar)>,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Fsm {
    /// Build the automaton in `NEW` and start its reusable transition
    /// worker thread.
    pub fn new(hooks: SatelliteHooks) -> Arc<Self> {
        let shared = Arc::new(Shared {
            hooks: Mutex::new(hooks),
            config: Mutex::new(Configuration::empty()),
            last_run_id: Mutex::new(None),
            last_failure_reason: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
        });
        let (tx, rx) = bounded::<WorkItem>(16);

        let fsm = Arc::new(Self {
            state: AtomicU8::new(State::New.code()),
            react_mutex: Mutex::new(()),
            reconfigure_supported: AtomicBool::new(false),
            initialized_once: AtomicBool::new(false),
            shared,
            worker_tx: Mutex::new(Some(tx)),
            worker_handle: Mutex::new(None),
            run_token: Mutex::new(None),
            run_ready: Arc::new((Mutex::new(false), Condvar::new())),
            run_handle: Mutex::new(None),
        });

        let worker_fsm = fsm.clone();
        let handle = thread::Builder::new()
            .name("constellation-fsm-worker".to_string())
            .spawn(move || worker_fsm.run_transition_worker(rx))
            .expect("failed to spawn FSM transition worker");
        *fsm.worker_handle.lock() = Some(handle);

        fsm
    }

    pub fn state(&self) -> State {
        State::from_code(self.state.load(Ordering::Acquire)).expect("state word always holds a valid code")
    }

    pub fn reconfigure_supported(&self) -> bool {
        self.reconfigure_supported.load(Ordering::Relaxed)
    }

    pub fn set_reconfigure_supported(&self, supported: bool) {
        self.reconfigure_supported.store(supported, Ordering::Relaxed);
    }

    pub fn config(&self) -> Configuration {
        self.shared.config.lock().clone()
    }

    pub fn last_run_id(&self) -> Option<String> {
        self.shared.last_run_id.lock().clone()
    }

    pub fn last_failure_reason(&self) -> Option<String> {
        self.shared.last_failure_reason.lock().clone()
    }

    pub fn add_observer(&self, observer: StateObserver) {
        self.shared.observers.lock().push(observer);
    }

    /// Drive one transition. Serialized by `react_mutex` so that
    /// `react(transition, payload)` is atomic with respect to observers
    /// (spec.md §4.4 tie-break rule).
    pub fn react(&self, transition: Transition, payload: Payload) -> Result<(), FsmError> {
        let _guard = self.react_mutex.lock();
        let previous = self.state();

        if transition == Transition::Failure && previous == State::Error {
            // spec.md §9(b): a no-op self-loop, no observer notification.
            return Ok(());
        }
        if !allowed(previous, transition) {
            return Err(FsmError::NotAllowed { state: previous, transition });
        }
        if transition == Transition::Start && !self.initialized_once.load(Ordering::Acquire) {
            return Err(FsmError::NeverInitialized);
        }

        let target = transition.target();
        self.state.store(target.code(), Ordering::Release);
        for observer in self.shared.observers.lock().iter() {
            observer(previous, target);
        }

        if transition == Transition::Initialized {
            self.initialized_once.store(true, Ordering::Release);
        }

        if transition == Transition::Failure {
            // `failure` is allowed directly from RUN without going through
            // `stop`/`interrupt`'s cancel-then-join dance; cancel the token
            // here too so a RUN worker still holding the hooks lock notices
            // and releases it before `on_failure` tries to acquire it.
            if let Some(token) = self.run_token.lock().as_ref() {
                token.cancel();
            }
            *self.shared.last_failure_reason.lock() = Some(payload.reason());
            self.invoke_on_failure(previous, &payload.reason());
            return Ok(());
        }

        if transition == Transition::Start {
            self.spawn_run_worker();
        }

        debug_assert!(target.is_transitional());
        let tx = self.worker_tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(WorkItem { transition, previous, payload }).map_err(|_| FsmError::WorkerUnavailable)?,
            None => return Err(FsmError::WorkerUnavailable),
        }

        Ok(())
    }

    fn invoke_on_failure(&self, previous: State, reason: &str) {
        let mut hooks = self.shared.hooks.lock();
        if let Some(hook) = hooks.on_failure.as_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| hook(previous, reason)));
            if result.is_err() {
                log::error!("[constellation-fsm] on_failure hook panicked, discarding (CRITICAL)");
            }
        }
    }

    fn run_hook<F: FnOnce(&mut SatelliteHooks) -> Result<(), String>>(&self, f: F) -> Result<(), String> {
        let mut hooks = self.shared.hooks.lock();
        match catch_unwind(AssertUnwindSafe(|| f(&mut hooks))) {
            Ok(result) => result,
            Err(_) => Err("transition hook panicked".to_string()),
        }
    }

    fn run_transition_worker(self: Arc<Self>, rx: Receiver<WorkItem>) {
        while let Ok(item) = rx.recv() {
            self.process_work_item(item);
        }
    }

    fn process_work_item(&self, item: WorkItem) {
        let WorkItem { transition, previous, payload } = item;
        match transition {
            Transition::Initialize => {
                let mut config = match payload {
                    Payload::Config(c) => c,
                    _ => Configuration::empty(),
                };
                match self.run_hook(|hooks| (hooks.initializing)(&mut config)) {
                    Ok(()) => {
                        *self.shared.config.lock() = config.clone();
                        let _ = self.react(Transition::Initialized, Payload::Config(config));
                    }
                    Err(reason) => self.fail(reason),
                }
            }
            Transition::Launch => match self.run_hook(|hooks| (hooks.launching)()) {
                Ok(()) => {
                    let _ = self.react(Transition::Launched, Payload::None);
                }
                Err(reason) => self.fail(reason),
            },
            Transition::Land => match self.run_hook(|hooks| (hooks.landing)()) {
                Ok(()) => {
                    let _ = self.react(Transition::Landed, Payload::None);
                }
                Err(reason) => self.fail(reason),
            },
            Transition::Reconfigure => {
                let incoming = match payload {
                    Payload::Config(c) => c,
                    _ => Configuration::empty(),
                };
                match self.run_hook(|hooks| (hooks.reconfiguring)(&incoming)) {
                    Ok(()) => match self.shared.config.lock().update_from(&incoming) {
                        Ok(()) => {
                            let merged = self.shared.config.lock().clone();
                            let _ = self.react(Transition::Reconfigured, Payload::Config(merged));
                        }
                        Err(e) => self.fail(e.to_string()),
                    },
                    Err(reason) => self.fail(reason),
                }
            }
            Transition::Start => {
                let run_id = match &payload {
                    Payload::RunId(id) => id.clone(),
                    _ => String::new(),
                };
                match self.run_hook(|hooks| (hooks.starting)(&run_id)) {
                    Ok(()) => {
                        *self.shared.last_run_id.lock() = Some(run_id.clone());
                        let _ = self.react(Transition::Started, Payload::RunId(run_id));
                        self.signal_run_ready();
                    }
                    Err(reason) => self.fail(reason),
                }
            }
            Transition::Stop => {
                self.cancel_and_join_run_worker();
                match self.run_hook(|hooks| (hooks.stopping)()) {
                    Ok(()) => {
                        let _ = self.react(Transition::Stopped, Payload::None);
                    }
                    Err(reason) => self.fail(reason),
                }
            }
            Transition::Interrupt => {
                let reason = payload.reason();
                if previous == State::Run {
                    self.cancel_and_join_run_worker();
                    if let Err(reason) = self.run_hook(|hooks| (hooks.stopping)()) {
                        self.fail(reason);
                        return;
                    }
                    if let Err(reason) = self.run_hook(|hooks| (hooks.landing)()) {
                        self.fail(reason);
                        return;
                    }
                }
                match self.run_hook(|hooks| (hooks.interrupting)(previous, &reason)) {
                    Ok(()) => {
                        let _ = self.react(Transition::Interrupted, Payload::None);
                    }
                    Err(reason) => self.fail(reason),
                }
            }
            other => unreachable!("{other} is a completion transition, never enqueued to the worker"),
        }
    }

    fn fail(&self, reason: String) {
        let _ = self.react(Transition::Failure, Payload::Interrupt { peer: String::new(), reason });
    }

    fn spawn_run_worker(&self) {
        let shared = self.shared.clone();
        let token = CancellationToken::new();
        *self.run_token.lock() = Some(token.clone());
        let run_ready = self.run_ready.clone();
        *self.run_ready.0.lock() = false;

        let handle = thread::Builder::new()
            .name("constellation-fsm-run".to_string())
            .spawn(move || {
                let (lock, cvar) = &*run_ready;
                let mut ready = lock.lock();
                if !*ready {
                    cvar.wait(&mut ready);
                }
                drop(ready);

                let mut hooks = shared.hooks.lock();
                let result = catch_unwind(AssertUnwindSafe(|| (hooks.running)(token)));
                drop(hooks);
                if result.is_err() {
                    log::error!("[constellation-fsm-run] running() hook panicked");
                }
            })
            .expect("failed to spawn FSM RUN worker");
        *self.run_handle.lock() = Some(handle);
    }

    fn signal_run_ready(&self) {
        let (lock, cvar) = &*self.run_ready;
        *lock.lock() = true;
        cvar.notify_all();
    }

    fn cancel_and_join_run_worker(&self) {
        if let Some(token) = self.run_token.lock().take() {
            token.cancel();
        }
        // The worker may still be parked waiting for `run_ready` if `stop`
        // races a `start` that never reached RUN; wake it unconditionally
        // so the join below cannot block forever.
        self.signal_run_ready();
        if let Some(handle) = self.run_handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Stop the reusable transition worker. Called at satellite shutdown;
    /// any already-queued transition is allowed to finish first, since the
    /// channel is drained (not force-aborted) before the sender is dropped.
    pub fn shutdown(&self) {
        self.cancel_and_join_run_worker();
        self.worker_tx.lock().take();
        if let Some(handle) = self.worker_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn wait_until(fsm: &Fsm, state: State, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if fsm.state() == state {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn clean_lifecycle_reaches_run_and_returns_to_init() {
        let mut hooks = SatelliteHooks::default();
        hooks.starting = Box::new(|_run_id| Ok(()));
        hooks.running = Box::new(|token| {
            while !token.is_cancelled() {
                token.wait_timeout(Duration::from_millis(20));
            }
            Ok(())
        });
        let fsm = Fsm::new(hooks);

        fsm.react(Transition::Initialize, Payload::Config(Configuration::empty())).unwrap();
        assert!(wait_until(&fsm, State::Init, Duration::from_secs(2)));

        fsm.react(Transition::Launch, Payload::None).unwrap();
        assert!(wait_until(&fsm, State::Orbit, Duration::from_secs(2)));

        fsm.react(Transition::Start, Payload::RunId("run_0".into())).unwrap();
        assert!(wait_until(&fsm, State::Run, Duration::from_secs(2)));
        assert_eq!(fsm.last_run_id(), Some("run_0".to_string()));

        fsm.react(Transition::Stop, Payload::None).unwrap();
        assert!(wait_until(&fsm, State::Orbit, Duration::from_secs(2)));

        fsm.react(Transition::Land, Payload::None).unwrap();
        assert!(wait_until(&fsm, State::Init, Duration::from_secs(2)));
    }

    #[test]
    fn start_is_not_allowed_from_new() {
        let fsm = Fsm::new(SatelliteHooks::default());
        let err = fsm.react(Transition::Start, Payload::None).unwrap_err();
        assert!(matches!(err, FsmError::NotAllowed { .. }));
    }

    #[test]
    fn failure_from_error_is_a_silent_no_op() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let fsm = Fsm::new(SatelliteHooks::default());
        fsm.add_observer(Box::new(move |_prev, _new| {
            counter_clone.fetch_add(1, Ordering::Relaxed);
        }));

        fsm.react(Transition::Failure, Payload::None).unwrap();
        assert_eq!(fsm.state(), State::Error);
        assert_eq!(counter.load(Ordering::Relaxed), 1);

        fsm.react(Transition::Failure, Payload::None).unwrap();
        assert_eq!(fsm.state(), State::Error);
        assert_eq!(counter.load(Ordering::Relaxed), 1, "no second notification from the no-op self-loop");
    }

    #[test]
    fn hook_error_drives_failure_and_stores_reason() {
        let mut hooks = SatelliteHooks::default();
        hooks.launching = Box::new(|| Err("boom".to_string()));
        let fsm = Fsm::new(hooks);

        fsm.react(Transition::Initialize, Payload::Config(Configuration::empty())).unwrap();
        assert!(wait_until(&fsm, State::Init, Duration::from_secs(2)));
        fsm.react(Transition::Launch, Payload::None).unwrap();
        assert!(wait_until(&fsm, State::Error, Duration::from_secs(2)));
        assert_eq!(fsm.last_failure_reason(), Some("boom".to_string()));
    }

    #[test]
    fn interrupt_from_run_calls_stopping_and_landing_then_lands_in_safe() {
        let calls: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = SatelliteHooks::default();
        let c1 = calls.clone();
        hooks.running = Box::new(move |token| {
            while !token.is_cancelled() {
                token.wait_timeout(Duration::from_millis(20));
            }
            Ok(())
        });
        let c2 = calls.clone();
        hooks.stopping = Box::new(move || {
            c2.lock().push("stopping");
            Ok(())
        });
        let c3 = calls.clone();
        hooks.landing = Box::new(move || {
            c3.lock().push("landing");
            Ok(())
        });
        let c4 = calls.clone();
        hooks.interrupting = Box::new(move |_prev, _reason| {
            c4.lock().push("interrupting");
            Ok(())
        });
        let _ = c1;
        let fsm = Fsm::new(hooks);

        fsm.react(Transition::Initialize, Payload::Config(Configuration::empty())).unwrap();
        assert!(wait_until(&fsm, State::Init, Duration::from_secs(2)));
        fsm.react(Transition::Launch, Payload::None).unwrap();
        assert!(wait_until(&fsm, State::Orbit, Duration::from_secs(2)));
        fsm.react(Transition::Start, Payload::RunId("run_0".into())).unwrap();
        assert!(wait_until(&fsm, State::Run, Duration::from_secs(2)));

        fsm.react(Transition::Interrupt, Payload::Interrupt { peer: "Sensor.b".into(), reason: "peer lost".into() }).unwrap();
        assert!(wait_until(&fsm, State::Safe, Duration::from_secs(2)));

        let order = calls.lock().clone();
        assert_eq!(order, vec!["stopping", "landing", "interrupting"]);
    }
}
