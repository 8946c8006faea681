// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::state::{State, Transition};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FsmError {
    #[error("transition '{transition}' is not allowed from state {state}")]
    NotAllowed { state: State, transition: Transition },
    #[error("RUN may only be entered after a successful 'initialize' since process start")]
    NeverInitialized,
    #[error("transition worker is no longer running")]
    WorkerUnavailable,
}
