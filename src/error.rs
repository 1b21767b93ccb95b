//! Error types for the state machine

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::driver::Lifecycle;

/// Boxed error returned by user supplied guards and actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared form of a [`BoxError`] so captured failures can be cloned into notifications.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for state machine operations
pub type Result<T, S> = std::result::Result<T, Error<S>>;

/// Fatal errors raised while defining a machine or driving its lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error<S: Debug> {
    /// A state was declared as its own super-state
    #[error("State {0:?} cannot be its own super-state")]
    SelfSuperState(S),

    /// A state was declared as its own initial sub-state
    #[error("State {0:?} cannot be the initial sub-state of itself")]
    SelfInitialState(S),

    /// The initial sub-state is not a direct child of the super-state
    #[error("State {initial:?} cannot be the initial state of super-state {super_state:?} because it is not a direct sub-state")]
    InitialStateNotSubState {
        /// The composite state being defined
        super_state: S,
        /// The offending initial state
        initial: S,
    },

    /// A state already belongs to another super-state
    #[error("State {state:?} already has super-state {existing:?}, cannot move it under {requested:?}")]
    SuperStateAlreadyDefined {
        /// The sub-state
        state: S,
        /// The super-state it already has
        existing: S,
        /// The super-state that was requested
        requested: S,
    },

    /// The same sub-state was listed twice in one hierarchy declaration
    #[error("State {0:?} listed more than once as a sub-state")]
    DuplicateSubState(S),

    /// Wiring the hierarchy would create a cycle
    #[error("Making {sub:?} a sub-state of {super_state:?} would create a cycle")]
    HierarchyCycle {
        /// The composite state being defined
        super_state: S,
        /// The sub-state closing the cycle
        sub: S,
    },

    /// A state id is not known to the definition
    #[error("State {0:?} not registered")]
    UnknownState(S),

    /// No initial state was configured for the machine
    #[error("Initial state not specified")]
    MissingInitialState,

    /// A snapshot records a history entry whose state is not a direct sub-state
    #[error("State {sub:?} is not a direct sub-state of {super_state:?}")]
    InvalidHistory {
        /// The composite state of the history entry
        super_state: S,
        /// The recorded last active sub-state
        sub: S,
    },

    /// An event was dispatched before the machine entered any state
    #[error("State machine not initialized")]
    NotInitialized,

    /// An instance operation was called in a lifecycle state that does not allow it
    #[error("{operation} is not allowed while the state machine is {status:?}")]
    InvalidLifecycle {
        /// The rejected operation
        operation: &'static str,
        /// The lifecycle state at the time of the call
        status: Lifecycle,
    },

    /// The worker thread of a threaded driver could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl<S: Debug> Error<S> {
    /// True for definition-time errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::SelfSuperState(_)
                | Error::SelfInitialState(_)
                | Error::InitialStateNotSubState { .. }
                | Error::SuperStateAlreadyDefined { .. }
                | Error::DuplicateSubState(_)
                | Error::HierarchyCycle { .. }
                | Error::UnknownState(_)
                | Error::MissingInitialState
                | Error::InvalidHistory { .. }
        )
    }

    /// True for errors caused by calling an operation in the wrong lifecycle state.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Error::InvalidLifecycle { .. } | Error::NotInitialized)
    }
}

/// Recoverable failure of a user callback, captured while dispatching an event.
///
/// Failures never abort a dispatch. They are collected in the
/// [`Outcome`](crate::Outcome) and pushed to the observers.
#[derive(Error, Debug, Clone)]
pub enum Failure<S: Debug> {
    /// A guard returned an error; it is treated as `false`
    #[error("guard of transition from {state:?} failed: {source}")]
    Guard {
        /// Source state of the transition
        state: S,
        /// The error returned by the guard
        source: SharedError,
    },

    /// A transition action returned an error
    #[error("action of transition from {state:?} failed: {source}")]
    Action {
        /// Source state of the transition
        state: S,
        /// The error returned by the action
        source: SharedError,
    },

    /// An entry action returned an error
    #[error("entry action of state {state:?} failed: {source}")]
    EntryAction {
        /// The state being entered
        state: S,
        /// The error returned by the action
        source: SharedError,
    },

    /// An exit action returned an error
    #[error("exit action of state {state:?} failed: {source}")]
    ExitAction {
        /// The state being exited
        state: S,
        /// The error returned by the action
        source: SharedError,
    },
}

impl<S: Debug> Failure<S> {
    /// The state the failing callback belongs to.
    pub fn state(&self) -> &S {
        match self {
            Failure::Guard { state, .. }
            | Failure::Action { state, .. }
            | Failure::EntryAction { state, .. }
            | Failure::ExitAction { state, .. } => state,
        }
    }

    /// The error returned by the callback.
    pub fn cause(&self) -> &SharedError {
        match self {
            Failure::Guard { source, .. }
            | Failure::Action { source, .. }
            | Failure::EntryAction { source, .. }
            | Failure::ExitAction { source, .. } => source,
        }
    }

    /// True for failures of guards and transition actions, false for entry/exit actions.
    pub fn is_transition_failure(&self) -> bool {
        matches!(self, Failure::Guard { .. } | Failure::Action { .. })
    }
}
