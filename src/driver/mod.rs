//! Drivers own an interpreter and an event queue and decide when queued
//! events are dispatched.

use std::fmt::Debug;

use crate::{Duration, Result, Snapshot};

mod queue;
mod synchronous;
mod threaded;

pub use queue::EventQueue;
pub use synchronous::SynchronousDriver;
pub use threaded::ThreadedDriver;

/// Lifecycle of a machine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Created, neither started nor activated
    Created,
    /// Dispatching events
    Running,
    /// Stopped; queued events are never dispatched
    Terminated,
}

/// Common interface of the drivers.
///
/// Events fired before `start` or after `terminate` are queued but not
/// dispatched.
pub trait StateMachine<S: Debug, E, A> {
    /// Queue an event behind the already queued ones
    fn fire(&mut self, event: E, args: A);

    /// Queue an event ahead of the already queued ones
    fn fire_priority(&mut self, event: E, args: A);

    /// Enter the initial state and start dispatching.
    ///
    /// Fails with [`Error::InvalidLifecycle`](crate::Error::InvalidLifecycle)
    /// unless the machine was just created.
    fn start(&mut self) -> Result<(), S>;

    /// Stop dispatching and exit all active states
    fn terminate(&mut self);

    /// Current lifecycle state
    fn status(&self) -> Lifecycle;

    /// Number of events waiting in the queue
    fn number_of_queued_events(&self) -> usize;

    /// True if no event is queued or being dispatched
    fn is_idle(&self) -> bool;

    /// Current state, `None` before the machine entered any state
    fn current_state(&self) -> Option<S>;

    /// Resume from a snapshot without running entry actions.
    ///
    /// Only allowed on a created machine. Moves it to `Running`.
    fn activate(&mut self, snapshot: &Snapshot<S>) -> Result<(), S>;

    /// Stop dispatching without running exit actions and capture the state
    fn passivate(&mut self) -> Snapshot<S>;
}

/// Tuning of the [`ThreadedDriver`] worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// How long the worker waits for an event before re-checking its status
    pub poll_interval: Duration,
    /// How long `terminate` waits for the worker to finish
    pub termination_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            termination_timeout: Duration::from_secs(10),
        }
    }
}

impl DriverConfig {
    /// Set the worker poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the termination timeout
    pub fn with_termination_timeout(mut self, termination_timeout: Duration) -> Self {
        self.termination_timeout = termination_timeout;
        self
    }
}
