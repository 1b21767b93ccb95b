//! Observer notifications emitted while a machine runs.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::error;

use crate::error::BoxError;
use crate::Failure;

/// The dispatch an observer notification belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionContext<S, E, A> {
    /// Current state when the event was dispatched
    pub state: S,
    /// The dispatched event
    pub event: E,
    /// Arguments passed with the event
    pub args: A,
}

/// Something that happened inside a machine.
///
/// Every dispatched event produces one `TransitionBegin` followed by exactly
/// one `TransitionCompleted` or `TransitionDeclined`. Failures of user
/// callbacks are reported in between, in the order they occurred.
#[derive(Debug, Clone)]
pub enum Notification<S: Debug, E, A> {
    /// An event is about to be dispatched
    TransitionBegin(TransitionContext<S, E, A>),

    /// A transition fired and the machine settled in `new_state`
    TransitionCompleted {
        /// The dispatch
        transition: TransitionContext<S, E, A>,
        /// Current state after the transition
        new_state: S,
    },

    /// No transition accepted the event
    TransitionDeclined(TransitionContext<S, E, A>),

    /// An entry or exit action failed.
    ///
    /// `transition` is `None` while initializing or terminating.
    ExceptionThrown {
        /// The dispatch, if any
        transition: Option<TransitionContext<S, E, A>>,
        /// What failed
        failure: Failure<S>,
    },

    /// A guard or transition action failed
    TransitionThrowsException {
        /// The dispatch
        transition: TransitionContext<S, E, A>,
        /// What failed
        failure: Failure<S>,
    },
}

impl<S: Debug, E, A> Notification<S, E, A> {
    /// The dispatch this notification belongs to, if any.
    pub fn transition(&self) -> Option<&TransitionContext<S, E, A>> {
        match self {
            Notification::TransitionBegin(transition)
            | Notification::TransitionDeclined(transition)
            | Notification::TransitionCompleted { transition, .. }
            | Notification::TransitionThrowsException { transition, .. } => Some(transition),
            Notification::ExceptionThrown { transition, .. } => transition.as_ref(),
        }
    }

    /// The captured failure for exception notifications.
    pub fn failure(&self) -> Option<&Failure<S>> {
        match self {
            Notification::ExceptionThrown { failure, .. }
            | Notification::TransitionThrowsException { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Receives the notifications of a machine instance.
///
/// Observers run synchronously on the thread that dispatches the event.
/// An error returned by an observer is logged and otherwise ignored.
pub trait Observer<S: Debug, E, A>: Send + Sync {
    /// Handle one notification
    fn notify(&self, notification: &Notification<S, E, A>) -> Result<(), BoxError>;
}

impl<S, E, A, F> Observer<S, E, A> for F
where
    S: Debug,
    F: Fn(&Notification<S, E, A>) -> Result<(), BoxError> + Send + Sync,
{
    fn notify(&self, notification: &Notification<S, E, A>) -> Result<(), BoxError> {
        self(notification)
    }
}

/// Fans notifications out to the observers of one instance.
pub(crate) struct Notifier<S: Debug, E, A> {
    machine: String,
    observers: Vec<Arc<dyn Observer<S, E, A>>>,
}

impl<S: Debug, E, A> Notifier<S, E, A> {
    pub(crate) fn new(machine: String, observers: Vec<Arc<dyn Observer<S, E, A>>>) -> Self {
        Self { machine, observers }
    }

    pub(crate) fn machine(&self) -> &str {
        &self.machine
    }

    pub(crate) fn add(&mut self, observer: Arc<dyn Observer<S, E, A>>) {
        self.observers.push(observer);
    }

    pub(crate) fn notify(&self, notification: Notification<S, E, A>) {
        for observer in &self.observers {
            if let Err(error) = observer.notify(&notification) {
                error!(machine = %self.machine, %error, "observer failed");
            }
        }
    }
}
