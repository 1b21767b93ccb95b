use tracing::{debug, error, info};

use super::{EventQueue, Lifecycle, StateMachine};
use crate::interpreter::Interpreter;
use crate::{Error, EventArgs, EventId, Result, Snapshot, StateId};

/// Dispatches events on the caller's thread.
///
/// `fire` queues the event and then drains the queue before returning.
/// Events fired from inside guards or actions through an [`EventQueue`]
/// handle are dispatched after the current one completes.
pub struct SynchronousDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    interpreter: Interpreter<S, E, CTX, A>,
    queue: EventQueue<E, A>,
    status: Lifecycle,
}

impl<S, E, CTX, A> SynchronousDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    /// Wrap an interpreter that has not been initialized yet
    pub fn new(interpreter: Interpreter<S, E, CTX, A>) -> Self {
        Self {
            interpreter,
            queue: EventQueue::new(),
            status: Lifecycle::Created,
        }
    }

    /// Use `queue` instead of a private queue, typically one already
    /// captured by the context so actions can fire events
    pub fn with_queue(mut self, queue: EventQueue<E, A>) -> Self {
        self.queue = queue;
        self
    }

    /// A handle to the event queue
    pub fn events(&self) -> EventQueue<E, A> {
        self.queue.clone()
    }

    /// The underlying interpreter
    pub fn interpreter(&self) -> &Interpreter<S, E, CTX, A> {
        &self.interpreter
    }

    /// Get a reference to the context
    pub fn context(&self) -> &CTX {
        self.interpreter.context()
    }

    /// Get a mutable reference to the context
    pub fn context_mut(&mut self) -> &mut CTX {
        self.interpreter.context_mut()
    }

    fn execute(&mut self) {
        while self.status == Lifecycle::Running {
            let Some(next) = self.queue.pop() else {
                break;
            };
            if let Err(error) = self.interpreter.fire(next.event, next.args) {
                error!(machine = %self.interpreter.name(), %error, "failed to dispatch event");
            }
        }
    }

    fn expect_created(&self, operation: &'static str) -> Result<(), S> {
        match self.status {
            Lifecycle::Created => Ok(()),
            status => Err(Error::InvalidLifecycle { operation, status }),
        }
    }
}

impl<S, E, CTX, A> StateMachine<S, E, A> for SynchronousDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    fn fire(&mut self, event: E, args: A) {
        self.queue.fire(event, args);
        self.execute();
    }

    fn fire_priority(&mut self, event: E, args: A) {
        self.queue.fire_priority(event, args);
        self.execute();
    }

    fn start(&mut self) -> Result<(), S> {
        self.expect_created("start")?;
        self.interpreter.initialize()?;
        self.status = Lifecycle::Running;
        info!(machine = %self.interpreter.name(), "started");
        self.execute();
        Ok(())
    }

    fn terminate(&mut self) {
        if self.status == Lifecycle::Terminated {
            return;
        }
        let previous = std::mem::replace(&mut self.status, Lifecycle::Terminated);
        if previous == Lifecycle::Running {
            self.interpreter.terminate();
        }
        info!(machine = %self.interpreter.name(), "terminated");
    }

    fn status(&self) -> Lifecycle {
        self.status
    }

    fn number_of_queued_events(&self) -> usize {
        self.queue.len()
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    fn current_state(&self) -> Option<S> {
        self.interpreter.current_state()
    }

    fn activate(&mut self, snapshot: &Snapshot<S>) -> Result<(), S> {
        self.expect_created("activate")?;
        if snapshot.current_state.is_none() {
            return Err(Error::NotInitialized);
        }
        self.interpreter.restore(snapshot)?;
        self.status = Lifecycle::Running;
        debug!(machine = %self.interpreter.name(), state = ?snapshot.current_state, "activated");
        self.execute();
        Ok(())
    }

    fn passivate(&mut self) -> Snapshot<S> {
        self.status = Lifecycle::Terminated;
        debug!(machine = %self.interpreter.name(), "passivated");
        self.interpreter.snapshot()
    }
}
