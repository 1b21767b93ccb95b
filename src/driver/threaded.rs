use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{DriverConfig, EventQueue, Lifecycle, StateMachine};
use crate::interpreter::Interpreter;
use crate::{Duration, Error, EventArgs, EventId, Result, Snapshot, StateId};

struct Shared<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    interpreter: Mutex<Interpreter<S, E, CTX, A>>,
    status: Mutex<Lifecycle>,
}

impl<S, E, CTX, A> Shared<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    fn status(&self) -> Lifecycle {
        *self.status.lock()
    }
}

/// Dispatches events on a dedicated worker thread.
///
/// `fire` returns immediately; the worker dispatches queued events one at
/// a time while the machine is running. Queries lock the interpreter and
/// wait for the event being dispatched to complete.
///
/// `terminate` must not be called from a guard or action of the same
/// machine: it waits for the worker, which is busy running that callback.
pub struct ThreadedDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    shared: Arc<Shared<S, E, CTX, A>>,
    queue: EventQueue<E, A>,
    config: DriverConfig,
    worker: Option<JoinHandle<()>>,
}

impl<S, E, CTX, A> ThreadedDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    CTX: Send + 'static,
    A: EventArgs,
{
    /// Wrap an interpreter that has not been initialized yet
    pub fn new(interpreter: Interpreter<S, E, CTX, A>) -> Self {
        Self {
            shared: Arc::new(Shared {
                interpreter: Mutex::new(interpreter),
                status: Mutex::new(Lifecycle::Created),
            }),
            queue: EventQueue::new(),
            config: DriverConfig::default(),
            worker: None,
        }
    }

    /// Use `queue` instead of a private queue
    pub fn with_queue(mut self, queue: EventQueue<E, A>) -> Self {
        self.queue = queue;
        self
    }

    /// Override poll interval and termination timeout
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// A handle to the event queue, usable from any thread
    pub fn events(&self) -> EventQueue<E, A> {
        self.queue.clone()
    }

    /// Run `f` with exclusive access to the context
    pub fn with_context<R>(&self, f: impl FnOnce(&mut CTX) -> R) -> R {
        f(self.shared.interpreter.lock().context_mut())
    }

    /// Block until the machine is idle or `timeout` elapsed.
    ///
    /// Returns true if the machine became idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_until_idle(timeout)
    }

    /// Async flavour of [`ThreadedDriver::wait_until_idle`]
    #[cfg(feature = "tokio-integration")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tokio-integration")))]
    pub async fn wait_until_idle_async(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.queue.is_idle() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn expect_created(&self, operation: &'static str) -> Result<(), S> {
        match self.shared.status() {
            Lifecycle::Created => Ok(()),
            status => Err(Error::InvalidLifecycle { operation, status }),
        }
    }

    fn spawn_worker(&mut self, name: String) -> Result<(), S> {
        let shared = Arc::clone(&self.shared);
        let queue = self.queue.clone();
        let poll_interval = self.config.poll_interval;

        let handle = thread::Builder::new()
            .name(format!("statechart-{name}"))
            .spawn(move || worker_loop(shared, queue, poll_interval))
            .map_err(|error| Error::WorkerSpawn(error.to_string()))?;
        self.worker = Some(handle);
        Ok(())
    }

    // Moves to Running, rolling back to Created if the worker cannot start.
    fn run(&mut self) -> Result<(), S> {
        let name = self.shared.interpreter.lock().name().to_string();
        *self.shared.status.lock() = Lifecycle::Running;
        if let Err(error) = self.spawn_worker(name) {
            *self.shared.status.lock() = Lifecycle::Created;
            return Err(error);
        }
        Ok(())
    }

    // Stops the worker and waits for it up to the termination timeout.
    // Returns false if the worker is still busy.
    fn stop_worker(&mut self) -> bool {
        *self.shared.status.lock() = Lifecycle::Terminated;
        self.queue.wake();

        let Some(handle) = self.worker.take() else {
            return true;
        };
        if handle.thread().id() == thread::current().id() {
            warn!("state machine stopped from its own worker thread");
            return false;
        }

        let deadline = Instant::now() + self.config.termination_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    timeout = ?self.config.termination_timeout,
                    "worker did not stop in time, detaching it"
                );
                return false;
            }
            thread::sleep(self.config.poll_interval);
        }
        if handle.join().is_err() {
            error!("worker thread panicked");
        }
        true
    }
}

fn worker_loop<S, E, CTX, A>(
    shared: Arc<Shared<S, E, CTX, A>>,
    queue: EventQueue<E, A>,
    poll_interval: Duration,
) where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    debug!("worker started");
    while shared.status() == Lifecycle::Running {
        let Some(next) = queue.poll(poll_interval) else {
            continue;
        };

        let mut interpreter = shared.interpreter.lock();
        if shared.status() != Lifecycle::Running {
            queue.requeue(next);
            break;
        }
        if let Err(error) = interpreter.fire(next.event, next.args) {
            error!(machine = %interpreter.name(), %error, "failed to dispatch event");
        }
        drop(interpreter);
        queue.done();
    }
    debug!("worker stopped");
}

impl<S, E, CTX, A> StateMachine<S, E, A> for ThreadedDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    CTX: Send + 'static,
    A: EventArgs,
{
    fn fire(&mut self, event: E, args: A) {
        self.queue.fire(event, args);
    }

    fn fire_priority(&mut self, event: E, args: A) {
        self.queue.fire_priority(event, args);
    }

    fn start(&mut self) -> Result<(), S> {
        self.expect_created("start")?;
        self.shared.interpreter.lock().initialize()?;
        self.run()?;
        info!("started");
        Ok(())
    }

    fn terminate(&mut self) {
        if self.shared.status() == Lifecycle::Terminated {
            return;
        }
        let was_running = self.shared.status() == Lifecycle::Running;
        if !self.stop_worker() || !was_running {
            return;
        }
        match self
            .shared
            .interpreter
            .try_lock_for(self.config.termination_timeout)
        {
            Some(mut interpreter) => {
                interpreter.terminate();
                info!(machine = %interpreter.name(), "terminated");
            }
            None => warn!("interpreter still busy, exit actions skipped"),
        }
    }

    fn status(&self) -> Lifecycle {
        self.shared.status()
    }

    fn number_of_queued_events(&self) -> usize {
        self.queue.len()
    }

    fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    fn current_state(&self) -> Option<S> {
        self.shared.interpreter.lock().current_state()
    }

    fn activate(&mut self, snapshot: &Snapshot<S>) -> Result<(), S> {
        self.expect_created("activate")?;
        if snapshot.current_state.is_none() {
            return Err(Error::NotInitialized);
        }
        self.shared.interpreter.lock().restore(snapshot)?;
        self.run()?;
        debug!(state = ?snapshot.current_state, "activated");
        Ok(())
    }

    fn passivate(&mut self) -> Snapshot<S> {
        self.stop_worker();
        debug!("passivated");
        self.shared.interpreter.lock().snapshot()
    }
}

impl<S, E, CTX, A> Drop for ThreadedDriver<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    fn drop(&mut self) {
        // Only stop the worker; exit actions need an explicit terminate.
        *self.shared.status.lock() = Lifecycle::Terminated;
        self.queue.wake();
    }
}
