use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::Duration;

pub(crate) struct QueuedEvent<E, A> {
    pub(crate) event: E,
    pub(crate) args: A,
}

struct QueueState<E, A> {
    events: VecDeque<QueuedEvent<E, A>>,
    processing: bool,
}

impl<E, A> QueueState<E, A> {
    fn is_idle(&self) -> bool {
        self.events.is_empty() && !self.processing
    }
}

struct Shared<E, A> {
    state: Mutex<QueueState<E, A>>,
    available: Condvar,
    idle: Condvar,
}

/// Pending events of one machine instance.
///
/// Cloning yields another handle to the same queue, so guards, actions and
/// other threads can fire events while the machine is dispatching.
pub struct EventQueue<E, A> {
    shared: Arc<Shared<E, A>>,
}

impl<E, A> Clone for EventQueue<E, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E, A> Default for EventQueue<E, A> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    events: VecDeque::new(),
                    processing: false,
                }),
                available: Condvar::new(),
                idle: Condvar::new(),
            }),
        }
    }
}

impl<E, A> EventQueue<E, A> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event behind the already queued ones
    pub fn fire(&self, event: E, args: A) {
        self.shared
            .state
            .lock()
            .events
            .push_back(QueuedEvent { event, args });
        self.shared.available.notify_one();
    }

    /// Queue an event ahead of the already queued ones
    pub fn fire_priority(&self, event: E, args: A) {
        self.shared
            .state
            .lock()
            .events
            .push_front(QueuedEvent { event, args });
        self.shared.available.notify_one();
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.shared.state.lock().events.len()
    }

    /// True if no event is queued
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().events.is_empty()
    }

    /// True if no event is queued or being dispatched by a worker
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().is_idle()
    }

    /// Block until the queue is idle or `timeout` elapsed.
    ///
    /// Returns true if the queue became idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    pub(crate) fn pop(&self) -> Option<QueuedEvent<E, A>> {
        let mut state = self.shared.state.lock();
        let next = state.events.pop_front();
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
        next
    }

    /// Wait up to `timeout` for an event. A returned event counts as being
    /// processed until [`EventQueue::done`] is called.
    pub(crate) fn poll(&self, timeout: Duration) -> Option<QueuedEvent<E, A>> {
        let mut state = self.shared.state.lock();
        if state.events.is_empty() {
            let _ = self.shared.available.wait_for(&mut state, timeout);
        }
        let next = state.events.pop_front();
        state.processing = next.is_some();
        next
    }

    /// Put a polled event back at the front without dispatching it.
    pub(crate) fn requeue(&self, event: QueuedEvent<E, A>) {
        let mut state = self.shared.state.lock();
        state.events.push_front(event);
        state.processing = false;
    }

    pub(crate) fn done(&self) {
        let mut state = self.shared.state.lock();
        state.processing = false;
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
    }

    /// Wake every thread blocked in [`EventQueue::poll`].
    pub(crate) fn wake(&self) {
        self.shared.available.notify_all();
    }
}

impl<E, A> fmt::Debug for EventQueue<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("EventQueue")
            .field("len", &state.events.len())
            .field("processing", &state.processing)
            .finish()
    }
}
