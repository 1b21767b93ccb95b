//! Per-dispatch working set: entering and exiting states, resolving
//! history and collecting what happened along the way.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, trace};

use crate::notification::{Notification, Notifier, TransitionContext};
use crate::state::{HistoryMode, StateIndex, StateRegistry};
use crate::{EventArgs, EventId, Failure, StateId};

/// A state entered or exited while handling one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<S> {
    /// The state was entered
    Enter(S),
    /// The state was exited
    Exit(S),
}

pub(crate) struct Traversal<'a, S: StateId, E, CTX, A> {
    registry: &'a StateRegistry<S, E, CTX, A>,
    context: &'a mut CTX,
    history: &'a mut HashMap<StateIndex, StateIndex>,
    notifier: &'a Notifier<S, E, A>,
    transition: Option<TransitionContext<S, E, A>>,
    records: Vec<Record<S>>,
    failures: Vec<Failure<S>>,
}

impl<'a, S, E, CTX, A> Traversal<'a, S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    pub(crate) fn new(
        registry: &'a StateRegistry<S, E, CTX, A>,
        context: &'a mut CTX,
        history: &'a mut HashMap<StateIndex, StateIndex>,
        notifier: &'a Notifier<S, E, A>,
        transition: Option<TransitionContext<S, E, A>>,
    ) -> Self {
        Self {
            registry,
            context,
            history,
            notifier,
            transition,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn registry(&self) -> &'a StateRegistry<S, E, CTX, A> {
        self.registry
    }

    pub(crate) fn id(&self, index: StateIndex) -> &'a S {
        self.registry.id(index)
    }

    pub(crate) fn context(&self) -> &CTX {
        &*self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut CTX {
        &mut *self.context
    }

    /// Enter a single state and run its entry action.
    pub(crate) fn entry(&mut self, index: StateIndex) {
        let registry = self.registry;
        let node = registry.node(index);
        trace!(machine = %self.notifier.machine(), state = ?node.id(), "entering state");
        self.records.push(Record::Enter(node.id().clone()));
        if let Some(action) = &node.entry_action {
            if let Err(source) = action(&mut *self.context) {
                error!(state = ?node.id(), error = %source, "entry action failed");
                self.record_failure(Failure::EntryAction {
                    state: node.id().clone(),
                    source: Arc::from(source),
                });
            }
        }
    }

    /// Exit a single state, run its exit action and remember it as the last
    /// active sub-state of its parent.
    pub(crate) fn exit(&mut self, index: StateIndex) {
        let registry = self.registry;
        let node = registry.node(index);
        trace!(machine = %self.notifier.machine(), state = ?node.id(), "exiting state");
        self.records.push(Record::Exit(node.id().clone()));
        if let Some(action) = &node.exit_action {
            if let Err(source) = action(&mut *self.context) {
                error!(state = ?node.id(), error = %source, "exit action failed");
                self.record_failure(Failure::ExitAction {
                    state: node.id().clone(),
                    source: Arc::from(source),
                });
            }
        }
        if let Some(parent) = node.parent {
            if registry.node(parent).history_mode != HistoryMode::None {
                self.history.insert(parent, index);
            }
        }
    }

    /// Exit from `current` upwards, stopping below `source`.
    pub(crate) fn unwind(&mut self, current: StateIndex, source: StateIndex) {
        let mut state = Some(current);
        while let Some(index) = state {
            if index == source {
                return;
            }
            self.exit(index);
            state = self.registry.node(index).parent;
        }
    }

    /// Exit `current` and all of its ancestors.
    pub(crate) fn exit_all(&mut self, current: StateIndex) {
        let mut state = Some(current);
        while let Some(index) = state {
            self.exit(index);
            state = self.registry.node(index).parent;
        }
    }

    /// Enter the sub-states of an already entered `index` according to its
    /// history mode. Returns the innermost state entered.
    pub(crate) fn enter_by_history(&mut self, index: StateIndex) -> StateIndex {
        match self.registry.node(index).history_mode {
            HistoryMode::None => match self.registry.node(index).initial_child {
                Some(initial) => self.enter_shallow(initial),
                None => index,
            },
            HistoryMode::Shallow => match self.last_active_or_initial(index) {
                Some(sub) => self.enter_shallow(sub),
                None => index,
            },
            HistoryMode::Deep => match self.last_active_or_initial(index) {
                Some(sub) => self.enter_deep(sub),
                None => index,
            },
        }
    }

    // Enter `index`, then the chain of initial sub-states below it.
    fn enter_shallow(&mut self, index: StateIndex) -> StateIndex {
        let mut current = index;
        self.entry(current);
        while let Some(initial) = self.registry.node(current).initial_child {
            self.entry(initial);
            current = initial;
        }
        current
    }

    // Enter `index`, then the last active sub-state at every level below it.
    fn enter_deep(&mut self, index: StateIndex) -> StateIndex {
        let mut current = index;
        self.entry(current);
        while let Some(sub) = self.last_active_or_initial(current) {
            self.entry(sub);
            current = sub;
        }
        current
    }

    fn last_active_or_initial(&self, index: StateIndex) -> Option<StateIndex> {
        self.history
            .get(&index)
            .copied()
            .or(self.registry.node(index).initial_child)
    }

    /// Keep a callback failure and report it to the observers.
    pub(crate) fn record_failure(&mut self, failure: Failure<S>) {
        let notification = match (&self.transition, failure.is_transition_failure()) {
            (Some(transition), true) => Notification::TransitionThrowsException {
                transition: transition.clone(),
                failure: failure.clone(),
            },
            (transition, _) => Notification::ExceptionThrown {
                transition: transition.clone(),
                failure: failure.clone(),
            },
        };
        self.failures.push(failure);
        self.notifier.notify(notification);
    }

    pub(crate) fn finish(self) -> (Vec<Record<S>>, Vec<Failure<S>>) {
        (self.records, self.failures)
    }
}
