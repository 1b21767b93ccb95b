//! Transitions, per-state transition tables and the hierarchy traversal
//! performed when a transition fires.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::BoxError;
use crate::state::StateIndex;
use crate::traversal::Traversal;
use crate::{EventArgs, EventId, Failure, StateId};

/// Guard deciding whether a transition may fire.
pub type Guard<CTX, A> = Box<dyn Fn(&CTX, &A) -> std::result::Result<bool, BoxError> + Send + Sync>;

/// Action executed while a transition fires.
pub type Action<CTX, A> = Box<dyn Fn(&mut CTX, &A) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Entry or exit action of a state.
pub type StateAction<CTX> = Box<dyn Fn(&mut CTX) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A transition registered on its source state.
pub struct Transition<CTX, A> {
    pub(crate) source: StateIndex,
    pub(crate) target: Option<StateIndex>,
    pub(crate) guard: Option<Guard<CTX, A>>,
    pub(crate) actions: Vec<Action<CTX, A>>,
}

impl<CTX, A> Transition<CTX, A> {
    /// The state the transition is registered on.
    pub fn source(&self) -> StateIndex {
        self.source
    }

    /// The target state, `None` for internal transitions.
    pub fn target(&self) -> Option<StateIndex> {
        self.target
    }

    /// True if the transition runs its actions without leaving the state.
    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }

    /// True if the transition has a guard.
    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// Number of actions executed when the transition fires.
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

impl<CTX, A> Debug for Transition<CTX, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("guarded", &self.guard.is_some())
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl<CTX, A> Transition<CTX, A>
where
    A: EventArgs,
{
    /// Try to fire the transition while the machine is in `current`.
    ///
    /// Returns the new current state, or `None` if the guard rejected the
    /// transition.
    pub(crate) fn fire<S, E>(
        &self,
        traversal: &mut Traversal<'_, S, E, CTX, A>,
        current: StateIndex,
        args: &A,
    ) -> Option<StateIndex>
    where
        S: StateId,
        E: EventId,
    {
        if !self.should_fire(traversal, args) {
            debug!(source = ?traversal.id(self.source), "guard rejected transition");
            return None;
        }

        let Some(target) = self.target else {
            self.perform_actions(traversal, args);
            return Some(current);
        };

        traversal.unwind(current, self.source);
        self.traverse(traversal, self.source, target, args);
        Some(traversal.enter_by_history(target))
    }

    // Walks from `source` to `target` one level at a time until both sides
    // meet, exiting on the way up and entering on the way down.
    fn traverse<S, E>(
        &self,
        traversal: &mut Traversal<'_, S, E, CTX, A>,
        source: StateIndex,
        target: StateIndex,
        args: &A,
    ) where
        S: StateId,
        E: EventId,
    {
        let registry = traversal.registry();
        let source_node = registry.node(source);
        let target_node = registry.node(target);

        if Some(source) == self.target {
            // Self transition, or the source side climbed up to the target.
            traversal.exit(source);
            self.perform_actions(traversal, args);
            traversal.entry(source);
        } else if source == target {
            // The target side climbed up to the source.
            self.perform_actions(traversal, args);
        } else if source_node.parent == target_node.parent {
            traversal.exit(source);
            self.perform_actions(traversal, args);
            traversal.entry(target);
        } else if source_node.level > target_node.level {
            if let Some(source_parent) = source_node.parent {
                traversal.exit(source);
                self.traverse(traversal, source_parent, target, args);
            }
        } else if source_node.level < target_node.level {
            if let Some(target_parent) = target_node.parent {
                self.traverse(traversal, source, target_parent, args);
                traversal.entry(target);
            }
        } else if let (Some(source_parent), Some(target_parent)) =
            (source_node.parent, target_node.parent)
        {
            traversal.exit(source);
            self.traverse(traversal, source_parent, target_parent, args);
            traversal.entry(target);
        }
    }

    fn should_fire<S, E>(&self, traversal: &mut Traversal<'_, S, E, CTX, A>, args: &A) -> bool
    where
        S: StateId,
        E: EventId,
    {
        let Some(guard) = &self.guard else {
            return true;
        };
        match guard(traversal.context(), args) {
            Ok(result) => {
                debug!(source = ?traversal.id(self.source), result, "checked guard");
                result
            }
            Err(source) => {
                let state = traversal.id(self.source).clone();
                error!(?state, error = %source, "guard of transition failed");
                traversal.record_failure(Failure::Guard {
                    state,
                    source: Arc::from(source),
                });
                false
            }
        }
    }

    fn perform_actions<S, E>(&self, traversal: &mut Traversal<'_, S, E, CTX, A>, args: &A)
    where
        S: StateId,
        E: EventId,
    {
        for action in &self.actions {
            if let Err(source) = action(traversal.context_mut(), args) {
                let state = traversal.id(self.source).clone();
                error!(?state, error = %source, "action of transition failed");
                traversal.record_failure(Failure::Action {
                    state,
                    source: Arc::from(source),
                });
            }
        }
    }
}

/// Transitions of one state, grouped by event in registration order.
pub struct TransitionTable<E, CTX, A> {
    transitions: HashMap<E, Vec<Transition<CTX, A>>>,
    order: Vec<E>,
}

impl<E, CTX, A> Default for TransitionTable<E, CTX, A> {
    fn default() -> Self {
        Self {
            transitions: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<E, CTX, A> TransitionTable<E, CTX, A> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no transition has been registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<E, CTX, A> TransitionTable<E, CTX, A>
where
    E: Clone + Eq + Hash,
{
    /// Append a candidate for `event`; earlier candidates are tried first.
    pub(crate) fn add(&mut self, event: E, transition: Transition<CTX, A>) {
        if !self.transitions.contains_key(&event) {
            self.order.push(event.clone());
        }
        self.transitions.entry(event).or_default().push(transition);
    }

    /// Candidates for `event` in registration order.
    pub fn get(&self, event: &E) -> &[Transition<CTX, A>] {
        self.transitions
            .get(event)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All events with their candidates, in the order the events were first registered.
    pub fn iter(&self) -> impl Iterator<Item = (&E, &[Transition<CTX, A>])> {
        self.order
            .iter()
            .map(move |event| (event, self.get(event)))
    }
}
