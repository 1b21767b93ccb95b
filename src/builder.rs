//! Builder pattern implementation for state machine definitions

use std::sync::Arc;

use tracing::debug;

use crate::definition::StateMachineDefinition;
use crate::error::BoxError;
use crate::notification::{Notification, Observer};
use crate::state::{HistoryMode, StateRegistry};
use crate::transition::{Action, Guard, Transition};
use crate::{EventArgs, EventId, Result, StateId};

/// Builder for constructing state machine definitions
///
/// States are created on first mention. The finished definition is immutable
/// and can be shared by any number of machine instances.
pub struct StateMachineBuilder<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    name: String,
    registry: StateRegistry<S, E, CTX, A>,
    initial_state: Option<S>,
    observers: Vec<Arc<dyn Observer<S, E, A>>>,
}

impl<S, E, CTX, A> StateMachineBuilder<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    CTX: 'static,
    A: EventArgs,
{
    /// Create a new builder for a definition called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: StateRegistry::new(),
            initial_state: None,
            observers: Vec::new(),
        }
    }

    /// Set the state instances start in unless they override it
    pub fn initial_state(mut self, state: S) -> Self {
        self.registry.get_or_create(state.clone());
        self.initial_state = Some(state);
        self
    }

    /// Declare a state without attaching anything to it
    pub fn state(mut self, state: S) -> Self {
        self.registry.get_or_create(state);
        self
    }

    /// Make `super_state` a composite state over `subs`
    ///
    /// `initial` must be one of `subs`. A rejected declaration leaves the
    /// builder's hierarchy unchanged.
    pub fn define_hierarchy<I>(
        mut self,
        super_state: S,
        initial: S,
        history_mode: HistoryMode,
        subs: I,
    ) -> Result<Self, S>
    where
        I: IntoIterator<Item = S>,
    {
        debug!(?super_state, ?initial, ?history_mode, "defining hierarchy");
        self.registry
            .set_super_state(super_state, initial, history_mode, subs)?;
        Ok(self)
    }

    /// Set the action run whenever `state` is entered, replacing any previous one
    pub fn on_entry<F>(mut self, state: S, action: F) -> Self
    where
        F: Fn(&mut CTX) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let index = self.registry.get_or_create(state);
        self.registry.node_mut(index).entry_action = Some(Box::new(action));
        self
    }

    /// Set the action run whenever `state` is exited, replacing any previous one
    pub fn on_exit<F>(mut self, state: S, action: F) -> Self
    where
        F: Fn(&mut CTX) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let index = self.registry.get_or_create(state);
        self.registry.node_mut(index).exit_action = Some(Box::new(action));
        self
    }

    /// Add a transition from `source` on `event`
    ///
    /// Transitions registered for the same state and event are tried in
    /// registration order. Without a target the transition is internal.
    ///
    /// ```
    /// use hierarchical_statechart::StateMachineBuilder;
    ///
    /// let definition = StateMachineBuilder::<&str, &str, u32, ()>::new("counter")
    ///     .transition("Idle", "start", |t| t.to("Busy"))
    ///     .transition("Busy", "tick", |t| {
    ///         t.action(|count: &mut u32, _: &()| {
    ///             *count += 1;
    ///             Ok(())
    ///         })
    ///     })
    ///     .initial_state("Idle")
    ///     .build();
    ///
    /// assert_eq!(definition.states().count(), 2);
    /// ```
    pub fn transition<F>(mut self, source: S, event: E, configure: F) -> Self
    where
        F: FnOnce(TransitionBuilder<S, CTX, A>) -> TransitionBuilder<S, CTX, A>,
    {
        let draft = configure(TransitionBuilder::new());
        let source = self.registry.get_or_create(source);
        let target = draft.target.map(|target| self.registry.get_or_create(target));
        self.registry.node_mut(source).transitions.add(
            event,
            Transition {
                source,
                target,
                guard: draft.guard,
                actions: draft.actions,
            },
        );
        self
    }

    /// Add an observer every instance of the definition starts with
    pub fn observer(mut self, observer: Arc<dyn Observer<S, E, A>>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add a closure observer every instance of the definition starts with
    pub fn observe<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Notification<S, E, A>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Build the definition
    pub fn build(self) -> Arc<StateMachineDefinition<S, E, CTX, A>> {
        debug!(name = %self.name, states = self.registry.len(), "built state machine definition");
        Arc::new(StateMachineDefinition::new(
            self.name,
            self.registry,
            self.initial_state,
            self.observers,
        ))
    }
}

/// Configures a single transition, see [`StateMachineBuilder::transition`]
pub struct TransitionBuilder<S, CTX, A> {
    target: Option<S>,
    guard: Option<Guard<CTX, A>>,
    actions: Vec<Action<CTX, A>>,
}

impl<S, CTX, A> TransitionBuilder<S, CTX, A> {
    fn new() -> Self {
        Self {
            target: None,
            guard: None,
            actions: Vec::new(),
        }
    }

    /// Leave the source state for `target`
    pub fn to(mut self, target: S) -> Self {
        self.target = Some(target);
        self
    }

    /// Only fire while `guard` returns `Ok(true)`
    pub fn guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&CTX, &A) -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Run `action` while firing, after the previously added actions
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut CTX, &A) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.actions.push(Box::new(action));
        self
    }
}
