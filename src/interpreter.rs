//! The per-instance interpreter executing a shared definition.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::definition::StateMachineDefinition;
use crate::notification::{Notification, Notifier, Observer, TransitionContext};
use crate::snapshot::Snapshot;
use crate::state::StateIndex;
use crate::traversal::{Record, Traversal};
use crate::{Error, EventArgs, EventId, Failure, Result, StateId};

/// What happened while dispatching one event.
#[derive(Debug, Clone)]
pub struct Outcome<S: std::fmt::Debug> {
    /// True if a transition accepted the event
    pub fired: bool,
    /// Current state after the dispatch, set when `fired` is true
    pub new_state: Option<S>,
    /// Callback failures in the order they occurred
    pub failures: Vec<Failure<S>>,
    /// States exited and entered, in execution order
    pub records: Vec<Record<S>>,
}

/// Executes a [`StateMachineDefinition`] for one machine instance.
///
/// The interpreter owns the instance data: current state, history and the
/// user context handed to guards and actions. It knows nothing about queues
/// or threads; drivers decide when events reach [`Interpreter::fire`].
pub struct Interpreter<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    definition: Arc<StateMachineDefinition<S, E, CTX, A>>,
    initial_state: Option<S>,
    current_state: Option<StateIndex>,
    history: HashMap<StateIndex, StateIndex>,
    context: CTX,
    notifier: Notifier<S, E, A>,
}

impl<S, E, CTX, A> Interpreter<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    /// Create an interpreter starting in the definition's initial state
    pub fn new(
        definition: Arc<StateMachineDefinition<S, E, CTX, A>>,
        name: impl Into<String>,
        context: CTX,
    ) -> Self {
        let notifier = Notifier::new(name.into(), definition.observers().to_vec());
        Self {
            initial_state: definition.initial_state().cloned(),
            definition,
            current_state: None,
            history: HashMap::new(),
            context,
            notifier,
        }
    }

    /// Start in `state` instead of the definition's initial state
    pub fn with_initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an observer for this instance only
    pub fn with_observer(mut self, observer: Arc<dyn Observer<S, E, A>>) -> Self {
        self.notifier.add(observer);
        self
    }

    /// Name of the instance
    pub fn name(&self) -> &str {
        self.notifier.machine()
    }

    /// The definition this instance executes
    pub fn definition(&self) -> &Arc<StateMachineDefinition<S, E, CTX, A>> {
        &self.definition
    }

    /// Get the current state
    pub fn current_state(&self) -> Option<S> {
        self.current_state
            .map(|index| self.definition.registry().id(index).clone())
    }

    /// Last active sub-state of every composite state with a history mode
    pub fn history(&self) -> HashMap<S, S> {
        let registry = self.definition.registry();
        self.history
            .iter()
            .map(|(&composite, &sub)| (registry.id(composite).clone(), registry.id(sub).clone()))
            .collect()
    }

    /// Get a reference to the context
    pub fn context(&self) -> &CTX {
        &self.context
    }

    /// Get a mutable reference to the context
    pub fn context_mut(&mut self) -> &mut CTX {
        &mut self.context
    }

    /// Enter the initial state.
    ///
    /// The ancestors of the initial state are entered top-down, then the
    /// initial state itself, then its sub-states according to its history
    /// mode.
    pub fn initialize(&mut self) -> Result<Vec<Record<S>>, S> {
        let initial = self.initial_state.clone().ok_or(Error::MissingInitialState)?;
        let definition = Arc::clone(&self.definition);
        let registry = definition.registry();
        let index = registry
            .index_of(&initial)
            .ok_or_else(|| Error::UnknownState(initial.clone()))?;

        info!(machine = %self.notifier.machine(), state = ?initial, "initializing state machine");

        let mut chain = Vec::new();
        let mut state = Some(index);
        while let Some(current) = state {
            chain.push(current);
            state = registry.node(current).parent();
        }

        let mut traversal = Traversal::new(
            registry,
            &mut self.context,
            &mut self.history,
            &self.notifier,
            None,
        );
        for &state in chain.iter().rev() {
            traversal.entry(state);
        }
        let leaf = traversal.enter_by_history(index);
        let (records, _) = traversal.finish();

        self.current_state = Some(leaf);
        debug!(machine = %self.notifier.machine(), state = ?registry.id(leaf), "initialized");
        Ok(records)
    }

    /// Dispatch one event.
    ///
    /// The current state and then its ancestors are searched for a
    /// transition on `event` whose guard passes. Callback failures are
    /// captured in the outcome and never abort the dispatch.
    pub fn fire(&mut self, event: E, args: A) -> Result<Outcome<S>, S> {
        let current = self.current_state.ok_or(Error::NotInitialized)?;
        let definition = Arc::clone(&self.definition);
        let registry = definition.registry();

        let transition = TransitionContext {
            state: registry.id(current).clone(),
            event,
            args,
        };
        debug!(
            machine = %self.notifier.machine(),
            state = ?transition.state,
            event = ?transition.event,
            args = ?transition.args,
            "firing event"
        );
        self.notifier
            .notify(Notification::TransitionBegin(transition.clone()));

        let mut traversal = Traversal::new(
            registry,
            &mut self.context,
            &mut self.history,
            &self.notifier,
            Some(transition.clone()),
        );
        let new_state = Self::dispatch(&mut traversal, current, &transition.event, &transition.args);
        let (records, failures) = traversal.finish();

        match new_state {
            Some(new_state) => {
                self.current_state = Some(new_state);
                let new_state = registry.id(new_state).clone();
                info!(
                    machine = %self.notifier.machine(),
                    from = ?transition.state,
                    to = ?new_state,
                    "switched state"
                );
                self.notifier.notify(Notification::TransitionCompleted {
                    transition,
                    new_state: new_state.clone(),
                });
                Ok(Outcome {
                    fired: true,
                    new_state: Some(new_state),
                    failures,
                    records,
                })
            }
            None => {
                warn!(
                    machine = %self.notifier.machine(),
                    state = ?transition.state,
                    event = ?transition.event,
                    "event declined"
                );
                self.notifier
                    .notify(Notification::TransitionDeclined(transition));
                Ok(Outcome {
                    fired: false,
                    new_state: None,
                    failures,
                    records,
                })
            }
        }
    }

    // Searches the current state, then each ancestor, for a transition that fires.
    fn dispatch(
        traversal: &mut Traversal<'_, S, E, CTX, A>,
        current: StateIndex,
        event: &E,
        args: &A,
    ) -> Option<StateIndex> {
        let registry = traversal.registry();
        let mut state = Some(current);
        while let Some(index) = state {
            let node = registry.node(index);
            for transition in node.transitions().get(event) {
                if let Some(new_state) = transition.fire(traversal, current, args) {
                    return Some(new_state);
                }
            }
            state = node.parent();
        }
        None
    }

    /// Exit the current state and all of its ancestors.
    ///
    /// The current state is kept so it can still be queried afterwards.
    pub fn terminate(&mut self) -> Vec<Record<S>> {
        let Some(current) = self.current_state else {
            return Vec::new();
        };
        let definition = Arc::clone(&self.definition);
        info!(machine = %self.notifier.machine(), state = ?definition.registry().id(current), "terminating state machine");

        let mut traversal = Traversal::new(
            definition.registry(),
            &mut self.context,
            &mut self.history,
            &self.notifier,
            None,
        );
        traversal.exit_all(current);
        let (records, _) = traversal.finish();
        records
    }

    /// Capture the current state and history
    pub fn snapshot(&self) -> Snapshot<S> {
        Snapshot {
            current_state: self.current_state(),
            history: self.history(),
        }
    }

    /// Replace current state and history without running any action.
    ///
    /// Every state in the snapshot must belong to the definition and every
    /// history entry must name a direct sub-state. On error the instance is
    /// left unchanged.
    pub fn restore(&mut self, snapshot: &Snapshot<S>) -> Result<(), S> {
        let registry = self.definition.registry();
        let resolve = |state: &S| {
            registry
                .index_of(state)
                .ok_or_else(|| Error::UnknownState(state.clone()))
        };

        let current_state = snapshot.current_state.as_ref().map(&resolve).transpose()?;
        let mut history = HashMap::with_capacity(snapshot.history.len());
        for (composite, sub) in &snapshot.history {
            let composite_index = resolve(composite)?;
            let sub_index = resolve(sub)?;
            if registry.node(sub_index).parent() != Some(composite_index) {
                return Err(Error::InvalidHistory {
                    super_state: composite.clone(),
                    sub: sub.clone(),
                });
            }
            history.insert(composite_index, sub_index);
        }

        debug!(machine = %self.notifier.machine(), state = ?snapshot.current_state, "restored snapshot");
        self.current_state = current_state;
        self.history = history;
        Ok(())
    }

    /// Render the definition with the current state highlighted
    #[cfg(all(feature = "plantuml", debug_assertions))]
    pub fn export_plantuml(&self) -> String {
        let current = self.current_state();
        crate::plantuml::generate(&self.definition, current.as_ref())
    }

    /// Stub for export_plantuml when feature is disabled
    #[cfg(not(all(feature = "plantuml", debug_assertions)))]
    pub fn export_plantuml(&self) -> String {
        String::from("PlantUML export not available (requires 'plantuml' feature and debug build)")
    }
}
