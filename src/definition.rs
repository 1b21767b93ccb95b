//! Immutable state machine definitions shared by machine instances.

use std::fmt;
use std::sync::Arc;

use crate::driver::{SynchronousDriver, ThreadedDriver};
use crate::interpreter::Interpreter;
use crate::notification::Observer;
use crate::state::{HistoryMode, StateNode, StateRegistry};
use crate::{EventArgs, EventId, StateId};

/// States, hierarchy, transitions and default observers of a machine.
///
/// Built once by [`StateMachineBuilder`](crate::StateMachineBuilder) and
/// shared behind an `Arc`; instances keep their own current state, history
/// and context.
pub struct StateMachineDefinition<S, E, CTX, A>
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

impl<S, E, CTX, A> StateMachineDefinition<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    pub(crate) fn new(
        name: String,
        registry: StateRegistry<S, E, CTX, A>,
        initial_state: Option<S>,
        observers: Vec<Arc<dyn Observer<S, E, A>>>,
    ) -> Self {
        Self {
            name,
            registry,
            initial_state,
            observers,
        }
    }

    /// Name of the definition
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default initial state of new instances
    pub fn initial_state(&self) -> Option<&S> {
        self.initial_state.as_ref()
    }

    /// The state arena
    pub fn registry(&self) -> &StateRegistry<S, E, CTX, A> {
        &self.registry
    }

    pub(crate) fn observers(&self) -> &[Arc<dyn Observer<S, E, A>>] {
        &self.observers
    }

    /// All state ids in creation order
    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.registry.iter().map(|(_, node)| node.id())
    }

    /// Super-state of `state`
    pub fn parent_of(&self, state: &S) -> Option<&S> {
        let node = self.registry.get(state)?;
        node.parent().map(|parent| self.registry.id(parent))
    }

    /// Direct sub-states of `state` in declaration order
    pub fn children_of(&self, state: &S) -> Vec<&S> {
        self.registry
            .get(state)
            .map(|node| {
                node.children()
                    .iter()
                    .map(|&child| self.registry.id(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Initial sub-state of a composite `state`
    pub fn initial_child_of(&self, state: &S) -> Option<&S> {
        let node = self.registry.get(state)?;
        node.initial_child().map(|child| self.registry.id(child))
    }

    /// History mode of `state`, `None` if the state is unknown
    pub fn history_mode_of(&self, state: &S) -> Option<HistoryMode> {
        self.registry.get(state).map(StateNode::history_mode)
    }

    /// Depth of `state`, 1 for top level states
    pub fn level_of(&self, state: &S) -> Option<usize> {
        self.registry.get(state).map(StateNode::level)
    }

    /// Render the definition as a PlantUML state diagram
    #[cfg(all(feature = "plantuml", debug_assertions))]
    pub fn export_plantuml(&self) -> String {
        crate::plantuml::generate(self, None)
    }

    /// Stub for export_plantuml when feature is disabled
    #[cfg(not(all(feature = "plantuml", debug_assertions)))]
    pub fn export_plantuml(&self) -> String {
        String::from("PlantUML export not available (requires 'plantuml' feature and debug build)")
    }
}

impl<S, E, CTX, A> StateMachineDefinition<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    CTX: Send + 'static,
    A: EventArgs,
{
    /// Create an interpreter for a new instance called `name`
    pub fn interpreter(self: &Arc<Self>, name: impl Into<String>, context: CTX) -> Interpreter<S, E, CTX, A> {
        Interpreter::new(Arc::clone(self), name, context)
    }

    /// Create an instance that processes events on the caller's thread
    pub fn create_synchronous(
        self: &Arc<Self>,
        name: impl Into<String>,
        context: CTX,
    ) -> SynchronousDriver<S, E, CTX, A> {
        SynchronousDriver::new(self.interpreter(name, context))
    }

    /// Create an instance that processes events on a worker thread
    pub fn create_threaded(
        self: &Arc<Self>,
        name: impl Into<String>,
        context: CTX,
    ) -> ThreadedDriver<S, E, CTX, A> {
        ThreadedDriver::new(self.interpreter(name, context))
    }
}

impl<S, E, CTX, A> fmt::Debug for StateMachineDefinition<S, E, CTX, A>
where
    S: StateId,
    E: EventId,
    A: EventArgs,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineDefinition")
            .field("name", &self.name)
            .field("initial_state", &self.initial_state)
            .field("states", &self.registry.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}
