//! State hierarchy model: nodes, history modes and the registry arena.
//!
//! Nodes never point at each other directly. Parent, children and initial
//! sub-state links are [`StateIndex`] values into the registry, which owns
//! every node of a definition.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::hash::Hash;

use crate::transition::{StateAction, TransitionTable};
use crate::{Error, Result};

/// Which sub-state a composite state re-enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HistoryMode {
    /// Always enter the initial sub-state chain.
    #[default]
    None,
    /// Restore the last active direct sub-state, below it follow initial sub-states.
    Shallow,
    /// Restore the last active sub-state at every level.
    Deep,
}

/// Dense index of a node inside a [`StateRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateIndex(pub(crate) usize);

/// A single state of the hierarchy.
pub struct StateNode<S, E, CTX, A> {
    pub(crate) id: S,
    pub(crate) level: usize,
    pub(crate) parent: Option<StateIndex>,
    pub(crate) children: Vec<StateIndex>,
    pub(crate) history_mode: HistoryMode,
    pub(crate) initial_child: Option<StateIndex>,
    pub(crate) entry_action: Option<StateAction<CTX>>,
    pub(crate) exit_action: Option<StateAction<CTX>>,
    pub(crate) transitions: TransitionTable<E, CTX, A>,
}

impl<S, E, CTX, A> StateNode<S, E, CTX, A>
where
    E: Clone + Eq + Hash,
{
    fn new(id: S) -> Self {
        Self {
            id,
            level: 1,
            parent: None,
            children: Vec::new(),
            history_mode: HistoryMode::None,
            initial_child: None,
            entry_action: None,
            exit_action: None,
            transitions: TransitionTable::new(),
        }
    }
}

impl<S, E, CTX, A> StateNode<S, E, CTX, A> {
    /// The state id.
    pub fn id(&self) -> &S {
        &self.id
    }

    /// Depth in the hierarchy, 1 for top level states.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Index of the super-state, if any.
    pub fn parent(&self) -> Option<StateIndex> {
        self.parent
    }

    /// Indices of the direct sub-states in declaration order.
    pub fn children(&self) -> &[StateIndex] {
        &self.children
    }

    /// History mode used when this state is re-entered.
    pub fn history_mode(&self) -> HistoryMode {
        self.history_mode
    }

    /// Index of the initial sub-state, if this is a composite state.
    pub fn initial_child(&self) -> Option<StateIndex> {
        self.initial_child
    }

    /// Transitions leaving this state.
    pub fn transitions(&self) -> &TransitionTable<E, CTX, A> {
        &self.transitions
    }

    /// True if the state has sub-states.
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

impl<S: Debug, E, CTX, A> Debug for StateNode<S, E, CTX, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("history_mode", &self.history_mode)
            .field("initial_child", &self.initial_child)
            .field("entry_action", &self.entry_action.is_some())
            .field("exit_action", &self.exit_action.is_some())
            .finish()
    }
}

/// Arena of all states of a definition, created lazily by id.
pub struct StateRegistry<S, E, CTX, A> {
    nodes: Vec<StateNode<S, E, CTX, A>>,
    index: HashMap<S, StateIndex>,
}

impl<S, E, CTX, A> Default for StateRegistry<S, E, CTX, A> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<S, E, CTX, A> StateRegistry<S, E, CTX, A>
where
    S: Clone + Debug + Eq + Hash,
    E: Clone + Eq + Hash,
{
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `id`, creating the node on first use.
    pub fn get_or_create(&mut self, id: S) -> StateIndex {
        if let Some(index) = self.index.get(&id) {
            return *index;
        }
        let index = StateIndex(self.nodes.len());
        self.nodes.push(StateNode::new(id.clone()));
        self.index.insert(id, index);
        index
    }

    /// Look up the index of an existing state.
    pub fn index_of(&self, id: &S) -> Option<StateIndex> {
        self.index.get(id).copied()
    }

    /// Look up an existing state by id.
    pub fn get(&self, id: &S) -> Option<&StateNode<S, E, CTX, A>> {
        self.index_of(id).map(|index| self.node(index))
    }

    /// Resolve an index handed out by this registry.
    pub fn node(&self, index: StateIndex) -> &StateNode<S, E, CTX, A> {
        &self.nodes[index.0]
    }

    pub(crate) fn node_mut(&mut self, index: StateIndex) -> &mut StateNode<S, E, CTX, A> {
        &mut self.nodes[index.0]
    }

    /// Id of the state at `index`.
    pub fn id(&self, index: StateIndex) -> &S {
        &self.nodes[index.0].id
    }

    /// Number of registered states.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no state has been registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All states in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (StateIndex, &StateNode<S, E, CTX, A>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (StateIndex(i), node))
    }

    /// True if `node` lies strictly below `ancestor`.
    pub fn is_descendant(&self, node: StateIndex, ancestor: StateIndex) -> bool {
        let mut current = self.node(node).parent;
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.node(index).parent;
        }
        false
    }

    /// Declare `super_id` as a composite state over `subs`.
    ///
    /// All checks run before anything is wired, so a rejected declaration
    /// leaves the hierarchy untouched.
    pub fn set_super_state<I>(
        &mut self,
        super_id: S,
        initial_id: S,
        history_mode: HistoryMode,
        subs: I,
    ) -> Result<(), S>
    where
        I: IntoIterator<Item = S>,
    {
        let subs: Vec<S> = subs.into_iter().collect();

        let mut seen = HashSet::new();
        for sub in &subs {
            if !seen.insert(sub) {
                return Err(Error::DuplicateSubState(sub.clone()));
            }
            if *sub == super_id {
                return Err(Error::SelfSuperState(super_id));
            }
        }
        if initial_id == super_id {
            return Err(Error::SelfInitialState(super_id));
        }
        if !subs.contains(&initial_id) {
            return Err(Error::InitialStateNotSubState {
                super_state: super_id,
                initial: initial_id,
            });
        }

        let super_index = self.get_or_create(super_id.clone());
        let sub_indices: Vec<StateIndex> = subs
            .into_iter()
            .map(|sub| self.get_or_create(sub))
            .collect();

        for &sub in &sub_indices {
            if let Some(existing) = self.node(sub).parent {
                if existing != super_index {
                    return Err(Error::SuperStateAlreadyDefined {
                        state: self.id(sub).clone(),
                        existing: self.id(existing).clone(),
                        requested: super_id,
                    });
                }
            }
            if self.is_descendant(super_index, sub) {
                return Err(Error::HierarchyCycle {
                    super_state: super_id,
                    sub: self.id(sub).clone(),
                });
            }
        }

        let level = self.node(super_index).level + 1;
        for &sub in &sub_indices {
            self.node_mut(sub).parent = Some(super_index);
            let parent = self.node_mut(super_index);
            if !parent.children.contains(&sub) {
                parent.children.push(sub);
            }
            self.set_level(sub, level);
        }

        let initial_index = self.get_or_create(initial_id);
        let node = self.node_mut(super_index);
        node.history_mode = history_mode;
        node.initial_child = Some(initial_index);
        Ok(())
    }

    // Levels of the whole subtree follow the new parent link.
    fn set_level(&mut self, root: StateIndex, level: usize) {
        let mut pending = vec![(root, level)];
        while let Some((index, level)) = pending.pop() {
            let node = self.node_mut(index);
            node.level = level;
            pending.extend(node.children.iter().map(|&child| (child, level + 1)));
        }
    }
}
