//! Persistable state of a machine instance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Current state and history of an instance, decoupled from any storage.
///
/// A snapshot taken with `passivate` and handed to `activate` on a fresh
/// instance of the same definition resumes the machine without running any
/// entry or exit action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize + Eq + Hash",
    deserialize = "S: Deserialize<'de> + Eq + Hash"
))]
pub struct Snapshot<S> {
    /// Current state, `None` if the machine never entered a state
    pub current_state: Option<S>,
    /// Last active direct sub-state of every composite state with a history mode
    #[serde(with = "history_pairs")]
    pub history: HashMap<S, S>,
}

impl<S> Default for Snapshot<S> {
    fn default() -> Self {
        Self {
            current_state: None,
            history: HashMap::new(),
        }
    }
}

// HashMap equality needs `Eq + Hash` keys, which derive cannot express.
impl<S: Eq + Hash> PartialEq for Snapshot<S> {
    fn eq(&self, other: &Self) -> bool {
        self.current_state == other.current_state && self.history == other.history
    }
}

impl<S: Eq + Hash> Eq for Snapshot<S> {}

impl<S: Eq + Hash> Snapshot<S> {
    /// Snapshot of a machine sitting in `current_state` with no recorded history.
    pub fn new(current_state: Option<S>) -> Self {
        Self {
            current_state,
            history: HashMap::new(),
        }
    }

    /// Record `sub` as the last active sub-state of `super_state`.
    pub fn with_history(mut self, super_state: S, sub: S) -> Self {
        self.history.insert(super_state, sub);
        self
    }

    /// Last active sub-state recorded for `super_state`.
    pub fn last_active(&self, super_state: &S) -> Option<&S> {
        self.history.get(super_state)
    }
}

// Stored as a list of pairs so state ids need not serialize as map keys.
mod history_pairs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::hash::Hash;

    pub fn serialize<S, T>(history: &HashMap<T, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(history.iter())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<HashMap<T, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Eq + Hash,
    {
        let pairs = Vec::<(T, T)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
