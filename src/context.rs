//! # Action Context
//!
//! Per-mission scratchpad shared by every action in a plan. One action
//! writes its outputs (`target.x`, `target.y`, `combat_context.target`, …)
//! and the next action reads them unchanged — the execution loop never
//! inspects or rewrites these values, which is what keeps coordinates from
//! silently vanishing between consecutive steps.
//!
//! The context also carries shared handles (knowledge base, map cache,
//! character cache) so handlers receive one argument instead of a web of
//! references. `clear`/`preserve` only touch the value map; handles live for
//! the whole mission.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::api::CharacterCache;
use crate::knowledge::{KnowledgeBase, MapCache};
use crate::state::{params, StateValue, WorldState};

/// Keys that survive `clear()` and every `preserve()` — session identity.
const SESSION_KEYS: &[&str] = &[params::CHARACTER_NAME];

/// Per-mission typed key-value scratchpad over `StateParameter` keys.
pub struct ActionContext {
    values: Mutex<WorldState>,
    pub knowledge: Arc<KnowledgeBase>,
    pub map: Arc<MapCache>,
    pub character: Arc<CharacterCache>,
}

impl ActionContext {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        map: Arc<MapCache>,
        character: Arc<CharacterCache>,
    ) -> Self {
        let mut values = WorldState::new();
        values.insert(
            params::CHARACTER_NAME.to_string(),
            StateValue::from(character.name()),
        );
        Self {
            values: Mutex::new(values),
            knowledge,
            map,
            character,
        }
    }

    pub fn get(&self, key: &str) -> Option<StateValue> {
        self.values.lock().get(key).cloned()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn set(&self, key: &str, value: impl Into<StateValue>) {
        self.values.lock().insert(key.to_string(), value.into());
    }

    /// Handler-output write; identical storage, separate name so call sites
    /// read as data flowing forward to the next action.
    pub fn set_result(&self, key: &str, value: impl Into<StateValue>) {
        let value = value.into();
        debug!(key, ?value, "action result");
        self.values.lock().insert(key.to_string(), value);
    }

    /// Overlay a parameter map (e.g. goal parameters at goal start).
    pub fn set_all(&self, entries: &WorldState) {
        let mut values = self.values.lock();
        for (key, value) in entries {
            values.insert(key.clone(), value.clone());
        }
    }

    /// Drop everything except session identity.
    pub fn clear(&self) {
        self.preserve(&[]);
    }

    /// Drop every key not listed; session identity always survives. Used
    /// when a subplan finishes and control returns to the outer plan.
    pub fn preserve(&self, keep: &[String]) {
        let keep: BTreeSet<&str> = keep
            .iter()
            .map(String::as_str)
            .chain(SESSION_KEYS.iter().copied())
            .collect();
        let mut values = self.values.lock();
        values.retain(|key, _| keep.contains(key.as_str()));
    }

    pub fn snapshot(&self) -> WorldState {
        self.values.lock().clone()
    }
}
