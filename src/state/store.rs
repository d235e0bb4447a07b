//! Live world-state store and the pure helpers the planner shares.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;

use super::params;
use super::value::{condition_met, StateValue};
use super::StateError;

/// Flat mapping from `StateParameter` key to value.
///
/// A `BTreeMap` keeps iteration and serialization order canonical, which the
/// planner relies on for state deduplication and tests rely on for
/// byte-stable snapshots.
pub type WorldState = BTreeMap<String, StateValue>;

/// True iff every condition in `partial` is met by `state`.
pub fn matches(state: &WorldState, partial: &WorldState) -> bool {
    partial
        .iter()
        .all(|(key, expected)| condition_met(expected, state.get(key)))
}

/// Keys whose value differs between `a` and `b`, valued from `b`. Keys absent
/// from `b` are reported as `Null`.
pub fn diff(a: &WorldState, b: &WorldState) -> WorldState {
    let mut out = WorldState::new();
    for (key, old) in a {
        match b.get(key) {
            Some(new) if new == old => {}
            Some(new) => {
                out.insert(key.clone(), new.clone());
            }
            None => {
                out.insert(key.clone(), StateValue::Null);
            }
        }
    }
    for (key, new) in b {
        if !a.contains_key(key) {
            out.insert(key.clone(), new.clone());
        }
    }
    out
}

/// Overlay `effects` onto a copy of `state`.
///
/// A string effect of the form `+N` increments the current numeric value (an
/// absent key counts as zero); every other effect replaces. This is the
/// speculative overlay the planner explores with, so declared effects on
/// derived keys (e.g. `rest` promising `character_status.healthy`) apply
/// here; the live store refuses them and recomputes instead.
pub fn apply_effects(state: &WorldState, effects: &WorldState) -> WorldState {
    let mut next = state.clone();
    for (key, effect) in effects {
        let value = resolve_effect(effect, next.get(key));
        next.insert(key.clone(), value);
    }
    next
}

fn resolve_effect(effect: &StateValue, current: Option<&StateValue>) -> StateValue {
    if let Some(increment) = effect.as_str().and_then(parse_increment) {
        let base = current.and_then(StateValue::as_f64).unwrap_or(0.0);
        let sum = base + increment;
        // Stay integral when both sides are.
        let integral = increment.fract() == 0.0
            && current.map_or(true, |v| matches!(v, StateValue::Int(_)));
        if integral {
            return StateValue::Int(sum as i64);
        }
        return StateValue::Float(sum);
    }
    effect.clone()
}

fn parse_increment(s: &str) -> Option<f64> {
    s.strip_prefix('+')?.parse::<f64>().ok()
}

/// Thread-safe owner of the live world state.
///
/// All mutation funnels through `set`/`merge`, which recompute the derived
/// predicates (`alive`, `safe`, `healthy`, `hp_percentage`) from their
/// inputs. Reads hand out value snapshots, never references into the map.
pub struct StateStore {
    live: Mutex<WorldState>,
    hp_safe_percentage: f64,
    hp_healthy_percentage: f64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_thresholds(30.0, 80.0)
    }

    /// Derived-predicate thresholds: `safe` and `healthy` flip when
    /// `hp_percentage` reaches the respective value.
    pub fn with_thresholds(hp_safe_percentage: f64, hp_healthy_percentage: f64) -> Self {
        Self {
            live: Mutex::new(WorldState::new()),
            hp_safe_percentage,
            hp_healthy_percentage,
        }
    }

    pub fn get(&self, key: &str) -> Option<StateValue> {
        self.live.lock().get(key).cloned()
    }

    /// Write one key. Derived predicates cannot be assigned.
    pub fn set(&self, key: &str, value: impl Into<StateValue>) -> Result<(), StateError> {
        if params::is_derived(key) {
            return Err(StateError::DerivedKey(key.to_string()));
        }
        let mut live = self.live.lock();
        live.insert(key.to_string(), value.into());
        self.recompute_derived(&mut live);
        Ok(())
    }

    /// Overlay a partial state. Effect increments (`+N`) are honored.
    /// Declared effects on derived keys are dropped — the recompute below
    /// is authoritative.
    pub fn merge(&self, partial: &WorldState) {
        let mut live = self.live.lock();
        for (key, effect) in partial {
            if params::is_derived(key) {
                continue;
            }
            let value = resolve_effect(effect, live.get(key));
            live.insert(key.clone(), value);
        }
        self.recompute_derived(&mut live);
    }

    /// Immutable value snapshot of the full state, derived keys included.
    pub fn snapshot(&self) -> WorldState {
        self.live.lock().clone()
    }

    pub fn matches(&self, partial: &WorldState) -> bool {
        matches(&self.live.lock(), partial)
    }

    /// Keys under `prefix.` with the prefix stripped — the on-demand nested
    /// view of one domain.
    pub fn domain(&self, prefix: &str) -> WorldState {
        let live = self.live.lock();
        let dotted = format!("{prefix}.");
        live.iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&dotted)
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect()
    }

    /// Serialize the live state to a YAML snapshot file.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let snapshot = self.snapshot();
        let yaml = serde_yaml::to_string(&snapshot)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Restore from a YAML snapshot, then recompute derived predicates. A
    /// missing file is not an error; the store simply starts empty.
    pub fn load(&self, path: &Path) -> Result<(), StateError> {
        if !path.exists() {
            return Ok(());
        }
        let yaml = std::fs::read_to_string(path)?;
        let snapshot: WorldState = serde_yaml::from_str(&yaml)?;
        let mut live = self.live.lock();
        for (key, value) in snapshot {
            if params::is_derived(&key) {
                continue;
            }
            live.insert(key, value);
        }
        self.recompute_derived(&mut live);
        Ok(())
    }

    fn recompute_derived(&self, state: &mut WorldState) {
        let hp = state.get(params::CHARACTER_HP).and_then(StateValue::as_f64);
        let max_hp = state
            .get(params::CHARACTER_MAX_HP)
            .and_then(StateValue::as_f64);
        let (Some(hp), Some(max_hp)) = (hp, max_hp) else {
            return;
        };
        let pct = if max_hp > 0.0 { hp / max_hp * 100.0 } else { 0.0 };
        state.insert(
            params::CHARACTER_HP_PERCENTAGE.to_string(),
            StateValue::Float(pct),
        );
        state.insert(
            params::CHARACTER_ALIVE.to_string(),
            StateValue::Bool(hp > 0.0),
        );
        state.insert(
            params::CHARACTER_SAFE.to_string(),
            StateValue::Bool(pct >= self.hp_safe_percentage),
        );
        state.insert(
            params::CHARACTER_HEALTHY.to_string(),
            StateValue::Bool(pct >= self.hp_healthy_percentage),
        );
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
