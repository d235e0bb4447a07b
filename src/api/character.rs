//! Character refresh cache and the typed state extractor.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::state::{params, StateStore};

use super::{ApiError, CharacterData, GameApi};

/// Write the character sheet into the world state through known
/// `StateParameter` keys only.
///
/// This is the explicit adapter replacing wholesale attribute mirroring:
/// schema drift on the server side shows up here as a missing field, not as
/// silently renamed state keys. Derived predicates (`alive`, `safe`,
/// `healthy`, `hp_percentage`) recompute inside the store.
pub fn apply_character(store: &StateStore, character: &CharacterData) {
    let now = Utc::now();
    let on_cooldown = match character.cooldown_expiration {
        Some(expiration) => expiration > now,
        None => character.cooldown > 0,
    };

    // set() only fails for derived keys, and none of these are.
    let _ = store.set(params::CHARACTER_NAME, character.name.as_str());
    let _ = store.set(params::CHARACTER_LEVEL, character.level);
    let _ = store.set(params::CHARACTER_XP, character.xp);
    let _ = store.set(params::CHARACTER_MAX_XP, character.max_xp);
    let _ = store.set(params::CHARACTER_HP, character.hp);
    let _ = store.set(params::CHARACTER_MAX_HP, character.max_hp);
    let _ = store.set(params::CHARACTER_COOLDOWN_ACTIVE, on_cooldown);
    let _ = store.set(params::LOCATION_X, character.x);
    let _ = store.set(params::LOCATION_Y, character.y);
    if let Some(weapon) = &character.weapon_slot {
        let _ = store.set(params::EQUIPMENT_WEAPON, weapon.as_str());
    }
}

/// Cached character sheet with throttled refresh.
///
/// Action responses already carry the updated sheet, so most iterations
/// never hit the character endpoint; the cache only refreshes when its age
/// exceeds the configured staleness window or when a caller forces it
/// (e.g. after a cooldown wait).
pub struct CharacterCache {
    name: String,
    data: Mutex<CharacterData>,
    last_refresh: Mutex<DateTime<Utc>>,
    staleness: Duration,
}

impl CharacterCache {
    pub fn new(initial: CharacterData, staleness_secs: i64) -> Self {
        Self {
            name: initial.name.clone(),
            data: Mutex::new(initial),
            last_refresh: Mutex::new(Utc::now()),
            staleness: Duration::seconds(staleness_secs),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> CharacterData {
        self.data.lock().clone()
    }

    /// Overwrite from an action response and reset the staleness clock.
    pub fn update(&self, character: CharacterData) {
        *self.data.lock() = character;
        *self.last_refresh.lock() = Utc::now();
    }

    pub fn is_stale(&self) -> bool {
        Utc::now() - *self.last_refresh.lock() > self.staleness
    }

    /// Re-fetch from the server when stale; no-op otherwise.
    pub async fn refresh_if_stale(&self, api: &dyn GameApi) -> Result<CharacterData, ApiError> {
        if self.is_stale() {
            return self.force_refresh(api).await;
        }
        Ok(self.get())
    }

    pub async fn force_refresh(&self, api: &dyn GameApi) -> Result<CharacterData, ApiError> {
        debug!(name = %self.name, "refreshing character from server");
        let fresh = api.get_character(&self.name).await?;
        self.update(fresh.clone());
        Ok(fresh)
    }
}
