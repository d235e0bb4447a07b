//! Cooldown parsing and the synthesized wait step.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::actions::ActionRegistry;
use crate::api::{CharacterData, GameApi};
use crate::context::ActionContext;
use crate::state::params;

/// Gates action dispatch on the server's cooldown signals.
///
/// `cooldown_expiration` is authoritative; the legacy `cooldown` seconds
/// field goes stale the moment the window elapses and is consulted only
/// when no expiration timestamp is present at all.
pub struct CooldownManager {
    min_wait: f64,
    max_wait: f64,
    /// Character refreshes after a wait are throttled to this interval.
    refresh_throttle: Duration,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::with_limits(0.5, 65.0, 5.0)
    }

    pub fn with_limits(min_wait: f64, max_wait: f64, refresh_throttle_secs: f64) -> Self {
        Self {
            min_wait,
            max_wait,
            refresh_throttle: Duration::milliseconds((refresh_throttle_secs * 1000.0) as i64),
            last_refresh: Mutex::new(None),
        }
    }

    /// True iff the character is currently on cooldown.
    pub fn is_on_cooldown(character: &CharacterData) -> bool {
        match character.cooldown_expiration {
            Some(expiration) => expiration > Utc::now(),
            None => character.cooldown > 0,
        }
    }

    /// Seconds until the cooldown clears, clamped to the configured window.
    pub fn wait_duration(&self, character: &CharacterData) -> f64 {
        let remaining = match character.cooldown_expiration {
            Some(expiration) => {
                let delta = expiration - Utc::now();
                delta.num_milliseconds() as f64 / 1000.0
            }
            None => character.cooldown as f64,
        };
        remaining.clamp(self.min_wait, self.max_wait)
    }

    /// Synthesize and dispatch a wait step, then make sure downstream reads
    /// see the cleared cooldown (refresh throttled by the cache duration).
    pub async fn handle_cooldown_with_wait(
        &self,
        api: &dyn GameApi,
        registry: &ActionRegistry,
        ctx: &ActionContext,
    ) -> bool {
        let character = ctx.character.get();
        let seconds = self.wait_duration(&character);
        info!(seconds, "character on cooldown, synthesizing wait");
        ctx.set(params::WAIT_DURATION_SECS, seconds);

        let result = registry.execute("wait", api, ctx).await;
        if !result.success {
            return false;
        }

        let should_refresh = {
            let last = self.last_refresh.lock();
            last.map_or(true, |at| Utc::now() - at > self.refresh_throttle)
        };
        if should_refresh {
            if ctx.character.force_refresh(api).await.is_ok() {
                *self.last_refresh.lock() = Some(Utc::now());
            }
        } else {
            debug!("skipping post-wait refresh, cache is recent");
        }
        true
    }
}

impl Default for CooldownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(cooldown: i64, expiration: Option<DateTime<Utc>>) -> CharacterData {
        CharacterData {
            name: "ember".to_string(),
            cooldown,
            cooldown_expiration: expiration,
            ..Default::default()
        }
    }

    #[test]
    fn test_expired_expiration_beats_stale_legacy_field() {
        let c = character(24, Some(Utc::now() - Duration::seconds(10)));
        assert!(!CooldownManager::is_on_cooldown(&c));
    }

    #[test]
    fn test_future_expiration_is_on_cooldown() {
        let c = character(0, Some(Utc::now() + Duration::seconds(30)));
        assert!(CooldownManager::is_on_cooldown(&c));
    }

    #[test]
    fn test_legacy_field_used_only_without_expiration() {
        let c = character(5, None);
        assert!(CooldownManager::is_on_cooldown(&c));

        let c = character(0, None);
        assert!(!CooldownManager::is_on_cooldown(&c));
    }

    #[test]
    fn test_wait_duration_clamped() {
        let manager = CooldownManager::with_limits(1.0, 10.0, 5.0);

        let long = character(0, Some(Utc::now() + Duration::seconds(300)));
        assert_eq!(manager.wait_duration(&long), 10.0);

        let expired = character(0, Some(Utc::now() - Duration::seconds(5)));
        assert_eq!(manager.wait_duration(&expired), 1.0);
    }
}
