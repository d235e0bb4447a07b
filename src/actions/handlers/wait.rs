//! Cooldown wait step, synthesized by the cooldown manager.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::actions::{observe_character, ActionHandler, ActionResult};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::state::params;

/// Ceiling on a single wait, even if the server reports a longer cooldown.
const MAX_WAIT_SECS: f64 = 65.0;

/// Sleeps out the cooldown the manager computed into
/// `wait.duration_secs`, then refreshes the character so downstream reads
/// see the cleared cooldown.
pub struct WaitHandler;

#[async_trait]
impl ActionHandler for WaitHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let seconds = ctx
            .get_f64(params::WAIT_DURATION_SECS)
            .unwrap_or(1.0)
            .clamp(0.0, MAX_WAIT_SECS);
        info!(seconds, "waiting out cooldown");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;

        match ctx.character.force_refresh(api).await {
            Ok(fresh) => ActionResult::success().with_observations(observe_character(&fresh)),
            // The wait itself succeeded; a failed refresh only means the
            // next read works from the cached sheet.
            Err(_) => {
                ActionResult::success().with_data(params::CHARACTER_COOLDOWN_ACTIVE, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::test_support::FakeApi;
    use crate::api::{CharacterCache, CharacterData};
    use crate::knowledge::{KnowledgeBase, MapCache};
    use crate::state::StateValue;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_and_refreshes() {
        let character = CharacterCache::new(
            CharacterData {
                name: "ember".to_string(),
                hp: 100,
                max_hp: 100,
                ..Default::default()
            },
            3600,
        );
        let ctx = ActionContext::new(
            Arc::new(KnowledgeBase::new()),
            Arc::new(MapCache::new()),
            Arc::new(character),
        );
        ctx.set(params::WAIT_DURATION_SECS, 5.0);
        let api = FakeApi::new(ctx.character.get());

        let result = WaitHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert_eq!(
            result.data.get(params::CHARACTER_COOLDOWN_ACTIVE),
            Some(&StateValue::Bool(false))
        );
    }
}
