//! HP recovery.

use async_trait::async_trait;
use tracing::info;

use crate::actions::{observe_character, ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::state::params;

/// Rests until the server says the character has recovered. The `healthy`
/// and `safe` predicates recompute from the observed HP — the handler never
/// asserts them itself.
pub struct RestHandler;

#[async_trait]
impl ActionHandler for RestHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let Some(name) = ctx.get_string(params::CHARACTER_NAME) else {
            return ActionResult::failure(ErrorKind::Invalid, "no character name in context");
        };
        let before = ctx.character.get();

        match api.rest(&name).await {
            Ok(outcome) => {
                ctx.character.update(outcome.character.clone());
                let recovered = outcome.character.hp - before.hp;
                if recovered > 0 {
                    info!(
                        recovered,
                        hp = outcome.character.hp,
                        max_hp = outcome.character.max_hp,
                        "rested"
                    );
                }
                ActionResult::success().with_observations(observe_character(&outcome.character))
            }
            Err(e) => ActionResult::from_api_error(&e),
        }
    }
}
