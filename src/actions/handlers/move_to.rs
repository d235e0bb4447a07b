//! Movement to the coordinates the previous action left in the context.

use async_trait::async_trait;

use crate::actions::{observe_character, ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::state::params;

/// Moves the character to `target.x`/`target.y`.
///
/// Being already at the destination is success, not an error — the declared
/// effect (`location_context.at_target`) holds either way.
pub struct MoveHandler;

#[async_trait]
impl ActionHandler for MoveHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let Some(name) = ctx.get_string(params::CHARACTER_NAME) else {
            return ActionResult::failure(ErrorKind::Invalid, "no character name in context");
        };
        let (Some(x), Some(y)) = (
            ctx.get_int(params::TARGET_X),
            ctx.get_int(params::TARGET_Y),
        ) else {
            return ActionResult::failure(
                ErrorKind::Precondition,
                "no target coordinates in context",
            );
        };

        match api.move_character(&name, x, y).await {
            Ok(outcome) => {
                ctx.character.update(outcome.character.clone());
                ActionResult::success()
                    .with_observations(observe_character(&outcome.character))
                    .with_data(params::LOCATION_AT_TARGET, true)
            }
            Err(e) if e.is_already_at_destination() => {
                ActionResult::success().with_data(params::LOCATION_AT_TARGET, true)
            }
            Err(e) => ActionResult::from_api_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::test_support::FakeApi;
    use crate::api::{ApiError, CharacterCache, CharacterData};
    use crate::knowledge::{KnowledgeBase, MapCache};
    use crate::state::StateValue;
    use std::sync::Arc;

    fn context() -> ActionContext {
        let character = CharacterCache::new(
            CharacterData {
                name: "ember".to_string(),
                hp: 100,
                max_hp: 100,
                ..Default::default()
            },
            3600,
        );
        ActionContext::new(
            Arc::new(KnowledgeBase::new()),
            Arc::new(MapCache::new()),
            Arc::new(character),
        )
    }

    #[tokio::test]
    async fn test_moves_to_context_coordinates() {
        let ctx = context();
        let api = FakeApi::new(ctx.character.get());
        ctx.set(params::TARGET_X, 5i64);
        ctx.set(params::TARGET_Y, -1i64);

        let result = MoveHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert_eq!(
            result.data.get(params::LOCATION_AT_TARGET),
            Some(&StateValue::Bool(true))
        );
        assert_eq!(
            result.data.get(params::LOCATION_X),
            Some(&StateValue::Int(5))
        );
        assert_eq!(ctx.character.get().x, 5);
    }

    #[tokio::test]
    async fn test_missing_coordinates_is_precondition_failure() {
        let ctx = context();
        let api = FakeApi::new(ctx.character.get());

        let result = MoveHandler.execute(&api, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn test_already_at_destination_is_success() {
        let ctx = context();
        let api = FakeApi::new(ctx.character.get());
        *api.next_move_error.lock() = Some(ApiError::Status {
            code: 490,
            message: "Character already at this location".to_string(),
        });
        ctx.set(params::TARGET_X, 0i64);
        ctx.set(params::TARGET_Y, 0i64);

        let result = MoveHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert_eq!(
            result.data.get(params::LOCATION_AT_TARGET),
            Some(&StateValue::Bool(true))
        );
    }
}
