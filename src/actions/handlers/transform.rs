//! Raw-material refinement at a workshop.

use async_trait::async_trait;
use tracing::info;

use crate::actions::{observe_character, ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::state::params;

/// Crafts `target.item` at the workshop the character is standing in,
/// stepping `workflow.current_transformation_index` forward so a multi-item
/// refinement chain resumes where it left off after replans and subgoals.
pub struct TransformMaterialsHandler;

#[async_trait]
impl ActionHandler for TransformMaterialsHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let Some(name) = ctx.get_string(params::CHARACTER_NAME) else {
            return ActionResult::failure(ErrorKind::Invalid, "no character name in context");
        };
        let Some(item) = ctx.get_string(params::TARGET_ITEM) else {
            return ActionResult::failure(
                ErrorKind::Precondition,
                "no transformation target in context",
            );
        };
        let index = ctx
            .get_int(params::WORKFLOW_TRANSFORMATION_INDEX)
            .unwrap_or(0);

        match api.craft(&name, &item, 1).await {
            Ok(outcome) => {
                ctx.character.update(outcome.character.clone());
                ctx.set_result(params::WORKFLOW_TRANSFORMATION_INDEX, index + 1);
                info!(item = %item, index, "transformed materials");
                ActionResult::success()
                    .with_observations(observe_character(&outcome.character))
                    .with_data(params::MATERIALS_STATUS, params::status::TRANSFORMED)
                    .with_data(params::WORKFLOW_TRANSFORMATION_INDEX, index + 1)
            }
            Err(e) => ActionResult::from_api_error(&e),
        }
    }
}
