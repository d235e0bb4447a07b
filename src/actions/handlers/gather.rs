//! Resource gathering at the current tile.

use async_trait::async_trait;
use tracing::info;

use crate::actions::{observe_character, ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::knowledge::ContentKind;
use crate::state::params;

/// Gathers from the resource node the character is standing on and records
/// what it yielded.
pub struct GatherHandler;

#[async_trait]
impl ActionHandler for GatherHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let Some(name) = ctx.get_string(params::CHARACTER_NAME) else {
            return ActionResult::failure(ErrorKind::Invalid, "no character name in context");
        };

        match api.gather(&name).await {
            Ok(outcome) => {
                ctx.character.update(outcome.character.clone());
                let gathered: Vec<String> = outcome
                    .details
                    .iter()
                    .flatten()
                    .map(|d| d.code.clone())
                    .collect();
                info!(items = ?gathered, "gathered");

                // Remember the yield against the node we targeted.
                if let Some(resource) = ctx.get_string(params::TARGET_RESOURCE) {
                    for item in &gathered {
                        let mut details = std::collections::BTreeMap::new();
                        details.insert("drop".to_string(), item.clone());
                        let _ = ctx.knowledge.record_content_discovery(
                            ContentKind::Resource,
                            &resource,
                            outcome.character.x,
                            outcome.character.y,
                            &details,
                        );
                    }
                }

                ActionResult::success()
                    .with_observations(observe_character(&outcome.character))
                    .with_data(params::MATERIALS_GATHERED, "+1")
                    .with_data(params::MATERIALS_STATUS, params::status::GATHERED)
            }
            Err(e) => ActionResult::from_api_error(&e),
        }
    }
}
