//! Equipment changes.

use async_trait::async_trait;
use tracing::info;

use crate::actions::{observe_character, ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::state::params;

/// Equips `target.item` into `target.slot` (weapon by default).
pub struct EquipHandler;

#[async_trait]
impl ActionHandler for EquipHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let Some(name) = ctx.get_string(params::CHARACTER_NAME) else {
            return ActionResult::failure(ErrorKind::Invalid, "no character name in context");
        };
        let Some(item) = ctx.get_string(params::TARGET_ITEM) else {
            return ActionResult::failure(ErrorKind::Precondition, "no item selected in context");
        };
        let slot = ctx
            .get_string(params::TARGET_SLOT)
            .unwrap_or_else(|| "weapon".to_string());

        match api.equip(&name, &item, &slot).await {
            Ok(outcome) => {
                ctx.character.update(outcome.character.clone());
                info!(item = %item, slot = %slot, "equipped");
                ActionResult::success()
                    .with_observations(observe_character(&outcome.character))
                    .with_data(params::EQUIPMENT_WEAPON, item.as_str())
                    .with_data(
                        params::EQUIPMENT_UPGRADE_STATUS,
                        params::status::COMPLETED,
                    )
                    .with_data(params::COMBAT_VIABLE, true)
            }
            Err(e) => ActionResult::from_api_error(&e),
        }
    }
}
