//! Fight the monster on the current tile, learn from the outcome.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::actions::{observe_character, ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::knowledge::{CharacterSnapshot, CombatOutcome, FightSummary};
use crate::state::params;

/// HP percentage below which the handler asks for a recovery subgoal
/// instead of letting the plan continue into another fight.
const POST_COMBAT_REST_THRESHOLD: f64 = 30.0;

/// Fights whatever the combat context targets.
///
/// Every fight is recorded in the knowledge base. A loss does not complete
/// the hunt — it flips the combat status to `defeated` and flags the
/// equipment chain, leaving the goal layer to decide what happens next.
pub struct AttackHandler;

#[async_trait]
impl ActionHandler for AttackHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let Some(name) = ctx.get_string(params::CHARACTER_NAME) else {
            return ActionResult::failure(ErrorKind::Invalid, "no character name in context");
        };
        let before = ctx.character.get();

        let outcome = match api.fight(&name).await {
            Ok(outcome) => outcome,
            Err(e) => return ActionResult::from_api_error(&e),
        };
        ctx.character.update(outcome.character.clone());

        let Some(fight) = &outcome.fight else {
            return ActionResult::failure(ErrorKind::Invalid, "fight response without fight data");
        };

        let monster_code = ctx
            .get_string(params::COMBAT_TARGET)
            .or_else(|| {
                ctx.map
                    .get(before.x, before.y)
                    .and_then(|t| t.content)
                    .map(|c| c.code)
            })
            .unwrap_or_else(|| "unknown_monster".to_string());

        let recorded = ctx.knowledge.record_combat_result(
            &monster_code,
            if fight.is_win() {
                CombatOutcome::Win
            } else {
                CombatOutcome::Loss
            },
            &CharacterSnapshot {
                level: outcome.character.level,
                hp: outcome.character.hp,
                hp_before: before.hp,
            },
            &FightSummary {
                xp: fight.xp,
                gold: fight.gold,
                turns: fight.turns,
                drops: fight.drops.iter().map(|d| d.code.clone()).collect(),
            },
        );
        if let Err(e) = recorded {
            warn!(error = %e, "combat record not persisted");
        }

        info!(
            monster = %monster_code,
            result = %fight.result,
            xp = fight.xp,
            turns = fight.turns,
            hp = outcome.character.hp,
            "fight finished"
        );

        let mut result = ActionResult::success().with_observations(observe_character(&outcome.character));
        if fight.is_win() {
            result = result
                .with_data(params::COMBAT_STATUS, params::status::COMPLETED)
                .with_data(params::GOAL_MONSTERS_HUNTED, "+1");
            if fight.xp > 0 {
                result = result.with_data(params::GOAL_HAS_GAINED_XP, true);
            }
        } else {
            result = result
                .with_data(params::COMBAT_STATUS, params::status::DEFEATED)
                .with_data(params::COMBAT_VIABLE, false)
                .with_data(
                    params::EQUIPMENT_UPGRADE_STATUS,
                    params::status::NEEDS_ANALYSIS,
                );
        }

        if outcome.character.hp_percentage() < POST_COMBAT_REST_THRESHOLD {
            info!(
                hp_percentage = outcome.character.hp_percentage(),
                "low HP after combat, requesting recovery subgoal"
            );
            result = result.request_subgoal("get_healthy", Default::default(), Vec::new());
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::test_support::FakeApi;
    use crate::api::{
        ActionOutcome, ApiError, CharacterCache, CharacterData, FightData,
    };
    use crate::knowledge::{KnowledgeBase, MapCache};
    use crate::state::StateValue;
    use std::sync::Arc;

    fn context(hp: i64) -> ActionContext {
        let character = CharacterCache::new(
            CharacterData {
                name: "ember".to_string(),
                level: 2,
                hp,
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

    fn fight_outcome(character: CharacterData, result: &str, xp: i64) -> ActionOutcome {
        ActionOutcome {
            character,
            fight: Some(FightData {
                result: result.to_string(),
                xp,
                ..Default::default()
            }),
            details: None,
        }
    }

    #[tokio::test]
    async fn test_win_completes_combat_and_counts_hunt() {
        let ctx = context(100);
        ctx.set(params::COMBAT_TARGET, "green_slime");
        let api = FakeApi::new(ctx.character.get());
        let mut after = ctx.character.get();
        after.hp = 80;
        api.fight_queue
            .lock()
            .push_back(Ok(fight_outcome(after, "win", 32)));

        let result = AttackHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert!(result.subgoal.is_none());
        assert_eq!(
            result.data.get(params::COMBAT_STATUS),
            Some(&StateValue::from("completed"))
        );
        assert_eq!(
            result.data.get(params::GOAL_MONSTERS_HUNTED),
            Some(&StateValue::from("+1"))
        );
        assert_eq!(
            result.data.get(params::GOAL_HAS_GAINED_XP),
            Some(&StateValue::Bool(true))
        );

        let record = &ctx.knowledge.monster("green_slime").unwrap().combat_results[0];
        assert_eq!(record.outcome, CombatOutcome::Win);
        assert_eq!(record.damage_taken, 20);
        assert_eq!(record.xp_gained, 32);
    }

    #[tokio::test]
    async fn test_loss_flags_equipment_chain() {
        let ctx = context(100);
        ctx.set(params::COMBAT_TARGET, "wolf");
        let api = FakeApi::new(ctx.character.get());
        let mut after = ctx.character.get();
        after.hp = 50;
        api.fight_queue
            .lock()
            .push_back(Ok(fight_outcome(after, "loss", 0)));

        let result = AttackHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert_eq!(
            result.data.get(params::COMBAT_STATUS),
            Some(&StateValue::from("defeated"))
        );
        assert_eq!(
            result.data.get(params::EQUIPMENT_UPGRADE_STATUS),
            Some(&StateValue::from("needs_analysis"))
        );
        assert!(result.data.get(params::GOAL_MONSTERS_HUNTED).is_none());
    }

    #[tokio::test]
    async fn test_low_hp_requests_recovery_subgoal() {
        let ctx = context(100);
        ctx.set(params::COMBAT_TARGET, "wolf");
        let api = FakeApi::new(ctx.character.get());
        let mut after = ctx.character.get();
        after.hp = 15;
        api.fight_queue
            .lock()
            .push_back(Ok(fight_outcome(after, "win", 10)));

        let result = AttackHandler.execute(&api, &ctx).await;
        assert!(result.success);
        let subgoal = result.subgoal.unwrap();
        assert_eq!(subgoal.goal_name, "get_healthy");
        assert!(subgoal.preserve_keys.is_empty());
    }

    #[tokio::test]
    async fn test_no_monster_is_precondition_failure() {
        let ctx = context(100);
        let api = FakeApi::new(ctx.character.get());
        api.fight_queue.lock().push_back(Err(ApiError::Status {
            code: 598,
            message: "Monster not found at this location".to_string(),
        }));

        let result = AttackHandler.execute(&api, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Precondition);
    }
}
