//! Level-appropriate monster search with learned win-rate scoring.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::actions::{ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::state::params;

use super::search::{distance, expanding_radii, scan_tile, square_offsets};

/// Known monsters with a win rate below this are never engaged.
const MIN_VIABLE_WIN_RATE: f64 = 0.2;

/// Finds the best nearby monster for the character's level and leaves its
/// coordinates in the context for the following `move` step.
///
/// Scoring balances learned win rate against travel distance; both weights
/// come from configuration (`search.win_rate_weight`, default 100, and
/// `search.distance_weight`, default 0.1). An unknown monster scores
/// `50 - distance` so the agent still explores, cautiously.
pub struct FindMonstersHandler;

#[derive(Debug)]
struct Candidate {
    code: String,
    x: i64,
    y: i64,
    distance: f64,
    win_rate: Option<f64>,
    score: f64,
}

#[async_trait]
impl ActionHandler for FindMonstersHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let character = ctx.character.get();
        let level_range = ctx.get_int(params::SEARCH_LEVEL_RANGE).unwrap_or(2);
        let radius = ctx.get_int(params::SEARCH_RADIUS).unwrap_or(2);
        let max_radius = ctx.get_int(params::SEARCH_MAX_RADIUS).unwrap_or(4);
        let win_rate_weight = ctx.get_f64(params::SEARCH_WIN_RATE_WEIGHT).unwrap_or(100.0);
        let distance_weight = ctx.get_f64(params::SEARCH_DISTANCE_WEIGHT).unwrap_or(0.1);

        let monsters = match api.list_monsters().await {
            Ok(monsters) => monsters,
            Err(e) => return ActionResult::from_api_error(&e),
        };
        let eligible: Vec<String> = monsters
            .iter()
            .filter(|m| (m.level - character.level).abs() <= level_range)
            .map(|m| m.code.clone())
            .collect();
        if eligible.is_empty() {
            return ActionResult::failure(
                ErrorKind::Precondition,
                format!(
                    "no monsters within level window {} ±{}",
                    character.level, level_range
                ),
            );
        }

        for radius in expanding_radii(radius, max_radius) {
            debug!(radius, "searching ring for monsters");
            let mut candidates = Vec::new();
            for (dx, dy) in square_offsets(radius) {
                let (x, y) = (character.x + dx, character.y + dy);
                let content = match scan_tile(api, ctx, x, y).await {
                    Ok(content) => content,
                    Err(e) => return ActionResult::from_api_error(&e),
                };
                let Some(content) = content else { continue };
                if content.content_type != "monster" || !eligible.contains(&content.code) {
                    continue;
                }
                let d = distance(character.x, character.y, x, y);
                let win_rate = ctx.knowledge.monster_win_rate(&content.code, character.level);
                if win_rate.is_some_and(|wr| wr < MIN_VIABLE_WIN_RATE) {
                    debug!(code = %content.code, ?win_rate, "skipping monster with poor record");
                    continue;
                }
                let score = match win_rate {
                    Some(wr) => wr * win_rate_weight - d * distance_weight,
                    None => 50.0 - d,
                };
                candidates.push(Candidate {
                    code: content.code,
                    x,
                    y,
                    distance: d,
                    win_rate,
                    score,
                });
            }

            if let Some(best) = candidates
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
            {
                info!(
                    code = %best.code,
                    x = best.x,
                    y = best.y,
                    distance = best.distance,
                    win_rate = ?best.win_rate,
                    "selected monster"
                );
                ctx.set_result(params::TARGET_X, best.x);
                ctx.set_result(params::TARGET_Y, best.y);
                ctx.set_result(params::COMBAT_TARGET, best.code.as_str());
                if let Some(wr) = best.win_rate {
                    ctx.set_result(params::COMBAT_RECENT_WIN_RATE, wr);
                }
                return ActionResult::success()
                    .with_data(params::COMBAT_TARGET, best.code.as_str())
                    .with_data(params::TARGET_X, best.x)
                    .with_data(params::TARGET_Y, best.y)
                    .with_data(params::LOCATION_MONSTER_KNOWN, true);
            }
        }

        ActionResult::failure(
            ErrorKind::Precondition,
            "no viable monster within search radius",
        )
    }
}
