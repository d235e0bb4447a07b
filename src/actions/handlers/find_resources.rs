//! Resource-node search, knowledge-first with a map scan fallback.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::actions::{ActionHandler, ActionResult, ErrorKind};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::knowledge::ContentKind;
use crate::state::params;

use super::search::{distance, expanding_radii, scan_tile, square_offsets};

/// Finds the nearest gatherable resource node and leaves its coordinates in
/// the context. A specific node code can be requested through
/// `target.resource`; otherwise any node the character's level can work is
/// eligible.
pub struct FindResourcesHandler;

#[async_trait]
impl ActionHandler for FindResourcesHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let character = ctx.character.get();
        let wanted = ctx.get_string(params::TARGET_RESOURCE);
        let radius = ctx.get_int(params::SEARCH_RADIUS).unwrap_or(2);
        let max_radius = ctx.get_int(params::SEARCH_MAX_RADIUS).unwrap_or(4);

        let resources = match api.list_resources().await {
            Ok(resources) => resources,
            Err(e) => return ActionResult::from_api_error(&e),
        };
        let eligible: Vec<&crate::api::ResourceData> = resources
            .iter()
            .filter(|r| r.level <= character.level)
            .filter(|r| wanted.as_deref().map_or(true, |w| r.code == w))
            .collect();
        if eligible.is_empty() {
            return ActionResult::failure(
                ErrorKind::Precondition,
                "no gatherable resource for this character",
            );
        }

        // Prefer something we already know about.
        if let Some(best) = eligible
            .iter()
            .flat_map(|r| {
                ctx.knowledge
                    .resource(&r.code)
                    .map(|k| (r.code.clone(), k.locations))
                    .into_iter()
                    .flat_map(|(code, locations)| {
                        locations.into_iter().map(move |(x, y)| (code.clone(), x, y))
                    })
            })
            .min_by(|a, b| {
                let da = distance(character.x, character.y, a.1, a.2);
                let db = distance(character.x, character.y, b.1, b.2);
                da.total_cmp(&db)
            })
        {
            let (code, x, y) = best;
            debug!(code = %code, x, y, "using known resource location");
            return found(ctx, &resources, &code, x, y);
        }

        for radius in expanding_radii(radius, max_radius) {
            debug!(radius, "scanning for resources");
            for (dx, dy) in square_offsets(radius) {
                let (x, y) = (character.x + dx, character.y + dy);
                let content = match scan_tile(api, ctx, x, y).await {
                    Ok(content) => content,
                    Err(e) => return ActionResult::from_api_error(&e),
                };
                let Some(content) = content else { continue };
                if content.content_type != "resource" {
                    continue;
                }
                if !eligible.iter().any(|r| r.code == content.code) {
                    continue;
                }
                return found(ctx, &resources, &content.code, x, y);
            }
        }

        ActionResult::failure(
            ErrorKind::Precondition,
            "no resource node within search radius",
        )
    }
}

fn found(
    ctx: &ActionContext,
    resources: &[crate::api::ResourceData],
    code: &str,
    x: i64,
    y: i64,
) -> ActionResult {
    info!(code, x, y, "selected resource node");
    // Remember the listing details alongside the location.
    if let Some(listing) = resources.iter().find(|r| r.code == code) {
        let mut details = BTreeMap::new();
        details.insert("skill".to_string(), listing.skill.clone());
        details.insert("level".to_string(), listing.level.to_string());
        if let Some(drop) = listing.drops.first() {
            details.insert("drop".to_string(), drop.code.clone());
        }
        let _ = ctx
            .knowledge
            .record_content_discovery(ContentKind::Resource, code, x, y, &details);
    }
    ctx.set_result(params::TARGET_X, x);
    ctx.set_result(params::TARGET_Y, y);
    ctx.set_result(params::TARGET_RESOURCE, code);
    ActionResult::success()
        .with_data(params::LOCATION_RESOURCE_KNOWN, true)
        .with_data(params::TARGET_X, x)
        .with_data(params::TARGET_Y, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::test_support::FakeApi;
    use crate::api::{CharacterCache, CharacterData, DropItem, MapContent, MapTile, ResourceData};
    use crate::knowledge::{KnowledgeBase, MapCache};
    use std::sync::Arc;

    fn context() -> ActionContext {
        let character = CharacterCache::new(
            CharacterData {
                name: "ember".to_string(),
                level: 3,
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

    fn copper() -> ResourceData {
        ResourceData {
            name: "Copper Rocks".to_string(),
            code: "copper_rocks".to_string(),
            skill: "mining".to_string(),
            level: 1,
            drops: vec![DropItem {
                code: "copper_ore".to_string(),
                quantity: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_known_location_skips_scanning() {
        let ctx = context();
        ctx.knowledge
            .record_content_discovery(
                ContentKind::Resource,
                "copper_rocks",
                3,
                1,
                &BTreeMap::new(),
            )
            .unwrap();
        let api = FakeApi::new(ctx.character.get());
        *api.resources.lock() = vec![copper()];

        let result = FindResourcesHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert_eq!(ctx.get_int(params::TARGET_X), Some(3));
        assert_eq!(ctx.get_int(params::TARGET_Y), Some(1));
        assert_eq!(
            ctx.get_string(params::TARGET_RESOURCE),
            Some("copper_rocks".to_string())
        );
    }

    #[tokio::test]
    async fn test_scan_finds_resource_and_records_details() {
        let ctx = context();
        let api = FakeApi::new(ctx.character.get());
        *api.resources.lock() = vec![copper()];
        api.tiles.lock().insert(
            (1, 1),
            MapTile {
                x: 1,
                y: 1,
                content: Some(MapContent {
                    content_type: "resource".to_string(),
                    code: "copper_rocks".to_string(),
                }),
            },
        );

        let result = FindResourcesHandler.execute(&api, &ctx).await;
        assert!(result.success);
        let known = ctx.knowledge.resource("copper_rocks").unwrap();
        assert_eq!(known.required_skill.as_deref(), Some("mining"));
        assert_eq!(known.yields, vec!["copper_ore".to_string()]);
    }

    #[tokio::test]
    async fn test_level_gated_resource_is_ineligible() {
        let ctx = context();
        let api = FakeApi::new(ctx.character.get());
        *api.resources.lock() = vec![ResourceData {
            name: "Gold Rocks".to_string(),
            code: "gold_rocks".to_string(),
            skill: "mining".to_string(),
            level: 30,
            drops: vec![],
        }];

        let result = FindResourcesHandler.execute(&api, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Precondition);
    }
}
