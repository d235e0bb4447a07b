//! Single-tile map scan feeding the tile cache and the knowledge base.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::actions::{ActionHandler, ActionResult};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::knowledge::{ContentKind, TileContent};
use crate::state::params;

/// Scans the tile at `target.x`/`target.y` (falling back to the character's
/// position) and records what it finds. Fresh cached tiles short-circuit the
/// API call.
pub struct MapLookupHandler;

#[async_trait]
impl ActionHandler for MapLookupHandler {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult {
        let character = ctx.character.get();
        let x = ctx.get_int(params::TARGET_X).unwrap_or(character.x);
        let y = ctx.get_int(params::TARGET_Y).unwrap_or(character.y);

        if ctx.map.is_tile_fresh(x, y) {
            debug!(x, y, "tile cache fresh, skipping scan");
            let cached = ctx.map.get(x, y).and_then(|t| t.content);
            return content_result(ctx, x, y, cached.as_ref());
        }

        let tile = match api.get_map(x, y).await {
            Ok(tile) => tile,
            Err(e) => return ActionResult::from_api_error(&e),
        };

        let content = tile.content.as_ref().map(|c| TileContent {
            content_type: c.content_type.clone(),
            code: c.code.clone(),
        });
        if let Err(e) = ctx.map.record_scan(x, y, content.clone()) {
            debug!(error = %e, "tile cache persistence failed");
        }

        if let Some(content) = &content {
            let kind = match content.content_type.as_str() {
                "monster" => Some(ContentKind::Monster),
                "resource" => Some(ContentKind::Resource),
                "workshop" => Some(ContentKind::Workshop),
                _ => None,
            };
            if let Some(kind) = kind {
                let _ = ctx.knowledge.record_content_discovery(
                    kind,
                    &content.code,
                    x,
                    y,
                    &BTreeMap::new(),
                );
            }
        }

        content_result(ctx, x, y, content.as_ref())
    }
}

fn content_result(
    ctx: &ActionContext,
    x: i64,
    y: i64,
    content: Option<&TileContent>,
) -> ActionResult {
    let mut result = ActionResult::success();
    match content.map(|c| c.content_type.as_str()) {
        Some("monster") => {
            result = result.with_data(params::LOCATION_MONSTER_KNOWN, true);
        }
        Some("resource") => {
            result = result.with_data(params::LOCATION_RESOURCE_KNOWN, true);
        }
        Some("workshop") => {
            ctx.set_result(params::WORKSHOP_X, x);
            ctx.set_result(params::WORKSHOP_Y, y);
            result = result
                .with_data(params::LOCATION_WORKSHOP_KNOWN, true)
                .with_data(params::WORKSHOP_STATUS, params::status::DISCOVERED);
        }
        _ => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::test_support::FakeApi;
    use crate::api::{CharacterCache, CharacterData, MapContent, MapTile};
    use crate::knowledge::{KnowledgeBase, MapCache};
    use crate::state::StateValue;
    use std::sync::Arc;

    fn context() -> ActionContext {
        let character = CharacterCache::new(
            CharacterData {
                name: "ember".to_string(),
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
    async fn test_scan_records_discovery() {
        let ctx = context();
        let api = FakeApi::new(ctx.character.get());
        api.tiles.lock().insert(
            (2, 3),
            MapTile {
                x: 2,
                y: 3,
                content: Some(MapContent {
                    content_type: "monster".to_string(),
                    code: "green_slime".to_string(),
                }),
            },
        );
        ctx.set(params::TARGET_X, 2i64);
        ctx.set(params::TARGET_Y, 3i64);

        let result = MapLookupHandler.execute(&api, &ctx).await;
        assert!(result.success);
        assert_eq!(
            result.data.get(params::LOCATION_MONSTER_KNOWN),
            Some(&StateValue::Bool(true))
        );
        assert!(ctx.map.is_tile_fresh(2, 3));
        assert_eq!(ctx.knowledge.monster("green_slime").unwrap().locations, vec![(2, 3)]);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_api() {
        let ctx = context();
        ctx.map
            .record_scan(
                0,
                0,
                Some(TileContent {
                    content_type: "workshop".to_string(),
                    code: "weaponcrafting".to_string(),
                }),
            )
            .unwrap();

        // NullApi would fail if the handler hit the network.
        let result = MapLookupHandler
            .execute(&crate::actions::handlers::test_support::NullApi, &ctx)
            .await;
        assert!(result.success);
        assert_eq!(
            result.data.get(params::LOCATION_WORKSHOP_KNOWN),
            Some(&StateValue::Bool(true))
        );
        assert_eq!(ctx.get_int(params::WORKSHOP_X), Some(0));
    }
}
