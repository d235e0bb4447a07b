//! Shared ring-search helpers for the content lookup handlers.

use std::collections::BTreeMap;

use tracing::debug;

use crate::api::{ApiError, GameApi};
use crate::context::ActionContext;
use crate::knowledge::{ContentKind, TileContent};

/// Radii to try, doubling from `initial` up to `max`.
pub fn expanding_radii(initial: i64, max: i64) -> Vec<i64> {
    let mut radii = Vec::new();
    let mut radius = initial.max(1);
    while radius <= max {
        radii.push(radius);
        radius *= 2;
    }
    if radii.last() != Some(&max) && initial <= max {
        radii.push(max);
    }
    radii
}

/// All offsets within the square of the given radius. Inner tiles repeat
/// across expanding passes, but the tile cache absorbs the rescans.
pub fn square_offsets(radius: i64) -> Vec<(i64, i64)> {
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            offsets.push((dx, dy));
        }
    }
    offsets
}

/// Tile content at `(x, y)`, via the cache when fresh, the API otherwise.
/// Scans are recorded into the tile cache and the knowledge base as a side
/// effect.
pub async fn scan_tile(
    api: &dyn GameApi,
    ctx: &ActionContext,
    x: i64,
    y: i64,
) -> Result<Option<TileContent>, ApiError> {
    if ctx.map.is_tile_fresh(x, y) {
        return Ok(ctx.map.get(x, y).and_then(|t| t.content));
    }

    let tile = api.get_map(x, y).await?;
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
            let _ = ctx
                .knowledge
                .record_content_discovery(kind, &content.code, x, y, &BTreeMap::new());
        }
    }
    Ok(content)
}

pub fn distance(ax: i64, ay: i64, bx: i64, by: i64) -> f64 {
    (((ax - bx).pow(2) + (ay - by).pow(2)) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanding_radii_doubles_to_max() {
        assert_eq!(expanding_radii(2, 8), vec![2, 4, 8]);
        assert_eq!(expanding_radii(2, 5), vec![2, 4, 5]);
        assert_eq!(expanding_radii(3, 3), vec![3]);
    }

    #[test]
    fn test_square_offsets_cover_the_window() {
        assert_eq!(square_offsets(0), vec![(0, 0)]);
        assert_eq!(square_offsets(1).len(), 9);
        assert_eq!(square_offsets(2).len(), 25);
        assert!(square_offsets(2).contains(&(1, 1)));
    }
}
