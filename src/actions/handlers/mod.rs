//! Built-in action handlers.
//!
//! Each handler reads its inputs exclusively from the [`ActionContext`]
//! (`target.x`, `target.y`, `combat_context.target`, …), calls the game API,
//! and reports observed facts through `ActionResult.data`. Handlers are
//! idempotent with respect to their declared effects so a cooldown retry is
//! safe.

mod attack;
mod equip;
mod find_monsters;
mod find_resources;
mod gather;
mod lookup;
mod move_to;
mod rest;
mod search;
mod transform;
mod wait;

pub use attack::AttackHandler;
pub use equip::EquipHandler;
pub use find_monsters::FindMonstersHandler;
pub use find_resources::FindResourcesHandler;
pub use gather::GatherHandler;
pub use lookup::MapLookupHandler;
pub use move_to::MoveHandler;
pub use rest::RestHandler;
pub use transform::TransformMaterialsHandler;
pub use wait::WaitHandler;

use std::sync::Arc;

use super::{ActionDeclaration, ActionHandler, ActionRegistry, RegistryError};

/// Build the standard registry: bind every declaration loaded from
/// `actions.yaml` to its built-in handler. A declaration without a handler
/// is a configuration mistake and fails loudly at startup.
pub fn standard_registry(
    declarations: Vec<ActionDeclaration>,
) -> Result<ActionRegistry, RegistryError> {
    let mut registry = ActionRegistry::new();
    for declaration in declarations {
        let handler: Arc<dyn ActionHandler> = match declaration.name.as_str() {
            "move" => Arc::new(MoveHandler),
            "map_lookup" => Arc::new(MapLookupHandler),
            "find_monsters" => Arc::new(FindMonstersHandler),
            "find_resources" => Arc::new(FindResourcesHandler),
            "gather_resources" => Arc::new(GatherHandler),
            "attack" => Arc::new(AttackHandler),
            "rest" => Arc::new(RestHandler),
            "equip_item" => Arc::new(EquipHandler),
            "transform_materials" => Arc::new(TransformMaterialsHandler),
            "wait" => Arc::new(WaitHandler),
            other => return Err(RegistryError::UnknownAction(other.to_string())),
        };
        registry.register(declaration, handler);
    }
    Ok(registry)
}
