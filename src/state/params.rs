//! The `StateParameter` namespace.
//!
//! Every world-state key the crate reads or writes is declared here as a
//! constant, grouped by dotted domain prefix. Action handlers and the
//! execution loop never pass raw string literals around.

// character_status.*
pub const CHARACTER_NAME: &str = "character_status.name";
pub const CHARACTER_ALIVE: &str = "character_status.alive";
pub const CHARACTER_SAFE: &str = "character_status.safe";
pub const CHARACTER_HEALTHY: &str = "character_status.healthy";
pub const CHARACTER_LEVEL: &str = "character_status.level";
pub const CHARACTER_HP: &str = "character_status.hp";
pub const CHARACTER_MAX_HP: &str = "character_status.max_hp";
pub const CHARACTER_HP_PERCENTAGE: &str = "character_status.hp_percentage";
pub const CHARACTER_XP: &str = "character_status.xp";
pub const CHARACTER_MAX_XP: &str = "character_status.max_xp";
pub const CHARACTER_COOLDOWN_ACTIVE: &str = "character_status.cooldown_active";

// location_context.*
pub const LOCATION_X: &str = "location_context.x";
pub const LOCATION_Y: &str = "location_context.y";
pub const LOCATION_AT_TARGET: &str = "location_context.at_target";
pub const LOCATION_RESOURCE_KNOWN: &str = "location_context.resource_known";
pub const LOCATION_MONSTER_KNOWN: &str = "location_context.monster_known";
pub const LOCATION_WORKSHOP_KNOWN: &str = "location_context.workshop_known";

// combat_context.*
pub const COMBAT_STATUS: &str = "combat_context.status";
pub const COMBAT_TARGET: &str = "combat_context.target";
pub const COMBAT_RECENT_WIN_RATE: &str = "combat_context.recent_win_rate";
pub const COMBAT_VIABLE: &str = "combat_context.viable";

// equipment_status.*
pub const EQUIPMENT_UPGRADE_STATUS: &str = "equipment_status.upgrade_status";
pub const EQUIPMENT_WEAPON: &str = "equipment_status.weapon";

// goal_progress.*
pub const GOAL_MONSTERS_HUNTED: &str = "goal_progress.monsters_hunted";
pub const GOAL_HAS_GAINED_XP: &str = "goal_progress.has_gained_xp";

// inventory_status.*
pub const INVENTORY_ITEM_COUNT: &str = "inventory_status.item_count";
pub const INVENTORY_HAS_SPACE: &str = "inventory_status.has_space";

// materials.*
pub const MATERIALS_STATUS: &str = "materials.status";
pub const MATERIALS_GATHERED: &str = "materials.gathered";

// workshop.*
pub const WORKSHOP_STATUS: &str = "workshop.status";
pub const WORKSHOP_X: &str = "workshop.x";
pub const WORKSHOP_Y: &str = "workshop.y";

// target.* — scratch keys one action writes for the next to read
pub const TARGET_X: &str = "target.x";
pub const TARGET_Y: &str = "target.y";
pub const TARGET_ITEM: &str = "target.item";
pub const TARGET_RESOURCE: &str = "target.resource";
pub const TARGET_SLOT: &str = "target.slot";

// workflow.*
pub const WORKFLOW_STEP: &str = "workflow.step";
pub const WORKFLOW_TRANSFORMATION_INDEX: &str = "workflow.current_transformation_index";

// wait.* — written by the cooldown manager for the synthesized wait step
pub const WAIT_DURATION_SECS: &str = "wait.duration_secs";

// search.* — strategy knobs the goal layer hands to the lookup actions
pub const SEARCH_RADIUS: &str = "search.radius";
pub const SEARCH_MAX_RADIUS: &str = "search.max_radius";
pub const SEARCH_LEVEL_RANGE: &str = "search.level_range";
pub const SEARCH_WIN_RATE_WEIGHT: &str = "search.win_rate_weight";
pub const SEARCH_DISTANCE_WEIGHT: &str = "search.distance_weight";

/// Keys recomputed from their inputs on every write. Direct writes to these
/// are rejected by the store.
pub const DERIVED_KEYS: &[&str] = &[
    CHARACTER_ALIVE,
    CHARACTER_SAFE,
    CHARACTER_HEALTHY,
    CHARACTER_HP_PERCENTAGE,
];

/// Common status strings shared across domains.
pub mod status {
    pub const UNKNOWN: &str = "unknown";
    pub const IDLE: &str = "idle";
    pub const READY: &str = "ready";
    pub const SEARCHING: &str = "searching";
    pub const COMPLETED: &str = "completed";
    pub const DEFEATED: &str = "defeated";
    pub const NOT_VIABLE: &str = "not_viable";

    pub const NEEDS_ANALYSIS: &str = "needs_analysis";
    pub const SUFFICIENT: &str = "sufficient";
    pub const INSUFFICIENT: &str = "insufficient";
    pub const GATHERED: &str = "gathered";
    pub const TRANSFORMED: &str = "transformed";
    pub const DISCOVERED: &str = "discovered";
}

pub fn is_derived(key: &str) -> bool {
    DERIVED_KEYS.contains(&key)
}
