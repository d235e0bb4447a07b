//! # Wayfarer
//!
//! A goal-driven autonomous agent for multiplayer online games played over a
//! public HTTP API. One character is driven toward high-level objectives —
//! reach a level, upgrade equipment, gather materials — with no human in the
//! loop.
//!
//! ## How it works
//!
//! The runtime is a pair of nested control loops around a GOAP
//! (Goal-Oriented Action Planning) core:
//!
//! 1. The **mission executor** observes the world and asks the **goal
//!    manager** (a YAML-driven priority-rule table) for the next objective.
//! 2. The **planner** runs a forward A* search over declarative action
//!    contracts to produce a least-cost action sequence.
//! 3. The **execution manager** dispatches the plan one action at a time,
//!    waiting out server cooldowns, injecting subgoals actions request
//!    (rest after a rough fight), and replanning mid-plan when a discovery
//!    invalidates the remaining steps.
//! 4. Every observation — monster locations, fight outcomes, map tiles —
//!    lands in a persistent **knowledge base** that sharpens future target
//!    selection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Mission Executor                   │
//! │   (select goal → plan → execute → assess → loop)    │
//! └─────────────────────────────────────────────────────┘
//!        │                │                   │
//!        ▼                ▼                   ▼
//! ┌────────────┐  ┌──────────────┐  ┌──────────────────┐
//! │    Goal    │  │     GOAP     │  │    Execution     │
//! │   Manager  │  │    Planner   │  │     Manager      │
//! └────────────┘  └──────────────┘  └──────────────────┘
//!        │                │                   │
//!        └────────────────┴───────────┬───────┘
//!                                     ▼
//!                  ┌─────────────┐  ┌────────────────────┐
//!                  │ World State │  │  Action Registry   │
//!                  │ + Knowledge │  │  (handlers → API)  │
//!                  └─────────────┘  └────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wayfarer::api::{CharacterCache, GameApi, HttpGameClient};
//! use wayfarer::actions::handlers::standard_registry;
//! use wayfarer::context::ActionContext;
//! use wayfarer::executor::{CancelToken, ExecutionManager, MissionExecutor, MissionParameters};
//! use wayfarer::goals::GoalManager;
//! use wayfarer::knowledge::{KnowledgeBase, MapCache};
//! use wayfarer::state::StateStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api: Arc<dyn GameApi> =
//!         Arc::new(HttpGameClient::new("https://api.example.com", "token"));
//!     let character = api.get_character("ember").await?;
//!
//!     let goals = GoalManager::load("config/goal_templates.yaml")?;
//!     let store = Arc::new(StateStore::new());
//!     let ctx = Arc::new(ActionContext::new(
//!         Arc::new(KnowledgeBase::new()),
//!         Arc::new(MapCache::new()),
//!         Arc::new(CharacterCache::new(character, 5)),
//!     ));
//!
//!     let declarations = wayfarer::config::load_actions("config/actions.yaml".as_ref())?;
//!     let registry = Arc::new(standard_registry(declarations)?);
//!     let cancel = CancelToken::new();
//!     let execution = ExecutionManager::new(registry, cancel.clone());
//!
//!     let mut mission = MissionExecutor::new(api, store, ctx, goals, execution, cancel);
//!     let reached = mission
//!         .execute_progression_mission(&MissionParameters::reach_level(5))
//!         .await;
//!     println!("target level reached: {reached}");
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`state`] — flat typed world-state store with derived predicates
//! - [`knowledge`] — cross-mission observations (monsters, resources, map)
//! - [`context`] — per-mission scratchpad actions pass parameters through
//! - [`actions`] — action contract, registry, and the built-in handlers
//! - [`planner`] — forward A* GOAP search
//! - [`goals`] — YAML goal templates and priority selection rules
//! - [`executor`] — execution manager, mission executor, cooldown manager
//! - [`api`] — typed game API client
//! - [`config`] — action declarations and runtime settings

#![allow(clippy::too_many_arguments)]

pub mod actions;
pub mod api;
pub mod config;
pub mod context;
pub mod executor;
pub mod goals;
pub mod knowledge;
pub mod planner;
pub mod state;

// Re-export the types most integrations touch.
pub use actions::{ActionRegistry, ActionResult};
pub use context::ActionContext;
pub use executor::{CancelToken, ExecutionManager, MissionExecutor, MissionParameters};
pub use goals::GoalManager;
pub use planner::{Plan, Planner};
pub use state::{StateStore, StateValue, WorldState};
