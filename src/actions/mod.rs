//! # Action Contract & Registry
//!
//! Every action the agent can take is registered here with a declarative
//! contract — preconditions, effects (reactions), and a planning weight,
//! loaded from `actions.yaml` — plus a handler that does the actual API
//! work. The planner only ever sees the declarations; the execution loop
//! only ever dispatches through [`ActionRegistry::execute`], which
//! centralizes logging, timing, panic wrapping, and error classification.

pub mod handlers;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, CharacterData, GameApi};
use crate::context::ActionContext;
use crate::state::{params, StateValue, WorldState};

/// Registry error types
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A declaration names an action no handler is bound for
    #[error("no handler registered for action '{0}'")]
    UnknownAction(String),
}

/// Failure classes an action can report. The execution layers key their
/// retry/replan/surface decisions off this, never off message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Server-imposed wait; retried after a wait step
    Cooldown,
    /// Runtime disagrees with the planner's static view (e.g. no monster
    /// here); triggers replanning
    Precondition,
    /// Network or server-side failure; retried with back-off
    Transport,
    /// Malformed input or permanent refusal; counts as a goal failure
    Invalid,
    /// Unclassified handler panic
    Exception,
    /// Abort signal observed
    Cancelled,
}

/// Structured action failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    pub retriable: bool,
    pub is_cooldown: bool,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retriable: matches!(kind, ErrorKind::Cooldown | ErrorKind::Transport),
            is_cooldown: kind == ErrorKind::Cooldown,
        }
    }
}

/// Map an API failure onto the action error taxonomy.
pub fn classify_api_error(err: &ApiError) -> ActionError {
    let message = err.to_string();
    if err.is_cooldown() {
        ActionError::new(ErrorKind::Cooldown, message)
    } else if err.is_transient() {
        ActionError::new(ErrorKind::Transport, message)
    } else if err.is_not_found() || err.is_not_allowed() || err.is_already_at_destination() {
        ActionError::new(ErrorKind::Precondition, message)
    } else {
        ActionError::new(ErrorKind::Invalid, message)
    }
}

/// A nested goal an action asks the execution manager to satisfy before the
/// current plan resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgoalRequest {
    pub goal_name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Context keys to carry across the subplan; everything else is dropped
    /// when the subplan finishes.
    #[serde(default)]
    pub preserve_keys: Vec<String>,
}

/// What an action execution produced.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    pub success: bool,
    /// Observed world-state facts the action explicitly returns; merged into
    /// the live state after its declared effects, so observation wins.
    pub data: WorldState,
    pub error: Option<ActionError>,
    pub subgoal: Option<SubgoalRequest>,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<StateValue>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn with_observations(mut self, observations: WorldState) -> Self {
        self.data.extend(observations);
        self
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(ActionError::new(kind, message)),
            ..Default::default()
        }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        Self {
            success: false,
            error: Some(classify_api_error(err)),
            ..Default::default()
        }
    }

    pub fn request_subgoal(
        mut self,
        goal_name: &str,
        parameters: BTreeMap<String, String>,
        preserve_keys: Vec<String>,
    ) -> Self {
        self.subgoal = Some(SubgoalRequest {
            goal_name: goal_name.to_string(),
            parameters,
            preserve_keys,
        });
        self
    }
}

/// Character facts every action response carries, expressed as world-state
/// observations. Derived predicates recompute when these merge.
pub fn observe_character(character: &CharacterData) -> WorldState {
    let mut data = WorldState::new();
    data.insert(
        params::CHARACTER_LEVEL.to_string(),
        StateValue::Int(character.level),
    );
    data.insert(
        params::CHARACTER_XP.to_string(),
        StateValue::Int(character.xp),
    );
    data.insert(
        params::CHARACTER_MAX_XP.to_string(),
        StateValue::Int(character.max_xp),
    );
    data.insert(
        params::CHARACTER_HP.to_string(),
        StateValue::Int(character.hp),
    );
    data.insert(
        params::CHARACTER_MAX_HP.to_string(),
        StateValue::Int(character.max_hp),
    );
    data.insert(params::LOCATION_X.to_string(), StateValue::Int(character.x));
    data.insert(params::LOCATION_Y.to_string(), StateValue::Int(character.y));
    let on_cooldown = match character.cooldown_expiration {
        Some(expiration) => expiration > chrono::Utc::now(),
        None => character.cooldown > 0,
    };
    data.insert(
        params::CHARACTER_COOLDOWN_ACTIVE.to_string(),
        StateValue::Bool(on_cooldown),
    );
    data
}

/// Declarative part of an action: what the planner reasons with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDeclaration {
    pub name: String,
    #[serde(default)]
    pub conditions: WorldState,
    #[serde(default)]
    pub reactions: WorldState,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Imperative part of an action: the handler that talks to the game.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, api: &dyn GameApi, ctx: &ActionContext) -> ActionResult;
}

struct RegisteredAction {
    declaration: ActionDeclaration,
    handler: Arc<dyn ActionHandler>,
}

/// Name-keyed registry of declarations + handlers.
pub struct ActionRegistry {
    actions: BTreeMap<String, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, declaration: ActionDeclaration, handler: Arc<dyn ActionHandler>) {
        self.actions.insert(
            declaration.name.clone(),
            RegisteredAction {
                declaration,
                handler,
            },
        );
    }

    /// All declarations, for the planner.
    pub fn declarations(&self) -> Vec<ActionDeclaration> {
        self.actions
            .values()
            .map(|a| a.declaration.clone())
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&ActionDeclaration> {
        self.actions.get(name).map(|a| &a.declaration)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Dispatch one action: start/end logging, timing, panic wrapping, and
    /// classification all live here so handlers stay small.
    pub async fn execute(
        &self,
        name: &str,
        api: &dyn GameApi,
        ctx: &ActionContext,
    ) -> ActionResult {
        let Some(action) = self.actions.get(name) else {
            return ActionResult::failure(
                ErrorKind::Invalid,
                format!("action '{name}' is not registered"),
            );
        };

        info!(action = name, "executing");
        let started = Instant::now();

        let result = AssertUnwindSafe(action.handler.execute(api, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                error!(action = name, message, "handler panicked");
                ActionResult::failure(ErrorKind::Exception, message)
            });

        let elapsed_ms = started.elapsed().as_millis();
        match (&result.success, &result.error) {
            (true, _) => debug!(action = name, elapsed_ms, "action succeeded"),
            (false, Some(e)) => {
                warn!(action = name, elapsed_ms, kind = ?e.kind, message = %e.message, "action failed")
            }
            (false, None) => warn!(action = name, elapsed_ms, "action failed without error detail"),
        }
        result
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
