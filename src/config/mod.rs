//! Configuration loading: action declarations from `actions.yaml` and
//! runtime settings from the environment.
//!
//! Goal templates and thresholds live in `goal_templates.yaml` and are
//! loaded by [`crate::goals::GoalManager`]; this module covers everything
//! else the binary needs at startup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::actions::{ActionDeclaration, RegistryError};
use crate::state::WorldState;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration format error: {0}")]
    Format(#[from] serde_yaml::Error),

    #[error("missing environment variable {0}")]
    MissingEnv(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Deserialize)]
struct ActionsFile {
    #[serde(default)]
    actions: BTreeMap<String, ActionSpec>,
}

#[derive(Debug, Deserialize)]
struct ActionSpec {
    #[serde(default)]
    conditions: WorldState,
    #[serde(default)]
    reactions: WorldState,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Load action declarations from an `actions.yaml` file.
pub fn load_actions(path: &Path) -> Result<Vec<ActionDeclaration>, ConfigError> {
    let yaml = std::fs::read_to_string(path)?;
    let declarations = parse_actions(&yaml)?;
    info!(count = declarations.len(), path = %path.display(), "action declarations loaded");
    Ok(declarations)
}

/// Parse action declarations from YAML text.
pub fn parse_actions(yaml: &str) -> Result<Vec<ActionDeclaration>, ConfigError> {
    let file: ActionsFile = serde_yaml::from_str(yaml)?;
    Ok(file
        .actions
        .into_iter()
        .map(|(name, spec)| ActionDeclaration {
            name,
            conditions: spec.conditions,
            reactions: spec.reactions,
            weight: spec.weight,
        })
        .collect())
}

/// Required environment variable, with a config error naming it when unset.
pub fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnv(name.to_string()))
}
