//! # Game API
//!
//! Typed client for the game's public HTTP API. The rest of the crate only
//! sees the [`GameApi`] trait — action handlers receive it as a minimal
//! interface, and tests substitute an in-memory fake.
//!
//! The server serializes requests per character and signals waits through
//! cooldown fields on every action response; surfacing those fields
//! faithfully (rather than guessing from elapsed time) is this module's main
//! job besides transport.

mod character;
mod http;

pub use character::{apply_character, CharacterCache};
pub use http::HttpGameClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Game API error types.
///
/// `Status` carries the server's error payload; classification helpers below
/// turn status codes and message substrings into the taxonomy the action
/// layer works with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or protocol failure before a response was decoded
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success response from the game server
    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },
}

impl ApiError {
    pub fn is_cooldown(&self) -> bool {
        match self {
            ApiError::Status { code, message } => {
                *code == 499 || message.to_lowercase().contains("cooldown")
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Status { code, message } => {
                *code == 404 || *code == 598 || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }

    pub fn is_already_at_destination(&self) -> bool {
        match self {
            ApiError::Status { code, message } => {
                *code == 490 || message.to_lowercase().contains("already at this location")
            }
            _ => false,
        }
    }

    pub fn is_not_allowed(&self) -> bool {
        match self {
            ApiError::Status { code, message } => {
                *code == 486 || message.to_lowercase().contains("action is not allowed")
            }
            _ => false,
        }
    }

    /// Worth retrying with back-off: transport failures and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { code, .. } => *code >= 500,
        }
    }
}

/// Character sheet as returned by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterData {
    pub name: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub max_xp: i64,
    #[serde(default)]
    pub hp: i64,
    #[serde(default)]
    pub max_hp: i64,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    /// Legacy remaining-seconds field; stale after the cooldown elapses.
    /// Only consulted when `cooldown_expiration` is absent.
    #[serde(default)]
    pub cooldown: i64,
    #[serde(default)]
    pub cooldown_expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub weapon_slot: Option<String>,
}

impl CharacterData {
    pub fn hp_percentage(&self) -> f64 {
        if self.max_hp > 0 {
            self.hp as f64 / self.max_hp as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// One dropped or gathered item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropItem {
    pub code: String,
    #[serde(default)]
    pub quantity: i64,
}

/// Fight block of a fight-action response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FightData {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub turns: i64,
    #[serde(default)]
    pub drops: Vec<DropItem>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl FightData {
    pub fn is_win(&self) -> bool {
        self.result == "win"
    }
}

/// Content present on a map tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub code: String,
}

/// One map tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTile {
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub content: Option<MapContent>,
}

/// Monster listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonsterData {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub hp: i64,
}

/// Resource listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceData {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub drops: Vec<DropItem>,
}

/// What every character action returns: the refreshed character sheet plus
/// whichever detail block the action produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub character: CharacterData,
    #[serde(default)]
    pub fight: Option<FightData>,
    #[serde(default)]
    pub details: Option<Vec<DropItem>>,
}

/// The slice of the game API the action handlers consume.
#[async_trait]
pub trait GameApi: Send + Sync {
    async fn get_character(&self, name: &str) -> Result<CharacterData, ApiError>;
    async fn move_character(&self, name: &str, x: i64, y: i64) -> Result<ActionOutcome, ApiError>;
    async fn fight(&self, name: &str) -> Result<ActionOutcome, ApiError>;
    async fn rest(&self, name: &str) -> Result<ActionOutcome, ApiError>;
    async fn gather(&self, name: &str) -> Result<ActionOutcome, ApiError>;
    async fn craft(&self, name: &str, code: &str, quantity: i64)
        -> Result<ActionOutcome, ApiError>;
    async fn equip(&self, name: &str, code: &str, slot: &str) -> Result<ActionOutcome, ApiError>;
    async fn get_map(&self, x: i64, y: i64) -> Result<MapTile, ApiError>;
    async fn list_monsters(&self) -> Result<Vec<MonsterData>, ApiError>;
    async fn list_resources(&self) -> Result<Vec<ResourceData>, ApiError>;
}
