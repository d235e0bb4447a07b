//! # Knowledge Base
//!
//! Persistent observations accumulated across missions: where monsters and
//! resources were seen, how fights went, which map tiles were scanned and
//! when. The store is append-mostly — combat history is never rewritten —
//! and every entry carries a discovery timestamp.
//!
//! Persistence is a YAML snapshot written after each successful mutating
//! call. Loading is lenient: malformed entries are dropped with a warning
//! instead of failing the whole file.

mod map;

pub use map::{MapCache, TileContent, TileRecord, DEFAULT_TILE_CACHE_SECS};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Knowledge base error types
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("knowledge format error: {0}")]
    Format(#[from] serde_yaml::Error),
}

/// What kind of map content an observation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Monster,
    Resource,
    Workshop,
}

/// Outcome of one recorded fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    Win,
    Loss,
}

/// Character facts captured alongside a combat record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub level: i64,
    pub hp: i64,
    pub hp_before: i64,
}

/// Fight facts captured alongside a combat record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FightSummary {
    pub xp: i64,
    pub gold: i64,
    pub turns: i64,
    #[serde(default)]
    pub drops: Vec<String>,
}

/// One appended combat observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatRecord {
    pub outcome: CombatOutcome,
    pub character_level: i64,
    pub damage_taken: i64,
    pub xp_gained: i64,
    pub timestamp: DateTime<Utc>,
}

/// Everything learned about one monster code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonsterKnowledge {
    pub first_discovered: DateTime<Utc>,
    pub encounter_count: u64,
    #[serde(default)]
    pub locations: Vec<(i64, i64)>,
    #[serde(default)]
    pub combat_results: Vec<CombatRecord>,
    pub estimated_level: Option<f64>,
    pub estimated_damage: Option<f64>,
}

/// Everything learned about one resource code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceKnowledge {
    pub first_discovered: DateTime<Utc>,
    pub encounter_count: u64,
    #[serde(default)]
    pub locations: Vec<(i64, i64)>,
    pub required_skill: Option<String>,
    pub required_level: Option<i64>,
    #[serde(default)]
    pub yields: Vec<String>,
}

/// Everything learned about one workshop code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkshopKnowledge {
    pub first_discovered: DateTime<Utc>,
    pub encounter_count: u64,
    #[serde(default)]
    pub locations: Vec<(i64, i64)>,
}

/// Aggregate counters over everything the agent has learned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningStats {
    pub discoveries: u64,
    pub combats_recorded: u64,
    pub wins: u64,
    pub losses: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnowledgeData {
    #[serde(default)]
    monsters: BTreeMap<String, MonsterKnowledge>,
    #[serde(default)]
    resources: BTreeMap<String, ResourceKnowledge>,
    #[serde(default)]
    workshops: BTreeMap<String, WorkshopKnowledge>,
    #[serde(default)]
    learning_stats: LearningStats,
}

/// Cross-mission persistent observation store.
///
/// Shared read-mostly; the interior mutex serializes writers. Each mutating
/// call snapshots to disk before returning when a path is configured.
pub struct KnowledgeBase {
    inner: Mutex<KnowledgeData>,
    path: Option<PathBuf>,
    /// Win-rate queries only count records from characters within this many
    /// levels of the asking character.
    level_proximity: i64,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(KnowledgeData::default()),
            path: None,
            level_proximity: 1,
        }
    }

    /// Attach a snapshot file; loads existing content leniently.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self, KnowledgeError> {
        let path = path.into();
        let data = load_lenient(&path)?;
        Ok(Self {
            inner: Mutex::new(data),
            path: Some(path),
            level_proximity: 1,
        })
    }

    pub fn with_level_proximity(mut self, proximity: i64) -> Self {
        self.level_proximity = proximity;
        self
    }

    /// Upsert an observation of map content: bump the encounter counter,
    /// remember the location, stamp first discovery on insert.
    pub fn record_content_discovery(
        &self,
        kind: ContentKind,
        code: &str,
        x: i64,
        y: i64,
        details: &BTreeMap<String, String>,
    ) -> Result<(), KnowledgeError> {
        {
            let mut data = self.inner.lock();
            let now = Utc::now();
            match kind {
                ContentKind::Monster => {
                    let entry =
                        data.monsters
                            .entry(code.to_string())
                            .or_insert_with(|| MonsterKnowledge {
                                first_discovered: now,
                                encounter_count: 0,
                                locations: Vec::new(),
                                combat_results: Vec::new(),
                                estimated_level: None,
                                estimated_damage: None,
                            });
                    entry.encounter_count += 1;
                    if !entry.locations.contains(&(x, y)) {
                        entry.locations.push((x, y));
                    }
                }
                ContentKind::Resource => {
                    let entry =
                        data.resources
                            .entry(code.to_string())
                            .or_insert_with(|| ResourceKnowledge {
                                first_discovered: now,
                                encounter_count: 0,
                                locations: Vec::new(),
                                required_skill: None,
                                required_level: None,
                                yields: Vec::new(),
                            });
                    entry.encounter_count += 1;
                    if !entry.locations.contains(&(x, y)) {
                        entry.locations.push((x, y));
                    }
                    if let Some(skill) = details.get("skill") {
                        entry.required_skill = Some(skill.clone());
                    }
                    if let Some(level) = details.get("level").and_then(|v| v.parse().ok()) {
                        entry.required_level = Some(level);
                    }
                    if let Some(drop) = details.get("drop") {
                        if !entry.yields.contains(drop) {
                            entry.yields.push(drop.clone());
                        }
                    }
                }
                ContentKind::Workshop => {
                    let entry =
                        data.workshops
                            .entry(code.to_string())
                            .or_insert_with(|| WorkshopKnowledge {
                                first_discovered: now,
                                encounter_count: 0,
                                locations: Vec::new(),
                            });
                    entry.encounter_count += 1;
                    if !entry.locations.contains(&(x, y)) {
                        entry.locations.push((x, y));
                    }
                }
            }
            data.learning_stats.discoveries += 1;
        }
        debug!(?kind, code, x, y, "recorded content discovery");
        self.persist()
    }

    /// Append a combat record and refresh the aggregate estimates. Existing
    /// records are never modified.
    pub fn record_combat_result(
        &self,
        monster_code: &str,
        outcome: CombatOutcome,
        character: &CharacterSnapshot,
        fight: &FightSummary,
    ) -> Result<(), KnowledgeError> {
        {
            let mut data = self.inner.lock();
            let now = Utc::now();
            let entry = data
                .monsters
                .entry(monster_code.to_string())
                .or_insert_with(|| MonsterKnowledge {
                    first_discovered: now,
                    encounter_count: 0,
                    locations: Vec::new(),
                    combat_results: Vec::new(),
                    estimated_level: None,
                    estimated_damage: None,
                });

            entry.combat_results.push(CombatRecord {
                outcome,
                character_level: character.level,
                damage_taken: (character.hp_before - character.hp).max(0),
                xp_gained: fight.xp,
                timestamp: now,
            });

            let wins: Vec<&CombatRecord> = entry
                .combat_results
                .iter()
                .filter(|r| r.outcome == CombatOutcome::Win)
                .collect();
            if !wins.is_empty() {
                let n = wins.len() as f64;
                entry.estimated_damage =
                    Some(wins.iter().map(|r| r.damage_taken as f64).sum::<f64>() / n);
                entry.estimated_level =
                    Some(wins.iter().map(|r| r.character_level as f64).sum::<f64>() / n);
            }

            data.learning_stats.combats_recorded += 1;
            match outcome {
                CombatOutcome::Win => data.learning_stats.wins += 1,
                CombatOutcome::Loss => data.learning_stats.losses += 1,
            }
        }
        self.persist()
    }

    /// Win rate against a monster for a character of the given level.
    ///
    /// Requires at least two records within the configured level proximity;
    /// returns `None` (unknown) otherwise.
    pub fn monster_win_rate(&self, code: &str, character_level: i64) -> Option<f64> {
        let data = self.inner.lock();
        let entry = data.monsters.get(code)?;
        let relevant: Vec<&CombatRecord> = entry
            .combat_results
            .iter()
            .filter(|r| (r.character_level - character_level).abs() <= self.level_proximity)
            .collect();
        if relevant.len() < 2 {
            return None;
        }
        let wins = relevant
            .iter()
            .filter(|r| r.outcome == CombatOutcome::Win)
            .count();
        Some(wins as f64 / relevant.len() as f64)
    }

    /// Nearest recorded location of the given content kind within
    /// `max_distance` (euclidean), with its distance.
    pub fn find_nearest_known(
        &self,
        kind: ContentKind,
        x: i64,
        y: i64,
        max_distance: f64,
    ) -> Option<(i64, i64, f64)> {
        let data = self.inner.lock();
        let locations: Vec<(i64, i64)> = match kind {
            ContentKind::Monster => data
                .monsters
                .values()
                .flat_map(|m| m.locations.iter().copied())
                .collect(),
            ContentKind::Resource => data
                .resources
                .values()
                .flat_map(|r| r.locations.iter().copied())
                .collect(),
            ContentKind::Workshop => data
                .workshops
                .values()
                .flat_map(|w| w.locations.iter().copied())
                .collect(),
        };
        locations
            .into_iter()
            .map(|(lx, ly)| {
                let d = (((lx - x).pow(2) + (ly - y).pow(2)) as f64).sqrt();
                (lx, ly, d)
            })
            .filter(|(_, _, d)| *d <= max_distance)
            .min_by(|a, b| a.2.total_cmp(&b.2))
    }

    /// Known locations of one monster code.
    pub fn monster_locations(&self, code: &str) -> Vec<(i64, i64)> {
        self.inner
            .lock()
            .monsters
            .get(code)
            .map(|m| m.locations.clone())
            .unwrap_or_default()
    }

    pub fn monster(&self, code: &str) -> Option<MonsterKnowledge> {
        self.inner.lock().monsters.get(code).cloned()
    }

    pub fn resource(&self, code: &str) -> Option<ResourceKnowledge> {
        self.inner.lock().resources.get(code).cloned()
    }

    pub fn stats(&self) -> LearningStats {
        self.inner.lock().learning_stats.clone()
    }

    /// Write the current snapshot to the configured path, if any.
    pub fn save(&self) -> Result<(), KnowledgeError> {
        self.persist()
    }

    fn persist(&self) -> Result<(), KnowledgeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = self.inner.lock();
        let yaml = serde_yaml::to_string(&*data)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a knowledge snapshot, dropping entries that fail to deserialize
/// instead of rejecting the file.
fn load_lenient(path: &Path) -> Result<KnowledgeData, KnowledgeError> {
    if !path.exists() {
        return Ok(KnowledgeData::default());
    }
    let yaml = std::fs::read_to_string(path)?;
    if yaml.trim().is_empty() {
        return Ok(KnowledgeData::default());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml)?;
    let mut data = KnowledgeData::default();

    if value.as_mapping().is_none() {
        warn!(path = %path.display(), "knowledge snapshot is not a mapping, starting fresh");
        return Ok(data);
    }

    if let Some(monsters) = value.get("monsters").and_then(|v| v.as_mapping()) {
        for (code, entry) in monsters {
            let Some(code) = code.as_str() else { continue };
            match serde_yaml::from_value::<MonsterKnowledge>(entry.clone()) {
                Ok(m) => {
                    data.monsters.insert(code.to_string(), m);
                }
                Err(e) => warn!(code, error = %e, "dropping malformed monster entry"),
            }
        }
    }
    if let Some(resources) = value.get("resources").and_then(|v| v.as_mapping()) {
        for (code, entry) in resources {
            let Some(code) = code.as_str() else { continue };
            match serde_yaml::from_value::<ResourceKnowledge>(entry.clone()) {
                Ok(r) => {
                    data.resources.insert(code.to_string(), r);
                }
                Err(e) => warn!(code, error = %e, "dropping malformed resource entry"),
            }
        }
    }
    if let Some(workshops) = value.get("workshops").and_then(|v| v.as_mapping()) {
        for (code, entry) in workshops {
            let Some(code) = code.as_str() else { continue };
            match serde_yaml::from_value::<WorkshopKnowledge>(entry.clone()) {
                Ok(w) => {
                    data.workshops.insert(code.to_string(), w);
                }
                Err(e) => warn!(code, error = %e, "dropping malformed workshop entry"),
            }
        }
    }
    if let Some(stats) = value.get("learning_stats") {
        if let Ok(s) = serde_yaml::from_value::<LearningStats>(stats.clone()) {
            data.learning_stats = s;
        }
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(level: i64, hp: i64, hp_before: i64) -> CharacterSnapshot {
        CharacterSnapshot {
            level,
            hp,
            hp_before,
        }
    }

    #[test]
    fn test_discovery_upserts_and_counts() {
        let kb = KnowledgeBase::new();
        let details = BTreeMap::new();
        kb.record_content_discovery(ContentKind::Monster, "green_slime", 2, 3, &details)
            .unwrap();
        kb.record_content_discovery(ContentKind::Monster, "green_slime", 2, 3, &details)
            .unwrap();

        let entry = kb.monster("green_slime").unwrap();
        assert_eq!(entry.encounter_count, 2);
        assert_eq!(entry.locations, vec![(2, 3)]);
        assert_eq!(kb.stats().discoveries, 2);
    }

    #[test]
    fn test_resource_details_captured() {
        let kb = KnowledgeBase::new();
        let mut details = BTreeMap::new();
        details.insert("skill".to_string(), "mining".to_string());
        details.insert("level".to_string(), "5".to_string());
        details.insert("drop".to_string(), "copper_ore".to_string());
        kb.record_content_discovery(ContentKind::Resource, "copper_rocks", 1, 1, &details)
            .unwrap();

        let entry = kb.resource("copper_rocks").unwrap();
        assert_eq!(entry.required_skill.as_deref(), Some("mining"));
        assert_eq!(entry.required_level, Some(5));
        assert_eq!(entry.yields, vec!["copper_ore".to_string()]);
    }

    #[test]
    fn test_combat_results_append_only() {
        let kb = KnowledgeBase::new();
        kb.record_combat_result(
            "green_slime",
            CombatOutcome::Win,
            &snapshot(3, 90, 100),
            &FightSummary::default(),
        )
        .unwrap();
        let first = kb.monster("green_slime").unwrap().combat_results[0].clone();

        kb.record_combat_result(
            "green_slime",
            CombatOutcome::Loss,
            &snapshot(3, 20, 100),
            &FightSummary::default(),
        )
        .unwrap();

        let entry = kb.monster("green_slime").unwrap();
        assert_eq!(entry.combat_results.len(), 2);
        assert_eq!(entry.combat_results[0].damage_taken, first.damage_taken);
        assert_eq!(entry.combat_results[0].character_level, 3);
    }

    #[test]
    fn test_estimates_use_wins_only() {
        let kb = KnowledgeBase::new();
        kb.record_combat_result(
            "wolf",
            CombatOutcome::Win,
            &snapshot(5, 70, 100),
            &FightSummary::default(),
        )
        .unwrap();
        kb.record_combat_result(
            "wolf",
            CombatOutcome::Win,
            &snapshot(6, 80, 100),
            &FightSummary::default(),
        )
        .unwrap();
        kb.record_combat_result(
            "wolf",
            CombatOutcome::Loss,
            &snapshot(4, 0, 100),
            &FightSummary::default(),
        )
        .unwrap();

        let entry = kb.monster("wolf").unwrap();
        assert_eq!(entry.estimated_damage, Some(25.0));
        assert_eq!(entry.estimated_level, Some(5.5));
    }

    #[test]
    fn test_win_rate_requires_two_proximate_records() {
        let kb = KnowledgeBase::new();
        kb.record_combat_result(
            "wolf",
            CombatOutcome::Win,
            &snapshot(5, 80, 100),
            &FightSummary::default(),
        )
        .unwrap();
        assert_eq!(kb.monster_win_rate("wolf", 5), None);

        kb.record_combat_result(
            "wolf",
            CombatOutcome::Loss,
            &snapshot(5, 10, 100),
            &FightSummary::default(),
        )
        .unwrap();
        assert_eq!(kb.monster_win_rate("wolf", 5), Some(0.5));

        // A distant character level sees no relevant records.
        assert_eq!(kb.monster_win_rate("wolf", 9), None);
        assert_eq!(kb.monster_win_rate("unseen", 5), None);
    }

    #[test]
    fn test_find_nearest_known() {
        let kb = KnowledgeBase::new();
        let details = BTreeMap::new();
        kb.record_content_discovery(ContentKind::Resource, "ash_tree", 0, 4, &details)
            .unwrap();
        kb.record_content_discovery(ContentKind::Resource, "copper_rocks", 3, 0, &details)
            .unwrap();

        let nearest = kb.find_nearest_known(ContentKind::Resource, 0, 0, 10.0);
        assert_eq!(nearest, Some((3, 0, 3.0)));

        assert_eq!(kb.find_nearest_known(ContentKind::Resource, 0, 0, 2.0), None);
        assert_eq!(kb.find_nearest_known(ContentKind::Monster, 0, 0, 10.0), None);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.yaml");

        let kb = KnowledgeBase::with_path(&path).unwrap();
        kb.record_combat_result(
            "green_slime",
            CombatOutcome::Win,
            &snapshot(2, 85, 100),
            &FightSummary {
                xp: 24,
                ..Default::default()
            },
        )
        .unwrap();

        let restored = KnowledgeBase::with_path(&path).unwrap();
        let entry = restored.monster("green_slime").unwrap();
        assert_eq!(entry.combat_results.len(), 1);
        assert_eq!(entry.combat_results[0].xp_gained, 24);
        assert_eq!(restored.stats().wins, 1);

        // Save → load → save is byte-identical.
        restored.save().unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        let again = KnowledgeBase::with_path(&path).unwrap();
        again.save().unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lenient_load_drops_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.yaml");
        std::fs::write(
            &path,
            "monsters:\n  good:\n    first_discovered: 2026-01-01T00:00:00Z\n    encounter_count: 1\n  bad: \"not a mapping\"\n",
        )
        .unwrap();

        let kb = KnowledgeBase::with_path(&path).unwrap();
        assert!(kb.monster("good").is_some());
        assert!(kb.monster("bad").is_none());
    }
}
