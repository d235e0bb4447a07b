//! # Goal Manager
//!
//! YAML-driven goal template provider. Rules are evaluated in priority order
//! against the current world state; templates are hydrated with parameters
//! and handed to the planner as target partial states. No business logic
//! lives here beyond condition evaluation and template hydration — behavior
//! belongs to actions, policy to `goal_templates.yaml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::state::{condition_met, StateValue, WorldState};

/// Goal configuration error types
#[derive(Debug, Error)]
pub enum GoalError {
    #[error("goal configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("goal configuration format error: {0}")]
    Format(#[from] serde_yaml::Error),
}

/// Global tuning thresholds from the `thresholds:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub max_goap_iterations: usize,
    pub default_search_radius: i64,
    pub hp_safe_percentage: f64,
    pub hp_healthy_percentage: f64,
    pub cooldown_refresh_cache_duration: f64,
    pub max_goal_failures: u32,
    pub max_mission_iterations: usize,
    pub planner_node_budget: usize,
    pub map_cache_duration_secs: i64,
    pub win_rate_weight: f64,
    pub distance_weight: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_goap_iterations: 50,
            default_search_radius: 2,
            hp_safe_percentage: 30.0,
            hp_healthy_percentage: 80.0,
            cooldown_refresh_cache_duration: 5.0,
            max_goal_failures: 3,
            max_mission_iterations: 25,
            planner_node_budget: 500,
            map_cache_duration_secs: crate::knowledge::DEFAULT_TILE_CACHE_SECS,
            win_rate_weight: 100.0,
            distance_weight: 0.1,
        }
    }
}

/// Named target partial-state plus strategy knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalTemplate {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_state: WorldState,
    #[serde(default)]
    pub strategy: WorldState,
    #[serde(default)]
    pub parameters: BTreeMap<String, StateValue>,
}

/// One selection rule inside a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSelectionRule {
    #[serde(default)]
    pub condition: WorldState,
    pub goal: String,
    #[serde(default)]
    pub priority: i64,
}

/// Strategy view with the global thresholds folded in.
#[derive(Debug, Clone)]
pub struct GoalStrategy {
    values: WorldState,
}

impl GoalStrategy {
    pub fn max_iterations(&self) -> usize {
        self.values
            .get("max_iterations")
            .and_then(StateValue::as_int)
            .map(|v| v as usize)
            .unwrap_or(50)
    }

    pub fn hunt_radius(&self) -> i64 {
        self.values
            .get("hunt_radius")
            .and_then(StateValue::as_int)
            .unwrap_or(2)
    }

    pub fn safety_priority(&self) -> bool {
        self.values
            .get("safety_priority")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key)
    }

    pub fn values(&self) -> &WorldState {
        &self.values
    }
}

#[derive(Debug, Default, Deserialize)]
struct GoalsFile {
    #[serde(default)]
    goal_templates: BTreeMap<String, GoalTemplate>,
    #[serde(default)]
    goal_selection_rules: BTreeMap<String, Vec<GoalSelectionRule>>,
    #[serde(default)]
    thresholds: Thresholds,
}

#[derive(Debug, Clone)]
struct FlatRule {
    category: String,
    goal: String,
    priority: i64,
    condition: WorldState,
}

/// Priority-rule evaluator over the goal template table.
pub struct GoalManager {
    templates: BTreeMap<String, GoalTemplate>,
    rules: Vec<FlatRule>,
    thresholds: Thresholds,
    path: Option<PathBuf>,
}

impl GoalManager {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GoalError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let mut manager = Self::from_yaml(&yaml)?;
        manager.path = Some(path.to_path_buf());
        Ok(manager)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, GoalError> {
        let file: GoalsFile = serde_yaml::from_str(yaml)?;
        let mut rules: Vec<FlatRule> = file
            .goal_selection_rules
            .iter()
            .flat_map(|(category, rules)| {
                rules.iter().map(|rule| FlatRule {
                    category: category.clone(),
                    goal: rule.goal.clone(),
                    priority: rule.priority,
                    condition: rule.condition.clone(),
                })
            })
            .collect();
        // Highest priority first; category then goal name keep equal
        // priorities stable across loads.
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.goal.cmp(&b.goal))
        });
        info!(
            templates = file.goal_templates.len(),
            rules = rules.len(),
            "goal configuration loaded"
        );
        Ok(Self {
            templates: file.goal_templates,
            rules,
            thresholds: file.thresholds,
            path: None,
        })
    }

    /// Re-read the configuration file this manager was loaded from.
    pub fn reload(&mut self) -> Result<(), GoalError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let reloaded = Self::load(&path)?;
        self.templates = reloaded.templates;
        self.rules = reloaded.rules;
        self.thresholds = reloaded.thresholds;
        Ok(())
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn template(&self, name: &str) -> Option<&GoalTemplate> {
        self.templates.get(name)
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    /// Pick the highest-priority rule whose condition matches the state.
    ///
    /// `available` restricts the candidate pool (the mission layer uses it
    /// to exclude failed goals); `weights` adds per-goal priority bonuses
    /// (persistence weighting), which mostly matter as tie-breakers between
    /// rules of equal configured priority.
    pub fn select_goal(
        &self,
        state: &WorldState,
        available: Option<&[String]>,
        weights: Option<&BTreeMap<String, f64>>,
    ) -> Option<(String, GoalTemplate)> {
        let mut rules: Vec<&FlatRule> = self
            .rules
            .iter()
            .filter(|rule| {
                available.map_or(true, |names| names.iter().any(|n| n == &rule.goal))
            })
            .filter(|rule| self.templates.contains_key(&rule.goal))
            .collect();

        if let Some(weights) = weights {
            rules.sort_by(|a, b| {
                let wa = a.priority as f64 + weights.get(&a.goal).copied().unwrap_or(0.0);
                let wb = b.priority as f64 + weights.get(&b.goal).copied().unwrap_or(0.0);
                wb.total_cmp(&wa)
            });
        }

        for rule in rules {
            if !self.check_condition(&rule.condition, state) {
                continue;
            }
            debug!(
                goal = %rule.goal,
                category = %rule.category,
                priority = rule.priority,
                "goal selected"
            );
            let template = self.templates[&rule.goal].clone();
            return Some((rule.goal.clone(), template));
        }
        None
    }

    fn check_condition(&self, condition: &WorldState, state: &WorldState) -> bool {
        condition
            .iter()
            .all(|(key, expected)| condition_met(expected, state.get(key)))
    }

    /// Hydrate a template's target state: parameters (template defaults
    /// overlaid with the caller's) substitute into `${name}` placeholders.
    pub fn generate_goal_state(
        &self,
        template: &GoalTemplate,
        parameters: &BTreeMap<String, StateValue>,
    ) -> WorldState {
        let mut merged = template.parameters.clone();
        for (key, value) in parameters {
            merged.insert(key.clone(), value.clone());
        }

        template
            .target_state
            .iter()
            .map(|(key, value)| (key.clone(), substitute(value, &merged)))
            .collect()
    }

    /// Template strategy with global threshold defaults folded in.
    pub fn get_strategy(&self, template: &GoalTemplate) -> GoalStrategy {
        let mut values = template.strategy.clone();
        values
            .entry("max_iterations".to_string())
            .or_insert(StateValue::Int(self.thresholds.max_goap_iterations as i64));
        values
            .entry("hunt_radius".to_string())
            .or_insert(StateValue::Int(self.thresholds.default_search_radius));
        values
            .entry("safety_priority".to_string())
            .or_insert(StateValue::Bool(true));
        GoalStrategy { values }
    }
}

/// Replace `${name}` placeholders in string values; non-strings and unknown
/// placeholders pass through unchanged. A value that is exactly one
/// placeholder takes the parameter's type, not its string rendering.
fn substitute(value: &StateValue, parameters: &BTreeMap<String, StateValue>) -> StateValue {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    if let Some(name) = text
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        if let Some(parameter) = parameters.get(name) {
            return parameter.clone();
        }
        return value.clone();
    }
    let mut out = text.to_string();
    for (name, parameter) in parameters {
        let placeholder = format!("${{{name}}}");
        if out.contains(&placeholder) {
            let rendered = match parameter {
                StateValue::String(s) => s.clone(),
                StateValue::Int(i) => i.to_string(),
                StateValue::Float(f) => f.to_string(),
                StateValue::Bool(b) => b.to_string(),
                _ => continue,
            };
            out = out.replace(&placeholder, &rendered);
        }
    }
    StateValue::String(out)
}
