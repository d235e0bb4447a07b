//! Outer mission loop: goal selection, planning, execution, progress
//! tracking, and failure bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{apply_character, GameApi};
use crate::context::ActionContext;
use crate::goals::{GoalManager, GoalTemplate};
use crate::planner::PlanOutcome;
use crate::state::{condition_met, params, StateStore, StateValue, WorldState};

use super::{CancelToken, ExecutionManager, ExecutionOutcome};

/// Progress below which an iteration is not considered meaningful for
/// persistence weighting.
const PROGRESS_THRESHOLD: f64 = 0.2;

/// What a mission is trying to make true.
#[derive(Debug, Clone, Default)]
pub struct MissionParameters {
    /// The single target-state partial that defines success.
    pub objective: WorldState,
    /// Parameters passed through to goal templates (e.g. `target_level`).
    pub parameters: BTreeMap<String, StateValue>,
}

impl MissionParameters {
    /// Convenience constructor for the common "reach level N" mission.
    pub fn reach_level(target_level: i64) -> Self {
        let mut objective = WorldState::new();
        objective.insert(
            params::CHARACTER_LEVEL.to_string(),
            StateValue::String(format!(">={target_level}")),
        );
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "target_level".to_string(),
            StateValue::Int(target_level),
        );
        Self {
            objective,
            parameters,
        }
    }
}

/// Outer iterative controller. Owns the world state, the action context,
/// and the current plan for the duration of a mission.
pub struct MissionExecutor {
    api: Arc<dyn GameApi>,
    store: Arc<StateStore>,
    ctx: Arc<ActionContext>,
    goals: GoalManager,
    execution: ExecutionManager,
    cancel: CancelToken,
    data_dir: Option<PathBuf>,

    // Failure tracking; reset at mission start.
    failure_counts: BTreeMap<String, u32>,
    failed_goals: BTreeSet<String>,

    // Persistence weighting across iterations.
    progress_history: BTreeMap<String, Vec<f64>>,
    last_goal: Option<String>,
    last_progress: f64,
    persistence_bonus: f64,
}

impl MissionExecutor {
    pub fn new(
        api: Arc<dyn GameApi>,
        store: Arc<StateStore>,
        ctx: Arc<ActionContext>,
        goals: GoalManager,
        execution: ExecutionManager,
        cancel: CancelToken,
    ) -> Self {
        Self {
            api,
            store,
            ctx,
            goals,
            execution,
            cancel,
            data_dir: None,
            failure_counts: BTreeMap::new(),
            failed_goals: BTreeSet::new(),
            progress_history: BTreeMap::new(),
            last_goal: None,
            last_progress: 0.0,
            persistence_bonus: 0.5,
        }
    }

    /// Directory for `world.yaml` snapshots at mission boundaries.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Run one mission to success or budget exhaustion. Returns true iff
    /// the objective partial state was satisfied.
    pub async fn execute_progression_mission(&mut self, mission: &MissionParameters) -> bool {
        info!(objective = ?mission.objective, "starting mission");
        self.failure_counts.clear();
        self.failed_goals.clear();
        self.ctx.clear();

        let Ok(character) = self.ctx.character.force_refresh(self.api.as_ref()).await else {
            warn!("cannot start mission without a character sheet");
            return false;
        };
        apply_character(&self.store, &character);
        self.snapshot_world();

        let initial_level = character.level;
        let initial_xp = character.xp;
        let max_iterations = self.goals.thresholds().max_mission_iterations;

        let mut current_goal: Option<(String, GoalTemplate)> = None;
        let mut goal_start_level = initial_level;
        let mut success = false;
        let mut iterations_used = 0;

        for iteration in 1..=max_iterations {
            iterations_used = iteration;
            if self.cancel.is_cancelled() {
                info!("mission cancelled");
                break;
            }

            if let Ok(fresh) = self.ctx.character.refresh_if_stale(self.api.as_ref()).await {
                apply_character(&self.store, &fresh);
            }

            if self.store.matches(&mission.objective) {
                info!(iteration, "mission objective satisfied");
                success = true;
                break;
            }

            let level = self
                .store
                .get(params::CHARACTER_LEVEL)
                .and_then(|v| v.as_int())
                .unwrap_or(initial_level);
            let hp_percentage = self
                .store
                .get(params::CHARACTER_HP_PERCENTAGE)
                .and_then(|v| v.as_f64())
                .unwrap_or(100.0);
            let combat_not_viable = self
                .store
                .get(params::COMBAT_VIABLE)
                .and_then(|v| v.as_bool())
                == Some(false);

            debug!(iteration, level, hp_percentage, "mission iteration");

            if self.should_reselect(
                current_goal.as_ref().map(|(name, _)| name.as_str()),
                level,
                goal_start_level,
                hp_percentage,
                combat_not_viable,
            ) {
                let available = self.available_goals();
                let weights = self.persistence_weights(&available);
                match self.goals.select_goal(
                    &self.store.snapshot(),
                    Some(&available),
                    Some(&weights),
                ) {
                    Some((name, template)) => {
                        info!(goal = %name, description = %template.description, "goal selected");
                        goal_start_level = level;
                        current_goal = Some((name, template));
                    }
                    None => {
                        warn!("no suitable goal for current state, ending mission");
                        break;
                    }
                }
            } else if let Some((name, _)) = &current_goal {
                debug!(goal = %name, "continuing current goal");
            }

            let Some((goal_name, template)) = current_goal.clone() else {
                break;
            };

            self.pre_goal_setup(&goal_name);

            // Hydrate the goal and expose its parameters and strategy to
            // the actions through the context.
            let mut goal_parameters = template.parameters.clone();
            for (key, value) in &mission.parameters {
                goal_parameters.insert(key.clone(), value.clone());
            }
            let goal_state = self.goals.generate_goal_state(&template, &goal_parameters);
            self.expose_to_actions(&template, &goal_parameters);

            if self.store.matches(&goal_state) {
                debug!(goal = %goal_name, "goal already satisfied");
                self.record_progress(&goal_name, 1.0);
                if self.should_clear_goal(&goal_name) {
                    current_goal = None;
                }
                continue;
            }

            let progress_before = evaluate_progress(&goal_state, &self.store.snapshot());
            let strategy = self.goals.get_strategy(&template);

            let outcome = match self.execution.plan(&self.store.snapshot(), &goal_state) {
                PlanOutcome::NoPlan { reason } => {
                    warn!(goal = %goal_name, %reason, "planner found no path to goal");
                    self.track_goal_failure(&goal_name);
                    current_goal = None;
                    continue;
                }
                PlanOutcome::Found(plan) => {
                    info!(goal = %goal_name, steps = ?plan.action_names(), "plan ready");
                    self.execution
                        .run_plan(
                            plan,
                            &goal_state,
                            &self.store,
                            &self.ctx,
                            self.api.as_ref(),
                            &self.goals,
                            strategy.max_iterations(),
                        )
                        .await
                }
            };

            match outcome {
                ExecutionOutcome::Completed => {
                    info!(goal = %goal_name, "goal achieved");
                    self.reset_failures_on_success(&goal_name);
                    self.post_goal_cleanup(&goal_name);
                    if self.should_clear_goal(&goal_name) {
                        current_goal = None;
                    }
                }
                ExecutionOutcome::Cancelled => {
                    info!("mission cancelled during plan execution");
                    break;
                }
                ExecutionOutcome::Failed { action, error } => {
                    warn!(goal = %goal_name, action = %action, kind = ?error.kind, "goal execution failed");
                    self.track_goal_failure(&goal_name);
                    current_goal = None;
                }
                ExecutionOutcome::Exhausted { reason } => {
                    warn!(goal = %goal_name, %reason, "goal execution exhausted its budget");
                    self.track_goal_failure(&goal_name);
                    current_goal = None;
                }
            }

            let progress_after = evaluate_progress(&goal_state, &self.store.snapshot());
            self.record_progress(&goal_name, progress_after);
            if progress_after > progress_before {
                info!(
                    goal = %goal_name,
                    before = progress_before,
                    after = progress_after,
                    "progress improved"
                );
            }
        }

        self.snapshot_world();
        self.report_results(initial_level, initial_xp, iterations_used, success);
        success
    }

    fn should_reselect(
        &self,
        current_goal: Option<&str>,
        level: i64,
        goal_start_level: i64,
        hp_percentage: f64,
        combat_not_viable: bool,
    ) -> bool {
        let Some(current) = current_goal else {
            return true;
        };
        if level > goal_start_level {
            info!("level up detected, reselecting goal");
            return true;
        }
        let safe_threshold = self.goals.thresholds().hp_safe_percentage;
        if hp_percentage < safe_threshold && current != "get_to_safety" {
            info!(hp_percentage, "HP below safe threshold, reselecting goal");
            return true;
        }
        if combat_not_viable && current == "hunt_monsters" {
            info!("combat no longer viable, leaving hunt for upgrades");
            return true;
        }
        false
    }

    fn available_goals(&self) -> Vec<String> {
        let all = self.goals.template_names();
        let available: Vec<String> = all
            .into_iter()
            .filter(|name| !self.failed_goals.contains(name))
            .collect();
        if !self.failed_goals.is_empty() {
            debug!(excluded = ?self.failed_goals, "excluding failed goals");
        }
        available
    }

    fn persistence_weights(&self, available: &[String]) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        for name in available {
            let weight = self.persistence_weight(name);
            if weight > 0.0 {
                weights.insert(name.clone(), weight);
            }
        }
        if !weights.is_empty() {
            debug!(?weights, "applying persistence weights");
        }
        weights
    }

    /// Weight bonus for goals that recently made progress: the goal we just
    /// worked gets a bonus proportional to its last progress, anything with
    /// recent history gets a smaller one, both capped at the base bonus.
    fn persistence_weight(&self, goal_name: &str) -> f64 {
        if self.last_goal.as_deref() == Some(goal_name)
            && self.last_progress > PROGRESS_THRESHOLD
        {
            return (self.persistence_bonus * self.last_progress).min(self.persistence_bonus);
        }
        if let Some(history) = self.progress_history.get(goal_name) {
            let best = history.iter().copied().fold(0.0_f64, f64::max);
            if best > PROGRESS_THRESHOLD {
                return (best * 0.5 * self.persistence_bonus).min(self.persistence_bonus);
            }
        }
        0.0
    }

    fn record_progress(&mut self, goal_name: &str, progress: f64) {
        let history = self.progress_history.entry(goal_name.to_string()).or_default();
        history.push(progress);
        if history.len() > 5 {
            let excess = history.len() - 5;
            history.drain(..excess);
        }
        self.last_goal = Some(goal_name.to_string());
        self.last_progress = progress;
    }

    fn track_goal_failure(&mut self, goal_name: &str) {
        let count = self.failure_counts.entry(goal_name.to_string()).or_insert(0);
        *count += 1;
        let max = self.goals.thresholds().max_goal_failures;
        warn!(goal = %goal_name, attempt = *count, max, "goal failed");
        if *count >= max {
            self.failed_goals.insert(goal_name.to_string());
            warn!(goal = %goal_name, "goal exceeded max failures, excluded for this mission");
        }
    }

    fn reset_failures_on_success(&mut self, goal_name: &str) {
        self.failure_counts.remove(goal_name);
        self.failed_goals.remove(goal_name);
    }

    /// A stale `completed` combat context would satisfy a fresh hunt goal
    /// before it starts; flip it back to idle.
    fn pre_goal_setup(&self, goal_name: &str) {
        if goal_name == "hunt_monsters" {
            self.reset_combat_context_if_completed();
        }
    }

    fn post_goal_cleanup(&self, goal_name: &str) {
        if goal_name == "hunt_monsters" {
            self.reset_combat_context_if_completed();
        }
    }

    fn reset_combat_context_if_completed(&self) {
        let status = self
            .store
            .get(params::COMBAT_STATUS)
            .and_then(|v| v.as_str().map(str::to_string));
        if status.as_deref() == Some(params::status::COMPLETED) {
            debug!("resetting combat context from completed to idle");
            let _ = self.store.set(params::COMBAT_STATUS, params::status::IDLE);
            let _ = self.store.set(params::COMBAT_TARGET, StateValue::Null);
        }
    }

    /// Goals that must not stick across iterations once achieved.
    fn should_clear_goal(&self, goal_name: &str) -> bool {
        matches!(
            goal_name,
            "get_to_safety" | "wait_for_cooldown" | "hunt_monsters"
        )
    }

    /// Write goal parameters and search strategy where handlers read them.
    fn expose_to_actions(
        &self,
        template: &GoalTemplate,
        parameters: &BTreeMap<String, StateValue>,
    ) {
        for (key, value) in parameters {
            self.ctx.set(key, value.clone());
        }
        let thresholds = self.goals.thresholds();
        let strategy = self.goals.get_strategy(template);
        self.ctx
            .set(params::SEARCH_RADIUS, thresholds.default_search_radius);
        self.ctx
            .set(params::SEARCH_MAX_RADIUS, strategy.hunt_radius());
        self.ctx
            .set(params::SEARCH_WIN_RATE_WEIGHT, thresholds.win_rate_weight);
        self.ctx
            .set(params::SEARCH_DISTANCE_WEIGHT, thresholds.distance_weight);
    }

    fn snapshot_world(&self) {
        if let Some(dir) = &self.data_dir {
            let path = dir.join("world.yaml");
            if let Err(e) = self.store.save(&path) {
                warn!(error = %e, "world snapshot not written");
            }
        }
    }

    fn report_results(
        &self,
        initial_level: i64,
        initial_xp: i64,
        iterations: usize,
        success: bool,
    ) {
        let final_level = self
            .store
            .get(params::CHARACTER_LEVEL)
            .and_then(|v| v.as_int())
            .unwrap_or(initial_level);
        let final_xp = self
            .store
            .get(params::CHARACTER_XP)
            .and_then(|v| v.as_int())
            .unwrap_or(initial_xp);
        info!(
            levels_gained = final_level - initial_level,
            xp_gained = final_xp - initial_xp,
            iterations,
            success,
            "mission finished"
        );
    }
}

/// Fraction of goal conditions met, with partial credit on numeric targets:
/// a condition at 40/100 counts as 0.4, capped at 1.
pub fn evaluate_progress(goal: &WorldState, state: &WorldState) -> f64 {
    if goal.is_empty() {
        return 0.0;
    }
    let mut met = 0.0;
    for (key, expected) in goal {
        let actual = state.get(key);
        if condition_met(expected, actual) {
            met += 1.0;
            continue;
        }
        let target = numeric_target(expected);
        let current = actual.and_then(StateValue::as_f64);
        if let (Some(target), Some(current)) = (target, current) {
            if target > 0.0 && current > 0.0 {
                met += (current / target).min(1.0);
            }
        }
    }
    (met / goal.len() as f64).min(1.0)
}

/// Numeric value of a target condition, including comparison strings like
/// `>=5`.
fn numeric_target(expected: &StateValue) -> Option<f64> {
    if let Some(v) = expected.as_f64() {
        return Some(v);
    }
    let text = expected.as_str()?;
    let stripped = text
        .strip_prefix(">=")
        .or_else(|| text.strip_prefix("<="))
        .or_else(|| text.strip_prefix('>'))
        .or_else(|| text.strip_prefix('<'))?;
    stripped.trim().parse().ok()
}
