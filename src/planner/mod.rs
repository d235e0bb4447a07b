//! # GOAP Planner
//!
//! Forward best-first (A*) search over world states. Given a start state, a
//! goal partial state, and the registered action declarations, it produces
//! the cheapest ordered action sequence whose declared effects satisfy the
//! goal — or a reason why none exists.
//!
//! The planner is pure and total: it works on value snapshots, never touches
//! the live state, and never fails — an unsolvable goal comes back as
//! [`PlanOutcome::NoPlan`] with the unsatisfied keys summarized.
//!
//! Tie-breaks are fixed (lower accumulated weight, then fewer steps, then
//! lexicographic action name, then insertion order) so identical inputs
//! always yield the identical plan.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actions::ActionDeclaration;
use crate::state::{apply_effects, matches, WorldState};

/// Default cap on explored nodes before the search gives up.
pub const DEFAULT_NODE_BUDGET: usize = 500;

/// One step of a plan: an action name plus optional per-step parameter
/// overrides the execution layer writes into the context before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    #[serde(default)]
    pub parameters: WorldState,
}

impl PlanStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: WorldState::new(),
        }
    }
}

/// Ordered action sequence satisfying a goal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub total_cost: f64,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.action.as_str()).collect()
    }
}

/// Search result. An already-satisfied goal is `Found` with an empty plan.
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Found(Plan),
    NoPlan { reason: String },
}

impl PlanOutcome {
    pub fn into_plan(self) -> Option<Plan> {
        match self {
            PlanOutcome::Found(plan) => Some(plan),
            PlanOutcome::NoPlan { .. } => None,
        }
    }
}

/// Search statistics from the most recent call, for logs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub nodes_explored: usize,
    pub plan_length: usize,
    pub total_cost: f64,
}

struct Node {
    state: WorldState,
    /// Index of the parent node in the arena; the root has none.
    parent: Option<usize>,
    action: Option<String>,
    g: f64,
}

/// Frontier entry. Carries the action path so equal-cost candidates compare
/// by the earliest differing action name.
struct Open {
    node: usize,
    f: f64,
    g: f64,
    path: Vec<String>,
    seq: usize,
}

impl PartialEq for Open {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Open {}

impl PartialOrd for Open {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Open {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior. The tie-break chain — lower cost,
        // fewer steps, lexicographic action path, insertion order — is part
        // of the planner's determinism contract.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| other.path.len().cmp(&self.path.len()))
            .then_with(|| other.path.cmp(&self.path))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Forward A* planner over declarative action contracts.
pub struct Planner {
    node_budget: usize,
}

impl Planner {
    pub fn new() -> Self {
        Self {
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }

    pub fn with_node_budget(mut self, node_budget: usize) -> Self {
        self.node_budget = node_budget;
        self
    }

    /// Search for a least-cost plan from `start` to `goal`.
    pub fn plan(
        &self,
        start: &WorldState,
        goal: &WorldState,
        actions: &[ActionDeclaration],
    ) -> (PlanOutcome, SearchStats) {
        let mut stats = SearchStats::default();

        if matches(start, goal) {
            return (PlanOutcome::Found(Plan::default()), stats);
        }
        if actions.is_empty() {
            return (
                PlanOutcome::NoPlan {
                    reason: "no actions registered".to_string(),
                },
                stats,
            );
        }

        // Canonical expansion order regardless of registry iteration.
        let mut actions: Vec<&ActionDeclaration> = actions.iter().collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));

        let mut arena: Vec<Node> = vec![Node {
            state: start.clone(),
            parent: None,
            action: None,
            g: 0.0,
        }];
        let mut frontier = BinaryHeap::new();
        let mut closed: HashSet<String> = HashSet::new();
        let mut seq = 0usize;

        frontier.push(Open {
            node: 0,
            f: heuristic(start, goal),
            g: 0.0,
            path: Vec::new(),
            seq,
        });

        while let Some(open) = frontier.pop() {
            stats.nodes_explored += 1;
            if stats.nodes_explored > self.node_budget {
                return (
                    PlanOutcome::NoPlan {
                        reason: format!(
                            "node budget of {} exhausted; unsatisfied: {}",
                            self.node_budget,
                            unsatisfied_keys(start, goal).join(", ")
                        ),
                    },
                    stats,
                );
            }

            let current_state = arena[open.node].state.clone();
            if matches(&current_state, goal) {
                let plan = reconstruct(&arena, open.node);
                stats.plan_length = plan.len();
                stats.total_cost = plan.total_cost;
                debug!(
                    steps = ?plan.action_names(),
                    cost = plan.total_cost,
                    nodes = stats.nodes_explored,
                    "plan found"
                );
                return (PlanOutcome::Found(plan), stats);
            }

            let key = state_key(&current_state);
            if !closed.insert(key) {
                continue;
            }

            for action in &actions {
                if !matches(&current_state, &action.conditions) {
                    continue;
                }
                let child_state = apply_effects(&current_state, &action.reactions);
                if closed.contains(&state_key(&child_state)) {
                    continue;
                }
                let g = arena[open.node].g + action.weight;
                let f = g + heuristic(&child_state, goal);
                let mut path = open.path.clone();
                path.push(action.name.clone());
                arena.push(Node {
                    state: child_state,
                    parent: Some(open.node),
                    action: Some(action.name.clone()),
                    g,
                });
                seq += 1;
                frontier.push(Open {
                    node: arena.len() - 1,
                    f,
                    g,
                    path,
                    seq,
                });
            }
        }

        (
            PlanOutcome::NoPlan {
                reason: format!(
                    "goal unreachable; unsatisfied: {}",
                    unsatisfied_keys(start, goal).join(", ")
                ),
            },
            stats,
        )
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// Count of goal conditions the state does not meet.
fn heuristic(state: &WorldState, goal: &WorldState) -> f64 {
    goal.iter()
        .filter(|(key, expected)| {
            !crate::state::condition_met(expected, state.get(key.as_str()))
        })
        .count() as f64
}

fn unsatisfied_keys(state: &WorldState, goal: &WorldState) -> Vec<String> {
    goal.iter()
        .filter(|(key, expected)| {
            !crate::state::condition_met(expected, state.get(key.as_str()))
        })
        .map(|(key, _)| key.clone())
        .collect()
}

/// Canonical dedupe key; the state map is ordered, so the debug rendering
/// is stable.
fn state_key(state: &WorldState) -> String {
    format!("{state:?}")
}

fn reconstruct(arena: &[Node], mut index: usize) -> Plan {
    let total_cost = arena[index].g;
    let mut steps = Vec::new();
    loop {
        let node = &arena[index];
        let Some(action) = &node.action else { break };
        steps.push(PlanStep::new(action.clone()));
        match node.parent {
            Some(parent) => index = parent,
            None => break,
        }
    }
    steps.reverse();
    Plan { steps, total_cost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateValue;

    fn state(entries: &[(&str, StateValue)]) -> WorldState {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn action(
        name: &str,
        weight: f64,
        conditions: &[(&str, StateValue)],
        reactions: &[(&str, StateValue)],
    ) -> ActionDeclaration {
        ActionDeclaration {
            name: name.to_string(),
            conditions: state(conditions),
            reactions: state(reactions),
            weight,
        }
    }

    /// The hunt chain: find a monster, walk to it, fight it.
    fn hunt_actions() -> Vec<ActionDeclaration> {
        vec![
            action(
                "find_monsters",
                2.0,
                &[("combat_context.status", StateValue::from("idle"))],
                &[
                    ("combat_context.status", StateValue::from("ready")),
                    ("target.x", StateValue::Int(0)),
                    ("target.y", StateValue::Int(0)),
                ],
            ),
            action(
                "move",
                1.0,
                &[("character_status.cooldown_active", StateValue::Bool(false))],
                &[("location_context.at_target", StateValue::Bool(true))],
            ),
            action(
                "attack",
                3.0,
                &[
                    ("combat_context.status", StateValue::from("ready")),
                    ("location_context.at_target", StateValue::Bool(true)),
                ],
                &[
                    ("combat_context.status", StateValue::from("completed")),
                    ("goal_progress.monsters_hunted", StateValue::from("+1")),
                ],
            ),
        ]
    }

    fn hunt_start() -> WorldState {
        state(&[
            ("character_status.alive", StateValue::Bool(true)),
            ("character_status.level", StateValue::Int(1)),
            ("character_status.cooldown_active", StateValue::Bool(false)),
            ("combat_context.status", StateValue::from("idle")),
            ("goal_progress.monsters_hunted", StateValue::Int(0)),
        ])
    }

    #[test]
    fn test_hunt_chain_plans_in_order() {
        let goal = state(&[("goal_progress.monsters_hunted", StateValue::from(">=1"))]);
        let (outcome, _) = Planner::new().plan(&hunt_start(), &goal, &hunt_actions());
        let plan = outcome.into_plan().unwrap();
        assert_eq!(plan.action_names(), vec!["find_monsters", "move", "attack"]);
    }

    #[test]
    fn test_satisfied_goal_returns_empty_plan() {
        let start = state(&[("combat_context.status", StateValue::from("completed"))]);
        let goal = state(&[("combat_context.status", StateValue::from("completed"))]);
        let (outcome, stats) = Planner::new().plan(&start, &goal, &hunt_actions());
        let plan = outcome.into_plan().unwrap();
        assert!(plan.is_empty());
        assert_eq!(stats.nodes_explored, 0);
    }

    #[test]
    fn test_declared_effects_replay_to_goal() {
        let start = hunt_start();
        let goal = state(&[("goal_progress.monsters_hunted", StateValue::from(">=1"))]);
        let actions = hunt_actions();
        let (outcome, _) = Planner::new().plan(&start, &goal, &actions);
        let plan = outcome.into_plan().unwrap();

        let mut replayed = start;
        for step in &plan.steps {
            let declaration = actions.iter().find(|a| a.name == step.action).unwrap();
            assert!(
                matches(&replayed, &declaration.conditions),
                "step '{}' scheduled with unmet preconditions",
                step.action
            );
            replayed = apply_effects(&replayed, &declaration.reactions);
        }
        assert!(matches(&replayed, &goal));
    }

    #[test]
    fn test_empty_registry_yields_no_plan() {
        let goal = state(&[("combat_context.status", StateValue::from("ready"))]);
        let (outcome, _) = Planner::new().plan(&WorldState::new(), &goal, &[]);
        assert!(matches!(outcome, PlanOutcome::NoPlan { .. }));
    }

    #[test]
    fn test_unsatisfiable_goal_stays_within_budget() {
        let goal = state(&[("nonexistent.key", StateValue::Bool(true))]);
        let planner = Planner::new().with_node_budget(50);
        let (outcome, stats) = planner.plan(&hunt_start(), &goal, &hunt_actions());
        let PlanOutcome::NoPlan { reason } = outcome else {
            panic!("expected no plan");
        };
        assert!(reason.contains("nonexistent.key"));
        assert!(stats.nodes_explored <= 51);
    }

    #[test]
    fn test_cheaper_path_wins() {
        let start = state(&[("a", StateValue::Bool(false))]);
        let goal = state(&[("a", StateValue::Bool(true))]);
        let actions = vec![
            action("expensive", 5.0, &[], &[("a", StateValue::Bool(true))]),
            action("cheap", 1.0, &[], &[("a", StateValue::Bool(true))]),
        ];
        let (outcome, _) = Planner::new().plan(&start, &goal, &actions);
        assert_eq!(outcome.into_plan().unwrap().action_names(), vec!["cheap"]);
    }

    #[test]
    fn test_equal_cost_breaks_ties_lexicographically() {
        let start = WorldState::new();
        let goal = state(&[("a", StateValue::Bool(true))]);
        let actions = vec![
            action("zeta", 1.0, &[], &[("a", StateValue::Bool(true))]),
            action("alpha", 1.0, &[], &[("a", StateValue::Bool(true))]),
        ];
        let (outcome, _) = Planner::new().plan(&start, &goal, &actions);
        assert_eq!(outcome.into_plan().unwrap().action_names(), vec!["alpha"]);
    }

    #[test]
    fn test_planning_is_deterministic() {
        let goal = state(&[("goal_progress.monsters_hunted", StateValue::from(">=1"))]);
        let first = Planner::new()
            .plan(&hunt_start(), &goal, &hunt_actions())
            .0
            .into_plan()
            .unwrap();
        for _ in 0..5 {
            let again = Planner::new()
                .plan(&hunt_start(), &goal, &hunt_actions())
                .0
                .into_plan()
                .unwrap();
            assert_eq!(again.action_names(), first.action_names());
            assert_eq!(again.total_cost, first.total_cost);
        }
    }

    #[test]
    fn test_numeric_comparison_goal_uses_increment_effects() {
        let start = state(&[("character_status.level", StateValue::Int(1))]);
        let goal = state(&[("character_status.level", StateValue::from(">=3"))]);
        let actions = vec![action(
            "gain_level",
            1.0,
            &[],
            &[("character_status.level", StateValue::from("+1"))],
        )];
        let (outcome, _) = Planner::new().plan(&start, &goal, &actions);
        let plan = outcome.into_plan().unwrap();
        assert_eq!(plan.len(), 2);
    }
}
