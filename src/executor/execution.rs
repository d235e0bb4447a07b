//! Plan execution: cooldown-aware dispatch, subgoal injection, selective
//! replanning.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::actions::{ActionError, ActionRegistry, ErrorKind, SubgoalRequest};
use crate::api::GameApi;
use crate::context::ActionContext;
use crate::goals::GoalManager;
use crate::planner::{Plan, PlanOutcome, Planner};
use crate::state::{apply_effects, matches, StateStore, StateValue, WorldState};

use super::{CancelToken, CooldownManager};

/// Terminal result of running one plan (subplans included).
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Every step ran; the goal's declared path completed
    Completed,
    /// A step failed in a way the manager does not handle locally
    Failed { action: String, error: ActionError },
    /// A budget ran out: steps, replans, or wall clock
    Exhausted { reason: String },
    /// The cancel signal was observed
    Cancelled,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed)
    }
}

/// Inner loop: runs one plan action-by-action against the live state.
///
/// Per step: wait out cooldowns, dispatch, interpret the result (advance,
/// inject a subplan, retry, or surface), and re-validate the remaining tail
/// against what actually happened — a discovery that invalidates a later
/// step triggers a bounded replan toward the original goal.
pub struct ExecutionManager {
    registry: Arc<ActionRegistry>,
    planner: Planner,
    cooldown: CooldownManager,
    cancel: CancelToken,
    max_replans: u32,
    max_transport_retries: u32,
    max_subgoal_depth: u32,
    wall_clock: Duration,
}

impl ExecutionManager {
    pub fn new(registry: Arc<ActionRegistry>, cancel: CancelToken) -> Self {
        Self {
            registry,
            planner: Planner::new(),
            cooldown: CooldownManager::new(),
            cancel,
            max_replans: 3,
            max_transport_retries: 2,
            max_subgoal_depth: 3,
            wall_clock: Duration::from_secs(600),
        }
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_cooldown(mut self, cooldown: CooldownManager) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_max_replans(mut self, max_replans: u32) -> Self {
        self.max_replans = max_replans;
        self
    }

    pub fn with_wall_clock(mut self, wall_clock: Duration) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Plan toward `goal` from `start` over the registered declarations.
    pub fn plan(&self, start: &WorldState, goal: &WorldState) -> PlanOutcome {
        let declarations = self.registry.declarations();
        let (outcome, stats) = self.planner.plan(start, goal, &declarations);
        debug!(nodes = stats.nodes_explored, "planner finished");
        outcome
    }

    /// Run a plan to completion. `step_budget` caps total dispatched
    /// actions, subplan steps included.
    pub async fn run_plan(
        &self,
        plan: Plan,
        goal: &WorldState,
        store: &StateStore,
        ctx: &ActionContext,
        api: &dyn GameApi,
        goals: &GoalManager,
        step_budget: usize,
    ) -> ExecutionOutcome {
        let deadline = Instant::now() + self.wall_clock;
        let mut steps_used = 0usize;
        self.run_inner(
            plan,
            goal.clone(),
            store,
            ctx,
            api,
            goals,
            0,
            &mut steps_used,
            step_budget,
            deadline,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    fn run_inner<'a>(
        &'a self,
        mut plan: Plan,
        goal: WorldState,
        store: &'a StateStore,
        ctx: &'a ActionContext,
        api: &'a dyn GameApi,
        goals: &'a GoalManager,
        depth: u32,
        steps_used: &'a mut usize,
        step_budget: usize,
        deadline: Instant,
    ) -> BoxFuture<'a, ExecutionOutcome> {
        async move {
            let mut index = 0usize;
            let mut replans = 0u32;
            let mut cooldown_retried = false;
            let mut transport_retries = 0u32;

            loop {
                if self.cancel.is_cancelled() {
                    return ExecutionOutcome::Cancelled;
                }
                if Instant::now() > deadline {
                    return ExecutionOutcome::Exhausted {
                        reason: "plan wall-clock bound exceeded".to_string(),
                    };
                }
                if index >= plan.steps.len() {
                    return ExecutionOutcome::Completed;
                }

                // Validate the remaining tail against the live state; a
                // mismatch means an earlier step's observed effects diverged
                // from its declaration.
                let snapshot = store.snapshot();
                if let Some(invalid) = self.first_invalid_step(&plan, index, &snapshot) {
                    if replans >= self.max_replans {
                        return ExecutionOutcome::Exhausted {
                            reason: format!(
                                "replan budget exhausted with step '{invalid}' unsatisfiable"
                            ),
                        };
                    }
                    replans += 1;
                    info!(invalid_step = %invalid, replans, "world diverged from plan, replanning tail");
                    match self.plan(&snapshot, &goal) {
                        PlanOutcome::Found(replacement) => {
                            plan = replacement;
                            index = 0;
                            continue;
                        }
                        PlanOutcome::NoPlan { reason } => {
                            return ExecutionOutcome::Exhausted {
                                reason: format!("replanning found no path: {reason}"),
                            };
                        }
                    }
                }

                let step = plan.steps[index].clone();

                // Cooldown gate; the synthesized wait step itself is exempt.
                if step.action != "wait" {
                    let character = ctx.character.get();
                    if CooldownManager::is_on_cooldown(&character) {
                        self.cooldown
                            .handle_cooldown_with_wait(api, &self.registry, ctx)
                            .await;
                        continue;
                    }
                }

                if *steps_used >= step_budget {
                    return ExecutionOutcome::Exhausted {
                        reason: format!("step budget of {step_budget} exhausted"),
                    };
                }
                *steps_used += 1;

                ctx.set_all(&step.parameters);
                let result = self.registry.execute(&step.action, api, ctx).await;

                if result.success {
                    // Declared effects overlaid by what the action actually
                    // observed; observation wins on conflict.
                    let mut effective = self
                        .registry
                        .lookup(&step.action)
                        .map(|d| d.reactions.clone())
                        .unwrap_or_default();
                    for (key, value) in &result.data {
                        effective.insert(key.clone(), value.clone());
                    }
                    store.merge(&effective);

                    index += 1;
                    cooldown_retried = false;
                    transport_retries = 0;

                    if let Some(request) = result.subgoal {
                        let outcome = self
                            .run_subgoal(
                                &request, store, ctx, api, goals, depth, steps_used, step_budget,
                                deadline,
                            )
                            .await;
                        if !outcome.is_success() {
                            return outcome;
                        }
                        ctx.preserve(&request.preserve_keys);
                    }
                    continue;
                }

                let error = result.error.unwrap_or_else(|| {
                    ActionError::new(ErrorKind::Invalid, "action failed without detail")
                });
                match error.kind {
                    ErrorKind::Cooldown => {
                        if cooldown_retried {
                            return ExecutionOutcome::Failed {
                                action: step.action.clone(),
                                error,
                            };
                        }
                        cooldown_retried = true;
                        self.cooldown
                            .handle_cooldown_with_wait(api, &self.registry, ctx)
                            .await;
                        // Retry the same step once after the wait.
                        continue;
                    }
                    ErrorKind::Transport => {
                        if transport_retries >= self.max_transport_retries {
                            return ExecutionOutcome::Failed {
                                action: step.action.clone(),
                                error,
                            };
                        }
                        let backoff =
                            Duration::from_millis(500 * 2u64.pow(transport_retries));
                        transport_retries += 1;
                        warn!(
                            action = %step.action,
                            attempt = transport_retries,
                            ?backoff,
                            "transport failure, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    ErrorKind::Precondition => {
                        // The world disagrees with the plan; replan from
                        // reality instead of failing the mission.
                        if replans >= self.max_replans {
                            return ExecutionOutcome::Failed {
                                action: step.action.clone(),
                                error,
                            };
                        }
                        replans += 1;
                        info!(action = %step.action, "runtime precondition failed, replanning");
                        match self.plan(&store.snapshot(), &goal) {
                            PlanOutcome::Found(replacement) => {
                                plan = replacement;
                                index = 0;
                            }
                            PlanOutcome::NoPlan { .. } => {
                                return ExecutionOutcome::Failed {
                                    action: step.action.clone(),
                                    error,
                                };
                            }
                        }
                        continue;
                    }
                    ErrorKind::Cancelled => return ExecutionOutcome::Cancelled,
                    ErrorKind::Invalid | ErrorKind::Exception => {
                        return ExecutionOutcome::Failed {
                            action: step.action.clone(),
                            error,
                        };
                    }
                }
            }
        }
        .boxed()
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_subgoal(
        &self,
        request: &SubgoalRequest,
        store: &StateStore,
        ctx: &ActionContext,
        api: &dyn GameApi,
        goals: &GoalManager,
        depth: u32,
        steps_used: &mut usize,
        step_budget: usize,
        deadline: Instant,
    ) -> ExecutionOutcome {
        if depth >= self.max_subgoal_depth {
            return ExecutionOutcome::Exhausted {
                reason: format!("subgoal depth limit reached at '{}'", request.goal_name),
            };
        }
        let Some(template) = goals.template(&request.goal_name) else {
            return ExecutionOutcome::Failed {
                action: request.goal_name.clone(),
                error: ActionError::new(
                    ErrorKind::Invalid,
                    format!("unknown subgoal '{}'", request.goal_name),
                ),
            };
        };
        let parameters: BTreeMap<String, StateValue> = request
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), StateValue::from(v.as_str())))
            .collect();
        let target = goals.generate_goal_state(template, &parameters);
        info!(subgoal = %request.goal_name, "suspending plan for subgoal");

        match self.plan(&store.snapshot(), &target) {
            PlanOutcome::Found(subplan) => {
                self.run_inner(
                    subplan,
                    target,
                    store,
                    ctx,
                    api,
                    goals,
                    depth + 1,
                    steps_used,
                    step_budget,
                    deadline,
                )
                .await
            }
            PlanOutcome::NoPlan { reason } => ExecutionOutcome::Failed {
                action: request.goal_name.clone(),
                error: ActionError::new(
                    ErrorKind::Invalid,
                    format!("no plan for subgoal '{}': {reason}", request.goal_name),
                ),
            },
        }
    }

    /// First remaining step whose preconditions fail when the tail is
    /// replayed over the live snapshot, if any.
    fn first_invalid_step(
        &self,
        plan: &Plan,
        from: usize,
        snapshot: &WorldState,
    ) -> Option<String> {
        let mut state = snapshot.clone();
        for step in &plan.steps[from..] {
            let Some(declaration) = self.registry.lookup(&step.action) else {
                return Some(step.action.clone());
            };
            if !matches(&state, &declaration.conditions) {
                return Some(step.action.clone());
            }
            state = apply_effects(&state, &declaration.reactions);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::test_support::FakeApi;
    use crate::actions::{ActionDeclaration, ActionHandler, ActionResult};
    use crate::api::{CharacterCache, CharacterData};
    use crate::knowledge::{KnowledgeBase, MapCache};
    use crate::planner::PlanStep;
    use crate::state::params;
    use async_trait::async_trait;
    use chrono::Utc;

    const TEST_GOALS: &str = r#"
goal_templates:
  get_healthy:
    description: "Recover to full fighting shape"
    target_state:
      character_status.healthy: true
"#;

    fn state(entries: &[(&str, StateValue)]) -> WorldState {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn declaration(
        name: &str,
        conditions: &[(&str, StateValue)],
        reactions: &[(&str, StateValue)],
    ) -> ActionDeclaration {
        ActionDeclaration {
            name: name.to_string(),
            conditions: state(conditions),
            reactions: state(reactions),
            weight: 1.0,
        }
    }

    /// Succeeds and reports the configured observations; optionally asks
    /// for a subgoal the first time it runs.
    struct Scripted {
        data: WorldState,
        subgoal: parking_lot::Mutex<Option<SubgoalRequest>>,
    }

    impl Scripted {
        fn new(data: &[(&str, StateValue)]) -> Self {
            Self {
                data: state(data),
                subgoal: parking_lot::Mutex::new(None),
            }
        }

        fn with_subgoal(self, goal_name: &str, preserve: &[&str]) -> Self {
            *self.subgoal.lock() = Some(SubgoalRequest {
                goal_name: goal_name.to_string(),
                parameters: BTreeMap::new(),
                preserve_keys: preserve.iter().map(|s| s.to_string()).collect(),
            });
            self
        }
    }

    #[async_trait]
    impl ActionHandler for Scripted {
        async fn execute(&self, _api: &dyn GameApi, _ctx: &ActionContext) -> ActionResult {
            let mut result = ActionResult::success();
            result.data = self.data.clone();
            result.subgoal = self.subgoal.lock().take();
            result
        }
    }

    struct Failing {
        kind: ErrorKind,
    }

    #[async_trait]
    impl ActionHandler for Failing {
        async fn execute(&self, _api: &dyn GameApi, _ctx: &ActionContext) -> ActionResult {
            ActionResult::failure(self.kind, "scripted failure")
        }
    }

    fn fixture(character: CharacterData) -> (ActionContext, FakeApi, StateStore, GoalManager) {
        let cache = CharacterCache::new(character.clone(), 3600);
        let ctx = ActionContext::new(
            Arc::new(KnowledgeBase::new()),
            Arc::new(MapCache::new()),
            Arc::new(cache),
        );
        let api = FakeApi::new(character);
        let store = StateStore::new();
        let goals = GoalManager::from_yaml(TEST_GOALS).unwrap();
        (ctx, api, store, goals)
    }

    fn healthy_character() -> CharacterData {
        CharacterData {
            name: "ember".to_string(),
            level: 2,
            hp: 100,
            max_hp: 100,
            ..Default::default()
        }
    }

    fn manager(registry: ActionRegistry) -> ExecutionManager {
        ExecutionManager::new(Arc::new(registry), CancelToken::new())
    }

    fn plan_of(names: &[&str]) -> Plan {
        Plan {
            steps: names.iter().map(|n| PlanStep::new(*n)).collect(),
            total_cost: names.len() as f64,
        }
    }

    #[tokio::test]
    async fn test_plan_runs_to_completion_and_merges_effects() {
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration(
                "probe",
                &[],
                &[("combat_context.status", StateValue::from("ready"))],
            ),
            Arc::new(Scripted::new(&[("target.x", StateValue::Int(4))])),
        );
        let (ctx, api, store, goals) = fixture(healthy_character());
        let em = manager(registry);

        let goal = state(&[("combat_context.status", StateValue::from("ready"))]);
        let outcome = em
            .run_plan(plan_of(&["probe"]), &goal, &store, &ctx, &api, &goals, 50)
            .await;
        assert!(outcome.is_success());
        // Declared reaction and observed data both landed.
        assert_eq!(
            store.get("combat_context.status"),
            Some(StateValue::from("ready"))
        );
        assert_eq!(store.get("target.x"), Some(StateValue::Int(4)));
    }

    #[tokio::test]
    async fn test_unhandled_failure_surfaces() {
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration("broken", &[], &[]),
            Arc::new(Failing {
                kind: ErrorKind::Invalid,
            }),
        );
        let (ctx, api, store, goals) = fixture(healthy_character());
        let em = manager(registry);

        let outcome = em
            .run_plan(
                plan_of(&["broken"]),
                &WorldState::new(),
                &store,
                &ctx,
                &api,
                &goals,
                50,
            )
            .await;
        let ExecutionOutcome::Failed { action, error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(action, "broken");
        assert_eq!(error.kind, ErrorKind::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_gate_waits_then_dispatches() {
        let mut character = healthy_character();
        character.cooldown_expiration = Some(Utc::now() + chrono::Duration::seconds(3));
        character.cooldown = 3;

        let mut registry = ActionRegistry::new();
        registry.register(
            declaration("probe", &[], &[("done", StateValue::Bool(true))]),
            Arc::new(Scripted::new(&[])),
        );
        registry.register(
            declaration("wait", &[], &[]),
            Arc::new(crate::actions::handlers::WaitHandler),
        );

        let (ctx, api, store, goals) = fixture(character);
        // The server-side character has no cooldown, so the post-wait
        // refresh clears the gate.
        api.character.lock().cooldown_expiration = None;
        api.character.lock().cooldown = 0;
        let em = manager(registry);

        let goal = state(&[("done", StateValue::Bool(true))]);
        let outcome = em
            .run_plan(plan_of(&["probe"]), &goal, &store, &ctx, &api, &goals, 50)
            .await;
        assert!(outcome.is_success());
        assert!(!CooldownManager::is_on_cooldown(&ctx.character.get()));
    }

    #[tokio::test]
    async fn test_subgoal_suspends_and_resumes() {
        // Outer plan: attack-like step that requests get_healthy, then a
        // final step that must still run afterwards.
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration("strike", &[], &[]),
            Arc::new(
                Scripted::new(&[("combat_context.status", StateValue::from("completed"))])
                    .with_subgoal("get_healthy", &[]),
            ),
        );
        registry.register(
            declaration(
                "rest",
                &[],
                &[("character_status.healthy", StateValue::Bool(true))],
            ),
            Arc::new(Scripted::new(&[
                ("character_status.hp", StateValue::Int(100)),
                ("character_status.max_hp", StateValue::Int(100)),
            ])),
        );
        registry.register(
            declaration("report", &[], &[("reported", StateValue::Bool(true))]),
            Arc::new(Scripted::new(&[])),
        );

        let (ctx, api, store, goals) = fixture(healthy_character());
        store.set(params::CHARACTER_HP, 10i64).unwrap();
        store.set(params::CHARACTER_MAX_HP, 100i64).unwrap();
        ctx.set(params::TARGET_X, 9i64);
        let em = manager(registry);

        let goal = state(&[("reported", StateValue::Bool(true))]);
        let outcome = em
            .run_plan(
                plan_of(&["strike", "report"]),
                &goal,
                &store,
                &ctx,
                &api,
                &goals,
                50,
            )
            .await;
        assert!(outcome.is_success(), "outcome: {outcome:?}");
        // Subplan ran: rest's observations landed and healthy recomputed.
        assert_eq!(
            store.get(params::CHARACTER_HEALTHY),
            Some(StateValue::Bool(true))
        );
        // The outer plan resumed and finished.
        assert_eq!(store.get("reported"), Some(StateValue::Bool(true)));
        // preserve_keys=[] dropped the scratch target.
        assert_eq!(ctx.get(params::TARGET_X), None);
    }

    #[tokio::test]
    async fn test_discovery_invalidating_tail_triggers_replan() {
        // find_resources declares target coordinates but *observes* that the
        // resource location became known, invalidating the later scan step
        // whose precondition requires it unknown.
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration(
                "find_resources",
                &[],
                &[("target.x", StateValue::Int(5))],
            ),
            Arc::new(Scripted::new(&[(
                "location_context.resource_known",
                StateValue::Bool(true),
            )])),
        );
        registry.register(
            declaration(
                "scan_map",
                &[("location_context.resource_known", StateValue::Bool(false))],
                &[("location_context.resource_known", StateValue::Bool(true))],
            ),
            Arc::new(Scripted::new(&[])),
        );
        registry.register(
            declaration(
                "gather",
                &[("location_context.resource_known", StateValue::Bool(true))],
                &[("materials.gathered", StateValue::from("+1"))],
            ),
            Arc::new(Scripted::new(&[])),
        );

        let (ctx, api, store, goals) = fixture(healthy_character());
        store
            .set("location_context.resource_known", false)
            .unwrap();
        store.set("materials.gathered", 0i64).unwrap();
        let em = manager(registry);

        let goal = state(&[
            ("target.x", StateValue::Int(5)),
            ("location_context.resource_known", StateValue::Bool(true)),
            ("materials.gathered", StateValue::from(">=1")),
        ]);
        let initial = em.plan(&store.snapshot(), &goal).into_plan().unwrap();
        assert_eq!(
            initial.action_names(),
            vec!["find_resources", "scan_map", "gather"]
        );

        let outcome = em
            .run_plan(initial, &goal, &store, &ctx, &api, &goals, 50)
            .await;
        assert!(outcome.is_success(), "outcome: {outcome:?}");
        // The replacement tail skipped scan_map entirely.
        assert_eq!(store.get("materials.gathered"), Some(StateValue::Int(1)));
        assert!(store.matches(&goal));
    }

    #[tokio::test]
    async fn test_step_budget_exhaustion() {
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration("probe", &[], &[]),
            Arc::new(Scripted::new(&[])),
        );
        let (ctx, api, store, goals) = fixture(healthy_character());
        let em = manager(registry);

        let outcome = em
            .run_plan(
                plan_of(&["probe", "probe", "probe"]),
                &WorldState::new(),
                &store,
                &ctx,
                &api,
                &goals,
                2,
            )
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_between_steps() {
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration("probe", &[], &[]),
            Arc::new(Scripted::new(&[])),
        );
        let (ctx, api, store, goals) = fixture(healthy_character());
        let cancel = CancelToken::new();
        cancel.cancel();
        let em = ExecutionManager::new(Arc::new(registry), cancel);

        let outcome = em
            .run_plan(
                plan_of(&["probe"]),
                &WorldState::new(),
                &store,
                &ctx,
                &api,
                &goals,
                50,
            )
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_precondition_failure_never_dispatches_unsatisfied_step() {
        // "guarded" requires a key that is never true; the manager must
        // replan (finding nothing) rather than dispatch it.
        let mut registry = ActionRegistry::new();
        registry.register(
            declaration(
                "guarded",
                &[("gate.open", StateValue::Bool(true))],
                &[("done", StateValue::Bool(true))],
            ),
            Arc::new(Scripted::new(&[])),
        );
        let (ctx, api, store, goals) = fixture(healthy_character());
        store.set("gate.open", false).unwrap();
        let em = manager(registry);

        let goal = state(&[("done", StateValue::Bool(true))]);
        let outcome = em
            .run_plan(plan_of(&["guarded"]), &goal, &store, &ctx, &api, &goals, 50)
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Exhausted { .. }));
        assert_eq!(store.get("done"), None);
    }
}
