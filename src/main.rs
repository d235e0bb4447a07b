//! Wayfarer CLI: drive one character toward a target level.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wayfarer::actions::handlers::standard_registry;
use wayfarer::api::{CharacterCache, GameApi, HttpGameClient};
use wayfarer::config;
use wayfarer::context::ActionContext;
use wayfarer::executor::{
    CancelToken, CooldownManager, ExecutionManager, MissionExecutor, MissionParameters,
};
use wayfarer::goals::GoalManager;
use wayfarer::knowledge::{KnowledgeBase, MapCache};
use wayfarer::planner::Planner;
use wayfarer::state::StateStore;

#[derive(Parser, Debug)]
#[command(
    name = "wayfarer",
    about = "Goal-driven autonomous agent for HTTP-API multiplayer games",
    version
)]
struct Cli {
    /// Name of the character to drive
    #[arg(long, env = "WAYFARER_CHARACTER")]
    character: String,

    /// Mission objective: character level to reach
    #[arg(long, default_value_t = 2)]
    target_level: i64,

    /// Directory holding goal_templates.yaml and actions.yaml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Directory for world/knowledge/map snapshots
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Game API base URL
    #[arg(
        long,
        env = "WAYFARER_API_URL",
        default_value = "https://api.artifactsmmo.com"
    )]
    base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wayfarer=info")),
        )
        .init();

    let cli = Cli::parse();
    let token = config::required_env("WAYFARER_API_TOKEN")
        .context("set WAYFARER_API_TOKEN to your game API token")?;
    std::fs::create_dir_all(&cli.data_dir)?;

    let goals = GoalManager::load(cli.config_dir.join("goal_templates.yaml"))?;
    let thresholds = goals.thresholds().clone();

    let api: Arc<dyn GameApi> = Arc::new(HttpGameClient::new(&cli.base_url, token));
    let character = api
        .get_character(&cli.character)
        .await
        .with_context(|| format!("character '{}' not reachable", cli.character))?;
    info!(
        name = %character.name,
        level = character.level,
        hp = character.hp,
        "character loaded"
    );

    let store = Arc::new(StateStore::with_thresholds(
        thresholds.hp_safe_percentage,
        thresholds.hp_healthy_percentage,
    ));
    store.load(&cli.data_dir.join("world.yaml"))?;

    let knowledge = Arc::new(KnowledgeBase::with_path(
        cli.data_dir.join("knowledge.yaml"),
    )?);
    let map = Arc::new(
        MapCache::with_path(cli.data_dir.join("map.yaml"))?
            .with_cache_duration(thresholds.map_cache_duration_secs),
    );
    let cache = Arc::new(CharacterCache::new(
        character,
        thresholds.cooldown_refresh_cache_duration as i64,
    ));
    let ctx = Arc::new(ActionContext::new(knowledge, map, cache));

    let declarations = config::load_actions(&cli.config_dir.join("actions.yaml"))?;
    let registry = Arc::new(standard_registry(declarations)?);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling mission");
                cancel.cancel();
            }
        });
    }

    let execution = ExecutionManager::new(registry, cancel.clone())
        .with_planner(Planner::new().with_node_budget(thresholds.planner_node_budget))
        .with_cooldown(CooldownManager::with_limits(
            0.5,
            65.0,
            thresholds.cooldown_refresh_cache_duration,
        ));

    let mut mission = MissionExecutor::new(api, store, ctx, goals, execution, cancel)
        .with_data_dir(&cli.data_dir);

    let success = mission
        .execute_progression_mission(&MissionParameters::reach_level(cli.target_level))
        .await;

    if success {
        info!(target_level = cli.target_level, "mission accomplished");
        Ok(())
    } else {
        anyhow::bail!("mission did not reach level {}", cli.target_level)
    }
}
