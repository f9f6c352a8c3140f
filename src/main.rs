use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use autosettlers::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
    systems::{ActivitySystem, AutoSettlerSystem},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Automated settlers and workers runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/two_rivers.yaml")]
    scenario: PathBuf,

    /// Override turn count (uses scenario default when omitted)
    #[arg(long)]
    turns: Option<u64>,

    /// Override snapshot interval in turns
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `autosettlers::decision=debug`
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| scenario.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut world = scenario.build_world()?;
    let turns = scenario.turns(cli.turns);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_turns);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        snapshot_interval_turns: snapshot_interval,
        snapshot_dir,
    };

    let mut engine = EngineBuilder::new(settings)
        .with_system(ActivitySystem::new())
        .with_system(AutoSettlerSystem::new(scenario.ai.clone()))
        .build();

    engine.run_with_hook(&mut world, turns, |summary| {
        if let Some(path) = &summary.snapshot_path {
            info!(turn = summary.turn, path = %path.display(), "snapshot written");
        }
    })?;

    let snapshot = world.snapshot(&scenario.name);
    println!(
        "Scenario '{}' completed for {} turns: {} cities, {} units, {} roads, {} irrigated tiles",
        scenario.name,
        turns,
        snapshot.cities.len(),
        snapshot.units.len(),
        snapshot.improvements.roads,
        snapshot.improvements.irrigated
    );
    Ok(())
}
