use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::{
    rng::{RngManager, SystemRng},
    snapshot::SnapshotWriter,
    world::World,
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    /// Turns between JSON snapshots; 0 disables them.
    pub snapshot_interval_turns: u64,
    pub snapshot_dir: PathBuf,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_turns,
            ),
            settings: self.settings,
        }
    }
}

/// What one finished turn looked like from the outside.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub turn: u64,
    pub epoch: u64,
    pub cities: usize,
    pub units: usize,
    pub snapshot_path: Option<PathBuf>,
}

pub struct Engine {
    rng: RngManager,
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    pub fn run(&mut self, world: &mut World, turns: u64) -> Result<()> {
        self.run_with_hook(world, turns, |_| {})
    }

    /// Runs `turns` turns, handing each turn's summary to `hook`.
    pub fn run_with_hook(
        &mut self,
        world: &mut World,
        turns: u64,
        mut hook: impl FnMut(&TurnSummary),
    ) -> Result<()> {
        for _ in 0..turns {
            let summary = self.step(world)?;
            hook(&summary);
        }
        Ok(())
    }

    pub fn step(&mut self, world: &mut World) -> Result<TurnSummary> {
        let current_turn = world.turn();
        for system in &mut self.systems {
            let mut rng_stream = self.rng.stream(system.name());
            let ctx = SystemContext {
                turn: current_turn,
                scenario_name: &self.settings.scenario_name,
            };
            system.run(&ctx, world, &mut rng_stream)?;
        }
        world.advance_turn();
        let snapshot_path = self
            .snapshot_writer
            .maybe_write(world, &self.settings.scenario_name)?;

        let summary = TurnSummary {
            turn: world.turn(),
            epoch: world.epoch(),
            cities: world.cities().count(),
            units: world.units().count(),
            snapshot_path,
        };
        debug!(turn = summary.turn, epoch = summary.epoch, "turn complete");
        Ok(summary)
    }
}

pub struct SystemContext<'a> {
    pub turn: u64,
    pub scenario_name: &'a str,
}

pub trait System {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}
