use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::world::World;

/// Writes pretty JSON world summaries every `interval` turns.
pub struct SnapshotWriter {
    interval: u64,
    output_dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(output_dir: &Path, interval: u64) -> Self {
        Self {
            interval,
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn maybe_write(&self, world: &World, scenario_name: &str) -> Result<Option<PathBuf>> {
        if self.interval == 0 || world.turn() % self.interval != 0 {
            return Ok(None);
        }

        let dir = self.output_dir.join(scenario_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        let file_path = dir.join(format!("turn_{:06}.json", world.turn()));
        let json = serde_json::to_string_pretty(&world.snapshot(scenario_name))
            .context("failed to serialize world snapshot")?;
        fs::write(&file_path, json)
            .with_context(|| format!("failed to write {}", file_path.display()))?;
        Ok(Some(file_path))
    }
}
