use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::{
    config::{AiConfig, LoggingConfig},
    technology,
    terrain::Specials,
    units::{Activity, UnitKind},
    world::{Climate, GameRules, MapPos, PlayerId, TaxRates, World},
};

fn default_snapshot_interval_turns() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_city_size() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default)]
    pub turns: Option<u64>,
    #[serde(default = "default_snapshot_interval_turns")]
    pub snapshot_interval_turns: u64,
    /// One string per map row, one terrain symbol per tile.
    pub map: Vec<String>,
    #[serde(default)]
    pub rules: GameRules,
    #[serde(default)]
    pub climate: Climate,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub specials: Vec<ScenarioSpecials>,
    pub players: Vec<ScenarioPlayer>,
    #[serde(default)]
    pub cities: Vec<ScenarioCity>,
    #[serde(default)]
    pub units: Vec<ScenarioUnit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSpecials {
    pub x: i32,
    pub y: i32,
    /// Lower-case special names, e.g. `road` or `irrigation`.
    pub add: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioPlayer {
    pub name: String,
    #[serde(default = "default_true")]
    pub ai: bool,
    /// Granted technologies; prerequisites are added automatically.
    #[serde(default)]
    pub techs: Vec<String>,
    /// Names of players this one is allied with.
    #[serde(default)]
    pub allies: Vec<String>,
    #[serde(default)]
    pub rates: Option<TaxRates>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioCity {
    pub owner: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    #[serde(default = "default_city_size")]
    pub size: i32,
    #[serde(default)]
    pub granary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioUnit {
    pub owner: String,
    pub kind: UnitKind,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub activity: Activity,
    /// Set for units steered by hand even though the owner is automated.
    #[serde(default)]
    pub has_orders: bool,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn build_world(&self) -> Result<World> {
        let mut world = World::from_rows(&self.map, self.rules.clone())
            .with_context(|| format!("scenario {} has a malformed map", self.name))?;
        world.set_climate(self.climate);

        for entry in &self.specials {
            let pos = MapPos::new(entry.x, entry.y);
            for name in &entry.add {
                let special = Specials::from_name(&name.to_ascii_uppercase())
                    .ok_or_else(|| anyhow!("unknown special '{name}' at {pos}"))?;
                world.add_special(pos, special)?;
            }
        }

        for player in &self.players {
            let id = world.add_player(player.name.as_str(), player.ai)?;
            let techs = technology::with_prerequisites(player.techs.iter().map(String::as_str))
                .map_err(|id| anyhow!("player {} lists unknown tech '{id}'", player.name))?;
            if let Some(p) = world.player_mut(id) {
                p.techs = techs;
                if let Some(rates) = player.rates {
                    p.rates = rates;
                }
            }
        }
        for player in &self.players {
            let id = self.player_id(&world, &player.name)?;
            for ally in &player.allies {
                let other = self.player_id(&world, ally)?;
                world.set_allied(id, other, true)?;
            }
        }

        for city in &self.cities {
            let owner = self.player_id(&world, &city.owner)?;
            let pos = MapPos::new(city.x, city.y);
            let id = world
                .add_city(owner, city.name.as_str(), pos, city.size)
                .with_context(|| format!("cannot place city {}", city.name))?;
            if let Some(c) = world.city_mut(id) {
                c.has_granary = city.granary;
            }
        }
        let city_ids: Vec<_> = world.cities().map(|c| c.id).collect();
        for id in city_ids {
            world.arrange_workers(id);
        }

        for unit in &self.units {
            let owner = self.player_id(&world, &unit.owner)?;
            let id = world.add_unit(owner, unit.kind, MapPos::new(unit.x, unit.y))?;
            if unit.activity != Activity::Idle {
                world
                    .set_activity(id, unit.activity)
                    .with_context(|| format!("unit {id} cannot start {}", unit.activity))?;
            }
            if let Some(u) = world.unit_mut(id) {
                u.has_orders = unit.has_orders;
            }
        }
        Ok(world)
    }

    pub fn turns(&self, override_turns: Option<u64>) -> u64 {
        override_turns.or(self.turns).unwrap_or(50)
    }

    fn player_id(&self, world: &World, name: &str) -> Result<PlayerId> {
        let Some(player) = world.players().iter().find(|p| p.name == name) else {
            bail!("scenario {} refers to unknown player '{name}'", self.name);
        };
        Ok(player.id)
    }
}
