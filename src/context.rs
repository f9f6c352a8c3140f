use crate::config::AiConfig;
use crate::territory::{EnemyMasks, TerritoryMap};
use crate::valuation::TileWeights;
use crate::world::World;

/// Per-session state shared by every settler decision in a turn.
///
/// Territory and hostility are written once at the start of the turn and
/// only read afterwards.
#[derive(Debug)]
pub struct SettlerContext {
    pub config: AiConfig,
    pub weights: TileWeights,
    pub territory: TerritoryMap,
    pub enemies: EnemyMasks,
}

impl SettlerContext {
    pub fn new(config: AiConfig, world: &World) -> Self {
        let weights = TileWeights::new(&config, world.rules());
        let mut territory = TerritoryMap::new();
        territory.resize(world.width(), world.height());
        Self {
            config,
            weights,
            territory,
            enemies: EnemyMasks::new(),
        }
    }

    /// Follows the world's dimensions and rules when they change between
    /// sessions.
    pub fn sync_with(&mut self, world: &World) {
        self.territory.resize(world.width(), world.height());
        if self.weights.foodbox() != world.rules().foodbox {
            self.weights = TileWeights::new(&self.config, world.rules());
        }
    }

    /// Rebuilds territory claims and hostility masks from the world as it
    /// stands.
    pub fn refresh(&mut self, world: &World) {
        self.sync_with(world);
        self.territory
            .rebuild_territory(world, self.config.city_territory_radius);
        self.enemies.rebuild_hostility(world);
    }
}
