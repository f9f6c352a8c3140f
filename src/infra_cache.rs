//! Per-city grid of what every improvement would be worth.

use std::collections::BTreeMap;

use tracing::debug;

use crate::simulate::{self, SimTarget};
use crate::valuation::{best_worker_tile_value, TileWeights};
use crate::world::{CityId, CityOffset, PlayerId, World, CITY_MAP_CELLS};

/// Tile value after each improvement; `None` where it does not apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImprovementValues {
    pub irrigate: Option<i32>,
    pub mine: Option<i32>,
    pub transform: Option<i32>,
    pub road: Option<i32>,
    pub railroad: Option<i32>,
    pub detox: Option<i32>,
    pub derad: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityInfrastructure {
    cells: [ImprovementValues; CITY_MAP_CELLS],
}

impl CityInfrastructure {
    fn empty() -> Self {
        Self {
            cells: [ImprovementValues::default(); CITY_MAP_CELLS],
        }
    }

    pub fn get(&self, offset: CityOffset) -> &ImprovementValues {
        &self.cells[offset.index()]
    }
}

/// Improvement grids for every city, rebuilt wholesale per player and
/// tagged with the map epoch they were computed at.
#[derive(Debug, Default)]
pub struct InfrastructureCache {
    cities: BTreeMap<CityId, CityInfrastructure>,
    epochs: BTreeMap<PlayerId, u64>,
}

impl InfrastructureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, world: &mut World, weights: &TileWeights, player: PlayerId) {
        self.cities.retain(|id, _| world.city(*id).is_some());

        let ids: Vec<CityId> = world.cities_of(player).map(|c| c.id).collect();
        for id in ids {
            let Some(best) = world.city(id).map(|c| best_worker_tile_value(world, weights, c)) else {
                continue;
            };
            let mut grid = CityInfrastructure::empty();
            for offset in CityOffset::work_radius() {
                let Some(pos) = world.city(id).map(|c| c.tile_pos(offset)) else {
                    continue;
                };
                let Some(before) = world.tile(pos).map(|t| (t.terrain, t.specials)) else {
                    continue;
                };
                let target = SimTarget { city: id, offset };
                let cell = &mut grid.cells[offset.index()];
                cell.detox = simulate::clean_pollution(world, weights, target, best);
                cell.derad = simulate::clean_fallout(world, weights, target, best);
                cell.mine = simulate::mine(world, weights, target);
                cell.irrigate = simulate::irrigate(world, weights, target);
                cell.transform = simulate::transform(world, weights, target);
                cell.road = simulate::road(world, weights, target);
                cell.railroad = simulate::railroad(world, weights, target);

                debug_assert_eq!(
                    world.tile(pos).map(|t| (t.terrain, t.specials)),
                    Some(before),
                    "simulation left {pos} modified"
                );
            }
            self.cities.insert(id, grid);
        }

        self.epochs.insert(player, world.epoch());
        debug!(player = %player, epoch = world.epoch(), "infrastructure cache rebuilt");
    }

    pub fn is_fresh(&self, player: PlayerId, epoch: u64) -> bool {
        self.epochs.get(&player) == Some(&epoch)
    }

    /// Rebuilds the player's grids when the map moved on since the last
    /// rebuild.
    pub fn ensure_fresh(&mut self, world: &mut World, weights: &TileWeights, player: PlayerId) {
        if !self.is_fresh(player, world.epoch()) {
            self.rebuild(world, weights, player);
        }
    }

    pub fn city(&self, id: CityId) -> Option<&CityInfrastructure> {
        self.cities.get(&id)
    }

    pub fn get(&self, city: CityId, offset: CityOffset) -> Option<&ImprovementValues> {
        self.cities.get(&city).map(|grid| grid.get(offset))
    }
}
