//! "What if" valuation of every terrain improvement.
//!
//! Each simulator applies its change to the live tile inside a
//! [`TileGuard`], values the tile for the city, and lets the guard put the
//! tile back. `None` means the improvement does not apply here.

use std::ops::Deref;

use crate::technology::TechFlag;
use crate::terrain::{self, Specials, Terrain};
use crate::valuation::{city_tile_value, TileWeights, YieldNeed};
use crate::world::{CityId, CityOffset, MapPos, Tile, World};

/// Added to cleanup values before doubling them.
const CLEANUP_BONUS: i32 = 50;

/// Scoped speculative edit of one tile. The terrain and specials seen at
/// construction are written back when the guard drops.
pub struct TileGuard<'a> {
    world: &'a mut World,
    pos: MapPos,
    terrain: Terrain,
    specials: Specials,
}

impl<'a> TileGuard<'a> {
    pub fn new(world: &'a mut World, pos: MapPos) -> Option<Self> {
        let tile = world.tile(pos)?;
        let (terrain, specials) = (tile.terrain, tile.specials);
        Some(Self {
            world,
            pos,
            terrain,
            specials,
        })
    }

    pub fn edit(&mut self, change: impl FnOnce(&mut Tile)) {
        if let Some(tile) = self.world.tile_mut(self.pos) {
            change(tile);
        }
    }
}

impl Deref for TileGuard<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world
    }
}

impl Drop for TileGuard<'_> {
    fn drop(&mut self) {
        if let Some(tile) = self.world.tile_mut(self.pos) {
            tile.terrain = self.terrain;
            tile.specials = self.specials;
        }
    }
}

/// City-relative tile the simulators work on.
#[derive(Debug, Clone, Copy)]
pub struct SimTarget {
    pub city: CityId,
    pub offset: CityOffset,
}

struct Site {
    pos: MapPos,
    terrain: Terrain,
    specials: Specials,
    has_city: bool,
}

impl Site {
    fn read(world: &World, target: SimTarget) -> Option<Site> {
        let city = world.city(target.city)?;
        let pos = city.tile_pos(target.offset);
        let tile = world.tile(pos)?;
        Some(Site {
            pos,
            terrain: tile.terrain,
            specials: tile.specials,
            has_city: tile.city.is_some(),
        })
    }

    fn has(&self, special: Specials) -> bool {
        self.specials.contains(special)
    }

    /// A terrain change may not leave a city on terrain that bans cities.
    fn allows(&self, result: Terrain) -> bool {
        !self.has_city || result.allows_cities()
    }
}

fn owner_knows(world: &World, target: SimTarget, flag: TechFlag) -> bool {
    world
        .city(target.city)
        .and_then(|city| world.player(city.owner))
        .map_or(false, |player| player.knows(flag))
}

fn value_after(
    world: &mut World,
    weights: &TileWeights,
    target: SimTarget,
    pos: MapPos,
    change: impl FnOnce(&mut Tile),
) -> Option<i32> {
    let mut guard = TileGuard::new(world, pos)?;
    guard.edit(change);
    let world: &World = &guard;
    let city = world.city(target.city)?;
    Some(city_tile_value(world, weights, city, target.offset, YieldNeed::NONE))
}

pub fn irrigate(world: &mut World, weights: &TileWeights, target: SimTarget) -> Option<i32> {
    let site = Site::read(world, target)?;
    let result = terrain::rules(site.terrain).irrigation_result?;

    if result != site.terrain {
        if !site.allows(result) {
            return None;
        }
        return value_after(world, weights, target, site.pos, |tile| {
            tile.terrain = result;
            tile.specials.remove(Specials::MINE);
        });
    }

    if !world.has_water_source(site.pos) {
        return None;
    }
    if !site.has(Specials::IRRIGATION) {
        value_after(world, weights, target, site.pos, |tile| {
            tile.specials.remove(Specials::MINE);
            tile.specials.insert(Specials::IRRIGATION);
        })
    } else if !site.has(Specials::FARMLAND) && owner_knows(world, target, TechFlag::Farmland) {
        value_after(world, weights, target, site.pos, |tile| {
            tile.specials.insert(Specials::FARMLAND);
        })
    } else {
        None
    }
}

pub fn mine(world: &mut World, weights: &TileWeights, target: SimTarget) -> Option<i32> {
    let site = Site::read(world, target)?;
    let result = terrain::rules(site.terrain).mining_result?;

    if result != site.terrain {
        if !site.allows(result) {
            return None;
        }
        value_after(world, weights, target, site.pos, |tile| {
            tile.terrain = result;
            tile.specials.remove(Specials::IRRIGATION | Specials::FARMLAND);
        })
    } else if !site.has(Specials::MINE) {
        value_after(world, weights, target, site.pos, |tile| {
            tile.specials.remove(Specials::IRRIGATION | Specials::FARMLAND);
            tile.specials.insert(Specials::MINE);
        })
    } else {
        None
    }
}

pub fn transform(world: &mut World, weights: &TileWeights, target: SimTarget) -> Option<i32> {
    let site = Site::read(world, target)?;
    let result = terrain::rules(site.terrain).transform_result?;
    if result == site.terrain || !site.allows(result) {
        return None;
    }
    if site.terrain.is_ocean() && !result.is_ocean() && !world.can_reclaim_ocean(site.pos) {
        return None;
    }
    if !site.terrain.is_ocean() && result.is_ocean() && !world.can_channel_land(site.pos) {
        return None;
    }
    value_after(world, weights, target, site.pos, |tile| {
        tile.terrain = result;
        tile.specials = tile.specials.retained_on(result);
    })
}

pub fn road(world: &mut World, weights: &TileWeights, target: SimTarget) -> Option<i32> {
    let site = Site::read(world, target)?;
    if site.terrain.is_ocean() || site.has(Specials::ROAD) {
        return None;
    }
    if site.has(Specials::RIVER) && !owner_knows(world, target, TechFlag::BridgeBuilding) {
        return None;
    }
    value_after(world, weights, target, site.pos, |tile| {
        tile.specials.insert(Specials::ROAD);
    })
}

/// Values the tile with railroad; the road under it comes along.
pub fn railroad(world: &mut World, weights: &TileWeights, target: SimTarget) -> Option<i32> {
    let site = Site::read(world, target)?;
    if site.terrain.is_ocean()
        || site.has(Specials::RAILROAD)
        || !owner_knows(world, target, TechFlag::Railroad)
    {
        return None;
    }
    value_after(world, weights, target, site.pos, |tile| {
        tile.specials.insert(Specials::ROAD | Specials::RAILROAD);
    })
}

/// Value of the cleaned tile, boosted against the city's best tile so that
/// cleanup beats marginal improvements.
pub fn clean_pollution(
    world: &mut World,
    weights: &TileWeights,
    target: SimTarget,
    best: i32,
) -> Option<i32> {
    let site = Site::read(world, target)?;
    if !site.has(Specials::POLLUTION) {
        return None;
    }
    let value = value_after(world, weights, target, site.pos, |tile| {
        tile.specials.remove(Specials::POLLUTION);
    })?;
    Some((value + best + CLEANUP_BONUS) * 2)
}

/// Like [`clean_pollution`], but only AI players get the boost.
pub fn clean_fallout(
    world: &mut World,
    weights: &TileWeights,
    target: SimTarget,
    best: i32,
) -> Option<i32> {
    let site = Site::read(world, target)?;
    if !site.has(Specials::FALLOUT) {
        return None;
    }
    let ai = world
        .city(target.city)
        .and_then(|city| world.player(city.owner))
        .map_or(false, |player| player.ai_controlled);
    let value = value_after(world, weights, target, site.pos, |tile| {
        tile.specials.remove(Specials::FALLOUT);
    })?;
    if ai {
        Some((value + best + CLEANUP_BONUS) * 2)
    } else {
        Some(value)
    }
}
