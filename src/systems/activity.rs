use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    engine::{System, SystemContext},
    rng::SystemRng,
    terrain,
    world::{UnitId, World},
};

/// Advances terrain work and hands every unit its moves for the turn.
pub struct ActivitySystem;

impl ActivitySystem {
    pub fn new() -> Self {
        Self
    }

    /// Returns the units whose work finished this turn.
    pub fn progress(&mut self, world: &mut World) -> Vec<UnitId> {
        let mut finished = Vec::new();
        let ids: Vec<UnitId> = world.units().map(|u| u.id).collect();
        for id in ids {
            let Some(unit) = world.unit(id) else {
                continue;
            };
            if !unit.activity.is_terrain_work() {
                continue;
            }
            let Some(needed) = world
                .tile(unit.pos)
                .map(|t| terrain::rules(t.terrain).activity_time(unit.activity))
            else {
                continue;
            };
            let work_rate = unit.unit_type().work_rate;

            let Some(unit) = world.unit_mut(id) else {
                continue;
            };
            unit.activity_progress += work_rate;
            if unit.activity_progress < needed {
                continue;
            }
            let activity = unit.activity;
            match world.complete_activity(id) {
                Ok(()) => {
                    debug!(unit = %id, %activity, "terrain work finished");
                    finished.push(id);
                }
                Err(err) => warn!(unit = %id, error = %err, "terrain work lost"),
            }
        }

        for unit in world.units_mut() {
            unit.moves_left = unit.unit_type().move_rate;
        }
        finished
    }
}

impl Default for ActivitySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ActivitySystem {
    fn name(&self) -> &str {
        "activity"
    }

    fn run(&mut self, _ctx: &SystemContext, world: &mut World, _rng: &mut SystemRng<'_>) -> Result<()> {
        self.progress(world);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::Specials;
    use crate::units::{Activity, UnitKind};
    use crate::world::{GameRules, MapPos};

    #[test]
    fn road_finishes_after_its_build_time() {
        let mut world = World::from_rows(&["ggg"], GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let pos = MapPos::new(1, 0);
        let unit = world.add_unit(owner, UnitKind::Settlers, pos).unwrap();
        world.set_activity(unit, Activity::Road).unwrap();
        let epoch = world.epoch();

        let mut system = ActivitySystem::new();
        assert!(system.progress(&mut world).is_empty());
        assert!(!world.tile(pos).unwrap().has(Specials::ROAD));

        assert_eq!(system.progress(&mut world), vec![unit]);
        assert!(world.tile(pos).unwrap().has(Specials::ROAD));
        assert_eq!(world.unit(unit).unwrap().activity, Activity::Idle);
        assert!(world.epoch() > epoch);
    }

    #[test]
    fn moves_are_restored() {
        let mut world = World::from_rows(&["ggg"], GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let unit = world.add_unit(owner, UnitKind::Engineers, MapPos::new(0, 0)).unwrap();
        world.move_unit(unit, MapPos::new(1, 0), 6).unwrap();
        assert_eq!(world.unit(unit).unwrap().moves_left, 0);

        ActivitySystem::new().progress(&mut world);
        assert_eq!(world.unit(unit).unwrap().moves_left, 6);
    }

    #[test]
    fn work_on_a_changed_tile_is_dropped() {
        let mut world = World::from_rows(&["gog"], GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let pos = MapPos::new(0, 0);
        let unit = world.add_unit(owner, UnitKind::Settlers, pos).unwrap();
        world.set_activity(unit, Activity::Irrigate).unwrap();
        world.unit_mut(unit).unwrap().activity_progress = 4;
        world.add_special(pos, Specials::IRRIGATION).unwrap();

        assert!(ActivitySystem::new().progress(&mut world).is_empty());
        assert_eq!(world.unit(unit).unwrap().activity, Activity::Idle);
    }
}
