//! What an automated settler is doing across turns, and the per-turn step
//! that advances it.

use std::fmt;

use tracing::{debug, warn};

use crate::collab::{CitySiteScorer, GotoOutcome, Pathfinder, TileReservations};
use crate::context::SettlerContext;
use crate::decision::{evaluate_improvements, ImprovementPlan, Surveyor};
use crate::error::WorldError;
use crate::infra_cache::InfrastructureCache;
use crate::territory::PlayerSet;
use crate::units::Activity;
use crate::world::{CityId, MapPos, UnitId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitRole {
    #[default]
    None,
    BuildCity {
        target: MapPos,
    },
    AutoImprove {
        target: Option<MapPos>,
        activity: Activity,
    },
}

impl fmt::Display for UnitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitRole::None => write!(f, "none"),
            UnitRole::BuildCity { target } => write!(f, "build_city@{target}"),
            UnitRole::AutoImprove {
                target: Some(target),
                activity,
            } => write!(f, "auto_improve:{activity}@{target}"),
            UnitRole::AutoImprove { target: None, .. } => write!(f, "auto_improve"),
        }
    }
}

/// Whether the dispatcher should run the unit once more this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Done,
    Reenter,
}

/// What happened to one unit during its dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub steps: u8,
    pub founded: Option<CityId>,
    pub founding_failed: bool,
    pub started: Option<Activity>,
}

/// Borrows everything a settler step touches for the length of one
/// player's pass.
pub struct SettlerDispatcher<'a> {
    world: &'a mut World,
    ctx: &'a SettlerContext,
    cache: &'a mut InfrastructureCache,
    pathfinder: &'a mut dyn Pathfinder,
    sites: &'a dyn CitySiteScorer,
    reservations: &'a mut dyn TileReservations,
}

impl<'a> SettlerDispatcher<'a> {
    pub fn new(
        world: &'a mut World,
        ctx: &'a SettlerContext,
        cache: &'a mut InfrastructureCache,
        pathfinder: &'a mut dyn Pathfinder,
        sites: &'a dyn CitySiteScorer,
        reservations: &'a mut dyn TileReservations,
    ) -> Self {
        Self {
            world,
            ctx,
            cache,
            pathfinder,
            sites,
            reservations,
        }
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    /// Runs one step and, if it asks for it, exactly one more.
    pub fn dispatch(&mut self, unit: UnitId) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if self.step(unit, &mut outcome) == Flow::Reenter {
            let _ = self.step(unit, &mut outcome);
        }
        outcome
    }

    pub fn step(&mut self, id: UnitId, outcome: &mut DispatchOutcome) -> Flow {
        outcome.steps += 1;
        let Some(role) = self.world.unit(id).map(|u| u.role) else {
            return Flow::Done;
        };

        if let UnitRole::BuildCity { target } = role {
            if !self.world.city_can_be_built_here(target) {
                debug!(unit = %id, %target, "city founding mission failed");
                self.set_role(id, UnitRole::None);
                return Flow::Done;
            }
            if self.pathfinder.goto(self.world, id, target) == GotoOutcome::Died {
                self.reservations.release(id);
                return Flow::Done;
            }
            let Some((pos, moves_left)) = self.world.unit(id).map(|u| (u.pos, u.moves_left)) else {
                return Flow::Done;
            };
            if moves_left <= 0 {
                return Flow::Done;
            }
            if pos != target {
                debug!(unit = %id, %target, "could not go to target");
                return Flow::Done;
            }
            match self.found_city(id) {
                Ok(city) => {
                    outcome.founded = Some(city);
                    return Flow::Done;
                }
                Err(err) => {
                    warn!(unit = %id, %target, error = %err, "could not found city");
                    outcome.founding_failed = true;
                    self.set_role(id, UnitRole::None);
                }
            }
        }

        self.find_work(id, outcome)
    }

    fn find_work(&mut self, id: UnitId, outcome: &mut DispatchOutcome) -> Flow {
        let Some(unit) = self.world.unit(id) else {
            return Flow::Done;
        };
        let surveyor = Surveyor::live(unit);
        let utype = surveyor.unit_type();
        let ai = self
            .world
            .player(surveyor.owner)
            .map_or(false, |p| p.ai_controlled);

        let plan = if utype.improves_terrain {
            evaluate_improvements(
                self.world,
                self.ctx,
                self.cache,
                &*self.pathfinder,
                &surveyor,
            )
        } else {
            ImprovementPlan::default()
        };

        if utype.founds_cities && ai {
            let site = self.sites.best_site(self.world, &surveyor, &*self.reservations);
            debug!(
                unit = %id,
                city_want = site.map_or(0, |s| s.want),
                improvement_want = plan.want,
                "founder weighs its options"
            );
            match site {
                Some(site) if site.want > plan.want => {
                    debug!(unit = %id, site = %site.pos, "heads out to found a city");
                    self.set_role(id, UnitRole::BuildCity { target: site.pos });
                    self.reservations.reserve(site.reserve, id);
                    if let Some(unit) = self.world.unit_mut(id) {
                        unit.goto_dest = Some(site.pos);
                    }
                    return Flow::Reenter;
                }
                _ if plan.want > 0 => {}
                _ => {
                    debug!(unit = %id, "cannot find work");
                    self.set_role(id, UnitRole::None);
                    return Flow::Done;
                }
            }
        }

        self.set_role(
            id,
            UnitRole::AutoImprove {
                target: plan.target.map(|t| t.pos),
                activity: plan.target.map_or(Activity::Idle, |t| t.activity),
            },
        );
        let Some(target) = plan.target else {
            return Flow::Done;
        };

        self.world
            .assign_tile(target.pos, PlayerSet::only(surveyor.owner));
        if let Some(unit) = self.world.unit_mut(id) {
            unit.goto_dest = Some(target.pos);
        }
        if self.pathfinder.goto(self.world, id, target.pos) == GotoOutcome::Died {
            self.reservations.release(id);
            return Flow::Done;
        }
        let arrived = self
            .world
            .unit(id)
            .map_or(false, |u| u.moves_left > 0 && u.pos == target.pos);
        if arrived {
            match self.world.set_activity(id, target.activity) {
                Ok(()) => outcome.started = Some(target.activity),
                Err(err) => warn!(unit = %id, error = %err, "activity refused"),
            }
        }
        Flow::Done
    }

    fn set_role(&mut self, id: UnitId, role: UnitRole) {
        let Some(unit) = self.world.unit_mut(id) else {
            return;
        };
        let leaving_city_mission =
            matches!(unit.role, UnitRole::BuildCity { .. }) && unit.role != role;
        unit.role = role;
        if leaving_city_mission {
            self.reservations.release(id);
        }
    }

    fn found_city(&mut self, id: UnitId) -> Result<CityId, WorldError> {
        let unit = self.world.unit(id).ok_or(WorldError::UnknownUnit(id))?;
        let owner = unit.owner;
        let player = self
            .world
            .player(owner)
            .ok_or(WorldError::UnknownPlayer(owner))?;
        let name = format!("{} {}", player.name, self.world.cities_of(owner).count() + 1);

        self.world.idle_unit(id);
        self.set_role(id, UnitRole::None);
        let city = self.world.found_city(id, name)?;
        self.reservations.release(id);
        self.cache.rebuild(self.world, &self.ctx.weights, owner);
        debug!(unit = %id, city = %city, "city founded");
        Ok(city)
    }
}
