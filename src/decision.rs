//! Picks the best terrain improvement for a settler across every tile its
//! owner's cities could work, and estimates how much cities want new
//! settlers or workers.

use tracing::debug;

use crate::amortize::amortize;
use crate::collab::{CitySiteScorer, Pathfinder, TileReservations};
use crate::context::SettlerContext;
use crate::infra_cache::InfrastructureCache;
use crate::road_bonus::{road_bonus, RoadKind};
use crate::technology::TechFlag;
use crate::terrain::{self, Specials, Terrain};
use crate::territory::is_already_assigned;
use crate::units::{self, Activity, UnitKind, UnitTypeDefinition};
use crate::valuation::{city_tile_value, YieldNeed};
use crate::world::{City, CityId, CityOffset, MapPos, PlayerId, TileUse, Unit, UnitId, World};

/// Current value of the best candidate before any is seen. Large, so a
/// candidate worth nothing never replaces it.
const UNSET_OLD_VALUE: i32 = 9999;

/// Foodbox share a settler already in the field costs its city.
const LIVE_FOODBOX_COST: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyorIdentity {
    Live(UnitId),
    /// A what-if unit standing in a city; it never exists in the world.
    Transient,
}

/// The unit a decision is made for.
#[derive(Debug, Clone)]
pub struct Surveyor {
    pub identity: SurveyorIdentity,
    pub owner: PlayerId,
    pub kind: UnitKind,
    pub pos: MapPos,
    pub goto_dest: Option<MapPos>,
    pub homecity: Option<CityId>,
}

impl Surveyor {
    pub fn live(unit: &Unit) -> Self {
        Self {
            identity: SurveyorIdentity::Live(unit.id),
            owner: unit.owner,
            kind: unit.kind,
            pos: unit.pos,
            goto_dest: unit.goto_dest,
            homecity: unit.homecity,
        }
    }

    pub fn transient(city: &City, kind: UnitKind) -> Self {
        Self {
            identity: SurveyorIdentity::Transient,
            owner: city.owner,
            kind,
            pos: city.pos,
            goto_dest: None,
            homecity: Some(city.id),
        }
    }

    pub fn unit_type(&self) -> &'static UnitTypeDefinition {
        units::definition(self.kind)
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        match self.identity {
            SurveyorIdentity::Live(id) => Some(id),
            SurveyorIdentity::Transient => None,
        }
    }

    fn food_upkeep(&self) -> i32 {
        if self.homecity.is_none() {
            return 0;
        }
        self.unit_type().food_upkeep
    }

    fn foodbox_cost(&self, world: &World) -> i32 {
        if self.unit_id().is_some() {
            return LIVE_FOODBOX_COST;
        }
        match world.city_at(self.pos) {
            Some(city) => {
                let cost = world.rules().granary_size(city.size);
                if city.has_granary {
                    cost / 2
                } else {
                    cost
                }
            }
            None => LIVE_FOODBOX_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImprovementTarget {
    pub pos: MapPos,
    pub activity: Activity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImprovementPlan {
    pub want: i32,
    pub target: Option<ImprovementTarget>,
}

/// Turns `utype` needs for `activity` on `terrain`, at least one.
pub fn turns_for_activity(utype: &UnitTypeDefinition, terrain: Terrain, activity: Activity) -> i32 {
    let time = terrain::rules(terrain).activity_time(activity);
    let rate = utype.work_rate.max(1);
    ((time + rate - 1) / rate).max(1)
}

struct Candidate {
    target: ImprovementTarget,
    new_value: i32,
    old_value: i32,
    extra: Option<i32>,
    in_use: bool,
    delay: i32,
}

impl Candidate {
    /// Present worth of the improvement's stream of gains.
    fn total_value(&self) -> i64 {
        let consider = match self.extra {
            Some(_) => true,
            None => self.new_value > self.old_value,
        };
        if !consider {
            return 0;
        }

        let diff = i64::from(self.new_value - self.old_value);
        let scale = if self.in_use { 64 } else { 16 };
        let extra = i64::from(self.extra.unwrap_or(0));
        let base = (diff * scale + extra * 64).clamp(0, i64::from(i32::MAX));
        let discounted = i64::from(amortize(base as i32, self.delay));
        discounted * base / (base - discounted).max(1) / 64
    }
}

struct Tally {
    best_total: i64,
    best_old: i32,
    best: Option<ImprovementTarget>,
}

impl Tally {
    fn new() -> Self {
        Self {
            best_total: 0,
            best_old: UNSET_OLD_VALUE,
            best: None,
        }
    }

    fn consider(&mut self, candidate: Candidate) {
        let total = candidate.total_value();
        if total > self.best_total
            || (total == self.best_total && candidate.old_value > self.best_old)
        {
            self.best_total = total;
            self.best_old = candidate.old_value;
            self.best = Some(candidate.target);
        }
    }
}

/// Best improvement the surveyor could make for its owner's cities.
///
/// Only tiles on the surveyor's continent, within reach, outside enemy
/// territory and not already taken this turn are candidates.
pub fn evaluate_improvements(
    world: &mut World,
    ctx: &SettlerContext,
    cache: &mut InfrastructureCache,
    pathfinder: &dyn Pathfinder,
    surveyor: &Surveyor,
) -> ImprovementPlan {
    let owner = surveyor.owner;
    cache.ensure_fresh(world, &ctx.weights, owner);
    let world: &World = world;

    let Some(player) = world.player(owner) else {
        return ImprovementPlan::default();
    };
    let utype = surveyor.unit_type();
    let move_rate = utype.move_rate.max(1);
    let continent = world.continent_at(surveyor.pos);
    let enemies = ctx.enemies.enemies_of(owner);
    let knows_rail = player.knows(TechFlag::Railroad);
    let warmth = player.warmth;
    let slow = ctx.config.road_slow_threshold;
    let costs = pathfinder.cost_map(world, surveyor.pos, surveyor.kind);

    let mut tally = Tally::new();
    for city in world.cities_of(owner) {
        let Some(grid) = cache.city(city.id) else {
            continue;
        };
        for offset in CityOffset::work_radius() {
            let tile_use = world.city_tile_use(city, offset);
            if tile_use == TileUse::Unavailable {
                continue;
            }
            let pos = city.tile_pos(offset);
            let Some(tile) = world.tile(pos) else {
                continue;
            };
            let Some(cost) = costs.cost(pos) else {
                continue;
            };
            if tile.continent != continent
                || cost > ctx.config.threshold * move_rate
                || ctx.territory.claimants(pos).intersects(enemies)
                || is_already_assigned(world, surveyor, owner, pos)
            {
                continue;
            }

            let mv_turns = cost / move_rate;
            let old_value = city_tile_value(world, &ctx.weights, city, offset, YieldNeed::NONE);
            let in_use = matches!(tile_use, TileUse::Center | TileUse::Worked);
            let turns = |activity| turns_for_activity(utype, tile.terrain, activity);
            let cell = grid.get(offset);
            let mut consider = |activity, value: Option<i32>, extra: Option<i32>, delay| {
                if let Some(new_value) = value {
                    tally.consider(Candidate {
                        target: ImprovementTarget { pos, activity },
                        new_value,
                        old_value,
                        extra,
                        in_use,
                        delay,
                    });
                }
            };

            consider(
                Activity::Irrigate,
                cell.irrigate,
                None,
                mv_turns + turns(Activity::Irrigate),
            );
            if utype.transforms {
                consider(
                    Activity::Transform,
                    cell.transform,
                    None,
                    mv_turns + turns(Activity::Transform),
                );
            }
            consider(
                Activity::Mine,
                cell.mine,
                None,
                mv_turns + turns(Activity::Mine),
            );

            if !tile.has(Specials::ROAD) {
                let road_delay = mv_turns + turns(Activity::Road);
                consider(
                    Activity::Road,
                    cell.road,
                    Some(road_bonus(world, pos, RoadKind::Road, slow) * 5),
                    road_delay,
                );
                // Railroad starts with a road, so the road goes first.
                if knows_rail {
                    consider(
                        Activity::Road,
                        cell.railroad,
                        Some(road_bonus(world, pos, RoadKind::Railroad, slow) * 3),
                        road_delay + turns(Activity::Railroad),
                    );
                }
            } else if !tile.has(Specials::RAILROAD) && knows_rail {
                consider(
                    Activity::Railroad,
                    cell.railroad,
                    Some(road_bonus(world, pos, RoadKind::Railroad, slow) * 3),
                    mv_turns + turns(Activity::Railroad),
                );
            }

            if tile.has(Specials::POLLUTION) {
                consider(
                    Activity::Pollution,
                    cell.detox,
                    Some(warmth),
                    mv_turns + turns(Activity::Pollution),
                );
            }
            if tile.has(Specials::FALLOUT) {
                consider(
                    Activity::Fallout,
                    cell.derad,
                    Some(warmth),
                    mv_turns + turns(Activity::Fallout),
                );
            }
        }
    }

    let upkeep = i64::from(surveyor.food_upkeep()) * i64::from(ctx.config.food_weighting);
    let foodbox_cost = i64::from(surveyor.foodbox_cost(world));
    let want = ((tally.best_total - upkeep) * 100 / (40 + foodbox_cost)).clamp(0, i64::from(i32::MAX)) as i32;

    if want == 0 {
        return ImprovementPlan::default();
    }
    if let Some(target) = tally.best {
        debug!(
            owner = %owner,
            from = %surveyor.pos,
            activity = %target.activity,
            at = %target.pos,
            want,
            "settler picked an improvement"
        );
    }
    ImprovementPlan {
        want,
        target: tally.best,
    }
}

/// A city's appetite for another city founder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FounderWant {
    /// Negative when the founder would need a boat built first.
    pub want: i32,
    pub overseas: bool,
}

pub fn contemplate_new_city(
    world: &World,
    scorer: &dyn CitySiteScorer,
    reservations: &dyn TileReservations,
    city: CityId,
) -> Option<FounderWant> {
    let city = world.city(city)?;
    let player = world.player(city.owner)?;
    let Some(kind) = units::best_role_unit(&player.techs, |t| t.founds_cities) else {
        debug!(city = %city.name, "no city founder available");
        return None;
    };
    let surveyor = Surveyor::transient(city, kind);
    let site = scorer.best_site(world, &surveyor, reservations)?;
    debug!(
        city = %city.name,
        want = site.want,
        site = %site.pos,
        overseas = site.needs_boat,
        "founder want"
    );
    Some(FounderWant {
        want: if site.needs_boat { -site.want } else { site.want },
        overseas: site.needs_boat,
    })
}

/// Want for another terrain improver, scaled down where the continent
/// already has plenty per city.
pub fn contemplate_terrain_improvements(
    world: &mut World,
    ctx: &SettlerContext,
    cache: &mut InfrastructureCache,
    pathfinder: &dyn Pathfinder,
    city: CityId,
) -> Option<i32> {
    let surveyor = {
        let city = world.city(city)?;
        let player = world.player(city.owner)?;
        let kind = units::best_role_unit(&player.techs, |t| t.improves_terrain)?;
        Surveyor::transient(city, kind)
    };
    let plan = evaluate_improvements(world, ctx, cache, pathfinder, &surveyor);

    let continent = world.continent_at(surveyor.pos);
    let workers = world
        .units_of(surveyor.owner)
        .filter(|u| u.unit_type().improves_terrain && world.continent_at(u.pos) == continent)
        .count() as i32;
    let cities = world
        .cities_of(surveyor.owner)
        .filter(|c| world.continent_at(c.pos) == continent)
        .count() as i32;
    let want = plan.want / (workers / cities.max(1)).max(1);
    debug_assert!(want >= 0);
    Some(want)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{GridPathfinder, RadiusSiteScorer, ReservationBook};
    use crate::config::AiConfig;
    use crate::world::GameRules;

    struct Fixture {
        world: World,
        ctx: SettlerContext,
        cache: InfrastructureCache,
        owner: PlayerId,
        city: CityId,
    }

    fn fixture(rows: &[&str], city_at: MapPos, size: i32) -> Fixture {
        let mut world = World::from_rows(rows, GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let city = world.add_city(owner, "Home", city_at, size).unwrap();
        world.arrange_workers(city);
        let mut ctx = SettlerContext::new(AiConfig::default(), &world);
        ctx.refresh(&world);
        Fixture {
            world,
            ctx,
            cache: InfrastructureCache::new(),
            owner,
            city,
        }
    }

    fn evaluate(f: &mut Fixture, unit: UnitId) -> ImprovementPlan {
        let surveyor = Surveyor::live(f.world.unit(unit).unwrap());
        evaluate_improvements(
            &mut f.world,
            &f.ctx,
            &mut f.cache,
            &GridPathfinder::new(),
            &surveyor,
        )
    }

    fn candidate(old_value: i32, new_value: i32, x: i32) -> Candidate {
        Candidate {
            target: ImprovementTarget {
                pos: MapPos::new(x, 0),
                activity: Activity::Irrigate,
            },
            new_value,
            old_value,
            extra: None,
            in_use: true,
            delay: 3,
        }
    }

    #[test]
    fn equal_totals_prefer_the_richer_tile() {
        let mut tally = Tally::new();
        tally.consider(candidate(10, 20, 0));
        tally.consider(candidate(30, 40, 1));
        assert_eq!(tally.best.map(|t| t.pos.x), Some(1));

        // Fully equal: the first one stays.
        let mut tally = Tally::new();
        tally.consider(candidate(10, 20, 0));
        tally.consider(candidate(10, 20, 1));
        assert_eq!(tally.best.map(|t| t.pos.x), Some(0));
    }

    #[test]
    fn worthless_candidates_never_win() {
        let mut tally = Tally::new();
        tally.consider(candidate(50, 50, 0));
        tally.consider(candidate(50, 10, 1));
        assert_eq!(tally.best, None);
    }

    #[test]
    fn activity_turns_round_up() {
        let settlers = units::definition(UnitKind::Settlers);
        let engineers = units::definition(UnitKind::Engineers);
        assert_eq!(turns_for_activity(settlers, Terrain::Grassland, Activity::Irrigate), 5);
        assert_eq!(turns_for_activity(engineers, Terrain::Grassland, Activity::Irrigate), 3);
        assert_eq!(turns_for_activity(settlers, Terrain::Grassland, Activity::Idle), 1);
    }

    #[test]
    fn size_one_city_irrigates_its_center() {
        let rows = ["ooooo", "ooooo", "oggoo", "ooooo", "ooooo"];
        let mut f = fixture(&rows, MapPos::new(1, 2), 1);
        let settler = f
            .world
            .add_unit(f.owner, UnitKind::Settlers, MapPos::new(1, 2))
            .unwrap();
        let plan = evaluate(&mut f, settler);

        assert_eq!(
            plan.target,
            Some(ImprovementTarget {
                pos: MapPos::new(1, 2),
                activity: Activity::Irrigate,
            })
        );
        // One more food at the size-one weighting, on a worked tile.
        let weight = f.ctx.weights.food_weighting(1);
        assert_eq!(weight, 28);
        let base = i64::from(weight * 64);
        let discounted = i64::from(amortize(base as i32, 5));
        let total = discounted * base / (base - discounted) / 64;
        let expected = (total - 19) * 100 / 70;
        assert!(expected > 0);
        assert_eq!(i64::from(plan.want), expected);
    }

    #[test]
    fn pollution_cleanup_beats_other_work() {
        let rows = ["ooooo", "ooooo", "oggoo", "ooooo", "ooooo"];
        let mut f = fixture(&rows, MapPos::new(1, 2), 1);
        f.world
            .add_special(MapPos::new(2, 2), Specials::POLLUTION)
            .unwrap();
        let settler = f
            .world
            .add_unit(f.owner, UnitKind::Settlers, MapPos::new(1, 2))
            .unwrap();
        let plan = evaluate(&mut f, settler);
        assert_eq!(
            plan.target,
            Some(ImprovementTarget {
                pos: MapPos::new(2, 2),
                activity: Activity::Pollution,
            })
        );
    }

    #[test]
    fn enemy_territory_is_never_a_target() {
        let rows = ["ooooooooo", "ogggggggo", "ogggggggo", "ooooooooo"];
        let mut f = fixture(&rows, MapPos::new(2, 1), 2);
        let rival = f.world.add_player("B", true).unwrap();
        f.world
            .add_unit(rival, UnitKind::Warriors, MapPos::new(6, 1))
            .unwrap();
        f.ctx.refresh(&f.world);
        let settler = f
            .world
            .add_unit(f.owner, UnitKind::Settlers, MapPos::new(2, 1))
            .unwrap();

        let plan = evaluate(&mut f, settler);
        let target = plan.target.unwrap();
        let enemies = f.ctx.enemies.enemies_of(f.owner);
        assert!(!f.ctx.territory.claimants(target.pos).intersects(enemies));
        assert!(target.pos.x <= 3);
    }

    #[test]
    fn settlers_without_home_pay_no_upkeep() {
        let rows = ["ooooo", "ooooo", "oggoo", "ooooo", "ooooo"];
        let mut f = fixture(&rows, MapPos::new(1, 2), 1);
        let settler = f
            .world
            .add_unit(f.owner, UnitKind::Settlers, MapPos::new(1, 2))
            .unwrap();
        let homed = evaluate(&mut f, settler).want;
        f.world.unit_mut(settler).unwrap().homecity = None;
        let free = evaluate(&mut f, settler).want;
        assert!(free > homed);
    }

    #[test]
    fn contemplating_leaves_the_world_alone() {
        let rows = ["ooooooo", "ogggggo", "ogggggo", "ogggggo", "ooooooo"];
        let mut f = fixture(&rows, MapPos::new(3, 2), 2);
        let units_before = f.world.units().count();

        let want = contemplate_terrain_improvements(
            &mut f.world,
            &f.ctx,
            &mut f.cache,
            &GridPathfinder::new(),
            f.city,
        )
        .unwrap();
        assert!(want > 0);

        let founder = contemplate_new_city(
            &f.world,
            &RadiusSiteScorer::new(4),
            &ReservationBook::new(),
            f.city,
        );
        assert!(founder.map_or(true, |w| !w.overseas));
        assert_eq!(f.world.units().count(), units_before);
    }

    #[test]
    fn crowded_continents_want_fewer_workers() {
        let rows = ["ooooooo", "ogggggo", "ogggggo", "ogggggo", "ooooooo"];
        let mut f = fixture(&rows, MapPos::new(3, 2), 2);
        let pathfinder = GridPathfinder::new();
        let alone = contemplate_terrain_improvements(
            &mut f.world,
            &f.ctx,
            &mut f.cache,
            &pathfinder,
            f.city,
        )
        .unwrap();
        for x in 1..5 {
            f.world
                .add_unit(f.owner, UnitKind::Workers, MapPos::new(x, 3))
                .unwrap();
        }
        let crowded = contemplate_terrain_improvements(
            &mut f.world,
            &f.ctx,
            &mut f.cache,
            &pathfinder,
            f.city,
        )
        .unwrap();
        assert_eq!(crowded, alone / 4);
    }
}
