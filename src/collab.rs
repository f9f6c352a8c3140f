//! Collaborators the settler logic consumes through narrow traits:
//! movement, city-site scoring and tile reservations. Each comes with a
//! small in-crate implementation so a game runs end to end.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::debug;

use crate::amortize::amortize;
use crate::decision::Surveyor;
use crate::role::UnitRole;
use crate::terrain::{self, Specials};
use crate::units::{self, Activity, UnitKind, UnitTypeDefinition};
use crate::world::{CityOffset, MapPos, UnitId, World};

/// Move-fragment cost from an origin to every tile; `None` is unreachable.
#[derive(Debug, Clone)]
pub struct CostMap {
    width: i32,
    height: i32,
    costs: Vec<Option<i32>>,
}

impl CostMap {
    pub fn cost(&self, pos: MapPos) -> Option<i32> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        self.costs
            .get((pos.y * self.width + pos.x) as usize)
            .copied()
            .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoOutcome {
    Arrived,
    /// Out of moves on the way; the unit keeps its destination.
    EnRoute,
    Blocked,
    Died,
}

pub trait Pathfinder {
    fn cost_map(&self, world: &World, from: MapPos, kind: UnitKind) -> CostMap;

    /// Moves the unit toward `dest` with the moves it has left.
    fn goto(&mut self, world: &mut World, unit: UnitId, dest: MapPos) -> GotoOutcome;
}

/// Dijkstra over the 8-connected grid.
#[derive(Debug, Default, Clone)]
pub struct GridPathfinder;

impl GridPathfinder {
    pub fn new() -> Self {
        Self
    }

    /// Fragments needed to step from `from` onto the adjacent `to`.
    fn step_cost(world: &World, utype: &UnitTypeDefinition, from: MapPos, to: MapPos) -> Option<i32> {
        let single_move = world.rules().single_move.max(1);
        let src = world.tile(from)?;
        let dst = world.tile(to)?;

        if utype.sea {
            return (dst.terrain.is_ocean() || dst.city.is_some()).then_some(single_move);
        }
        if dst.terrain.is_ocean() {
            return None;
        }
        if src.has(Specials::RAILROAD) && dst.has(Specials::RAILROAD) {
            return Some(0);
        }
        if src.has(Specials::ROAD) && dst.has(Specials::ROAD) {
            return Some((single_move / 3).max(1));
        }
        if utype.all_terrain {
            return Some(single_move);
        }
        Some(terrain::rules(dst.terrain).movement_cost * single_move)
    }

    /// Costs and predecessor links for every tile reachable from `from`.
    fn search(
        world: &World,
        from: MapPos,
        utype: &UnitTypeDefinition,
    ) -> (Vec<Option<i32>>, Vec<Option<usize>>) {
        let len = (world.width() * world.height()).max(0) as usize;
        let mut costs: Vec<Option<i32>> = vec![None; len];
        let mut previous: Vec<Option<usize>> = vec![None; len];
        let Some(start) = world.index_of(from) else {
            return (costs, previous);
        };

        costs[start] = Some(0);
        let mut queue = BinaryHeap::new();
        queue.push(Reverse((0, start)));
        while let Some(Reverse((cost, index))) = queue.pop() {
            if costs[index].map_or(false, |best| cost > best) {
                continue;
            }
            let pos = MapPos::new(index as i32 % world.width(), index as i32 / world.width());
            for next in world.adjacent(pos) {
                let Some(step) = Self::step_cost(world, utype, pos, next) else {
                    continue;
                };
                let Some(next_index) = world.index_of(next) else {
                    continue;
                };
                let total = cost + step;
                if costs[next_index].map_or(true, |best| total < best) {
                    costs[next_index] = Some(total);
                    previous[next_index] = Some(index);
                    queue.push(Reverse((total, next_index)));
                }
            }
        }
        (costs, previous)
    }

    fn path(world: &World, from: MapPos, dest: MapPos, utype: &UnitTypeDefinition) -> Option<Vec<MapPos>> {
        let (costs, previous) = Self::search(world, from, utype);
        let start = world.index_of(from)?;
        let mut index = world.index_of(dest)?;
        costs[index]?;

        let mut steps = Vec::new();
        while index != start {
            steps.push(MapPos::new(index as i32 % world.width(), index as i32 / world.width()));
            index = previous[index]?;
        }
        steps.reverse();
        Some(steps)
    }
}

impl Pathfinder for GridPathfinder {
    fn cost_map(&self, world: &World, from: MapPos, kind: UnitKind) -> CostMap {
        let (costs, _) = Self::search(world, from, units::definition(kind));
        CostMap {
            width: world.width(),
            height: world.height(),
            costs,
        }
    }

    fn goto(&mut self, world: &mut World, unit: UnitId, dest: MapPos) -> GotoOutcome {
        let Some((owner, from, utype)) = world.unit(unit).map(|u| (u.owner, u.pos, u.unit_type()))
        else {
            return GotoOutcome::Died;
        };
        let Some(steps) = Self::path(world, from, dest, utype) else {
            debug!(unit = %unit, %dest, "no path");
            return GotoOutcome::Blocked;
        };

        let mut here = from;
        for next in steps {
            let Some(moves_left) = world.unit(unit).map(|u| u.moves_left) else {
                return GotoOutcome::Died;
            };
            if moves_left <= 0 {
                if let Some(u) = world.unit_mut(unit) {
                    u.activity = Activity::Goto;
                    u.goto_dest = Some(dest);
                }
                return GotoOutcome::EnRoute;
            }
            if world.units_at(next).any(|other| !world.allied(other.owner, owner)) {
                return GotoOutcome::Blocked;
            }
            let cost = Self::step_cost(world, utype, here, next).unwrap_or(moves_left);
            if world.move_unit(unit, next, cost).is_err() {
                return GotoOutcome::Blocked;
            }
            here = next;
        }

        match world.unit_mut(unit) {
            Some(u) => {
                u.activity = Activity::Idle;
                u.activity_progress = 0;
                u.goto_dest = Some(dest);
                GotoOutcome::Arrived
            }
            None => GotoOutcome::Died,
        }
    }
}

/// A place to found a city and how much the surveyor wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitySite {
    pub pos: MapPos,
    /// Best tile around the site, held for the founder while it travels.
    pub reserve: MapPos,
    pub want: i32,
    pub needs_boat: bool,
}

pub trait CitySiteScorer {
    fn best_site(
        &self,
        world: &World,
        surveyor: &Surveyor,
        reservations: &dyn TileReservations,
    ) -> Option<CitySite>;
}

/// Scans a square around the surveyor and scores each buildable site by
/// the yield of its work radius, discounted by travel time.
#[derive(Debug, Clone)]
pub struct RadiusSiteScorer {
    radius: i32,
}

impl RadiusSiteScorer {
    pub fn new(radius: i32) -> Self {
        Self { radius }
    }

    fn tile_score(world: &World, pos: MapPos) -> i32 {
        world
            .tile_output(pos)
            .map_or(0, |out| out.food * 3 + out.shield * 2 + out.trade)
    }
}

impl CitySiteScorer for RadiusSiteScorer {
    fn best_site(
        &self,
        world: &World,
        surveyor: &Surveyor,
        reservations: &dyn TileReservations,
    ) -> Option<CitySite> {
        let utype = surveyor.unit_type();
        if !utype.founds_cities {
            return None;
        }
        let me = surveyor.unit_id();
        let held_by_other = |pos: MapPos| reservations.holder(pos).map_or(false, |u| Some(u) != me);
        let home = world.continent_at(surveyor.pos);
        // Only a city on the coast can ship a founder overseas.
        let may_sail = me.is_none() && world.is_ocean_near(surveyor.pos);
        let spacing = world.rules().citymindist.max(1);
        let speed = (utype.move_rate / world.rules().single_move.max(1)).max(1);

        let mut best: Option<CitySite> = None;
        for pos in world.square(surveyor.pos, self.radius) {
            if !world.city_can_be_built_here(pos) || held_by_other(pos) {
                continue;
            }
            let claimed = world.units_of(surveyor.owner).any(|u| {
                Some(u.id) != me
                    && matches!(u.role, UnitRole::BuildCity { target } if target.real_dist(pos) < spacing)
            });
            if claimed {
                continue;
            }
            let needs_boat = world.continent_at(pos) != home;
            if needs_boat && !may_sail {
                continue;
            }

            let mut score = 0;
            let mut reserve: Option<(i32, MapPos)> = None;
            for offset in CityOffset::work_radius() {
                let tile_pos = pos.offset(offset.dx, offset.dy);
                let Some(tile) = world.tile(tile_pos) else {
                    continue;
                };
                if tile.city.is_some() || held_by_other(tile_pos) {
                    continue;
                }
                let mut value = Self::tile_score(world, tile_pos);
                if world.cities().any(|c| c.offset_of(tile_pos).is_some()) {
                    value /= 2;
                }
                score += value;
                if !offset.is_center() && reserve.map_or(true, |(v, _)| value > v) {
                    reserve = Some((value, tile_pos));
                }
            }

            let turns = (surveyor.pos.real_dist(pos) + speed - 1) / speed;
            let want = amortize(score, turns + if needs_boat { 3 } else { 0 });
            if want > best.map_or(0, |b| b.want) {
                best = Some(CitySite {
                    pos,
                    reserve: reserve.map_or(pos, |(_, p)| p),
                    want,
                    needs_boat,
                });
            }
        }
        best
    }
}

pub trait TileReservations {
    fn reserve(&mut self, pos: MapPos, unit: UnitId);
    /// Drops every tile `unit` holds.
    fn release(&mut self, unit: UnitId);
    fn holder(&self, pos: MapPos) -> Option<UnitId>;
    /// Forgets holders that no longer exist.
    fn retain_live(&mut self, world: &World);
}

#[derive(Debug, Default, Clone)]
pub struct ReservationBook {
    tiles: BTreeMap<MapPos, UnitId>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileReservations for ReservationBook {
    fn reserve(&mut self, pos: MapPos, unit: UnitId) {
        self.tiles.insert(pos, unit);
    }

    fn release(&mut self, unit: UnitId) {
        self.tiles.retain(|_, holder| *holder != unit);
    }

    fn holder(&self, pos: MapPos) -> Option<UnitId> {
        self.tiles.get(&pos).copied()
    }

    fn retain_live(&mut self, world: &World) {
        self.tiles.retain(|_, unit| world.unit(*unit).is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::GameRules;

    fn world(rows: &[&str]) -> World {
        World::from_rows(rows, GameRules::default()).unwrap()
    }

    #[test]
    fn cost_map_prices_terrain_and_roads() {
        let mut world = world(&["ggggg", "ghmgg", "ggggo"]);
        let costs = GridPathfinder::new().cost_map(&world, MapPos::new(0, 0), UnitKind::Settlers);
        assert_eq!(costs.cost(MapPos::new(0, 0)), Some(0));
        assert_eq!(costs.cost(MapPos::new(1, 0)), Some(3));
        // Hills cost two moves.
        assert_eq!(costs.cost(MapPos::new(1, 1)), Some(6));
        assert_eq!(costs.cost(MapPos::new(4, 2)), None);
        assert_eq!(costs.cost(MapPos::new(9, 9)), None);

        world.add_special(MapPos::new(0, 0), Specials::ROAD).unwrap();
        world.add_special(MapPos::new(1, 0), Specials::ROAD).unwrap();
        let costs = GridPathfinder::new().cost_map(&world, MapPos::new(0, 0), UnitKind::Settlers);
        assert_eq!(costs.cost(MapPos::new(1, 0)), Some(1));
    }

    #[test]
    fn sea_units_stay_on_water() {
        let world = world(&["oooog", "ggggg"]);
        let costs = GridPathfinder::new().cost_map(&world, MapPos::new(0, 0), UnitKind::Trireme);
        assert_eq!(costs.cost(MapPos::new(3, 0)), Some(9));
        assert_eq!(costs.cost(MapPos::new(0, 1)), None);
    }

    #[test]
    fn goto_spends_moves_and_resumes() {
        let mut world = world(&["gggggg"]);
        let owner = world.add_player("A", true).unwrap();
        let unit = world.add_unit(owner, UnitKind::Settlers, MapPos::new(0, 0)).unwrap();
        let mut finder = GridPathfinder::new();
        let dest = MapPos::new(3, 0);

        assert_eq!(finder.goto(&mut world, unit, dest), GotoOutcome::EnRoute);
        let u = world.unit(unit).unwrap();
        assert_eq!(u.pos, MapPos::new(1, 0));
        assert_eq!(u.activity, Activity::Goto);
        assert_eq!(u.goto_dest, Some(dest));

        world.unit_mut(unit).unwrap().moves_left = 9;
        assert_eq!(finder.goto(&mut world, unit, dest), GotoOutcome::Arrived);
        let u = world.unit(unit).unwrap();
        assert_eq!(u.pos, dest);
        assert_eq!(u.activity, Activity::Idle);
        assert!(u.moves_left > 0);
    }

    #[test]
    fn hostile_units_block_the_way() {
        let mut world = world(&["ggo", "ggo"]);
        let a = world.add_player("A", true).unwrap();
        let b = world.add_player("B", true).unwrap();
        let unit = world.add_unit(a, UnitKind::Settlers, MapPos::new(0, 0)).unwrap();
        world.add_unit(b, UnitKind::Warriors, MapPos::new(1, 1)).unwrap();
        let mut finder = GridPathfinder::new();
        assert_eq!(finder.goto(&mut world, unit, MapPos::new(1, 1)), GotoOutcome::Blocked);
        assert_eq!(finder.goto(&mut world, unit, MapPos::new(2, 0)), GotoOutcome::Blocked);

        world.set_allied(a, b, true).unwrap();
        assert_eq!(finder.goto(&mut world, unit, MapPos::new(1, 1)), GotoOutcome::Arrived);
        assert_eq!(finder.goto(&mut world, UnitId::from_raw(999), MapPos::new(0, 0)), GotoOutcome::Died);
    }

    #[test]
    fn reservations_follow_their_holder() {
        let mut book = ReservationBook::new();
        let (a, b) = (UnitId::from_raw(1), UnitId::from_raw(2));
        book.reserve(MapPos::new(1, 1), a);
        book.reserve(MapPos::new(2, 2), a);
        book.reserve(MapPos::new(3, 3), b);
        assert_eq!(book.holder(MapPos::new(2, 2)), Some(a));
        book.release(a);
        assert_eq!(book.len(), 1);
        assert_eq!(book.holder(MapPos::new(1, 1)), None);
        assert_eq!(book.holder(MapPos::new(3, 3)), Some(b));
    }

    #[test]
    fn reservations_of_vanished_units_are_forgotten() {
        let mut world = world(&["gggg"]);
        let owner = world.add_player("A", true).unwrap();
        let kept = world.add_unit(owner, UnitKind::Settlers, MapPos::new(0, 0)).unwrap();
        let lost = world.add_unit(owner, UnitKind::Settlers, MapPos::new(1, 0)).unwrap();
        let mut book = ReservationBook::new();
        book.reserve(MapPos::new(2, 0), kept);
        book.reserve(MapPos::new(3, 0), lost);

        world.remove_unit(lost);
        book.retain_live(&world);
        assert_eq!(book.len(), 1);
        assert_eq!(book.holder(MapPos::new(2, 0)), Some(kept));
        assert_eq!(book.holder(MapPos::new(3, 0)), None);
    }

    #[test]
    fn site_scorer_prefers_rich_land_and_respects_reservations() {
        let mut world = world(&["ggggggggg", "ggggggggg", "ggggggggg", "ggggggggg", "ddddddddd"]);
        let owner = world.add_player("A", true).unwrap();
        let settler = world.add_unit(owner, UnitKind::Settlers, MapPos::new(4, 2)).unwrap();
        let surveyor = Surveyor::live(world.unit(settler).unwrap());
        let scorer = RadiusSiteScorer::new(3);

        let book = ReservationBook::new();
        let site = scorer.best_site(&world, &surveyor, &book).unwrap();
        assert!(site.want > 0);
        assert!(!site.needs_boat);
        assert_ne!(site.reserve, site.pos);

        let mut book = ReservationBook::new();
        book.reserve(site.pos, UnitId::from_raw(77));
        let other = scorer.best_site(&world, &surveyor, &book).unwrap();
        assert_ne!(other.pos, site.pos);

        // The surveyor's own reservation does not hide a site from it.
        let mut book = ReservationBook::new();
        book.reserve(site.pos, settler);
        assert_eq!(scorer.best_site(&world, &surveyor, &book), Some(site));
    }

    #[test]
    fn live_founders_do_not_plan_overseas() {
        let mut world = world(&["ggoggg", "ggoggg"]);
        let owner = world.add_player("A", true).unwrap();
        let settler = world.add_unit(owner, UnitKind::Settlers, MapPos::new(0, 0)).unwrap();
        let surveyor = Surveyor::live(world.unit(settler).unwrap());
        let site = RadiusSiteScorer::new(5)
            .best_site(&world, &surveyor, &ReservationBook::new())
            .unwrap();
        assert!(site.pos.x < 2);
    }
}
