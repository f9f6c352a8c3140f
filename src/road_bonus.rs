//! Network value of a road or railroad segment, from the pattern of
//! connected tiles around it.
//!
//! Neighbour layout, indices in hex:
//!
//! ```text
//!    8
//!   012
//!  93 4A
//!   567
//!    B
//! ```
//!
//! The patterns assume square adjacency.

use crate::terrain::{self, Specials};
use crate::units::Activity;
use crate::world::{MapPos, World};

const DX: [i32; 12] = [-1, 0, 1, -1, 1, -1, 0, 1, 0, -2, 2, 0];
const DY: [i32; 12] = [-1, -1, -1, 0, 0, 1, 1, 1, -2, 0, 0, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadKind {
    Road,
    Railroad,
}

impl RoadKind {
    fn special(self) -> Specials {
        match self {
            RoadKind::Road => Specials::ROAD,
            RoadKind::Railroad => Specials::RAILROAD,
        }
    }
}

/// Counts the connector patterns `pos` completes. Returns 0 off the map.
///
/// A neighbour "has road" when the special is present or a unit there is
/// already building road or railroad. It is "slow" when its terrain takes
/// no road or more than `slow_threshold` turns to build one; slow tiles do
/// not need a connector. Off-map neighbours have neither.
pub fn road_bonus(world: &World, pos: MapPos, kind: RoadKind, slow_threshold: i32) -> i32 {
    if !world.is_on_map(pos) {
        return 0;
    }

    let mut has_road = [false; 12];
    let mut is_slow = [false; 12];
    for i in 0..12 {
        let neighbour = pos.offset(DX[i], DY[i]);
        let Some(tile) = world.tile(neighbour) else {
            continue;
        };
        let road_time = terrain::rules(tile.terrain).road_time;
        is_slow[i] = road_time == 0 || road_time > slow_threshold;
        has_road[i] = tile.has(kind.special())
            || world
                .units_at(neighbour)
                .any(|u| matches!(u.activity, Activity::Road | Activity::Railroad));
    }

    let r = |i: usize| has_road[i];
    let fast = |i: usize| !is_slow[i];
    let mut bonus = 0;

    // Diagonal neighbour connected, the two cardinals between it and us
    // not, and somewhere reachable on the far side.
    if r(0)
        && !r(1)
        && !r(3)
        && (!r(2) || !r(8))
        && (fast(2) || fast(4) || fast(7) || fast(6) || fast(5))
    {
        bonus += 1;
    }
    if r(2)
        && !r(1)
        && !r(4)
        && (!r(7) || !r(10))
        && (fast(0) || fast(3) || fast(7) || fast(6) || fast(5))
    {
        bonus += 1;
    }
    // With r(5) set the middle clause reduces to !r(11).
    if r(5)
        && !r(6)
        && !r(3)
        && (!r(5) || !r(11))
        && (fast(2) || fast(4) || fast(7) || fast(1) || fast(0))
    {
        bonus += 1;
    }
    if r(7)
        && !r(6)
        && !r(4)
        && (!r(0) || !r(9))
        && (fast(2) || fast(3) || fast(0) || fast(1) || fast(5))
    {
        bonus += 1;
    }

    // Cardinal neighbour connected, flanks not, and the opposite row
    // offers a destination.
    if r(1) && !r(4) && !r(3) && (fast(5) || fast(6) || fast(7)) {
        bonus += 1;
    }
    if r(3) && !r(1) && !r(6) && (fast(2) || fast(4) || fast(7)) {
        bonus += 1;
    }
    if r(4) && !r(1) && !r(6) && (fast(0) || fast(3) || fast(5)) {
        bonus += 1;
    }
    if r(6) && !r(4) && !r(3) && (fast(0) || fast(1) || fast(2)) {
        bonus += 1;
    }

    bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitKind;
    use crate::world::GameRules;

    fn world(rows: &[&str]) -> World {
        World::from_rows(rows, GameRules::default()).unwrap()
    }

    #[test]
    fn isolated_tile_scores_nothing() {
        let world = world(&["ggggg"; 5]);
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 5), 0);
    }

    #[test]
    fn road_to_the_north_extends_south() {
        let mut world = world(&["ggggg"; 5]);
        world.add_special(MapPos::new(2, 1), Specials::ROAD).unwrap();
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 5), 1);
        // Railroad patterns look only at railroad.
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Railroad, 5), 0);
    }

    #[test]
    fn south_west_diagonal_yields_to_a_road_two_south() {
        let mut world = world(&["ggggg"; 5]);
        world.add_special(MapPos::new(1, 3), Specials::ROAD).unwrap();
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 5), 1);
        world.add_special(MapPos::new(2, 4), Specials::ROAD).unwrap();
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 5), 0);
    }

    #[test]
    fn slow_terrain_needs_no_connector() {
        // Everything south of the tile is mountains (road time 6).
        let mut world = world(&["ggggg", "ggggg", "ggggg", "mmmmm", "mmmmm"]);
        world.add_special(MapPos::new(2, 1), Specials::ROAD).unwrap();
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 5), 0);
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 6), 1);
    }

    #[test]
    fn road_under_construction_counts() {
        let mut world = world(&["ggggg"; 5]);
        let owner = world.add_player("A", true).unwrap();
        let worker = world.add_unit(owner, UnitKind::Settlers, MapPos::new(1, 2)).unwrap();
        world.set_activity(worker, Activity::Road).unwrap();
        assert_eq!(road_bonus(&world, MapPos::new(2, 2), RoadKind::Road, 5), 1);
    }

    #[test]
    fn off_map_neighbours_have_no_road_and_are_not_slow() {
        let mut world = world(&["gmm"]);
        world.add_special(MapPos::new(0, 0), Specials::ROAD).unwrap();
        // East is slow mountains, but the off-map tiles past it still
        // count as destinations.
        assert_eq!(road_bonus(&world, MapPos::new(1, 0), RoadKind::Road, 5), 1);
        assert_eq!(road_bonus(&world, MapPos::new(-1, 0), RoadKind::Road, 5), 0);
    }
}
