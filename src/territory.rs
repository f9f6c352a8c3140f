//! Per-turn claims on map tiles: who threatens a tile, who is hostile to
//! whom, and which tiles settlers have already picked.

use std::fmt;

use crate::decision::Surveyor;
use crate::units::Activity;
use crate::world::{MapPos, PlayerId, World};

pub const MAX_PLAYERS: usize = 64;

/// A set of player ids backed by one machine word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlayerSet(u64);

impl PlayerSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(u64::MAX)
    }

    pub fn only(player: PlayerId) -> Self {
        Self(Self::bit(player))
    }

    pub fn all_except(player: PlayerId) -> Self {
        Self(!Self::bit(player))
    }

    fn bit(player: PlayerId) -> u64 {
        debug_assert!(player.index() < MAX_PLAYERS, "{player} out of range");
        1u64 << (player.index() % MAX_PLAYERS)
    }

    pub fn insert(&mut self, player: PlayerId) {
        self.0 |= Self::bit(player);
    }

    pub fn remove(&mut self, player: PlayerId) {
        self.0 &= !Self::bit(player);
    }

    pub fn contains(self, player: PlayerId) -> bool {
        self.0 & Self::bit(player) != 0
    }

    pub fn intersects(self, other: PlayerSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: PlayerSet) -> PlayerSet {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for PlayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = (0..MAX_PLAYERS).filter(|i| self.0 & (1u64 << i) != 0);
        f.debug_set().entries(members).finish()
    }
}

/// Claimant set per tile: players with a combat unit or city close enough
/// to contest it.
#[derive(Debug, Default)]
pub struct TerritoryMap {
    width: i32,
    height: i32,
    claims: Vec<PlayerSet>,
}

impl TerritoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the map dimensions, reusing the allocation when possible.
    pub fn resize(&mut self, width: i32, height: i32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.claims.clear();
        self.claims
            .resize((width.max(0) * height.max(0)) as usize, PlayerSet::empty());
    }

    pub fn claimants(&self, pos: MapPos) -> PlayerSet {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return PlayerSet::empty();
        }
        self.claims[(pos.y * self.width + pos.x) as usize]
    }

    fn claim(&mut self, pos: MapPos, player: PlayerId) {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return;
        }
        self.claims[(pos.y * self.width + pos.x) as usize].insert(player);
    }

    pub fn rebuild_territory(&mut self, world: &World, city_radius: i32) {
        self.resize(world.width(), world.height());
        self.claims.fill(PlayerSet::empty());
        let single_move = world.rules().single_move.max(1);

        for unit in world.units() {
            let utype = unit.unit_type();
            if utype.attack == 0 {
                continue;
            }
            let owner = unit.owner;
            if utype.sea {
                let radius = 1 + utype.move_rate / single_move;
                for pos in world.square(unit.pos, radius) {
                    if world.is_ocean_near(pos) {
                        self.claim(pos, owner);
                    }
                }
            } else {
                let divisor = if utype.all_terrain { 1 } else { single_move };
                let radius = 1 + utype.move_rate / divisor;
                for pos in world.square(unit.pos, radius) {
                    self.claim(pos, owner);
                }
            }
        }

        for city in world.cities() {
            for pos in world.square(city.pos, city_radius) {
                self.claim(pos, city.owner);
            }
        }
    }
}

/// For every player, the set of players it is not allied with.
#[derive(Debug, Default)]
pub struct EnemyMasks {
    masks: Vec<PlayerSet>,
}

impl EnemyMasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild_hostility(&mut self, world: &World) {
        let ids = world.player_ids();
        self.masks.clear();
        self.masks.resize(ids.len(), PlayerSet::empty());
        for &row in &ids {
            for &col in &ids {
                if !world.allied(row, col) {
                    self.masks[row.index()].insert(col);
                }
            }
        }
    }

    pub fn enemies_of(&self, player: PlayerId) -> PlayerSet {
        self.masks
            .get(player.index())
            .copied()
            .unwrap_or_default()
    }
}

/// Resets every tile's assignment set and re-marks the tiles units stand
/// on or travel to, players in `order`.
pub fn clear_and_reassign_tile_claims(world: &mut World, order: &[PlayerId]) {
    world.clear_assignments();
    for &player in order {
        let claims: Vec<(MapPos, PlayerSet)> = world
            .units_of(player)
            .map(|unit| {
                let utype = unit.unit_type();
                if utype.improves_terrain {
                    match (unit.activity, unit.goto_dest) {
                        (Activity::Goto, Some(dest)) => {
                            (dest, PlayerSet::only(player))
                        }
                        _ => (unit.pos, PlayerSet::all()),
                    }
                } else {
                    (unit.pos, PlayerSet::all_except(player))
                }
            })
            .collect();
        for (pos, claim) in claims {
            world.assign_tile(pos, claim);
        }
    }
}

/// Whether `pos` is already taken for `player` from the point of view of
/// `surveyor`.
///
/// The surveyor's own tile and destination are judged by who actually
/// stands there: a non-allied unit, or a second settler-type unit, makes
/// them taken. Every other tile goes by this turn's assignment set.
pub fn is_already_assigned(world: &World, surveyor: &Surveyor, player: PlayerId, pos: MapPos) -> bool {
    if surveyor.pos == pos || surveyor.goto_dest == Some(pos) {
        let surveyor_settles = surveyor.unit_type().improves_terrain;
        return world
            .units_at(pos)
            .filter(|other| Some(other.id) != surveyor.unit_id())
            .any(|other| {
                !world.allied(other.owner, player)
                    || (other.unit_type().improves_terrain && surveyor_settles)
            });
    }
    world
        .tile(pos)
        .map_or(false, |tile| tile.assigned.contains(player))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitKind;
    use crate::world::GameRules;

    fn open_world(players: usize) -> (World, Vec<PlayerId>) {
        let rows = vec!["gggggggggg"; 10];
        let mut world = World::from_rows(&rows, GameRules::default()).unwrap();
        let ids = (0..players)
            .map(|i| world.add_player(format!("p{i}"), true).unwrap())
            .collect();
        (world, ids)
    }

    #[test]
    fn player_set_operations() {
        let a = PlayerId(0);
        let b = PlayerId(5);
        let mut set = PlayerSet::only(a);
        assert!(set.contains(a));
        assert!(!set.contains(b));
        set.insert(b);
        assert!(set.contains(b));
        set.remove(a);
        assert!(!set.contains(a));
        assert!(!PlayerSet::all_except(b).contains(b));
        assert!(PlayerSet::all_except(b).contains(a));
        assert!(PlayerSet::all().intersects(PlayerSet::only(b)));
        assert!(PlayerSet::empty().is_empty());
    }

    #[test]
    fn warriors_claim_radius_two() {
        let (mut world, ids) = open_world(1);
        world.add_unit(ids[0], UnitKind::Warriors, MapPos::new(5, 5)).unwrap();
        let mut map = TerritoryMap::new();
        map.rebuild_territory(&world, 3);
        assert!(map.claimants(MapPos::new(7, 7)).contains(ids[0]));
        assert!(!map.claimants(MapPos::new(8, 5)).contains(ids[0]));
    }

    #[test]
    fn all_terrain_units_count_whole_moves() {
        let (mut world, ids) = open_world(1);
        world.add_unit(ids[0], UnitKind::AlpineTroops, MapPos::new(1, 1)).unwrap();
        let mut map = TerritoryMap::new();
        map.rebuild_territory(&world, 3);
        assert!(map.claimants(MapPos::new(5, 5)).contains(ids[0]));
        assert!(map.claimants(MapPos::new(5, 1)).contains(ids[0]));
        assert!(!map.claimants(MapPos::new(6, 6)).contains(ids[0]));
        assert!(!map.claimants(MapPos::new(6, 1)).contains(ids[0]));
    }

    #[test]
    fn ships_claim_only_coastal_tiles() {
        let rows = vec!["oogggggggg"; 10];
        let mut world = World::from_rows(&rows, GameRules::default()).unwrap();
        let owner = world.add_player("p0", true).unwrap();
        world.add_unit(owner, UnitKind::Trireme, MapPos::new(0, 5)).unwrap();
        let mut map = TerritoryMap::new();
        map.rebuild_territory(&world, 3);

        assert!(map.claimants(MapPos::new(0, 5)).contains(owner));
        assert!(map.claimants(MapPos::new(2, 5)).contains(owner));
        assert!(map.claimants(MapPos::new(0, 1)).contains(owner));
        // In range but out of sight of the sea.
        assert!(!map.claimants(MapPos::new(3, 5)).contains(owner));
        assert!(!map.claimants(MapPos::new(4, 9)).contains(owner));
        assert!(!map.claimants(MapPos::new(0, 0)).contains(owner));
    }

    #[test]
    fn settlers_do_not_claim_territory() {
        let (mut world, ids) = open_world(1);
        world.add_unit(ids[0], UnitKind::Settlers, MapPos::new(5, 5)).unwrap();
        let mut map = TerritoryMap::new();
        map.rebuild_territory(&world, 3);
        assert!(map.claimants(MapPos::new(5, 5)).is_empty());
    }

    #[test]
    fn hostility_follows_alliances() {
        let (mut world, ids) = open_world(3);
        world.set_allied(ids[0], ids[1], true).unwrap();
        let mut masks = EnemyMasks::new();
        masks.rebuild_hostility(&world);
        assert!(!masks.enemies_of(ids[0]).contains(ids[0]));
        assert!(!masks.enemies_of(ids[0]).contains(ids[1]));
        assert!(masks.enemies_of(ids[0]).contains(ids[2]));
        let bystander = masks.enemies_of(ids[2]);

        world.set_allied(ids[0], ids[1], false).unwrap();
        masks.rebuild_hostility(&world);
        assert!(masks.enemies_of(ids[0]).contains(ids[1]));
        assert!(masks.enemies_of(ids[1]).contains(ids[0]));
        assert!(masks.enemies_of(ids[0]).contains(ids[2]));
        assert_eq!(masks.enemies_of(ids[2]), bystander);
    }

    #[test]
    fn claims_mark_goals_and_positions() {
        let (mut world, ids) = open_world(2);
        let settler = world.add_unit(ids[0], UnitKind::Settlers, MapPos::new(1, 1)).unwrap();
        if let Some(unit) = world.unit_mut(settler) {
            unit.activity = Activity::Goto;
            unit.goto_dest = Some(MapPos::new(4, 4));
        }
        world.add_unit(ids[1], UnitKind::Warriors, MapPos::new(6, 6)).unwrap();
        clear_and_reassign_tile_claims(&mut world, &ids);

        let goal = world.tile(MapPos::new(4, 4)).unwrap().assigned;
        assert!(goal.contains(ids[0]) && !goal.contains(ids[1]));
        assert!(world.tile(MapPos::new(1, 1)).unwrap().assigned.is_empty());
        let guarded = world.tile(MapPos::new(6, 6)).unwrap().assigned;
        assert!(guarded.contains(ids[0]) && !guarded.contains(ids[1]));
    }

    #[test]
    fn allied_units_sharing_a_tile() {
        let (mut world, ids) = open_world(2);
        world.set_allied(ids[0], ids[1], true).unwrap();
        let here = MapPos::new(3, 3);
        let settler = world.add_unit(ids[0], UnitKind::Settlers, here).unwrap();
        world.add_unit(ids[1], UnitKind::Warriors, here).unwrap();

        let surveyor = Surveyor::live(world.unit(settler).unwrap());
        assert!(!is_already_assigned(&world, &surveyor, ids[0], here));

        world.add_unit(ids[1], UnitKind::Workers, here).unwrap();
        assert!(is_already_assigned(&world, &surveyor, ids[0], here));
    }

    #[test]
    fn hostile_unit_on_own_tile_counts() {
        let (mut world, ids) = open_world(2);
        let here = MapPos::new(3, 3);
        let settler = world.add_unit(ids[0], UnitKind::Settlers, here).unwrap();
        world.add_unit(ids[1], UnitKind::Warriors, here).unwrap();
        let surveyor = Surveyor::live(world.unit(settler).unwrap());
        assert!(is_already_assigned(&world, &surveyor, ids[0], here));
    }

    #[test]
    fn resize_tracks_dimensions() {
        let mut map = TerritoryMap::new();
        map.resize(4, 3);
        assert_eq!(map.claims.len(), 12);
        map.resize(2, 2);
        assert_eq!(map.claims.len(), 4);
        assert!(map.claimants(MapPos::new(5, 5)).is_empty());
    }
}
