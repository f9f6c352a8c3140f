use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::role::UnitRole;
use crate::technology::{self, TechFlag};
use crate::terrain::{self, Specials, Terrain, TileOutput};
use crate::territory::{PlayerSet, MAX_PLAYERS};
use crate::units::{self, Activity, UnitKind, UnitTypeDefinition};

pub const CITY_MAP_RADIUS: i32 = 2;
pub const CITY_MAP_SIZE: usize = 5;
pub const CITY_MAP_CELLS: usize = CITY_MAP_SIZE * CITY_MAP_SIZE;

const ADJACENT: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
const CARDINAL: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(u32);

impl PlayerId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl CityId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl UnitId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "city#{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MapPos {
    pub x: i32,
    pub y: i32,
}

impl MapPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance: the number of single steps between two tiles.
    pub fn real_dist(self, other: MapPos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for MapPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A position relative to a city center inside its work radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CityOffset {
    pub dx: i32,
    pub dy: i32,
}

impl CityOffset {
    pub const CENTER: CityOffset = CityOffset { dx: 0, dy: 0 };

    pub fn new(dx: i32, dy: i32) -> Option<Self> {
        let offset = Self { dx, dy };
        offset.is_valid().then_some(offset)
    }

    fn is_valid(self) -> bool {
        let (ax, ay) = (self.dx.abs(), self.dy.abs());
        ax <= CITY_MAP_RADIUS && ay <= CITY_MAP_RADIUS && !(ax == CITY_MAP_RADIUS && ay == CITY_MAP_RADIUS)
    }

    /// The 21 offsets of the work radius, rows top to bottom.
    pub fn work_radius() -> impl Iterator<Item = CityOffset> {
        (-CITY_MAP_RADIUS..=CITY_MAP_RADIUS).flat_map(|dy| {
            (-CITY_MAP_RADIUS..=CITY_MAP_RADIUS).filter_map(move |dx| CityOffset::new(dx, dy))
        })
    }

    /// Cell index in a 5x5 grid.
    pub fn index(self) -> usize {
        let row = (self.dy + CITY_MAP_RADIUS) as usize;
        let col = (self.dx + CITY_MAP_RADIUS) as usize;
        row * CITY_MAP_SIZE + col
    }

    pub fn is_center(self) -> bool {
        self == Self::CENTER
    }
}

/// How a city may use one tile of its work radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileUse {
    Center,
    Worked,
    Empty,
    /// Off the map, worked by another city, or under a hostile unit.
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRules {
    /// Move fragments in one full move.
    #[serde(default = "default_single_move")]
    pub single_move: i32,
    #[serde(default = "default_foodbox")]
    pub foodbox: i32,
    /// Minimum distance between two city centers.
    #[serde(default = "default_citymindist")]
    pub citymindist: i32,
    /// Adjacent land tiles needed to turn ocean into land.
    #[serde(default = "default_ocean_reclaim")]
    pub ocean_reclaim_requirement: i32,
    /// Adjacent ocean tiles needed to turn land into ocean.
    #[serde(default = "default_land_channel")]
    pub land_channel_requirement: i32,
}

fn default_single_move() -> i32 {
    3
}

fn default_foodbox() -> i32 {
    10
}

fn default_citymindist() -> i32 {
    2
}

fn default_ocean_reclaim() -> i32 {
    3
}

fn default_land_channel() -> i32 {
    1
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            single_move: default_single_move(),
            foodbox: default_foodbox(),
            citymindist: default_citymindist(),
            ocean_reclaim_requirement: default_ocean_reclaim(),
            land_channel_requirement: default_land_channel(),
        }
    }
}

impl GameRules {
    /// Food needed to grow a city of `size` to the next size.
    pub fn granary_size(&self, size: i32) -> i32 {
        self.foodbox * (size.max(1) + 1)
    }
}

/// Global warming accumulators.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Climate {
    #[serde(default)]
    pub heating: i32,
    #[serde(default)]
    pub warming_level: i32,
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub terrain: Terrain,
    pub specials: Specials,
    /// Land masses are numbered from 1; ocean is 0.
    pub continent: u16,
    pub city: Option<CityId>,
    /// Players that claimed the tile this turn.
    pub assigned: PlayerSet,
}

impl Tile {
    fn new(terrain: Terrain) -> Self {
        Self {
            terrain,
            specials: Specials::empty(),
            continent: 0,
            city: None,
            assigned: PlayerSet::empty(),
        }
    }

    pub fn has(&self, special: Specials) -> bool {
        self.specials.contains(special)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaxRates {
    pub tax: i32,
    pub luxury: i32,
    pub science: i32,
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            tax: 40,
            luxury: 0,
            science: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub ai_controlled: bool,
    pub allies: PlayerSet,
    pub techs: BTreeSet<String>,
    pub rates: TaxRates,
    /// Urgency of pollution and fallout cleanup, refreshed every turn.
    pub warmth: i32,
}

impl Player {
    pub fn knows(&self, flag: TechFlag) -> bool {
        technology::knows_flag(&self.techs, flag)
    }
}

#[derive(Debug, Clone)]
pub struct City {
    pub id: CityId,
    pub owner: PlayerId,
    pub name: String,
    pub pos: MapPos,
    pub size: i32,
    pub worked: BTreeSet<CityOffset>,
    pub has_granary: bool,
    pub shield_bonus: i32,
    pub tax_bonus: i32,
    pub luxury_bonus: i32,
    pub science_bonus: i32,
    pub trade_want: i32,
}

impl City {
    pub fn tile_pos(&self, offset: CityOffset) -> MapPos {
        self.pos.offset(offset.dx, offset.dy)
    }

    /// Offset of `pos` within the work radius, if it lies inside it.
    pub fn offset_of(&self, pos: MapPos) -> Option<CityOffset> {
        CityOffset::new(pos.x - self.pos.x, pos.y - self.pos.y)
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub id: UnitId,
    pub owner: PlayerId,
    pub kind: UnitKind,
    pub pos: MapPos,
    pub moves_left: i32,
    pub activity: Activity,
    pub activity_progress: i32,
    pub goto_dest: Option<MapPos>,
    pub role: UnitRole,
    pub ai_controlled: bool,
    /// Standing orders issued from outside; automation leaves these alone.
    pub has_orders: bool,
    pub homecity: Option<CityId>,
}

impl Unit {
    pub fn unit_type(&self) -> &'static UnitTypeDefinition {
        units::definition(self.kind)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: u8,
    pub name: String,
    pub ai_controlled: bool,
    pub warmth: i32,
    pub cities: usize,
    pub units: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CitySnapshot {
    pub id: u32,
    pub owner: u8,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub size: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: u32,
    pub owner: u8,
    pub kind: UnitKind,
    pub x: i32,
    pub y: i32,
    pub activity: Activity,
    pub role: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImprovementCounts {
    pub irrigated: usize,
    pub farmland: usize,
    pub mined: usize,
    pub roads: usize,
    pub railroads: usize,
    pub polluted: usize,
    pub fallout: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub scenario: String,
    pub turn: u64,
    pub epoch: u64,
    pub width: i32,
    pub height: i32,
    pub improvements: ImprovementCounts,
    pub players: Vec<PlayerSnapshot>,
    pub cities: Vec<CitySnapshot>,
    pub units: Vec<UnitSnapshot>,
}

#[derive(Debug)]
pub struct World {
    turn: u64,
    epoch: u64,
    width: i32,
    height: i32,
    rules: GameRules,
    climate: Climate,
    tiles: Vec<Tile>,
    players: Vec<Player>,
    cities: BTreeMap<CityId, City>,
    units: BTreeMap<UnitId, Unit>,
    next_city: u32,
    next_unit: u32,
}

impl World {
    pub fn new(width: i32, height: i32, rules: GameRules) -> Self {
        let count = (width.max(0) * height.max(0)) as usize;
        let mut world = Self {
            turn: 0,
            epoch: 0,
            width: width.max(0),
            height: height.max(0),
            rules,
            climate: Climate::default(),
            tiles: vec![Tile::new(Terrain::Grassland); count],
            players: Vec::new(),
            cities: BTreeMap::new(),
            units: BTreeMap::new(),
            next_city: 1,
            next_unit: 1,
        };
        world.recompute_continents();
        world
    }

    /// Builds a map from rows of terrain symbols (`g` grassland, `o` ocean...).
    pub fn from_rows<S: AsRef<str>>(rows: &[S], rules: GameRules) -> Result<Self, WorldError> {
        let width = rows.first().map_or(0, |row| row.as_ref().chars().count());
        let mut tiles = Vec::with_capacity(width * rows.len());
        for (index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let found = row.chars().count();
            if found != width {
                return Err(WorldError::RaggedMap {
                    expected: width,
                    row: index,
                    found,
                });
            }
            for symbol in row.chars() {
                let terrain = Terrain::from_symbol(symbol).ok_or(WorldError::UnknownTerrain(symbol))?;
                tiles.push(Tile::new(terrain));
            }
        }

        let mut world = Self::new(width as i32, rows.len() as i32, rules);
        world.tiles = tiles;
        world.recompute_continents();
        Ok(world)
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn advance_turn(&mut self) {
        self.turn += 1;
    }

    /// Bumped by every real map mutation.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn climate(&self) -> Climate {
        self.climate
    }

    pub fn set_climate(&mut self, climate: Climate) {
        self.climate = climate;
    }

    pub fn is_on_map(&self, pos: MapPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn index_of(&self, pos: MapPos) -> Option<usize> {
        self.is_on_map(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn tile(&self, pos: MapPos) -> Option<&Tile> {
        self.index_of(pos).map(|index| &self.tiles[index])
    }

    /// Raw tile access for speculative edits. Does not bump the epoch.
    pub(crate) fn tile_mut(&mut self, pos: MapPos) -> Option<&mut Tile> {
        let index = self.index_of(pos)?;
        Some(&mut self.tiles[index])
    }

    pub fn positions(&self) -> impl Iterator<Item = MapPos> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| MapPos::new(x, y)))
    }

    /// On-map tiles within `radius` steps of `center`, including it.
    pub fn square(&self, center: MapPos, radius: i32) -> impl Iterator<Item = MapPos> + '_ {
        (-radius..=radius).flat_map(move |dy| {
            (-radius..=radius)
                .map(move |dx| center.offset(dx, dy))
                .filter(move |pos| self.is_on_map(*pos))
        })
    }

    pub fn adjacent(&self, pos: MapPos) -> impl Iterator<Item = MapPos> + '_ {
        ADJACENT
            .iter()
            .map(move |(dx, dy)| pos.offset(*dx, *dy))
            .filter(move |p| self.is_on_map(*p))
    }

    pub fn cardinally_adjacent(&self, pos: MapPos) -> impl Iterator<Item = MapPos> + '_ {
        CARDINAL
            .iter()
            .map(move |(dx, dy)| pos.offset(*dx, *dy))
            .filter(move |p| self.is_on_map(*p))
    }

    pub fn tile_output(&self, pos: MapPos) -> Option<TileOutput> {
        self.tile(pos)
            .map(|tile| TileOutput::for_tile(tile.terrain, tile.specials))
    }

    /// True when any of the eight neighbours is ocean.
    pub fn is_ocean_near(&self, pos: MapPos) -> bool {
        self.adjacent(pos)
            .any(|p| self.tile(p).map_or(false, |t| t.terrain.is_ocean()))
    }

    /// Water for irrigation: ocean, river or irrigation on the tile itself or
    /// on a cardinal neighbour.
    pub fn has_water_source(&self, pos: MapPos) -> bool {
        let wet = |p: MapPos| {
            self.tile(p).map_or(false, |t| {
                t.terrain.is_ocean() || t.has(Specials::RIVER) || t.has(Specials::IRRIGATION)
            })
        };
        wet(pos) || self.cardinally_adjacent(pos).any(wet)
    }

    pub fn can_reclaim_ocean(&self, pos: MapPos) -> bool {
        let land = self
            .adjacent(pos)
            .filter(|p| self.tile(*p).map_or(false, |t| !t.terrain.is_ocean()))
            .count() as i32;
        land >= self.rules.ocean_reclaim_requirement
    }

    pub fn can_channel_land(&self, pos: MapPos) -> bool {
        let ocean = self
            .adjacent(pos)
            .filter(|p| self.tile(*p).map_or(false, |t| t.terrain.is_ocean()))
            .count() as i32;
        ocean >= self.rules.land_channel_requirement
    }

    pub fn set_terrain(&mut self, pos: MapPos, terrain: Terrain) -> Result<(), WorldError> {
        let index = self.index_of(pos).ok_or(WorldError::OffMap(pos))?;
        let tile = &mut self.tiles[index];
        let crosses_coast = tile.terrain.is_ocean() != terrain.is_ocean();
        tile.terrain = terrain;
        tile.specials = tile.specials.retained_on(terrain);
        self.epoch += 1;
        if crosses_coast {
            self.recompute_continents();
        }
        Ok(())
    }

    pub fn add_special(&mut self, pos: MapPos, special: Specials) -> Result<(), WorldError> {
        let index = self.index_of(pos).ok_or(WorldError::OffMap(pos))?;
        self.tiles[index].specials.insert(special);
        self.epoch += 1;
        Ok(())
    }

    pub fn remove_special(&mut self, pos: MapPos, special: Specials) -> Result<(), WorldError> {
        let index = self.index_of(pos).ok_or(WorldError::OffMap(pos))?;
        self.tiles[index].specials.remove(special);
        self.epoch += 1;
        Ok(())
    }

    pub(crate) fn clear_assignments(&mut self) {
        for tile in &mut self.tiles {
            tile.assigned = PlayerSet::empty();
        }
    }

    pub(crate) fn assign_tile(&mut self, pos: MapPos, claim: PlayerSet) {
        if let Some(tile) = self.tile_mut(pos) {
            tile.assigned = tile.assigned.union(claim);
        }
    }

    /// Numbers land masses by 8-connected flood fill.
    pub fn recompute_continents(&mut self) {
        for tile in &mut self.tiles {
            tile.continent = 0;
        }
        let mut next: u16 = 1;
        let positions: Vec<MapPos> = self.positions().collect();
        for start in positions {
            let Some(index) = self.index_of(start) else {
                continue;
            };
            if self.tiles[index].terrain.is_ocean() || self.tiles[index].continent != 0 {
                continue;
            }
            self.tiles[index].continent = next;
            let mut queue = VecDeque::from([start]);
            while let Some(pos) = queue.pop_front() {
                let neighbours: Vec<MapPos> = self.adjacent(pos).collect();
                for neighbour in neighbours {
                    let Some(n) = self.index_of(neighbour) else {
                        continue;
                    };
                    let tile = &mut self.tiles[n];
                    if !tile.terrain.is_ocean() && tile.continent == 0 {
                        tile.continent = next;
                        queue.push_back(neighbour);
                    }
                }
            }
            next = next.saturating_add(1);
        }
    }

    pub fn continent_at(&self, pos: MapPos) -> u16 {
        self.tile(pos).map_or(0, |t| t.continent)
    }

    pub fn add_player(&mut self, name: impl Into<String>, ai_controlled: bool) -> Result<PlayerId, WorldError> {
        if self.players.len() >= MAX_PLAYERS {
            return Err(WorldError::TooManyPlayers(MAX_PLAYERS));
        }
        let id = PlayerId(self.players.len() as u8);
        self.players.push(Player {
            id,
            name: name.into(),
            ai_controlled,
            allies: PlayerSet::empty(),
            techs: BTreeSet::new(),
            rates: TaxRates::default(),
            warmth: 0,
        });
        Ok(id)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.index())
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id.index())
    }

    /// Sets or clears a symmetric alliance.
    pub fn set_allied(&mut self, a: PlayerId, b: PlayerId, allied: bool) -> Result<(), WorldError> {
        for (from, to) in [(a, b), (b, a)] {
            let player = self.player_mut(from).ok_or(WorldError::UnknownPlayer(from))?;
            if allied {
                player.allies.insert(to);
            } else {
                player.allies.remove(to);
            }
        }
        Ok(())
    }

    /// Every player is allied with itself.
    pub fn allied(&self, a: PlayerId, b: PlayerId) -> bool {
        a == b || self.player(a).map_or(false, |p| p.allies.contains(b))
    }

    pub fn cities(&self) -> impl Iterator<Item = &City> {
        self.cities.values()
    }

    pub fn cities_of(&self, owner: PlayerId) -> impl Iterator<Item = &City> {
        self.cities.values().filter(move |c| c.owner == owner)
    }

    pub fn city(&self, id: CityId) -> Option<&City> {
        self.cities.get(&id)
    }

    pub fn city_mut(&mut self, id: CityId) -> Option<&mut City> {
        self.cities.get_mut(&id)
    }

    pub fn city_at(&self, pos: MapPos) -> Option<&City> {
        self.tile(pos)
            .and_then(|t| t.city)
            .and_then(|id| self.cities.get(&id))
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn units_of(&self, owner: PlayerId) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.owner == owner)
    }

    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.values_mut()
    }

    pub fn unit_ids_of(&self, owner: PlayerId) -> Vec<UnitId> {
        self.units_of(owner).map(|u| u.id).collect()
    }

    pub fn units_at(&self, pos: MapPos) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.pos == pos)
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn add_unit(&mut self, owner: PlayerId, kind: UnitKind, pos: MapPos) -> Result<UnitId, WorldError> {
        let ai_controlled = self
            .player(owner)
            .ok_or(WorldError::UnknownPlayer(owner))?
            .ai_controlled;
        if !self.is_on_map(pos) {
            return Err(WorldError::OffMap(pos));
        }
        let id = UnitId(self.next_unit);
        self.next_unit += 1;
        let homecity = self.city_at(pos).filter(|c| c.owner == owner).map(|c| c.id);
        self.units.insert(
            id,
            Unit {
                id,
                owner,
                kind,
                pos,
                moves_left: units::definition(kind).move_rate,
                activity: Activity::Idle,
                activity_progress: 0,
                goto_dest: None,
                role: UnitRole::None,
                ai_controlled,
                has_orders: false,
                homecity,
            },
        );
        Ok(id)
    }

    pub fn remove_unit(&mut self, id: UnitId) -> Option<Unit> {
        self.units.remove(&id)
    }

    /// Moves a unit one step and charges `cost` move fragments.
    pub fn move_unit(&mut self, id: UnitId, to: MapPos, cost: i32) -> Result<(), WorldError> {
        if !self.is_on_map(to) {
            return Err(WorldError::OffMap(to));
        }
        let unit = self.units.get_mut(&id).ok_or(WorldError::UnknownUnit(id))?;
        unit.pos = to;
        unit.moves_left = (unit.moves_left - cost).max(0);
        Ok(())
    }

    pub fn add_city(
        &mut self,
        owner: PlayerId,
        name: impl Into<String>,
        pos: MapPos,
        size: i32,
    ) -> Result<CityId, WorldError> {
        if self.player(owner).is_none() {
            return Err(WorldError::UnknownPlayer(owner));
        }
        if !self.city_can_be_built_here(pos) {
            return Err(WorldError::CityNotAllowed(pos));
        }
        let id = CityId(self.next_city);
        self.next_city += 1;
        self.cities.insert(
            id,
            City {
                id,
                owner,
                name: name.into(),
                pos,
                size: size.max(1),
                worked: BTreeSet::new(),
                has_granary: false,
                shield_bonus: 100,
                tax_bonus: 100,
                luxury_bonus: 100,
                science_bonus: 100,
                trade_want: 12,
            },
        );
        if let Some(tile) = self.tile_mut(pos) {
            tile.city = Some(id);
            if !tile.terrain.is_ocean() {
                tile.specials.insert(Specials::ROAD);
            }
        }
        self.epoch += 1;
        Ok(id)
    }

    pub fn city_can_be_built_here(&self, pos: MapPos) -> bool {
        let Some(tile) = self.tile(pos) else {
            return false;
        };
        if !tile.terrain.allows_cities() {
            return false;
        }
        let spacing = self.rules.citymindist.max(1);
        !self
            .cities
            .values()
            .any(|c| c.pos.real_dist(pos) < spacing)
    }

    /// Turns a city-founding unit into a size-1 city on its tile.
    pub fn found_city(&mut self, unit_id: UnitId, name: impl Into<String>) -> Result<CityId, WorldError> {
        let unit = self.unit(unit_id).ok_or(WorldError::UnknownUnit(unit_id))?;
        let (owner, pos) = (unit.owner, unit.pos);
        if !unit.unit_type().founds_cities || !self.city_can_be_built_here(pos) {
            return Err(WorldError::CityNotAllowed(pos));
        }
        let id = self.add_city(owner, name, pos, 1)?;
        self.units.remove(&unit_id);
        self.arrange_workers(id);
        Ok(id)
    }

    /// Fills the city's worked set with its best free tiles, one per size.
    pub fn arrange_workers(&mut self, id: CityId) {
        let Some(city) = self.cities.get(&id) else {
            return;
        };
        let mut candidates: Vec<(i32, CityOffset)> = CityOffset::work_radius()
            .filter(|offset| !offset.is_center())
            .filter(|offset| self.city_tile_use(city, *offset) != TileUse::Unavailable)
            .filter_map(|offset| {
                self.tile_output(city.tile_pos(offset))
                    .map(|out| (out.food * 3 + out.shield * 2 + out.trade, offset))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let worked: BTreeSet<CityOffset> = candidates
            .into_iter()
            .take(city.size.max(0) as usize)
            .map(|(_, offset)| offset)
            .collect();
        if let Some(city) = self.cities.get_mut(&id) {
            city.worked = worked;
        }
    }

    pub fn city_tile_use(&self, city: &City, offset: CityOffset) -> TileUse {
        let pos = city.tile_pos(offset);
        if !self.is_on_map(pos) {
            return TileUse::Unavailable;
        }
        if offset.is_center() {
            return TileUse::Center;
        }
        if city.worked.contains(&offset) {
            return TileUse::Worked;
        }
        let taken = self.cities.values().any(|other| {
            other.id != city.id
                && (other.pos == pos
                    || other
                        .offset_of(pos)
                        .map_or(false, |o| other.worked.contains(&o)))
        });
        if taken {
            return TileUse::Unavailable;
        }
        if self.units_at(pos).any(|u| !self.allied(u.owner, city.owner)) {
            return TileUse::Unavailable;
        }
        TileUse::Empty
    }

    /// Whether `unit` may start `activity` where it stands.
    pub fn can_do_activity(&self, unit: &Unit, activity: Activity) -> bool {
        let Some(tile) = self.tile(unit.pos) else {
            return false;
        };
        let utype = unit.unit_type();
        if activity.is_terrain_work() && !utype.improves_terrain {
            return false;
        }
        let rules = terrain::rules(tile.terrain);
        let knows = |flag| self.player(unit.owner).map_or(false, |p| p.knows(flag));
        let city_ok = |result: Terrain| tile.city.is_none() || result.allows_cities();
        match activity {
            Activity::Idle | Activity::Sentry | Activity::Fortified => true,
            Activity::Goto => unit.goto_dest.is_some(),
            Activity::Irrigate => match rules.irrigation_result {
                Some(result) if result != tile.terrain => city_ok(result),
                Some(_) if !tile.has(Specials::IRRIGATION) => self.has_water_source(unit.pos),
                Some(_) => {
                    !tile.has(Specials::FARMLAND)
                        && knows(TechFlag::Farmland)
                        && self.has_water_source(unit.pos)
                }
                None => false,
            },
            Activity::Mine => match rules.mining_result {
                Some(result) if result != tile.terrain => city_ok(result),
                Some(_) => !tile.has(Specials::MINE),
                None => false,
            },
            Activity::Transform => {
                let Some(result) = rules.transform_result else {
                    return false;
                };
                if !utype.transforms || result == tile.terrain || !city_ok(result) {
                    return false;
                }
                if tile.terrain.is_ocean() && !result.is_ocean() {
                    self.can_reclaim_ocean(unit.pos)
                } else if !tile.terrain.is_ocean() && result.is_ocean() {
                    self.can_channel_land(unit.pos)
                } else {
                    true
                }
            }
            Activity::Road => {
                !tile.terrain.is_ocean()
                    && !tile.has(Specials::ROAD)
                    && (!tile.has(Specials::RIVER) || knows(TechFlag::BridgeBuilding))
            }
            Activity::Railroad => {
                !tile.terrain.is_ocean()
                    && tile.has(Specials::ROAD)
                    && !tile.has(Specials::RAILROAD)
                    && knows(TechFlag::Railroad)
            }
            Activity::Pollution => tile.has(Specials::POLLUTION),
            Activity::Fallout => tile.has(Specials::FALLOUT),
        }
    }

    /// Starts `activity` for a unit, resetting its progress.
    pub fn set_activity(&mut self, id: UnitId, activity: Activity) -> Result<(), WorldError> {
        let unit = self.unit(id).ok_or(WorldError::UnknownUnit(id))?;
        if !self.can_do_activity(unit, activity) {
            return Err(WorldError::ActivityNotAllowed {
                unit: id,
                activity: activity.as_str(),
                pos: unit.pos,
            });
        }
        if let Some(unit) = self.units.get_mut(&id) {
            unit.activity = activity;
            unit.activity_progress = 0;
        }
        Ok(())
    }

    /// Applies a finished terrain activity to the unit's tile and idles it.
    pub fn complete_activity(&mut self, id: UnitId) -> Result<(), WorldError> {
        let unit = self.unit(id).ok_or(WorldError::UnknownUnit(id))?;
        let (pos, activity) = (unit.pos, unit.activity);
        if !self.can_do_activity(unit, activity) {
            // The tile changed under the unit; the work is lost.
            self.idle_unit(id);
            return Err(WorldError::ActivityNotAllowed {
                unit: id,
                activity: activity.as_str(),
                pos,
            });
        }
        let tile = self.tile(pos).ok_or(WorldError::OffMap(pos))?;
        let (current, specials) = (tile.terrain, tile.specials);
        let rules = terrain::rules(current);

        match activity {
            Activity::Irrigate => match rules.irrigation_result {
                Some(result) if result != current => self.set_terrain(pos, result)?,
                _ if specials.contains(Specials::IRRIGATION) => {
                    self.add_special(pos, Specials::FARMLAND)?
                }
                _ => {
                    self.remove_special(pos, Specials::MINE)?;
                    self.add_special(pos, Specials::IRRIGATION)?;
                }
            },
            Activity::Mine => match rules.mining_result {
                Some(result) if result != current => self.set_terrain(pos, result)?,
                _ => {
                    self.remove_special(pos, Specials::IRRIGATION | Specials::FARMLAND)?;
                    self.add_special(pos, Specials::MINE)?;
                }
            },
            Activity::Transform => {
                if let Some(result) = rules.transform_result {
                    self.set_terrain(pos, result)?;
                }
            }
            Activity::Road => self.add_special(pos, Specials::ROAD)?,
            Activity::Railroad => self.add_special(pos, Specials::ROAD | Specials::RAILROAD)?,
            Activity::Pollution => self.remove_special(pos, Specials::POLLUTION)?,
            Activity::Fallout => self.remove_special(pos, Specials::FALLOUT)?,
            Activity::Idle | Activity::Sentry | Activity::Fortified | Activity::Goto => {}
        }
        self.idle_unit(id);
        Ok(())
    }

    pub fn idle_unit(&mut self, id: UnitId) {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.activity = Activity::Idle;
            unit.activity_progress = 0;
        }
    }

    pub fn snapshot(&self, scenario: &str) -> WorldSnapshot {
        let mut improvements = ImprovementCounts::default();
        for tile in &self.tiles {
            let s = tile.specials;
            improvements.irrigated += usize::from(s.contains(Specials::IRRIGATION));
            improvements.farmland += usize::from(s.contains(Specials::FARMLAND));
            improvements.mined += usize::from(s.contains(Specials::MINE));
            improvements.roads += usize::from(s.contains(Specials::ROAD));
            improvements.railroads += usize::from(s.contains(Specials::RAILROAD));
            improvements.polluted += usize::from(s.contains(Specials::POLLUTION));
            improvements.fallout += usize::from(s.contains(Specials::FALLOUT));
        }

        let players = self
            .players
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id.0,
                name: p.name.clone(),
                ai_controlled: p.ai_controlled,
                warmth: p.warmth,
                cities: self.cities_of(p.id).count(),
                units: self.units_of(p.id).count(),
            })
            .collect();
        let cities = self
            .cities
            .values()
            .map(|c| CitySnapshot {
                id: c.id.raw(),
                owner: c.owner.0,
                name: c.name.clone(),
                x: c.pos.x,
                y: c.pos.y,
                size: c.size,
            })
            .collect();
        let units = self
            .units
            .values()
            .map(|u| UnitSnapshot {
                id: u.id.raw(),
                owner: u.owner.0,
                kind: u.kind,
                x: u.pos.x,
                y: u.pos.y,
                activity: u.activity,
                role: u.role.to_string(),
            })
            .collect();

        WorldSnapshot {
            scenario: scenario.to_string(),
            turn: self.turn,
            epoch: self.epoch,
            width: self.width,
            height: self.height,
            improvements,
            players,
            cities,
            units,
        }
    }
}
