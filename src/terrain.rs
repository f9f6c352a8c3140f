//! Terrain rules, tile specials and tile output.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::units::Activity;

/// Turns needed to clean pollution or fallout from any land tile.
const CLEANUP_TIME: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Arctic,
    Desert,
    Forest,
    Grassland,
    Hills,
    Jungle,
    Mountains,
    Ocean,
    Plains,
    Swamp,
    Tundra,
}

bitflags! {
    /// Features layered on top of a tile's terrain.
    ///
    /// A mine never coexists with irrigation or farmland; farmland always
    /// sits on irrigation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Specials: u16 {
        const ROAD = 1 << 0;
        const IRRIGATION = 1 << 1;
        const RAILROAD = 1 << 2;
        const MINE = 1 << 3;
        const POLLUTION = 1 << 4;
        const FARMLAND = 1 << 5;
        const FALLOUT = 1 << 6;
        const RIVER = 1 << 7;
    }
}

impl Specials {
    /// The subset of these specials that stays valid once the tile becomes
    /// `terrain`.
    pub fn retained_on(self, terrain: Terrain) -> Specials {
        let rules = rules(terrain);
        let mut kept = self;
        if rules.mining_result != Some(terrain) {
            kept.remove(Specials::MINE);
        }
        if rules.irrigation_result != Some(terrain) {
            kept.remove(Specials::IRRIGATION | Specials::FARMLAND);
        }
        if rules.is_ocean {
            kept.remove(Specials::ROAD | Specials::RAILROAD);
        }
        kept
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TerrainRules {
    pub terrain: Terrain,
    pub name: &'static str,
    pub symbol: char,
    pub food: i32,
    pub shield: i32,
    pub trade: i32,
    pub movement_cost: i32,
    pub road_time: i32,
    pub road_trade_incr: i32,
    pub rail_time: i32,
    pub irrigation_result: Option<Terrain>,
    pub irrigation_food_incr: i32,
    pub irrigation_time: i32,
    pub mining_result: Option<Terrain>,
    pub mining_shield_incr: i32,
    pub mining_time: i32,
    pub transform_result: Option<Terrain>,
    pub transform_time: i32,
    pub is_ocean: bool,
    pub no_cities: bool,
}

const TERRAIN_TABLE: &[TerrainRules] = &[
    TerrainRules {
        terrain: Terrain::Arctic,
        name: "Arctic",
        symbol: 'a',
        food: 0,
        shield: 0,
        trade: 0,
        movement_cost: 2,
        road_time: 4,
        road_trade_incr: 0,
        rail_time: 4,
        irrigation_result: None,
        irrigation_food_incr: 0,
        irrigation_time: 0,
        mining_result: Some(Terrain::Arctic),
        mining_shield_incr: 1,
        mining_time: 10,
        transform_result: Some(Terrain::Tundra),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Desert,
        name: "Desert",
        symbol: 'd',
        food: 0,
        shield: 1,
        trade: 0,
        movement_cost: 1,
        road_time: 2,
        road_trade_incr: 1,
        rail_time: 3,
        irrigation_result: Some(Terrain::Desert),
        irrigation_food_incr: 1,
        irrigation_time: 5,
        mining_result: Some(Terrain::Desert),
        mining_shield_incr: 1,
        mining_time: 5,
        transform_result: Some(Terrain::Plains),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Forest,
        name: "Forest",
        symbol: 'f',
        food: 1,
        shield: 2,
        trade: 0,
        movement_cost: 2,
        road_time: 4,
        road_trade_incr: 0,
        rail_time: 3,
        irrigation_result: Some(Terrain::Plains),
        irrigation_food_incr: 0,
        irrigation_time: 5,
        mining_result: Some(Terrain::Swamp),
        mining_shield_incr: 0,
        mining_time: 15,
        transform_result: Some(Terrain::Grassland),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Grassland,
        name: "Grassland",
        symbol: 'g',
        food: 2,
        shield: 0,
        trade: 0,
        movement_cost: 1,
        road_time: 2,
        road_trade_incr: 1,
        rail_time: 3,
        irrigation_result: Some(Terrain::Grassland),
        irrigation_food_incr: 1,
        irrigation_time: 5,
        mining_result: Some(Terrain::Forest),
        mining_shield_incr: 0,
        mining_time: 10,
        transform_result: Some(Terrain::Hills),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Hills,
        name: "Hills",
        symbol: 'h',
        food: 1,
        shield: 0,
        trade: 0,
        movement_cost: 2,
        road_time: 4,
        road_trade_incr: 0,
        rail_time: 3,
        irrigation_result: Some(Terrain::Hills),
        irrigation_food_incr: 1,
        irrigation_time: 10,
        mining_result: Some(Terrain::Hills),
        mining_shield_incr: 3,
        mining_time: 10,
        transform_result: Some(Terrain::Plains),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Jungle,
        name: "Jungle",
        symbol: 'j',
        food: 1,
        shield: 0,
        trade: 0,
        movement_cost: 2,
        road_time: 4,
        road_trade_incr: 0,
        rail_time: 4,
        irrigation_result: Some(Terrain::Grassland),
        irrigation_food_incr: 0,
        irrigation_time: 15,
        mining_result: Some(Terrain::Forest),
        mining_shield_incr: 0,
        mining_time: 15,
        transform_result: Some(Terrain::Plains),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Mountains,
        name: "Mountains",
        symbol: 'm',
        food: 0,
        shield: 1,
        trade: 0,
        movement_cost: 3,
        road_time: 6,
        road_trade_incr: 0,
        rail_time: 4,
        irrigation_result: None,
        irrigation_food_incr: 0,
        irrigation_time: 0,
        mining_result: Some(Terrain::Mountains),
        mining_shield_incr: 2,
        mining_time: 10,
        transform_result: Some(Terrain::Hills),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Ocean,
        name: "Ocean",
        symbol: 'o',
        food: 1,
        shield: 0,
        trade: 2,
        movement_cost: 1,
        road_time: 0,
        road_trade_incr: 0,
        rail_time: 0,
        irrigation_result: None,
        irrigation_food_incr: 0,
        irrigation_time: 0,
        mining_result: None,
        mining_shield_incr: 0,
        mining_time: 0,
        transform_result: Some(Terrain::Swamp),
        transform_time: 36,
        is_ocean: true,
        no_cities: true,
    },
    TerrainRules {
        terrain: Terrain::Plains,
        name: "Plains",
        symbol: 'p',
        food: 1,
        shield: 1,
        trade: 0,
        movement_cost: 1,
        road_time: 2,
        road_trade_incr: 1,
        rail_time: 3,
        irrigation_result: Some(Terrain::Plains),
        irrigation_food_incr: 1,
        irrigation_time: 5,
        mining_result: Some(Terrain::Forest),
        mining_shield_incr: 0,
        mining_time: 15,
        transform_result: Some(Terrain::Grassland),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Swamp,
        name: "Swamp",
        symbol: 's',
        food: 1,
        shield: 0,
        trade: 0,
        movement_cost: 2,
        road_time: 4,
        road_trade_incr: 0,
        rail_time: 4,
        irrigation_result: None,
        irrigation_food_incr: 0,
        irrigation_time: 0,
        mining_result: Some(Terrain::Forest),
        mining_shield_incr: 0,
        mining_time: 15,
        transform_result: Some(Terrain::Plains),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
    TerrainRules {
        terrain: Terrain::Tundra,
        name: "Tundra",
        symbol: 't',
        food: 1,
        shield: 0,
        trade: 0,
        movement_cost: 1,
        road_time: 2,
        road_trade_incr: 0,
        rail_time: 3,
        irrigation_result: Some(Terrain::Tundra),
        irrigation_food_incr: 1,
        irrigation_time: 5,
        mining_result: None,
        mining_shield_incr: 0,
        mining_time: 0,
        transform_result: Some(Terrain::Desert),
        transform_time: 24,
        is_ocean: false,
        no_cities: false,
    },
];

pub fn rules(terrain: Terrain) -> &'static TerrainRules {
    // The table is declared in enum order.
    &TERRAIN_TABLE[terrain as usize]
}

impl Terrain {
    pub fn from_symbol(symbol: char) -> Option<Terrain> {
        TERRAIN_TABLE
            .iter()
            .find(|rules| rules.symbol == symbol.to_ascii_lowercase())
            .map(|rules| rules.terrain)
    }

    pub fn is_ocean(self) -> bool {
        rules(self).is_ocean
    }

    pub fn allows_cities(self) -> bool {
        !rules(self).no_cities
    }
}

impl TerrainRules {
    /// Base number of worker-turns `activity` takes on this terrain, or zero
    /// when the activity cannot be performed here.
    pub fn activity_time(&self, activity: Activity) -> i32 {
        match activity {
            Activity::Irrigate => {
                if self.irrigation_result.is_some() {
                    self.irrigation_time
                } else {
                    0
                }
            }
            Activity::Mine => {
                if self.mining_result.is_some() {
                    self.mining_time
                } else {
                    0
                }
            }
            Activity::Transform => {
                if self.transform_result.is_some() {
                    self.transform_time
                } else {
                    0
                }
            }
            Activity::Road => self.road_time,
            Activity::Railroad => self.rail_time,
            Activity::Pollution | Activity::Fallout => {
                if self.is_ocean {
                    0
                } else {
                    CLEANUP_TIME
                }
            }
            Activity::Idle
            | Activity::Sentry
            | Activity::Fortified
            | Activity::Goto => 0,
        }
    }
}

/// Food, shields and trade a tile yields to the city working it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileOutput {
    pub food: i32,
    pub shield: i32,
    pub trade: i32,
}

impl TileOutput {
    pub fn for_tile(terrain: Terrain, specials: Specials) -> Self {
        let rules = rules(terrain);
        let mut out = TileOutput {
            food: rules.food,
            shield: rules.shield,
            trade: rules.trade,
        };

        if specials.contains(Specials::RIVER) {
            out.trade += 1;
        }
        if specials.contains(Specials::IRRIGATION) && rules.irrigation_result == Some(terrain) {
            out.food += rules.irrigation_food_incr;
            if specials.contains(Specials::FARMLAND) {
                out.food += out.food / 2;
            }
        }
        if specials.contains(Specials::MINE) && rules.mining_result == Some(terrain) {
            out.shield += rules.mining_shield_incr;
        }
        if specials.contains(Specials::ROAD) {
            out.trade += rules.road_trade_incr;
        }
        if specials.contains(Specials::RAILROAD) {
            out.shield += out.shield / 2;
        }
        if specials.contains(Specials::POLLUTION) {
            out.halve();
        }
        if specials.contains(Specials::FALLOUT) {
            out.halve();
        }
        out
    }

    fn halve(&mut self) {
        self.food -= self.food / 2;
        self.shield -= self.shield / 2;
        self.trade -= self.trade / 2;
    }
}
