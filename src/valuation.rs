//! What a tile is worth to the city working it.

use crate::config::AiConfig;
use crate::world::{City, CityOffset, GameRules, TileUse, World};

/// Shortfalls the valuation should favour covering. Yield that covers a
/// shortfall counts ten times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YieldNeed {
    pub food: i32,
    pub shield: i32,
}

impl YieldNeed {
    pub const NONE: YieldNeed = YieldNeed { food: 0, shield: 0 };
}

/// Per-yield weights: food by city size, shields flat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileWeights {
    food: Vec<i32>,
    shield: i32,
    foodbox: i32,
}

impl TileWeights {
    /// Food is worth more to a city that needs little to grow. Size 1 is
    /// marked down to three quarters since such cities rarely stay that
    /// small.
    pub fn new(config: &AiConfig, rules: &GameRules) -> Self {
        let foodbox = rules.foodbox.max(1);
        let food = (1..config.max_city_size.max(2))
            .map(|size| {
                let growth = (rules.granary_size(size) / foodbox).max(1);
                let weight = 4 * config.food_weighting / growth;
                if size == 1 {
                    weight * 3 / 4
                } else {
                    weight
                }
            })
            .collect();
        Self {
            food,
            shield: config.shield_weighting,
            foodbox: rules.foodbox,
        }
    }

    pub fn food_weighting(&self, size: i32) -> i32 {
        let last = self.food.len().saturating_sub(1);
        let index = (size.max(1) as usize - 1).min(last);
        self.food.get(index).copied().unwrap_or(0)
    }

    pub fn shield_weighting(&self) -> i32 {
        self.shield
    }

    /// Foodbox the table was built for.
    pub fn foodbox(&self) -> i32 {
        self.foodbox
    }
}

pub fn city_tile_value(
    world: &World,
    weights: &TileWeights,
    city: &City,
    offset: CityOffset,
    need: YieldNeed,
) -> i32 {
    let Some(out) = world.tile_output(city.tile_pos(offset)) else {
        return 0;
    };

    let mut food = out.food;
    if need.food > 0 {
        food += 9 * out.food.min(need.food);
    }
    let food = food * weights.food_weighting(city.size);

    let mut shield = out.shield;
    if need.shield > 0 {
        shield += 9 * out.shield.min(need.shield);
    }
    let shield = shield * weights.shield_weighting() * city.shield_bonus / 100;

    let rates = world
        .player(city.owner)
        .map(|p| p.rates)
        .unwrap_or_default();
    let blend = city.tax_bonus * rates.tax
        + city.luxury_bonus * rates.luxury
        + city.science_bonus * rates.science;
    let trade = out.trade * city.trade_want * blend / 10_000;

    food + shield + trade
}

/// Best value among the tiles the city works or could work.
pub fn best_worker_tile_value(world: &World, weights: &TileWeights, city: &City) -> i32 {
    CityOffset::work_radius()
        .filter(|offset| {
            matches!(
                world.city_tile_use(city, *offset),
                TileUse::Center | TileUse::Worked | TileUse::Empty
            )
        })
        .map(|offset| city_tile_value(world, weights, city, offset, YieldNeed::NONE))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::Terrain;
    use crate::world::MapPos;

    fn weights() -> TileWeights {
        TileWeights::new(&AiConfig::default(), &GameRules::default())
    }

    #[test]
    fn size_one_is_marked_down() {
        let weights = weights();
        // 4 * 19 / (20 / 10) = 38, marked down to 28.
        assert_eq!(weights.food_weighting(1), 28);
        // 4 * 19 / (30 / 10) = 25.
        assert_eq!(weights.food_weighting(2), 25);
        assert_eq!(weights.food_weighting(0), 28);
        assert_eq!(weights.food_weighting(500), weights.food_weighting(31));
    }

    #[test]
    fn grassland_value_for_small_city() {
        let mut world = World::from_rows(&["ggggg", "ggggg", "ggggg"], GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let id = world.add_city(owner, "Home", MapPos::new(2, 1), 1).unwrap();
        let city = world.city(id).unwrap();
        let offset = CityOffset::new(1, 0).unwrap();
        let value = city_tile_value(&world, &weights(), city, offset, YieldNeed::NONE);
        assert_eq!(value, 2 * 28);

        let needy = city_tile_value(
            &world,
            &weights(),
            city,
            offset,
            YieldNeed { food: 1, shield: 0 },
        );
        assert_eq!(needy, (2 + 9) * 28);
    }

    #[test]
    fn trade_uses_rates_and_bonuses() {
        let mut world = World::from_rows(&["ooooo", "ogggo", "ooooo"], GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let id = world.add_city(owner, "Port", MapPos::new(2, 1), 3).unwrap();
        let city = world.city(id).unwrap();
        let ocean = CityOffset::new(0, 1).unwrap();
        // ocean: 1 food, 2 trade; trade_want 12, rates sum to 100%.
        let expected = weights().food_weighting(3) + 2 * 12;
        assert_eq!(
            city_tile_value(&world, &weights(), city, ocean, YieldNeed::NONE),
            expected
        );
        assert_eq!(world.tile(MapPos::new(2, 2)).map(|t| t.terrain), Some(Terrain::Ocean));
    }

    #[test]
    fn best_worker_value_ignores_unavailable_tiles() {
        let mut world = World::from_rows(&["hgh"], GameRules::default()).unwrap();
        let owner = world.add_player("A", true).unwrap();
        let id = world.add_city(owner, "Ridge", MapPos::new(1, 0), 1).unwrap();
        let city = world.city(id).unwrap();
        // The center grassland gets a road: 2 food and 1 trade.
        let best = best_worker_tile_value(&world, &weights(), city);
        assert_eq!(best, 2 * 28 + 12);
    }
}
