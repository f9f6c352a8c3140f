use serde::Deserialize;

fn default_food_weighting() -> i32 {
    19
}

fn default_shield_weighting() -> i32 {
    17
}

fn default_threshold() -> i32 {
    12
}

fn default_warming_factor() -> i32 {
    50
}

fn default_road_slow_threshold() -> i32 {
    5
}

fn default_city_territory_radius() -> i32 {
    3
}

fn default_max_city_size() -> i32 {
    32
}

fn default_site_search_radius() -> i32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Tuning for settler and worker automation.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Relative worth of one food, before the city-size table is applied.
    #[serde(default = "default_food_weighting")]
    pub food_weighting: i32,
    #[serde(default = "default_shield_weighting")]
    pub shield_weighting: i32,
    /// Farthest a worker travels for a job, in turns of movement.
    #[serde(default = "default_threshold")]
    pub threshold: i32,
    #[serde(default = "default_warming_factor")]
    pub warming_factor: i32,
    /// Road build times above this make a neighbour a slow connector.
    #[serde(default = "default_road_slow_threshold")]
    pub road_slow_threshold: i32,
    #[serde(default = "default_city_territory_radius")]
    pub city_territory_radius: i32,
    #[serde(default = "default_max_city_size")]
    pub max_city_size: i32,
    #[serde(default = "default_site_search_radius")]
    pub site_search_radius: i32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            food_weighting: default_food_weighting(),
            shield_weighting: default_shield_weighting(),
            threshold: default_threshold(),
            warming_factor: default_warming_factor(),
            road_slow_threshold: default_road_slow_threshold(),
            city_territory_radius: default_city_territory_radius(),
            max_city_size: default_max_city_size(),
            site_search_radius: default_site_search_radius(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
