pub mod amortize;
pub mod collab;
pub mod config;
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
pub mod infra_cache;
pub mod rng;
pub mod road_bonus;
pub mod role;
pub mod scenario;
pub mod simulate;
pub mod snapshot;
pub mod systems;
pub mod technology;
pub mod terrain;
pub mod territory;
pub mod units;
pub mod valuation;
pub mod world;

pub use amortize::amortize;
pub use config::AiConfig;
pub use engine::{Engine, EngineBuilder, EngineSettings, TurnSummary};
pub use error::WorldError;
pub use scenario::{Scenario, ScenarioLoader};
pub use world::World;
