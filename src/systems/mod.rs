mod activity;
mod auto_settlers;

pub use activity::ActivitySystem;
pub use auto_settlers::{AutoSettlerReport, AutoSettlerSystem, CityWant};
