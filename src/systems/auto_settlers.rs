use anyhow::Result;
use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::{debug, info};

use crate::{
    collab::{
        CitySiteScorer, GridPathfinder, Pathfinder, RadiusSiteScorer, ReservationBook,
        TileReservations,
    },
    config::AiConfig,
    context::SettlerContext,
    decision::{contemplate_new_city, contemplate_terrain_improvements, FounderWant},
    engine::{System, SystemContext},
    infra_cache::InfrastructureCache,
    rng::SystemRng,
    role::SettlerDispatcher,
    territory::clear_and_reassign_tile_claims,
    units::Activity,
    world::{CityId, PlayerId, World},
};

/// How much a city wants new settler-type units, recomputed each turn for
/// computer players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CityWant {
    pub city: CityId,
    pub founder: Option<FounderWant>,
    pub worker: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoSettlerReport {
    pub turn: u64,
    pub player_order: Vec<PlayerId>,
    pub dispatched: usize,
    pub cities_founded: usize,
    pub activities_started: usize,
    pub founding_failures: usize,
    pub city_wants: Vec<CityWant>,
}

/// Runs every automated settler, player by player in a shuffled order.
pub struct AutoSettlerSystem {
    config: AiConfig,
    ctx: Option<SettlerContext>,
    cache: InfrastructureCache,
    pathfinder: Box<dyn Pathfinder>,
    sites: Box<dyn CitySiteScorer>,
    reservations: Box<dyn TileReservations>,
    last_report: Option<AutoSettlerReport>,
}

impl AutoSettlerSystem {
    pub fn new(config: AiConfig) -> Self {
        let radius = config.site_search_radius;
        Self::with_collaborators(
            config,
            Box::new(GridPathfinder::new()),
            Box::new(RadiusSiteScorer::new(radius)),
            Box::new(ReservationBook::new()),
        )
    }

    pub fn with_collaborators(
        config: AiConfig,
        pathfinder: Box<dyn Pathfinder>,
        sites: Box<dyn CitySiteScorer>,
        reservations: Box<dyn TileReservations>,
    ) -> Self {
        Self {
            config,
            ctx: None,
            cache: InfrastructureCache::new(),
            pathfinder,
            sites,
            reservations,
            last_report: None,
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn cache(&self) -> &InfrastructureCache {
        &self.cache
    }

    pub fn last_report(&self) -> Option<&AutoSettlerReport> {
        self.last_report.as_ref()
    }

    fn context(&mut self, world: &World) -> &mut SettlerContext {
        let config = &self.config;
        let ctx = self
            .ctx
            .get_or_insert_with(|| SettlerContext::new(config.clone(), world));
        ctx.sync_with(world);
        ctx
    }

    pub fn rebuild_infrastructure_cache(&mut self, world: &mut World, player: PlayerId) {
        let weights = self.context(world).weights.clone();
        self.cache.rebuild(world, &weights, player);
    }

    pub fn run_turn(&mut self, world: &mut World, rng: &mut impl RngCore) -> AutoSettlerReport {
        let mut report = AutoSettlerReport {
            turn: world.turn(),
            ..AutoSettlerReport::default()
        };
        let mut order = world.player_ids();
        order.shuffle(rng);
        report.player_order = order.clone();

        clear_and_reassign_tile_claims(world, &order);
        self.reservations.retain_live(world);
        self.context(world).refresh(world);
        let Some(ctx) = self.ctx.as_ref() else {
            return report;
        };

        let climate = world.climate();
        let warmth = self.config.warming_factor
            * if climate.heating > climate.warming_level {
                2
            } else {
                1
            };

        for player in order {
            self.cache.rebuild(world, &ctx.weights, player);
            let Some(ai) = world.player_mut(player).map(|p| {
                p.warmth = warmth;
                p.ai_controlled
            }) else {
                continue;
            };

            let mut dispatcher = SettlerDispatcher::new(
                world,
                ctx,
                &mut self.cache,
                self.pathfinder.as_mut(),
                self.sites.as_ref(),
                self.reservations.as_mut(),
            );
            for id in dispatcher.world().unit_ids_of(player) {
                let Some(unit) = dispatcher.world().unit(id) else {
                    continue;
                };
                if !(unit.ai_controlled || ai) || !unit.unit_type().is_settler() || unit.has_orders {
                    continue;
                }
                let idle = match unit.activity {
                    Activity::Sentry => true,
                    Activity::Goto => unit.moves_left > 0,
                    Activity::Idle => true,
                    _ => false,
                };
                if !idle {
                    continue;
                }
                dispatcher.world_mut().idle_unit(id);

                let outcome = dispatcher.dispatch(id);
                report.dispatched += 1;
                report.cities_founded += usize::from(outcome.founded.is_some());
                report.activities_started += usize::from(outcome.started.is_some());
                report.founding_failures += usize::from(outcome.founding_failed);
            }

            if ai {
                let cities: Vec<CityId> = world.cities_of(player).map(|c| c.id).collect();
                for city in cities {
                    let founder = contemplate_new_city(
                        world,
                        self.sites.as_ref(),
                        self.reservations.as_ref(),
                        city,
                    );
                    let worker = contemplate_terrain_improvements(
                        world,
                        ctx,
                        &mut self.cache,
                        self.pathfinder.as_ref(),
                        city,
                    );
                    report.city_wants.push(CityWant {
                        city,
                        founder,
                        worker,
                    });
                }
            }

            info!(
                turn = report.turn,
                player = %player,
                warmth,
                "auto settlers done for player"
            );
        }

        debug!(
            turn = report.turn,
            dispatched = report.dispatched,
            founded = report.cities_founded,
            started = report.activities_started,
            failures = report.founding_failures,
            "auto settler turn"
        );
        report
    }
}

impl Default for AutoSettlerSystem {
    fn default() -> Self {
        Self::new(AiConfig::default())
    }
}

impl System for AutoSettlerSystem {
    fn name(&self) -> &str {
        "auto_settlers"
    }

    fn run(&mut self, _ctx: &SystemContext, world: &mut World, rng: &mut SystemRng<'_>) -> Result<()> {
        let report = self.run_turn(world, rng);
        self.last_report = Some(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::UnitRole;
    use crate::units::UnitKind;
    use crate::world::{Climate, GameRules, MapPos};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world() -> World {
        let rows = [
            "ooooooooo",
            "ogggggggo",
            "oggpggggo",
            "ogggghggo",
            "ogggggggo",
            "ooooooooo",
        ];
        World::from_rows(&rows, GameRules::default()).unwrap()
    }

    #[test]
    fn warmth_doubles_when_heating_passes_the_warming_level() {
        let mut world = world();
        let a = world.add_player("A", true).unwrap();
        let mut system = AutoSettlerSystem::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        system.run_turn(&mut world, &mut rng);
        assert_eq!(world.player(a).unwrap().warmth, 50);

        world.set_climate(Climate {
            heating: 5,
            warming_level: 3,
        });
        system.run_turn(&mut world, &mut rng);
        assert_eq!(world.player(a).unwrap().warmth, 100);
    }

    #[test]
    fn units_with_orders_and_busy_units_are_left_alone() {
        let mut world = world();
        let a = world.add_player("A", true).unwrap();
        let city = world.add_city(a, "Home", MapPos::new(2, 2), 2).unwrap();
        world.arrange_workers(city);
        let ordered = world.add_unit(a, UnitKind::Settlers, MapPos::new(2, 2)).unwrap();
        world.unit_mut(ordered).unwrap().has_orders = true;
        let fortified = world.add_unit(a, UnitKind::Settlers, MapPos::new(3, 3)).unwrap();
        world.unit_mut(fortified).unwrap().activity = Activity::Fortified;
        let warrior = world.add_unit(a, UnitKind::Warriors, MapPos::new(4, 2)).unwrap();

        let mut system = AutoSettlerSystem::default();
        let report = system.run_turn(&mut world, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(report.dispatched, 0);
        for id in [ordered, fortified, warrior] {
            assert_eq!(world.unit(id).unwrap().role, UnitRole::None);
        }
        assert_eq!(report.city_wants.len(), 1);
    }

    #[test]
    fn sentried_settlers_get_work() {
        let mut world = world();
        let a = world.add_player("A", true).unwrap();
        let city = world.add_city(a, "Home", MapPos::new(2, 2), 3).unwrap();
        world.arrange_workers(city);
        let worker = world.add_unit(a, UnitKind::Workers, MapPos::new(2, 2)).unwrap();
        world.unit_mut(worker).unwrap().activity = Activity::Sentry;

        let mut system = AutoSettlerSystem::default();
        let report = system.run_turn(&mut world, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(report.dispatched, 1);
        let unit = world.unit(worker).unwrap();
        assert!(matches!(unit.role, UnitRole::AutoImprove { target: Some(_), .. }));
        assert_ne!(unit.activity, Activity::Sentry);
        assert!(system.cache().is_fresh(a, world.epoch()));
    }

    #[test]
    fn player_order_follows_the_seed() {
        let mut world_a = world();
        let mut world_b = world();
        for i in 0..6 {
            world_a.add_player(format!("p{i}"), true).unwrap();
            world_b.add_player(format!("p{i}"), true).unwrap();
        }
        let mut system = AutoSettlerSystem::default();
        let a = system.run_turn(&mut world_a, &mut ChaCha8Rng::seed_from_u64(11));
        let b = system.run_turn(&mut world_b, &mut ChaCha8Rng::seed_from_u64(11));
        assert_eq!(a.player_order, b.player_order);
        assert_eq!(a.player_order.len(), 6);
    }
}
