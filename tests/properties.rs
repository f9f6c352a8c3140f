//! Property tests for discounting and speculative tile evaluation.

use proptest::prelude::*;

use autosettlers::{
    amortize,
    config::AiConfig,
    simulate::{self, SimTarget},
    terrain::Specials,
    valuation::TileWeights,
    world::{CityOffset, GameRules, MapPos, World},
};

const SYMBOLS: &[char] = &['a', 'd', 'f', 'g', 'h', 'j', 'm', 'o', 'p', 's', 't'];

fn map_rows() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(SYMBOLS), 25).prop_map(|cells| {
        let mut rows: Vec<String> = cells.chunks(5).map(|row| row.iter().collect()).collect();
        rows[2].replace_range(2..3, "g");
        rows
    })
}

proptest! {
    #[test]
    fn longer_delays_never_pay_more(benefit in 0i32..=i32::MAX, delay in 0i32..400) {
        prop_assert!(amortize(benefit, delay + 1) <= amortize(benefit, delay));
    }

    #[test]
    fn amortized_value_stays_between_zero_and_benefit(benefit in 0i32..1_000_000, delay in 0i32..400) {
        let value = amortize(benefit, delay);
        prop_assert!(value >= 0);
        prop_assert!(value <= benefit);
    }

    #[test]
    fn zero_delay_is_identity(benefit in any::<i32>().prop_filter("negatable", |b| *b != i32::MIN)) {
        prop_assert_eq!(amortize(benefit, 0), benefit);
    }

    #[test]
    fn sign_is_symmetric(benefit in 0i32..=i32::MAX, delay in 0i32..200) {
        prop_assert_eq!(amortize(-benefit, delay), -amortize(benefit, delay));
    }

    #[test]
    fn simulators_restore_every_tile(
        rows in map_rows(),
        specials in prop::collection::vec(any::<u8>(), 25),
        techs in prop::sample::subsequence(vec!["bridge_building", "railroad", "refrigeration"], 0..=3),
        ai in any::<bool>(),
    ) {
        let mut world = World::from_rows(&rows, GameRules::default()).unwrap();
        let owner = world.add_player("A", ai).unwrap();
        world.player_mut(owner).unwrap().techs =
            autosettlers::technology::with_prerequisites(techs).unwrap();
        let positions: Vec<MapPos> = world.positions().collect();
        for (pos, bits) in positions.into_iter().zip(specials) {
            let extra = Specials::from_bits_truncate(u16::from(bits));
            world.add_special(pos, extra).unwrap();
        }
        let city = world.add_city(owner, "Home", MapPos::new(2, 2), 2).unwrap();
        world.arrange_workers(city);
        let weights = TileWeights::new(&AiConfig::default(), world.rules());
        let before: Vec<_> = world
            .positions()
            .map(|p| world.tile(p).map(|t| (t.terrain, t.specials)))
            .collect();
        let epoch = world.epoch();

        for offset in CityOffset::work_radius() {
            let t = SimTarget { city, offset };
            let _ = simulate::irrigate(&mut world, &weights, t);
            let _ = simulate::mine(&mut world, &weights, t);
            let _ = simulate::transform(&mut world, &weights, t);
            let _ = simulate::road(&mut world, &weights, t);
            let _ = simulate::railroad(&mut world, &weights, t);
            let _ = simulate::clean_pollution(&mut world, &weights, t, 60);
            let _ = simulate::clean_fallout(&mut world, &weights, t, 60);
        }

        let after: Vec<_> = world
            .positions()
            .map(|p| world.tile(p).map(|t| (t.terrain, t.specials)))
            .collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(world.epoch(), epoch);
    }
}
