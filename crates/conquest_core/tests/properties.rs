//! Property tests for the resolution invariants.

use conquest_core::casualties;
use conquest_core::combat::resolve_battle;
use conquest_core::math::apply_basis_points;
use conquest_core::prelude::*;
use conquest_test_utils::determinism::serialized_hash;
use conquest_test_utils::determinism::strategies::{arb_battle, arb_turns, arb_units};
use conquest_test_utils::proptest::prelude::*;

fn resolve(attacker: &Army, defender: &Army, turns: u32, seed: u64) -> BattleOutcome {
    resolve_battle(
        &Ruleset::default(),
        attacker,
        defender,
        turns,
        &mut RngSource::from_seed(seed),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn battles_are_deterministic(
        (attacker, defender) in arb_battle(2_000),
        turns in arb_turns(),
        seed in any::<u64>(),
    ) {
        let first = resolve(&attacker, &defender, turns, seed);
        let second = resolve(&attacker, &defender, turns, seed);
        prop_assert_eq!(serialized_hash(&first), serialized_hash(&second));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn losses_never_exceed_rows(
        (attacker, defender) in arb_battle(2_000),
        turns in arb_turns(),
        seed in any::<u64>(),
    ) {
        let outcome = resolve(&attacker, &defender, turns, seed);
        for (army, losses) in [
            (&attacker, &outcome.attacker_losses),
            (&defender, &outcome.defender_losses),
        ] {
            for loss in losses {
                prop_assert!(loss.quantity <= army.quantity(loss.unit, loss.level));
            }
        }
        prop_assert!(outcome.attacker_losses.iter().all(|row| row.unit == UnitType::Offense));
    }

    #[test]
    fn fort_stays_in_bounds(
        (attacker, defender) in arb_battle(2_000),
        turns in arb_turns(),
        seed in any::<u64>(),
    ) {
        let ruleset = Ruleset::default();
        let outcome = resolve(&attacker, &defender, turns, seed);
        let max = ruleset.fort_max_hitpoints(defender.structures.fort_level);
        prop_assert!(outcome.fort_hitpoints_before <= max);
        prop_assert!(outcome.fort_hitpoints_after <= outcome.fort_hitpoints_before);
    }

    #[test]
    fn pillage_is_bounded(
        (attacker, defender) in arb_battle(2_000),
        turns in arb_turns(),
        seed in any::<u64>(),
    ) {
        let ruleset = Ruleset::default();
        let outcome = resolve(&attacker, &defender, turns, seed);
        let cap = apply_basis_points(defender.gold, ruleset.combat.max_pillage_bp);
        prop_assert!(outcome.gold_pillaged <= defender.gold.min(cap));
        if outcome.winner_id == defender.owner {
            prop_assert_eq!(outcome.gold_pillaged, 0);
        }
    }

    #[test]
    fn rounds_are_bounded(
        (attacker, defender) in arb_battle(2_000),
        turns in arb_turns(),
        seed in any::<u64>(),
    ) {
        let ruleset = Ruleset::default();
        let outcome = resolve(&attacker, &defender, turns, seed);
        prop_assert!(outcome.turns_resolved <= turns.min(ruleset.combat.round_ceiling));
        prop_assert_eq!(outcome.log.len(), outcome.turns_resolved as usize);
    }

    #[test]
    fn allocation_sums_to_request(
        rows in arb_units(500),
        requested in 0u64..5_000,
    ) {
        let available = casualties::total(&rows);
        let losses = casualties::allocate(&rows, requested);
        prop_assert_eq!(casualties::total(&losses), requested.min(available));
        for loss in &losses {
            let row = rows
                .iter()
                .find(|r| r.unit == loss.unit && r.level == loss.level)
                .unwrap();
            prop_assert!(loss.quantity <= row.quantity);
        }
    }

    #[test]
    fn aggregation_ignores_row_order(
        (attacker, _) in arb_battle(2_000),
    ) {
        let ruleset = Ruleset::default();
        let mut reversed = attacker.clone();
        reversed.units.reverse();
        reversed.items.reverse();
        reversed.upgrades.reverse();
        prop_assert_eq!(
            conquest_core::stats::aggregate(&ruleset, &attacker),
            conquest_core::stats::aggregate(&ruleset, &reversed)
        );
    }
}
