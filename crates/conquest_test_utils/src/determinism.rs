//! Determinism testing utilities.
//!
//! Provides a harness for verifying that battle resolution produces
//! identical outcomes given identical inputs and seed.
//!
//! # Testing Strategy
//!
//! Sources of non-determinism the harness guards against:
//!
//! - **Floating-point math**: rates are fixed-point via
//!   [`conquest_core::math::Fixed`], power and gold are integers.
//! - **System randomness**: every roll comes from a seeded
//!   [`conquest_core::rng::RngSource`].
//! - **HashMap iteration order**: outcomes hold sorted `Vec`s only.
//!
//! Outcomes are compared by hashing their bincode bytes, so two outcomes
//! hash equal only if they serialize byte-identically.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use conquest_core::army::Army;
use conquest_core::combat::{resolve_battle, BattleOutcome};
use conquest_core::rng::RngSource;
use conquest_core::ruleset::Ruleset;
use serde::Serialize;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>) -> Self {
        let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
        if !is_deterministic {
            tracing::warn!(?hashes, "runs diverged");
        }
        Self {
            is_deterministic,
            hashes,
        }
    }

    /// Get all unique hashes (should be 1 for a deterministic resolution).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Resolution is non-deterministic!\n\
                 Runs: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run `run` several times and compare the hashes of its results.
///
/// # Example
///
/// ```
/// use conquest_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, || 40 + 2);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<T, F>(runs: usize, run: F) -> DeterminismResult
where
    T: Serialize,
    F: Fn() -> T,
{
    DeterminismResult::from_hashes((0..runs).map(|_| serialized_hash(&run())).collect())
}

/// Resolve the same battle `runs` times sequentially.
///
/// # Panics
///
/// Panics if the battle request is invalid.
#[must_use]
pub fn verify_battle_determinism(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    turns: u32,
    seed: u64,
    runs: usize,
) -> DeterminismResult {
    verify_determinism(runs, || battle(ruleset, attacker, defender, turns, seed))
}

/// Resolve the same battle on `threads` scoped threads at once.
///
/// # Panics
///
/// Panics if the battle request is invalid or a thread panics.
#[must_use]
pub fn run_parallel_battles(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    turns: u32,
    seed: u64,
    threads: usize,
) -> DeterminismResult {
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| serialized_hash(&battle(ruleset, attacker, defender, turns, seed)))
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    DeterminismResult::from_hashes(hashes)
}

fn battle(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    turns: u32,
    seed: u64,
) -> BattleOutcome {
    resolve_battle(
        ruleset,
        attacker,
        defender,
        turns,
        &mut RngSource::from_seed(seed),
    )
    .unwrap()
}

/// Hash of a value's bincode bytes.
///
/// # Panics
///
/// Panics if the value cannot be serialized.
pub fn serialized_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = bincode::serialize(value).unwrap();
    compute_hash(&bytes)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for resolution testing.
///
/// These generate armies within the default ruleset's tables, so every
/// generated army passes validation.
pub mod strategies {
    use conquest_core::army::{
        Army, BattleUpgradeRow, BonusPoints, BonusType, Class, ItemRow, ItemType, ItemUsage,
        PlayerId, Race, Role, StructureState, UnitRow, UnitType,
    };
    use conquest_core::ruleset::Ruleset;
    use proptest::prelude::*;

    /// Any race.
    pub fn arb_race() -> impl Strategy<Value = Race> {
        prop_oneof![
            Just(Race::Human),
            Just(Race::Elf),
            Just(Race::Goblin),
            Just(Race::Undead),
        ]
    }

    /// Any class.
    pub fn arb_class() -> impl Strategy<Value = Class> {
        prop_oneof![
            Just(Class::Fighter),
            Just(Class::Cleric),
            Just(Class::Thief),
            Just(Class::Assassin),
        ]
    }

    /// Unit level 1-3.
    pub fn arb_level() -> impl Strategy<Value = u8> {
        1u8..=3u8
    }

    /// One quantity per (type, level) row of the unit table.
    pub fn arb_units(max_per_row: u64) -> impl Strategy<Value = Vec<UnitRow>> {
        proptest::collection::vec(0..=max_per_row, 14).prop_map(|quantities| {
            let mut slots = vec![(UnitType::Citizen, 1), (UnitType::Worker, 1)];
            for unit in [
                UnitType::Offense,
                UnitType::Defense,
                UnitType::Spy,
                UnitType::Sentry,
            ] {
                slots.extend((1..=3).map(|level| (unit, level)));
            }
            slots
                .into_iter()
                .zip(quantities)
                .filter(|(_, quantity)| *quantity > 0)
                .map(|((unit, level), quantity)| UnitRow::new(unit, level, quantity))
                .collect()
        })
    }

    /// A few item rows, each slot and usage at most once.
    pub fn arb_items(max_quantity: u64) -> impl Strategy<Value = Vec<ItemRow>> {
        let slot = prop_oneof![
            Just(ItemType::Weapon),
            Just(ItemType::Helm),
            Just(ItemType::Armor),
            Just(ItemType::Boots),
            Just(ItemType::Bracers),
            Just(ItemType::Shield),
        ];
        let usage = prop_oneof![Just(ItemUsage::Offense), Just(ItemUsage::Defense)];
        proptest::collection::vec((slot, usage, arb_level(), 1..=max_quantity), 0..4).prop_map(
            |rows| {
                let mut items: Vec<ItemRow> = Vec::new();
                for (item, usage, level, quantity) in rows {
                    if !items
                        .iter()
                        .any(|r| r.item == item && r.usage == usage && r.level == level)
                    {
                        items.push(ItemRow::new(item, usage, level, quantity));
                    }
                }
                items
            },
        )
    }

    /// A few battle upgrade rows, each role and level at most once.
    pub fn arb_upgrades(max_quantity: u64) -> impl Strategy<Value = Vec<BattleUpgradeRow>> {
        let role = prop_oneof![
            Just(Role::Offense),
            Just(Role::Defense),
            Just(Role::Spy),
            Just(Role::Sentry),
        ];
        proptest::collection::vec((role, arb_level(), 1..=max_quantity), 0..3).prop_map(|rows| {
            let mut upgrades: Vec<BattleUpgradeRow> = Vec::new();
            for (role, level, quantity) in rows {
                if !upgrades.iter().any(|r| r.role == role && r.level == level) {
                    upgrades.push(BattleUpgradeRow::new(role, level, quantity));
                }
            }
            upgrades
        })
    }

    /// Bonus points on offense and defense.
    pub fn arb_bonus_points() -> impl Strategy<Value = Vec<BonusPoints>> {
        (0u8..=75, 0u8..=75).prop_map(|(offense, defense)| {
            vec![
                BonusPoints::new(BonusType::Offense, offense),
                BonusPoints::new(BonusType::Defense, defense),
            ]
        })
    }

    /// Fort level and hitpoints within the default table; hitpoints may
    /// exceed the level's maximum to exercise clamping.
    pub fn arb_structures() -> impl Strategy<Value = StructureState> {
        let forts = Ruleset::default().forts.len() as u8;
        (1..=forts, 0u32..4_000, 0u8..=5).prop_map(|(fort_level, fort_hitpoints, armory_level)| {
            StructureState {
                fort_level,
                fort_hitpoints,
                armory_level,
                ..StructureState::default()
            }
        })
    }

    /// A complete army for `owner`.
    pub fn arb_army(owner: PlayerId, max_per_row: u64) -> impl Strategy<Value = Army> {
        (
            arb_race(),
            arb_class(),
            arb_units(max_per_row),
            arb_items(max_per_row),
            arb_upgrades(max_per_row),
            arb_bonus_points(),
            arb_structures(),
            0u64..1_000_000_000,
        )
            .prop_map(
                move |(race, class, units, items, upgrades, bonus_points, structures, gold)| {
                    let mut army = Army::new(owner);
                    army.race = race;
                    army.class = class;
                    army.units = units;
                    army.items = items;
                    army.upgrades = upgrades;
                    army.bonus_points = bonus_points;
                    army.structures = structures;
                    army.gold = gold;
                    army
                },
            )
    }

    /// An attacker (player 1) guaranteed to field offense units and a
    /// defender (player 2) guaranteed to have population.
    pub fn arb_battle(max_per_row: u64) -> impl Strategy<Value = (Army, Army)> {
        (
            arb_army(1, max_per_row),
            arb_army(2, max_per_row),
            1..=max_per_row.max(1),
            1..=max_per_row.max(1),
        )
            .prop_map(|(mut attacker, mut defender, offense, citizens)| {
                attacker.row_mut(UnitType::Offense, 1).quantity += offense;
                defender.row_mut(UnitType::Citizen, 1).quantity += citizens;
                (attacker, defender)
            })
    }

    /// Turn count within the default bounds.
    pub fn arb_turns() -> impl Strategy<Value = u32> {
        1u32..=50u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, || vec![1u64, 2, 3]);
        assert!(result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_detects_divergence() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(3, || {
            counter.set(counter.get() + 1);
            counter.get()
        });
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 3);
    }

    #[test]
    fn test_siege_battle_is_deterministic() {
        let ruleset = Ruleset::default();
        let defender = fixtures::siege_defender(&ruleset);
        verify_battle_determinism(&ruleset, &fixtures::siege_attacker(), &defender, 20, 42, 5)
            .assert_deterministic();
    }

    #[test]
    fn test_parallel_battles_match() {
        let ruleset = Ruleset::default();
        let (attacker, defender) = fixtures::mirror_pair(1_000);
        run_parallel_battles(&ruleset, &attacker, &defender, 50, 9, 8).assert_deterministic();
    }
}
