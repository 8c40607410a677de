//! Test fixtures and helpers.
//!
//! Pre-built armies for consistent testing. Every fixture uses the default
//! ruleset and a race/class pairing with no combat modifiers unless noted,
//! so power figures are easy to work out by hand.

use conquest_core::army::{Army, Class, PlayerId, Race, UnitRow, UnitType};
use conquest_core::ruleset::Ruleset;
use conquest_core::snapshot::ArmyBuilder;

/// Race and class with no offense or defense modifiers.
pub const NEUTRAL: (Race, Class) = (Race::Elf, Class::Thief);

/// Start a builder for a neutral army.
#[must_use]
pub fn neutral(owner: PlayerId) -> ArmyBuilder {
    ArmyBuilder::new(owner).identity(NEUTRAL.0, NEUTRAL.1)
}

/// Army of level-1 offense units only.
#[must_use]
pub fn offense_army(owner: PlayerId, quantity: u64) -> Army {
    neutral(owner)
        .units(UnitType::Offense, 1, quantity)
        .build_unchecked()
}

/// Army of level-1 defense units plus citizens, fort level 1 at full
/// hitpoints.
#[must_use]
pub fn defense_army(owner: PlayerId, defenders: u64, citizens: u64) -> Army {
    neutral(owner)
        .units(UnitType::Defense, 1, defenders)
        .units(UnitType::Citizen, 1, citizens)
        .build_unchecked()
}

/// Attacker with 10,000 offense (2,000 level-1 offense units).
#[must_use]
pub fn siege_attacker() -> Army {
    offense_army(1, 2_000)
}

/// Defender with 1,000 defense before the fort bonus (200 level-1 defense
/// units), 100 citizens, fort level 1 at 50 hitpoints and 10,000 gold.
#[must_use]
pub fn siege_defender(ruleset: &Ruleset) -> Army {
    neutral(2)
        .units(UnitType::Defense, 1, 200)
        .units(UnitType::Citizen, 1, 100)
        .fort(ruleset, 1)
        .gold(10_000)
        .build_unchecked()
}

/// Two armies with identical aggregated stats: same rows, no fort bonus.
#[must_use]
pub fn mirror_pair(units: u64) -> (Army, Army) {
    let attacker = neutral(1)
        .units(UnitType::Offense, 1, units)
        .units(UnitType::Defense, 1, units)
        .build_unchecked();
    let mut defender = neutral(2)
        .units(UnitType::Offense, 1, units)
        .units(UnitType::Defense, 1, units)
        .build_unchecked();
    defender.structures.fort_hitpoints = 0;
    (attacker, defender)
}

/// Spy army with `spies` spies at every level.
#[must_use]
pub fn spy_army(owner: PlayerId, spies: u64) -> Army {
    neutral(owner)
        .units(UnitType::Spy, 1, spies)
        .units(UnitType::Spy, 2, spies)
        .units(UnitType::Spy, 3, spies)
        .build_unchecked()
}

/// Target with an overwhelming sentry screen and a mixed garrison.
#[must_use]
pub fn guarded_target(owner: PlayerId, sentries: u64) -> Army {
    neutral(owner)
        .units(UnitType::Sentry, 3, sentries)
        .units(UnitType::Defense, 1, 60)
        .units(UnitType::Defense, 2, 40)
        .units(UnitType::Citizen, 1, 200)
        .build_unchecked()
}

/// Target with defense rows at all three levels and no sentries.
#[must_use]
pub fn unguarded_garrison(owner: PlayerId) -> Army {
    let mut army = Army::new(owner);
    army.units = vec![
        UnitRow::new(UnitType::Defense, 3, 30),
        UnitRow::new(UnitType::Defense, 1, 10),
        UnitRow::new(UnitType::Defense, 2, 20),
        UnitRow::new(UnitType::Worker, 1, 50),
    ];
    army
}
