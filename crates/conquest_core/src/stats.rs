//! Stat aggregation: army snapshot to power figures.
//!
//! Every path that needs an army's strength goes through [`aggregate`]:
//! battle rounds, espionage rolls, training and equipment screens. Bonus
//! sources are applied in a fixed order:
//!
//! 1. Unit base power per role
//! 2. Flat item bonuses, at most one item per slot per unit of the role
//! 3. Flat battle upgrade bonuses, counted only against level 2+ units
//! 4. Race and class percentage
//! 5. Bonus point percentage (offense, defense, intel), capped at 75
//! 6. Structure percentage: fortification on defense, armory on spy/sentry
//!
//! Each percentage step multiplies the running total and rounds down.

use serde::{Deserialize, Serialize};

use crate::army::{Army, BonusType, ItemType, Role};
use crate::math::apply_bonus;
use crate::ruleset::Ruleset;

/// An army's four power figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PowerFigures {
    /// Attack strength.
    pub offense: u64,
    /// Defensive strength.
    pub defense: u64,
    /// Espionage strength.
    pub spy: u64,
    /// Counter-espionage strength.
    pub sentry: u64,
}

impl PowerFigures {
    /// Figure for a role.
    #[must_use]
    pub const fn get(&self, role: Role) -> u64 {
        match role {
            Role::Offense => self.offense,
            Role::Defense => self.defense,
            Role::Spy => self.spy,
            Role::Sentry => self.sentry,
        }
    }

    fn set(&mut self, role: Role, value: u64) {
        match role {
            Role::Offense => self.offense = value,
            Role::Defense => self.defense = value,
            Role::Spy => self.spy = value,
            Role::Sentry => self.sentry = value,
        }
    }
}

/// Power figures plus the share of defense owed to the fortification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatBreakdown {
    /// Final figures.
    pub figures: PowerFigures,
    /// Defense points added by the fortification bonus alone.
    pub fort_defense: u64,
}

const ITEM_SLOTS: [ItemType; 6] = [
    ItemType::Weapon,
    ItemType::Helm,
    ItemType::Armor,
    ItemType::Boots,
    ItemType::Bracers,
    ItemType::Shield,
];

const ROLES: [Role; 4] = [Role::Offense, Role::Defense, Role::Spy, Role::Sentry];

/// Aggregate an army into its power figures.
#[must_use]
pub fn aggregate(ruleset: &Ruleset, army: &Army) -> PowerFigures {
    aggregate_detailed(ruleset, army).figures
}

/// Aggregate an army, also reporting the fortification's defense share.
#[must_use]
pub fn aggregate_detailed(ruleset: &Ruleset, army: &Army) -> StatBreakdown {
    let modifiers = ruleset.modifiers(army.race, army.class);
    let mut breakdown = StatBreakdown::default();

    for role in ROLES {
        let raw = base_power(ruleset, army, role)
            .saturating_add(item_bonus(ruleset, army, role))
            .saturating_add(upgrade_bonus(ruleset, army, role));

        let mut value = apply_bonus(raw, modifiers.for_role(role));
        value = apply_bonus(value, u32::from(army.bonus_level(bonus_type_for(role))));

        match role {
            Role::Defense => {
                let before = value;
                value = apply_bonus(value, fort_bonus_pct(ruleset, army));
                breakdown.fort_defense = value - before;
            }
            Role::Spy | Role::Sentry => {
                value = apply_bonus(
                    value,
                    u32::from(army.structures.armory_level) * ruleset.armory_bonus_per_level,
                );
            }
            Role::Offense => {}
        }

        breakdown.figures.set(role, value);
    }

    breakdown
}

/// Defense percentage the fortification grants at its current hitpoints.
///
/// Scales linearly with remaining hitpoints and is zero once the fort is
/// breached.
#[must_use]
pub fn fort_bonus_pct(ruleset: &Ruleset, army: &Army) -> u32 {
    let Some(fort) = ruleset.fort(army.structures.fort_level) else {
        return 0;
    };
    if fort.max_hitpoints == 0 {
        return 0;
    }
    let hitpoints = army.structures.fort_hitpoints.min(fort.max_hitpoints);
    (u64::from(fort.defense_bonus) * u64::from(hitpoints) / u64::from(fort.max_hitpoints)) as u32
}

const fn bonus_type_for(role: Role) -> BonusType {
    match role {
        Role::Offense => BonusType::Offense,
        Role::Defense => BonusType::Defense,
        Role::Spy | Role::Sentry => BonusType::Intel,
    }
}

fn base_power(ruleset: &Ruleset, army: &Army, role: Role) -> u64 {
    army.units
        .iter()
        .filter(|row| row.unit.role() == Some(role))
        .map(|row| {
            let power = ruleset.unit(row.unit, row.level).map_or(0, |s| s.power);
            row.quantity.saturating_mul(u64::from(power))
        })
        .fold(0_u64, u64::saturating_add)
}

/// Flat item bonus. Each slot covers at most one unit of the role, with
/// higher-level items worn first.
fn item_bonus(ruleset: &Ruleset, army: &Army, role: Role) -> u64 {
    let wearers = army.count_of(role.unit_type());
    let mut total = 0_u64;

    for slot in ITEM_SLOTS {
        let mut rows: Vec<_> = army
            .items
            .iter()
            .filter(|row| row.item == slot && row.usage.role() == role)
            .collect();
        rows.sort_by(|a, b| b.level.cmp(&a.level));

        let mut uncovered = wearers;
        for row in rows {
            let worn = row.quantity.min(uncovered);
            uncovered -= worn;
            let bonus = ruleset.item(row.item, row.level).map_or(0, |s| s.bonus);
            total = total.saturating_add(worn.saturating_mul(u64::from(bonus)));
        }
    }

    total
}

/// Flat battle upgrade bonus. Raw recruits (level 1) cannot use upgrades,
/// so coverage is limited to level 2+ units; best upgrades go first.
fn upgrade_bonus(ruleset: &Ruleset, army: &Army, role: Role) -> u64 {
    let veterans: u64 = army
        .units
        .iter()
        .filter(|row| row.unit.role() == Some(role) && row.is_veteran())
        .map(|row| row.quantity)
        .sum();

    let mut rows: Vec<_> = army.upgrades.iter().filter(|row| row.role == role).collect();
    rows.sort_by(|a, b| b.level.cmp(&a.level));

    let mut uncovered = veterans;
    let mut total = 0_u64;
    for row in rows {
        let used = row.quantity.min(uncovered);
        uncovered -= used;
        let bonus = ruleset.upgrade(row.role, row.level).map_or(0, |s| s.bonus);
        total = total.saturating_add(used.saturating_mul(u64::from(bonus)));
    }
    total
}
