//! Army snapshots and the typed rows they are built from.
//!
//! An [`Army`] is assembled fresh for every resolution call from a player's
//! persisted rows. Resolution mutates only its own in-memory copy; the
//! persisted record changes solely through a ledger settlement.

use serde::{Deserialize, Serialize};

/// Player identifier as stored by the host application.
pub type PlayerId = u64;

/// Kind of unit a row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitType {
    /// Untrained population. No combat power, but can be killed.
    Citizen,
    /// Gold producers. No combat power, but can be killed.
    Worker,
    /// Attacking soldiers.
    Offense,
    /// Defending soldiers.
    Defense,
    /// Intelligence operatives.
    Spy,
    /// Counter-intelligence guards.
    Sentry,
}

impl UnitType {
    /// Every unit type, in display order.
    pub const ALL: [Self; 6] = [
        Self::Citizen,
        Self::Worker,
        Self::Offense,
        Self::Defense,
        Self::Spy,
        Self::Sentry,
    ];

    /// The power figure this unit type contributes to, if any.
    #[must_use]
    pub const fn role(self) -> Option<Role> {
        match self {
            Self::Citizen | Self::Worker => None,
            Self::Offense => Some(Role::Offense),
            Self::Defense => Some(Role::Defense),
            Self::Spy => Some(Role::Spy),
            Self::Sentry => Some(Role::Sentry),
        }
    }

    /// Upper-case name used in legacy data and messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Citizen => "CITIZEN",
            Self::Worker => "WORKER",
            Self::Offense => "OFFENSE",
            Self::Defense => "DEFENSE",
            Self::Spy => "SPY",
            Self::Sentry => "SENTRY",
        }
    }
}

/// The four power figures an army is measured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Attack strength.
    Offense,
    /// Defensive strength.
    Defense,
    /// Espionage strength.
    Spy,
    /// Counter-espionage strength.
    Sentry,
}

impl Role {
    /// The unit type whose rows carry this role.
    #[must_use]
    pub const fn unit_type(self) -> UnitType {
        match self {
            Self::Offense => UnitType::Offense,
            Self::Defense => UnitType::Defense,
            Self::Spy => UnitType::Spy,
            Self::Sentry => UnitType::Sentry,
        }
    }
}

/// Equipment slot of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemType {
    /// Weapon slot.
    Weapon,
    /// Helm slot.
    Helm,
    /// Armor slot.
    Armor,
    /// Boots slot.
    Boots,
    /// Bracers slot.
    Bracers,
    /// Shield slot.
    Shield,
}

impl ItemType {
    /// Upper-case name used in legacy data and messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Weapon => "WEAPON",
            Self::Helm => "HELM",
            Self::Armor => "ARMOR",
            Self::Boots => "BOOTS",
            Self::Bracers => "BRACERS",
            Self::Shield => "SHIELD",
        }
    }
}

/// Which soldiers an item is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemUsage {
    /// Equips offense units.
    Offense,
    /// Equips defense units.
    Defense,
}

impl ItemUsage {
    /// The role the item strengthens.
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Offense => Role::Offense,
            Self::Defense => Role::Defense,
        }
    }
}

/// Kind of bonus point allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BonusType {
    /// Percentage on offense.
    Offense,
    /// Percentage on defense.
    Defense,
    /// Percentage on income. Never affects combat.
    Income,
    /// Percentage on spy and sentry power.
    Intel,
    /// Discount on purchases. Never affects combat.
    Prices,
}

/// Race of the army's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Race {
    /// Humans.
    #[default]
    Human,
    /// Elves.
    Elf,
    /// Goblins.
    Goblin,
    /// Undead.
    Undead,
}

/// Class of the army's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Class {
    /// Fighters.
    #[default]
    Fighter,
    /// Clerics.
    Cleric,
    /// Thieves.
    Thief,
    /// Assassins.
    Assassin,
}

/// Units of one type and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRow {
    /// Unit type.
    pub unit: UnitType,
    /// Unit level, 1..=3.
    pub level: u8,
    /// Number of units.
    pub quantity: u64,
}

impl UnitRow {
    /// Create a unit row.
    #[must_use]
    pub const fn new(unit: UnitType, level: u8, quantity: u64) -> Self {
        Self {
            unit,
            level,
            quantity,
        }
    }

    /// Whether the row can carry battle upgrades (level 2 and above).
    #[must_use]
    pub const fn is_veteran(&self) -> bool {
        self.level >= 2
    }
}

/// Equipped items of one slot, usage and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRow {
    /// Item slot.
    pub item: ItemType,
    /// Offense or defense gear.
    pub usage: ItemUsage,
    /// Item level.
    pub level: u8,
    /// Number of equipped items.
    pub quantity: u64,
}

impl ItemRow {
    /// Create an item row.
    #[must_use]
    pub const fn new(item: ItemType, usage: ItemUsage, level: u8, quantity: u64) -> Self {
        Self {
            item,
            usage,
            level,
            quantity,
        }
    }
}

/// Battle upgrades for one role and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleUpgradeRow {
    /// Role the upgrade strengthens.
    pub role: Role,
    /// Upgrade level.
    pub level: u8,
    /// Number of upgrades.
    pub quantity: u64,
}

impl BattleUpgradeRow {
    /// Create a battle upgrade row.
    #[must_use]
    pub const fn new(role: Role, level: u8, quantity: u64) -> Self {
        Self {
            role,
            level,
            quantity,
        }
    }
}

/// Highest level a bonus point allocation may reach.
pub const MAX_BONUS_LEVEL: u8 = 75;

/// Bonus points spent on one modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BonusPoints {
    /// Modifier kind.
    pub kind: BonusType,
    /// Points spent, clamped to 0..=75.
    pub level: u8,
}

impl BonusPoints {
    /// Create a bonus allocation, clamping the level.
    #[must_use]
    pub fn new(kind: BonusType, level: u8) -> Self {
        Self {
            kind,
            level: level.min(MAX_BONUS_LEVEL),
        }
    }
}

/// Buildings that matter to combat and espionage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureState {
    /// Fortification level, 1-based.
    pub fort_level: u8,
    /// Current fortification hitpoints.
    pub fort_hitpoints: u32,
    /// Armory level, 0-based.
    pub armory_level: u8,
    /// Housing level.
    pub house_level: u8,
    /// Economy level.
    pub economy_level: u8,
}

impl Default for StructureState {
    fn default() -> Self {
        Self {
            fort_level: 1,
            fort_hitpoints: 50,
            armory_level: 0,
            house_level: 0,
            economy_level: 0,
        }
    }
}

/// Full combat-relevant state of one player for one resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Army {
    /// Owning player.
    pub owner: PlayerId,
    /// Version of the persisted record this snapshot was read from.
    #[serde(default)]
    pub version: u64,
    /// Owner's race.
    #[serde(default)]
    pub race: Race,
    /// Owner's class.
    #[serde(default)]
    pub class: Class,
    /// Unit rows, unique per (type, level).
    #[serde(default)]
    pub units: Vec<UnitRow>,
    /// Equipped item rows.
    #[serde(default)]
    pub items: Vec<ItemRow>,
    /// Battle upgrade rows.
    #[serde(default)]
    pub upgrades: Vec<BattleUpgradeRow>,
    /// Bonus point allocations.
    #[serde(default)]
    pub bonus_points: Vec<BonusPoints>,
    /// Structures.
    #[serde(default)]
    pub structures: StructureState,
    /// Gold on hand.
    #[serde(default)]
    pub gold: u64,
    /// Accumulated experience.
    #[serde(default)]
    pub experience: u64,
}

impl Army {
    /// Create an empty army for a player.
    #[must_use]
    pub fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            version: 0,
            race: Race::default(),
            class: Class::default(),
            units: Vec::new(),
            items: Vec::new(),
            upgrades: Vec::new(),
            bonus_points: Vec::new(),
            structures: StructureState::default(),
            gold: 0,
            experience: 0,
        }
    }

    /// Quantity of a single (type, level) row, zero if absent.
    #[must_use]
    pub fn quantity(&self, unit: UnitType, level: u8) -> u64 {
        self.units
            .iter()
            .find(|row| row.unit == unit && row.level == level)
            .map_or(0, |row| row.quantity)
    }

    /// Total units of a type across all levels.
    #[must_use]
    pub fn count_of(&self, unit: UnitType) -> u64 {
        self.units
            .iter()
            .filter(|row| row.unit == unit)
            .map(|row| row.quantity)
            .sum()
    }

    /// Total units of all types.
    #[must_use]
    pub fn population(&self) -> u64 {
        self.units.iter().map(|row| row.quantity).sum()
    }

    /// Units that can take offensive losses in battle.
    #[must_use]
    pub fn offense_pool(&self) -> u64 {
        self.count_of(UnitType::Offense)
    }

    /// Units that can take defensive losses in battle: defenders, citizens
    /// and workers.
    #[must_use]
    pub fn defense_pool(&self) -> u64 {
        self.units
            .iter()
            .filter(|row| is_defensive_casualty(row.unit))
            .map(|row| row.quantity)
            .sum()
    }

    /// Points spent on a bonus kind, clamped to the allowed maximum.
    #[must_use]
    pub fn bonus_level(&self, kind: BonusType) -> u8 {
        self.bonus_points
            .iter()
            .filter(|bp| bp.kind == kind)
            .map(|bp| bp.level)
            .max()
            .unwrap_or(0)
            .min(MAX_BONUS_LEVEL)
    }

    /// Mutable access to a row, creating it at zero if missing.
    pub fn row_mut(&mut self, unit: UnitType, level: u8) -> &mut UnitRow {
        let index = match self
            .units
            .iter()
            .position(|row| row.unit == unit && row.level == level)
        {
            Some(index) => index,
            None => {
                self.units.push(UnitRow::new(unit, level, 0));
                self.units.len() - 1
            }
        };
        &mut self.units[index]
    }

    /// Remove losses from the matching rows, never going below zero.
    pub fn apply_losses(&mut self, losses: &[UnitRow]) {
        for loss in losses {
            if let Some(row) = self
                .units
                .iter_mut()
                .find(|row| row.unit == loss.unit && row.level == loss.level)
            {
                row.quantity = row.quantity.saturating_sub(loss.quantity);
            }
        }
    }
}

/// Whether a unit type falls in the defender's casualty pool.
#[must_use]
pub const fn is_defensive_casualty(unit: UnitType) -> bool {
    matches!(unit, UnitType::Defense | UnitType::Citizen | UnitType::Worker)
}

/// Merge unit rows sharing a (type, level), dropping zero quantities and
/// sorting by type then level.
#[must_use]
pub fn merge_rows(rows: impl IntoIterator<Item = UnitRow>) -> Vec<UnitRow> {
    let mut merged: Vec<UnitRow> = Vec::new();
    for row in rows {
        if row.quantity == 0 {
            continue;
        }
        match merged
            .iter_mut()
            .find(|m| m.unit == row.unit && m.level == row.level)
        {
            Some(existing) => existing.quantity += row.quantity,
            None => merged.push(row),
        }
    }
    merged.sort_by_key(|row| (row.unit, row.level));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_army() -> Army {
        let mut army = Army::new(7);
        army.units = vec![
            UnitRow::new(UnitType::Offense, 1, 100),
            UnitRow::new(UnitType::Offense, 2, 20),
            UnitRow::new(UnitType::Defense, 1, 50),
            UnitRow::new(UnitType::Citizen, 1, 30),
            UnitRow::new(UnitType::Worker, 1, 10),
            UnitRow::new(UnitType::Spy, 1, 5),
        ];
        army
    }

    #[test]
    fn test_pools() {
        let army = sample_army();
        assert_eq!(army.offense_pool(), 120);
        assert_eq!(army.defense_pool(), 90);
        assert_eq!(army.population(), 215);
    }

    #[test]
    fn test_bonus_points_clamped() {
        let bp = BonusPoints::new(BonusType::Offense, 200);
        assert_eq!(bp.level, MAX_BONUS_LEVEL);

        let mut army = sample_army();
        // Rows built by hand bypass the constructor; reads still clamp.
        army.bonus_points.push(BonusPoints {
            kind: BonusType::Defense,
            level: 99,
        });
        assert_eq!(army.bonus_level(BonusType::Defense), MAX_BONUS_LEVEL);
        assert_eq!(army.bonus_level(BonusType::Intel), 0);
    }

    #[test]
    fn test_apply_losses_saturates() {
        let mut army = sample_army();
        army.apply_losses(&[
            UnitRow::new(UnitType::Offense, 1, 40),
            UnitRow::new(UnitType::Spy, 1, 500),
        ]);
        assert_eq!(army.quantity(UnitType::Offense, 1), 60);
        assert_eq!(army.quantity(UnitType::Spy, 1), 0);
    }

    #[test]
    fn test_row_mut_creates_missing_row() {
        let mut army = sample_army();
        army.row_mut(UnitType::Sentry, 3).quantity += 4;
        assert_eq!(army.quantity(UnitType::Sentry, 3), 4);
    }

    #[test]
    fn test_merge_rows() {
        let merged = merge_rows([
            UnitRow::new(UnitType::Defense, 2, 3),
            UnitRow::new(UnitType::Citizen, 1, 0),
            UnitRow::new(UnitType::Defense, 2, 4),
            UnitRow::new(UnitType::Citizen, 1, 1),
        ]);
        assert_eq!(
            merged,
            vec![
                UnitRow::new(UnitType::Citizen, 1, 1),
                UnitRow::new(UnitType::Defense, 2, 7),
            ]
        );
    }
}
