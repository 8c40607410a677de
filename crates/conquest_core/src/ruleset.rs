//! Balance tables and tunable constants.
//!
//! A [`Ruleset`] is immutable configuration handed to the aggregator and the
//! resolvers. Events and balance patches swap in an alternate ruleset loaded
//! from RON instead of editing code.
//!
//! # Example RON
//!
//! ```ron
//! Ruleset(
//!     units: [
//!         UnitStats(unit: Offense, level: 1, power: 5, cost: 1500),
//!     ],
//!     forts: [
//!         FortLevel(level: 1, max_hitpoints: 50, defense_bonus: 5),
//!     ],
//!     // ...
//! )
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::army::{Class, ItemType, Race, Role, UnitType};
use crate::error::{EngineError, Result, ValidationError};

/// Highest unit, item and upgrade level.
pub const MAX_LEVEL: u8 = 3;

/// Power and training cost of one unit type at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitStats {
    /// Unit type.
    pub unit: UnitType,
    /// Level.
    pub level: u8,
    /// Base power per unit in its role.
    pub power: u32,
    /// Gold cost to train one unit.
    pub cost: u64,
}

/// Per-unit bonus and price of one item slot at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStats {
    /// Item slot.
    pub item: ItemType,
    /// Level.
    pub level: u8,
    /// Flat power added per equipped item.
    pub bonus: u32,
    /// Gold cost per item.
    pub cost: u64,
}

/// Per-unit bonus and price of one battle upgrade at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpgradeStats {
    /// Role upgraded.
    pub role: Role,
    /// Level.
    pub level: u8,
    /// Flat power added per upgrade.
    pub bonus: u32,
    /// Gold cost per upgrade.
    pub cost: u64,
}

/// Percentage bonuses on the four power figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    /// Offense percentage.
    #[serde(default)]
    pub offense: u32,
    /// Defense percentage.
    #[serde(default)]
    pub defense: u32,
    /// Spy percentage.
    #[serde(default)]
    pub spy: u32,
    /// Sentry percentage.
    #[serde(default)]
    pub sentry: u32,
}

impl Modifiers {
    /// Percentage for a role.
    #[must_use]
    pub const fn for_role(&self, role: Role) -> u32 {
        match role {
            Role::Offense => self.offense,
            Role::Defense => self.defense,
            Role::Spy => self.spy,
            Role::Sentry => self.sentry,
        }
    }

    /// Element-wise sum.
    #[must_use]
    pub const fn plus(self, other: Self) -> Self {
        Self {
            offense: self.offense + other.offense,
            defense: self.defense + other.defense,
            spy: self.spy + other.spy,
            sentry: self.sentry + other.sentry,
        }
    }
}

/// One row of the fortification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FortLevel {
    /// Fort level, 1-based.
    pub level: u8,
    /// Hitpoints of an undamaged fort.
    pub max_hitpoints: u32,
    /// Defense percentage granted at full hitpoints.
    pub defense_bonus: u32,
}

/// Battle tuning. Rates are in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatRules {
    /// Smallest number of turns a caller may request.
    pub min_turns: u32,
    /// Largest number of turns a caller may request.
    pub max_turns: u32,
    /// Rounds never exceed this, whatever was requested.
    pub round_ceiling: u32,
    /// Random swing applied to each side's power per round, in percent.
    pub variance_pct: u32,
    /// Loss rate at a 1:1 power ratio.
    pub base_loss_bp: u32,
    /// Smallest loss rate of a side in a round.
    pub min_loss_bp: u32,
    /// Largest loss rate of a side in a round, short of a rout.
    pub max_loss_bp: u32,
    /// Power ratio at which the round loser is wiped out.
    pub rout_ratio: u32,
    /// Share of attacker offense that becomes siege damage.
    pub siege_rate_bp: u32,
    /// Pillage rate of a win with zero margin.
    pub base_pillage_bp: u32,
    /// Extra pillage per full unit of win margin.
    pub margin_pillage_bp: u32,
    /// Pillage never exceeds this share of the defender's gold.
    pub max_pillage_bp: u32,
    /// Experience every participant receives.
    pub xp_base: u64,
    /// Experience per thousand points of opponent power.
    pub xp_per_thousand_power: u64,
    /// Experience cap per battle.
    pub xp_cap: u64,
    /// Percentage of experience the loser keeps.
    pub loser_xp_pct: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            min_turns: 1,
            max_turns: 50,
            round_ceiling: 50,
            variance_pct: 10,
            base_loss_bp: 200,
            min_loss_bp: 50,
            max_loss_bp: 1_500,
            rout_ratio: 50,
            siege_rate_bp: 200,
            base_pillage_bp: 500,
            margin_pillage_bp: 1_000,
            max_pillage_bp: 1_500,
            xp_base: 10,
            xp_per_thousand_power: 1,
            xp_cap: 1_000,
            loser_xp_pct: 50,
        }
    }
}

/// Espionage tuning. Chances are in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EspionageRules {
    /// Spies an intel mission may send.
    pub intel_max_spies: u32,
    /// Spies an assassination may send.
    pub assassinate_max_spies: u32,
    /// Highest success chance while the target has any sentries.
    pub success_ceiling_bp: u32,
    /// Chance each spy is caught on a failed intel mission.
    pub intel_capture_bp: u32,
    /// Chance each spy is caught on a successful intel mission.
    pub intel_success_loss_bp: u32,
    /// Chance each spy is caught on a failed assassination or infiltration.
    pub capture_bp: u32,
    /// Most kills each assassin may score.
    pub assassinate_kills_per_spy: u64,
    /// Most kills one assassination may score.
    pub assassinate_max_kills: u64,
    /// Most kills each infiltrator may score.
    pub infiltrate_kills_per_spy: u64,
}

impl Default for EspionageRules {
    fn default() -> Self {
        Self {
            intel_max_spies: 10,
            assassinate_max_spies: 5,
            success_ceiling_bp: 9_500,
            intel_capture_bp: 5_000,
            intel_success_loss_bp: 500,
            capture_bp: 7_500,
            assassinate_kills_per_spy: 4,
            assassinate_max_kills: 20,
            infiltrate_kills_per_spy: 3,
        }
    }
}

/// Abuse limits over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimits {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Recruit clicks one recruiter may send one target per window.
    pub recruit_per_pair: u64,
    /// Recruits one target may absorb per window.
    pub recruit_per_target: u64,
    /// Infiltrators one mission may send.
    pub infiltrate_per_mission: u64,
    /// Infiltrators one attacker may send one defender per window.
    pub infiltrate_per_user_per_day: u64,
    /// Infiltrators one attacker may send in total per window.
    pub infiltrate_per_day: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            window_secs: 24 * 60 * 60,
            recruit_per_pair: 5,
            recruit_per_target: 25,
            infiltrate_per_mission: 5,
            infiltrate_per_user_per_day: 15,
            infiltrate_per_day: 30,
        }
    }
}

/// Buy and sell tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EconomyRules {
    /// Percentage of the training cost refunded when untraining.
    pub untrain_refund_pct: u32,
    /// Percentage of the item cost refunded when selling.
    pub sell_refund_pct: u32,
}

impl Default for EconomyRules {
    fn default() -> Self {
        Self {
            untrain_refund_pct: 75,
            sell_refund_pct: 75,
        }
    }
}

/// Complete, immutable rule set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ruleset {
    /// Unit table.
    pub units: Vec<UnitStats>,
    /// Item table.
    pub items: Vec<ItemStats>,
    /// Battle upgrade table.
    pub upgrades: Vec<UpgradeStats>,
    /// Race modifiers; races not listed get none.
    #[serde(default)]
    pub races: Vec<(Race, Modifiers)>,
    /// Class modifiers; classes not listed get none.
    #[serde(default)]
    pub classes: Vec<(Class, Modifiers)>,
    /// Fortification table, one row per level from 1.
    pub forts: Vec<FortLevel>,
    /// Spy and sentry percentage per armory level.
    #[serde(default)]
    pub armory_bonus_per_level: u32,
    /// Battle tuning.
    #[serde(default)]
    pub combat: CombatRules,
    /// Espionage tuning.
    #[serde(default)]
    pub espionage: EspionageRules,
    /// Abuse limits.
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Buy and sell tuning.
    #[serde(default)]
    pub economy: EconomyRules,
}

impl Default for Ruleset {
    fn default() -> Self {
        let mut units = vec![
            UnitStats {
                unit: UnitType::Citizen,
                level: 1,
                power: 0,
                cost: 0,
            },
            UnitStats {
                unit: UnitType::Worker,
                level: 1,
                power: 0,
                cost: 1_000,
            },
        ];
        for (unit, powers, costs) in [
            (UnitType::Offense, [5, 8, 12], [1_500, 3_000, 6_000]),
            (UnitType::Defense, [5, 8, 12], [1_500, 3_000, 6_000]),
            (UnitType::Spy, [3, 5, 8], [2_000, 4_000, 8_000]),
            (UnitType::Sentry, [3, 5, 8], [2_000, 4_000, 8_000]),
        ] {
            for (index, (power, cost)) in powers.into_iter().zip(costs).enumerate() {
                units.push(UnitStats {
                    unit,
                    level: index as u8 + 1,
                    power,
                    cost,
                });
            }
        }

        let mut items = Vec::new();
        for (item, bonuses) in [
            (ItemType::Weapon, [3, 6, 10]),
            (ItemType::Helm, [1, 2, 4]),
            (ItemType::Armor, [2, 4, 7]),
            (ItemType::Boots, [1, 2, 3]),
            (ItemType::Bracers, [1, 2, 3]),
            (ItemType::Shield, [2, 4, 6]),
        ] {
            for (index, bonus) in bonuses.into_iter().enumerate() {
                items.push(ItemStats {
                    item,
                    level: index as u8 + 1,
                    bonus,
                    cost: u64::from(bonus) * 400,
                });
            }
        }

        let mut upgrades = Vec::new();
        for role in [Role::Offense, Role::Defense, Role::Spy, Role::Sentry] {
            for (index, bonus) in [2_u32, 4, 8].into_iter().enumerate() {
                upgrades.push(UpgradeStats {
                    role,
                    level: index as u8 + 1,
                    bonus,
                    cost: u64::from(bonus) * 1_000,
                });
            }
        }

        let forts = [50, 100, 200, 400, 800, 1_600]
            .into_iter()
            .enumerate()
            .map(|(index, max_hitpoints)| FortLevel {
                level: index as u8 + 1,
                max_hitpoints,
                defense_bonus: (index as u32 + 1) * 5,
            })
            .collect();

        Self {
            units,
            items,
            upgrades,
            races: vec![
                (Race::Human, Modifiers { offense: 5, ..Modifiers::default() }),
                (Race::Elf, Modifiers { spy: 5, ..Modifiers::default() }),
                (Race::Goblin, Modifiers { defense: 5, ..Modifiers::default() }),
                (Race::Undead, Modifiers { sentry: 5, ..Modifiers::default() }),
            ],
            classes: vec![
                (Class::Fighter, Modifiers { offense: 5, ..Modifiers::default() }),
                (Class::Cleric, Modifiers { defense: 5, ..Modifiers::default() }),
                (Class::Thief, Modifiers::default()),
                (
                    Class::Assassin,
                    Modifiers {
                        spy: 5,
                        sentry: 5,
                        ..Modifiers::default()
                    },
                ),
            ],
            forts,
            armory_bonus_per_level: 5,
            combat: CombatRules::default(),
            espionage: EspionageRules::default(),
            rate_limits: RateLimits::default(),
            economy: EconomyRules::default(),
        }
    }
}

impl Ruleset {
    /// Load a ruleset from a RON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| EngineError::data(path, e))?;
        let ruleset: Self = ron::from_str(&contents).map_err(|e| EngineError::data(path, e))?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Parse a ruleset from a RON string and validate it.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let ruleset: Self = ron::from_str(source).map_err(|e| EngineError::data("<inline>", e))?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| EngineError::data("<inline>", e))
    }

    /// Stable fingerprint of the tables, recorded in replays.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Stats of a unit type at a level.
    #[must_use]
    pub fn unit(&self, unit: UnitType, level: u8) -> Option<&UnitStats> {
        self.units
            .iter()
            .find(|stats| stats.unit == unit && stats.level == level)
    }

    /// Stats of an item slot at a level.
    #[must_use]
    pub fn item(&self, item: ItemType, level: u8) -> Option<&ItemStats> {
        self.items
            .iter()
            .find(|stats| stats.item == item && stats.level == level)
    }

    /// Stats of a battle upgrade at a level.
    #[must_use]
    pub fn upgrade(&self, role: Role, level: u8) -> Option<&UpgradeStats> {
        self.upgrades
            .iter()
            .find(|stats| stats.role == role && stats.level == level)
    }

    /// Fort table row for a level.
    #[must_use]
    pub fn fort(&self, level: u8) -> Option<&FortLevel> {
        self.forts.iter().find(|fort| fort.level == level)
    }

    /// Maximum hitpoints of a fort level, zero for unknown levels.
    #[must_use]
    pub fn fort_max_hitpoints(&self, level: u8) -> u32 {
        self.fort(level).map_or(0, |fort| fort.max_hitpoints)
    }

    /// Combined race and class modifiers.
    #[must_use]
    pub fn modifiers(&self, race: Race, class: Class) -> Modifiers {
        let race_mods = self
            .races
            .iter()
            .find(|(r, _)| *r == race)
            .map(|(_, m)| *m)
            .unwrap_or_default();
        let class_mods = self
            .classes
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, m)| *m)
            .unwrap_or_default();
        race_mods.plus(class_mods)
    }

    /// Check the tables for gaps and contradictions.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let invalid = |msg: String| Err(ValidationError::InvalidRuleset(msg));

        let mut seen = HashSet::new();
        for stats in &self.units {
            if !seen.insert((stats.unit, stats.level)) {
                return invalid(format!(
                    "duplicate unit entry {} level {}",
                    stats.unit.name(),
                    stats.level
                ));
            }
        }
        for unit in UnitType::ALL {
            let levels: &[u8] = if unit.role().is_some() { &[1, 2, 3] } else { &[1] };
            for &level in levels {
                if self.unit(unit, level).is_none() {
                    return invalid(format!("missing unit entry {} level {level}", unit.name()));
                }
            }
        }
        if self.items.iter().any(|stats| stats.level == 0 || stats.level > MAX_LEVEL)
            || self.upgrades.iter().any(|stats| stats.level == 0 || stats.level > MAX_LEVEL)
        {
            return invalid(format!("item and upgrade levels must be within 1..={MAX_LEVEL}"));
        }

        if self.forts.is_empty() {
            return invalid("fort table is empty".to_string());
        }
        for (index, fort) in self.forts.iter().enumerate() {
            if usize::from(fort.level) != index + 1 {
                return invalid(format!("fort levels must run 1..=n in order, found {}", fort.level));
            }
            if fort.max_hitpoints == 0 {
                return invalid(format!("fort level {} has no hitpoints", fort.level));
            }
        }

        let c = &self.combat;
        if c.min_turns == 0 || c.min_turns > c.max_turns {
            return invalid(format!("turn range {}..={} is empty", c.min_turns, c.max_turns));
        }
        if c.round_ceiling == 0 {
            return invalid("round ceiling must be positive".to_string());
        }
        if c.variance_pct >= 100 {
            return invalid("variance must be below 100%".to_string());
        }
        if c.min_loss_bp == 0 || c.min_loss_bp > c.max_loss_bp || c.max_loss_bp > 10_000 {
            return invalid("loss rates must satisfy 0 < min <= max <= 10000".to_string());
        }
        if c.rout_ratio < 2 {
            return invalid("rout ratio must be at least 2".to_string());
        }
        if c.max_pillage_bp > 10_000 || c.base_pillage_bp > c.max_pillage_bp {
            return invalid("pillage rates must satisfy base <= max <= 10000".to_string());
        }
        if c.loser_xp_pct > 100 {
            return invalid("loser experience share above 100%".to_string());
        }

        let e = &self.espionage;
        if e.intel_max_spies == 0 || e.assassinate_max_spies == 0 {
            return invalid("spy caps must be positive".to_string());
        }
        if [
            e.success_ceiling_bp,
            e.intel_capture_bp,
            e.intel_success_loss_bp,
            e.capture_bp,
        ]
        .iter()
        .any(|&bp| bp > 10_000)
        {
            return invalid("espionage chances must be at most 10000".to_string());
        }

        let r = &self.rate_limits;
        if r.window_secs == 0
            || r.recruit_per_pair == 0
            || r.recruit_per_target == 0
            || r.infiltrate_per_mission == 0
            || r.infiltrate_per_user_per_day == 0
            || r.infiltrate_per_day == 0
        {
            return invalid("rate limits must be positive".to_string());
        }

        Ok(())
    }
}
