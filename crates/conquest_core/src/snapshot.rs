//! Army construction at the data boundary.
//!
//! Legacy player records store units, items and upgrades as loosely typed
//! JSON where quantities may be numbers or numeric strings. They are
//! coerced into a typed [`Army`] exactly once, here, and validated against
//! the ruleset so the resolvers never see malformed rows.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::army::{
    Army, BattleUpgradeRow, BonusPoints, BonusType, Class, ItemRow, ItemType, ItemUsage, PlayerId,
    Race, Role, StructureState, UnitRow, UnitType,
};
use crate::error::{EngineError, Result, ValidationError};
use crate::ruleset::Ruleset;

/// Check every row of an army against the ruleset tables.
pub fn validate_army(ruleset: &Ruleset, army: &Army) -> std::result::Result<(), ValidationError> {
    let mut units = HashSet::new();
    for row in &army.units {
        if ruleset.unit(row.unit, row.level).is_none() {
            return Err(level_error(row.unit.name(), row.level));
        }
        if !units.insert((row.unit, row.level)) {
            return Err(ValidationError::DuplicateRow {
                kind: row.unit.name().to_string(),
                level: u32::from(row.level),
            });
        }
    }

    let mut items = HashSet::new();
    for row in &army.items {
        if ruleset.item(row.item, row.level).is_none() {
            return Err(level_error(row.item.name(), row.level));
        }
        if !items.insert((row.item, row.usage, row.level)) {
            return Err(ValidationError::DuplicateRow {
                kind: row.item.name().to_string(),
                level: u32::from(row.level),
            });
        }
    }

    let mut upgrades = HashSet::new();
    for row in &army.upgrades {
        if ruleset.upgrade(row.role, row.level).is_none() {
            return Err(level_error(row.role.unit_type().name(), row.level));
        }
        if !upgrades.insert((row.role, row.level)) {
            return Err(ValidationError::DuplicateRow {
                kind: row.role.unit_type().name().to_string(),
                level: u32::from(row.level),
            });
        }
    }

    if ruleset.fort(army.structures.fort_level).is_none() {
        return Err(level_error("FORT", army.structures.fort_level));
    }

    Ok(())
}

fn level_error(kind: &str, level: u8) -> ValidationError {
    ValidationError::LevelOutOfRange {
        kind: kind.to_string(),
        level: u32::from(level),
    }
}

/// Fluent construction of a validated army.
#[derive(Debug, Clone)]
pub struct ArmyBuilder {
    army: Army,
}

impl ArmyBuilder {
    /// Start an empty army for a player.
    #[must_use]
    pub fn new(owner: PlayerId) -> Self {
        Self {
            army: Army::new(owner),
        }
    }

    /// Set race and class.
    #[must_use]
    pub fn identity(mut self, race: Race, class: Class) -> Self {
        self.army.race = race;
        self.army.class = class;
        self
    }

    /// Add a unit row. A second row for the same (type, level) fails
    /// [`build`](Self::build) with `DuplicateRow`.
    #[must_use]
    pub fn units(mut self, unit: UnitType, level: u8, quantity: u64) -> Self {
        self.army.units.push(UnitRow::new(unit, level, quantity));
        self
    }

    /// Add an equipped item row.
    #[must_use]
    pub fn item(mut self, item: ItemType, usage: ItemUsage, level: u8, quantity: u64) -> Self {
        self.army.items.push(ItemRow::new(item, usage, level, quantity));
        self
    }

    /// Add a battle upgrade row.
    #[must_use]
    pub fn upgrade(mut self, role: Role, level: u8, quantity: u64) -> Self {
        self.army.upgrades.push(BattleUpgradeRow::new(role, level, quantity));
        self
    }

    /// Spend bonus points.
    #[must_use]
    pub fn bonus(mut self, kind: BonusType, level: u8) -> Self {
        self.army.bonus_points.push(BonusPoints::new(kind, level));
        self
    }

    /// Set the fortification level at full hitpoints for the given ruleset.
    #[must_use]
    pub fn fort(mut self, ruleset: &Ruleset, level: u8) -> Self {
        self.army.structures.fort_level = level;
        self.army.structures.fort_hitpoints = ruleset.fort_max_hitpoints(level);
        self
    }

    /// Set the armory level.
    #[must_use]
    pub fn armory(mut self, level: u8) -> Self {
        self.army.structures.armory_level = level;
        self
    }

    /// Set gold on hand.
    #[must_use]
    pub fn gold(mut self, gold: u64) -> Self {
        self.army.gold = gold;
        self
    }

    /// Set the persisted version this snapshot represents.
    #[must_use]
    pub fn version(mut self, version: u64) -> Self {
        self.army.version = version;
        self
    }

    /// Validate and return the army.
    pub fn build(self, ruleset: &Ruleset) -> Result<Army> {
        validate_army(ruleset, &self.army)?;
        Ok(self.army)
    }

    /// Return the army without validation.
    #[must_use]
    pub fn build_unchecked(self) -> Army {
        self.army
    }
}

/// Parse a legacy JSON player record into a validated army.
///
/// # Example
///
/// ```json
/// {
///   "id": 12, "race": "human", "class": "fighter", "gold": "15000",
///   "units": [{"type": "OFFENSE", "level": "1", "quantity": "120"}],
///   "items": [{"type": "WEAPON", "usage": "OFFENSE", "level": 1, "quantity": 5}],
///   "battle_upgrades": [{"type": "OFFENSE", "level": 2, "quantity": 1}],
///   "bonus_points": [{"type": "OFFENSE", "level": 10}],
///   "structures": {"fort_level": 1, "fort_hitpoints": "50"}
/// }
/// ```
pub fn army_from_legacy_json(ruleset: &Ruleset, json: &str) -> Result<Army> {
    let value: Value = serde_json::from_str(json).map_err(|e| EngineError::data("<legacy>", e))?;
    let record = value
        .as_object()
        .ok_or_else(|| malformed("record", &value))?;

    let mut army = Army::new(number(record, "id")?);
    army.version = optional_number(record, "version")?.unwrap_or(0);
    army.gold = optional_number(record, "gold")?.unwrap_or(0);
    army.experience = optional_number(record, "experience")?.unwrap_or(0);
    if let Some(race) = optional_str(record, "race")? {
        army.race = parse_race(race)?;
    }
    if let Some(class) = optional_str(record, "class")? {
        army.class = parse_class(class)?;
    }

    for entry in array(record, "units")? {
        let entry = object(entry, "units")?;
        army.units.push(UnitRow::new(
            parse_unit_type(required_str(entry, "type")?)?,
            level(entry)?,
            number(entry, "quantity")?,
        ));
    }
    for entry in array(record, "items")? {
        let entry = object(entry, "items")?;
        army.items.push(ItemRow::new(
            parse_item_type(required_str(entry, "type")?)?,
            parse_usage(required_str(entry, "usage")?)?,
            level(entry)?,
            number(entry, "quantity")?,
        ));
    }
    for entry in array(record, "battle_upgrades")? {
        let entry = object(entry, "battle_upgrades")?;
        army.upgrades.push(BattleUpgradeRow::new(
            parse_role(required_str(entry, "type")?)?,
            level(entry)?,
            number(entry, "quantity")?,
        ));
    }
    for entry in array(record, "bonus_points")? {
        let entry = object(entry, "bonus_points")?;
        let points = number(entry, "level")?.min(u64::from(u8::MAX)) as u8;
        army.bonus_points.push(BonusPoints::new(
            parse_bonus_type(required_str(entry, "type")?)?,
            points,
        ));
    }

    if let Some(structures) = record.get("structures") {
        let structures = object(structures, "structures")?;
        let small = |field: &str| -> Result<Option<u8>> {
            optional_number(structures, field)?
                .map(|n| u8::try_from(n).map_err(|_| malformed_str(field, &n.to_string()).into()))
                .transpose()
        };
        let defaults = StructureState::default();
        let fort_level = small("fort_level")?.unwrap_or(defaults.fort_level);
        army.structures = StructureState {
            fort_level,
            fort_hitpoints: optional_number(structures, "fort_hitpoints")?
                .map_or(ruleset.fort_max_hitpoints(fort_level), |hp| {
                    hp.min(u64::from(u32::MAX)) as u32
                }),
            armory_level: small("armory_level")?.unwrap_or(0),
            house_level: small("house_level")?.unwrap_or(0),
            economy_level: small("economy_level")?.unwrap_or(0),
        };
    }
    army.structures.fort_hitpoints = army
        .structures
        .fort_hitpoints
        .min(ruleset.fort_max_hitpoints(army.structures.fort_level));

    validate_army(ruleset, &army)?;
    Ok(army)
}

/// Coerce a JSON number or numeric string into a non-negative integer.
fn coerce(field: &str, value: &Value) -> std::result::Result<u64, ValidationError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| malformed(field, value)),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| malformed(field, value)),
        _ => Err(malformed(field, value)),
    }
}

fn number(map: &Map<String, Value>, field: &str) -> std::result::Result<u64, ValidationError> {
    let value = map
        .get(field)
        .ok_or_else(|| malformed_str(field, "<missing>"))?;
    coerce(field, value)
}

fn optional_number(
    map: &Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<u64>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce(field, value).map(Some),
    }
}

fn level(map: &Map<String, Value>) -> std::result::Result<u8, ValidationError> {
    let raw = number(map, "level")?;
    u8::try_from(raw).map_err(|_| malformed_str("level", &raw.to_string()))
}

fn required_str<'a>(
    map: &'a Map<String, Value>,
    field: &str,
) -> std::result::Result<&'a str, ValidationError> {
    optional_str(map, field)?.ok_or_else(|| malformed_str(field, "<missing>"))
}

fn optional_str<'a>(
    map: &'a Map<String, Value>,
    field: &str,
) -> std::result::Result<Option<&'a str>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(malformed(field, other)),
    }
}

fn array<'a>(
    map: &'a Map<String, Value>,
    field: &str,
) -> std::result::Result<&'a [Value], ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(malformed(field, other)),
    }
}

fn object<'a>(
    value: &'a Value,
    field: &str,
) -> std::result::Result<&'a Map<String, Value>, ValidationError> {
    value.as_object().ok_or_else(|| malformed(field, value))
}

fn malformed(field: &str, value: &Value) -> ValidationError {
    malformed_str(field, &value.to_string())
}

fn malformed_str(field: &str, value: &str) -> ValidationError {
    ValidationError::MalformedQuantity {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn unknown(field: &str, value: &str) -> ValidationError {
    ValidationError::UnknownKind {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Parse a unit type name, case-insensitively.
pub fn parse_unit_type(name: &str) -> std::result::Result<UnitType, ValidationError> {
    UnitType::ALL
        .into_iter()
        .find(|unit| unit.name().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| unknown("unit type", name))
}

fn parse_role(name: &str) -> std::result::Result<Role, ValidationError> {
    parse_unit_type(name)
        .ok()
        .and_then(UnitType::role)
        .ok_or_else(|| unknown("upgrade type", name))
}

fn parse_item_type(name: &str) -> std::result::Result<ItemType, ValidationError> {
    [
        ItemType::Weapon,
        ItemType::Helm,
        ItemType::Armor,
        ItemType::Boots,
        ItemType::Bracers,
        ItemType::Shield,
    ]
    .into_iter()
    .find(|item| item.name().eq_ignore_ascii_case(name.trim()))
    .ok_or_else(|| unknown("item type", name))
}

fn parse_usage(name: &str) -> std::result::Result<ItemUsage, ValidationError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "OFFENSE" => Ok(ItemUsage::Offense),
        "DEFENSE" => Ok(ItemUsage::Defense),
        _ => Err(unknown("item usage", name)),
    }
}

fn parse_bonus_type(name: &str) -> std::result::Result<BonusType, ValidationError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "OFFENSE" => Ok(BonusType::Offense),
        "DEFENSE" => Ok(BonusType::Defense),
        "INCOME" => Ok(BonusType::Income),
        "INTEL" => Ok(BonusType::Intel),
        "PRICES" => Ok(BonusType::Prices),
        _ => Err(unknown("bonus type", name)),
    }
}

fn parse_race(name: &str) -> std::result::Result<Race, ValidationError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HUMAN" => Ok(Race::Human),
        "ELF" => Ok(Race::Elf),
        "GOBLIN" => Ok(Race::Goblin),
        "UNDEAD" => Ok(Race::Undead),
        _ => Err(unknown("race", name)),
    }
}

fn parse_class(name: &str) -> std::result::Result<Class, ValidationError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "FIGHTER" => Ok(Class::Fighter),
        "CLERIC" => Ok(Class::Cleric),
        "THIEF" => Ok(Class::Thief),
        "ASSASSIN" => Ok(Class::Assassin),
        _ => Err(unknown("class", name)),
    }
}
