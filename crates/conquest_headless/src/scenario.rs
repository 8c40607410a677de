//! Roster and army file loading.
//!
//! A roster is a named set of armies that the batch runner fights against
//! each other. Rosters are RON files; single armies may be RON (typed) or
//! legacy JSON player records.

use std::collections::HashSet;
use std::path::Path;

use conquest_core::army::{Army, BonusType, Class, ItemType, ItemUsage, Race, Role, UnitType};
use conquest_core::error::EngineError;
use conquest_core::ruleset::Ruleset;
use conquest_core::snapshot::{army_from_legacy_json, validate_army, ArmyBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Failed to write JSON output.
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    /// File extension is neither `.ron` nor `.json`.
    #[error("Unsupported army file format: {0}")]
    UnsupportedFormat(String),
    /// Two roster entries share a name or owner.
    #[error("Duplicate roster entry: {0}")]
    DuplicateEntry(String),
    /// The engine rejected the input.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn default_turns() -> u32 {
    50
}

/// One named army in a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Display name, unique within the roster.
    pub name: String,
    /// The army. Its owner id must be unique within the roster.
    pub army: Army,
}

impl RosterEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(name: impl Into<String>, army: Army) -> Self {
        Self {
            name: name.into(),
            army,
        }
    }
}

/// A set of armies to fight against each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    /// Roster name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Turns requested for every battle.
    #[serde(default = "default_turns")]
    pub turns: u32,
    /// The armies.
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    /// Load a roster from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let roster: Roster = ron::from_str(ron)?;
        Ok(roster)
    }

    /// Check entry names and owners are unique and every army fits the
    /// ruleset.
    pub fn validate(&self, ruleset: &Ruleset) -> Result<(), ScenarioError> {
        let mut names = HashSet::new();
        let mut owners = HashSet::new();
        for entry in &self.entries {
            if !names.insert(entry.name.as_str()) {
                return Err(ScenarioError::DuplicateEntry(entry.name.clone()));
            }
            if !owners.insert(entry.army.owner) {
                return Err(ScenarioError::DuplicateEntry(format!(
                    "{} (owner {})",
                    entry.name, entry.army.owner
                )));
            }
            validate_army(ruleset, &entry.army).map_err(EngineError::from)?;
        }
        Ok(())
    }

    /// Find an entry by name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Four archetypes used when no roster file is given.
    #[must_use]
    pub fn standard(ruleset: &Ruleset) -> Self {
        let raiders = ArmyBuilder::new(1)
            .identity(Race::Goblin, Class::Fighter)
            .units(UnitType::Offense, 1, 1_500)
            .units(UnitType::Offense, 2, 400)
            .units(UnitType::Defense, 1, 200)
            .units(UnitType::Citizen, 1, 300)
            .item(ItemType::Weapon, ItemUsage::Offense, 1, 1_500)
            .bonus(BonusType::Offense, 20)
            .fort(ruleset, 1)
            .gold(50_000)
            .build_unchecked();
        let turtle = ArmyBuilder::new(2)
            .identity(Race::Human, Class::Cleric)
            .units(UnitType::Offense, 1, 300)
            .units(UnitType::Defense, 1, 1_200)
            .units(UnitType::Defense, 2, 500)
            .units(UnitType::Citizen, 1, 400)
            .item(ItemType::Shield, ItemUsage::Defense, 1, 1_200)
            .upgrade(Role::Defense, 1, 2)
            .bonus(BonusType::Defense, 20)
            .fort(ruleset, 3)
            .armory(2)
            .gold(80_000)
            .build_unchecked();
        let balanced = ArmyBuilder::new(3)
            .identity(Race::Elf, Class::Thief)
            .units(UnitType::Offense, 1, 900)
            .units(UnitType::Defense, 1, 900)
            .units(UnitType::Spy, 1, 50)
            .units(UnitType::Sentry, 1, 50)
            .units(UnitType::Citizen, 1, 300)
            .fort(ruleset, 2)
            .gold(60_000)
            .build_unchecked();
        let spymaster = ArmyBuilder::new(4)
            .identity(Race::Undead, Class::Assassin)
            .units(UnitType::Offense, 1, 600)
            .units(UnitType::Defense, 1, 700)
            .units(UnitType::Spy, 2, 300)
            .units(UnitType::Spy, 3, 100)
            .units(UnitType::Sentry, 2, 400)
            .units(UnitType::Citizen, 1, 300)
            .fort(ruleset, 2)
            .gold(40_000)
            .build_unchecked();

        Self {
            name: "standard".to_string(),
            description: "Offense, defense, balanced and espionage archetypes".to_string(),
            turns: default_turns(),
            entries: vec![
                RosterEntry::new("raiders", raiders),
                RosterEntry::new("turtle", turtle),
                RosterEntry::new("balanced", balanced),
                RosterEntry::new("spymaster", spymaster),
            ],
        }
    }
}

/// Load a single army: `.ron` files hold a typed army, `.json` files a
/// legacy player record.
pub fn load_army<P: AsRef<Path>>(ruleset: &Ruleset, path: P) -> Result<Army, ScenarioError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ScenarioError::FileNotFound(path.display().to_string()));
    }
    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("ron") => {
            let army: Army = ron::from_str(&contents)?;
            validate_army(ruleset, &army).map_err(EngineError::from)?;
            Ok(army)
        }
        Some("json") => Ok(army_from_legacy_json(ruleset, &contents)?),
        _ => Err(ScenarioError::UnsupportedFormat(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_roster_is_valid() {
        let ruleset = Ruleset::default();
        let roster = Roster::standard(&ruleset);
        assert_eq!(roster.entries.len(), 4);
        roster.validate(&ruleset).unwrap();
    }

    #[test]
    fn test_roster_from_ron_str() {
        let ron = r#"(
            name: "duel",
            entries: [
                (name: "red", army: (owner: 1, units: [(unit: Offense, level: 1, quantity: 100)])),
                (name: "blue", army: (owner: 2, units: [(unit: Defense, level: 1, quantity: 80)])),
            ],
        )"#;
        let roster = Roster::from_ron_str(ron).unwrap();
        assert_eq!(roster.turns, 50);
        assert_eq!(roster.entry("blue").unwrap().army.owner, 2);
        roster.validate(&Ruleset::default()).unwrap();
    }

    #[test]
    fn test_duplicate_owner_rejected() {
        let ruleset = Ruleset::default();
        let mut roster = Roster::standard(&ruleset);
        roster.entries[1].army.owner = 1;
        assert!(matches!(
            roster.validate(&ruleset),
            Err(ScenarioError::DuplicateEntry(_))
        ));
    }

    #[test]
    fn test_roster_round_trips_through_ron() {
        let ruleset = Ruleset::default();
        let roster = Roster::standard(&ruleset);
        let text = ron::ser::to_string_pretty(&roster, ron::ser::PrettyConfig::default()).unwrap();
        assert_eq!(Roster::from_ron_str(&text).unwrap(), roster);
    }

    #[test]
    fn test_load_army_formats() {
        let ruleset = Ruleset::default();
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("legacy.json");
        std::fs::write(
            &json,
            r#"{"id": 7, "gold": "100", "units": [{"type": "offense", "level": "1", "quantity": "12"}]}"#,
        )
        .unwrap();
        let army = load_army(&ruleset, &json).unwrap();
        assert_eq!(army.owner, 7);
        assert_eq!(army.quantity(UnitType::Offense, 1), 12);

        let ron_path = dir.path().join("army.ron");
        std::fs::write(&ron_path, ron::to_string(&army).unwrap()).unwrap();
        assert_eq!(load_army(&ruleset, &ron_path).unwrap(), army);

        let txt = dir.path().join("army.txt");
        std::fs::write(&txt, "").unwrap();
        assert!(matches!(
            load_army(&ruleset, &txt),
            Err(ScenarioError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            load_army(&ruleset, dir.path().join("missing.ron")),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
