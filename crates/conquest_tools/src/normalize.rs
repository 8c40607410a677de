//! Legacy snapshot normalization.
//!
//! Converts a loosely typed legacy JSON player record into the typed army
//! RON the headless runner reads.

use std::path::Path;

use conquest_core::army::Army;
use conquest_core::ruleset::Ruleset;
use conquest_core::snapshot::army_from_legacy_json;
use ron::ser::PrettyConfig;

use crate::{read, ToolError};

/// Parse a legacy JSON record into a validated army.
///
/// # Errors
///
/// Returns an error if the file is missing or any field is malformed.
pub fn normalize_legacy_file(ruleset: &Ruleset, path: &Path) -> Result<Army, ToolError> {
    let army = army_from_legacy_json(ruleset, &read(path)?)?;
    tracing::debug!(
        owner = army.owner,
        units = army.units.len(),
        items = army.items.len(),
        "Legacy record normalized"
    );
    Ok(army)
}

/// Render an army as pretty RON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_ron(army: &Army) -> Result<String, ToolError> {
    Ok(ron::ser::to_string_pretty(army, PrettyConfig::default())?)
}
