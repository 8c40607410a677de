//! Ruleset validation.

use std::path::Path;

use conquest_core::ruleset::Ruleset;

use crate::{read, ToolError};

/// Counts of the tables a validated ruleset defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesetSummary {
    /// Unit (type, level) entries.
    pub units: usize,
    /// Item (type, level) entries.
    pub items: usize,
    /// Battle upgrade entries.
    pub upgrades: usize,
    /// Fort levels.
    pub forts: usize,
    /// Fingerprint recorded in battle replays.
    pub fingerprint: u64,
}

/// Parse and validate a RON ruleset file.
///
/// # Errors
///
/// Returns an error if the file is missing, fails to parse, or defines
/// inconsistent tables.
pub fn validate_ruleset_file(path: &Path) -> Result<RulesetSummary, ToolError> {
    let ruleset = Ruleset::from_ron_str(&read(path)?)?;

    let summary = RulesetSummary {
        units: ruleset.units.len(),
        items: ruleset.items.len(),
        upgrades: ruleset.upgrades.len(),
        forts: ruleset.forts.len(),
        fingerprint: ruleset.fingerprint(),
    };
    tracing::debug!(?summary, path = %path.display(), "Ruleset validated");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conquest_core::error::{EngineError, ValidationError};

    #[test]
    fn test_default_ruleset_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruleset.ron");
        std::fs::write(&path, Ruleset::default().to_ron_string().unwrap()).unwrap();

        let summary = validate_ruleset_file(&path).unwrap();
        assert_eq!(summary.forts, Ruleset::default().forts.len());
        assert_eq!(summary.fingerprint, Ruleset::default().fingerprint());
    }

    #[test]
    fn test_inconsistent_ruleset_rejected() {
        let mut ruleset = Ruleset::default();
        ruleset.combat.rout_ratio = 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruleset.ron");
        std::fs::write(&path, ruleset.to_ron_string().unwrap()).unwrap();

        assert!(matches!(
            validate_ruleset_file(&path),
            Err(ToolError::Engine(EngineError::Validation(
                ValidationError::InvalidRuleset(_)
            )))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            validate_ruleset_file(Path::new("/nonexistent/ruleset.ron")),
            Err(ToolError::FileNotFound(_))
        ));
    }
}
