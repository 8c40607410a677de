//! Battle replays.
//!
//! A replay stores both input snapshots, the turn count and the seed. Since
//! resolution is deterministic that is enough to reproduce the battle; the
//! stored outcome hash lets a later build confirm it still resolves the
//! same way.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::army::Army;
use crate::combat::{resolve_battle, BattleOutcome};
use crate::error::{EngineError, Result, ValidationError};
use crate::rng::RngSource;
use crate::ruleset::Ruleset;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Everything needed to re-run one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReplay {
    /// Replay format version.
    pub version: u32,
    /// Seed the battle used.
    pub seed: u64,
    /// Turns requested.
    pub turns: u32,
    /// Attacker snapshot.
    pub attacker: Army,
    /// Defender snapshot.
    pub defender: Army,
    /// Fingerprint of the ruleset the battle ran under.
    pub ruleset_fingerprint: u64,
    /// Hash of the serialized outcome.
    pub outcome_hash: u64,
}

impl BattleReplay {
    /// Resolve a battle and record it.
    ///
    /// # Errors
    /// Returns an error if the battle request is invalid.
    pub fn record(
        ruleset: &Ruleset,
        attacker: &Army,
        defender: &Army,
        turns: u32,
        seed: u64,
    ) -> Result<(Self, BattleOutcome)> {
        let outcome = resolve_battle(
            ruleset,
            attacker,
            defender,
            turns,
            &mut RngSource::from_seed(seed),
        )?;
        let replay = Self {
            version: REPLAY_VERSION,
            seed,
            turns,
            attacker: attacker.clone(),
            defender: defender.clone(),
            ruleset_fingerprint: ruleset.fingerprint(),
            outcome_hash: outcome_hash(&outcome)?,
        };
        Ok((replay, outcome))
    }

    /// Re-run the battle.
    ///
    /// # Errors
    /// Returns an error if `ruleset` differs from the one recorded.
    pub fn replay(&self, ruleset: &Ruleset) -> Result<BattleOutcome> {
        if ruleset.fingerprint() != self.ruleset_fingerprint {
            return Err(ValidationError::InvalidRuleset(
                "ruleset differs from the one the replay was recorded with".to_string(),
            )
            .into());
        }
        resolve_battle(
            ruleset,
            &self.attacker,
            &self.defender,
            self.turns,
            &mut RngSource::from_seed(self.seed),
        )
    }

    /// Re-run the battle and compare against the recorded hash.
    ///
    /// # Errors
    /// Returns an error if the battle cannot be re-run.
    pub fn verify(&self, ruleset: &Ruleset) -> Result<bool> {
        let outcome = self.replay(ruleset)?;
        Ok(outcome_hash(&outcome)? == self.outcome_hash)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self).map_err(|e| EngineError::data(path, e))?;
        std::fs::write(path, bytes).map_err(|e| EngineError::data(path, e))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// file was written by an incompatible version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| EngineError::data(path, e))?;
        let replay: Self = bincode::deserialize(&bytes).map_err(|e| EngineError::data(path, e))?;

        if replay.version != REPLAY_VERSION {
            return Err(EngineError::data(
                path,
                format!(
                    "replay version mismatch: expected {REPLAY_VERSION}, got {}",
                    replay.version
                ),
            ));
        }

        Ok(replay)
    }
}

/// Hash of an outcome's serialized bytes. Equal hashes mean byte-identical
/// outcomes for all practical purposes.
///
/// # Errors
/// Returns an error if the outcome cannot be serialized.
pub fn outcome_hash(outcome: &BattleOutcome) -> Result<u64> {
    let bytes = bincode::serialize(outcome).map_err(|e| EngineError::data("<outcome>", e))?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Ok(hasher.finish())
}
