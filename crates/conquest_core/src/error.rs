//! Error types for the resolution engine.
//!
//! A lost battle or a failed spy mission is never an error; those are
//! ordinary outcomes. Errors describe requests the engine refuses to run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::army::PlayerId;
use crate::rate_limit::RateLimitExceeded;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for every engine entry point.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any computation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A rate limit refused the action.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// Not enough spies, gold, citizens or units for the requested action.
    #[error("Insufficient {resource}: need {required}, have {available}")]
    InsufficientResources {
        /// Resource name.
        resource: String,
        /// Amount required.
        required: u64,
        /// Amount available.
        available: u64,
    },

    /// Raised by a persistence collaborator and passed through untouched.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Failed to read, write or parse a data file.
    #[error("Failed to process data file '{path}': {message}")]
    Data {
        /// Path to the file involved.
        path: String,
        /// Error message.
        message: String,
    },
}

impl EngineError {
    /// Build an [`EngineError::InsufficientResources`].
    pub fn insufficient(resource: impl Into<String>, required: u64, available: u64) -> Self {
        Self::InsufficientResources {
            resource: resource.into(),
            required,
            available,
        }
    }

    /// Build an [`EngineError::Data`] for a file path.
    pub fn data(path: impl AsRef<std::path::Path>, message: impl std::fmt::Display) -> Self {
        Self::Data {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// The army has no units that can take part.
    #[error("Army of player {owner} has no units able to take part")]
    EmptyArmy {
        /// Owner of the empty army.
        owner: PlayerId,
    },

    /// Battle turn count outside the allowed range.
    #[error("Turns must be within {min}..={max}, got {requested}")]
    TurnsOutOfRange {
        /// Requested turns.
        requested: u32,
        /// Minimum allowed.
        min: u32,
        /// Maximum allowed.
        max: u32,
    },

    /// Row level outside the table for its kind.
    #[error("Level {level} is not valid for {kind}")]
    LevelOutOfRange {
        /// Row kind, e.g. `OFFENSE` or `WEAPON`.
        kind: String,
        /// Offending level.
        level: u32,
    },

    /// Unrecognized type name at the data boundary.
    #[error("Unknown {field} '{value}'")]
    UnknownKind {
        /// Field being parsed.
        field: String,
        /// Raw value.
        value: String,
    },

    /// Quantity or level that is not a non-negative integer.
    #[error("Malformed {field}: '{value}'")]
    MalformedQuantity {
        /// Field being parsed.
        field: String,
        /// Raw value.
        value: String,
    },

    /// Two rows share the same identity within one army.
    #[error("Duplicate row {kind} level {level}")]
    DuplicateRow {
        /// Row kind.
        kind: String,
        /// Row level.
        level: u32,
    },

    /// A mission was requested with no spies.
    #[error("A mission needs at least one spy")]
    ZeroSpies,

    /// The mission needs a target but none was given.
    #[error("{mission} requires a target")]
    MissingTarget {
        /// Mission name.
        mission: String,
    },

    /// Attacker and defender are the same player.
    #[error("A player cannot target themselves")]
    SelfTarget,

    /// Ruleset tables are inconsistent.
    #[error("Invalid ruleset: {0}")]
    InvalidRuleset(String),
}

/// Errors raised by persistence collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PersistenceError {
    /// The stored record changed since the snapshot was read.
    #[error("Player {player} changed concurrently: expected version {expected}, found {found}")]
    VersionConflict {
        /// Player whose record moved.
        player: PlayerId,
        /// Version the settlement was computed against.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// No stored record for the player.
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Appending to the audit history failed.
    #[error("Failed to append ledger entry: {0}")]
    AuditAppendFailed(String),

    /// Applying the settlement would drive a balance negative.
    #[error("Settlement would leave player {player} with a negative balance")]
    NegativeBalance {
        /// Player affected.
        player: PlayerId,
    },
}
