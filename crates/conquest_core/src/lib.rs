//! # Conquest Core
//!
//! Combat and espionage resolution engine for a persistent-world strategy
//! game.
//!
//! This crate contains **only** deterministic logic:
//! - No persistence (outcomes are pure deltas; a ledger commits them)
//! - No system randomness (every roll comes from a seeded [`rng::RngSource`])
//! - No floating-point math (integers and fixed-point)
//!
//! This separation enables:
//! - Battle simulation tools that never touch player data
//! - Reproducible battle logs and replays
//! - Parallel batch resolution
//!
//! ## Crate Structure
//!
//! - [`army`] - Army snapshots and their typed rows
//! - [`ruleset`] - Balance tables and tuning constants
//! - [`stats`] - Stat aggregation
//! - [`combat`] - Multi-round battle resolution
//! - [`casualties`] - Casualty allocation over unit rows
//! - [`espionage`] - Intel, assassination and infiltration missions
//! - [`rate_limit`] - Abuse limits over a rolling window
//! - [`economy`] - Training, equipment and upgrade pricing
//! - [`ledger`] - Settlements and the persistence boundary
//! - [`snapshot`] - Army construction and legacy record normalization
//! - [`replay`] - Recorded battles and verification
//! - [`rng`] - Seeded randomness
//! - [`math`] - Fixed-point and basis-point helpers
//! - [`error`] - Error types
//! - [`engine`] - Host-facing entry points

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod army;
pub mod casualties;
pub mod combat;
pub mod economy;
pub mod engine;
pub mod error;
pub mod espionage;
pub mod ledger;
pub mod math;
pub mod rate_limit;
pub mod replay;
pub mod rng;
pub mod ruleset;
pub mod snapshot;
pub mod stats;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::army::{
        Army, BattleUpgradeRow, BonusPoints, BonusType, Class, ItemRow, ItemType, ItemUsage,
        PlayerId, Race, Role, StructureState, UnitRow, UnitType,
    };
    pub use crate::combat::{BattleOutcome, ExperienceAward, RoundLog, Side, Verdict};
    pub use crate::engine::Engine;
    pub use crate::error::{EngineError, PersistenceError, Result, ValidationError};
    pub use crate::espionage::{
        CasualtyClass, IntelReport, MissionOutcome, MissionRequest, MissionTarget, MissionType,
    };
    pub use crate::ledger::{EconomyLedger, InMemoryLedger, Settlement};
    pub use crate::math::Fixed;
    pub use crate::rate_limit::{
        ActionHistory, ActionKind, ActionRecord, Actor, Decision, InMemoryHistory, LimitKind,
        RateLimitExceeded, RateLimiter,
    };
    pub use crate::replay::BattleReplay;
    pub use crate::rng::RngSource;
    pub use crate::ruleset::Ruleset;
    pub use crate::snapshot::{army_from_legacy_json, ArmyBuilder};
    pub use crate::stats::PowerFigures;
}
