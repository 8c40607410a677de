//! Headless battle-testing runner.
//!
//! This crate drives the resolution engine without any game server around
//! it. It is used for balance testing and CI verification:
//!
//! - **Single battles**: resolve one battle between two army files
//! - **Batch runs**: fight every pairing of a roster in parallel
//! - **Determinism checks**: resolve the same seed many times and compare
//!   outcome hashes
//!
//! # Example
//!
//! ```bash
//! # Resolve one battle
//! cargo run -p conquest_headless -- simulate --attacker a.ron --defender b.json --seed 7
//!
//! # All-pairs batch over a roster
//! cargo run -p conquest_headless -- batch --roster ladder.ron --max-battles 500
//!
//! # Verify determinism
//! cargo run -p conquest_headless -- verify --attacker a.ron --defender b.ron --runs 16
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod metrics;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, DeterminismReport};
pub use metrics::{BatchSummary, BattleMetrics, EntryRecord};
pub use scenario::{load_army, Roster, RosterEntry, ScenarioError};
