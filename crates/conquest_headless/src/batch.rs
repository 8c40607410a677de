//! Batch battle runner for balance testing.
//!
//! Fights every ordered pair of roster entries in parallel using rayon,
//! bounded by a battle count and a wall-clock budget.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use conquest_core::army::Army;
use conquest_core::engine::Engine;
use conquest_core::replay::outcome_hash;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, BattleMetrics};
use crate::scenario::Roster;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Roster name, for the report
    pub roster: String,
    /// Seed of the first pairing; pairing `i` uses `seed_start + i`
    pub seed_start: u64,
    /// Turns per battle (None = the roster's setting)
    pub turns: Option<u32>,
    /// Maximum battles to run (0 = every pairing)
    pub max_battles: u32,
    /// Wall-clock budget in seconds (0 = unlimited)
    pub time_budget_secs: u64,
    /// Worker threads (0 = use rayon default)
    pub parallel: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            roster: "standard".to_string(),
            seed_start: 0,
            turns: None,
            max_battles: 0,
            time_budget_secs: 0,
            parallel: 0,
            output_dir: PathBuf::from("results"),
        }
    }
}

impl BatchConfig {
    /// Create config for a named roster
    pub fn new(roster: &str) -> Self {
        Self {
            roster: roster.to_string(),
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Cap the number of battles
    pub fn with_max_battles(mut self, max_battles: u32) -> Self {
        self.max_battles = max_battles;
        self
    }

    /// Cap the wall-clock time
    pub fn with_time_budget(mut self, secs: u64) -> Self {
        self.time_budget_secs = secs;
        self
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual battle metrics, in pairing order
    pub battles: Vec<BattleMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Pairings skipped by the battle cap or time budget
    pub skipped: u32,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Pairing index
    pub battle_index: u32,
    /// Attacking entry
    pub attacker: String,
    /// Defending entry
    pub defender: String,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    /// Total battles
    pub total: u32,
    /// Completed battles
    pub completed: AtomicU32,
    /// Start time
    pub start_time: Instant,
    attacker_wins: AtomicU32,
}

impl BatchProgress {
    /// Create new progress tracker
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            start_time: Instant::now(),
            attacker_wins: AtomicU32::new(0),
        }
    }

    /// Record a completed battle
    pub fn record_completion(&self, attacker_won: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if attacker_won {
            self.attacker_wins.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Share of completed battles the attacker won
    pub fn attacker_win_rate(&self) -> f64 {
        let completed = self.current();
        if completed == 0 {
            return 0.0;
        }
        f64::from(self.attacker_wins.load(Ordering::Relaxed)) / f64::from(completed)
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }

        let elapsed = self.start_time.elapsed();
        let per_battle = elapsed.as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_battle * f64::from(remaining))
    }
}

/// A single scheduled battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    /// Index into the schedule.
    pub index: u32,
    /// Roster index of the attacker.
    pub attacker: usize,
    /// Roster index of the defender.
    pub defender: usize,
    /// Seed for this battle.
    pub seed: u64,
}

/// Every ordered pair of distinct entries, attacker-major.
#[must_use]
pub fn all_pairs(entries: usize, seed_start: u64) -> Vec<Pairing> {
    let mut pairings = Vec::new();
    for attacker in 0..entries {
        for defender in (0..entries).filter(|&d| d != attacker) {
            let index = pairings.len() as u32;
            pairings.push(Pairing {
                index,
                attacker,
                defender,
                seed: seed_start.wrapping_add(u64::from(index)),
            });
        }
    }
    pairings
}

fn fight(
    engine: &Engine,
    roster: &Roster,
    pairing: Pairing,
    turns: u32,
) -> Result<BattleMetrics, BatchError> {
    let attacker = &roster.entries[pairing.attacker];
    let defender = &roster.entries[pairing.defender];
    let error = |message: String| BatchError {
        battle_index: pairing.index,
        attacker: attacker.name.clone(),
        defender: defender.name.clone(),
        seed: pairing.seed,
        message,
    };

    let outcome = engine
        .resolve_battle(&attacker.army, &defender.army, turns, Some(pairing.seed))
        .map_err(|e| error(e.to_string()))?;
    let hash = outcome_hash(&outcome).map_err(|e| error(e.to_string()))?;
    Ok(BattleMetrics::from_outcome(
        &attacker.name,
        &defender.name,
        &outcome,
        hash,
    ))
}

/// Run every pairing of a roster, within the configured bounds.
pub fn run_batch(engine: &Engine, roster: &Roster, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let turns = config.turns.unwrap_or(roster.turns);

    let mut pairings = all_pairs(roster.entries.len(), config.seed_start);
    let total_pairings = pairings.len() as u32;
    if config.max_battles > 0 {
        pairings.truncate(config.max_battles as usize);
    }
    let budget = (config.time_budget_secs > 0).then(|| Duration::from_secs(config.time_budget_secs));
    let progress = BatchProgress::new(pairings.len() as u32);
    let over_budget = AtomicU32::new(0);

    info!(
        roster = %roster.name,
        entries = roster.entries.len(),
        battles = pairings.len(),
        turns,
        "Starting batch run"
    );

    let run = || -> Vec<Option<Result<BattleMetrics, BatchError>>> {
        pairings
            .par_iter()
            .map(|&pairing| {
                if budget.is_some_and(|budget| start.elapsed() >= budget) {
                    over_budget.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                let result = fight(engine, roster, pairing, turns);
                match &result {
                    Ok(metrics) => {
                        progress.record_completion(metrics.winner == metrics.attacker);
                        let completed = progress.current();
                        if completed % 100 == 0 {
                            debug!(
                                completed,
                                total = progress.total,
                                attacker_win_rate = progress.attacker_win_rate(),
                                eta_secs = progress.eta().as_secs(),
                                "Batch progress"
                            );
                        }
                    }
                    Err(e) => warn!(
                        index = pairing.index,
                        attacker = %e.attacker,
                        defender = %e.defender,
                        error = %e.message,
                        "Battle failed"
                    ),
                }
                Some(result)
            })
            .collect()
    };

    let results = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "Failed to build thread pool, using the global pool");
                run()
            }
        }
    } else {
        run()
    };

    let mut battles = Vec::new();
    let mut errors = Vec::new();
    for result in results.into_iter().flatten() {
        match result {
            Ok(metrics) => battles.push(metrics),
            Err(e) => errors.push(e),
        }
    }

    let skipped = total_pairings - pairings.len() as u32 + over_budget.into_inner();
    let summary = BatchSummary::from_battles(&battles);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        battles = battles.len(),
        skipped,
        errors = errors.len(),
        "Batch complete in {:.2}s",
        duration_seconds
    );

    BatchResults {
        config,
        battles,
        summary,
        skipped,
        duration_seconds,
        errors,
    }
}

/// Outcome hashes from repeated runs of one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismReport {
    /// Seed every run used.
    pub seed: u64,
    /// Hash from each run.
    pub hashes: Vec<u64>,
}

impl DeterminismReport {
    /// Whether every run hashed identically.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }
}

/// Resolve the same battle `runs` times in parallel and collect the
/// outcome hashes.
pub fn verify_determinism(
    engine: &Engine,
    attacker: &Army,
    defender: &Army,
    turns: u32,
    seed: u64,
    runs: u32,
) -> conquest_core::error::Result<DeterminismReport> {
    let hashes = (0..runs)
        .into_par_iter()
        .map(|_| {
            let outcome = engine.resolve_battle(attacker, defender, turns, Some(seed))?;
            outcome_hash(&outcome)
        })
        .collect::<conquest_core::error::Result<Vec<u64>>>()?;
    Ok(DeterminismReport { seed, hashes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conquest_core::army::UnitType;

    fn standard() -> (Engine, Roster) {
        let engine = Engine::default();
        let roster = Roster::standard(engine.ruleset());
        (engine, roster)
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("ladder")
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345)
            .with_max_battles(7)
            .with_time_budget(30);

        assert_eq!(config.roster, "ladder");
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.max_battles, 7);
        assert_eq!(config.time_budget_secs, 30);
    }

    #[test]
    fn test_all_pairs_skips_self() {
        let pairings = all_pairs(4, 100);
        assert_eq!(pairings.len(), 12);
        assert!(pairings.iter().all(|p| p.attacker != p.defender));
        assert_eq!(pairings[0].seed, 100);
        assert_eq!(pairings[11].seed, 111);
        assert_eq!(pairings[11].index, 11);
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new(100);
        assert_eq!(progress.current(), 0);
        assert!(progress.percentage().abs() < f64::EPSILON);

        progress.record_completion(true);
        progress.record_completion(false);
        progress.record_completion(true);

        assert_eq!(progress.current(), 3);
        assert!((progress.attacker_win_rate() - 2.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_run_batch_all_pairs() {
        let (engine, roster) = standard();
        let results = run_batch(&engine, &roster, BatchConfig::default());

        assert_eq!(results.battles.len(), 12);
        assert!(results.errors.is_empty());
        assert_eq!(results.skipped, 0);
        assert_eq!(results.summary.total_battles, 12);
        assert_eq!(results.summary.entries.len(), 4);
    }

    #[test]
    fn test_run_batch_is_reproducible() {
        let (engine, roster) = standard();
        let config = BatchConfig::default().with_seed(77);
        let first = run_batch(&engine, &roster, config.clone());
        let second = run_batch(&engine, &roster, BatchConfig { parallel: 2, ..config });
        assert_eq!(first.battles, second.battles);
    }

    #[test]
    fn test_max_battles_caps_the_schedule() {
        let (engine, roster) = standard();
        let results = run_batch(&engine, &roster, BatchConfig::default().with_max_battles(5));
        assert_eq!(results.battles.len(), 5);
        assert_eq!(results.skipped, 7);
    }

    #[test]
    fn test_invalid_entry_is_reported() {
        let (engine, mut roster) = standard();
        roster.entries[0]
            .army
            .units
            .retain(|row| row.unit == UnitType::Citizen);
        let results = run_batch(&engine, &roster, BatchConfig::default());
        // Without offense units it cannot attack, but can still be attacked.
        assert_eq!(results.errors.len(), 3);
        assert!(results.errors.iter().all(|e| e.attacker == "raiders"));
        assert_eq!(results.battles.len(), 9);
    }

    #[test]
    fn test_verify_determinism() {
        let (engine, roster) = standard();
        let report = verify_determinism(
            &engine,
            &roster.entries[0].army,
            &roster.entries[1].army,
            50,
            12345,
            6,
        )
        .unwrap();
        assert_eq!(report.hashes.len(), 6);
        assert!(report.is_deterministic());
    }

    #[test]
    fn test_batch_results_save_load() {
        let (engine, roster) = standard();
        let results = run_batch(&engine, &roster, BatchConfig::default().with_max_battles(3));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.battles, results.battles);
        assert_eq!(loaded.config.roster, "standard");
    }
}
