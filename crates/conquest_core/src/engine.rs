//! Host-facing entry points.
//!
//! [`Engine`] binds a validated ruleset to the resolvers so a host makes
//! one call per request. The resolve calls are pure; the `settle` and
//! `attack`/`spy` calls go through an [`EconomyLedger`].

use crate::army::{Army, PlayerId};
use crate::combat::{self, BattleOutcome};
use crate::error::Result;
use crate::espionage::{self, MissionOutcome, MissionRequest};
use crate::ledger::{CommitReceipt, EconomyLedger, Settlement};
use crate::rate_limit::{ActionHistory, Actor, Decision, RateLimiter};
use crate::rng::RngSource;
use crate::ruleset::Ruleset;
use crate::stats::{self, PowerFigures};

/// Resolution engine for one ruleset.
#[derive(Debug, Clone)]
pub struct Engine {
    ruleset: Ruleset,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            ruleset: Ruleset::default(),
        }
    }
}

impl Engine {
    /// Create an engine, validating the ruleset first.
    ///
    /// # Errors
    /// Returns a validation error for an inconsistent ruleset.
    pub fn new(ruleset: Ruleset) -> Result<Self> {
        ruleset.validate()?;
        Ok(Self { ruleset })
    }

    /// The engine's ruleset.
    #[must_use]
    pub const fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// Power figures of an army, for display.
    #[must_use]
    pub fn aggregate_stats(&self, army: &Army) -> PowerFigures {
        stats::aggregate(&self.ruleset, army)
    }

    /// Resolve a battle without persisting anything. A missing seed is
    /// drawn from OS entropy and recorded in the outcome.
    ///
    /// # Errors
    /// Returns a validation error for a malformed request.
    pub fn resolve_battle(
        &self,
        attacker: &Army,
        defender: &Army,
        turns: u32,
        seed: Option<u64>,
    ) -> Result<BattleOutcome> {
        let mut rng = RngSource::from_optional_seed(seed);
        combat::resolve_battle(&self.ruleset, attacker, defender, turns, &mut rng)
    }

    /// Resolve an espionage mission without persisting anything.
    ///
    /// # Errors
    /// Returns a validation, rate-limit, resource or history error; all are
    /// raised before any roll.
    pub fn resolve_espionage(
        &self,
        attacker: &Army,
        defender: &Army,
        request: &MissionRequest,
        seed: Option<u64>,
        history: &dyn ActionHistory,
        now: u64,
    ) -> Result<MissionOutcome> {
        let mut rng = RngSource::from_optional_seed(seed);
        espionage::resolve_mission(
            &self.ruleset,
            attacker,
            defender,
            request,
            history,
            now,
            &mut rng,
        )
    }

    /// Check whether a recruit click may proceed.
    ///
    /// # Errors
    /// Returns an error if the history lookup fails.
    pub fn check_recruitment(
        &self,
        history: &dyn ActionHistory,
        actor: &Actor,
        target: PlayerId,
        now: u64,
    ) -> Result<Decision> {
        RateLimiter::new(&self.ruleset).check_recruitment(history, actor, target, now)
    }

    /// Commit a battle outcome computed from snapshots at the given
    /// versions.
    ///
    /// # Errors
    /// Passes through the ledger's [`PersistenceError`](crate::error::PersistenceError).
    pub fn settle_battle(
        &self,
        ledger: &dyn EconomyLedger,
        outcome: &BattleOutcome,
        attacker_version: u64,
        defender_version: u64,
        at: u64,
    ) -> Result<CommitReceipt> {
        let settlement = Settlement::from_battle(outcome, attacker_version, defender_version, at);
        Ok(ledger.commit(&settlement)?)
    }

    /// Commit a mission outcome computed from snapshots at the given
    /// versions.
    ///
    /// # Errors
    /// Passes through the ledger's [`PersistenceError`](crate::error::PersistenceError).
    pub fn settle_mission(
        &self,
        ledger: &dyn EconomyLedger,
        outcome: &MissionOutcome,
        attacker_version: u64,
        defender_version: u64,
        at: u64,
    ) -> Result<CommitReceipt> {
        let settlement = Settlement::from_mission(outcome, attacker_version, defender_version, at);
        Ok(ledger.commit(&settlement)?)
    }

    /// Read both players, resolve a battle and commit it.
    ///
    /// # Errors
    /// Returns any validation or persistence error; a version conflict
    /// means another resolution committed first and nothing was written.
    pub fn attack(
        &self,
        ledger: &dyn EconomyLedger,
        attacker: PlayerId,
        defender: PlayerId,
        turns: u32,
        seed: Option<u64>,
        at: u64,
    ) -> Result<(BattleOutcome, CommitReceipt)> {
        let attacker = ledger.snapshot(attacker)?;
        let defender = ledger.snapshot(defender)?;
        let outcome = self.resolve_battle(&attacker, &defender, turns, seed)?;
        let receipt =
            self.settle_battle(ledger, &outcome, attacker.version, defender.version, at)?;
        Ok((outcome, receipt))
    }

    /// Read both players, resolve a mission and commit it, recording the
    /// attempt for later rate-limit checks.
    ///
    /// # Errors
    /// Returns any validation, rate-limit, resource or persistence error.
    pub fn spy<L>(
        &self,
        ledger: &L,
        attacker: PlayerId,
        defender: PlayerId,
        request: &MissionRequest,
        seed: Option<u64>,
        at: u64,
    ) -> Result<(MissionOutcome, CommitReceipt)>
    where
        L: EconomyLedger + ActionHistory,
    {
        let attacker = ledger.snapshot(attacker)?;
        let defender = ledger.snapshot(defender)?;
        let outcome = self.resolve_espionage(&attacker, &defender, request, seed, ledger, at)?;
        let receipt =
            self.settle_mission(ledger, &outcome, attacker.version, defender.version, at)?;
        Ok((outcome, receipt))
    }
}
