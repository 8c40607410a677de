//! Persistence boundary: settlements and the ledger that commits them.
//!
//! Resolvers return outcomes; [`Settlement`] turns an outcome into the
//! per-player deltas and audit entries a host must write. The host commits
//! it through an [`EconomyLedger`], which applies every delta and appends
//! every entry atomically, or does nothing.
//!
//! [`InMemoryLedger`] is the reference implementation used by the tools
//! and tests. It serializes commits behind one lock and uses optimistic
//! versioning: each delta carries the version of the snapshot it was
//! computed from, and a commit against a record that has moved since is
//! refused with [`PersistenceError::VersionConflict`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::army::{Army, PlayerId, UnitRow};
use crate::combat::BattleOutcome;
use crate::error::PersistenceError;
use crate::espionage::MissionOutcome;
use crate::rate_limit::{ActionHistory, ActionKind, ActionRecord};

/// Cause of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryType {
    /// Gold taken in a battle.
    BattlePillage,
    /// Units lost in a battle.
    BattleLosses,
    /// Experience granted by a battle.
    BattleExperience,
    /// Fort hitpoints lost to siege.
    SiegeDamage,
    /// Spies lost on a mission.
    SpyLosses,
    /// Units killed by a mission.
    SpyKills,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Player whose state changed.
    pub player: PlayerId,
    /// The other party.
    pub counterparty: PlayerId,
    /// Cause.
    pub history_type: HistoryType,
    /// Gold received.
    pub gold_credit: u64,
    /// Gold paid out.
    pub gold_debit: u64,
    /// Experience received.
    pub experience: u64,
    /// Units removed.
    pub units: Vec<UnitRow>,
    /// Unix timestamp in seconds.
    pub at: u64,
}

impl LedgerEntry {
    fn new(player: PlayerId, counterparty: PlayerId, history_type: HistoryType, at: u64) -> Self {
        Self {
            player,
            counterparty,
            history_type,
            gold_credit: 0,
            gold_debit: 0,
            experience: 0,
            units: Vec::new(),
            at,
        }
    }
}

/// Changes to one player's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerDelta {
    /// Player affected.
    pub player: PlayerId,
    /// Version of the snapshot the delta was computed from.
    pub expected_version: u64,
    /// Gold added.
    pub gold_credit: u64,
    /// Gold removed.
    pub gold_debit: u64,
    /// Experience added.
    pub experience: u64,
    /// Units removed.
    pub unit_losses: Vec<UnitRow>,
    /// New fort hitpoints, if they changed.
    pub fort_hitpoints: Option<u32>,
}

impl PlayerDelta {
    fn new(player: PlayerId, expected_version: u64) -> Self {
        Self {
            player,
            expected_version,
            gold_credit: 0,
            gold_debit: 0,
            experience: 0,
            unit_losses: Vec::new(),
            fort_hitpoints: None,
        }
    }

    /// Apply to a stored record.
    fn apply(&self, army: &mut Army) -> Result<(), PersistenceError> {
        let gold = army
            .gold
            .checked_sub(self.gold_debit)
            .ok_or(PersistenceError::NegativeBalance {
                player: self.player,
            })?;
        army.gold = gold.saturating_add(self.gold_credit);
        army.experience = army.experience.saturating_add(self.experience);
        army.apply_losses(&self.unit_losses);
        if let Some(hitpoints) = self.fort_hitpoints {
            army.structures.fort_hitpoints = hitpoints;
        }
        army.version = self.expected_version + 1;
        Ok(())
    }
}

/// Everything one resolution writes back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Settlement {
    /// Per-player state changes.
    pub deltas: Vec<PlayerDelta>,
    /// Audit entries.
    pub entries: Vec<LedgerEntry>,
    /// Actions to record for rate limiting.
    pub actions: Vec<ActionRecord>,
}

impl Settlement {
    /// Settlement for a battle between snapshots at the given versions.
    #[must_use]
    pub fn from_battle(
        outcome: &BattleOutcome,
        attacker_version: u64,
        defender_version: u64,
        at: u64,
    ) -> Self {
        let (attacker, defender) = (outcome.attacker_id, outcome.defender_id);
        let mut attacker_delta = PlayerDelta::new(attacker, attacker_version);
        let mut defender_delta = PlayerDelta::new(defender, defender_version);
        let mut entries = Vec::new();

        if outcome.gold_pillaged > 0 {
            attacker_delta.gold_credit = outcome.gold_pillaged;
            defender_delta.gold_debit = outcome.gold_pillaged;
            let mut credit = LedgerEntry::new(attacker, defender, HistoryType::BattlePillage, at);
            credit.gold_credit = outcome.gold_pillaged;
            let mut debit = LedgerEntry::new(defender, attacker, HistoryType::BattlePillage, at);
            debit.gold_debit = outcome.gold_pillaged;
            entries.extend([credit, debit]);
        }

        for (delta, losses, counterparty) in [
            (&mut attacker_delta, &outcome.attacker_losses, defender),
            (&mut defender_delta, &outcome.defender_losses, attacker),
        ] {
            if losses.is_empty() {
                continue;
            }
            delta.unit_losses.clone_from(losses);
            let mut entry =
                LedgerEntry::new(delta.player, counterparty, HistoryType::BattleLosses, at);
            entry.units.clone_from(losses);
            entries.push(entry);
        }

        for (delta, experience, counterparty) in [
            (&mut attacker_delta, outcome.experience.attacker, defender),
            (&mut defender_delta, outcome.experience.defender, attacker),
        ] {
            if experience == 0 {
                continue;
            }
            delta.experience = experience;
            let mut entry =
                LedgerEntry::new(delta.player, counterparty, HistoryType::BattleExperience, at);
            entry.experience = experience;
            entries.push(entry);
        }

        if outcome.fort_damage() > 0 {
            defender_delta.fort_hitpoints = Some(outcome.fort_hitpoints_after);
            entries.push(LedgerEntry::new(
                defender,
                attacker,
                HistoryType::SiegeDamage,
                at,
            ));
        }

        Self {
            deltas: vec![attacker_delta, defender_delta],
            entries,
            actions: Vec::new(),
        }
    }

    /// Settlement for a mission between snapshots at the given versions.
    #[must_use]
    pub fn from_mission(
        outcome: &MissionOutcome,
        attacker_version: u64,
        defender_version: u64,
        at: u64,
    ) -> Self {
        let (attacker, defender) = (outcome.attacker_id, outcome.defender_id);
        let mut attacker_delta = PlayerDelta::new(attacker, attacker_version);
        let mut defender_delta = PlayerDelta::new(defender, defender_version);
        let mut entries = Vec::new();

        let spies_lost = outcome.attacker_losses();
        if !spies_lost.is_empty() {
            let mut entry = LedgerEntry::new(attacker, defender, HistoryType::SpyLosses, at);
            entry.units.clone_from(&spies_lost);
            entries.push(entry);
            attacker_delta.unit_losses = spies_lost;
        }
        if !outcome.units_killed.is_empty() {
            defender_delta.unit_losses.clone_from(&outcome.units_killed);
            let mut entry = LedgerEntry::new(defender, attacker, HistoryType::SpyKills, at);
            entry.units.clone_from(&outcome.units_killed);
            entries.push(entry);
        }

        Self {
            deltas: vec![attacker_delta, defender_delta],
            entries,
            actions: vec![outcome.action_record(at)],
        }
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// New version of each player written.
    pub versions: Vec<(PlayerId, u64)>,
    /// Audit entries appended.
    pub entries_appended: usize,
}

/// Transactional store for player state and the audit history.
pub trait EconomyLedger {
    /// Read a player's current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::UnknownPlayer`] for a missing record.
    fn snapshot(&self, player: PlayerId) -> Result<Army, PersistenceError>;

    /// Apply every delta and append every entry, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if any delta is stale or invalid or if
    /// the audit append fails; nothing is written in that case.
    fn commit(&self, settlement: &Settlement) -> Result<CommitReceipt, PersistenceError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    players: BTreeMap<PlayerId, Army>,
    entries: Vec<LedgerEntry>,
    actions: Vec<ActionRecord>,
    fail_next_append: bool,
}

/// In-memory ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a player's record.
    ///
    /// # Errors
    ///
    /// Fails only if the ledger lock is poisoned.
    pub fn insert(&self, army: Army) -> Result<(), PersistenceError> {
        self.lock()?.players.insert(army.owner, army);
        Ok(())
    }

    /// Make the next audit append fail.
    ///
    /// # Errors
    ///
    /// Fails only if the ledger lock is poisoned.
    pub fn fail_next_append(&self) -> Result<(), PersistenceError> {
        self.lock()?.fail_next_append = true;
        Ok(())
    }

    /// Copy of the audit history.
    ///
    /// # Errors
    ///
    /// Fails only if the ledger lock is poisoned.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, PersistenceError> {
        Ok(self.lock()?.entries.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, PersistenceError> {
        self.state
            .lock()
            .map_err(|_| PersistenceError::AuditAppendFailed("ledger lock poisoned".to_string()))
    }
}

impl EconomyLedger for InMemoryLedger {
    fn snapshot(&self, player: PlayerId) -> Result<Army, PersistenceError> {
        self.lock()?
            .players
            .get(&player)
            .cloned()
            .ok_or(PersistenceError::UnknownPlayer(player))
    }

    fn commit(&self, settlement: &Settlement) -> Result<CommitReceipt, PersistenceError> {
        let mut state = self.lock()?;

        let mut staged: BTreeMap<PlayerId, Army> = BTreeMap::new();
        for delta in &settlement.deltas {
            let record = match staged.entry(delta.player) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let stored = state
                        .players
                        .get(&delta.player)
                        .ok_or(PersistenceError::UnknownPlayer(delta.player))?;
                    entry.insert(stored.clone())
                }
            };
            if record.version != delta.expected_version {
                tracing::debug!(
                    player = delta.player,
                    expected = delta.expected_version,
                    found = record.version,
                    "settlement rejected"
                );
                return Err(PersistenceError::VersionConflict {
                    player: delta.player,
                    expected: delta.expected_version,
                    found: record.version,
                });
            }
            delta.apply(record)?;
        }

        if std::mem::take(&mut state.fail_next_append) {
            return Err(PersistenceError::AuditAppendFailed(
                "injected append failure".to_string(),
            ));
        }
        state.entries.extend(settlement.entries.iter().cloned());
        state.actions.extend(settlement.actions.iter().cloned());

        let versions = staged
            .iter()
            .map(|(&player, army)| (player, army.version))
            .collect();
        state.players.extend(staged);

        tracing::debug!(
            deltas = settlement.deltas.len(),
            entries = settlement.entries.len(),
            "settlement committed"
        );

        Ok(CommitReceipt {
            versions,
            entries_appended: settlement.entries.len(),
        })
    }
}

impl ActionHistory for InMemoryLedger {
    fn records_since(
        &self,
        kind: ActionKind,
        since: u64,
    ) -> Result<Vec<ActionRecord>, PersistenceError> {
        Ok(self
            .lock()?
            .actions
            .iter()
            .filter(|r| r.kind == kind && r.at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::army::UnitType;
    use crate::combat::{ExperienceAward, Verdict};
    use crate::stats::PowerFigures;

    fn army(owner: PlayerId, gold: u64) -> Army {
        let mut army = Army::new(owner);
        army.gold = gold;
        army.units = vec![
            UnitRow::new(UnitType::Offense, 1, 100),
            UnitRow::new(UnitType::Defense, 1, 100),
        ];
        army
    }

    fn outcome() -> BattleOutcome {
        BattleOutcome {
            attacker_id: 1,
            defender_id: 2,
            winner_id: 1,
            verdict: Verdict::Victory,
            seed: 0,
            turns_requested: 5,
            turns_resolved: 5,
            attacker_losses: vec![UnitRow::new(UnitType::Offense, 1, 3)],
            defender_losses: vec![UnitRow::new(UnitType::Defense, 1, 20)],
            fort_hitpoints_before: 50,
            fort_hitpoints_after: 10,
            gold_pillaged: 150,
            experience: ExperienceAward {
                attacker: 12,
                defender: 6,
            },
            attacker_power: PowerFigures::default(),
            defender_power: PowerFigures::default(),
            log: Vec::new(),
        }
    }

    fn ledger() -> InMemoryLedger {
        let ledger = InMemoryLedger::new();
        ledger.insert(army(1, 0)).unwrap();
        ledger.insert(army(2, 1_000)).unwrap();
        ledger
    }

    #[test]
    fn test_battle_settlement_entries() {
        let settlement = Settlement::from_battle(&outcome(), 0, 0, 100);
        let types: Vec<HistoryType> = settlement.entries.iter().map(|e| e.history_type).collect();
        assert_eq!(
            types,
            vec![
                HistoryType::BattlePillage,
                HistoryType::BattlePillage,
                HistoryType::BattleLosses,
                HistoryType::BattleLosses,
                HistoryType::BattleExperience,
                HistoryType::BattleExperience,
                HistoryType::SiegeDamage,
            ]
        );
        assert_eq!(settlement.deltas[1].fort_hitpoints, Some(10));
    }

    #[test]
    fn test_commit_applies_everything() {
        let ledger = ledger();
        let receipt = ledger
            .commit(&Settlement::from_battle(&outcome(), 0, 0, 100))
            .unwrap();
        assert_eq!(receipt.versions, vec![(1, 1), (2, 1)]);
        assert_eq!(receipt.entries_appended, 7);

        let attacker = ledger.snapshot(1).unwrap();
        let defender = ledger.snapshot(2).unwrap();
        assert_eq!(attacker.gold, 150);
        assert_eq!(defender.gold, 850);
        assert_eq!(attacker.quantity(UnitType::Offense, 1), 97);
        assert_eq!(defender.quantity(UnitType::Defense, 1), 80);
        assert_eq!(defender.structures.fort_hitpoints, 10);
        assert_eq!(attacker.experience, 12);
    }

    #[test]
    fn test_stale_version_rejected() {
        let ledger = ledger();
        let settlement = Settlement::from_battle(&outcome(), 0, 0, 100);
        ledger.commit(&settlement).unwrap();
        let err = ledger.commit(&settlement).unwrap_err();
        assert_eq!(
            err,
            PersistenceError::VersionConflict {
                player: 1,
                expected: 0,
                found: 1,
            }
        );
        assert_eq!(ledger.snapshot(2).unwrap().gold, 850);
    }

    #[test]
    fn test_failed_append_leaves_state_untouched() {
        let ledger = ledger();
        ledger.fail_next_append().unwrap();
        let settlement = Settlement::from_battle(&outcome(), 0, 0, 100);
        assert!(matches!(
            ledger.commit(&settlement),
            Err(PersistenceError::AuditAppendFailed(_))
        ));
        assert_eq!(ledger.snapshot(2).unwrap(), army(2, 1_000));
        assert!(ledger.entries().unwrap().is_empty());

        // The failure is one-shot.
        ledger.commit(&settlement).unwrap();
        assert_eq!(ledger.entries().unwrap().len(), 7);
    }

    #[test]
    fn test_overdraw_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.insert(army(1, 0)).unwrap();
        ledger.insert(army(2, 100)).unwrap();
        let err = ledger
            .commit(&Settlement::from_battle(&outcome(), 0, 0, 100))
            .unwrap_err();
        assert_eq!(err, PersistenceError::NegativeBalance { player: 2 });
        assert_eq!(ledger.snapshot(1).unwrap().version, 0);
    }

    #[test]
    fn test_concurrent_commits_against_one_defender() {
        let ledger = ledger();
        let settlement = Settlement::from_battle(&outcome(), 0, 0, 100);
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| ledger.commit(&settlement)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(ledger.snapshot(2).unwrap().gold, 850);
    }

    #[test]
    fn test_unknown_player() {
        let ledger = InMemoryLedger::new();
        assert_eq!(
            ledger.snapshot(9).unwrap_err(),
            PersistenceError::UnknownPlayer(9)
        );
    }
}
