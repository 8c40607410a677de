//! Battle metrics collection for balance analysis.

use std::collections::BTreeMap;

use conquest_core::casualties;
use conquest_core::combat::{BattleOutcome, Verdict};
use serde::{Deserialize, Serialize};

/// Metrics for a single battle between two roster entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleMetrics {
    /// Attacking entry name.
    pub attacker: String,
    /// Defending entry name.
    pub defender: String,
    /// Seed the battle was resolved with.
    pub seed: u64,
    /// Verdict.
    pub verdict: Verdict,
    /// Winning entry name.
    pub winner: String,
    /// Rounds actually fought.
    pub turns_resolved: u32,
    /// Attacker units lost.
    pub attacker_losses: u64,
    /// Defender units lost.
    pub defender_losses: u64,
    /// Gold moved to the attacker.
    pub gold_pillaged: u64,
    /// Fort hitpoints destroyed.
    pub fort_damage: u32,
    /// Hash of the serialized outcome.
    pub outcome_hash: u64,
}

impl BattleMetrics {
    /// Summarize an outcome.
    #[must_use]
    pub fn from_outcome(
        attacker: &str,
        defender: &str,
        outcome: &BattleOutcome,
        outcome_hash: u64,
    ) -> Self {
        let winner = if outcome.attacker_won() {
            attacker
        } else {
            defender
        };
        Self {
            attacker: attacker.to_string(),
            defender: defender.to_string(),
            seed: outcome.seed,
            verdict: outcome.verdict,
            winner: winner.to_string(),
            turns_resolved: outcome.turns_resolved,
            attacker_losses: casualties::total(&outcome.attacker_losses),
            defender_losses: casualties::total(&outcome.defender_losses),
            gold_pillaged: outcome.gold_pillaged,
            fort_damage: outcome.fort_damage(),
            outcome_hash,
        }
    }
}

/// Per-entry record across a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Battles fought as attacker.
    pub attacks: u32,
    /// Attacks won.
    pub attacks_won: u32,
    /// Battles fought as defender.
    pub defenses: u32,
    /// Defenses held.
    pub defenses_held: u32,
    /// Units lost on either side.
    pub units_lost: u64,
    /// Gold pillaged from others.
    pub gold_taken: u64,
    /// Gold lost to pillage.
    pub gold_lost: u64,
}

impl EntryRecord {
    /// Share of attacks won.
    #[must_use]
    pub fn attack_win_rate(&self) -> f64 {
        rate(self.attacks_won, self.attacks)
    }

    /// Share of defenses held.
    #[must_use]
    pub fn defense_win_rate(&self) -> f64 {
        rate(self.defenses_held, self.defenses)
    }

    /// Share of all battles won.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        rate(
            self.attacks_won + self.defenses_held,
            self.attacks + self.defenses,
        )
    }
}

fn rate(won: u32, fought: u32) -> f64 {
    if fought == 0 {
        0.0
    } else {
        f64::from(won) / f64::from(fought)
    }
}

/// Aggregate summary of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total battles resolved.
    pub total_battles: u32,
    /// Attacker victories.
    pub victories: u32,
    /// Defender victories by casualty rate.
    pub defeats: u32,
    /// Battles tied on casualty rate.
    pub stalemates: u32,
    /// Average rounds fought.
    pub avg_turns: f64,
    /// Records by entry name.
    pub entries: BTreeMap<String, EntryRecord>,
    /// Overall win rates by entry name.
    pub win_rates: BTreeMap<String, f64>,
}

impl BatchSummary {
    /// Calculate summary from a list of battle metrics.
    #[must_use]
    pub fn from_battles(battles: &[BattleMetrics]) -> Self {
        if battles.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_battles: battles.len() as u32,
            ..Default::default()
        };
        let mut turns = 0u64;

        for battle in battles {
            turns += u64::from(battle.turns_resolved);
            match battle.verdict {
                Verdict::Victory => summary.victories += 1,
                Verdict::Defeat => summary.defeats += 1,
                Verdict::Stalemate => summary.stalemates += 1,
            }
            let attacker_won = battle.winner == battle.attacker;

            let attacker = summary.entries.entry(battle.attacker.clone()).or_default();
            attacker.attacks += 1;
            attacker.units_lost += battle.attacker_losses;
            attacker.gold_taken += battle.gold_pillaged;
            if attacker_won {
                attacker.attacks_won += 1;
            }

            let defender = summary.entries.entry(battle.defender.clone()).or_default();
            defender.defenses += 1;
            defender.units_lost += battle.defender_losses;
            defender.gold_lost += battle.gold_pillaged;
            if !attacker_won {
                defender.defenses_held += 1;
            }
        }

        summary.avg_turns = turns as f64 / battles.len() as f64;
        summary.win_rates = summary
            .entries
            .iter()
            .map(|(name, record)| (name.clone(), record.win_rate()))
            .collect();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battle(attacker: &str, defender: &str, verdict: Verdict, turns: u32) -> BattleMetrics {
        let winner = if verdict == Verdict::Victory {
            attacker
        } else {
            defender
        };
        BattleMetrics {
            attacker: attacker.to_string(),
            defender: defender.to_string(),
            seed: 0,
            verdict,
            winner: winner.to_string(),
            turns_resolved: turns,
            attacker_losses: 10,
            defender_losses: 20,
            gold_pillaged: if verdict == Verdict::Victory { 100 } else { 0 },
            fort_damage: 0,
            outcome_hash: 0,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_battles(&[]);
        assert_eq!(summary.total_battles, 0);
        assert!(summary.entries.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let battles = vec![
            battle("a", "b", Verdict::Victory, 10),
            battle("b", "a", Verdict::Defeat, 20),
            battle("a", "b", Verdict::Stalemate, 30),
        ];
        let summary = BatchSummary::from_battles(&battles);

        assert_eq!(summary.total_battles, 3);
        assert_eq!(summary.victories, 1);
        assert_eq!(summary.defeats, 1);
        assert_eq!(summary.stalemates, 1);
        assert!((summary.avg_turns - 20.0).abs() < f64::EPSILON);

        let a = &summary.entries["a"];
        assert_eq!(a.attacks, 2);
        assert_eq!(a.attacks_won, 1);
        assert_eq!(a.defenses_held, 1);
        assert_eq!(a.gold_taken, 100);
        assert!((summary.win_rates["a"] - 2.0 / 3.0).abs() < 1e-9);

        let b = &summary.entries["b"];
        assert_eq!(b.gold_lost, 100);
        assert!((b.defense_win_rate() - 0.5).abs() < 1e-9);
        assert!((b.attack_win_rate()).abs() < 1e-9);
    }
}
