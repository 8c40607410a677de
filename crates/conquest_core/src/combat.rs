//! Multi-round battle resolution.
//!
//! A battle walks `Init -> RoundLoop -> (Victory | Defeat | Stalemate) ->
//! Settled`. Each round:
//!
//! 1. Re-aggregates both armies from their surviving rows
//! 2. Swings each side's power by a bounded random factor
//! 3. Picks the round winner (ties go to the defender)
//! 4. Takes casualties from both pools, the loser's scaled up by the power
//!    ratio and the winner's scaled down, each within `[min, max]` per round
//!    unless the ratio reaches a rout
//! 5. Applies siege damage to the defender's fort: the swung attacker power
//!    at the siege rate, less the fort's current defense bonus
//!
//! The loop stops when the requested turns run out, when either pool is
//! empty, or at the ruleset's round ceiling, whichever comes first.
//!
//! A loss is an outcome, not an error. Only malformed requests fail.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::army::{is_defensive_casualty, merge_rows, Army, PlayerId, UnitRow, UnitType};
use crate::casualties;
use crate::error::{Result, ValidationError};
use crate::math::{apply_basis_points, cmp_fractions, ratio, scale, Fixed};
use crate::rng::RngSource;
use crate::ruleset::{CombatRules, Ruleset};
use crate::snapshot::validate_army;
use crate::stats::{aggregate, aggregate_detailed, PowerFigures};

/// One side of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The player who launched the attack.
    Attacker,
    /// The player being attacked.
    Defender,
}

/// Progress of a battle through its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattlePhase {
    /// Armies validated, no rounds fought.
    Init,
    /// Rounds in progress.
    RoundLoop,
    /// The attacker inflicted the higher casualty rate.
    Victory,
    /// The defender inflicted the higher casualty rate.
    Defeat,
    /// Casualty rates were exactly equal; the defender holds.
    Stalemate,
    /// Spoils and experience computed.
    Settled,
}

/// How the battle ended, from the attacker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Attacker won.
    Victory,
    /// Defender won outright.
    Defeat,
    /// Exact tie, awarded to the defender.
    Stalemate,
}

impl Verdict {
    /// Which side the verdict favours.
    #[must_use]
    pub const fn winner(self) -> Side {
        match self {
            Self::Victory => Side::Attacker,
            Self::Defeat | Self::Stalemate => Side::Defender,
        }
    }
}

/// What happened in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundLog {
    /// Round number, 1-based.
    pub round: u32,
    /// Attacker offense after variance.
    pub attacker_power: u64,
    /// Defender defense after variance.
    pub defender_power: u64,
    /// Round winner.
    pub winner: Side,
    /// Attacker units lost this round.
    pub attacker_casualties: u64,
    /// Defender units lost this round.
    pub defender_casualties: u64,
    /// Fort hitpoints removed this round.
    pub fort_damage: u32,
    /// Fort hitpoints left after the round.
    pub fort_hitpoints: u32,
}

/// Experience granted to each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExperienceAward {
    /// Attacker's experience.
    pub attacker: u64,
    /// Defender's experience.
    pub defender: u64,
}

/// Complete result of a battle. Nothing here has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleOutcome {
    /// Attacking player.
    pub attacker_id: PlayerId,
    /// Defending player.
    pub defender_id: PlayerId,
    /// Winning player.
    pub winner_id: PlayerId,
    /// How the battle ended.
    pub verdict: Verdict,
    /// Seed the battle was resolved with.
    pub seed: u64,
    /// Turns the caller asked for.
    pub turns_requested: u32,
    /// Rounds actually fought.
    pub turns_resolved: u32,
    /// Attacker units lost, per row.
    pub attacker_losses: Vec<UnitRow>,
    /// Defender units lost, per row.
    pub defender_losses: Vec<UnitRow>,
    /// Fort hitpoints before the battle.
    pub fort_hitpoints_before: u32,
    /// Fort hitpoints after the battle.
    pub fort_hitpoints_after: u32,
    /// Gold moved from defender to attacker.
    pub gold_pillaged: u64,
    /// Experience granted.
    pub experience: ExperienceAward,
    /// Attacker figures before the battle.
    pub attacker_power: PowerFigures,
    /// Defender figures before the battle.
    pub defender_power: PowerFigures,
    /// Per-round log.
    pub log: Vec<RoundLog>,
}

impl BattleOutcome {
    /// Fort hitpoints lost over the battle.
    #[must_use]
    pub const fn fort_damage(&self) -> u32 {
        self.fort_hitpoints_before - self.fort_hitpoints_after
    }

    /// Whether the attacker won.
    #[must_use]
    pub const fn attacker_won(&self) -> bool {
        matches!(self.verdict, Verdict::Victory)
    }

    /// Apply the outcome to in-memory copies of both armies.
    pub fn apply(&self, attacker: &mut Army, defender: &mut Army) {
        attacker.apply_losses(&self.attacker_losses);
        defender.apply_losses(&self.defender_losses);
        let gold = self.gold_pillaged.min(defender.gold);
        defender.gold -= gold;
        attacker.gold = attacker.gold.saturating_add(gold);
        attacker.experience = attacker.experience.saturating_add(self.experience.attacker);
        defender.experience = defender.experience.saturating_add(self.experience.defender);
        defender.structures.fort_hitpoints = self.fort_hitpoints_after;
    }
}

/// Resolve a battle between two army snapshots.
///
/// Neither snapshot is modified. With the same inputs and seed the outcome
/// is identical on every call.
pub fn resolve_battle(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    turns: u32,
    rng: &mut RngSource,
) -> Result<BattleOutcome> {
    let mut battle = Battle::new(ruleset, attacker, defender, turns)?;
    while battle.phase == BattlePhase::RoundLoop {
        battle.fight_round(rng);
    }
    Ok(battle.settle(rng.seed()))
}

/// Check a battle request before any computation.
pub fn validate_battle(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    turns: u32,
) -> std::result::Result<(), ValidationError> {
    let rules = &ruleset.combat;
    if turns < rules.min_turns || turns > rules.max_turns {
        return Err(ValidationError::TurnsOutOfRange {
            requested: turns,
            min: rules.min_turns,
            max: rules.max_turns,
        });
    }
    if attacker.owner == defender.owner {
        return Err(ValidationError::SelfTarget);
    }
    validate_army(ruleset, attacker)?;
    validate_army(ruleset, defender)?;
    if attacker.offense_pool() == 0 {
        return Err(ValidationError::EmptyArmy {
            owner: attacker.owner,
        });
    }
    if defender.population() == 0 {
        return Err(ValidationError::EmptyArmy {
            owner: defender.owner,
        });
    }
    Ok(())
}

/// Working state of one battle.
#[derive(Debug)]
struct Battle<'a> {
    ruleset: &'a Ruleset,
    phase: BattlePhase,
    attacker: Army,
    defender: Army,
    turns_requested: u32,
    round_limit: u32,
    round: u32,
    attacker_pool: u64,
    defender_pool: u64,
    attacker_losses: Vec<UnitRow>,
    defender_losses: Vec<UnitRow>,
    fort_hitpoints_before: u32,
    attacker_power: PowerFigures,
    defender_power: PowerFigures,
    log: Vec<RoundLog>,
}

impl<'a> Battle<'a> {
    fn new(ruleset: &'a Ruleset, attacker: &Army, defender: &Army, turns: u32) -> Result<Self> {
        validate_battle(ruleset, attacker, defender, turns)?;

        let attacker = attacker.clone();
        let mut defender = defender.clone();
        let max_hp = ruleset.fort_max_hitpoints(defender.structures.fort_level);
        defender.structures.fort_hitpoints = defender.structures.fort_hitpoints.min(max_hp);

        let mut battle = Self {
            ruleset,
            phase: BattlePhase::Init,
            turns_requested: turns,
            round_limit: turns.min(ruleset.combat.round_ceiling),
            round: 0,
            attacker_pool: attacker.offense_pool(),
            defender_pool: defender.defense_pool(),
            attacker_losses: Vec::new(),
            defender_losses: Vec::new(),
            fort_hitpoints_before: defender.structures.fort_hitpoints,
            attacker_power: aggregate(ruleset, &attacker),
            defender_power: aggregate(ruleset, &defender),
            log: Vec::new(),
            attacker,
            defender,
        };
        battle.advance();
        Ok(battle)
    }

    /// Move from `Init`/`RoundLoop` to the next phase.
    fn advance(&mut self) {
        let exhausted = self.round >= self.round_limit
            || self.attacker.offense_pool() == 0
            || self.defender.defense_pool() == 0;
        self.phase = if exhausted {
            self.verdict_phase()
        } else {
            BattlePhase::RoundLoop
        };
    }

    fn fight_round(&mut self, rng: &mut RngSource) {
        let ruleset = self.ruleset;
        let rules = &ruleset.combat;
        self.round += 1;

        let offense = aggregate(ruleset, &self.attacker).offense;
        let defense = aggregate_detailed(ruleset, &self.defender);

        let attacker_power = apply_basis_points(offense, rng.variance_bp(rules.variance_pct));
        let defender_power =
            apply_basis_points(defense.figures.defense, rng.variance_bp(rules.variance_pct));

        let winner = if attacker_power > defender_power {
            Side::Attacker
        } else {
            Side::Defender
        };
        let (strong, weak) = match winner {
            Side::Attacker => (attacker_power, defender_power),
            Side::Defender => (defender_power, attacker_power),
        };
        let (winner_rate, loser_rate) = loss_rates(rules, strong, weak);
        let (attacker_rate, defender_rate) = match winner {
            Side::Attacker => (winner_rate, loser_rate),
            Side::Defender => (loser_rate, winner_rate),
        };

        let attacker_rows: Vec<UnitRow> = self
            .attacker
            .units
            .iter()
            .copied()
            .filter(|row| row.unit == UnitType::Offense)
            .collect();
        let defender_rows: Vec<UnitRow> = self
            .defender
            .units
            .iter()
            .copied()
            .filter(|row| is_defensive_casualty(row.unit))
            .collect();

        let attacker_casualties =
            round_casualties(casualties::total(&attacker_rows), attacker_rate);
        let defender_casualties =
            round_casualties(casualties::total(&defender_rows), defender_rate);

        let attacker_lost = casualties::allocate(&attacker_rows, attacker_casualties);
        let defender_lost = casualties::allocate(&defender_rows, defender_casualties);
        self.attacker.apply_losses(&attacker_lost);
        self.defender.apply_losses(&defender_lost);
        self.attacker_losses.extend(attacker_lost);
        self.defender_losses.extend(defender_lost);

        // Siege lands every round, won or lost.
        let siege = apply_basis_points(attacker_power, rules.siege_rate_bp)
            .saturating_sub(defense.fort_defense);
        let hitpoints = &mut self.defender.structures.fort_hitpoints;
        let fort_damage = siege.min(u64::from(*hitpoints)) as u32;
        *hitpoints -= fort_damage;

        tracing::debug!(
            round = self.round,
            attacker_power,
            defender_power,
            ?winner,
            attacker_casualties,
            defender_casualties,
            fort_damage,
            "battle round"
        );

        self.log.push(RoundLog {
            round: self.round,
            attacker_power,
            defender_power,
            winner,
            attacker_casualties,
            defender_casualties,
            fort_damage,
            fort_hitpoints: self.defender.structures.fort_hitpoints,
        });

        self.advance();
    }

    /// Compare casualty rates inflicted on each side. Exact ties favour the
    /// defender.
    fn verdict_phase(&self) -> BattlePhase {
        if self.defender_pool == 0 {
            return BattlePhase::Victory;
        }
        match cmp_fractions(
            casualties::total(&self.defender_losses),
            self.defender_pool,
            casualties::total(&self.attacker_losses),
            self.attacker_pool,
        ) {
            Ordering::Greater => BattlePhase::Victory,
            Ordering::Less => BattlePhase::Defeat,
            Ordering::Equal => BattlePhase::Stalemate,
        }
    }

    fn settle(mut self, seed: u64) -> BattleOutcome {
        let ruleset = self.ruleset;
        let rules = &ruleset.combat;
        let verdict = match self.phase {
            BattlePhase::Victory => Verdict::Victory,
            BattlePhase::Defeat => Verdict::Defeat,
            _ => Verdict::Stalemate,
        };
        self.phase = BattlePhase::Settled;

        let attacker_lost = casualties::total(&self.attacker_losses);
        let defender_lost = casualties::total(&self.defender_losses);

        let gold_pillaged = if verdict == Verdict::Victory {
            let margin = if self.defender_pool == 0 {
                Fixed::ONE
            } else {
                ratio(defender_lost, self.defender_pool)
                    .saturating_sub(ratio(attacker_lost, self.attacker_pool))
            };
            pillage(rules, self.defender.gold, margin)
        } else {
            0
        };

        let attacker_xp = experience(rules, self.defender_power.defense);
        let defender_xp = experience(rules, self.attacker_power.offense);
        let experience = match verdict.winner() {
            Side::Attacker => ExperienceAward {
                attacker: attacker_xp,
                defender: loser_share(rules, defender_xp),
            },
            Side::Defender => ExperienceAward {
                attacker: loser_share(rules, attacker_xp),
                defender: defender_xp,
            },
        };

        let winner_id = match verdict.winner() {
            Side::Attacker => self.attacker.owner,
            Side::Defender => self.defender.owner,
        };

        tracing::debug!(
            ?verdict,
            rounds = self.round,
            attacker_lost,
            defender_lost,
            gold_pillaged,
            "battle settled"
        );

        BattleOutcome {
            attacker_id: self.attacker.owner,
            defender_id: self.defender.owner,
            winner_id,
            verdict,
            seed,
            turns_requested: self.turns_requested,
            turns_resolved: self.round,
            attacker_losses: merge_rows(self.attacker_losses),
            defender_losses: merge_rows(self.defender_losses),
            fort_hitpoints_before: self.fort_hitpoints_before,
            fort_hitpoints_after: self.defender.structures.fort_hitpoints,
            gold_pillaged,
            experience,
            attacker_power: self.attacker_power,
            defender_power: self.defender_power,
            log: self.log,
        }
    }
}

/// Per-round loss rates `(winner, loser)` in basis points for a power
/// matchup.
fn loss_rates(rules: &CombatRules, strong: u64, weak: u64) -> (u32, u32) {
    let base = u128::from(rules.base_loss_bp);
    let (strong, weak) = (u128::from(strong.max(1)), u128::from(weak));
    let bounded = |bp: u128| -> u32 {
        let bp = u32::try_from(bp).unwrap_or(u32::MAX);
        bp.max(rules.min_loss_bp).min(rules.max_loss_bp)
    };

    let loser = if weak == 0 || strong >= u128::from(rules.rout_ratio) * weak {
        10_000
    } else {
        bounded(base * strong / weak)
    };
    let winner = bounded(base * weak.max(1) / strong);
    (winner, loser)
}

/// Units lost from a pool at a rate: at least one while the pool is
/// non-empty, never more than the pool.
fn round_casualties(pool: u64, rate_bp: u32) -> u64 {
    if pool == 0 {
        return 0;
    }
    apply_basis_points(pool, rate_bp).max(1).min(pool)
}

/// Gold taken from the defender. `margin` is the difference between the
/// casualty rates, so a closer fight takes less.
fn pillage(rules: &CombatRules, gold: u64, margin: Fixed) -> u64 {
    let bonus = u32::try_from(scale(u64::from(rules.margin_pillage_bp), margin)).unwrap_or(u32::MAX);
    let rate = rules
        .base_pillage_bp
        .saturating_add(bonus)
        .min(rules.max_pillage_bp);
    apply_basis_points(gold, rate).min(gold)
}

fn experience(rules: &CombatRules, opponent_power: u64) -> u64 {
    let earned = rules
        .xp_base
        .saturating_add(opponent_power.saturating_mul(rules.xp_per_thousand_power) / 1_000);
    earned.min(rules.xp_cap)
}

fn loser_share(rules: &CombatRules, xp: u64) -> u64 {
    xp * u64::from(rules.loser_xp_pct) / 100
}
