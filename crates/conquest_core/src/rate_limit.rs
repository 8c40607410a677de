//! Abuse limits over a rolling window of past actions.
//!
//! The limiter holds no state of its own. A history collaborator returns
//! the matching records, the limiter sums them and decides. A denial names
//! the exact limit that was hit so the host can tell the player why.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::army::PlayerId;
use crate::error::{PersistenceError, Result};
use crate::ruleset::Ruleset;

/// Who performed an action. Recruit clicks may come from visitors who are
/// only known by address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// A signed-in player.
    Player(PlayerId),
    /// An anonymous visitor, keyed by network address.
    Address(String),
}

/// Kind of rate-limited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// A recruit click that grants the target a citizen.
    Recruit,
    /// An intel mission.
    Intel,
    /// An assassination mission.
    Assassinate,
    /// An infiltration mission.
    Infiltrate,
}

/// One past action as stored by the history collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Action kind.
    pub kind: ActionKind,
    /// Who acted.
    pub actor: Actor,
    /// Player acted upon.
    pub target: PlayerId,
    /// Units involved: recruits granted or spies sent.
    pub quantity: u64,
    /// Unix timestamp in seconds.
    pub at: u64,
}

/// Source of past actions.
pub trait ActionHistory {
    /// Records of `kind` with a timestamp at or after `since`.
    fn records_since(
        &self,
        kind: ActionKind,
        since: u64,
    ) -> std::result::Result<Vec<ActionRecord>, PersistenceError>;
}

/// The specific limit behind a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitKind {
    /// Recruit clicks from one recruiter to one target.
    RecruitPerPair,
    /// Recruits absorbed by one target.
    RecruitPerTarget,
    /// Spies sent on a single mission.
    PerMission,
    /// Infiltrators sent by one attacker against one defender.
    PerUserPerDay,
    /// Infiltrators sent by one attacker overall.
    PerDayGlobal,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::RecruitPerPair => "recruitment per recruiter",
            Self::RecruitPerTarget => "recruitment per target",
            Self::PerMission => "per-mission",
            Self::PerUserPerDay => "per-user daily",
            Self::PerDayGlobal => "daily",
        };
        f.write_str(text)
    }
}

/// A rate limit refused the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("The {limit} limit is {cap}; {used} already used, {requested} requested")]
pub struct RateLimitExceeded {
    /// Limit that was hit.
    pub limit: LimitKind,
    /// Configured cap.
    pub cap: u64,
    /// Amount already used in the window.
    pub used: u64,
    /// Amount the action asked for.
    pub requested: u64,
}

/// Outcome of a limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is refused.
    Deny(RateLimitExceeded),
}

impl Decision {
    /// Whether the action may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Convert into a `Result`, failing on denial.
    pub fn into_result(self) -> std::result::Result<(), RateLimitExceeded> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(exceeded) => Err(exceeded),
        }
    }
}

/// Stateless limit checks against a ruleset's caps.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter<'a> {
    ruleset: &'a Ruleset,
}

impl<'a> RateLimiter<'a> {
    /// Create a limiter for a ruleset.
    #[must_use]
    pub const fn new(ruleset: &'a Ruleset) -> Self {
        Self { ruleset }
    }

    /// Check one recruit click from `actor` to `target` at `now`.
    pub fn check_recruitment(
        &self,
        history: &dyn ActionHistory,
        actor: &Actor,
        target: PlayerId,
        now: u64,
    ) -> Result<Decision> {
        let limits = &self.ruleset.rate_limits;
        let records = self.window(history, ActionKind::Recruit, now)?;

        let pair: u64 = records
            .iter()
            .filter(|r| &r.actor == actor && r.target == target)
            .map(|r| r.quantity)
            .sum();
        if let Some(denied) = exceeds(LimitKind::RecruitPerPair, limits.recruit_per_pair, pair, 1) {
            return Ok(denied);
        }

        let absorbed: u64 = records
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.quantity)
            .sum();
        if let Some(denied) =
            exceeds(LimitKind::RecruitPerTarget, limits.recruit_per_target, absorbed, 1)
        {
            return Ok(denied);
        }

        Ok(Decision::Allow)
    }

    /// Check the spy count of an intel or assassination mission.
    #[must_use]
    pub fn check_mission_size(&self, kind: ActionKind, spies: u64) -> Decision {
        let espionage = &self.ruleset.espionage;
        let cap = match kind {
            ActionKind::Intel => u64::from(espionage.intel_max_spies),
            ActionKind::Assassinate => u64::from(espionage.assassinate_max_spies),
            ActionKind::Infiltrate => self.ruleset.rate_limits.infiltrate_per_mission,
            ActionKind::Recruit => return Decision::Allow,
        };
        exceeds(LimitKind::PerMission, cap, 0, spies).unwrap_or(Decision::Allow)
    }

    /// Check an infiltration of `spies` infiltrators by `attacker` against
    /// `defender` at `now`. Each of the three caps is checked on its own;
    /// the per-mission cap is checked before the history is consulted.
    pub fn check_infiltration(
        &self,
        history: &dyn ActionHistory,
        attacker: PlayerId,
        defender: PlayerId,
        spies: u64,
        now: u64,
    ) -> Result<Decision> {
        let limits = &self.ruleset.rate_limits;

        let per_mission = self.check_mission_size(ActionKind::Infiltrate, spies);
        if !per_mission.is_allowed() {
            return Ok(per_mission);
        }

        let records = self.window(history, ActionKind::Infiltrate, now)?;
        let actor = Actor::Player(attacker);
        let by_attacker: Vec<&ActionRecord> = records.iter().filter(|r| r.actor == actor).collect();

        let against_defender: u64 = by_attacker
            .iter()
            .filter(|r| r.target == defender)
            .map(|r| r.quantity)
            .sum();
        if let Some(denied) = exceeds(
            LimitKind::PerUserPerDay,
            limits.infiltrate_per_user_per_day,
            against_defender,
            spies,
        ) {
            return Ok(denied);
        }

        let overall: u64 = by_attacker.iter().map(|r| r.quantity).sum();
        if let Some(denied) =
            exceeds(LimitKind::PerDayGlobal, limits.infiltrate_per_day, overall, spies)
        {
            return Ok(denied);
        }

        Ok(Decision::Allow)
    }

    /// Records of `kind` strictly inside the rolling window ending at `now`.
    fn window(
        &self,
        history: &dyn ActionHistory,
        kind: ActionKind,
        now: u64,
    ) -> Result<Vec<ActionRecord>> {
        let cutoff = now.saturating_sub(self.ruleset.rate_limits.window_secs);
        let mut records = history.records_since(kind, cutoff)?;
        records.retain(|r| r.kind == kind && r.at > cutoff && r.at <= now);
        Ok(records)
    }
}

fn exceeds(limit: LimitKind, cap: u64, used: u64, requested: u64) -> Option<Decision> {
    (used.saturating_add(requested) > cap).then(|| {
        tracing::debug!(%limit, cap, used, requested, "rate limit denied");
        Decision::Deny(RateLimitExceeded {
            limit,
            cap,
            used,
            requested,
        })
    })
}

/// In-memory action history for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    records: Vec<ActionRecord>,
}

impl InMemoryHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn record(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ActionHistory for InMemoryHistory {
    fn records_since(
        &self,
        kind: ActionKind,
        since: u64,
    ) -> std::result::Result<Vec<ActionRecord>, PersistenceError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.kind == kind && r.at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;
    const NOW: u64 = 10 * DAY;

    fn recruit(actor: &Actor, target: PlayerId, at: u64) -> ActionRecord {
        ActionRecord {
            kind: ActionKind::Recruit,
            actor: actor.clone(),
            target,
            quantity: 1,
            at,
        }
    }

    fn infiltration(attacker: PlayerId, target: PlayerId, spies: u64, at: u64) -> ActionRecord {
        ActionRecord {
            kind: ActionKind::Infiltrate,
            actor: Actor::Player(attacker),
            target,
            quantity: spies,
            at,
        }
    }

    #[test]
    fn test_fifth_recruit_allowed_sixth_denied() {
        let ruleset = Ruleset::default();
        let limiter = RateLimiter::new(&ruleset);
        let actor = Actor::Address("10.0.0.1".to_string());
        let mut history = InMemoryHistory::new();

        for i in 0..4 {
            history.record(recruit(&actor, 9, NOW - 1_000 + i));
        }
        let fifth = limiter.check_recruitment(&history, &actor, 9, NOW).unwrap();
        assert_eq!(fifth, Decision::Allow);

        history.record(recruit(&actor, 9, NOW - 10));
        let sixth = limiter.check_recruitment(&history, &actor, 9, NOW).unwrap();
        match sixth {
            Decision::Deny(exceeded) => {
                assert_eq!(exceeded.limit, LimitKind::RecruitPerPair);
                assert_eq!(exceeded.cap, 5);
                assert_eq!(exceeded.used, 5);
            }
            Decision::Allow => panic!("sixth recruit should be denied"),
        }
    }

    #[test]
    fn test_recruit_window_is_rolling() {
        let ruleset = Ruleset::default();
        let limiter = RateLimiter::new(&ruleset);
        let actor = Actor::Player(3);
        let mut history = InMemoryHistory::new();
        for i in 0..5 {
            // Exactly one window old or older: expired.
            history.record(recruit(&actor, 9, NOW - DAY - i));
        }
        assert!(limiter
            .check_recruitment(&history, &actor, 9, NOW)
            .unwrap()
            .is_allowed());
    }

    #[test]
    fn test_target_absorbs_at_most_25() {
        let ruleset = Ruleset::default();
        let limiter = RateLimiter::new(&ruleset);
        let mut history = InMemoryHistory::new();
        for i in 0..25 {
            history.record(recruit(&Actor::Player(100 + i), 9, NOW - 60));
        }
        let decision = limiter
            .check_recruitment(&history, &Actor::Player(1), 9, NOW)
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Deny(RateLimitExceeded {
                limit: LimitKind::RecruitPerTarget,
                ..
            })
        ));
    }

    #[test]
    fn test_infiltration_per_mission_checked_first() {
        let ruleset = Ruleset::default();
        let limiter = RateLimiter::new(&ruleset);
        let history = InMemoryHistory::new();
        let decision = limiter
            .check_infiltration(&history, 1, 2, 6, NOW)
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Deny(RateLimitExceeded {
                limit: LimitKind::PerMission,
                ..
            })
        ));
        assert!(limiter
            .check_infiltration(&history, 1, 2, 5, NOW)
            .unwrap()
            .is_allowed());
    }

    #[test]
    fn test_infiltration_daily_caps_are_independent() {
        let ruleset = Ruleset::default();
        let limiter = RateLimiter::new(&ruleset);
        let mut history = InMemoryHistory::new();

        // 15 spies already sent at defender 2: per-user cap reached.
        for _ in 0..3 {
            history.record(infiltration(1, 2, 5, NOW - 100));
        }
        let decision = limiter.check_infiltration(&history, 1, 2, 1, NOW).unwrap();
        assert!(matches!(
            decision,
            Decision::Deny(RateLimitExceeded {
                limit: LimitKind::PerUserPerDay,
                ..
            })
        ));

        // A different defender is still fine until the global cap.
        assert!(limiter
            .check_infiltration(&history, 1, 3, 5, NOW)
            .unwrap()
            .is_allowed());
        for target in 3..6 {
            history.record(infiltration(1, target, 5, NOW - 50));
        }
        let decision = limiter.check_infiltration(&history, 1, 7, 1, NOW).unwrap();
        assert!(matches!(
            decision,
            Decision::Deny(RateLimitExceeded {
                limit: LimitKind::PerDayGlobal,
                ..
            })
        ));
    }

    #[test]
    fn test_mission_size_caps() {
        let ruleset = Ruleset::default();
        let limiter = RateLimiter::new(&ruleset);
        assert!(limiter.check_mission_size(ActionKind::Intel, 10).is_allowed());
        assert!(!limiter.check_mission_size(ActionKind::Intel, 11).is_allowed());
        assert!(limiter.check_mission_size(ActionKind::Assassinate, 5).is_allowed());
        assert!(!limiter.check_mission_size(ActionKind::Assassinate, 6).is_allowed());
    }
}
