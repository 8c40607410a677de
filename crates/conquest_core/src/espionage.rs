//! Espionage missions: intel, assassination and infiltration.
//!
//! Every mission follows the same path:
//!
//! 1. Validate the request (spy count, target, armies)
//! 2. Consult the rate limiter; a denial ends the mission before any roll
//! 3. Check the attacker owns enough spies of the mission's level
//! 4. Roll success from mission spy power against defender sentry power
//! 5. Roll spy losses and, on success, the mission's effect
//!
//! Missions only ever cost the attacker spies of the mission's level.

use serde::{Deserialize, Serialize};

use crate::army::{Army, PlayerId, StructureState, UnitRow, UnitType};
use crate::casualties;
use crate::error::{EngineError, Result, ValidationError};
use crate::math::{ratio, scale, Fixed};
use crate::rate_limit::{ActionHistory, ActionKind, ActionRecord, Actor, RateLimiter};
use crate::rng::RngSource;
use crate::ruleset::Ruleset;
use crate::snapshot::validate_army;
use crate::stats::{aggregate, PowerFigures};

/// Mission variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionType {
    /// Reveal the target's army.
    Intel,
    /// Kill units of one casualty class.
    Assassinate,
    /// Kill units of one specific row.
    Infiltrate,
}

impl MissionType {
    /// Upper-case mission name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Intel => "INTEL",
            Self::Assassinate => "ASSASSINATE",
            Self::Infiltrate => "INFILTRATE",
        }
    }

    /// Rate-limiter action kind.
    #[must_use]
    pub const fn action_kind(self) -> ActionKind {
        match self {
            Self::Intel => ActionKind::Intel,
            Self::Assassinate => ActionKind::Assassinate,
            Self::Infiltrate => ActionKind::Infiltrate,
        }
    }

    /// Spy level the mission draws from: basic spies gather intel,
    /// infiltrators infiltrate, assassins assassinate.
    #[must_use]
    pub const fn spy_level(self) -> u8 {
        match self {
            Self::Intel => 1,
            Self::Infiltrate => 2,
            Self::Assassinate => 3,
        }
    }
}

/// Unit groups an assassination may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CasualtyClass {
    /// Citizens and workers.
    CitizenWorker,
    /// Offensive units.
    Offense,
    /// Defensive units.
    Defense,
}

impl CasualtyClass {
    /// Whether a unit type belongs to the class.
    #[must_use]
    pub const fn contains(self, unit: UnitType) -> bool {
        match self {
            Self::CitizenWorker => matches!(unit, UnitType::Citizen | UnitType::Worker),
            Self::Offense => matches!(unit, UnitType::Offense),
            Self::Defense => matches!(unit, UnitType::Defense),
        }
    }
}

/// What a mission aims at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionTarget {
    /// A casualty class, for assassination.
    Class(CasualtyClass),
    /// One (type, level) row, for infiltration.
    Row {
        /// Unit type.
        unit: UnitType,
        /// Unit level.
        level: u8,
    },
}

/// A mission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionRequest {
    /// Mission variant.
    pub mission: MissionType,
    /// Spies to send.
    pub spies: u64,
    /// Target, required for assassination and infiltration.
    pub target: Option<MissionTarget>,
}

impl MissionRequest {
    /// Intel mission.
    #[must_use]
    pub const fn intel(spies: u64) -> Self {
        Self {
            mission: MissionType::Intel,
            spies,
            target: None,
        }
    }

    /// Assassination against a casualty class.
    #[must_use]
    pub const fn assassinate(spies: u64, class: CasualtyClass) -> Self {
        Self {
            mission: MissionType::Assassinate,
            spies,
            target: Some(MissionTarget::Class(class)),
        }
    }

    /// Infiltration against one row.
    #[must_use]
    pub const fn infiltrate(spies: u64, unit: UnitType, level: u8) -> Self {
        Self {
            mission: MissionType::Infiltrate,
            spies,
            target: Some(MissionTarget::Row { unit, level }),
        }
    }
}

/// Read-only view of a defender, returned by a successful intel mission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntelReport {
    /// Player spied on.
    pub player: PlayerId,
    /// Unit rows.
    pub units: Vec<UnitRow>,
    /// Power figures.
    pub power: PowerFigures,
    /// Gold on hand.
    pub gold: u64,
    /// Structures.
    pub structures: StructureState,
}

impl IntelReport {
    fn of(ruleset: &Ruleset, army: &Army) -> Self {
        Self {
            player: army.owner,
            units: army.units.clone(),
            power: aggregate(ruleset, army),
            gold: army.gold,
            structures: army.structures,
        }
    }
}

/// Result of a mission. Nothing here has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionOutcome {
    /// Mission variant.
    pub mission: MissionType,
    /// Spying player.
    pub attacker_id: PlayerId,
    /// Target player.
    pub defender_id: PlayerId,
    /// Whether the mission succeeded.
    pub success: bool,
    /// Success chance that was rolled against, in basis points.
    pub success_chance_bp: u32,
    /// Spies sent.
    pub spies_sent: u64,
    /// Level of the spies sent.
    pub spy_level: u8,
    /// Spies captured or killed.
    pub spies_lost: u64,
    /// Defender units killed.
    pub units_killed: Vec<UnitRow>,
    /// Intel gathered.
    pub intel: Option<IntelReport>,
    /// Seed the mission was resolved with.
    pub seed: u64,
}

impl MissionOutcome {
    /// Total defender units killed.
    #[must_use]
    pub fn units_killed_total(&self) -> u64 {
        casualties::total(&self.units_killed)
    }

    /// Attacker losses as unit rows.
    #[must_use]
    pub fn attacker_losses(&self) -> Vec<UnitRow> {
        if self.spies_lost == 0 {
            return Vec::new();
        }
        vec![UnitRow::new(UnitType::Spy, self.spy_level, self.spies_lost)]
    }

    /// Rate-limiter record for this mission.
    #[must_use]
    pub fn action_record(&self, at: u64) -> ActionRecord {
        ActionRecord {
            kind: self.mission.action_kind(),
            actor: Actor::Player(self.attacker_id),
            target: self.defender_id,
            quantity: self.spies_sent,
            at,
        }
    }

    /// Apply the outcome to in-memory copies of both armies.
    pub fn apply(&self, attacker: &mut Army, defender: &mut Army) {
        attacker.apply_losses(&self.attacker_losses());
        defender.apply_losses(&self.units_killed);
    }
}

/// Resolve an espionage mission.
///
/// `history` and `now` feed the rate limiter. A denial is returned as
/// [`EngineError::RateLimited`] before any roll is made.
pub fn resolve_mission(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    request: &MissionRequest,
    history: &dyn ActionHistory,
    now: u64,
    rng: &mut RngSource,
) -> Result<MissionOutcome> {
    validate_mission(ruleset, attacker, defender, request)?;

    let limiter = RateLimiter::new(ruleset);
    let decision = match request.mission {
        MissionType::Infiltrate => limiter.check_infiltration(
            history,
            attacker.owner,
            defender.owner,
            request.spies,
            now,
        )?,
        mission => limiter.check_mission_size(mission.action_kind(), request.spies),
    };
    decision.into_result()?;

    let spy_level = request.mission.spy_level();
    let available = attacker.quantity(UnitType::Spy, spy_level);
    if request.spies > available {
        return Err(EngineError::insufficient(
            format!("level {spy_level} spies"),
            request.spies,
            available,
        ));
    }

    let chance = success_chance(ruleset, attacker, defender, request.spies);
    let success = rng.chance(chance);
    let rules = &ruleset.espionage;

    let mut outcome = MissionOutcome {
        mission: request.mission,
        attacker_id: attacker.owner,
        defender_id: defender.owner,
        success,
        success_chance_bp: u32::try_from(scale(10_000, chance)).unwrap_or(10_000),
        spies_sent: request.spies,
        spy_level,
        spies_lost: 0,
        units_killed: Vec::new(),
        intel: None,
        seed: rng.seed(),
    };

    match (request.mission, success) {
        (MissionType::Intel, true) => {
            outcome.spies_lost = rng.binomial_bp(request.spies, rules.intel_success_loss_bp);
            outcome.intel = Some(IntelReport::of(ruleset, defender));
        }
        (MissionType::Intel, false) => {
            outcome.spies_lost = rng.binomial_bp(request.spies, rules.intel_capture_bp);
        }
        (MissionType::Assassinate, true) => {
            if let Some(MissionTarget::Class(class)) = request.target {
                let rows: Vec<UnitRow> = defender
                    .units
                    .iter()
                    .copied()
                    .filter(|row| class.contains(row.unit))
                    .collect();
                let kills = rng
                    .range(1, request.spies.saturating_mul(rules.assassinate_kills_per_spy))
                    .min(rules.assassinate_max_kills);
                outcome.units_killed = casualties::allocate(&rows, kills);
            }
        }
        (MissionType::Infiltrate, true) => {
            if let Some(MissionTarget::Row { unit, level }) = request.target {
                let row = UnitRow::new(unit, level, defender.quantity(unit, level));
                let kills = rng.range(
                    1,
                    request.spies.saturating_mul(rules.infiltrate_kills_per_spy),
                );
                outcome.units_killed = casualties::allocate_single(&row, kills)
                    .into_iter()
                    .collect();
            }
        }
        (MissionType::Assassinate | MissionType::Infiltrate, false) => {
            outcome.spies_lost = rng.binomial_bp(request.spies, rules.capture_bp);
        }
    }

    tracing::debug!(
        mission = request.mission.name(),
        success,
        chance_bp = outcome.success_chance_bp,
        spies_lost = outcome.spies_lost,
        killed = outcome.units_killed_total(),
        "mission resolved"
    );

    Ok(outcome)
}

/// Check a mission request before any computation.
pub fn validate_mission(
    ruleset: &Ruleset,
    attacker: &Army,
    defender: &Army,
    request: &MissionRequest,
) -> std::result::Result<(), ValidationError> {
    if request.spies == 0 {
        return Err(ValidationError::ZeroSpies);
    }
    if attacker.owner == defender.owner {
        return Err(ValidationError::SelfTarget);
    }
    let missing = || ValidationError::MissingTarget {
        mission: request.mission.name().to_string(),
    };
    match (request.mission, request.target) {
        (MissionType::Intel, _)
        | (MissionType::Assassinate, Some(MissionTarget::Class(_))) => {}
        (MissionType::Infiltrate, Some(MissionTarget::Row { unit, level })) => {
            if ruleset.unit(unit, level).is_none() {
                return Err(ValidationError::LevelOutOfRange {
                    kind: unit.name().to_string(),
                    level: u32::from(level),
                });
            }
        }
        _ => return Err(missing()),
    }
    validate_army(ruleset, attacker)?;
    validate_army(ruleset, defender)
}

/// Chance the mission succeeds.
///
/// The mission's spy power is the sent spies' share of the attacker's
/// total spy power. Against no sentries the mission always succeeds;
/// otherwise the chance is `spy / (spy + sentry)`, capped at the ruleset's
/// ceiling.
#[must_use]
pub fn success_chance(ruleset: &Ruleset, attacker: &Army, defender: &Army, spies: u64) -> Fixed {
    let sentry = aggregate(ruleset, defender).sentry;
    if sentry == 0 {
        return Fixed::ONE;
    }

    let spy_units = attacker.count_of(UnitType::Spy);
    let spy_power = aggregate(ruleset, attacker).spy;
    let mission_power = if spy_units == 0 {
        0
    } else {
        let share = u128::from(spy_power) * u128::from(spies.min(spy_units)) / u128::from(spy_units);
        u64::try_from(share).unwrap_or(u64::MAX)
    };

    let chance = ratio(mission_power, mission_power.saturating_add(sentry));
    chance.min(crate::math::basis_points(ruleset.espionage.success_ceiling_bp))
}
