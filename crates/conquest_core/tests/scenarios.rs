//! End-to-end battle and espionage scenarios.

use conquest_core::casualties;
use conquest_core::combat::{resolve_battle, Verdict};
use conquest_core::error::EngineError;
use conquest_core::espionage::{resolve_mission, CasualtyClass, MissionRequest};
use conquest_core::prelude::*;
use conquest_test_utils::fixtures;

const NOW: u64 = 1_700_000_000;
const DAY: u64 = 24 * 60 * 60;

fn no_history() -> InMemoryHistory {
    InMemoryHistory::new()
}

// =========================================================================
// Battles
// =========================================================================

#[test]
fn test_overwhelming_siege() {
    let ruleset = Ruleset::default();
    let attacker = fixtures::siege_attacker();
    let defender = fixtures::siege_defender(&ruleset);

    assert_eq!(ruleset.combat.round_ceiling, 50);
    for seed in 0..10 {
        let outcome =
            resolve_battle(&ruleset, &attacker, &defender, 50, &mut RngSource::from_seed(seed))
                .unwrap();

        assert_eq!(outcome.verdict, Verdict::Victory);
        assert_eq!(outcome.winner_id, attacker.owner);
        assert!(outcome.turns_resolved <= ruleset.combat.round_ceiling);
        assert_eq!(outcome.fort_hitpoints_before, 50);
        assert_eq!(outcome.fort_hitpoints_after, 0);

        let defender_lost = casualties::total(&outcome.defender_losses);
        assert!(defender_lost > 0);
        assert!(outcome
            .defender_losses
            .iter()
            .all(|row| matches!(row.unit, UnitType::Defense | UnitType::Citizen)));

        let attacker_lost = casualties::total(&outcome.attacker_losses);
        assert!(attacker_lost > 0, "a one-sided fight still costs something");
        assert!(attacker_lost * 10 < attacker.offense_pool());
        assert!(outcome.gold_pillaged > 0);
        assert!(outcome.gold_pillaged <= 1_500);
    }
}

#[test]
fn test_fort_breached_in_first_round() {
    let ruleset = Ruleset::default();
    let outcome = resolve_battle(
        &ruleset,
        &fixtures::siege_attacker(),
        &fixtures::siege_defender(&ruleset),
        1,
        &mut RngSource::from_seed(5),
    )
    .unwrap();
    assert_eq!(outcome.turns_resolved, 1);
    assert_eq!(outcome.log[0].winner, Side::Attacker);
    assert_eq!(outcome.log[0].fort_hitpoints, 0);
    assert_eq!(outcome.fort_damage(), 50);
}

#[test]
fn test_siege_lands_when_defender_wins_round() {
    let mut ruleset = Ruleset::default();
    ruleset.combat.variance_pct = 0;
    let attacker = fixtures::siege_attacker();
    // 10,500 defense plus a 1% bonus from a fort at 10 of 50 hitpoints.
    let mut defender = fixtures::neutral(2)
        .units(UnitType::Defense, 1, 2_100)
        .fort(&ruleset, 1)
        .build_unchecked();
    defender.structures.fort_hitpoints = 10;

    let outcome =
        resolve_battle(&ruleset, &attacker, &defender, 1, &mut RngSource::from_seed(3)).unwrap();
    let round = &outcome.log[0];
    assert_eq!(round.attacker_power, 10_000);
    assert_eq!(round.defender_power, 10_605);
    assert_eq!(round.winner, Side::Defender);
    // 2% of 10,000 offense is 200, less the 105 fort bonus, capped at 10 hp.
    assert_eq!(round.fort_damage, 10);
    assert_eq!(round.fort_hitpoints, 0);
    assert_eq!(outcome.fort_damage(), 10);
    assert_eq!(outcome.gold_pillaged, 0);
}

#[test]
fn test_identical_armies_tie_to_defender() {
    let mut ruleset = Ruleset::default();
    ruleset.combat.variance_pct = 0;
    let (attacker, defender) = fixtures::mirror_pair(1_000);
    assert_eq!(
        Engine::new(ruleset.clone()).unwrap().aggregate_stats(&attacker).offense,
        Engine::new(ruleset.clone()).unwrap().aggregate_stats(&defender).defense
    );

    let outcome =
        resolve_battle(&ruleset, &attacker, &defender, 10, &mut RngSource::from_seed(1)).unwrap();
    assert_eq!(outcome.turns_resolved, 10);
    assert!(outcome.log.iter().all(|round| round.winner == Side::Defender));
    assert_eq!(
        casualties::total(&outcome.attacker_losses),
        casualties::total(&outcome.defender_losses)
    );
    assert_eq!(outcome.verdict, Verdict::Stalemate);
    assert_eq!(outcome.winner_id, defender.owner);
    assert_eq!(outcome.gold_pillaged, 0);
}

#[test]
fn test_identical_armies_with_variance_terminate() {
    let ruleset = Ruleset::default();
    let (attacker, defender) = fixtures::mirror_pair(1_000);
    for seed in 0..20 {
        let outcome =
            resolve_battle(&ruleset, &attacker, &defender, 50, &mut RngSource::from_seed(seed))
                .unwrap();
        assert!(outcome.turns_resolved <= 50);
        if outcome.verdict == Verdict::Stalemate {
            assert_eq!(outcome.winner_id, defender.owner);
        }
    }
}

#[test]
fn test_losers_still_gain_experience() {
    let ruleset = Ruleset::default();
    let outcome = resolve_battle(
        &ruleset,
        &fixtures::siege_attacker(),
        &fixtures::siege_defender(&ruleset),
        10,
        &mut RngSource::from_seed(8),
    )
    .unwrap();
    assert!(outcome.experience.defender > 0);
    assert!(outcome.experience.attacker > outcome.experience.defender);
}

#[test]
fn test_outcome_applies_to_snapshots() {
    let ruleset = Ruleset::default();
    let mut attacker = fixtures::siege_attacker();
    let mut defender = fixtures::siege_defender(&ruleset);
    let outcome =
        resolve_battle(&ruleset, &attacker, &defender, 5, &mut RngSource::from_seed(2)).unwrap();

    let gold_before = attacker.gold + defender.gold;
    let population_before = defender.population();
    outcome.apply(&mut attacker, &mut defender);

    assert_eq!(attacker.gold + defender.gold, gold_before, "gold is moved, never created");
    assert_eq!(
        defender.population(),
        population_before - casualties::total(&outcome.defender_losses)
    );
    assert_eq!(defender.structures.fort_hitpoints, outcome.fort_hitpoints_after);
}

// =========================================================================
// Espionage
// =========================================================================

#[test]
fn test_single_spy_against_overwhelming_sentries() {
    let ruleset = Ruleset::default();
    let attacker = fixtures::spy_army(1, 5);
    let defender = fixtures::guarded_target(2, 10_000_000);

    for seed in 0..10 {
        let outcome = resolve_mission(
            &ruleset,
            &attacker,
            &defender,
            &MissionRequest::intel(1),
            &no_history(),
            NOW,
            &mut RngSource::from_seed(seed),
        )
        .unwrap();
        assert!(!outcome.success);
        assert!(outcome.spies_lost <= 1);
        assert!(outcome.intel.is_none());
        assert!(outcome.units_killed.is_empty());
    }
}

#[test]
fn test_assassination_kills_lowest_levels_first() {
    let ruleset = Ruleset::default();
    let attacker = fixtures::spy_army(1, 5);
    let mut defender = fixtures::unguarded_garrison(2);
    let defense_rows: Vec<UnitRow> = defender
        .units
        .iter()
        .copied()
        .filter(|row| row.unit == UnitType::Defense)
        .collect();

    let outcome = resolve_mission(
        &ruleset,
        &attacker,
        &defender,
        &MissionRequest::assassinate(5, CasualtyClass::Defense),
        &no_history(),
        NOW,
        &mut RngSource::from_seed(21),
    )
    .unwrap();
    assert!(outcome.success);

    let killed = outcome.units_killed_total();
    assert!(killed > 0);
    assert_eq!(outcome.units_killed, casualties::allocate(&defense_rows, killed));

    let before = defender.count_of(UnitType::Defense);
    let workers = defender.count_of(UnitType::Worker);
    let mut attacker_copy = attacker.clone();
    outcome.apply(&mut attacker_copy, &mut defender);
    assert_eq!(defender.count_of(UnitType::Defense), before - killed);
    assert_eq!(defender.count_of(UnitType::Worker), workers);
    assert_eq!(attacker_copy, attacker);

    // The level-1 row empties before level 2 loses anyone.
    if killed < 10 {
        assert_eq!(defender.quantity(UnitType::Defense, 2), 20);
    } else {
        assert_eq!(defender.quantity(UnitType::Defense, 1), 0);
    }
    assert_eq!(defender.quantity(UnitType::Defense, 3), 30);
}

#[test]
fn test_infiltration_per_mission_cap_before_daily_caps() {
    let ruleset = Ruleset::default();
    let err = resolve_mission(
        &ruleset,
        &fixtures::spy_army(1, 50),
        &fixtures::unguarded_garrison(2),
        &MissionRequest::infiltrate(6, UnitType::Worker, 1),
        &no_history(),
        NOW,
        &mut RngSource::from_seed(0),
    )
    .unwrap_err();
    match err {
        EngineError::RateLimited(exceeded) => {
            assert_eq!(exceeded.limit, LimitKind::PerMission);
            assert_eq!(exceeded.cap, 5);
        }
        other => panic!("expected a per-mission denial, got {other}"),
    }
}

#[test]
fn test_infiltration_daily_caps_use_history() {
    let ruleset = Ruleset::default();
    let mut history = InMemoryHistory::new();
    for (target, at) in [(2, NOW - 10), (2, NOW - 20), (2, NOW - 30)] {
        history.record(ActionRecord {
            kind: ActionKind::Infiltrate,
            actor: Actor::Player(1),
            target,
            quantity: 5,
            at,
        });
    }
    let err = resolve_mission(
        &ruleset,
        &fixtures::spy_army(1, 50),
        &fixtures::unguarded_garrison(2),
        &MissionRequest::infiltrate(1, UnitType::Worker, 1),
        &history,
        NOW,
        &mut RngSource::from_seed(0),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::RateLimited(RateLimitExceeded {
            limit: LimitKind::PerUserPerDay,
            ..
        })
    ));

    // A day later the window has rolled past every record.
    resolve_mission(
        &ruleset,
        &fixtures::spy_army(1, 50),
        &fixtures::unguarded_garrison(2),
        &MissionRequest::infiltrate(1, UnitType::Worker, 1),
        &history,
        NOW + DAY,
        &mut RngSource::from_seed(0),
    )
    .unwrap();
}

// =========================================================================
// Recruitment limits
// =========================================================================

#[test]
fn test_recruitment_pair_limit() {
    let engine = Engine::default();
    let recruiter = Actor::Address("203.0.113.7".to_string());
    let mut history = InMemoryHistory::new();

    for click in 0..5 {
        let decision = engine.check_recruitment(&history, &recruiter, 2, NOW + click).unwrap();
        assert!(decision.is_allowed(), "click {} should be allowed", click + 1);
        history.record(ActionRecord {
            kind: ActionKind::Recruit,
            actor: recruiter.clone(),
            target: 2,
            quantity: 1,
            at: NOW + click,
        });
    }

    let sixth = engine.check_recruitment(&history, &recruiter, 2, NOW + 5).unwrap();
    match sixth {
        Decision::Deny(exceeded) => assert_eq!(exceeded.limit, LimitKind::RecruitPerPair),
        Decision::Allow => panic!("sixth click within the window must be denied"),
    }

    // Other targets are unaffected, and the window rolls.
    assert!(engine
        .check_recruitment(&history, &recruiter, 3, NOW + 5)
        .unwrap()
        .is_allowed());
    assert!(engine
        .check_recruitment(&history, &recruiter, 2, NOW + DAY)
        .unwrap()
        .is_allowed());
}

// =========================================================================
// Persistence
// =========================================================================

#[test]
fn test_attack_then_spy_through_ledger() {
    let ruleset = Ruleset::default();
    let engine = Engine::new(ruleset.clone()).unwrap();
    let ledger = InMemoryLedger::new();
    let mut attacker = fixtures::siege_attacker();
    attacker.units.extend(fixtures::spy_army(1, 5).units);
    ledger.insert(attacker).unwrap();
    ledger.insert(fixtures::siege_defender(&ruleset)).unwrap();

    let (battle, receipt) = engine.attack(&ledger, 1, 2, 10, Some(4), NOW).unwrap();
    assert_eq!(receipt.versions, vec![(1, 1), (2, 1)]);
    let defender = ledger.snapshot(2).unwrap();
    assert_eq!(defender.gold, 10_000 - battle.gold_pillaged);
    assert_eq!(defender.structures.fort_hitpoints, 0);

    let (mission, _) = engine
        .spy(&ledger, 1, 2, &MissionRequest::intel(3), Some(4), NOW + 1)
        .unwrap();
    assert!(mission.success, "the defender has no sentries");
    assert_eq!(mission.intel.unwrap().units, defender.units);
    assert_eq!(ledger.snapshot(2).unwrap().version, 2);
}
