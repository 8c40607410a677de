//! Resolution benchmarks for conquest_core.
//!
//! Run with: `cargo bench -p conquest_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use conquest_core::army::UnitType;
use conquest_core::combat::resolve_battle;
use conquest_core::espionage::{resolve_mission, MissionRequest};
use conquest_core::rate_limit::InMemoryHistory;
use conquest_core::rng::RngSource;
use conquest_core::ruleset::Ruleset;
use conquest_core::snapshot::ArmyBuilder;
use conquest_core::stats;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn garrison(owner: u64, scale: u64, ruleset: &Ruleset) -> conquest_core::army::Army {
    let mut builder = ArmyBuilder::new(owner).fort(ruleset, 3).gold(1_000_000);
    for level in 1..=3 {
        builder = builder
            .units(UnitType::Offense, level, scale)
            .units(UnitType::Defense, level, scale)
            .units(UnitType::Spy, level, scale / 10)
            .units(UnitType::Sentry, level, scale / 10);
    }
    builder.units(UnitType::Citizen, 1, scale).build_unchecked()
}

pub fn resolution_benchmark(c: &mut Criterion) {
    let ruleset = Ruleset::default();
    let attacker = garrison(1, 10_000, &ruleset);
    let defender = garrison(2, 8_000, &ruleset);

    c.bench_function("aggregate", |b| {
        b.iter(|| stats::aggregate(black_box(&ruleset), black_box(&attacker)));
    });

    c.bench_function("resolve_battle_50_turns", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed = seed.wrapping_add(1);
            resolve_battle(
                &ruleset,
                black_box(&attacker),
                black_box(&defender),
                50,
                &mut RngSource::from_seed(seed),
            )
        });
    });

    let history = InMemoryHistory::new();
    let request = MissionRequest::intel(10);
    c.bench_function("resolve_intel_mission", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed = seed.wrapping_add(1);
            resolve_mission(
                &ruleset,
                black_box(&attacker),
                black_box(&defender),
                &request,
                &history,
                1_700_000_000,
                &mut RngSource::from_seed(seed),
            )
        });
    });
}

criterion_group!(benches, resolution_benchmark);
criterion_main!(benches);
