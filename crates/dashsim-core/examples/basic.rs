//! Basic manual-tick example.
//!
//! Builds both simulators from a fixed seed, ticks each a few times by hand,
//! and prints what changed.
//!
//! Run: `cargo run --example basic`

use dashsim_core::{FleetConfig, FleetStatusSimulator, HealthConfig, MetricDriftSimulator};

fn main() {
    // Seeded so every run prints the same numbers
    let health = MetricDriftSimulator::seeded(HealthConfig::default(), 7);
    let fleet = FleetStatusSimulator::seeded(
        FleetConfig {
            total: 15,
            ..Default::default()
        },
        7,
    );

    println!("Metrics: {}", health.metric_names().join(", "));
    for _ in 0..3 {
        let snap = health.tick();
        let line: Vec<String> = snap
            .metrics
            .iter()
            .map(|r| format!("{}={}{}", r.name, r.value, r.unit))
            .collect();
        println!("  {}", line.join("  "));
    }

    let mut previous = fleet.snapshot();
    let c = previous.counts;
    println!(
        "\nFleet: {} online, {} offline, {} degraded of {}",
        c.online, c.offline, c.degraded, c.total
    );
    for _ in 0..5 {
        let Some(state) = fleet.tick() else {
            break;
        };
        for change in state.changes_since(&previous) {
            println!("  {change}");
        }
        previous = state;
    }
}
