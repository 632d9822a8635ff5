//! `dashsim fleet`: watch devices move between online and offline.

use std::path::Path;
use std::time::Duration;

use dashsim_core::{FleetConfig, FleetState, FleetStatusSimulator};

use super::{interrupt_flag, invalid_arg, load_config, runtime, wait_until_stopped};

pub struct FleetCommandConfig<'a> {
    pub total: Option<u32>,
    pub online_pct: Option<f64>,
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub duration: Option<Duration>,
    pub seed: Option<u64>,
    pub json: bool,
    pub config_path: Option<&'a Path>,
}

/// Apply command-line overrides on top of the file config, rejecting bad values.
fn resolve(mut config: FleetConfig, cmd: &FleetCommandConfig<'_>) -> Result<FleetConfig, String> {
    if let Some(total) = cmd.total {
        config.total = total;
    }
    if let Some(pct) = cmd.online_pct {
        if !pct.is_finite() || !(0.0..=1.0).contains(&pct) {
            return Err(format!("--online-pct must be within [0, 1], got {pct}"));
        }
        config.initial_online_pct = pct;
    }
    if let Some(ms) = cmd.min_delay_ms {
        config.min_tick_delay_ms = ms;
    }
    if let Some(ms) = cmd.max_delay_ms {
        if ms == 0 {
            return Err("--max-delay-ms must be greater than 0".to_string());
        }
        config.max_tick_delay_ms = ms;
    }
    if config.min_tick_delay_ms > config.max_tick_delay_ms {
        return Err(format!(
            "delay range is inverted: min {}ms > max {}ms",
            config.min_tick_delay_ms, config.max_tick_delay_ms
        ));
    }
    Ok(config)
}

/// Run the fleet command.
pub fn run(cmd: FleetCommandConfig<'_>) {
    let file = load_config(cmd.config_path);
    let config = resolve(file.fleet, &cmd).unwrap_or_else(|msg| invalid_arg(&msg));

    let sim = match cmd.seed {
        Some(seed) => FleetStatusSimulator::seeded(config, seed),
        None => FleetStatusSimulator::new(config),
    };

    let initial = sim.snapshot();
    let json = cmd.json;
    if json {
        print_json_line(&initial);
    } else {
        let (lo, hi) = sim.tick_delay_range();
        let c = initial.counts;
        println!("Fleet simulator: {} devices", c.total);
        println!("  Online:    {}", c.online);
        println!("  Offline:   {}", c.offline);
        println!("  Degraded:  {}", c.degraded);
        println!("  Delay:     {}-{}ms", lo.as_millis(), hi.as_millis());
        match cmd.duration {
            Some(d) => println!("  Duration:  {}ms", d.as_millis()),
            None => println!("  Duration:  until Ctrl+C"),
        }
        println!();
    }

    let mut previous = initial;
    let mut sim = sim.with_sink(move |state: &FleetState| {
        if json {
            print_json_line(state);
        } else {
            for change in state.changes_since(&previous) {
                println!("  {change}");
            }
        }
        previous = *state;
    });

    let running = interrupt_flag();
    runtime().block_on(async {
        sim.start();
        wait_until_stopped(&running, cmd.duration).await;
        sim.stop();
    });

    if !json {
        let c = sim.snapshot().counts;
        println!();
        println!(
            "{} ticks; final split {} online, {} offline, {} degraded",
            sim.tick_count(),
            c.online,
            c.offline,
            c.degraded
        );
    }
    if sim.sink_failures() > 0 {
        eprintln!("Warning: {} snapshot deliveries failed", sim.sink_failures());
    }
}

fn print_json_line(state: &FleetState) {
    match serde_json::to_string(state) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("could not serialize fleet state: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd() -> FleetCommandConfig<'static> {
        FleetCommandConfig {
            total: None,
            online_pct: None,
            min_delay_ms: None,
            max_delay_ms: None,
            duration: None,
            seed: None,
            json: false,
            config_path: None,
        }
    }

    #[test]
    fn test_resolve_without_flags_is_file_config() {
        let file = FleetConfig {
            total: 15,
            ..Default::default()
        };
        assert_eq!(resolve(file.clone(), &cmd()).unwrap(), file);
    }

    #[test]
    fn test_resolve_flags_override_file() {
        let config = resolve(
            FleetConfig::default(),
            &FleetCommandConfig {
                total: Some(15),
                online_pct: Some(0.5),
                min_delay_ms: Some(100),
                max_delay_ms: Some(200),
                ..cmd()
            },
        )
        .unwrap();
        assert_eq!(config.total, 15);
        assert_eq!(config.initial_online_pct, 0.5);
        assert_eq!((config.min_tick_delay_ms, config.max_tick_delay_ms), (100, 200));
    }

    #[test]
    fn test_resolve_small_total_is_left_to_simulator() {
        // The simulator raises it to the minimum; the CLI does not reject it.
        let config = resolve(
            FleetConfig::default(),
            &FleetCommandConfig {
                total: Some(0),
                ..cmd()
            },
        )
        .unwrap();
        let sim = FleetStatusSimulator::seeded(config, 1);
        assert_eq!(sim.snapshot().counts.total, 3);
    }

    #[test]
    fn test_resolve_rejects_out_of_range_pct() {
        for pct in [-0.1, 1.5, f64::NAN] {
            let result = resolve(
                FleetConfig::default(),
                &FleetCommandConfig {
                    online_pct: Some(pct),
                    ..cmd()
                },
            );
            assert!(result.is_err(), "pct {pct} accepted");
        }
    }

    #[test]
    fn test_resolve_rejects_inverted_delays() {
        let result = resolve(
            FleetConfig::default(),
            &FleetCommandConfig {
                min_delay_ms: Some(50_000),
                ..cmd()
            },
        );
        assert!(result.is_err());
    }
}
