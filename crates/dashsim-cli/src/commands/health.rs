//! `dashsim health`: stream drifting hardware metrics.

use std::path::Path;
use std::time::Duration;

use dashsim_core::{
    HealthConfig, MetricDriftSimulator, MetricHistory, MetricSnapshot, SnapshotSink,
};

use super::{interrupt_flag, invalid_arg, load_config, runtime, wait_until_stopped, write_json};

pub struct HealthCommandConfig<'a> {
    pub interval_ms: Option<u64>,
    pub noise: Option<f64>,
    pub duration: Option<Duration>,
    pub seed: Option<u64>,
    pub json: bool,
    pub config_path: Option<&'a Path>,
    pub output_path: Option<&'a Path>,
    pub history_points: usize,
}

/// Apply command-line overrides on top of the file config, rejecting bad values.
fn resolve(mut config: HealthConfig, cmd: &HealthCommandConfig<'_>) -> Result<HealthConfig, String> {
    if let Some(ms) = cmd.interval_ms {
        if ms == 0 {
            return Err("--interval-ms must be greater than 0".to_string());
        }
        config.tick_interval_ms = ms;
    }
    if let Some(noise) = cmd.noise {
        if !noise.is_finite() || noise < 0.0 {
            return Err(format!("--noise must be a finite value >= 0, got {noise}"));
        }
        config.noise_scale = noise;
    }
    Ok(config)
}

/// Run the health command.
pub fn run(cmd: HealthCommandConfig<'_>) {
    let file = load_config(cmd.config_path);
    let config = resolve(file.health, &cmd).unwrap_or_else(|msg| invalid_arg(&msg));

    let sim = match cmd.seed {
        Some(seed) => MetricDriftSimulator::seeded(config, seed),
        None => MetricDriftSimulator::new(config),
    };

    let history = MetricHistory::with_capacity(cmd.history_points);
    let mut recorder = history.clone();
    let json = cmd.json;
    let mut sim = sim.with_sink(move |snap: &MetricSnapshot| {
        recorder.deliver(snap);
        if json {
            print_json_line(snap);
        } else {
            print_row(snap);
        }
    });

    if !json {
        println!(
            "Health simulator: {} metrics, {}ms period, noise {}",
            sim.metric_names().len(),
            sim.tick_interval().as_millis(),
            sim.noise_scale()
        );
        match cmd.duration {
            Some(d) => println!("  Duration:  {}ms", d.as_millis()),
            None => println!("  Duration:  until Ctrl+C"),
        }
        println!();
        print_header(&sim);
    }

    let running = interrupt_flag();
    runtime().block_on(async {
        sim.start();
        wait_until_stopped(&running, cmd.duration).await;
        sim.stop();
    });

    if !json {
        println!();
        println!("{} ticks", sim.tick_count());
    }
    if sim.sink_failures() > 0 {
        eprintln!("Warning: {} snapshot deliveries failed", sim.sink_failures());
    }

    if let Some(path) = cmd.output_path {
        match write_json(&history.snapshots(), path) {
            Ok(()) => {
                if !json {
                    println!("History ({} snapshots) written to {}", history.len(), path.display());
                }
            }
            Err(e) => {
                eprintln!("Failed to write {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }
}

fn print_header(sim: &MetricDriftSimulator) {
    let mut line = String::new();
    for name in sim.metric_names() {
        let unit = sim
            .definition(&name)
            .map(|d| d.unit)
            .unwrap_or_default();
        let label = if unit.is_empty() {
            name
        } else {
            format!("{name} ({unit})")
        };
        line.push_str(&format!("{label:>18}"));
    }
    println!("{line}");
}

fn print_row(snap: &MetricSnapshot) {
    let line: String = snap
        .metrics
        .iter()
        .map(|r| format!("{:>18}", r.value))
        .collect();
    println!("{line}");
}

fn print_json_line(snap: &MetricSnapshot) {
    match serde_json::to_string(snap) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("could not serialize snapshot: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd() -> HealthCommandConfig<'static> {
        HealthCommandConfig {
            interval_ms: None,
            noise: None,
            duration: None,
            seed: None,
            json: false,
            config_path: None,
            output_path: None,
            history_points: 20,
        }
    }

    #[test]
    fn test_resolve_keeps_file_values_without_flags() {
        let file = HealthConfig {
            tick_interval_ms: 400,
            ..Default::default()
        };
        let config = resolve(file.clone(), &cmd()).unwrap();
        assert_eq!(config, file);
    }

    #[test]
    fn test_resolve_flags_override_file() {
        let config = resolve(
            HealthConfig::default(),
            &HealthCommandConfig {
                interval_ms: Some(250),
                noise: Some(0.0),
                ..cmd()
            },
        )
        .unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.noise_scale, 0.0);
    }

    #[test]
    fn test_resolve_rejects_zero_interval() {
        let err = resolve(
            HealthConfig::default(),
            &HealthCommandConfig {
                interval_ms: Some(0),
                ..cmd()
            },
        )
        .unwrap_err();
        assert!(err.contains("--interval-ms"));
    }

    #[test]
    fn test_resolve_rejects_bad_noise() {
        for noise in [-0.1, f64::NAN, f64::INFINITY] {
            let result = resolve(
                HealthConfig::default(),
                &HealthCommandConfig {
                    noise: Some(noise),
                    ..cmd()
                },
            );
            assert!(result.is_err(), "noise {noise} accepted");
        }
    }
}
