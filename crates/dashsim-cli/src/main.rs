//! CLI for dashsim: simulated hardware health and fleet status, live in the terminal.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dashsim")]
#[command(about = "dashsim: plausible live telemetry for dashboards, without the hardware")]
#[command(version = dashsim_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream drifting hardware metrics (CPU, RAM, disk, fan) as a table or JSON lines
    Health {
        /// Tick period in milliseconds (overrides the config file)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Gaussian noise multiplier relative to each metric's range
        #[arg(long)]
        noise: Option<f64>,

        /// Stop after this long (e.g. "30s", "5m", "500ms"); default: until Ctrl+C
        #[arg(long, value_parser = commands::parse_duration)]
        duration: Option<Duration>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Print one JSON object per tick instead of a table
        #[arg(long)]
        json: bool,

        /// JSON config file with `health` and `fleet` sections
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the buffered metric history as JSON on exit
        #[arg(long)]
        output: Option<PathBuf>,

        /// Snapshots kept in the history buffer
        #[arg(long, default_value_t = dashsim_core::DEFAULT_HISTORY_POINTS)]
        history: usize,
    },

    /// Watch a device fleet move between online and offline
    Fleet {
        /// Number of devices (minimum 3)
        #[arg(long)]
        total: Option<u32>,

        /// Starting online fraction in [0, 1]
        #[arg(long)]
        online_pct: Option<f64>,

        /// Lower bound of the random delay between ticks, in milliseconds
        #[arg(long)]
        min_delay_ms: Option<u64>,

        /// Upper bound of the random delay between ticks, in milliseconds
        #[arg(long)]
        max_delay_ms: Option<u64>,

        /// Stop after this long (e.g. "2m", "1h"); default: until Ctrl+C
        #[arg(long, value_parser = commands::parse_duration)]
        duration: Option<Duration>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Print one JSON object per tick instead of change lines
        #[arg(long)]
        json: bool,

        /// JSON config file with `health` and `fleet` sections
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Health {
            interval_ms,
            noise,
            duration,
            seed,
            json,
            config,
            output,
            history,
        } => commands::health::run(commands::health::HealthCommandConfig {
            interval_ms,
            noise,
            duration,
            seed,
            json,
            config_path: config.as_deref(),
            output_path: output.as_deref(),
            history_points: history,
        }),
        Commands::Fleet {
            total,
            online_pct,
            min_delay_ms,
            max_delay_ms,
            duration,
            seed,
            json,
            config,
        } => commands::fleet::run(commands::fleet::FleetCommandConfig {
            total,
            online_pct,
            min_delay_ms,
            max_delay_ms,
            duration,
            seed,
            json,
            config_path: config.as_deref(),
        }),
    }
}
