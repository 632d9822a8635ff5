//! # dashsim-core
//!
//! **Plausible live telemetry for dashboards, without the hardware.**
//!
//! `dashsim-core` drives two independent simulators that feed a monitoring UI
//! with data that looks alive:
//!
//! - [`MetricDriftSimulator`]: named continuous metrics (CPU temperature, fan
//!   speed, ...) under a bounded random walk plus Gaussian noise, ticking on a
//!   fixed period.
//! - [`FleetStatusSimulator`]: a device fleet split into online, offline and
//!   degraded counts that always sum to the total, ticking after randomized
//!   delays.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dashsim_core::{HealthConfig, MetricDriftSimulator, MetricSnapshot};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sim = MetricDriftSimulator::new(HealthConfig::default())
//!     .with_sink(|snap: &MetricSnapshot| {
//!         println!("cpu {:?}%", snap.value("cpuUsage"));
//!     });
//!
//! // Ticks once now, then every second on the tokio runtime.
//! sim.start();
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! sim.stop();
//! # }
//! ```
//!
//! ## Architecture
//!
//! Config → Simulator (state behind one lock) → Sink
//!
//! Every simulator owns its state and at most one timer task. Ticks, manual or
//! scheduled, mutate state under the lock and hand the new snapshot to the
//! installed [`SnapshotSink`]. A panicking sink is contained and counted; it
//! never corrupts state or stops the timer.

pub mod config;
pub mod fleet;
pub mod health;
pub mod metric;
pub mod noise;
mod schedule;
pub mod sink;

pub use config::{SimulationConfig, load_config_from_path};
pub use fleet::{
    Bucket, BucketChange, DEGRADED_DEVICES, FleetConfig, FleetCounts, FleetSink, FleetState,
    FleetStatusSimulator, MIN_FLEET_TOTAL,
};
pub use health::{HealthConfig, HealthSink, MetricDriftSimulator, MetricReading, MetricSnapshot};
pub use metric::{MetricDefinition, MetricOverride, MetricRegistry, Quantization};
pub use sink::{DEFAULT_HISTORY_POINTS, LogSink, MetricHistory, RecordingSink, SnapshotSink};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Milliseconds since the Unix epoch; zero if the clock is before it.
pub(crate) fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
