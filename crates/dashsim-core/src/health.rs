//! Hardware health simulator: named continuous metrics under bounded random
//! walk plus Gaussian noise.
//!
//! Each tick moves every metric by
//! `U[-drift/2, drift/2] + N(0,1) * noise_scale * (max - min)`, clamps it into
//! `[min, max]`, and rounds it per its [`Quantization`](crate::Quantization).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::metric::{MetricDefinition, MetricOverride, MetricRegistry};
use crate::noise::{standard_normal, symmetric_step};
use crate::schedule::{TimerSlot, fixed_period};
use crate::sink::{Outbox, SnapshotSink};
use crate::unix_ms_now;

/// Default tick period in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
/// Default Gaussian noise multiplier, relative to a metric's range.
pub const DEFAULT_NOISE_SCALE: f64 = 0.02;

/// Construction options for [`MetricDriftSimulator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Timer period; must be > 0.
    pub tick_interval_ms: u64,
    /// Gaussian noise multiplier; must be finite and >= 0.
    pub noise_scale: f64,
    /// Merged over the default metrics. Unknown names add new metrics.
    pub metric_overrides: BTreeMap<String, MetricOverride>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            noise_scale: DEFAULT_NOISE_SCALE,
            metric_overrides: BTreeMap::new(),
        }
    }
}

impl HealthConfig {
    /// Replace invalid values with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.tick_interval_ms == 0 {
            log::warn!("tick_interval_ms must be > 0, using {DEFAULT_TICK_INTERVAL_MS}");
            self.tick_interval_ms = DEFAULT_TICK_INTERVAL_MS;
        }
        if !self.noise_scale.is_finite() || self.noise_scale < 0.0 {
            log::warn!(
                "noise_scale {} is invalid, using {DEFAULT_NOISE_SCALE}",
                self.noise_scale
            );
            self.noise_scale = DEFAULT_NOISE_SCALE;
        }
        self
    }

    fn registry(&self) -> MetricRegistry {
        let mut registry = MetricRegistry::defaults();
        for (name, patch) in &self.metric_overrides {
            registry.configure(name, patch);
        }
        registry
    }
}

/// One metric's value at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

/// Immutable read of every metric at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Readings in registry order.
    pub metrics: Vec<MetricReading>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl MetricSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricReading> {
        self.metrics.iter().find(|r| r.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|r| r.value)
    }
}

/// Boxed sink accepted by [`MetricDriftSimulator::set_sink`].
pub type HealthSink = Box<dyn SnapshotSink<MetricSnapshot>>;

struct DriftState<R> {
    registry: MetricRegistry,
    noise_scale: f64,
    rng: R,
    ticks: u64,
}

impl<R: Rng> DriftState<R> {
    fn advance(&mut self) {
        let noise_scale = self.noise_scale;
        let rng = &mut self.rng;
        for (_, def) in self.registry.iter_mut() {
            step_metric(def, noise_scale, rng);
        }
    }

    fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            metrics: self
                .registry
                .iter()
                .map(|(name, def)| MetricReading {
                    name: name.to_string(),
                    value: def.value,
                    unit: def.unit.clone(),
                })
                .collect(),
            timestamp_ms: unix_ms_now(),
        }
    }

    fn tick(&mut self) -> MetricSnapshot {
        self.advance();
        self.ticks += 1;
        let snapshot = self.snapshot();
        log::debug!("health tick {}: {} metrics", self.ticks, snapshot.metrics.len());
        snapshot
    }
}

fn step_metric(def: &mut MetricDefinition, noise_scale: f64, rng: &mut impl Rng) {
    let noise = standard_normal(rng) * noise_scale * (def.max - def.min);
    let drift = symmetric_step(rng, def.drift);
    def.value = def.settle(def.value + drift + noise);
}

fn lock<R>(state: &Mutex<DriftState<R>>) -> MutexGuard<'_, DriftState<R>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tick under the state lock, then deliver with the lock released.
fn tick_and_publish<R: Rng>(
    state: &Mutex<DriftState<R>>,
    outbox: &Outbox<MetricSnapshot>,
) -> MetricSnapshot {
    let (snapshot, must_drain) = {
        let mut guard = lock(state);
        let snapshot = guard.tick();
        let must_drain = outbox.post(snapshot.clone());
        (snapshot, must_drain)
    };
    if must_drain {
        outbox.drain();
    }
    snapshot
}

/// Continuous-metric drift/noise generator.
///
/// Manual [`tick`](Self::tick)s and timer ticks share one lock, so ticks never
/// overlap. Snapshots reach the sink in tick order. Dropping the simulator
/// stops its timer.
pub struct MetricDriftSimulator<R = StdRng> {
    state: Arc<Mutex<DriftState<R>>>,
    outbox: Arc<Outbox<MetricSnapshot>>,
    timer: TimerSlot,
    interval: Duration,
}

impl MetricDriftSimulator<StdRng> {
    /// Simulator seeded from OS randomness.
    pub fn new(config: HealthConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Reproducible simulator: the same seed yields the same value sequence.
    pub fn seeded(config: HealthConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send + 'static> MetricDriftSimulator<R> {
    /// Simulator drawing from the supplied random source.
    pub fn with_rng(config: HealthConfig, rng: R) -> Self {
        let config = config.normalized();
        let registry = config.registry();
        Self {
            state: Arc::new(Mutex::new(DriftState {
                registry,
                noise_scale: config.noise_scale,
                rng,
                ticks: 0,
            })),
            outbox: Arc::new(Outbox::default()),
            timer: TimerSlot::default(),
            interval: Duration::from_millis(config.tick_interval_ms),
        }
    }

    /// Builder form of [`set_sink`](Self::set_sink).
    pub fn with_sink(self, sink: impl SnapshotSink<MetricSnapshot> + 'static) -> Self {
        self.set_sink(Some(Box::new(sink)));
        self
    }

    /// Replace (or clear) the sink receiving every tick's snapshot.
    pub fn set_sink(&self, sink: Option<HealthSink>) {
        self.outbox.replace(sink);
    }

    /// Advance every metric once and deliver the resulting snapshot.
    pub fn tick(&self) -> MetricSnapshot {
        tick_and_publish(&self.state, &self.outbox)
    }

    /// Current values, without advancing.
    pub fn snapshot(&self) -> MetricSnapshot {
        lock(&self.state).snapshot()
    }

    /// Tick immediately, then every `tick_interval_ms`. No-op while running.
    ///
    /// Outside a tokio runtime only the immediate tick happens.
    pub fn start(&mut self) {
        if self.timer.is_armed() {
            return;
        }
        let state = Arc::clone(&self.state);
        let outbox = Arc::clone(&self.outbox);
        if self.timer.arm(fixed_period(self.interval, move || {
            tick_and_publish(&state, &outbox);
        })) {
            log::info!(
                "health simulator started ({}ms period)",
                self.interval.as_millis()
            );
        }
        self.tick();
    }

    /// Cancel the timer. No-op while stopped.
    pub fn stop(&mut self) {
        if self.timer.disarm() {
            log::info!("health simulator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_armed()
    }

    /// Create `name` with blank defaults if absent, then merge `patch` over it.
    pub fn configure_metric(&self, name: &str, patch: &MetricOverride) {
        lock(&self.state).registry.configure(name, patch);
    }

    /// Metric names in snapshot order.
    pub fn metric_names(&self) -> Vec<String> {
        lock(&self.state).registry.names()
    }

    pub fn definition(&self, name: &str) -> Option<MetricDefinition> {
        lock(&self.state).registry.get(name).cloned()
    }

    pub fn tick_interval(&self) -> Duration {
        self.interval
    }

    pub fn noise_scale(&self) -> f64 {
        lock(&self.state).noise_scale
    }

    /// Ticks performed so far, manual and scheduled.
    pub fn tick_count(&self) -> u64 {
        lock(&self.state).ticks
    }

    /// Deliveries lost to a panicking sink.
    pub fn sink_failures(&self) -> u64 {
        self.outbox.failures()
    }
}
