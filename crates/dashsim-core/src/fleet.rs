//! Device fleet simulator: a fixed total split into online, offline and
//! degraded buckets.
//!
//! Every tick moves exactly one device between online and offline. The source
//! bucket is chosen with probability proportional to its size, so the split
//! oscillates around its starting point instead of drifting off. Degraded is
//! pinned at [`DEGRADED_DEVICES`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::noise::weighted_index;
use crate::schedule::{TimerSlot, rearming};
use crate::sink::{Outbox, SnapshotSink};
use crate::unix_ms_now;

/// Devices held in the degraded bucket.
pub const DEGRADED_DEVICES: u32 = 2;
/// Smallest accepted fleet size.
pub const MIN_FLEET_TOTAL: u32 = 3;
pub const DEFAULT_FLEET_TOTAL: u32 = 50;
pub const DEFAULT_ONLINE_PCT: f64 = 0.75;
pub const DEFAULT_MIN_TICK_DELAY_MS: u64 = 15_000;
pub const DEFAULT_MAX_TICK_DELAY_MS: u64 = 45_000;

/// Construction options for [`FleetStatusSimulator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Fleet size; raised to [`MIN_FLEET_TOTAL`] if smaller.
    pub total: u32,
    /// Starting online fraction in `[0, 1]`.
    pub initial_online_pct: f64,
    /// Lower bound of the randomized delay between ticks.
    pub min_tick_delay_ms: u64,
    /// Upper bound of the randomized delay between ticks.
    pub max_tick_delay_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            total: DEFAULT_FLEET_TOTAL,
            initial_online_pct: DEFAULT_ONLINE_PCT,
            min_tick_delay_ms: DEFAULT_MIN_TICK_DELAY_MS,
            max_tick_delay_ms: DEFAULT_MAX_TICK_DELAY_MS,
        }
    }
}

impl FleetConfig {
    /// Replace invalid values with safe ones.
    pub fn normalized(mut self) -> Self {
        if self.total < MIN_FLEET_TOTAL {
            log::warn!("fleet total {} below minimum, using {MIN_FLEET_TOTAL}", self.total);
            self.total = MIN_FLEET_TOTAL;
        }
        if !self.initial_online_pct.is_finite() {
            log::warn!("initial_online_pct is not finite, using {DEFAULT_ONLINE_PCT}");
            self.initial_online_pct = DEFAULT_ONLINE_PCT;
        } else if !(0.0..=1.0).contains(&self.initial_online_pct) {
            log::warn!(
                "initial_online_pct {} outside [0, 1], clamping",
                self.initial_online_pct
            );
            self.initial_online_pct = self.initial_online_pct.clamp(0.0, 1.0);
        }
        if self.max_tick_delay_ms == 0 {
            log::warn!("tick delay range is empty, using defaults");
            self.min_tick_delay_ms = DEFAULT_MIN_TICK_DELAY_MS;
            self.max_tick_delay_ms = DEFAULT_MAX_TICK_DELAY_MS;
        } else if self.min_tick_delay_ms > self.max_tick_delay_ms {
            log::warn!(
                "tick delay range inverted ({} > {}), swapping",
                self.min_tick_delay_ms,
                self.max_tick_delay_ms
            );
            std::mem::swap(&mut self.min_tick_delay_ms, &mut self.max_tick_delay_ms);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Counts and snapshots
// ---------------------------------------------------------------------------

/// The three buckets and the total they must add up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetCounts {
    pub total: u32,
    pub online: u32,
    pub offline: u32,
    pub degraded: u32,
}

impl FleetCounts {
    /// Deterministic starting split: `online = round(total * pct)`, capped so
    /// offline never goes negative.
    pub fn initial(total: u32, online_pct: f64) -> Self {
        let total = total.max(MIN_FLEET_TOTAL);
        let room = total - DEGRADED_DEVICES;
        let online = ((f64::from(total) * online_pct).round().max(0.0) as u32).min(room);
        Self {
            total,
            online,
            offline: room - online,
            degraded: DEGRADED_DEVICES,
        }
    }

    /// Whether the buckets add up to the total.
    pub fn is_conserved(&self) -> bool {
        u64::from(self.online) + u64::from(self.offline) + u64::from(self.degraded)
            == u64::from(self.total)
    }

    /// Let `offline` absorb any difference between the bucket sum and the
    /// total, floored at zero. Returns whether anything changed.
    fn repair(&mut self) -> bool {
        let sum = i64::from(self.online) + i64::from(self.offline) + i64::from(self.degraded);
        let gap = i64::from(self.total) - sum;
        if gap == 0 {
            return false;
        }
        let offline = (i64::from(self.offline) + gap).max(0);
        log::debug!(
            "fleet sum {sum} != total {}, offline {} -> {offline}",
            self.total,
            self.offline
        );
        self.offline = u32::try_from(offline).unwrap_or(u32::MAX);
        true
    }

    /// Bucket-by-bucket differences from `previous`, in the order online,
    /// offline, degraded, total. Unchanged buckets are omitted.
    pub fn changes_since(&self, previous: &FleetCounts) -> Vec<BucketChange> {
        [
            (Bucket::Online, previous.online, self.online),
            (Bucket::Offline, previous.offline, self.offline),
            (Bucket::Degraded, previous.degraded, self.degraded),
            (Bucket::Total, previous.total, self.total),
        ]
        .into_iter()
        .filter(|(_, before, after)| before != after)
        .map(|(bucket, previous, current)| BucketChange {
            bucket,
            previous,
            current,
        })
        .collect()
    }
}

/// Fleet counts at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetState {
    #[serde(flatten)]
    pub counts: FleetCounts,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl FleetState {
    pub fn changes_since(&self, previous: &FleetState) -> Vec<BucketChange> {
        self.counts.changes_since(&previous.counts)
    }
}

/// One of the fleet partitions, or the total itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Online,
    Offline,
    Degraded,
    Total,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Total => write!(f, "Total"),
        }
    }
}

/// A bucket whose count differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketChange {
    pub bucket: Bucket,
    pub previous: u32,
    pub current: u32,
}

impl BucketChange {
    pub fn delta(&self) -> i64 {
        i64::from(self.current) - i64::from(self.previous)
    }

    pub fn is_increase(&self) -> bool {
        self.current > self.previous
    }
}

impl std::fmt::Display for BucketChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} \u{2192} {} ({:+})",
            self.bucket,
            self.previous,
            self.current,
            self.delta()
        )
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Boxed sink accepted by [`FleetStatusSimulator::set_sink`].
pub type FleetSink = Box<dyn SnapshotSink<FleetState>>;

struct FleetCore<R> {
    counts: FleetCounts,
    delay_ms: (u64, u64),
    rng: R,
    ticks: u64,
}

impl<R: Rng> FleetCore<R> {
    fn snapshot(&self) -> FleetState {
        FleetState {
            counts: self.counts,
            timestamp_ms: unix_ms_now(),
        }
    }

    fn tick(&mut self) -> Option<FleetState> {
        let c = &mut self.counts;
        let Some(source) = weighted_index(&mut self.rng, &[c.online, c.offline]) else {
            log::debug!("fleet tick skipped: online and offline both empty");
            return None;
        };
        // The chosen bucket is non-empty; the other may be saturated in a
        // restored state, and repair reconciles the sum afterwards.
        if source == 0 {
            c.online -= 1;
            c.offline = c.offline.saturating_add(1);
        } else {
            c.offline -= 1;
            c.online = c.online.saturating_add(1);
        }
        c.degraded = DEGRADED_DEVICES;
        c.repair();
        self.ticks += 1;
        log::debug!(
            "fleet tick {}: online {} offline {} degraded {}",
            self.ticks,
            c.online,
            c.offline,
            c.degraded
        );
        Some(self.snapshot())
    }

    fn set_total(&mut self, new_total: u32) -> FleetState {
        let total = new_total.max(MIN_FLEET_TOTAL);
        let c = &mut self.counts;
        let scaled = if c.total == 0 {
            0.0
        } else {
            (f64::from(c.online) * f64::from(total) / f64::from(c.total)).round()
        };
        let room = total - DEGRADED_DEVICES;
        c.online = (scaled.max(0.0) as u32).min(room);
        c.degraded = DEGRADED_DEVICES;
        c.total = total;
        c.offline = room - c.online;
        log::info!(
            "fleet resized to {total}: online {} offline {}",
            c.online,
            c.offline
        );
        self.snapshot()
    }

    fn next_delay(&mut self) -> Duration {
        let (lo, hi) = self.delay_ms;
        Duration::from_millis(self.rng.random_range(lo..=hi))
    }
}

fn lock<R>(state: &Mutex<FleetCore<R>>) -> MutexGuard<'_, FleetCore<R>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tick under the state lock, then deliver with the lock released.
fn tick_and_publish<R: Rng>(
    state: &Mutex<FleetCore<R>>,
    outbox: &Outbox<FleetState>,
) -> Option<FleetState> {
    let (result, must_drain) = {
        let mut core = lock(state);
        let result = core.tick();
        (result, result.is_some_and(|s| outbox.post(s)))
    };
    if must_drain {
        outbox.drain();
    }
    result
}

/// Discrete-count conservation simulator for a device fleet.
///
/// The timer re-arms itself with a fresh random delay after every tick, so a
/// [`stop`](Self::stop) between ticks always lands before the next one.
/// Snapshots reach the sink in the order they were produced. Dropping the
/// simulator stops its timer.
pub struct FleetStatusSimulator<R = StdRng> {
    state: Arc<Mutex<FleetCore<R>>>,
    outbox: Arc<Outbox<FleetState>>,
    timer: TimerSlot,
}

impl FleetStatusSimulator<StdRng> {
    /// Simulator seeded from OS randomness.
    pub fn new(config: FleetConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Reproducible simulator: the same seed yields the same tick sequence.
    pub fn seeded(config: FleetConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send + 'static> FleetStatusSimulator<R> {
    /// Simulator drawing from the supplied random source.
    pub fn with_rng(config: FleetConfig, rng: R) -> Self {
        let config = config.normalized();
        let counts = FleetCounts::initial(config.total, config.initial_online_pct);
        Self::assemble(counts, &config, rng)
    }

    /// Resume from externally supplied counts, taken as-is.
    ///
    /// Nothing is normalized here; the next tick repairs a broken sum through
    /// `offline`, and a state with no online or offline devices never ticks.
    pub fn from_counts(counts: FleetCounts, config: FleetConfig, rng: R) -> Self {
        let config = config.normalized();
        Self::assemble(counts, &config, rng)
    }

    fn assemble(counts: FleetCounts, config: &FleetConfig, rng: R) -> Self {
        Self {
            state: Arc::new(Mutex::new(FleetCore {
                counts,
                delay_ms: (config.min_tick_delay_ms, config.max_tick_delay_ms),
                rng,
                ticks: 0,
            })),
            outbox: Arc::new(Outbox::default()),
            timer: TimerSlot::default(),
        }
    }

    /// Builder form of [`set_sink`](Self::set_sink).
    pub fn with_sink(self, sink: impl SnapshotSink<FleetState> + 'static) -> Self {
        self.set_sink(Some(Box::new(sink)));
        self
    }

    /// Replace (or clear) the sink receiving every snapshot.
    pub fn set_sink(&self, sink: Option<FleetSink>) {
        self.outbox.replace(sink);
    }

    /// Move one device between online and offline.
    ///
    /// Returns `None`, touching nothing, when both buckets are empty.
    pub fn tick(&self) -> Option<FleetState> {
        tick_and_publish(&self.state, &self.outbox)
    }

    /// Current counts, without advancing.
    pub fn snapshot(&self) -> FleetState {
        lock(&self.state).snapshot()
    }

    /// Resize the fleet, scaling `online` proportionally. Totals below
    /// [`MIN_FLEET_TOTAL`] are raised to it. The new state is delivered to the
    /// sink and returned.
    pub fn set_total(&self, new_total: u32) -> FleetState {
        let (state, must_drain) = {
            let mut core = lock(&self.state);
            let state = core.set_total(new_total);
            (state, self.outbox.post(state))
        };
        if must_drain {
            self.outbox.drain();
        }
        state
    }

    /// Tick immediately, then after each randomized delay. No-op while running.
    ///
    /// Outside a tokio runtime only the immediate tick happens.
    pub fn start(&mut self) {
        if self.timer.is_armed() {
            return;
        }
        self.tick();
        // Drawn here so the immediate tick always consumes the RNG first.
        let first = lock(&self.state).next_delay();
        let delays = Arc::clone(&self.state);
        let ticks = Arc::clone(&self.state);
        let outbox = Arc::clone(&self.outbox);
        if self.timer.arm(rearming(
            first,
            move || lock(&delays).next_delay(),
            move || {
                tick_and_publish(&ticks, &outbox);
            },
        )) {
            log::info!("fleet simulator started");
        }
    }

    /// Cancel the timer. No-op while stopped.
    pub fn stop(&mut self) {
        if self.timer.disarm() {
            log::info!("fleet simulator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_armed()
    }

    /// Inclusive bounds of the randomized inter-tick delay.
    pub fn tick_delay_range(&self) -> (Duration, Duration) {
        let (lo, hi) = lock(&self.state).delay_ms;
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }

    /// Ticks that moved a device, manual and scheduled.
    pub fn tick_count(&self) -> u64 {
        lock(&self.state).ticks
    }

    /// Deliveries lost to a panicking sink.
    pub fn sink_failures(&self) -> u64 {
        self.outbox.failures()
    }
}
