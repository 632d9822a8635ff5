//! Snapshot sinks: the consumer side of every simulator.
//!
//! A simulator hands each fresh snapshot to exactly one [`SnapshotSink`].
//! Closures taking `&S` are sinks, so most consumers never name the trait.
//! Provided sinks:
//! - [`RecordingSink`]: keeps every snapshot, shareable across clones.
//! - [`MetricHistory`]: bounded per-metric series for chart feeds.
//! - [`LogSink`]: logs each snapshot at debug level.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::health::MetricSnapshot;

/// Receives snapshots produced by a simulator tick.
pub trait SnapshotSink<S>: Send {
    /// Called synchronously by the tick that produced `snapshot`, after the
    /// simulator's state lock has been released. The sink may read from or
    /// reconfigure its own simulator; snapshots produced that way are
    /// delivered after this call returns.
    fn deliver(&mut self, snapshot: &S);
}

impl<S, F> SnapshotSink<S> for F
where
    F: FnMut(&S) + Send,
{
    fn deliver(&mut self, snapshot: &S) {
        self(snapshot)
    }
}

/// Deliver `snapshot`, containing a panicking sink.
///
/// Returns `false` if the sink panicked. Simulator state is already committed
/// when this runs, so a failed delivery only loses that one notification.
pub(crate) fn deliver_guarded<S>(sink: &mut dyn SnapshotSink<S>, snapshot: &S) -> bool {
    match catch_unwind(AssertUnwindSafe(|| sink.deliver(snapshot))) {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::warn!("snapshot sink panicked: {reason}");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Ordered delivery queue between a simulator and its sink.
///
/// Snapshots are posted while the simulator state is locked, which fixes
/// their order, and delivered after that lock is released. The sink is taken
/// out of the outbox for the duration of each call, so a sink may call back
/// into its simulator: re-entrant snapshots queue behind the current one.
pub(crate) struct Outbox<S> {
    inner: Mutex<OutboxState<S>>,
}

struct OutboxState<S> {
    sink: Option<Box<dyn SnapshotSink<S>>>,
    /// Bumped on every replacement so a sink swapped out mid-delivery is not restored.
    epoch: u64,
    pending: VecDeque<S>,
    draining: bool,
    failures: u64,
}

impl<S> Default for Outbox<S> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(OutboxState {
                sink: None,
                epoch: 0,
                pending: VecDeque::new(),
                draining: false,
                failures: 0,
            }),
        }
    }
}

impl<S> Outbox<S> {
    fn state(&self) -> MutexGuard<'_, OutboxState<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn replace(&self, sink: Option<Box<dyn SnapshotSink<S>>>) {
        let mut state = self.state();
        state.sink = sink;
        state.epoch += 1;
    }

    /// Deliveries lost to a panicking sink.
    pub(crate) fn failures(&self) -> u64 {
        self.state().failures
    }

    /// Queue `snapshot`. Returns `true` when the caller must [`drain`](Self::drain)
    /// once it has released its own locks.
    pub(crate) fn post(&self, snapshot: S) -> bool {
        let mut state = self.state();
        if state.sink.is_none() && !state.draining {
            return false;
        }
        state.pending.push_back(snapshot);
        if state.draining {
            return false;
        }
        state.draining = true;
        true
    }

    /// Deliver queued snapshots in order until the queue is empty.
    pub(crate) fn drain(&self) {
        loop {
            let (mut sink, snapshot, epoch) = {
                let mut state = self.state();
                let Some(snapshot) = state.pending.pop_front() else {
                    state.draining = false;
                    return;
                };
                let Some(sink) = state.sink.take() else {
                    state.pending.clear();
                    state.draining = false;
                    return;
                };
                (sink, snapshot, state.epoch)
            };
            let delivered = deliver_guarded(sink.as_mut(), &snapshot);
            let mut state = self.state();
            if !delivered {
                state.failures += 1;
            }
            if state.epoch == epoch {
                state.sink = Some(sink);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Records every delivered snapshot. Clones share the same buffer, so keep
/// one clone to inspect what the simulator delivered to the other.
#[derive(Debug)]
pub struct RecordingSink<S> {
    seen: Arc<Mutex<Vec<S>>>,
}

impl<S> Clone for RecordingSink<S> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }
}

impl<S> Default for RecordingSink<S> {
    fn default() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<S: Clone> RecordingSink<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far, oldest first.
    pub fn snapshots(&self) -> Vec<S> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent snapshot, if any.
    pub fn last(&self) -> Option<S> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Clone + Send> SnapshotSink<S> for RecordingSink<S> {
    fn deliver(&mut self, snapshot: &S) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
    }
}

// ---------------------------------------------------------------------------
// MetricHistory
// ---------------------------------------------------------------------------

/// Default number of points kept per series, matching a small live chart.
pub const DEFAULT_HISTORY_POINTS: usize = 20;

/// Rolling window of metric snapshots; the oldest point is evicted once the
/// window is full. Clones share the same window.
#[derive(Debug, Clone)]
pub struct MetricHistory {
    capacity: usize,
    window: Arc<Mutex<VecDeque<MetricSnapshot>>>,
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_POINTS)
    }
}

impl MetricHistory {
    /// Window holding at most `capacity` snapshots (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(timestamp_ms, value)` points for one metric, oldest first. Snapshots
    /// that lack the metric are skipped.
    pub fn series(&self, name: &str) -> Vec<(u64, f64)> {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|snap| snap.get(name).map(|r| (snap.timestamp_ms, r.value)))
            .collect()
    }

    /// Every buffered snapshot, oldest first.
    pub fn snapshots(&self) -> Vec<MetricSnapshot> {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl SnapshotSink<MetricSnapshot> for MetricHistory {
    fn deliver(&mut self, snapshot: &MetricSnapshot) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(snapshot.clone());
    }
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Logs each snapshot's `Debug` form under the given label.
#[derive(Debug, Clone)]
pub struct LogSink {
    label: String,
}

impl LogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl<S: std::fmt::Debug> SnapshotSink<S> for LogSink {
    fn deliver(&mut self, snapshot: &S) {
        log::debug!("[{}] {:?}", self.label, snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::MetricReading;

    fn snap(ts: u64, cpu: f64) -> MetricSnapshot {
        MetricSnapshot {
            metrics: vec![MetricReading {
                name: "cpuUsage".into(),
                value: cpu,
                unit: "%".into(),
            }],
            timestamp_ms: ts,
        }
    }

    // -----------------------------------------------------------------------
    // Closure and guard tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_closure_is_a_sink() {
        let mut total = 0u32;
        {
            let mut sink = |v: &u32| total += *v;
            sink.deliver(&3u32);
            sink.deliver(&4u32);
        }
        assert_eq!(total, 7);
    }

    fn exploding(_: &u32) {
        panic!("consumer blew up");
    }

    #[test]
    fn test_deliver_guarded_contains_panic() {
        let mut sink = exploding;
        assert!(!deliver_guarded(&mut sink, &1u32));
    }

    #[test]
    fn test_deliver_guarded_ok() {
        let recorder = RecordingSink::new();
        let mut sink = recorder.clone();
        assert!(deliver_guarded(&mut sink, &5u32));
        assert_eq!(recorder.snapshots(), vec![5]);
    }

    // -----------------------------------------------------------------------
    // Outbox tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_outbox_without_sink_drops() {
        let outbox: Outbox<u32> = Outbox::default();
        assert!(!outbox.post(1));
    }

    #[test]
    fn test_outbox_delivers_in_order() {
        let recorder: RecordingSink<u32> = RecordingSink::new();
        let outbox: Outbox<u32> = Outbox::default();
        outbox.replace(Some(Box::new(recorder.clone())));
        assert!(outbox.post(1u32));
        // Already draining: the second post queues behind the first.
        assert!(!outbox.post(2u32));
        outbox.drain();
        assert_eq!(recorder.snapshots(), vec![1, 2]);
        assert!(outbox.post(3u32));
        outbox.drain();
        assert_eq!(recorder.len(), 3);
    }

    #[test]
    fn test_outbox_sink_can_post_reentrantly() {
        let outbox: Arc<Outbox<u32>> = Arc::new(Outbox::default());
        let recorder: RecordingSink<u32> = RecordingSink::new();
        let mut seen = recorder.clone();
        let handle = Arc::clone(&outbox);
        outbox.replace(Some(Box::new(move |v: &u32| {
            seen.deliver(v);
            if *v < 3 {
                // Queued while this delivery is still running.
                assert!(!handle.post(*v + 1));
            }
        })));
        assert!(outbox.post(1));
        outbox.drain();
        assert_eq!(recorder.snapshots(), vec![1, 2, 3]);
    }

    #[test]
    fn test_outbox_replace_during_delivery_wins() {
        let outbox: Arc<Outbox<u32>> = Arc::new(Outbox::default());
        let replacement: RecordingSink<u32> = RecordingSink::new();
        let handle = Arc::clone(&outbox);
        let next = replacement.clone();
        outbox.replace(Some(Box::new(move |_: &u32| {
            handle.replace(Some(Box::new(next.clone())));
        })));
        assert!(outbox.post(1));
        outbox.drain();
        assert!(replacement.is_empty());
        assert!(outbox.post(2));
        outbox.drain();
        assert_eq!(replacement.snapshots(), vec![2]);
    }

    #[test]
    fn test_outbox_counts_panics_and_keeps_sink() {
        let outbox: Outbox<u32> = Outbox::default();
        outbox.replace(Some(Box::new(exploding)));
        for v in 0..3u32 {
            assert!(outbox.post(v));
            outbox.drain();
        }
        assert_eq!(outbox.failures(), 3);
    }

    // -----------------------------------------------------------------------
    // RecordingSink tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_recording_sink_shares_buffer() {
        let recorder: RecordingSink<u32> = RecordingSink::new();
        assert!(recorder.is_empty());
        let mut writer = recorder.clone();
        writer.deliver(&1u32);
        writer.deliver(&2u32);
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.last(), Some(2));
    }

    // -----------------------------------------------------------------------
    // MetricHistory tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_history_evicts_oldest() {
        let history = MetricHistory::with_capacity(3);
        let mut sink = history.clone();
        for i in 0..5 {
            sink.deliver(&snap(i, i as f64 * 10.0));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.series("cpuUsage"),
            vec![(2, 20.0), (3, 30.0), (4, 40.0)]
        );
    }

    #[test]
    fn test_history_unknown_metric_is_empty() {
        let history = MetricHistory::default();
        let mut sink = history.clone();
        sink.deliver(&snap(1, 1.0));
        assert_eq!(history.capacity(), DEFAULT_HISTORY_POINTS);
        assert!(history.series("fanSpeed").is_empty());
    }

    #[test]
    fn test_history_zero_capacity_keeps_one() {
        let history = MetricHistory::with_capacity(0);
        let mut sink = history.clone();
        sink.deliver(&snap(1, 1.0));
        sink.deliver(&snap(2, 2.0));
        assert_eq!(history.snapshots().len(), 1);
    }

    #[test]
    fn test_log_sink_accepts_any_debug() {
        let mut sink = LogSink::new("test");
        SnapshotSink::<u32>::deliver(&mut sink, &1u32);
        SnapshotSink::<MetricSnapshot>::deliver(&mut sink, &snap(1, 2.0));
    }
}
