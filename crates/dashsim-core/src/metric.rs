//! Continuous metric definitions and the ordered registry that holds them.
//!
//! A [`MetricDefinition`] carries its own bounds, per-tick drift width, unit,
//! and an explicit [`Quantization`] policy. The registry keeps insertion order
//! so snapshots always list metrics the same way.

use serde::{Deserialize, Serialize};

/// How a metric's value is rounded after every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantization {
    /// Round to the nearest whole number.
    Integer,
    /// Round to `n` decimal places.
    FixedDecimal(u8),
}

impl Quantization {
    /// Policy for a value supplied without an explicit one: whole numbers stay
    /// whole, anything else keeps one decimal place.
    pub fn infer(value: f64) -> Self {
        if value.fract() == 0.0 {
            Self::Integer
        } else {
            Self::FixedDecimal(1)
        }
    }

    /// Round `value` according to this policy.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Integer => value.round(),
            Self::FixedDecimal(places) => {
                let scale = 10f64.powi(i32::from(places));
                (value * scale).round() / scale
            }
        }
    }
}

impl std::fmt::Display for Quantization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::FixedDecimal(places) => write!(f, "fixed({places})"),
        }
    }
}

/// A single simulated continuous metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Current value, always within `[min, max]`.
    pub value: f64,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// Full width of the symmetric uniform walk applied per tick.
    pub drift: f64,
    /// Display unit (e.g. `"%"`, `"RPM"`).
    pub unit: String,
    /// Rounding policy applied after every clamp.
    pub quantization: Quantization,
}

impl MetricDefinition {
    /// Definition used when a metric is configured without prior existence.
    pub fn blank() -> Self {
        Self {
            value: 0.0,
            min: 0.0,
            max: 100.0,
            drift: 1.0,
            unit: String::new(),
            quantization: Quantization::Integer,
        }
    }

    fn preset(value: f64, min: f64, max: f64, drift: f64, unit: &str) -> Self {
        Self {
            value,
            min,
            max,
            drift,
            unit: unit.to_string(),
            quantization: Quantization::infer(value),
        }
    }

    /// Clamp `candidate` into bounds and round it, keeping the result inside
    /// `[min, max]` even when rounding would step past a fractional bound.
    pub fn settle(&self, candidate: f64) -> f64 {
        // `f64::clamp` panics on NaN bounds; max/min ignore them instead.
        let clamped = candidate.max(self.min).min(self.max);
        let rounded = self.quantization.apply(clamped);
        if rounded < self.min || rounded > self.max {
            clamped
        } else {
            rounded
        }
    }

    /// Merge `patch` over this definition, then restore the bounds invariant.
    ///
    /// Non-finite numbers in the patch are ignored with a warning.
    pub fn merge(&mut self, patch: &MetricOverride) {
        if let Some(value) = finite_field("value", patch.value) {
            self.value = value;
            if patch.quantization.is_none() {
                self.quantization = Quantization::infer(value);
            }
        }
        if let Some(min) = finite_field("min", patch.min) {
            self.min = min;
        }
        if let Some(max) = finite_field("max", patch.max) {
            self.max = max;
        }
        if let Some(drift) = finite_field("drift", patch.drift) {
            self.drift = drift.abs();
        }
        if let Some(ref unit) = patch.unit {
            self.unit.clone_from(unit);
        }
        if let Some(quantization) = patch.quantization {
            self.quantization = quantization;
        }
        if self.min > self.max {
            log::warn!(
                "metric bounds inverted (min {} > max {}), swapping",
                self.min,
                self.max
            );
            std::mem::swap(&mut self.min, &mut self.max);
        }
        self.value = self.settle(self.value);
    }
}

fn finite_field(field: &str, patch: Option<f64>) -> Option<f64> {
    match patch {
        Some(v) if !v.is_finite() => {
            log::warn!("metric {field} {v} is not finite, keeping previous value");
            None
        }
        other => other,
    }
}

/// Partial [`MetricDefinition`]; every present field replaces the target's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricOverride {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub drift: Option<f64>,
    pub unit: Option<String>,
    pub quantization: Option<Quantization>,
}

/// Ordered mapping from metric name to definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRegistry {
    entries: Vec<(String, MetricDefinition)>,
}

impl MetricRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in PC health metrics.
    pub fn defaults() -> Self {
        let mut registry = Self::new();
        registry.insert("cpuTemp", MetricDefinition::preset(45.0, 30.0, 95.0, 0.6, "°C"));
        registry.insert("cpuUsage", MetricDefinition::preset(12.0, 0.0, 100.0, 4.0, "%"));
        registry.insert("ramUsage", MetricDefinition::preset(30.0, 0.0, 100.0, 3.0, "%"));
        registry.insert("diskUsage", MetricDefinition::preset(20.0, 0.0, 100.0, 1.5, "%"));
        registry.insert(
            "fanSpeed",
            MetricDefinition::preset(1200.0, 600.0, 5000.0, 120.0, "RPM"),
        );
        registry
    }

    /// Insert or replace a definition. New names go to the end.
    pub fn insert(&mut self, name: impl Into<String>, definition: MetricDefinition) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(existing) => *existing = definition,
            None => self.entries.push((name, definition)),
        }
    }

    /// Create `name` from [`MetricDefinition::blank`] if absent, then merge `patch`.
    pub fn configure(&mut self, name: &str, patch: &MetricOverride) {
        if self.get(name).is_none() {
            self.entries.push((name.to_string(), MetricDefinition::blank()));
        }
        if let Some(definition) = self.get_mut(name) {
            definition.merge(patch);
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MetricDefinition> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metric names in iteration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricDefinition)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut MetricDefinition)> {
        self.entries.iter_mut().map(|(n, d)| (n.as_str(), d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Quantization tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_infer_integer() {
        assert_eq!(Quantization::infer(45.0), Quantization::Integer);
        assert_eq!(Quantization::infer(0.0), Quantization::Integer);
    }

    #[test]
    fn test_infer_fractional() {
        assert_eq!(Quantization::infer(45.5), Quantization::FixedDecimal(1));
    }

    #[test]
    fn test_apply_rounding() {
        assert_eq!(Quantization::Integer.apply(12.6), 13.0);
        assert_eq!(Quantization::FixedDecimal(1).apply(12.34), 12.3);
        assert!((Quantization::FixedDecimal(2).apply(1.005_1) - 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_quantization_display() {
        assert_eq!(Quantization::Integer.to_string(), "integer");
        assert_eq!(Quantization::FixedDecimal(2).to_string(), "fixed(2)");
    }

    // -----------------------------------------------------------------------
    // Definition tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_settle_clamps() {
        let def = MetricDefinition::blank();
        assert_eq!(def.settle(150.0), 100.0);
        assert_eq!(def.settle(-3.0), 0.0);
        assert_eq!(def.settle(41.6), 42.0);
    }

    #[test]
    fn test_settle_fractional_bounds_stay_inside() {
        let mut def = MetricDefinition::blank();
        def.min = 0.4;
        def.max = 0.6;
        // Rounding 0.6 to an integer would give 1.0; settle keeps the clamp.
        let v = def.settle(0.6);
        assert!(v >= def.min && v <= def.max);
    }

    #[test]
    fn test_merge_partial_keeps_other_fields() {
        let mut def = MetricDefinition::blank();
        def.merge(&MetricOverride {
            unit: Some("GB".into()),
            ..Default::default()
        });
        assert_eq!(def.unit, "GB");
        assert_eq!(def.max, 100.0);
        assert_eq!(def.drift, 1.0);
    }

    #[test]
    fn test_merge_value_infers_quantization_once() {
        let mut def = MetricDefinition::blank();
        def.merge(&MetricOverride {
            value: Some(2.5),
            ..Default::default()
        });
        assert_eq!(def.quantization, Quantization::FixedDecimal(1));
        // A later whole value with an explicit policy keeps that policy.
        def.merge(&MetricOverride {
            value: Some(3.0),
            quantization: Some(Quantization::FixedDecimal(2)),
            ..Default::default()
        });
        assert_eq!(def.quantization, Quantization::FixedDecimal(2));
    }

    #[test]
    fn test_merge_swaps_inverted_bounds() {
        let mut def = MetricDefinition::blank();
        def.merge(&MetricOverride {
            min: Some(80.0),
            max: Some(20.0),
            ..Default::default()
        });
        assert_eq!(def.min, 20.0);
        assert_eq!(def.max, 80.0);
        assert!(def.value >= 20.0 && def.value <= 80.0);
    }

    #[test]
    fn test_merge_ignores_non_finite_fields() {
        let mut def = MetricDefinition::blank();
        def.merge(&MetricOverride {
            value: Some(f64::INFINITY),
            min: Some(f64::NAN),
            max: Some(f64::NEG_INFINITY),
            drift: Some(f64::NAN),
            ..Default::default()
        });
        assert_eq!(def, MetricDefinition::blank());
        // Finite fields in the same patch still apply.
        def.merge(&MetricOverride {
            min: Some(f64::NAN),
            max: Some(50.0),
            ..Default::default()
        });
        assert_eq!((def.min, def.max), (0.0, 50.0));
        assert_eq!(def.settle(80.0), 50.0);
    }

    #[test]
    fn test_settle_tolerates_nan_bound() {
        let mut def = MetricDefinition::blank();
        def.min = f64::NAN;
        assert_eq!(def.settle(150.0), 100.0);
        assert_eq!(def.settle(-5.0), -5.0);
    }

    #[test]
    fn test_merge_clamps_value() {
        let mut def = MetricDefinition::blank();
        def.merge(&MetricOverride {
            value: Some(500.0),
            ..Default::default()
        });
        assert_eq!(def.value, 100.0);
    }

    // -----------------------------------------------------------------------
    // Registry tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_defaults_order_and_values() {
        let reg = MetricRegistry::defaults();
        assert_eq!(
            reg.names(),
            vec!["cpuTemp", "cpuUsage", "ramUsage", "diskUsage", "fanSpeed"]
        );
        let cpu = reg.get("cpuUsage").unwrap();
        assert_eq!(cpu.value, 12.0);
        assert_eq!(cpu.unit, "%");
        assert_eq!(cpu.quantization, Quantization::Integer);
        assert_eq!(reg.get("fanSpeed").unwrap().max, 5000.0);
    }

    #[test]
    fn test_configure_creates_missing_metric() {
        let mut reg = MetricRegistry::new();
        reg.configure(
            "gpuTemp",
            &MetricOverride {
                value: Some(60.0),
                unit: Some("°C".into()),
                ..Default::default()
            },
        );
        let gpu = reg.get("gpuTemp").unwrap();
        assert_eq!(gpu.value, 60.0);
        assert_eq!(gpu.min, 0.0);
        assert_eq!(gpu.max, 100.0);
        assert_eq!(gpu.drift, 1.0);
        assert_eq!(gpu.unit, "°C");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut reg = MetricRegistry::defaults();
        reg.insert("cpuTemp", MetricDefinition::blank());
        assert_eq!(reg.len(), 5);
        assert_eq!(reg.names()[0], "cpuTemp");
        assert_eq!(reg.get("cpuTemp").unwrap().value, 0.0);
    }
}
