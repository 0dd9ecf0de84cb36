//! Platform-specific conversion of load profiles into time estimates.
//!
//! Each platform weighs resources differently: a partitioned engine pays far
//! more per network unit than a single-process one. The weights come from
//! configuration keys `polyflow.<platform>.<resource>.ms-per-unit`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use polyflow_core::config::Configuration;
use serde::{Deserialize, Serialize};

use crate::cost::{LoadEstimate, LoadProfile, Resource};
use crate::error::Result;

/// Default milliseconds per abstract resource unit.
const DEFAULT_MS_PER_UNIT: [(Resource, f64); 4] = [
    (Resource::Cpu, 0.001),
    (Resource::Memory, 0.0),
    (Resource::Disk, 0.01),
    (Resource::Network, 0.05),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeEstimate {
    pub lower_ms: f64,
    pub upper_ms: f64,
    pub correctness: f64,
}

impl TimeEstimate {
    pub fn new(lower_ms: f64, upper_ms: f64, correctness: f64) -> Self {
        Self {
            lower_ms: lower_ms.min(upper_ms),
            upper_ms: upper_ms.max(lower_ms),
            correctness: correctness.clamp(0.0, 1.0),
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn from_ms(ms: f64) -> Self {
        Self::new(ms, ms, 1.0)
    }

    pub fn plus(&self, other: &TimeEstimate) -> Self {
        Self::new(
            self.lower_ms + other.lower_ms,
            self.upper_ms + other.upper_ms,
            self.correctness.min(other.correctness),
        )
    }

    pub fn mean_ms(&self) -> f64 {
        (self.lower_ms + self.upper_ms) / 2.0
    }

    /// Ranking order: mean first, then the pessimistic bound.
    pub fn compare(&self, other: &TimeEstimate) -> Ordering {
        self.mean_ms()
            .total_cmp(&other.mean_ms())
            .then_with(|| self.upper_ms.total_cmp(&other.upper_ms))
    }
}

impl Default for TimeEstimate {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for TimeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}..{:.1} ms (p={:.2})",
            self.lower_ms, self.upper_ms, self.correctness
        )
    }
}

/// Linear conversion of one resource's load into milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadToTimeConverter {
    pub ms_per_unit: f64,
}

impl LoadToTimeConverter {
    pub fn linear(ms_per_unit: f64) -> Self {
        Self { ms_per_unit }
    }

    pub fn convert(&self, load: &LoadEstimate) -> TimeEstimate {
        TimeEstimate::new(
            load.lower.max(0.0) * self.ms_per_unit,
            load.upper.max(0.0) * self.ms_per_unit,
            load.correctness,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProfileToTimeConverter {
    pub platform: String,
    pub resources: BTreeMap<Resource, LoadToTimeConverter>,
    /// Added once per converted profile (per task), on top of profile overhead.
    pub fixed_overhead_ms: f64,
}

impl LoadProfileToTimeConverter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            resources: DEFAULT_MS_PER_UNIT
                .iter()
                .map(|(r, ms)| (*r, LoadToTimeConverter::linear(*ms)))
                .collect(),
            fixed_overhead_ms: 0.0,
        }
    }

    pub fn with_resource(mut self, resource: Resource, converter: LoadToTimeConverter) -> Self {
        self.resources.insert(resource, converter);
        self
    }

    /// Read `polyflow.<platform>.<resource>.ms-per-unit` and
    /// `polyflow.<platform>.overhead.ms`, falling back to built-in defaults.
    pub fn from_configuration(platform: &str, cfg: &Configuration) -> Result<Self> {
        let mut conv = Self::new(platform);
        for (resource, default) in DEFAULT_MS_PER_UNIT {
            let key = format!("polyflow.{platform}.{}.ms-per-unit", resource.as_str());
            let ms = cfg.get_f64_or(&key, default)?;
            conv.resources
                .insert(resource, LoadToTimeConverter::linear(ms));
        }
        conv.fixed_overhead_ms = cfg.get_f64_or(&format!("polyflow.{platform}.overhead.ms"), 0.0)?;
        Ok(conv)
    }

    pub fn convert(&self, profile: &LoadProfile) -> TimeEstimate {
        let utilization = if profile.utilization > 0.0 {
            profile.utilization
        } else {
            1.0
        };
        let mut total = TimeEstimate::from_ms(self.fixed_overhead_ms + profile.overhead_ms as f64);
        for (resource, load) in &profile.loads {
            if let Some(conv) = self.resources.get(resource) {
                let t = conv.convert(load);
                // Partially utilized resources stretch wall-clock time.
                total = total.plus(&TimeEstimate::new(
                    t.lower_ms / utilization,
                    t.upper_ms / utilization,
                    t.correctness,
                ));
            }
        }
        for sub in &profile.sub_profiles {
            total = total.plus(&self.convert_nested(sub));
        }
        total
    }

    fn convert_nested(&self, profile: &LoadProfile) -> TimeEstimate {
        // Nested profiles do not pay the per-task fixed overhead again.
        let mut t = self.convert(profile);
        t.lower_ms -= self.fixed_overhead_ms;
        t.upper_ms -= self.fixed_overhead_ms;
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_overrides_defaults() {
        let mut cfg = Configuration::new();
        cfg.set_property("polyflow.batch.network.ms-per-unit", "2");
        cfg.set_property("polyflow.batch.overhead.ms", "100");
        let conv = LoadProfileToTimeConverter::from_configuration("batch", &cfg).unwrap();
        assert_eq!(conv.resources[&Resource::Network].ms_per_unit, 2.0);
        assert_eq!(conv.resources[&Resource::Cpu].ms_per_unit, 0.001);
        assert_eq!(conv.fixed_overhead_ms, 100.0);
    }

    #[test]
    fn malformed_weight_is_a_configuration_error() {
        let mut cfg = Configuration::new();
        cfg.set_property("polyflow.local.cpu.ms-per-unit", "fast");
        assert!(LoadProfileToTimeConverter::from_configuration("local", &cfg).is_err());
    }

    #[test]
    fn utilization_stretches_time() {
        let conv = LoadProfileToTimeConverter::new("p")
            .with_resource(Resource::Cpu, LoadToTimeConverter::linear(1.0));
        let mut profile = LoadProfile::new().with_load(Resource::Cpu, LoadEstimate::new(10.0, 20.0, 1.0));
        profile.overhead_ms = 5;
        assert_eq!(conv.convert(&profile), TimeEstimate::new(15.0, 25.0, 1.0));

        profile.utilization = 0.5;
        assert_eq!(conv.convert(&profile), TimeEstimate::new(25.0, 45.0, 1.0));
    }

    #[test]
    fn nested_profiles_add_up_without_double_overhead() {
        let mut conv = LoadProfileToTimeConverter::new("p")
            .with_resource(Resource::Disk, LoadToTimeConverter::linear(1.0));
        conv.fixed_overhead_ms = 3.0;
        let mut profile = LoadProfile::new().with_load(Resource::Disk, LoadEstimate::exact(4.0));
        profile.nest(LoadProfile::new().with_load(Resource::Disk, LoadEstimate::exact(6.0)));
        assert_eq!(conv.convert(&profile), TimeEstimate::from_ms(13.0));
    }

    #[test]
    fn compare_orders_by_mean() {
        let a = TimeEstimate::new(0.0, 10.0, 1.0);
        let b = TimeEstimate::new(4.0, 8.0, 1.0);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
    }
}
