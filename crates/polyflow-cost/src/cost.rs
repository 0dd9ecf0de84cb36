//! Load ranges and load profiles.
//!
//! A `LoadEstimate` is a range of abstract resource units for one resource.
//! A `LoadProfile` groups one estimate per resource, plus fixed overhead and
//! a utilization factor, and nests sub-profiles (e.g., one per input).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Cpu,
        Resource::Memory,
        Resource::Disk,
        Resource::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
            Resource::Disk => "disk",
            Resource::Network => "network",
        }
    }

    /// Accepts the canonical name and the short aliases used in specs.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "cpu" => Some(Resource::Cpu),
            "memory" | "ram" | "mem" => Some(Resource::Memory),
            "disk" | "io" => Some(Resource::Disk),
            "network" | "net" => Some(Resource::Network),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadEstimate {
    pub lower: f64,
    pub upper: f64,
    pub correctness: f64,
}

impl LoadEstimate {
    pub fn new(lower: f64, upper: f64, correctness: f64) -> Self {
        Self {
            lower: lower.min(upper),
            upper: upper.max(lower),
            correctness: correctness.clamp(0.0, 1.0),
        }
    }

    pub fn exact(v: f64) -> Self {
        Self::new(v, v, 1.0)
    }

    pub fn zero() -> Self {
        Self::exact(0.0)
    }

    pub fn plus(&self, other: &LoadEstimate) -> Self {
        Self::new(
            self.lower + other.lower,
            self.upper + other.upper,
            self.correctness.min(other.correctness),
        )
    }

    pub fn times(&self, factor: f64) -> Self {
        Self::new(self.lower * factor, self.upper * factor, self.correctness)
    }
}

impl Default for LoadEstimate {
    fn default() -> Self {
        Self::zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    pub loads: BTreeMap<Resource, LoadEstimate>,
    /// Fixed start-up cost in milliseconds, independent of data volume.
    pub overhead_ms: u64,
    /// Fraction of the resources the operator actually keeps busy, in (0, 1].
    pub utilization: f64,
    pub sub_profiles: Vec<LoadProfile>,
}

impl LoadProfile {
    pub fn new() -> Self {
        Self {
            loads: BTreeMap::new(),
            overhead_ms: 0,
            utilization: 1.0,
            sub_profiles: Vec::new(),
        }
    }

    pub fn with_load(mut self, resource: Resource, load: LoadEstimate) -> Self {
        self.loads.insert(resource, load);
        self
    }

    pub fn get(&self, resource: Resource) -> LoadEstimate {
        self.loads.get(&resource).copied().unwrap_or_default()
    }

    pub fn nest(&mut self, sub: LoadProfile) {
        self.sub_profiles.push(sub);
    }

    /// This profile's load plus that of every nested profile.
    pub fn total(&self, resource: Resource) -> LoadEstimate {
        self.sub_profiles
            .iter()
            .fold(self.get(resource), |acc, sub| acc.plus(&sub.total(resource)))
    }

    /// Sum two sibling profiles into one flat profile.
    pub fn plus(&self, other: &LoadProfile) -> LoadProfile {
        let mut out = LoadProfile::new();
        for r in Resource::ALL {
            let sum = self.total(r).plus(&other.total(r));
            if self.loads.contains_key(&r)
                || other.loads.contains_key(&r)
                || sum != LoadEstimate::zero()
            {
                out.loads.insert(r, sum);
            }
        }
        out.overhead_ms = self.total_overhead_ms() + other.total_overhead_ms();
        out.utilization = self.utilization.min(other.utilization);
        out
    }

    pub fn total_overhead_ms(&self) -> u64 {
        self.overhead_ms
            + self
                .sub_profiles
                .iter()
                .map(|s| s.total_overhead_ms())
                .sum::<u64>()
    }
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self::new()
    }
}
