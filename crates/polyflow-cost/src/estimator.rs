//! Estimators: pure functions from cardinalities to load.
//!
//! Estimators are stateless after construction and shared behind `Arc`, so
//! one parsed specification serves every task bound to the same operator.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::cardinality::CardinalityEstimate;
use crate::cost::{LoadEstimate, LoadProfile, Resource};

/// Estimates the load of a single resource.
pub trait LoadEstimator: Send + Sync + fmt::Debug {
    fn estimate(
        &self,
        inputs: &[CardinalityEstimate],
        outputs: &[CardinalityEstimate],
    ) -> LoadEstimate;

    /// True if growing any cardinality never shrinks either bound.
    fn is_monotonic(&self) -> bool {
        false
    }
}

/// Estimates a complete, possibly nested, load profile.
pub trait LoadProfileEstimator: Send + Sync + fmt::Debug {
    fn estimate(
        &self,
        inputs: &[CardinalityEstimate],
        outputs: &[CardinalityEstimate],
    ) -> LoadProfile;

    fn is_monotonic(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantLoadEstimator(pub LoadEstimate);

impl LoadEstimator for ConstantLoadEstimator {
    fn estimate(&self, _: &[CardinalityEstimate], _: &[CardinalityEstimate]) -> LoadEstimate {
        self.0
    }

    fn is_monotonic(&self) -> bool {
        true
    }
}

/// `load = constant + Σ in_coef[i] · in[i] + Σ out_coef[j] · out[j]`.
///
/// Missing cardinalities count as zero. Each bound of the result is the
/// extreme of every term over the input range, so negative coefficients
/// still yield `lower <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLoadEstimator {
    pub constant: f64,
    pub input_coefficients: Vec<f64>,
    pub output_coefficients: Vec<f64>,
    pub correctness: f64,
}

impl LinearLoadEstimator {
    pub fn new(constant: f64) -> Self {
        Self {
            constant,
            input_coefficients: Vec::new(),
            output_coefficients: Vec::new(),
            correctness: 1.0,
        }
    }

    pub fn input(mut self, index: usize, coefficient: f64) -> Self {
        set_coefficient(&mut self.input_coefficients, index, coefficient);
        self
    }

    pub fn output(mut self, index: usize, coefficient: f64) -> Self {
        set_coefficient(&mut self.output_coefficients, index, coefficient);
        self
    }

    pub fn with_correctness(mut self, correctness: f64) -> Self {
        self.correctness = correctness.clamp(0.0, 1.0);
        self
    }
}

pub(crate) fn set_coefficient(coefficients: &mut Vec<f64>, index: usize, coefficient: f64) {
    if coefficients.len() <= index {
        coefficients.resize(index + 1, 0.0);
    }
    coefficients[index] += coefficient;
}

fn accumulate(
    coefficients: &[f64],
    cards: &[CardinalityEstimate],
    lower: &mut f64,
    upper: &mut f64,
    correctness: &mut f64,
) {
    for (i, coef) in coefficients.iter().enumerate() {
        if *coef == 0.0 {
            continue;
        }
        let Some(card) = cards.get(i) else {
            continue;
        };
        let a = coef * card.lower as f64;
        let b = coef * card.upper as f64;
        *lower += a.min(b);
        *upper += a.max(b);
        *correctness = correctness.min(card.correctness);
    }
}

impl LoadEstimator for LinearLoadEstimator {
    fn estimate(
        &self,
        inputs: &[CardinalityEstimate],
        outputs: &[CardinalityEstimate],
    ) -> LoadEstimate {
        let mut lower = self.constant;
        let mut upper = self.constant;
        let mut correctness = self.correctness;
        accumulate(&self.input_coefficients, inputs, &mut lower, &mut upper, &mut correctness);
        accumulate(&self.output_coefficients, outputs, &mut lower, &mut upper, &mut correctness);
        LoadEstimate::new(lower, upper, correctness)
    }

    fn is_monotonic(&self) -> bool {
        self.input_coefficients
            .iter()
            .chain(self.output_coefficients.iter())
            .all(|c| *c >= 0.0)
    }
}

/// Profile estimator with one load estimator per resource plus nested children.
#[derive(Debug, Clone)]
pub struct NestableLoadProfileEstimator {
    loads: BTreeMap<Resource, Arc<dyn LoadEstimator>>,
    overhead_ms: u64,
    utilization: f64,
    nested: Vec<Arc<dyn LoadProfileEstimator>>,
}

impl NestableLoadProfileEstimator {
    pub fn new() -> Self {
        Self {
            loads: BTreeMap::new(),
            overhead_ms: 0,
            utilization: 1.0,
            nested: Vec::new(),
        }
    }

    pub fn with_load(mut self, resource: Resource, estimator: Arc<dyn LoadEstimator>) -> Self {
        self.loads.insert(resource, estimator);
        self
    }

    pub fn with_overhead_ms(mut self, overhead_ms: u64) -> Self {
        self.overhead_ms = overhead_ms;
        self
    }

    pub fn with_utilization(mut self, utilization: f64) -> Self {
        self.utilization = utilization;
        self
    }

    pub fn nest(&mut self, child: Arc<dyn LoadProfileEstimator>) {
        self.nested.push(child);
    }

    pub fn overhead_ms(&self) -> u64 {
        self.overhead_ms
    }

    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    pub fn nested_len(&self) -> usize {
        self.nested.len()
    }
}

impl Default for NestableLoadProfileEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProfileEstimator for NestableLoadProfileEstimator {
    fn estimate(
        &self,
        inputs: &[CardinalityEstimate],
        outputs: &[CardinalityEstimate],
    ) -> LoadProfile {
        let mut profile = LoadProfile::new();
        for (resource, estimator) in &self.loads {
            profile
                .loads
                .insert(*resource, estimator.estimate(inputs, outputs));
        }
        profile.overhead_ms = self.overhead_ms;
        profile.utilization = self.utilization;
        for child in &self.nested {
            profile.nest(child.estimate(inputs, outputs));
        }
        profile
    }

    fn is_monotonic(&self) -> bool {
        self.loads.values().all(|e| e.is_monotonic())
            && self.nested.iter().all(|n| n.is_monotonic())
    }
}
