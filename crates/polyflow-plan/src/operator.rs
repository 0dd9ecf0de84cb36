//! Execution operators: an operator kind bound to exactly one platform.
//!
//! The channel capabilities (per-slot descriptor preference lists) and the
//! load-profile estimator are data on the operator. `copy()` re-materializes
//! the same operator at another graph position under a fresh identity.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use polyflow_core::channel::ChannelDescriptor;
use polyflow_core::config::Configuration;
use polyflow_core::id::OperatorId;
use polyflow_core::types::Scalar;
use polyflow_cost::{parse_specification, CardinalityEstimate, LoadProfile, LoadProfileEstimator};

use crate::error::{EvalError, PlanError};
use crate::eval;
use crate::instance::ChannelInstance;
use crate::platform::Platform;

pub type MapFn = Arc<dyn Fn(Scalar) -> Scalar + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&Scalar) -> bool + Send + Sync>;
pub type FlatMapFn = Arc<dyn Fn(Scalar) -> Vec<Scalar> + Send + Sync>;

/// External destination of a `CollectSink`; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SinkHandle(Arc<Mutex<Vec<Scalar>>>);

impl SinkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, items: impl IntoIterator<Item = Scalar>) {
        self.lock().extend(items);
    }

    pub fn snapshot(&self) -> Vec<Scalar> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<Scalar> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Scalar>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub enum OperatorKind {
    CollectionSource { data: Arc<Vec<Scalar>> },
    /// One `Scalar::Str` per line of a UTF-8 text file.
    TextFileSource { path: PathBuf },
    Map { udf: MapFn },
    Filter { predicate: PredicateFn },
    FlatMap { udf: FlatMapFn },
    /// Concatenation of two inputs, first then second.
    UnionAll,
    Distinct,
    Count,
    Sort,
    CollectSink { sink: SinkHandle },
    /// Re-encodes its input into another channel descriptor.
    Convert,
}

impl OperatorKind {
    pub fn collection_source(data: Vec<Scalar>) -> Self {
        OperatorKind::CollectionSource {
            data: Arc::new(data),
        }
    }

    pub fn text_file_source(path: impl Into<PathBuf>) -> Self {
        OperatorKind::TextFileSource { path: path.into() }
    }

    pub fn map(f: impl Fn(Scalar) -> Scalar + Send + Sync + 'static) -> Self {
        OperatorKind::Map { udf: Arc::new(f) }
    }

    pub fn filter(f: impl Fn(&Scalar) -> bool + Send + Sync + 'static) -> Self {
        OperatorKind::Filter {
            predicate: Arc::new(f),
        }
    }

    pub fn flat_map(f: impl Fn(Scalar) -> Vec<Scalar> + Send + Sync + 'static) -> Self {
        OperatorKind::FlatMap { udf: Arc::new(f) }
    }

    pub fn collect_sink(sink: SinkHandle) -> Self {
        OperatorKind::CollectSink { sink }
    }

    /// Stable kebab-case name; also the operator segment of configuration keys.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::CollectionSource { .. } => "collection-source",
            OperatorKind::TextFileSource { .. } => "text-file-source",
            OperatorKind::Map { .. } => "map",
            OperatorKind::Filter { .. } => "filter",
            OperatorKind::FlatMap { .. } => "flat-map",
            OperatorKind::UnionAll => "union-all",
            OperatorKind::Distinct => "distinct",
            OperatorKind::Count => "count",
            OperatorKind::Sort => "sort",
            OperatorKind::CollectSink { .. } => "collect-sink",
            OperatorKind::Convert => "convert",
        }
    }

    /// `(inputs, outputs)`.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            OperatorKind::CollectionSource { .. } | OperatorKind::TextFileSource { .. } => (0, 1),
            OperatorKind::UnionAll => (2, 1),
            OperatorKind::CollectSink { .. } => (1, 0),
            _ => (1, 1),
        }
    }

    /// Needs all of its input before emitting anything.
    pub fn is_shuffle(&self) -> bool {
        matches!(
            self,
            OperatorKind::Distinct | OperatorKind::Count | OperatorKind::Sort
        )
    }
}

impl fmt::Debug for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration key holding the load specification of `operator` on `platform`.
pub fn load_key(platform: &str, operator: &str) -> String {
    format!("polyflow.{platform}.{operator}.load")
}

/// Key for the conversion `from -> to` on `platform`; falls back to
/// `load_key(platform, "convert")`.
pub fn conversion_load_key(
    platform: &str,
    from: &ChannelDescriptor,
    to: &ChannelDescriptor,
) -> String {
    format!("polyflow.{platform}.convert.{}.{}.load", from.name, to.name)
}

pub struct ExecutionOperator {
    id: OperatorId,
    kind: OperatorKind,
    platform: Arc<dyn Platform>,
    inputs: Vec<Vec<ChannelDescriptor>>,
    outputs: Vec<Vec<ChannelDescriptor>>,
    load_estimator: Option<Arc<dyn LoadProfileEstimator>>,
}

impl ExecutionOperator {
    /// Panics if the descriptor lists do not match the kind's arity.
    pub fn new(
        kind: OperatorKind,
        platform: Arc<dyn Platform>,
        inputs: Vec<Vec<ChannelDescriptor>>,
        outputs: Vec<Vec<ChannelDescriptor>>,
    ) -> Self {
        let (n_in, n_out) = kind.arity();
        assert_eq!(inputs.len(), n_in, "{} takes {n_in} inputs", kind.name());
        assert_eq!(outputs.len(), n_out, "{} has {n_out} outputs", kind.name());
        Self {
            id: OperatorId::fresh(),
            kind,
            platform,
            inputs,
            outputs,
            load_estimator: None,
        }
    }

    pub fn with_load_estimator(mut self, estimator: Arc<dyn LoadProfileEstimator>) -> Self {
        self.load_estimator = Some(estimator);
        self
    }

    /// Bind `kind` to `platform` using the platform's declared channel support
    /// and the load specification found in `cfg`, if any.
    pub fn bind(
        platform: &Arc<dyn Platform>,
        kind: OperatorKind,
        cfg: &Configuration,
    ) -> Result<Self, PlanError> {
        let support = platform
            .channel_support(&kind)
            .ok_or_else(|| PlanError::UnsupportedOperator {
                platform: platform.name().to_string(),
                operator: kind.name().to_string(),
            })?;
        let key = load_key(platform.name(), kind.name());
        let mut op = Self::new(kind, Arc::clone(platform), support.inputs, support.outputs);
        if let Some(spec) = cfg.get_string_property(&key) {
            op.load_estimator = Some(Arc::new(parse_specification(spec)?));
        }
        Ok(op)
    }

    /// A conversion operator `from -> to` on `platform`.
    pub fn conversion(
        platform: &Arc<dyn Platform>,
        from: ChannelDescriptor,
        to: ChannelDescriptor,
        cfg: &Configuration,
    ) -> Result<Self, PlanError> {
        let mut op = Self::new(
            OperatorKind::Convert,
            Arc::clone(platform),
            vec![vec![from]],
            vec![vec![to]],
        );
        let spec = cfg
            .get_string_property(&conversion_load_key(platform.name(), &from, &to))
            .or_else(|| cfg.get_string_property(&load_key(platform.name(), "convert")));
        if let Some(spec) = spec {
            op.load_estimator = Some(Arc::new(parse_specification(spec)?));
        }
        Ok(op)
    }

    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    pub fn input_arity(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_arity(&self) -> usize {
        self.outputs.len()
    }

    /// Accepted descriptors for input `index`, most preferred first.
    pub fn supported_input_channels(&self, index: usize) -> &[ChannelDescriptor] {
        &self.inputs[index]
    }

    /// Producible descriptors for output `index`, most preferred first.
    pub fn supported_output_channels(&self, index: usize) -> &[ChannelDescriptor] {
        &self.outputs[index]
    }

    pub fn load_estimator(&self) -> Option<&Arc<dyn LoadProfileEstimator>> {
        self.load_estimator.as_ref()
    }

    /// Same kind, platform, descriptors, and estimator under a fresh id.
    pub fn copy(&self) -> Self {
        Self {
            id: OperatorId::fresh(),
            kind: self.kind.clone(),
            platform: Arc::clone(&self.platform),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            load_estimator: self.load_estimator.clone(),
        }
    }

    pub fn estimate_load(
        &self,
        inputs: &[CardinalityEstimate],
        outputs: &[CardinalityEstimate],
    ) -> Option<LoadProfile> {
        self.load_estimator
            .as_ref()
            .map(|e| e.estimate(inputs, outputs))
    }

    /// Default output cardinalities given input cardinalities.
    pub fn output_cardinalities(&self, inputs: &[CardinalityEstimate]) -> Vec<CardinalityEstimate> {
        eval::output_cardinalities(&self.kind, inputs)
    }

    /// Run the operator. Panics on arity mismatch.
    pub fn evaluate(
        &self,
        inputs: &mut [ChannelInstance],
        outputs: &mut [ChannelInstance],
    ) -> Result<(), EvalError> {
        assert_eq!(
            inputs.len(),
            self.input_arity(),
            "{self} got {} input instances",
            inputs.len()
        );
        assert_eq!(
            outputs.len(),
            self.output_arity(),
            "{self} got {} output instances",
            outputs.len()
        );
        eval::evaluate(&self.kind, inputs, outputs)
    }
}

impl fmt::Display for ExecutionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind.name(), self.platform.name())
    }
}

impl fmt::Debug for ExecutionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOperator")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("platform", &self.platform.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("has_estimator", &self.load_estimator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::TestPlatform;
    use polyflow_core::channel::{COLLECTION, STREAM};
    use polyflow_cost::Resource;

    #[test]
    fn bind_reads_load_specification() {
        let platform = TestPlatform::shared("p1");
        let mut cfg = Configuration::new();
        cfg.set_property("polyflow.p1.map.load", "cpu = 10 + 2*in0");
        let op = ExecutionOperator::bind(&platform, OperatorKind::map(|x| x), &cfg).unwrap();
        let profile = op
            .estimate_load(&[CardinalityEstimate::exact(5)], &[])
            .unwrap();
        assert_eq!(profile.get(Resource::Cpu).upper, 20.0);
        assert_eq!(op.supported_input_channels(0), &[STREAM, COLLECTION]);
    }

    #[test]
    fn bind_rejects_malformed_specification() {
        let platform = TestPlatform::shared("p1");
        let mut cfg = Configuration::new();
        cfg.set_property("polyflow.p1.filter.load", "cpu = ???");
        let err = ExecutionOperator::bind(&platform, OperatorKind::filter(|_| true), &cfg)
            .unwrap_err();
        assert!(matches!(err, PlanError::Cost(_)));
    }

    #[test]
    fn copies_share_capabilities_not_identity() {
        let platform = TestPlatform::shared("p1");
        let mut cfg = Configuration::new();
        cfg.set_property("polyflow.p1.sort.load", "cpu = 3*in0; overhead = 4");
        let op = ExecutionOperator::bind(&platform, OperatorKind::Sort, &cfg).unwrap();
        let a = op.copy();
        let b = op.copy();

        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), op.id());
        for c in [&a, &b] {
            assert_eq!(c.supported_input_channels(0), op.supported_input_channels(0));
            assert_eq!(c.supported_output_channels(0), op.supported_output_channels(0));
            let card = [CardinalityEstimate::exact(7)];
            assert_eq!(c.estimate_load(&card, &[]), op.estimate_load(&card, &[]));
        }
    }

    #[test]
    #[should_panic(expected = "union-all takes 2 inputs")]
    fn arity_mismatch_is_a_programming_error() {
        let platform = TestPlatform::shared("p1");
        ExecutionOperator::new(OperatorKind::UnionAll, platform, vec![vec![STREAM]], vec![vec![STREAM]]);
    }

    #[test]
    #[should_panic(expected = "got 0 input instances")]
    fn evaluate_checks_instance_arity() {
        let platform = TestPlatform::shared("p1");
        let op = ExecutionOperator::new(
            OperatorKind::Count,
            platform,
            vec![vec![STREAM]],
            vec![vec![STREAM]],
        );
        let _ = op.evaluate(&mut [], &mut []);
    }

    #[test]
    fn sink_clones_share_destination() {
        let sink = SinkHandle::new();
        let clone = sink.clone();
        clone.extend([Scalar::I64(1)]);
        assert_eq!(sink.snapshot(), vec![Scalar::I64(1)]);
        assert_eq!(sink.take().len(), 1);
        assert!(clone.is_empty());
    }
}
