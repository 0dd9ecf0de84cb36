//! Evaluation and cardinality rules per operator kind.
//!
//! Element-wise kinds stay lazy: they wrap the input stream and hand the
//! wrapped stream to the output instance, which decides whether to buffer it.
//! Shuffle kinds (distinct, count, sort) drain their input first.

use std::cmp::Ordering;
use std::fs;

use polyflow_core::types::Scalar;
use polyflow_cost::CardinalityEstimate;

use crate::error::EvalError;
use crate::instance::ChannelInstance;
use crate::operator::OperatorKind;

pub(crate) fn evaluate(
    kind: &OperatorKind,
    inputs: &mut [ChannelInstance],
    outputs: &mut [ChannelInstance],
) -> Result<(), EvalError> {
    match kind {
        OperatorKind::CollectionSource { data } => outputs[0].accept_shared(data.clone()),
        OperatorKind::TextFileSource { path } => {
            let text = fs::read_to_string(path)?;
            let lines: Vec<Scalar> = text.lines().map(Scalar::from).collect();
            outputs[0].accept_collection(lines)
        }
        OperatorKind::Map { udf } => {
            let udf = udf.clone();
            let input = inputs[0].provide_stream()?;
            outputs[0].accept_stream(Box::new(input.map(move |q| udf(q))))
        }
        OperatorKind::Filter { predicate } => {
            let predicate = predicate.clone();
            let input = inputs[0].provide_stream()?;
            outputs[0].accept_stream(Box::new(input.filter(move |q| predicate(q))))
        }
        OperatorKind::FlatMap { udf } => {
            let udf = udf.clone();
            let input = inputs[0].provide_stream()?;
            outputs[0].accept_stream(Box::new(input.flat_map(move |q| udf(q))))
        }
        OperatorKind::UnionAll => {
            let first = inputs[0].provide_stream()?;
            let second = inputs[1].provide_stream()?;
            outputs[0].accept_stream(Box::new(first.chain(second)))
        }
        OperatorKind::Distinct => {
            let mut data: Vec<Scalar> = inputs[0].provide_stream()?.collect();
            data.sort_by(Scalar::total_cmp);
            data.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
            outputs[0].accept_collection(data)
        }
        OperatorKind::Count => {
            let n = inputs[0].provide_stream()?.count();
            let n = i64::try_from(n).map_err(|_| EvalError::Operator(format!("count {n} overflows i64")))?;
            outputs[0].accept_collection(vec![Scalar::I64(n)])
        }
        OperatorKind::Sort => {
            let mut data: Vec<Scalar> = inputs[0].provide_stream()?.collect();
            data.sort_by(Scalar::total_cmp);
            outputs[0].accept_collection(data)
        }
        OperatorKind::CollectSink { sink } => {
            sink.extend(inputs[0].provide_stream()?);
            Ok(())
        }
        OperatorKind::Convert => {
            let input = inputs[0].provide_stream()?;
            outputs[0].accept_stream(input)
        }
    }
}

pub(crate) fn output_cardinalities(
    kind: &OperatorKind,
    inputs: &[CardinalityEstimate],
) -> Vec<CardinalityEstimate> {
    let input = |i: usize| inputs.get(i).copied().unwrap_or_default();
    let out = match kind {
        OperatorKind::CollectionSource { data } => CardinalityEstimate::exact(data.len() as u64),
        OperatorKind::TextFileSource { .. } => CardinalityEstimate::unknown(),
        OperatorKind::Map { .. } | OperatorKind::Sort | OperatorKind::Convert => input(0),
        OperatorKind::Filter { .. } => input(0).scale(0.0, 1.0, 0.7),
        OperatorKind::FlatMap { .. } => input(0).scale(0.0, 4.0, 0.5),
        OperatorKind::UnionAll => input(0).plus(&input(1)),
        OperatorKind::Distinct => {
            let c = input(0);
            CardinalityEstimate::new(c.lower.min(1), c.upper, c.correctness.min(0.8))
        }
        OperatorKind::Count => CardinalityEstimate::exact(1),
        OperatorKind::CollectSink { .. } => return Vec::new(),
    };
    vec![out]
}
