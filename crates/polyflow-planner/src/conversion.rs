//! Conversion graph: descriptors as vertices, conversion operators as edges.
//!
//! A conversion requirement is solved by the cheapest chain of conversions
//! from one of the producer's descriptors to one of the consumer's, at most
//! `polyflow.planner.max-conversion-hops` long. Ties break by producer
//! preference, then consumer preference, then fewer hops.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::trace;

use polyflow_core::channel::ChannelDescriptor;
use polyflow_core::config::{Configuration, MAX_CONVERSION_HOPS};
use polyflow_cost::{CardinalityEstimate, TimeEstimate};
use polyflow_plan::{ExecutionOperator, Platform};

use crate::cost::CostModel;
use crate::Result;

const DEFAULT_MAX_HOPS: u64 = 3;

#[derive(Debug)]
pub struct Conversion {
    pub from: ChannelDescriptor,
    pub to: ChannelDescriptor,
    /// Template operator; every use is a fresh copy.
    pub operator: Arc<ExecutionOperator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPath {
    /// Indices into the graph's conversions, in application order.
    pub steps: Vec<usize>,
    pub source: ChannelDescriptor,
    pub target: ChannelDescriptor,
    pub cost: TimeEstimate,
}

#[derive(Debug, Default)]
pub struct ConversionGraph {
    conversions: Vec<Conversion>,
    max_hops: usize,
}

impl ConversionGraph {
    pub fn new(platforms: &[Arc<dyn Platform>], cfg: &Configuration) -> Result<Self> {
        let mut conversions = Vec::new();
        for p in platforms {
            for (from, to) in p.conversions() {
                let operator = ExecutionOperator::conversion(p, from, to, cfg)?;
                conversions.push(Conversion {
                    from,
                    to,
                    operator: Arc::new(operator),
                });
            }
        }
        let max_hops = cfg.get_u64_or(MAX_CONVERSION_HOPS, DEFAULT_MAX_HOPS)? as usize;
        Ok(Self {
            conversions,
            max_hops,
        })
    }

    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    pub fn conversion(&self, index: usize) -> &Conversion {
        &self.conversions[index]
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Cheapest chain from any of `sources` to any of `targets` for
    /// `cardinality` quanta, or `None` if no chain within the hop limit.
    pub fn find(
        &self,
        sources: &[ChannelDescriptor],
        targets: &[ChannelDescriptor],
        cardinality: CardinalityEstimate,
        cost: &CostModel,
    ) -> Option<ConversionPath> {
        let step_cost: Vec<TimeEstimate> = self
            .conversions
            .iter()
            .map(|c| cost.operator_time(&c.operator, &[cardinality], &[cardinality]))
            .collect();

        let mut best: Option<(ConversionPath, usize, usize)> = None;
        for (si, source) in sources.iter().enumerate() {
            let mut path = Vec::new();
            let mut visited = vec![*source];
            self.search(
                *source,
                &mut path,
                &mut visited,
                &mut |steps: &[usize], at: ChannelDescriptor| {
                    let Some(ti) = targets.iter().position(|t| *t == at) else {
                        return;
                    };
                    let total = steps
                        .iter()
                        .fold(TimeEstimate::zero(), |acc, s| acc.plus(&step_cost[*s]));
                    let candidate = ConversionPath {
                        steps: steps.to_vec(),
                        source: *source,
                        target: at,
                        cost: total,
                    };
                    let better = match &best {
                        None => true,
                        Some((b, bsi, bti)) => {
                            rank(&candidate, si, ti, b, *bsi, *bti) == Ordering::Less
                        }
                    };
                    if better {
                        best = Some((candidate, si, ti));
                    }
                },
            );
        }
        let found = best.map(|(p, _, _)| p);
        if let Some(p) = &found {
            trace!(source = %p.source, target = %p.target, hops = p.steps.len(), cost = %p.cost, "conversion path");
        }
        found
    }

    fn search(
        &self,
        at: ChannelDescriptor,
        path: &mut Vec<usize>,
        visited: &mut Vec<ChannelDescriptor>,
        visit: &mut dyn FnMut(&[usize], ChannelDescriptor),
    ) {
        if !path.is_empty() {
            visit(path, at);
        }
        if path.len() >= self.max_hops {
            return;
        }
        for (i, c) in self.conversions.iter().enumerate() {
            if c.from != at || visited.contains(&c.to) {
                continue;
            }
            path.push(i);
            visited.push(c.to);
            self.search(c.to, path, visited, visit);
            visited.pop();
            path.pop();
        }
    }
}

fn rank(
    a: &ConversionPath,
    a_source: usize,
    a_target: usize,
    b: &ConversionPath,
    b_source: usize,
    b_target: usize,
) -> Ordering {
    a.cost
        .compare(&b.cost)
        .then(a_source.cmp(&b_source))
        .then(a_target.cmp(&b_target))
        .then(a.steps.len().cmp(&b.steps.len()))
}
