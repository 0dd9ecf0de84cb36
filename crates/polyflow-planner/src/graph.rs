//! Physical operator graph: the planner's input.

use std::collections::BTreeSet;
use std::sync::Arc;

use polyflow_core::id::NodeId;
use polyflow_cost::CardinalityEstimate;
use polyflow_plan::ExecutionOperator;

use crate::Result;
use polyflow_plan::PlanError;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub operator: Arc<ExecutionOperator>,
    /// Caller-pinned output cardinality; derived from inputs when absent.
    pub cardinality: Option<CardinalityEstimate>,
}

/// Output `output` of `producer` feeds input `input` of `consumer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub producer: NodeId,
    pub output: usize,
    pub consumer: NodeId,
    pub input: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PhysicalGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl PhysicalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operator(&mut self, operator: ExecutionOperator) -> NodeId {
        self.add_shared(Arc::new(operator))
    }

    pub fn add_shared(&mut self, operator: Arc<ExecutionOperator>) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        self.nodes.push(GraphNode {
            id,
            operator,
            cardinality: None,
        });
        id
    }

    pub fn pin_cardinality(&mut self, node: NodeId, cardinality: CardinalityEstimate) {
        self.nodes[node.index()].cardinality = Some(cardinality);
    }

    /// Panics if either slot index is out of the operator's arity.
    pub fn connect(&mut self, producer: NodeId, output: usize, consumer: NodeId, input: usize) {
        let p = &self.nodes[producer.index()].operator;
        let c = &self.nodes[consumer.index()].operator;
        assert!(output < p.output_arity(), "{p} has no output {output}");
        assert!(input < c.input_arity(), "{c} has no input {input}");
        self.edges.push(GraphEdge {
            producer,
            output,
            consumer,
            input,
        });
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    /// Edges leaving output `output` of `node`, in insertion order.
    pub fn consumers_of(&self, node: NodeId, output: usize) -> Vec<GraphEdge> {
        self.edges
            .iter()
            .filter(|e| e.producer == node && e.output == output)
            .copied()
            .collect()
    }

    /// Every input fed exactly once, every output used, no cycles.
    /// Returns nodes in producer-before-consumer order.
    pub fn validate(&self) -> Result<Vec<NodeId>> {
        for n in &self.nodes {
            let op = &n.operator;
            for input in 0..op.input_arity() {
                let feeds = self
                    .edges
                    .iter()
                    .filter(|e| e.consumer == n.id && e.input == input)
                    .count();
                if feeds != 1 {
                    return Err(PlanError::InvalidGraph(format!(
                        "input {input} of {} ({op}) has {feeds} producers",
                        n.id
                    )));
                }
            }
            for output in 0..op.output_arity() {
                if !self.edges.iter().any(|e| e.producer == n.id && e.output == output) {
                    return Err(PlanError::InvalidGraph(format!(
                        "output {output} of {} ({op}) is not consumed",
                        n.id
                    )));
                }
            }
        }
        self.topological_order()
    }

    fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut indegree = vec![0usize; self.nodes.len()];
        for e in &self.edges {
            indegree[e.consumer.index()] += 1;
        }
        let mut ready: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|n| indegree[n.id.index()] == 0)
            .map(|n| n.id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for e in self.edges.iter().filter(|e| e.producer == next) {
                indegree[e.consumer.index()] -= 1;
                if indegree[e.consumer.index()] == 0 {
                    ready.insert(e.consumer);
                }
            }
        }
        if order.len() != self.nodes.len() {
            return Err(PlanError::InvalidGraph("operator graph has a cycle".into()));
        }
        Ok(order)
    }
}
