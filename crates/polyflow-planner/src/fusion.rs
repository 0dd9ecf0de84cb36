//! Grouping tasks into platform executions.
//!
//! Two tasks linked by a channel merge iff the descriptor is fusible, both
//! run on the same platform, the platform's fusion predicate agrees, and the
//! merge would not make the executions depend on each other in a cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use polyflow_core::id::TaskId;
use polyflow_plan::ExecutionPlan;

use crate::Result;

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a.max(b)] = a.min(b);
        }
    }
}

/// Assign every task of `plan` to a platform execution.
pub fn group(plan: &mut ExecutionPlan) -> Result<()> {
    let order = plan.topological_order()?;
    let n = plan.tasks().len();
    let mut groups = UnionFind::new(n);

    // Same-platform pairs that must stay in different executions, even when
    // other merges would bring them together.
    let mut refused: Vec<(usize, usize)> = Vec::new();
    let mut candidates = Vec::new();
    for ch in plan.channels() {
        let producer = plan.task(ch.producer);
        for c in &ch.consumers {
            let consumer = plan.task(c.task);
            if producer.operator.platform_name() != consumer.operator.platform_name() {
                continue;
            }
            let pair = (producer.id.index(), consumer.id.index());
            if !ch.descriptor.fusible {
                refused.push(pair);
            } else if !producer
                .operator
                .platform()
                .is_single_platform_execution_possible(producer, ch, consumer)
            {
                trace!(channel = %ch.id, "platform keeps a materialization boundary");
                refused.push(pair);
            } else {
                candidates.push((ch.id, pair));
            }
        }
    }

    for (channel, (p, q)) in candidates {
        let (a, b) = (groups.find(p), groups.find(q));
        if a == b {
            continue;
        }
        if joins_refused_pair(&mut groups, &refused, a, b) {
            trace!(%channel, "merge would fuse across a refused channel");
            continue;
        }
        if detour_exists(plan, &mut groups, a, b) {
            trace!(%channel, "merge would create an execution cycle");
            continue;
        }
        groups.union(a, b);
    }

    // Executions are numbered by the topological position of their first task.
    let mut members: BTreeMap<usize, Vec<TaskId>> = BTreeMap::new();
    let mut first_seen: Vec<usize> = Vec::new();
    for t in &order {
        let root = groups.find(t.index());
        if !members.contains_key(&root) {
            first_seen.push(root);
        }
        members.entry(root).or_default().push(*t);
    }
    for root in first_seen {
        let tasks = members.remove(&root).unwrap_or_default();
        let Some(first) = tasks.first() else { continue };
        let platform = Arc::clone(plan.task(*first).operator.platform());
        plan.add_execution(platform, tasks);
    }
    Ok(())
}

/// True if merging groups `a` and `b` would put both ends of a refused pair
/// into one execution.
fn joins_refused_pair(
    groups: &mut UnionFind,
    refused: &[(usize, usize)],
    a: usize,
    b: usize,
) -> bool {
    refused.iter().any(|&(x, y)| {
        let (x, y) = (groups.find(x), groups.find(y));
        (x == a && y == b) || (x == b && y == a)
    })
}

/// True if group `to` is reachable from group `from` through some third group.
fn detour_exists(plan: &ExecutionPlan, groups: &mut UnionFind, from: usize, to: usize) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![false; plan.tasks().len()];
    seen[from] = true;
    while let Some(g) = stack.pop() {
        for t in plan.tasks() {
            if groups.find(t.id.index()) != g {
                continue;
            }
            for ch in t.output_channels() {
                for c in &plan.channel(ch).consumers {
                    let next = groups.find(c.task.index());
                    if next == to {
                        if g != from {
                            return true;
                        }
                        continue;
                    }
                    if !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }
        }
    }
    false
}
