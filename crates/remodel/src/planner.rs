//! Upgrade planner - orders actions and breaks foreign key cycles.
//!
//! The planner runs Kahn's algorithm over the [`DependencyGraph`]. Whenever
//! several actions are ready at once it takes the one with the lowest
//! [`ActionKind`], then the lowest position in the diff, so the same graph
//! always yields the same plan.
//!
//! ## Cycles
//!
//! Two tables created together that reference each other cannot both be
//! created with their foreign key inline:
//!
//! ```text
//! + table x    (needs y for x.YId -> y.Id)
//! + table y    (needs x for y.XId -> x.Id)
//! ```
//!
//! When the sort stalls, the planner finds the strongly connected
//! components of what is left and defers the foreign key that induces the
//! most edges inside them. Deferred foreign keys are applied after every
//! ordered action. A stall that no foreign key can break is an error.

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use remodel_schema::{ActionKind, SchemaAction, SchemaModel};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// The ordered result of planning an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradePlan {
    /// Actions in application order.
    pub ordered: Vec<SchemaAction>,
    /// `AddForeignKey` actions to apply after everything in `ordered`.
    pub deferred_foreign_keys: Vec<SchemaAction>,
}

impl UpgradePlan {
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty() && self.deferred_foreign_keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordered.len() + self.deferred_foreign_keys.len()
    }

    /// Every action in application order, deferred foreign keys last.
    pub fn iter(&self) -> impl Iterator<Item = &SchemaAction> {
        self.ordered.iter().chain(&self.deferred_foreign_keys)
    }
}

impl std::fmt::Display for UpgradePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "Nothing to do.");
        }
        let mut lines: Vec<String> = self.ordered.iter().map(|a| a.to_string()).collect();
        if !self.deferred_foreign_keys.is_empty() {
            lines.push("-- deferred".to_string());
            lines.extend(self.deferred_foreign_keys.iter().map(|a| a.to_string()));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

/// Node positions in the order the planner chose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub ordered: Vec<usize>,
    pub deferred: Vec<usize>,
}

/// Orders the nodes of a [`DependencyGraph`].
#[derive(Debug, Clone, Copy)]
pub struct Planner<'g> {
    graph: &'g DependencyGraph,
    allow_deferred_foreign_keys: bool,
}

/// Mutable sort state: which edges still count and how many each node
/// still waits on.
struct Sort<'g> {
    graph: &'g DependencyGraph,
    active: Vec<bool>,
    indegree: Vec<usize>,
    done: Vec<bool>,
    ready: BinaryHeap<Reverse<(ActionKind, usize)>>,
}

impl<'g> Sort<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        let mut indegree = vec![0; graph.len()];
        for edge in graph.edges() {
            indegree[edge.to] += 1;
        }

        let mut sort = Self {
            graph,
            active: vec![true; graph.edges().len()],
            indegree,
            done: vec![false; graph.len()],
            ready: BinaryHeap::new(),
        };
        for node in 0..graph.len() {
            if sort.indegree[node] == 0 {
                sort.push(node);
            }
        }
        sort
    }

    fn push(&mut self, node: usize) {
        self.ready
            .push(Reverse((self.graph.action(node).kind(), node)));
    }

    /// Stop counting edge `id`; its target may become ready.
    fn retire(&mut self, id: usize) {
        if !std::mem::replace(&mut self.active[id], false) {
            return;
        }
        let to = self.graph.edge(id).to;
        self.indegree[to] -= 1;
        if self.indegree[to] == 0 && !self.done[to] {
            self.push(to);
        }
    }

    /// Take `node` out of the graph, releasing everything waiting on it.
    fn complete(&mut self, node: usize) {
        self.done[node] = true;
        let graph = self.graph;
        for &id in graph.outgoing(node) {
            self.retire(id);
        }
    }

    fn remaining(&self) -> Vec<usize> {
        (0..self.graph.len()).filter(|&n| !self.done[n]).collect()
    }

    /// Tarjan's algorithm over the remaining nodes and active edges, with an
    /// explicit call stack. Returns a component id per node (`usize::MAX`
    /// for completed nodes).
    fn components(&self) -> Vec<usize> {
        const UNVISITED: usize = usize::MAX;
        let n = self.graph.len();

        let mut index = vec![UNVISITED; n];
        let mut low = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut component = vec![UNVISITED; n];
        let mut stack = Vec::new();
        let mut next_index = 0;
        let mut next_component = 0;

        for root in 0..n {
            if self.done[root] || index[root] != UNVISITED {
                continue;
            }

            index[root] = next_index;
            low[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut calls = vec![(root, 0usize)];

            while let Some(frame) = calls.last_mut() {
                let v = frame.0;
                let out = self.graph.outgoing(v);

                if frame.1 < out.len() {
                    let id = out[frame.1];
                    frame.1 += 1;
                    let w = self.graph.edge(id).to;
                    if !self.active[id] || self.done[w] {
                        continue;
                    }
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        low[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        calls.push((w, 0));
                    } else if on_stack[w] {
                        low[v] = low[v].min(index[w]);
                    }
                    continue;
                }

                calls.pop();
                if let Some(&(parent, _)) = calls.last() {
                    low[parent] = low[parent].min(low[v]);
                }
                if low[v] == index[v] {
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component[w] = next_component;
                        if w == v {
                            break;
                        }
                    }
                    next_component += 1;
                }
            }
        }

        component
    }

    /// The remaining `AddForeignKey` whose deferral removes the most edges
    /// inside a component, lowest position first on ties.
    fn deferral_candidate(&self, component: &[usize]) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;

        for node in self.remaining() {
            if self.graph.action(node).kind() != ActionKind::AddForeignKey {
                continue;
            }
            let inside = self
                .graph
                .induced_by(node)
                .iter()
                .filter(|&&id| {
                    let edge = self.graph.edge(id);
                    self.active[id]
                        && !self.done[edge.from]
                        && !self.done[edge.to]
                        && component[edge.from] == component[edge.to]
                })
                .count();
            if inside > 0 && best.is_none_or(|(count, _)| inside > count) {
                best = Some((inside, node));
            }
        }

        best.map(|(_, node)| node)
    }

    /// Remaining nodes that sit on a cycle.
    fn cyclic(&self, component: &[usize]) -> Vec<usize> {
        let remaining = self.remaining();
        remaining
            .iter()
            .copied()
            .filter(|&n| {
                remaining
                    .iter()
                    .any(|&m| m != n && component[m] == component[n])
            })
            .collect()
    }
}

impl<'g> Planner<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            allow_deferred_foreign_keys: true,
        }
    }

    /// When off, any cycle is reported as unresolvable.
    pub fn allow_deferred_foreign_keys(mut self, enabled: bool) -> Self {
        self.allow_deferred_foreign_keys = enabled;
        self
    }

    pub fn schedule(&self) -> Result<Schedule> {
        let graph = self.graph;
        let mut sort = Sort::new(graph);
        let mut schedule = Schedule::default();

        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edges().len(),
            "planning upgrade"
        );

        loop {
            while let Some(Reverse((_, node))) = sort.ready.pop() {
                schedule.ordered.push(node);
                sort.complete(node);
            }

            if schedule.ordered.len() + schedule.deferred.len() == graph.len() {
                break;
            }

            let component = sort.components();
            let candidate = if self.allow_deferred_foreign_keys {
                sort.deferral_candidate(&component)
            } else {
                None
            };

            let Some(fk) = candidate else {
                let actions: Vec<String> = sort
                    .cyclic(&component)
                    .into_iter()
                    .map(|n| graph.action(n).to_string())
                    .collect();
                tracing::debug!(stalled = actions.len(), "cycle cannot be broken");
                return Err(Error::UnresolvableCycle { actions });
            };

            tracing::info!(action = %graph.action(fk), "deferring foreign key to break a cycle");
            for &id in graph.induced_by(fk) {
                sort.retire(id);
            }
            schedule.deferred.push(fk);
            sort.complete(fk);
        }

        Ok(schedule)
    }

    pub fn plan(&self) -> Result<UpgradePlan> {
        let schedule = self.schedule()?;
        let take = |nodes: &[usize]| -> Vec<SchemaAction> {
            nodes
                .iter()
                .map(|&n| self.graph.action(n).clone())
                .collect()
        };
        Ok(UpgradePlan {
            ordered: take(&schedule.ordered),
            deferred_foreign_keys: take(&schedule.deferred),
        })
    }
}

/// Replay `plan` on a copy of `old` and require the result to match `new`.
pub fn verify(plan: &UpgradePlan, old: &SchemaModel, new: &SchemaModel) -> Result<()> {
    let mut model = old.clone();
    for action in plan.iter() {
        model.apply(action)?;
    }

    if let Some(diff) = model.structural_mismatch(new) {
        return Err(Error::SimulationMismatch { diff });
    }

    tracing::debug!(actions = plan.len(), "plan verified");
    Ok(())
}
