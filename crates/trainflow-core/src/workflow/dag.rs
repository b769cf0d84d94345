//! Job dependency graph, cycle detection, and parallel wave computation.
//!
//! Uses `petgraph` to model `needs` edges as a directed graph. Topological
//! sort detects cycles, depth-based grouping produces execution waves, and
//! reachability answers which jobs may run at the same time.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use trainflow_types::workflow::WorkflowDefinition;

use super::definition::WorkflowError;

/// The `needs` graph of a workflow. Edges point from a dependency to its dependent.
#[derive(Debug)]
pub struct JobGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    index: HashMap<&'a str, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl<'a> JobGraph<'a> {
    /// Build the graph, rejecting unknown dependencies and cycles.
    pub fn new(def: &'a WorkflowDefinition) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let index: HashMap<&str, NodeIndex> = def
            .jobs
            .keys()
            .map(|name| (name.as_str(), graph.add_node(name.as_str())))
            .collect();

        for (name, job) in &def.jobs {
            let to = index[name.as_str()];
            for dep in &job.needs {
                let from = index.get(dep.as_str()).ok_or_else(|| {
                    WorkflowError::UnknownDependency(format!(
                        "job '{name}' needs unknown job '{dep}'"
                    ))
                })?;
                graph.update_edge(*from, to, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let job = graph[cycle.node_id()];
            WorkflowError::CycleDetected(format!("cycle detected involving job '{job}'"))
        })?;

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Jobs in a dependency-respecting order.
    pub fn topo_order(&self) -> Vec<&'a str> {
        self.order.iter().map(|&idx| self.graph[idx]).collect()
    }

    /// Group jobs into waves by depth. Every job in wave `n` only needs jobs
    /// from waves `< n`. Jobs within a wave are sorted by name.
    pub fn waves(&self) -> Vec<Vec<&'a str>> {
        let mut depths: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &self.order {
            let depth = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|dep| depths.get(&dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depths.insert(idx, depth);
        }

        let wave_count = depths.values().copied().max().map_or(0, |d| d + 1);
        let mut waves: Vec<Vec<&str>> = vec![vec![]; wave_count];
        for (&idx, &depth) in &depths {
            waves[depth].push(self.graph[idx]);
        }
        for wave in &mut waves {
            wave.sort_unstable();
        }
        waves
    }

    /// Direct dependents of `job` (jobs that list it in `needs`).
    pub fn dependents(&self, job: &str) -> Vec<&'a str> {
        let Some(&idx) = self.index.get(job) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect();
        out.sort_unstable();
        out
    }

    /// Every job `job` transitively needs. Unknown jobs have none.
    pub fn ancestors(&self, job: &str) -> BTreeSet<&'a str> {
        let Some(&start) = self.index.get(job) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                out.insert(self.graph[idx]);
            }
        }
        out
    }

    /// Every job that transitively needs `job`.
    pub fn descendants(&self, job: &str) -> BTreeSet<&'a str> {
        let Some(&start) = self.index.get(job) else {
            return BTreeSet::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                out.insert(self.graph[idx]);
            }
        }
        out
    }

    /// Whether two distinct jobs have no ordering between them, so the
    /// executor may schedule them at the same time.
    pub fn can_run_concurrently(&self, a: &str, b: &str) -> bool {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        ia != ib
            && !has_path_connecting(&self.graph, ia, ib, None)
            && !has_path_connecting(&self.graph, ib, ia, None)
    }
}

// ---------------------------------------------------------------------------
// Convenience entry points
// ---------------------------------------------------------------------------

/// Group a workflow's jobs into parallel execution waves.
pub fn build_execution_plan(def: &WorkflowDefinition) -> Result<Vec<Vec<&str>>, WorkflowError> {
    Ok(JobGraph::new(def)?.waves())
}

/// Validate that jobs form a DAG (no cycles, all `needs` exist).
pub fn validate_dag(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    JobGraph::new(def).map(|_| ())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
