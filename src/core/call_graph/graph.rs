use std::collections::{BTreeMap, BTreeSet, VecDeque};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::project::WorkflowIndex;
use super::cycles::{detect_cycles, Cycle};
use super::invocation::{InvocationEdge, InvocationKind};

/// One workflow in the call graph.
///
/// Mutated in exactly two passes (edge attachment, then depth
/// assignment) and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub workflow_id: String,
    pub path: String,
    pub display_name: String,
    pub is_entry_point: bool,
    /// Minimum number of static-invocation hops from any entry point;
    /// −1 until assigned (and forever, for orphans)
    pub call_depth: i32,
    /// Outgoing invocations
    pub dependencies: Vec<InvocationEdge>,
    /// Workflow ids that statically invoke this one
    pub dependents: BTreeSet<String>,
}

/// Per-kind invocation totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationCounts {
    pub invoke: usize,
    pub invoke_dynamic: usize,
    pub invoke_missing: usize,
    pub invoke_coded: usize,
}

impl InvocationCounts {
    fn record(&mut self, kind: InvocationKind) {
        match kind {
            InvocationKind::Invoke => self.invoke += 1,
            InvocationKind::InvokeDynamic => self.invoke_dynamic += 1,
            InvocationKind::InvokeMissing => self.invoke_missing += 1,
            InvocationKind::InvokeCoded => self.invoke_coded += 1,
        }
    }
}

/// Aggregate call-graph metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetrics {
    pub total_workflows: usize,
    pub total_dependencies: usize,
    pub entry_points: usize,
    pub orphans: usize,
    pub max_call_depth: i32,
    pub cycles: usize,
    pub invocations: InvocationCounts,
}

/// The project-wide call graph. Rebuilt wholesale each run, never
/// incrementally patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraph {
    pub project_id: String,
    pub project_slug: String,
    pub generated_at: DateTime<Utc>,
    pub workflows: BTreeMap<String, WorkflowNode>,
    pub entry_points: Vec<String>,
    pub cycles: Vec<Cycle>,
    pub metrics: GraphMetrics,
}

/// Assembles the call graph from the workflow index and the classified
/// invocation edges.
pub struct CallGraphBuilder;

impl CallGraphBuilder {
    /// Build the graph: populate nodes, attach edges, assign BFS depths,
    /// detect cycles, compute metrics.
    ///
    /// Deterministic: workflows live in a `BTreeMap`, BFS layering makes
    /// depths order-independent, and cycle dedup is canonical.
    pub fn build(
        project_id: &str,
        project_slug: &str,
        index: &WorkflowIndex,
        edges: Vec<InvocationEdge>,
        entry_point_ids: &BTreeSet<String>,
    ) -> CallGraph {
        // Pass 1: node population.
        let mut workflows: BTreeMap<String, WorkflowNode> = BTreeMap::new();
        for entry in index.entries() {
            let is_entry_point = entry_point_ids.contains(&entry.workflow_id);
            workflows.insert(
                entry.workflow_id.clone(),
                WorkflowNode {
                    workflow_id: entry.workflow_id.clone(),
                    path: entry.relative_path.clone(),
                    display_name: entry.display_name.clone(),
                    is_entry_point,
                    call_depth: if is_entry_point { 0 } else { -1 },
                    dependencies: Vec::new(),
                    dependents: BTreeSet::new(),
                },
            );
        }

        for id in entry_point_ids {
            if !workflows.contains_key(id) {
                warn!("declared entry point {} is not in the workflow index", id);
            }
        }

        // Pass 2: edge attachment. Static edges resolve against the
        // index; unresolved edges are still recorded on their source.
        let mut metrics = GraphMetrics::default();
        let mut invoke_adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in workflows.keys() {
            invoke_adjacency.insert(id.clone(), Vec::new());
        }

        for mut edge in edges {
            metrics.invocations.record(edge.kind);

            let source_path = workflows
                .get(&edge.source_workflow_id)
                .map(|n| n.path.clone())
                .unwrap_or_default();

            if matches!(edge.kind, InvocationKind::Invoke | InvocationKind::InvokeCoded) {
                edge.resolved_target_id = index
                    .resolve(&source_path, &edge.target_path)
                    .map(|entry| entry.workflow_id.clone());
            }

            if let Some(target_id) = edge.resolved_target_id.clone() {
                if edge.kind == InvocationKind::Invoke {
                    invoke_adjacency
                        .entry(edge.source_workflow_id.clone())
                        .or_default()
                        .push(target_id.clone());
                }
                if let Some(target) = workflows.get_mut(&target_id) {
                    target.dependents.insert(edge.source_workflow_id.clone());
                }
            }

            metrics.total_dependencies += 1;
            if let Some(source) = workflows.get_mut(&edge.source_workflow_id) {
                source.dependencies.push(edge);
            } else {
                warn!(
                    "invocation from unknown workflow {} dropped from node attachment",
                    edge.source_workflow_id
                );
            }
        }

        for targets in invoke_adjacency.values_mut() {
            targets.sort();
            targets.dedup();
        }

        // Pass 3: BFS depth assignment over invoke-only edges. The first
        // layer a node appears in is its minimum distance.
        let mut queue: VecDeque<(String, i32)> = entry_point_ids
            .iter()
            .filter(|id| workflows.contains_key(*id))
            .map(|id| (id.clone(), 0))
            .collect();
        let mut assigned: BTreeSet<String> = queue.iter().map(|(id, _)| id.clone()).collect();

        while let Some((id, depth)) = queue.pop_front() {
            if let Some(node) = workflows.get_mut(&id) {
                node.call_depth = depth;
            }
            let Some(targets) = invoke_adjacency.get(&id) else {
                continue;
            };
            for target in targets {
                if assigned.insert(target.clone()) {
                    queue.push_back((target.clone(), depth + 1));
                }
            }
        }

        // Pass 4: cycle detection on the invoke-only subgraph.
        let cycles = detect_cycles(&invoke_adjacency);

        // Pass 5: aggregate metrics.
        metrics.total_workflows = workflows.len();
        metrics.entry_points = workflows.values().filter(|n| n.is_entry_point).count();
        metrics.orphans = workflows.values().filter(|n| n.call_depth < 0).count();
        metrics.max_call_depth = workflows
            .values()
            .map(|n| n.call_depth)
            .max()
            .unwrap_or(-1);
        metrics.cycles = cycles.len();

        let entry_points: Vec<String> = entry_point_ids
            .iter()
            .filter(|id| workflows.contains_key(*id))
            .cloned()
            .collect();

        CallGraph {
            project_id: project_id.to_string(),
            project_slug: project_slug.to_string(),
            generated_at: Utc::now(),
            workflows,
            entry_points,
            cycles,
            metrics,
        }
    }
}

impl CallGraph {
    /// Flat invocation-record stream for downstream consumers.
    pub fn invocation_records(&self) -> Vec<super::invocation::InvocationRecord> {
        self.workflows
            .values()
            .flat_map(|node| node.dependencies.iter().map(|e| e.to_record()))
            .collect()
    }

    /// Workflows transitively affected by a change to `workflow_id`:
    /// everything that reaches it through static invocations, nearest
    /// callers first.
    pub fn impacted_by(&self, workflow_id: &str) -> Vec<String> {
        let mut impacted: Vec<String> = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        seen.insert(workflow_id);
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(workflow_id);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.workflows.get(current) else {
                continue;
            };
            for dependent in &node.dependents {
                if seen.insert(dependent.as_str()) {
                    impacted.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }

        impacted
    }

    /// Written targets that could not be resolved to an indexed workflow.
    pub fn unresolved_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .workflows
            .values()
            .flat_map(|node| node.dependencies.iter())
            .filter(|e| {
                e.resolved_target_id.is_none()
                    && matches!(e.kind, InvocationKind::Invoke | InvocationKind::InvokeMissing)
            })
            .map(|e| e.target_path.clone())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}
