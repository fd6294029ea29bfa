use std::collections::{BTreeMap, BTreeSet, HashSet};
use serde::{Deserialize, Serialize};

use crate::core::xaml::hash8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleType {
    #[serde(rename = "self")]
    SelfLoop,
    #[serde(rename = "complex")]
    Complex,
}

/// A cycle in the static invocation graph. Derived data, read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    /// Content-addressed id, stable across runs and traversal orders
    pub id: String,
    /// Participating workflow ids in invocation order, rotated to start at
    /// the lexicographically smallest id
    pub workflow_ids: Vec<String>,
    pub cycle_type: CycleType,
}

/// Detect all cycles in the invoke-only subgraph.
///
/// Depth-first search with an explicit recursion stack; a back-edge to a
/// node on the stack yields a cycle. Cycles are deduplicated by canonical
/// node set and rotated to a canonical starting node, so the result does
/// not depend on traversal order.
pub fn detect_cycles(adjacency: &BTreeMap<String, Vec<String>>) -> Vec<Cycle> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cycles: Vec<Cycle> = Vec::new();
    let mut seen_sets: HashSet<BTreeSet<String>> = HashSet::new();

    for start in adjacency.keys() {
        if visited.contains(start.as_str()) {
            continue;
        }

        // Frame: node plus the index of the next neighbor to visit.
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
        let mut on_stack: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();

        while !stack.is_empty() {
            let (node, neighbor_idx) = {
                let top = stack.last_mut().expect("stack checked non-empty");
                if top.1 == 0 {
                    visited.insert(top.0);
                    on_stack.insert(top.0);
                    path.push(top.0);
                }
                let current = (top.0, top.1);
                top.1 += 1;
                current
            };

            let neighbors = adjacency.get(node).map(|v| v.as_slice()).unwrap_or(&[]);
            match neighbors.get(neighbor_idx) {
                Some(next) => {
                    if on_stack.contains(next.as_str()) {
                        if let Some(position) = path.iter().position(|n| *n == next.as_str()) {
                            record_cycle(&path[position..], &mut cycles, &mut seen_sets);
                        }
                    } else if !visited.contains(next.as_str()) {
                        stack.push((next.as_str(), 0));
                    }
                }
                None => {
                    on_stack.remove(node);
                    path.pop();
                    stack.pop();
                }
            }
        }
    }

    cycles.sort_by(|a, b| a.workflow_ids.cmp(&b.workflow_ids));
    cycles
}

fn record_cycle(
    nodes: &[&str],
    cycles: &mut Vec<Cycle>,
    seen_sets: &mut HashSet<BTreeSet<String>>,
) {
    let canonical: BTreeSet<String> = nodes.iter().map(|n| n.to_string()).collect();
    if !seen_sets.insert(canonical.clone()) {
        return;
    }

    // Rotate so the cycle starts at its smallest id; cyclic edge order is
    // preserved.
    let pivot = nodes
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let workflow_ids: Vec<String> = nodes[pivot..]
        .iter()
        .chain(nodes[..pivot].iter())
        .map(|n| n.to_string())
        .collect();

    let cycle_type = if workflow_ids.len() == 1 {
        CycleType::SelfLoop
    } else {
        CycleType::Complex
    };

    let key: Vec<&String> = canonical.iter().collect();
    let id = format!(
        "cycle-{}",
        hash8(&key.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("|"))
    );

    cycles.push(Cycle {
        id,
        workflow_ids,
        cycle_type,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(edges: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (from, to) in edges {
            map.entry(from.to_string())
                .or_default()
                .push(to.to_string());
            map.entry(to.to_string()).or_default();
        }
        map
    }

    #[test]
    fn test_self_cycle() {
        let cycles = detect_cycles(&adjacency(&[("a", "a")]));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].cycle_type, CycleType::SelfLoop);
        assert_eq!(cycles[0].workflow_ids, vec!["a"]);
    }

    #[test]
    fn test_two_node_cycle_is_complex() {
        let cycles = detect_cycles(&adjacency(&[("a", "b"), ("b", "a")]));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].cycle_type, CycleType::Complex);
        assert_eq!(cycles[0].workflow_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_cycles_deduplicated_by_node_set() {
        // The same a→b→a cycle is discoverable from both a and b.
        let mut adj = adjacency(&[("a", "b"), ("b", "a"), ("c", "a"), ("c", "b")]);
        adj.entry("c".to_string()).or_default();
        let cycles = detect_cycles(&adj);
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn test_acyclic_graph_reports_nothing() {
        let cycles = detect_cycles(&adjacency(&[("a", "b"), ("b", "c"), ("a", "c")]));
        assert!(cycles.is_empty());
    }

    #[test]
    fn test_cycle_rotation_is_canonical() {
        // Same cycle entered at different points must serialize identically.
        let first = detect_cycles(&adjacency(&[("b", "c"), ("c", "b")]));
        let second = detect_cycles(&adjacency(&[("c", "b"), ("b", "c")]));
        assert_eq!(first[0].workflow_ids, second[0].workflow_ids);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_consecutive_pairs_are_real_edges() {
        let adj = adjacency(&[("m", "a"), ("a", "b"), ("b", "c"), ("c", "a")]);
        let cycles = detect_cycles(&adj);
        assert_eq!(cycles.len(), 1);

        let ids = &cycles[0].workflow_ids;
        for window in 0..ids.len() {
            let from = &ids[window];
            let to = &ids[(window + 1) % ids.len()];
            assert!(
                adj.get(from).map(|n| n.contains(to)).unwrap_or(false),
                "{from} -> {to} is not a real edge"
            );
        }
    }
}
