use capgraph_core::{Edge, NodeId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Hop ceiling for "whole connected stack" requests so pathological fan-out
/// stays bounded.
pub const MAX_HOPS: usize = 10;

/// Undirected adjacency over the full edge list, built once per data
/// generation. Highlighting is direction-agnostic, so both directions are
/// recorded for every edge type.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyMap {
    neighbors: HashMap<NodeId, Vec<NodeId>>,
    edges: Vec<Edge>,
}

#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    /// Nodes within the requested hop count, excluding the start id.
    pub nodes: HashSet<NodeId>,
    /// Edges whose both endpoints lie in `{start} ∪ nodes`.
    pub edges: Vec<Edge>,
}

impl AdjacencyMap {
    pub fn build(edges: &[Edge]) -> Self {
        let mut neighbors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in edges {
            neighbors
                .entry(edge.source.clone())
                .or_default()
                .push(edge.target.clone());
            neighbors
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
        for list in neighbors.values_mut() {
            list.sort();
            list.dedup();
        }
        Self {
            neighbors,
            edges: edges.to_vec(),
        }
    }

    pub fn neighbors(&self, id: &NodeId) -> &[NodeId] {
        self.neighbors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadth-first expansion up to `depth` hops. Depth zero and unknown
    /// start ids yield empty sets rather than errors.
    pub fn expand(&self, start: &NodeId, depth: usize) -> Neighborhood {
        let mut out = Neighborhood::default();
        if depth == 0 || !self.neighbors.contains_key(start) {
            return out;
        }
        let depth = depth.min(MAX_HOPS);

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(start.clone());
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
        queue.push_back((start.clone(), 0));

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for neighbor in self.neighbors(&current) {
                if visited.insert(neighbor.clone()) {
                    out.nodes.insert(neighbor.clone());
                    queue.push_back((neighbor.clone(), hops + 1));
                }
            }
        }

        out.edges = self
            .edges
            .iter()
            .filter(|edge| visited.contains(&edge.source) && visited.contains(&edge.target))
            .cloned()
            .collect();
        out
    }
}
