use crate::config::EngineConfig;
use crate::hierarchy::Hierarchy;
use crate::neighborhood::{AdjacencyMap, Neighborhood};
use crate::radial::RadialLayout;
use crate::search::{self, SearchHit};
use crate::timeline::{self, TimelineLayout};
use capgraph_core::{GraphSnapshot, NodeId, RawSnapshot, SnapshotError};
use chrono::{DateTime, Utc};

/// One data generation: an immutable snapshot plus everything derived from
/// it. Rebuilt from scratch on every refresh; callers drop the old value when
/// a newer one arrives, and the memoized artifacts (hierarchy, adjacency) die
/// with it.
#[derive(Debug, Clone)]
pub struct Generation {
    snapshot: GraphSnapshot,
    hierarchy: Hierarchy,
    adjacency: AdjacencyMap,
    cfg: EngineConfig,
}

impl Generation {
    pub fn build(raw: RawSnapshot, cfg: &EngineConfig) -> Result<Self, SnapshotError> {
        let snapshot = GraphSnapshot::from_raw(raw)?;
        if snapshot.dropped_edges > 0 {
            tracing::debug!(
                dropped = snapshot.dropped_edges,
                "dropped edges with unknown endpoints or edge types"
            );
        }
        let hierarchy = Hierarchy::build(&snapshot);
        let adjacency = AdjacencyMap::build(&snapshot.edges);
        Ok(Self {
            snapshot,
            hierarchy,
            adjacency,
            cfg: cfg.clone(),
        })
    }

    pub fn snapshot(&self) -> &GraphSnapshot {
        &self.snapshot
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Depth-bounded highlight set around a node, over the generation's
    /// prebuilt adjacency map.
    pub fn neighborhood(&self, start: &NodeId, depth: usize) -> Neighborhood {
        self.adjacency.expand(start, depth)
    }

    pub fn radial_layout(&self, tension: f64, width: f64, height: f64) -> RadialLayout {
        RadialLayout::build(
            &self.snapshot,
            &self.hierarchy,
            &self.cfg,
            tension,
            width,
            height,
        )
    }

    pub fn timeline_layout(&self, now: DateTime<Utc>, container_width: f64) -> TimelineLayout {
        timeline::layout_timeline(&self.hierarchy, &self.cfg, now, container_width)
    }

    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        search::search(&self.hierarchy, query, self.cfg.search_limit)
    }
}
