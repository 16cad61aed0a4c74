use capgraph_core::{Edge, EdgeType, GraphSnapshot, Node, NodeId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One visual instance of a tool under a parent capability. A tool used by a
/// single capability keeps its logical id; a fanned-out tool gets one instance
/// per parent with a `tool__parent` id so each parent can render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInstance {
    pub instance_id: NodeId,
    pub tool_id: NodeId,
    pub parent_id: NodeId,
    pub name: String,
    pub server: String,
    pub pagerank: f64,
    pub community_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityNode {
    pub id: NodeId,
    pub name: String,
    pub description: String,
    pub usage_count: f64,
    pub success_rate: f64,
    pub pagerank: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub community_id: Option<i64>,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub tools: Vec<ToolInstance>,
    pub level: u32,
    pub level_norm: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyStats {
    pub capability_count: usize,
    pub tool_count: usize,
    pub tool_instance_count: usize,
    pub orphan_tool_count: usize,
    pub empty_capability_count: usize,
    pub dropped_edge_count: usize,
    pub max_level: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Hierarchy {
    pub roots: Vec<NodeId>,
    pub capabilities: BTreeMap<NodeId, CapabilityNode>,
    pub capability_edges: Vec<Edge>,
    pub tool_edges: Vec<Edge>,
    pub orphan_tools: Vec<NodeId>,
    pub empty_capabilities: Vec<NodeId>,
    pub stats: HierarchyStats,
    pub max_level: u32,
}

impl Hierarchy {
    /// Rebuild the capability tree from a full snapshot. Never-invoked
    /// capabilities (usage_count <= 0) and tools without any `uses` parent are
    /// left out and classified instead of rendered.
    pub fn build(snapshot: &GraphSnapshot) -> Self {
        let mut capabilities: BTreeMap<NodeId, CapabilityNode> = BTreeMap::new();
        for (id, node) in &snapshot.nodes {
            let Node::Capability {
                name,
                description,
                usage_count,
                success_rate,
                pagerank,
                last_used,
                community_id,
            } = node
            else {
                continue;
            };
            if *usage_count <= 0.0 {
                continue;
            }
            capabilities.insert(
                id.clone(),
                CapabilityNode {
                    id: id.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    usage_count: *usage_count,
                    success_rate: *success_rate,
                    pagerank: *pagerank,
                    last_used: *last_used,
                    community_id: *community_id,
                    parent_id: None,
                    children: Vec::new(),
                    tools: Vec::new(),
                    level: 1,
                    level_norm: 0.0,
                },
            );
        }

        // Parent resolution: first `contains` edge targeting a child wins,
        // later mappings for the same child are ignored. Both endpoints must
        // be kept capability ids.
        let mut parent_of: HashMap<NodeId, NodeId> = HashMap::new();
        for edge in &snapshot.edges {
            if edge.edge_type != EdgeType::Contains {
                continue;
            }
            if edge.source == edge.target {
                continue;
            }
            if !capabilities.contains_key(&edge.source) || !capabilities.contains_key(&edge.target)
            {
                continue;
            }
            parent_of
                .entry(edge.target.clone())
                .or_insert_with(|| edge.source.clone());
        }

        // Tool membership via `uses` edges, preserving fan-out.
        let mut tool_parents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in &snapshot.edges {
            if edge.edge_type != EdgeType::Uses {
                continue;
            }
            if !capabilities.contains_key(&edge.source) {
                continue;
            }
            if !snapshot.nodes.get(&edge.target).is_some_and(Node::is_tool) {
                continue;
            }
            let parents = tool_parents.entry(edge.target.clone()).or_default();
            if !parents.contains(&edge.source) {
                parents.push(edge.source.clone());
            }
        }

        let mut orphan_tools: Vec<NodeId> = snapshot
            .nodes
            .iter()
            .filter(|(id, node)| node.is_tool() && !tool_parents.contains_key(id))
            .map(|(id, _)| id.clone())
            .collect();
        orphan_tools.sort();

        let mut tool_instance_count = 0usize;
        for (tool_id, parents) in &tool_parents {
            let Some(Node::Tool {
                name,
                server,
                pagerank,
                community_id,
                ..
            }) = snapshot.nodes.get(tool_id)
            else {
                continue;
            };
            let fanned_out = parents.len() > 1;
            for parent_id in parents {
                let instance_id = if fanned_out {
                    NodeId(format!("{}__{}", tool_id.0, parent_id.0))
                } else {
                    tool_id.clone()
                };
                if let Some(parent) = capabilities.get_mut(parent_id) {
                    parent.tools.push(ToolInstance {
                        instance_id,
                        tool_id: tool_id.clone(),
                        parent_id: parent_id.clone(),
                        name: name.clone(),
                        server: server.clone(),
                        pagerank: *pagerank,
                        community_id: *community_id,
                    });
                    tool_instance_count += 1;
                }
            }
        }

        let mut children_of: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (child, parent) in &parent_of {
            children_of
                .entry(parent.clone())
                .or_default()
                .push(child.clone());
        }
        for list in children_of.values_mut() {
            list.sort();
        }

        for cap in capabilities.values_mut() {
            cap.parent_id = parent_of.get(&cap.id).cloned();
            cap.children = children_of.get(&cap.id).cloned().unwrap_or_default();
            cap.tools
                .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.instance_id.cmp(&b.instance_id)));
        }

        // Nesting levels: leaves are 1, parents one above their deepest child,
        // a revisit along the recursion path counts as 1 so cycles terminate.
        let mut levels: HashMap<NodeId, u32> = HashMap::new();
        let mut path: HashSet<NodeId> = HashSet::new();
        let ids: Vec<NodeId> = capabilities.keys().cloned().collect();
        for id in &ids {
            level_of(id, &children_of, &mut levels, &mut path);
        }
        let max_level = levels.values().copied().max().unwrap_or(1).max(1);
        for cap in capabilities.values_mut() {
            cap.level = levels.get(&cap.id).copied().unwrap_or(1);
            cap.level_norm = f64::from(cap.level) / f64::from(max_level + 1);
        }

        let mut roots: Vec<NodeId> = capabilities
            .values()
            .filter(|cap| cap.parent_id.is_none())
            .map(|cap| cap.id.clone())
            .collect();
        roots.sort();

        let mut empty_capabilities: Vec<NodeId> = capabilities
            .values()
            .filter(|cap| cap.children.is_empty() && cap.tools.is_empty())
            .map(|cap| cap.id.clone())
            .collect();
        empty_capabilities.sort();

        let kept_tools: HashSet<&NodeId> = tool_parents.keys().collect();
        let capability_edges: Vec<Edge> = snapshot
            .edges
            .iter()
            .filter(|edge| {
                matches!(
                    edge.edge_type,
                    EdgeType::Sequence
                        | EdgeType::Dependency
                        | EdgeType::DependsOn
                        | EdgeType::CapabilityLink
                        | EdgeType::Hierarchy
                ) && capabilities.contains_key(&edge.source)
                    && capabilities.contains_key(&edge.target)
            })
            .cloned()
            .collect();
        let tool_edges: Vec<Edge> = snapshot
            .edges
            .iter()
            .filter(|edge| {
                edge.edge_type == EdgeType::Provides
                    && kept_tools.contains(&edge.source)
                    && kept_tools.contains(&edge.target)
            })
            .cloned()
            .collect();

        let stats = HierarchyStats {
            capability_count: capabilities.len(),
            tool_count: tool_parents.len(),
            tool_instance_count,
            orphan_tool_count: orphan_tools.len(),
            empty_capability_count: empty_capabilities.len(),
            dropped_edge_count: snapshot.dropped_edges,
            max_level,
        };
        tracing::debug!(
            capabilities = stats.capability_count,
            tools = stats.tool_count,
            instances = stats.tool_instance_count,
            orphans = stats.orphan_tool_count,
            max_level = stats.max_level,
            "rebuilt capability hierarchy"
        );

        Self {
            roots,
            capabilities,
            capability_edges,
            tool_edges,
            orphan_tools,
            empty_capabilities,
            stats,
            max_level,
        }
    }

    /// Ancestor chain starting at `id`, following parents upward. Stops when a
    /// parent repeats so containment cycles cannot loop.
    pub fn ancestor_chain(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = vec![id.clone()];
        let mut seen: HashSet<NodeId> = HashSet::new();
        seen.insert(id.clone());
        let mut cursor = id.clone();
        while let Some(parent) = self
            .capabilities
            .get(&cursor)
            .and_then(|cap| cap.parent_id.clone())
        {
            if !seen.insert(parent.clone()) {
                break;
            }
            chain.push(parent.clone());
            cursor = parent;
        }
        chain
    }

    /// Ancestor names joined root-first with `/`, ending at the capability
    /// itself.
    pub fn qualified_name(&self, id: &NodeId) -> String {
        let chain = self.ancestor_chain(id);
        let mut names: Vec<&str> = chain
            .iter()
            .filter_map(|ancestor| self.capabilities.get(ancestor).map(|cap| cap.name.as_str()))
            .collect();
        names.reverse();
        names.join("/")
    }
}

fn level_of(
    id: &NodeId,
    children_of: &HashMap<NodeId, Vec<NodeId>>,
    levels: &mut HashMap<NodeId, u32>,
    path: &mut HashSet<NodeId>,
) -> u32 {
    if let Some(level) = levels.get(id) {
        return *level;
    }
    if !path.insert(id.clone()) {
        return 1;
    }
    let level = match children_of.get(id) {
        Some(children) if !children.is_empty() => {
            1 + children
                .iter()
                .map(|child| level_of(child, children_of, levels, path))
                .max()
                .unwrap_or(0)
        }
        _ => 1,
    };
    path.remove(id);
    levels.insert(id.clone(), level);
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgraph_core::{RawEdge, RawNode, RawSnapshot};

    fn capability(id: &str, usage: f64) -> RawNode {
        RawNode {
            id: Some(id.to_string()),
            kind: Some("capability".to_string()),
            label: None,
            description: None,
            server: None,
            usage_count: Some(usage),
            success_rate: None,
            pagerank: None,
            last_used: None,
            community_id: None,
        }
    }

    fn tool(id: &str, server: &str) -> RawNode {
        RawNode {
            id: Some(id.to_string()),
            kind: Some("tool".to_string()),
            label: None,
            description: None,
            server: Some(server.to_string()),
            usage_count: None,
            success_rate: None,
            pagerank: None,
            last_used: None,
            community_id: None,
        }
    }

    fn edge(source: &str, target: &str, edge_type: &str) -> RawEdge {
        RawEdge {
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            edge_type: Some(edge_type.to_string()),
            weight: None,
            observed_count: None,
        }
    }

    fn snapshot(nodes: Vec<RawNode>, edges: Vec<RawEdge>) -> GraphSnapshot {
        GraphSnapshot::from_raw(RawSnapshot { nodes, edges }).expect("valid snapshot")
    }

    fn id(s: &str) -> NodeId {
        NodeId(s.to_string())
    }

    #[test]
    fn containment_assigns_parent_and_levels() {
        let snap = snapshot(
            vec![capability("cap1", 5.0), capability("cap2", 2.0)],
            vec![edge("cap1", "cap2", "contains")],
        );
        let hierarchy = Hierarchy::build(&snap);

        let cap1 = &hierarchy.capabilities[&id("cap1")];
        let cap2 = &hierarchy.capabilities[&id("cap2")];
        assert_eq!(cap1.parent_id, None);
        assert_eq!(cap2.parent_id, Some(id("cap1")));
        assert_eq!(cap1.level, 2);
        assert_eq!(cap2.level, 1);
        assert_eq!(hierarchy.roots, vec![id("cap1")]);
    }

    #[test]
    fn level_is_monotonic_along_containment() {
        let snap = snapshot(
            vec![
                capability("a", 1.0),
                capability("b", 1.0),
                capability("c", 1.0),
                capability("d", 1.0),
            ],
            vec![
                edge("a", "b", "contains"),
                edge("b", "c", "contains"),
                edge("a", "d", "contains"),
            ],
        );
        let hierarchy = Hierarchy::build(&snap);
        let level = |name: &str| hierarchy.capabilities[&id(name)].level;
        assert!(level("a") > level("b"));
        assert!(level("b") > level("c"));
        assert!(level("a") > level("d"));
        assert_eq!(hierarchy.max_level, 3);
    }

    #[test]
    fn containment_cycle_terminates_with_finite_levels() {
        let snap = snapshot(
            vec![capability("a", 1.0), capability("b", 1.0)],
            vec![edge("a", "b", "contains"), edge("b", "a", "contains")],
        );
        let hierarchy = Hierarchy::build(&snap);
        assert!(hierarchy.capabilities[&id("a")].level >= 1);
        assert!(hierarchy.capabilities[&id("b")].level >= 1);
        assert!(hierarchy.max_level >= 1);
    }

    #[test]
    fn first_contains_edge_wins_for_duplicate_parents() {
        let snap = snapshot(
            vec![
                capability("p1", 1.0),
                capability("p2", 1.0),
                capability("child", 1.0),
            ],
            vec![edge("p1", "child", "contains"), edge("p2", "child", "contains")],
        );
        let hierarchy = Hierarchy::build(&snap);
        assert_eq!(
            hierarchy.capabilities[&id("child")].parent_id,
            Some(id("p1"))
        );
        assert!(hierarchy.capabilities[&id("p2")].children.is_empty());
    }

    #[test]
    fn unused_capabilities_and_orphan_tools_are_classified_out() {
        let snap = snapshot(
            vec![
                capability("live", 3.0),
                capability("dead", 0.0),
                tool("used", "fs"),
                tool("never", "fs"),
            ],
            vec![edge("live", "used", "uses")],
        );
        let hierarchy = Hierarchy::build(&snap);
        assert!(hierarchy.capabilities.contains_key(&id("live")));
        assert!(!hierarchy.capabilities.contains_key(&id("dead")));
        assert_eq!(hierarchy.orphan_tools, vec![id("never")]);
        assert_eq!(hierarchy.stats.tool_count, 1);
    }

    #[test]
    fn fanned_out_tool_gets_one_instance_per_parent() {
        let snap = snapshot(
            vec![
                capability("cap_a", 1.0),
                capability("cap_b", 1.0),
                tool("shared", "fs"),
                tool("solo", "fs"),
            ],
            vec![
                edge("cap_a", "shared", "uses"),
                edge("cap_b", "shared", "uses"),
                edge("cap_a", "solo", "uses"),
            ],
        );
        let hierarchy = Hierarchy::build(&snap);

        let cap_a = &hierarchy.capabilities[&id("cap_a")];
        let cap_b = &hierarchy.capabilities[&id("cap_b")];
        let shared_a = cap_a
            .tools
            .iter()
            .find(|t| t.tool_id == id("shared"))
            .expect("instance in cap_a");
        let shared_b = cap_b
            .tools
            .iter()
            .find(|t| t.tool_id == id("shared"))
            .expect("instance in cap_b");
        assert_eq!(shared_a.instance_id, id("shared__cap_a"));
        assert_eq!(shared_b.instance_id, id("shared__cap_b"));

        let solo = cap_a
            .tools
            .iter()
            .find(|t| t.tool_id == id("solo"))
            .expect("solo instance");
        assert_eq!(solo.instance_id, id("solo"));
        assert_eq!(hierarchy.stats.tool_instance_count, 3);
    }

    #[test]
    fn empty_capability_is_a_level_one_leaf() {
        let snap = snapshot(vec![capability("bare", 1.0)], Vec::new());
        let hierarchy = Hierarchy::build(&snap);
        let bare = &hierarchy.capabilities[&id("bare")];
        assert_eq!(bare.level, 1);
        assert_eq!(hierarchy.empty_capabilities, vec![id("bare")]);
        assert_eq!(bare.level_norm, 0.5);
    }

    #[test]
    fn rebuild_is_structurally_identical() {
        let nodes = vec![
            capability("a", 2.0),
            capability("b", 1.0),
            capability("c", 1.0),
            tool("t1", "fs"),
            tool("t2", "web"),
        ];
        let edges = vec![
            edge("a", "b", "contains"),
            edge("a", "c", "contains"),
            edge("b", "t1", "uses"),
            edge("c", "t1", "uses"),
            edge("c", "t2", "uses"),
            edge("b", "c", "sequence"),
        ];
        let first = Hierarchy::build(&snapshot(nodes.clone(), edges.clone()));
        let second = Hierarchy::build(&snapshot(nodes, edges));

        assert_eq!(first.roots, second.roots);
        assert_eq!(first.capabilities, second.capabilities);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn relation_edges_split_by_endpoint_kind() {
        let snap = snapshot(
            vec![
                capability("a", 1.0),
                capability("b", 1.0),
                tool("t1", "fs"),
                tool("t2", "fs"),
            ],
            vec![
                edge("a", "t1", "uses"),
                edge("b", "t2", "uses"),
                edge("a", "b", "capability_link"),
                edge("a", "b", "dependency"),
                edge("t1", "t2", "provides"),
            ],
        );
        let hierarchy = Hierarchy::build(&snap);
        assert_eq!(hierarchy.capability_edges.len(), 2);
        assert_eq!(hierarchy.tool_edges.len(), 1);
        assert_eq!(hierarchy.tool_edges[0].edge_type, EdgeType::Provides);
    }

    #[test]
    fn qualified_name_walks_ancestors_root_first() {
        let snap = snapshot(
            vec![capability("outer", 1.0), capability("inner", 1.0)],
            vec![edge("outer", "inner", "contains")],
        );
        let hierarchy = Hierarchy::build(&snap);
        assert_eq!(hierarchy.qualified_name(&id("inner")), "outer/inner");
    }
}
