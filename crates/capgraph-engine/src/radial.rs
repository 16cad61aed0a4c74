use crate::config::EngineConfig;
use crate::hierarchy::Hierarchy;
use capgraph_core::{Edge, EdgeType, GraphSnapshot, Node, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::f64::consts::TAU;
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize)]
pub struct PositionedNode {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub radius: f64,
    pub arc_span: f64,
    pub thickness: f64,
    pub data: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundledPath {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    pub points: Vec<(f64, f64)>,
    pub path_d: String,
}

/// Tree-routed control scaffold for one edge. Blending it against the straight
/// source→target chord is all a tension change costs.
#[derive(Debug, Clone, Serialize)]
pub struct PathSpine {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RadialLayout {
    pub center: (f64, f64),
    pub capabilities: Vec<PositionedNode>,
    pub tools: Vec<PositionedNode>,
    pub paths: Vec<BundledPath>,
    pub spines: Vec<PathSpine>,
}

impl RadialLayout {
    /// Place capabilities and tools on two concentric rings and bundle the
    /// relation edges through the containment tree. Pure function of its
    /// inputs; identical inputs give bit-identical output.
    pub fn build(
        snapshot: &GraphSnapshot,
        hierarchy: &Hierarchy,
        cfg: &EngineConfig,
        tension: f64,
        width: f64,
        height: f64,
    ) -> Self {
        let center = (width / 2.0, height / 2.0);
        let outer_radius = (width.min(height) / 2.0 - cfg.ring_margin).max(1.0);
        let capability_radius = outer_radius * cfg.capability_ring_ratio;

        let tools = place_tools(snapshot, hierarchy, cfg, center, outer_radius);
        let capabilities = place_capabilities(snapshot, hierarchy, cfg, center, capability_radius);

        let capability_pos: HashMap<NodeId, (f64, f64)> = capabilities
            .iter()
            .map(|node| (node.id.clone(), (node.x, node.y)))
            .collect();
        let tool_pos: HashMap<NodeId, (f64, f64)> = tools
            .iter()
            .map(|node| (node.id.clone(), (node.x, node.y)))
            .collect();

        let mut spines = Vec::new();
        for edge in &hierarchy.capability_edges {
            if let Some(points) =
                capability_spine(hierarchy, &capability_pos, center, &edge.source, &edge.target)
            {
                spines.push(PathSpine {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    edge_type: edge.edge_type,
                    points,
                });
            }
        }
        let primary_parent = primary_parents(hierarchy);
        for edge in &hierarchy.tool_edges {
            if let Some(points) = tool_spine(
                hierarchy,
                &capability_pos,
                &tool_pos,
                &primary_parent,
                center,
                edge,
            ) {
                spines.push(PathSpine {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    edge_type: edge.edge_type,
                    points,
                });
            }
        }

        let paths = bundle_all(&spines, tension);
        Self {
            center,
            capabilities,
            tools,
            paths,
            spines,
        }
    }

    /// Recompute only the bundled paths for a new tension. Node positions are
    /// untouched, so callers can re-render edges without a full layout pass.
    pub fn rebundle(&self, tension: f64) -> Vec<BundledPath> {
        bundle_all(&self.spines, tension)
    }
}

fn thickness_for(node: &Node, cfg: &EngineConfig) -> f64 {
    match node {
        Node::Tool { pagerank, .. } => {
            cfg.base_thickness
                + (pagerank.max(0.0) * cfg.pagerank_thickness_scale).min(cfg.max_pagerank_thickness)
        }
        Node::Capability {
            pagerank,
            usage_count,
            ..
        } => {
            cfg.base_thickness
                + (pagerank.max(0.0) * cfg.pagerank_thickness_scale).min(cfg.max_pagerank_thickness)
                + (usage_count.max(0.0) * cfg.usage_thickness_scale).min(cfg.max_usage_thickness)
        }
    }
}

fn positioned(
    id: NodeId,
    node: &Node,
    cfg: &EngineConfig,
    center: (f64, f64),
    radius: f64,
    angle: f64,
    arc_span: f64,
) -> PositionedNode {
    PositionedNode {
        x: center.0 + radius * angle.cos(),
        y: center.1 + radius * angle.sin(),
        angle,
        radius,
        arc_span,
        thickness: thickness_for(node, cfg),
        data: node.clone(),
        id,
    }
}

/// Outer ring: tools grouped by server (alphabetical), name-sorted within a
/// group, with an extra gap between server groups.
fn place_tools(
    snapshot: &GraphSnapshot,
    hierarchy: &Hierarchy,
    cfg: &EngineConfig,
    center: (f64, f64),
    radius: f64,
) -> Vec<PositionedNode> {
    let mut seen: HashSet<&NodeId> = HashSet::new();
    let mut groups: BTreeMap<&str, Vec<(&str, &NodeId)>> = BTreeMap::new();
    for cap in hierarchy.capabilities.values() {
        for tool in &cap.tools {
            if seen.insert(&tool.tool_id) {
                groups
                    .entry(tool.server.as_str())
                    .or_default()
                    .push((tool.name.as_str(), &tool.tool_id));
            }
        }
    }
    for members in groups.values_mut() {
        members.sort();
    }

    let total: usize = groups.values().map(Vec::len).sum();
    if total == 0 {
        return Vec::new();
    }
    let group_count = groups.len();
    let gap = if group_count > 1 {
        cfg.server_gap_angle.min(TAU / (2.0 * group_count as f64))
    } else {
        0.0
    };
    let segment = (TAU - gap * group_count as f64) / total as f64;
    let arc_span = (segment - cfg.pad_angle).max(0.0);

    let mut out = Vec::with_capacity(total);
    let mut cursor = 0.0f64;
    for members in groups.values() {
        for (_, tool_id) in members {
            let angle = cursor + segment / 2.0;
            if let Some(node) = snapshot.nodes.get(tool_id) {
                out.push(positioned(
                    (*tool_id).clone(),
                    node,
                    cfg,
                    center,
                    radius,
                    angle,
                    arc_span,
                ));
            }
            cursor += segment;
        }
        cursor += gap;
    }
    out
}

/// Inner ring: capabilities in depth-first tree order so siblings stay
/// adjacent. Capabilities detached from the roots by a containment cycle are
/// appended in id order.
fn capability_order(hierarchy: &Hierarchy) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(hierarchy.capabilities.len());
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = Vec::new();
    for root in hierarchy.roots.iter().rev() {
        stack.push(root.clone());
    }
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(cap) = hierarchy.capabilities.get(&id) {
            for child in cap.children.iter().rev() {
                stack.push(child.clone());
            }
        }
        order.push(id);
    }
    for id in hierarchy.capabilities.keys() {
        if !seen.contains(id) {
            order.push(id.clone());
        }
    }
    order
}

fn place_capabilities(
    snapshot: &GraphSnapshot,
    hierarchy: &Hierarchy,
    cfg: &EngineConfig,
    center: (f64, f64),
    radius: f64,
) -> Vec<PositionedNode> {
    let order = capability_order(hierarchy);
    if order.is_empty() {
        return Vec::new();
    }
    let segment = TAU / order.len() as f64;
    let arc_span = (segment - cfg.pad_angle).max(0.0);

    order
        .iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let node = snapshot.nodes.get(id)?;
            let angle = index as f64 * segment + segment / 2.0;
            Some(positioned(
                id.clone(),
                node,
                cfg,
                center,
                radius,
                angle,
                arc_span,
            ))
        })
        .collect()
}

/// Control points for a capability edge: up the ancestor chain to the lowest
/// common ancestor and down to the target. Pairs in different trees route
/// through the center.
fn capability_spine(
    hierarchy: &Hierarchy,
    capability_pos: &HashMap<NodeId, (f64, f64)>,
    center: (f64, f64),
    source: &NodeId,
    target: &NodeId,
) -> Option<Vec<(f64, f64)>> {
    if source == target {
        return None;
    }
    capability_pos.get(source)?;
    capability_pos.get(target)?;

    let up = hierarchy.ancestor_chain(source);
    let down = hierarchy.ancestor_chain(target);
    let down_index: HashMap<&NodeId, usize> =
        down.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut met = None;
    for id in &up {
        points.push(*capability_pos.get(id)?);
        if let Some(&j) = down_index.get(id) {
            met = Some(j);
            break;
        }
    }
    match met {
        Some(j) => {
            for id in down[..j].iter().rev() {
                points.push(*capability_pos.get(id)?);
            }
        }
        None => {
            points.push(center);
            for id in down.iter().rev() {
                points.push(*capability_pos.get(id)?);
            }
        }
    }
    dedup_consecutive(&mut points);
    Some(points)
}

/// Deterministic parent pick for routing a tool edge: the smallest capability
/// id among the tool's parents.
fn primary_parents(hierarchy: &Hierarchy) -> HashMap<NodeId, NodeId> {
    let mut primary: HashMap<NodeId, NodeId> = HashMap::new();
    for cap in hierarchy.capabilities.values() {
        for tool in &cap.tools {
            primary
                .entry(tool.tool_id.clone())
                .or_insert_with(|| cap.id.clone());
        }
    }
    primary
}

fn tool_spine(
    hierarchy: &Hierarchy,
    capability_pos: &HashMap<NodeId, (f64, f64)>,
    tool_pos: &HashMap<NodeId, (f64, f64)>,
    primary_parent: &HashMap<NodeId, NodeId>,
    center: (f64, f64),
    edge: &Edge,
) -> Option<Vec<(f64, f64)>> {
    if edge.source == edge.target {
        return None;
    }
    let source_pos = *tool_pos.get(&edge.source)?;
    let target_pos = *tool_pos.get(&edge.target)?;
    let source_parent = primary_parent.get(&edge.source)?;
    let target_parent = primary_parent.get(&edge.target)?;

    let mut points = vec![source_pos];
    if source_parent == target_parent {
        points.push(*capability_pos.get(source_parent)?);
    } else {
        let via = capability_spine(
            hierarchy,
            capability_pos,
            center,
            source_parent,
            target_parent,
        )?;
        points.extend(via);
    }
    points.push(target_pos);
    dedup_consecutive(&mut points);
    Some(points)
}

fn dedup_consecutive(points: &mut Vec<(f64, f64)>) {
    points.dedup_by(|a, b| (a.0 - b.0).abs() < f64::EPSILON && (a.1 - b.1).abs() < f64::EPSILON);
}

fn bundle_all(spines: &[PathSpine], tension: f64) -> Vec<BundledPath> {
    let tension = tension.clamp(0.0, 1.0);
    spines.iter().map(|spine| bundle(spine, tension)).collect()
}

/// Blend the spine against the straight source→target chord. Tension 1 hugs
/// the tree route, tension 0 is the direct line.
fn bundle(spine: &PathSpine, tension: f64) -> BundledPath {
    let n = spine.points.len();
    let first = spine.points[0];
    let last = spine.points[n - 1];
    let points: Vec<(f64, f64)> = spine
        .points
        .iter()
        .enumerate()
        .map(|(i, &(px, py))| {
            let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
            let lx = first.0 + (last.0 - first.0) * t;
            let ly = first.1 + (last.1 - first.1) * t;
            (
                tension * px + (1.0 - tension) * lx,
                tension * py + (1.0 - tension) * ly,
            )
        })
        .collect();
    let path_d = smooth_path_d(&points);
    BundledPath {
        id: format!(
            "{}:{}:{}",
            spine.edge_type.as_str(),
            spine.source.0,
            spine.target.0
        ),
        source: spine.source.clone(),
        target: spine.target.clone(),
        edge_type: spine.edge_type,
        points,
        path_d,
    }
}

/// Open quadratic curve through the control chain, two-decimal fixed
/// formatting so identical geometry yields identical strings.
fn smooth_path_d(points: &[(f64, f64)]) -> String {
    let mut d = String::new();
    match points {
        [] => {}
        [only] => {
            let _ = write!(d, "M{:.2},{:.2}", only.0, only.1);
        }
        [a, b] => {
            let _ = write!(d, "M{:.2},{:.2} L{:.2},{:.2}", a.0, a.1, b.0, b.1);
        }
        _ => {
            let _ = write!(d, "M{:.2},{:.2}", points[0].0, points[0].1);
            for i in 1..points.len() - 1 {
                let ctrl = points[i];
                let end = if i == points.len() - 2 {
                    points[i + 1]
                } else {
                    midpoint(points[i], points[i + 1])
                };
                let _ = write!(d, " Q{:.2},{:.2} {:.2},{:.2}", ctrl.0, ctrl.1, end.0, end.1);
            }
        }
    }
    d
}

fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}
