use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Tool {
        name: String,
        server: String,
        pagerank: f64,
        last_used: Option<DateTime<Utc>>,
        community_id: Option<i64>,
    },
    Capability {
        name: String,
        description: String,
        usage_count: f64,
        success_rate: f64,
        pagerank: f64,
        last_used: Option<DateTime<Utc>>,
        community_id: Option<i64>,
    },
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Tool { name, .. } | Node::Capability { name, .. } => name,
        }
    }

    pub fn pagerank(&self) -> f64 {
        match self {
            Node::Tool { pagerank, .. } | Node::Capability { pagerank, .. } => *pagerank,
        }
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Tool { last_used, .. } | Node::Capability { last_used, .. } => *last_used,
        }
    }

    pub fn community_id(&self) -> Option<i64> {
        match self {
            Node::Tool { community_id, .. } | Node::Capability { community_id, .. } => {
                *community_id
            }
        }
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, Node::Capability { .. })
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Node::Tool { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Contains,
    Sequence,
    Dependency,
    CapabilityLink,
    Uses,
    Provides,
    DependsOn,
    Hierarchy,
}

impl EdgeType {
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "contains" => Some(Self::Contains),
            "sequence" => Some(Self::Sequence),
            "dependency" => Some(Self::Dependency),
            "capability_link" | "capabilityLink" => Some(Self::CapabilityLink),
            "uses" => Some(Self::Uses),
            "provides" => Some(Self::Provides),
            "depends_on" | "dependsOn" => Some(Self::DependsOn),
            "hierarchy" => Some(Self::Hierarchy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Sequence => "sequence",
            Self::Dependency => "dependency",
            Self::CapabilityLink => "capability_link",
            Self::Uses => "uses",
            Self::Provides => "provides",
            Self::DependsOn => "depends_on",
            Self::Hierarchy => "hierarchy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: EdgeType,
    pub weight: Option<f64>,
    pub observed_count: Option<u64>,
}

// ----- Wire contract (snake_case payload as delivered by the data source) -----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub usage_count: Option<f64>,
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub pagerank: Option<f64>,
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub community_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEdge {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub edge_type: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub observed_count: Option<u64>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("node at index {index} is missing a non-empty id")]
    MissingNodeId { index: usize },
    #[error("node {id:?} has unknown type {kind:?} (expected \"capability\" or \"tool\")")]
    UnknownNodeType { id: String, kind: String },
    #[error("duplicate node id {id:?}")]
    DuplicateNodeId { id: String },
}

/// Validated snapshot in model form. Edges referencing unknown node ids or
/// carrying an unrecognized edge type are dropped here, not surfaced as errors;
/// `dropped_edges` keeps the count for stats.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    pub dropped_edges: usize,
}

impl GraphSnapshot {
    pub fn from_raw(raw: RawSnapshot) -> Result<Self, SnapshotError> {
        let mut nodes: HashMap<NodeId, Node> = HashMap::with_capacity(raw.nodes.len());

        for (index, raw_node) in raw.nodes.into_iter().enumerate() {
            let id = match raw_node.id {
                Some(id) if !id.trim().is_empty() => id,
                _ => return Err(SnapshotError::MissingNodeId { index }),
            };
            let name = raw_node.label.unwrap_or_else(|| id.clone());
            let last_used = raw_node.last_used.as_deref().and_then(parse_timestamp);

            let node = match raw_node.kind.as_deref() {
                Some("tool") => Node::Tool {
                    name,
                    server: raw_node.server.unwrap_or_else(|| "unknown".to_string()),
                    pagerank: raw_node.pagerank.unwrap_or(0.0),
                    last_used,
                    community_id: raw_node.community_id,
                },
                Some("capability") => Node::Capability {
                    name,
                    description: raw_node.description.unwrap_or_default(),
                    usage_count: raw_node.usage_count.unwrap_or(0.0),
                    success_rate: raw_node.success_rate.unwrap_or(0.0),
                    pagerank: raw_node.pagerank.unwrap_or(0.0),
                    last_used,
                    community_id: raw_node.community_id,
                },
                other => {
                    return Err(SnapshotError::UnknownNodeType {
                        id,
                        kind: other.unwrap_or_default().to_string(),
                    })
                }
            };

            if nodes.insert(NodeId(id.clone()), node).is_some() {
                return Err(SnapshotError::DuplicateNodeId { id });
            }
        }

        let mut edges = Vec::with_capacity(raw.edges.len());
        let mut dropped_edges = 0usize;
        for raw_edge in raw.edges {
            let (Some(source), Some(target)) = (raw_edge.source, raw_edge.target) else {
                dropped_edges += 1;
                continue;
            };
            let Some(edge_type) = raw_edge.edge_type.as_deref().and_then(EdgeType::parse) else {
                dropped_edges += 1;
                continue;
            };
            let source = NodeId(source);
            let target = NodeId(target);
            if !nodes.contains_key(&source) || !nodes.contains_key(&target) {
                dropped_edges += 1;
                continue;
            }
            edges.push(Edge {
                source,
                target,
                edge_type,
                weight: raw_edge.weight,
                observed_count: raw_edge.observed_count,
            });
        }

        Ok(Self {
            nodes,
            edges,
            dropped_edges,
        })
    }

    pub fn from_json(payload: &str) -> Result<Self, SnapshotJsonError> {
        let raw: RawSnapshot = serde_json::from_str(payload)?;
        Ok(Self::from_raw(raw)?)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotJsonError {
    #[error("snapshot payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Contract(#[from] SnapshotError),
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
