use crate::config::EngineConfig;
use crate::hierarchy::{CapabilityNode, Hierarchy};
use capgraph_core::NodeId;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyBucket {
    Today,
    ThisWeek,
    ThisMonth,
    Older,
}

impl RecencyBucket {
    pub const ORDER: [RecencyBucket; 4] = [
        RecencyBucket::Today,
        RecencyBucket::ThisWeek,
        RecencyBucket::ThisMonth,
        RecencyBucket::Older,
    ];

    /// Missing `last_used` counts as infinitely old.
    pub fn classify(last_used: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(ts) = last_used else {
            return RecencyBucket::Older;
        };
        let age = now.signed_duration_since(ts);
        if age < Duration::days(1) {
            RecencyBucket::Today
        } else if age < Duration::days(7) {
            RecencyBucket::ThisWeek
        } else if age < Duration::days(30) {
            RecencyBucket::ThisMonth
        } else {
            RecencyBucket::Older
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecencyBucket::Today => "Today",
            RecencyBucket::ThisWeek => "This week",
            RecencyBucket::ThisMonth => "This month",
            RecencyBucket::Older => "Older",
        }
    }

    fn index(self) -> usize {
        match self {
            RecencyBucket::Today => 0,
            RecencyBucket::ThisWeek => 1,
            RecencyBucket::ThisMonth => 2,
            RecencyBucket::Older => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSeparator {
    pub label: &'static str,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSlot {
    pub instance_id: NodeId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityCard {
    pub id: NodeId,
    pub bucket: RecencyBucket,
    pub column: usize,
    pub row: usize,
    pub x: f64,
    pub y: f64,
    pub tools: Vec<ToolSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineLayout {
    pub separators: Vec<BucketSeparator>,
    pub cards: Vec<CapabilityCard>,
    pub height: f64,
}

/// Lay capabilities out as recency-bucketed card rows. `now` is explicit so
/// the same inputs always produce the same positions.
pub fn layout_timeline(
    hierarchy: &Hierarchy,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
    container_width: f64,
) -> TimelineLayout {
    let columns = ((container_width / cfg.card_width).floor() as usize).max(1);

    let mut buckets: [Vec<&CapabilityNode>; 4] = Default::default();
    for cap in hierarchy.capabilities.values() {
        let bucket = RecencyBucket::classify(cap.last_used, now);
        buckets[bucket.index()].push(cap);
    }
    for bucket in &mut buckets {
        bucket.sort_by(|a, b| {
            Reverse(a.last_used)
                .cmp(&Reverse(b.last_used))
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    let mut layout = TimelineLayout::default();
    let mut y_cursor = 0.0;

    for bucket in RecencyBucket::ORDER {
        let members = &buckets[bucket.index()];
        if members.is_empty() {
            continue;
        }
        layout.separators.push(BucketSeparator {
            label: bucket.label(),
            y: y_cursor,
        });
        y_cursor += cfg.separator_height;

        for (index, cap) in members.iter().enumerate() {
            let column = index % columns;
            let row = index / columns;
            let x = column as f64 * cfg.card_width;
            let y = y_cursor + row as f64 * cfg.card_height;
            layout.cards.push(CapabilityCard {
                id: cap.id.clone(),
                bucket,
                column,
                row,
                x,
                y,
                tools: tool_slots(cap, cfg, x, y),
            });
        }

        let rows = members.len().div_ceil(columns);
        y_cursor += rows as f64 * cfg.card_height + cfg.bucket_gap;
    }

    layout.height = y_cursor;
    layout
}

/// Member tools sit in a small sqrt-sized sub-grid relative to the card
/// origin.
fn tool_slots(cap: &CapabilityNode, cfg: &EngineConfig, card_x: f64, card_y: f64) -> Vec<ToolSlot> {
    let count = cap.tools.len();
    if count == 0 {
        return Vec::new();
    }
    let sub_columns = (count as f64).sqrt().ceil() as usize;
    cap.tools
        .iter()
        .enumerate()
        .map(|(index, tool)| ToolSlot {
            instance_id: tool.instance_id.clone(),
            x: card_x + cfg.card_padding + (index % sub_columns) as f64 * cfg.tool_cell,
            y: card_y + cfg.card_padding + (index / sub_columns) as f64 * cfg.tool_cell,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgraph_core::{GraphSnapshot, RawEdge, RawNode, RawSnapshot};

    fn capability(id: &str, last_used: Option<&str>) -> RawNode {
        RawNode {
            id: Some(id.to_string()),
            kind: Some("capability".to_string()),
            label: None,
            description: None,
            server: None,
            usage_count: Some(1.0),
            success_rate: None,
            pagerank: None,
            last_used: last_used.map(str::to_string),
            community_id: None,
        }
    }

    fn tool(id: &str) -> RawNode {
        RawNode {
            id: Some(id.to_string()),
            kind: Some("tool".to_string()),
            label: None,
            description: None,
            server: None,
            usage_count: None,
            success_rate: None,
            pagerank: None,
            last_used: None,
            community_id: None,
        }
    }

    fn uses(source: &str, target: &str) -> RawEdge {
        RawEdge {
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            edge_type: Some("uses".to_string()),
            weight: None,
            observed_count: None,
        }
    }

    fn hierarchy(nodes: Vec<RawNode>, edges: Vec<RawEdge>) -> Hierarchy {
        let snap = GraphSnapshot::from_raw(RawSnapshot { nodes, edges }).expect("valid snapshot");
        Hierarchy::build(&snap)
    }

    fn now() -> DateTime<Utc> {
        "2024-03-10T12:00:00Z".parse().expect("timestamp")
    }

    #[test]
    fn fresh_capability_lands_in_today_at_origin() {
        let h = hierarchy(vec![capability("cap", Some("2024-03-10T12:00:00Z"))], vec![]);
        let layout = layout_timeline(&h, &EngineConfig::default(), now(), 800.0);

        assert_eq!(layout.separators.len(), 1);
        assert_eq!(layout.separators[0].label, "Today");
        let card = &layout.cards[0];
        assert_eq!(card.bucket, RecencyBucket::Today);
        assert_eq!((card.column, card.row), (0, 0));
        assert_eq!(card.x, 0.0);
    }

    #[test]
    fn missing_last_used_falls_into_oldest_bucket() {
        let h = hierarchy(vec![capability("cap", None)], vec![]);
        let layout = layout_timeline(&h, &EngineConfig::default(), now(), 800.0);
        assert_eq!(layout.cards[0].bucket, RecencyBucket::Older);
        assert_eq!(layout.separators[0].label, "Older");
    }

    #[test]
    fn bucket_thresholds_are_ordered() {
        assert_eq!(
            RecencyBucket::classify(Some("2024-03-10T02:00:00Z".parse().unwrap()), now()),
            RecencyBucket::Today
        );
        assert_eq!(
            RecencyBucket::classify(Some("2024-03-06T12:00:00Z".parse().unwrap()), now()),
            RecencyBucket::ThisWeek
        );
        assert_eq!(
            RecencyBucket::classify(Some("2024-02-20T12:00:00Z".parse().unwrap()), now()),
            RecencyBucket::ThisMonth
        );
        assert_eq!(
            RecencyBucket::classify(Some("2023-01-01T00:00:00Z".parse().unwrap()), now()),
            RecencyBucket::Older
        );
    }

    #[test]
    fn grid_wraps_at_container_width() {
        let nodes = vec![
            capability("a", Some("2024-03-10T10:00:00Z")),
            capability("b", Some("2024-03-10T09:00:00Z")),
            capability("c", Some("2024-03-10T08:00:00Z")),
        ];
        let cfg = EngineConfig::default();
        // room for exactly two cards per row
        let layout = layout_timeline(&hierarchy(nodes, vec![]), &cfg, now(), cfg.card_width * 2.5);

        let positions: Vec<(usize, usize)> = layout
            .cards
            .iter()
            .map(|card| (card.column, card.row))
            .collect();
        assert_eq!(positions, vec![(0, 0), (1, 0), (0, 1)]);
        assert_eq!(layout.cards[2].y, layout.cards[0].y + cfg.card_height);
    }

    #[test]
    fn most_recent_first_within_a_bucket() {
        let nodes = vec![
            capability("old", Some("2024-03-10T01:00:00Z")),
            capability("new", Some("2024-03-10T11:00:00Z")),
        ];
        let layout = layout_timeline(
            &hierarchy(nodes, vec![]),
            &EngineConfig::default(),
            now(),
            800.0,
        );
        assert_eq!(layout.cards[0].id.0, "new");
        assert_eq!(layout.cards[1].id.0, "old");
    }

    #[test]
    fn tool_slots_fill_a_sqrt_sub_grid() {
        let nodes = vec![
            capability("cap", Some("2024-03-10T12:00:00Z")),
            tool("t1"),
            tool("t2"),
            tool("t3"),
            tool("t4"),
            tool("t5"),
        ];
        let edges = vec![
            uses("cap", "t1"),
            uses("cap", "t2"),
            uses("cap", "t3"),
            uses("cap", "t4"),
            uses("cap", "t5"),
        ];
        let cfg = EngineConfig::default();
        let layout = layout_timeline(&hierarchy(nodes, edges), &cfg, now(), 800.0);

        let card = &layout.cards[0];
        assert_eq!(card.tools.len(), 5);
        // five tools wrap at ceil(sqrt(5)) = 3 columns
        assert_eq!(card.tools[3].x, card.x + cfg.card_padding);
        assert_eq!(card.tools[3].y, card.y + cfg.card_padding + cfg.tool_cell);
    }

    #[test]
    fn layout_is_idempotent() {
        let nodes = vec![
            capability("a", Some("2024-03-10T10:00:00Z")),
            capability("b", None),
            capability("c", Some("2024-02-01T00:00:00Z")),
        ];
        let h = hierarchy(nodes, vec![]);
        let cfg = EngineConfig::default();
        let first = layout_timeline(&h, &cfg, now(), 640.0);
        let second = layout_timeline(&h, &cfg, now(), 640.0);
        assert_eq!(first, second);
    }
}
