//! Renderer-independent transformation and layout engine for the
//! capability/tool hypergraph dashboard. Turns a flat node/edge snapshot into
//! a capability hierarchy, depth-bounded highlight neighborhoods, a recency
//! timeline, a radial bundled-edge layout, fuzzy search rankings, and cluster
//! hull overlays. The rendering side only reads the outputs.

pub mod config;
pub mod generation;
pub mod hierarchy;
pub mod hull;
pub mod neighborhood;
pub mod radial;
pub mod search;
pub mod timeline;

pub use config::EngineConfig;
pub use generation::Generation;
pub use hierarchy::Hierarchy;
pub use neighborhood::{AdjacencyMap, Neighborhood};
pub use radial::RadialLayout;
pub use search::{fuzzy_score, SearchHit};
pub use timeline::{RecencyBucket, TimelineLayout};
