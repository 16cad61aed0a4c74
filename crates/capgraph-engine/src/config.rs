use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // timeline grid
    pub card_width: f64,
    pub card_height: f64,
    pub card_padding: f64,
    pub tool_cell: f64,
    pub separator_height: f64,
    pub bucket_gap: f64,

    // radial rings
    pub ring_margin: f64,
    pub capability_ring_ratio: f64,
    pub pad_angle: f64,
    pub server_gap_angle: f64,
    pub base_thickness: f64,
    pub pagerank_thickness_scale: f64,
    pub max_pagerank_thickness: f64,
    pub usage_thickness_scale: f64,
    pub max_usage_thickness: f64,
    pub default_tension: f64,

    // overlays and search
    pub hull_padding: f64,
    pub search_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            card_width: 180.0,
            card_height: 120.0,
            card_padding: 10.0,
            tool_cell: 24.0,
            separator_height: 28.0,
            bucket_gap: 24.0,
            ring_margin: 40.0,
            capability_ring_ratio: 0.62,
            pad_angle: 0.008,
            server_gap_angle: 0.06,
            base_thickness: 2.0,
            pagerank_thickness_scale: 60.0,
            max_pagerank_thickness: 10.0,
            usage_thickness_scale: 0.15,
            max_usage_thickness: 12.0,
            default_tension: 0.85,
            hull_padding: 24.0,
            search_limit: 30,
        }
    }
}

impl EngineConfig {
    /// Clamp out-of-range values back to usable ones instead of failing.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !(self.card_width > 1.0) {
            self.card_width = defaults.card_width;
        }
        if !(self.card_height > 1.0) {
            self.card_height = defaults.card_height;
        }
        if !(self.tool_cell > 1.0) {
            self.tool_cell = defaults.tool_cell;
        }
        if !(self.separator_height >= 0.0) {
            self.separator_height = defaults.separator_height;
        }
        if !(self.bucket_gap >= 0.0) {
            self.bucket_gap = defaults.bucket_gap;
        }
        if !(self.ring_margin >= 0.0) {
            self.ring_margin = defaults.ring_margin;
        }
        self.capability_ring_ratio = if self.capability_ring_ratio.is_finite() {
            self.capability_ring_ratio.clamp(0.1, 0.95)
        } else {
            defaults.capability_ring_ratio
        };
        if !(self.pad_angle >= 0.0) {
            self.pad_angle = defaults.pad_angle;
        }
        if !(self.server_gap_angle >= 0.0) {
            self.server_gap_angle = defaults.server_gap_angle;
        }
        self.default_tension = if self.default_tension.is_finite() {
            self.default_tension.clamp(0.0, 1.0)
        } else {
            defaults.default_tension
        };
        if !(self.hull_padding >= 0.0) {
            self.hull_padding = defaults.hull_padding;
        }
        self.search_limit = self.search_limit.max(1);
    }
}

fn config_file_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "capgraph")?;
    Some(proj.config_dir().join("engine.toml"))
}

pub fn load_or_default() -> EngineConfig {
    let Some(path) = config_file_path() else {
        return EngineConfig::default();
    };
    load_or_default_from_path(&path)
}

fn load_or_default_from_path(path: &Path) -> EngineConfig {
    let Ok(contents) = fs::read_to_string(path) else {
        return EngineConfig::default();
    };
    let mut cfg: EngineConfig = toml::from_str(&contents).unwrap_or_default();
    cfg.sanitize();
    cfg
}

pub fn save(cfg: &EngineConfig) -> anyhow::Result<()> {
    let Some(path) = config_file_path() else {
        return Err(anyhow::anyhow!("no config directory available"));
    };
    save_to_path(cfg, &path)
}

fn save_to_path(cfg: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(cfg).context("failed to serialize engine config")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write engine config {}", path.display()))?;
    Ok(())
}
