use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::material::Color;
use crate::particles::FIREFLY_COUNT;

/// Dimensions of each lantern fire, in the fire's local units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireConfig {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub slice_spacing: f32,
    /// Uniform scale applied to the fire node.
    pub scale: f32,
    /// Height of the fire above its light stand's origin.
    pub vertical_offset: f32,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 2.0,
            depth: 1.0,
            slice_spacing: 0.5,
            scale: 0.1,
            vertical_offset: 0.11,
        }
    }
}

/// Runtime settings; any field missing from the JSON file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub asset_dir: PathBuf,
    pub model: PathBuf,
    pub baked_texture: PathBuf,
    pub portal_color_start: Color,
    pub portal_color_end: Color,
    pub clear_color: Color,
    pub fireflies_count: usize,
    pub fireflies_size: f32,
    pub fire: FireConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("static"),
            model: PathBuf::from("portal.model.xml"),
            baked_texture: PathBuf::from("BakedDark.jpg"),
            portal_color_start: Color::from_hex(0x000000),
            portal_color_end: Color::from_hex(0xb358fe),
            clear_color: Color::from_hex(0x0d0614),
            fireflies_count: FIREFLY_COUNT,
            fireflies_size: 90.0,
            fire: FireConfig::default(),
        }
    }
}

impl SceneConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn model_path(&self) -> PathBuf {
        self.asset_dir.join(&self.model)
    }

    pub fn texture_path(&self) -> PathBuf {
        self.asset_dir.join(&self.baked_texture)
    }
}
