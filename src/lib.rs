pub mod camera;
pub mod display;
pub mod input;
pub mod metadata;
pub mod paths;
pub mod pipeline;
pub mod preview;
pub mod supervisor;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_PREVIEW_WIDTH: u32 = 612;
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 512;

/// Rig configuration.
///
/// Loaded from a TOML file (path from `ARGUS_CONFIG`, default `argus.toml`)
/// with `ARGUS_*` environment overrides layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the persisted capture tree.
    pub output_directory: PathBuf,
    /// Render/poll rate; non-positive values fall back to the default.
    #[serde(default)]
    pub display_fps: f32,
    /// Start all cameras with one coordinated driver call.
    #[serde(default)]
    pub sync_capture: bool,
    /// Camera serials to initialize; empty means no cameras.
    #[serde(default)]
    pub pg_serial: Vec<u32>,
    #[serde(default = "default_preview_width")]
    pub preview_width: u32,
    #[serde(default = "default_preview_height")]
    pub preview_height: u32,
}

fn default_preview_width() -> u32 {
    DEFAULT_PREVIEW_WIDTH
}

fn default_preview_height() -> u32 {
    DEFAULT_PREVIEW_HEIGHT
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("ARGUS"))
            .build()?
            .try_deserialize()
    }
}
