//! Configuration for reconstruction runs
//!
//! Two layers:
//! - `Settings` - the small JSON file remembering what the operator picked
//!   last time and where COLMAP lives
//! - `ReconOptions` - what a run actually consumes: the settings plus the
//!   fixed stage constants below

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pipeline::CandidatePolicy;

/// Longest side of undistorted images, also the patch-match limit
pub const MAX_IMAGE_SIZE: u32 = 1500;

/// Patch-match working-set cache size
pub const PATCH_MATCH_CACHE_SIZE: u32 = 48;

/// Octree depth for Poisson surface fitting
pub const POISSON_DEPTH: u32 = 9;

/// Neighbourhood size for normal estimation before meshing
pub const NORMAL_NEIGHBORS: usize = 16;

/// Overrides `colmap_binary` when set
pub const COLMAP_ENV_VAR: &str = "RECON_STUDIO_COLMAP";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// COLMAP executable, resolved through PATH when not absolute
    pub colmap_binary: PathBuf,
    /// Use GPU SIFT extraction and matching
    pub use_gpu: bool,
    pub candidate_policy: CandidatePolicy,
    pub last_images_dir: Option<PathBuf>,
    pub last_workspace_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            colmap_binary: PathBuf::from("colmap"),
            use_gpu: true,
            candidate_policy: CandidatePolicy::default(),
            last_images_dir: None,
            last_workspace_dir: None,
        }
    }
}

impl Settings {
    /// Location of the settings file:
    /// - Linux: ~/.config/recon-studio/settings.json
    /// - macOS: ~/Library/Application Support/recon-studio/settings.json
    /// - Windows: %APPDATA%\recon-studio\settings.json
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("recon-studio");
        path.push("settings.json");
        Some(path)
    }

    /// Load from the default location, falling back to defaults on any problem
    pub fn load() -> Self {
        let settings = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("⚠️  Ignoring unreadable settings {}: {}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        };
        settings.with_env_overrides()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self) -> Result<()> {
        match Self::default_path() {
            Some(path) => self.save_to(&path),
            None => {
                warn!("⚠️  No config directory, settings not saved");
                Ok(())
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 Settings saved to {}", path.display());
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(binary) = std::env::var_os(COLMAP_ENV_VAR) {
            self.colmap_binary = PathBuf::from(binary);
        }
        self
    }
}

/// Everything a run needs besides its two directories
#[derive(Debug, Clone, PartialEq)]
pub struct ReconOptions {
    pub colmap_binary: PathBuf,
    pub use_gpu: bool,
    pub candidate_policy: CandidatePolicy,
    pub max_image_size: u32,
    pub cache_size: u32,
    pub poisson_depth: u32,
    pub normal_neighbors: usize,
}

impl Default for ReconOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ReconOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            colmap_binary: settings.colmap_binary.clone(),
            use_gpu: settings.use_gpu,
            candidate_policy: settings.candidate_policy,
            max_image_size: MAX_IMAGE_SIZE,
            cache_size: PATCH_MATCH_CACHE_SIZE,
            poisson_depth: POISSON_DEPTH,
            normal_neighbors: NORMAL_NEIGHBORS,
        }
    }
}
