//! `Reconstructor` backed by the COLMAP command-line tool.
//!
//! Each stage is one `colmap <command>` invocation. stdout is discarded,
//! stderr is kept so a failure can show the tail of COLMAP's own message.

use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use super::{Reconstructor, Stage};
use crate::config::ReconOptions;
use crate::error::{ReconError, Result};

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct ColmapCli {
    binary: PathBuf,
    use_gpu: bool,
}

impl ColmapCli {
    pub fn new(binary: impl Into<PathBuf>, use_gpu: bool) -> Self {
        Self {
            binary: binary.into(),
            use_gpu,
        }
    }

    pub fn from_options(options: &ReconOptions) -> Self {
        Self::new(&options.colmap_binary, options.use_gpu)
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcommand);
        cmd
    }

    fn gpu_flag(&self) -> &'static str {
        if self.use_gpu {
            "1"
        } else {
            "0"
        }
    }

    fn feature_extractor(&self, database: &Path, images: &Path) -> Command {
        let mut cmd = self.command("feature_extractor");
        cmd.arg("--database_path")
            .arg(database)
            .arg("--image_path")
            .arg(images)
            .args(["--SiftExtraction.use_gpu", self.gpu_flag()]);
        cmd
    }

    fn exhaustive_matcher(&self, database: &Path) -> Command {
        let mut cmd = self.command("exhaustive_matcher");
        cmd.arg("--database_path")
            .arg(database)
            .args(["--SiftMatching.use_gpu", self.gpu_flag()]);
        cmd
    }

    fn mapper(&self, database: &Path, images: &Path, sparse_dir: &Path) -> Command {
        let mut cmd = self.command("mapper");
        cmd.arg("--database_path")
            .arg(database)
            .arg("--image_path")
            .arg(images)
            .arg("--output_path")
            .arg(sparse_dir);
        cmd
    }

    fn model_converter(&self, model_dir: &Path, output: &Path) -> Command {
        let mut cmd = self.command("model_converter");
        cmd.arg("--input_path")
            .arg(model_dir)
            .arg("--output_path")
            .arg(output)
            .args(["--output_type", "PLY"]);
        cmd
    }

    fn image_undistorter(
        &self,
        images: &Path,
        model_dir: &Path,
        dense_dir: &Path,
        max_image_size: u32,
    ) -> Command {
        let mut cmd = self.command("image_undistorter");
        cmd.arg("--image_path")
            .arg(images)
            .arg("--input_path")
            .arg(model_dir)
            .arg("--output_path")
            .arg(dense_dir)
            .args(["--output_type", "COLMAP"])
            .arg("--max_image_size")
            .arg(max_image_size.to_string());
        cmd
    }

    fn patch_match(&self, dense_dir: &Path, max_image_size: u32, cache_size: u32) -> Command {
        let mut cmd = self.command("patch_match_stereo");
        cmd.arg("--workspace_path")
            .arg(dense_dir)
            .args(["--workspace_format", "COLMAP"])
            .args(["--PatchMatchStereo.geom_consistency", "true"])
            .arg("--PatchMatchStereo.max_image_size")
            .arg(max_image_size.to_string())
            .arg("--PatchMatchStereo.cache_size")
            .arg(cache_size.to_string());
        cmd
    }

    fn fusion(&self, dense_dir: &Path, output: &Path) -> Command {
        let mut cmd = self.command("stereo_fusion");
        cmd.arg("--workspace_path")
            .arg(dense_dir)
            .args(["--workspace_format", "COLMAP"])
            .args(["--input_type", "geometric"])
            .arg("--output_path")
            .arg(output);
        cmd
    }

    fn poisson_mesher(&self, input: &Path, output: &Path, depth: u32) -> Command {
        let mut cmd = self.command("poisson_mesher");
        cmd.arg("--input_path")
            .arg(input)
            .arg("--output_path")
            .arg(output)
            .arg("--PoissonMeshing.depth")
            .arg(depth.to_string());
        cmd
    }

    /// Run to completion, mapping spawn failures and non-zero exits to errors
    fn execute(&self, stage: Stage, mut cmd: Command) -> Result<()> {
        debug!("🛠️  {:?}", cmd);
        let started = Instant::now();

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ReconError::ToolLaunch {
                tool: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ReconError::StageFailed {
                stage,
                status: output.status.to_string(),
                stderr_tail: stderr_tail(&output.stderr, STDERR_TAIL_LINES),
            });
        }

        info!("✅ {} finished in {:.1?}", stage, started.elapsed());
        Ok(())
    }
}

/// Last `lines` non-empty lines of a process' stderr
fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    kept[kept.len().saturating_sub(lines)..].join("\n")
}

impl Reconstructor for ColmapCli {
    fn extract_features(&self, database: &Path, images: &Path) -> Result<()> {
        self.execute(Stage::ExtractFeatures, self.feature_extractor(database, images))
    }

    fn match_exhaustive(&self, database: &Path) -> Result<()> {
        self.execute(Stage::MatchExhaustive, self.exhaustive_matcher(database))
    }

    fn incremental_mapping(&self, database: &Path, images: &Path, sparse_dir: &Path) -> Result<()> {
        self.execute(
            Stage::IncrementalMapping,
            self.mapper(database, images, sparse_dir),
        )
    }

    fn export_ply(&self, model_dir: &Path, output: &Path) -> Result<()> {
        self.execute(Stage::ExportSparse, self.model_converter(model_dir, output))
    }

    fn undistort_images(
        &self,
        images: &Path,
        model_dir: &Path,
        dense_dir: &Path,
        max_image_size: u32,
    ) -> Result<()> {
        self.execute(
            Stage::UndistortImages,
            self.image_undistorter(images, model_dir, dense_dir, max_image_size),
        )
    }

    fn patch_match_stereo(&self, dense_dir: &Path, max_image_size: u32, cache_size: u32) -> Result<()> {
        self.execute(
            Stage::PatchMatchStereo,
            self.patch_match(dense_dir, max_image_size, cache_size),
        )
    }

    fn stereo_fusion(&self, dense_dir: &Path, output: &Path) -> Result<()> {
        self.execute(Stage::StereoFusion, self.fusion(dense_dir, output))
    }

    fn poisson_mesh(&self, input: &Path, output: &Path, depth: u32) -> Result<()> {
        self.execute(Stage::PoissonMeshing, self.poisson_mesher(input, output, depth))
    }
}
