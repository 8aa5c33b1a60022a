//! Stage sequencing.
//!
//! A run is a fixed list of blocking calls, each gated on the previous one.
//! The first error ends the run; whatever earlier stages wrote stays on disk.
//! Progress is reported only between stages.

use chrono::{DateTime, Local, TimeDelta};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::candidates::{clear_models, select_candidate, ModelCandidate};
use super::controller::CancelToken;
use super::{ProgressReporter, Progress, Reconstructor, Stage};
use crate::config::ReconOptions;
use crate::error::{ReconError, Result};
use crate::geometry::{normals, ply};
use crate::workspace::database::DatabaseSummary;
use crate::workspace::images::count_images;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Stages 1-7: sparse and dense reconstruction
    FullPipeline,
    /// Mesh from an existing dense cloud
    MeshOnly,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::FullPipeline => f.write_str("full reconstruction"),
            RunKind::MeshOnly => f.write_str("meshing"),
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub kind: RunKind,
    pub workspace: Workspace,
    /// Model chosen after incremental mapping (full runs only)
    pub selected_model: Option<ModelCandidate>,
    /// Files written by the run, in the order they were produced
    pub artifacts: Vec<PathBuf>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl RunOutcome {
    pub fn elapsed(&self) -> TimeDelta {
        self.finished_at - self.started_at
    }

    /// One-line description for the status label
    pub fn summary(&self) -> String {
        let secs = self.elapsed().num_seconds().max(0);
        let files: Vec<String> = self
            .artifacts
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();

        format!(
            "Finished {} in {}m{:02}s at {}: {}",
            self.kind,
            secs / 60,
            secs % 60,
            self.finished_at.format("%H:%M"),
            files.join(", ")
        )
    }
}

/// Gates each stage on cancellation and reports it once it is done
struct StageSequence<'a, F: FnMut(Progress)> {
    reporter: &'a mut ProgressReporter<F>,
    cancel: &'a CancelToken,
}

impl<F: FnMut(Progress)> StageSequence<'_, F> {
    fn run<T>(&mut self, stage: Stage, call: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.cancel.is_cancelled() {
            warn!("⏹️  Run cancelled before {}", stage);
            return Err(ReconError::Cancelled(stage));
        }

        info!("▶️  {}...", stage);
        let started = Instant::now();
        let value = call().inspect_err(|e| error!("❌ {} failed: {}", stage, e))?;
        debug!("{} took {:.1?}", stage, started.elapsed());
        Ok(value)
    }

    fn complete(&mut self, stage: Stage, detail: Option<String>) {
        let label = match detail {
            Some(detail) => format!("{} ({})", stage.completed_label(), detail),
            None => stage.completed_label().to_string(),
        };
        self.reporter.report(stage.completed_percent(), label);
    }
}

/// Counts from the feature database, or `None` if it cannot be read
fn database_detail(database: &Path, after: Stage) -> Option<String> {
    match DatabaseSummary::read(database) {
        Ok(summary) if after == Stage::ExtractFeatures => Some(format!(
            "{} images, {} keypoints",
            summary.images, summary.keypoints
        )),
        Ok(summary) => Some(format!("{} verified pairs", summary.verified_pairs)),
        Err(e) => {
            warn!("⚠️  Could not summarize {}: {}", database.display(), e);
            None
        }
    }
}

/// Run extraction through fusion for one image set and workspace
pub fn run_full_pipeline<F: FnMut(Progress)>(
    backend: &dyn Reconstructor,
    images: &Path,
    workspace_root: &Path,
    options: &ReconOptions,
    reporter: &mut ProgressReporter<F>,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    let started_at = Local::now();
    let workspace = Workspace::setup(workspace_root)?;
    reporter.report(0, "Workspace ready");

    match count_images(images) {
        0 => warn!("⚠️  No images found in {}", images.display()),
        n => info!("🔍 Found {} images in {}", n, images.display()),
    }

    let mut seq = StageSequence { reporter, cancel };
    let database = workspace.database_path();
    let sparse_dir = workspace.sparse_dir();
    let dense_dir = workspace.dense_dir();
    let sparse_ply = workspace.sparse_ply();
    let dense_ply = workspace.dense_ply();

    seq.run(Stage::ExtractFeatures, || {
        backend.extract_features(&database, images)
    })?;
    seq.complete(
        Stage::ExtractFeatures,
        database_detail(&database, Stage::ExtractFeatures),
    );

    seq.run(Stage::MatchExhaustive, || backend.match_exhaustive(&database))?;
    seq.complete(
        Stage::MatchExhaustive,
        database_detail(&database, Stage::MatchExhaustive),
    );

    let model = seq.run(Stage::IncrementalMapping, || {
        // Only models from this mapping may be selected
        clear_models(&sparse_dir)?;
        backend.incremental_mapping(&database, images, &sparse_dir)?;
        select_candidate(&sparse_dir, options.candidate_policy)
    })?;
    seq.complete(
        Stage::IncrementalMapping,
        Some(format!(
            "model #{}, {} images",
            model.index, model.registered_images
        )),
    );

    seq.run(Stage::ExportSparse, || {
        backend.export_ply(&model.path, &sparse_ply)
    })?;
    seq.complete(Stage::ExportSparse, None);

    seq.run(Stage::UndistortImages, || {
        backend.undistort_images(images, &model.path, &dense_dir, options.max_image_size)
    })?;
    seq.complete(Stage::UndistortImages, None);

    seq.run(Stage::PatchMatchStereo, || {
        backend.patch_match_stereo(&dense_dir, options.max_image_size, options.cache_size)
    })?;
    seq.complete(Stage::PatchMatchStereo, None);

    seq.run(Stage::StereoFusion, || {
        backend.stereo_fusion(&dense_dir, &dense_ply)
    })?;
    seq.complete(Stage::StereoFusion, None);

    let outcome = RunOutcome {
        kind: RunKind::FullPipeline,
        workspace,
        selected_model: Some(model),
        artifacts: vec![sparse_ply, dense_ply],
        started_at,
        finished_at: Local::now(),
    };
    seq.reporter.report(100, outcome.summary());

    Ok(outcome)
}

/// Build `ply/mesh.ply` from an existing `ply/dense.ply`
pub fn run_mesh_stage<F: FnMut(Progress)>(
    backend: &dyn Reconstructor,
    workspace_root: &Path,
    options: &ReconOptions,
    reporter: &mut ProgressReporter<F>,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    let started_at = Local::now();
    let workspace = Workspace::setup(workspace_root)?;
    reporter.report(0, "Workspace ready");

    let mut seq = StageSequence { reporter, cancel };
    let dense_ply = workspace.dense_ply();
    let oriented = workspace.oriented_cloud_path();
    let poisson = workspace.poisson_mesh_path();
    let mesh_ply = workspace.mesh_ply();

    let point_count = seq.run(Stage::EstimateNormals, || {
        let mut cloud = ply::read_point_cloud(&dense_ply)?;
        if cloud.is_empty() {
            return Err(ReconError::Ply(format!(
                "{} contains no points",
                dense_ply.display()
            )));
        }

        if cloud.has_usable_normals() {
            info!("🧭 Dense cloud already carries normals, keeping them");
        } else {
            normals::estimate_normals(&mut cloud, options.normal_neighbors);
        }

        ply::write_point_cloud(&oriented, &cloud)?;
        Ok(cloud.len())
    })?;
    seq.complete(Stage::EstimateNormals, Some(format!("{} points", point_count)));

    seq.run(Stage::PoissonMeshing, || {
        backend.poisson_mesh(&oriented, &poisson, options.poisson_depth)
    })?;
    seq.complete(Stage::PoissonMeshing, None);

    let (vertex_count, face_count) = seq.run(Stage::RecomputeNormals, || {
        let mut mesh = ply::read_mesh(&poisson)?;
        if mesh.faces.is_empty() {
            return Err(ReconError::Ply(format!(
                "{} contains no faces",
                poisson.display()
            )));
        }

        normals::compute_vertex_normals(&mut mesh);
        ply::write_mesh(&mesh_ply, &mesh)?;
        Ok((mesh.num_vertices(), mesh.num_faces()))
    })?;
    seq.complete(
        Stage::RecomputeNormals,
        Some(format!("{} vertices, {} faces", vertex_count, face_count)),
    );

    Ok(RunOutcome {
        kind: RunKind::MeshOnly,
        workspace,
        selected_model: None,
        artifacts: vec![mesh_ply],
        started_at,
        finished_at: Local::now(),
    })
}
