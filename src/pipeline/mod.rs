/// Reconstruction pipeline
///
/// - `backend.rs` - the `Reconstructor` trait, one method per delegated call
/// - `colmap.rs` - `Reconstructor` backed by the COLMAP command-line tool
/// - `candidates.rs` - picking one model out of the mapper's output
/// - `runner.rs` - stage sequencing for full and mesh-only runs
/// - `progress.rs` - progress values and the monotonic reporter
/// - `controller.rs` - validation, workspace claim and the worker thread

pub mod backend;
pub mod candidates;
pub mod colmap;
pub mod controller;
#[cfg(test)]
pub(crate) mod fake;
pub mod progress;
pub mod runner;

use std::fmt;

pub use backend::Reconstructor;
pub use candidates::CandidatePolicy;
pub use colmap::ColmapCli;
pub use controller::{launch, CancelToken, RunEvent, RunRequest};
pub use progress::{Progress, ProgressReporter};
pub use runner::{RunKind, RunOutcome};

/// One step of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ExtractFeatures,
    MatchExhaustive,
    IncrementalMapping,
    ExportSparse,
    UndistortImages,
    PatchMatchStereo,
    StereoFusion,
    EstimateNormals,
    PoissonMeshing,
    RecomputeNormals,
}

#[cfg(test)]
impl Stage {
    /// Stages of a full run (sparse, then dense)
    pub const FULL_PIPELINE: [Stage; 7] = [
        Stage::ExtractFeatures,
        Stage::MatchExhaustive,
        Stage::IncrementalMapping,
        Stage::ExportSparse,
        Stage::UndistortImages,
        Stage::PatchMatchStereo,
        Stage::StereoFusion,
    ];

    /// Stages of a mesh-only run against an existing dense cloud
    pub const MESH: [Stage; 3] = [
        Stage::EstimateNormals,
        Stage::PoissonMeshing,
        Stage::RecomputeNormals,
    ];
}

impl Stage {
    /// Progress reported once this stage has completed
    pub fn completed_percent(self) -> u8 {
        match self {
            Stage::ExtractFeatures => 5,
            Stage::MatchExhaustive => 20,
            Stage::IncrementalMapping => 40,
            Stage::ExportSparse => 55,
            Stage::UndistortImages => 60,
            Stage::PatchMatchStereo => 75,
            Stage::StereoFusion => 90,
            Stage::EstimateNormals => 30,
            Stage::PoissonMeshing => 70,
            Stage::RecomputeNormals => 100,
        }
    }

    /// Label shown once this stage has completed
    pub fn completed_label(self) -> &'static str {
        match self {
            Stage::ExtractFeatures => "Features extracted",
            Stage::MatchExhaustive => "Images matched",
            Stage::IncrementalMapping => "Sparse model reconstructed",
            Stage::ExportSparse => "Sparse cloud exported",
            Stage::UndistortImages => "Images undistorted",
            Stage::PatchMatchStereo => "Depth maps computed",
            Stage::StereoFusion => "Dense cloud fused",
            Stage::EstimateNormals => "Normals estimated",
            Stage::PoissonMeshing => "Surface reconstructed",
            Stage::RecomputeNormals => "Mesh exported",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ExtractFeatures => "Feature extraction",
            Stage::MatchExhaustive => "Exhaustive matching",
            Stage::IncrementalMapping => "Incremental mapping",
            Stage::ExportSparse => "Sparse export",
            Stage::UndistortImages => "Image undistortion",
            Stage::PatchMatchStereo => "Patch-match stereo",
            Stage::StereoFusion => "Stereo fusion",
            Stage::EstimateNormals => "Normal estimation",
            Stage::PoissonMeshing => "Poisson meshing",
            Stage::RecomputeNormals => "Normal recomputation",
        };
        f.write_str(name)
    }
}
