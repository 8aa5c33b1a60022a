use std::path::Path;

use crate::error::Result;

/// The external photogrammetry library, one blocking call per stage.
///
/// Every method runs to completion or returns the library's error; none of
/// them can be interrupted. Outputs land at the paths given, which is how
/// stages hand data to each other.
pub trait Reconstructor: Send + Sync {
    /// Detect features in every image of `images` into `database`
    fn extract_features(&self, database: &Path, images: &Path) -> Result<()>;

    /// Match features between every image pair
    fn match_exhaustive(&self, database: &Path) -> Result<()>;

    /// Estimate poses and structure, one numbered model per component under `sparse_dir`
    fn incremental_mapping(&self, database: &Path, images: &Path, sparse_dir: &Path) -> Result<()>;

    /// Write the points of `model_dir` as a PLY cloud
    fn export_ply(&self, model_dir: &Path, output: &Path) -> Result<()>;

    /// Undistort `images` with the cameras of `model_dir` into the dense workspace
    fn undistort_images(
        &self,
        images: &Path,
        model_dir: &Path,
        dense_dir: &Path,
        max_image_size: u32,
    ) -> Result<()>;

    /// Compute per-image depth and normal maps inside the dense workspace
    fn patch_match_stereo(&self, dense_dir: &Path, max_image_size: u32, cache_size: u32) -> Result<()>;

    /// Fuse the depth maps into a single cloud
    fn stereo_fusion(&self, dense_dir: &Path, output: &Path) -> Result<()>;

    /// Fit a Poisson surface to an oriented cloud
    fn poisson_mesh(&self, input: &Path, output: &Path, depth: u32) -> Result<()>;
}
