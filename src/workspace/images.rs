use std::path::Path;
use walkdir::WalkDir;

/// Image extensions COLMAP can read out of the box
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Count image files below `dir`.
///
/// Informational only: an unreadable or missing directory counts as zero and
/// the feature extractor reports the real problem.
pub fn count_images(dir: &Path) -> usize {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    IMAGE_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .count()
}
