//! Choosing among the models incremental mapping produced.
//!
//! The mapper writes each disconnected reconstruction into its own numbered
//! sub-directory of `sparse/` (`0`, `1`, ...).

use byteorder::{LittleEndian, ReadBytesExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{ReconError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Lowest-numbered model, whatever its size
    First,
    /// Model with the most registered images; ties keep the lowest index
    #[default]
    MostRegisteredImages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidate {
    pub index: usize,
    pub path: PathBuf,
    pub registered_images: u64,
}

/// List every model under `sparse_dir`, ordered by index
pub fn list_candidates(sparse_dir: &Path) -> Result<Vec<ModelCandidate>> {
    let mut candidates = Vec::new();

    for entry in fs::read_dir(sparse_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let Some(index) = entry.file_name().to_str().and_then(|n| n.parse().ok()) else {
            continue;
        };

        let path = entry.path();
        match registered_image_count(&path) {
            Ok(Some(registered_images)) => candidates.push(ModelCandidate {
                index,
                path,
                registered_images,
            }),
            Ok(None) => {}
            Err(e) => warn!("⚠️  Skipping unreadable model {}: {}", path.display(), e),
        }
    }

    candidates.sort_by_key(|c| c.index);
    Ok(candidates)
}

/// Remove the numbered model directories a previous mapping left behind.
///
/// Anything else under `sparse_dir` is kept. Returns how many were removed.
pub fn clear_models(sparse_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(sparse_dir)? {
        let entry = entry?;
        let numbered = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.parse::<usize>().is_ok());
        if numbered && entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!("🧹 Removed {} model(s) from an earlier mapping", removed);
    }
    Ok(removed)
}

/// Registered images in one model; `None` if the directory holds no model
fn registered_image_count(model_dir: &Path) -> io::Result<Option<u64>> {
    let binary = model_dir.join("images.bin");
    if binary.is_file() {
        // images.bin starts with the number of registered images
        let mut file = File::open(binary)?;
        return file.read_u64::<LittleEndian>().map(Some);
    }

    let text = model_dir.join("images.txt");
    if text.is_file() {
        // Two lines per image, the second (2D points) may be empty
        let mut lines = 0u64;
        for line in BufReader::new(File::open(text)?).lines() {
            if !line?.starts_with('#') {
                lines += 1;
            }
        }
        return Ok(Some(lines.div_ceil(2)));
    }

    Ok(None)
}

/// Apply `policy` to the models found in `sparse_dir`
pub fn select_candidate(sparse_dir: &Path, policy: CandidatePolicy) -> Result<ModelCandidate> {
    let candidates = list_candidates(sparse_dir)?;

    let selected = match policy {
        CandidatePolicy::First => candidates.first(),
        // max_by_key keeps the last maximum, so walk in reverse
        CandidatePolicy::MostRegisteredImages => {
            candidates.iter().rev().max_by_key(|c| c.registered_images)
        }
    }
    .cloned()
    .ok_or_else(|| ReconError::NoReconstruction(sparse_dir.to_path_buf()))?;

    if candidates.len() > 1 {
        info!(
            "🧩 Mapping produced {} models, using #{} ({} registered images, policy {:?})",
            candidates.len(),
            selected.index,
            selected.registered_images,
            policy
        );
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn write_binary_model(sparse: &Path, index: usize, registered: u64) {
        let dir = sparse.join(index.to_string());
        fs::create_dir_all(&dir).unwrap();
        let mut bytes = Vec::new();
        bytes.write_u64::<LittleEndian>(registered).unwrap();
        fs::write(dir.join("images.bin"), bytes).unwrap();
    }

    #[test]
    fn test_most_registered_wins() {
        let tmp = tempfile::tempdir().unwrap();
        write_binary_model(tmp.path(), 0, 4);
        write_binary_model(tmp.path(), 1, 12);
        write_binary_model(tmp.path(), 2, 7);

        let selected = select_candidate(tmp.path(), CandidatePolicy::MostRegisteredImages).unwrap();
        assert_eq!(selected.index, 1);
        assert_eq!(selected.registered_images, 12);
    }

    #[test]
    fn test_tie_keeps_lowest_index() {
        let tmp = tempfile::tempdir().unwrap();
        write_binary_model(tmp.path(), 0, 5);
        write_binary_model(tmp.path(), 1, 9);
        write_binary_model(tmp.path(), 2, 9);

        let selected = select_candidate(tmp.path(), CandidatePolicy::MostRegisteredImages).unwrap();
        assert_eq!(selected.index, 1);
    }

    #[test]
    fn test_first_policy_ignores_size() {
        let tmp = tempfile::tempdir().unwrap();
        write_binary_model(tmp.path(), 1, 30);
        write_binary_model(tmp.path(), 0, 2);

        let selected = select_candidate(tmp.path(), CandidatePolicy::First).unwrap();
        assert_eq!(selected.index, 0);
    }

    #[test]
    fn test_text_model_and_stray_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let text_model = tmp.path().join("0");
        fs::create_dir_all(&text_model).unwrap();
        fs::write(
            text_model.join("images.txt"),
            "# Image list with two lines of data per image:\n\
             1 1 0 0 0 0 0 0 1 a.jpg\n10 20 -1\n\
             2 1 0 0 0 0 0 0 1 b.jpg\n\n\
             3 1 0 0 0 0 0 0 1 c.jpg\n5 5 3\n",
        )
        .unwrap();
        fs::create_dir_all(tmp.path().join("notes")).unwrap();
        fs::create_dir_all(tmp.path().join("1")).unwrap();
        fs::write(tmp.path().join("project.ini"), "").unwrap();

        let candidates = list_candidates(tmp.path()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].registered_images, 3);
    }

    #[test]
    fn test_clear_models_keeps_other_entries() {
        let tmp = tempfile::tempdir().unwrap();
        write_binary_model(tmp.path(), 0, 4);
        write_binary_model(tmp.path(), 1, 12);
        fs::create_dir_all(tmp.path().join("notes")).unwrap();
        fs::write(tmp.path().join("7"), "").unwrap();

        assert_eq!(clear_models(tmp.path()).unwrap(), 2);

        assert!(list_candidates(tmp.path()).unwrap().is_empty());
        assert!(tmp.path().join("notes").is_dir());
        assert!(tmp.path().join("7").is_file());
    }

    #[test]
    fn test_empty_sparse_dir_has_no_reconstruction() {
        let tmp = tempfile::tempdir().unwrap();
        let err = select_candidate(tmp.path(), CandidatePolicy::default()).unwrap_err();
        assert!(matches!(err, ReconError::NoReconstruction(_)));
    }
}
