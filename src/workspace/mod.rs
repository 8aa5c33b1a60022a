/// Workspace management module
///
/// A workspace is the directory tree every stage reads from and writes to:
/// - `database.db` - COLMAP feature/match database (database.rs reads it)
/// - `sparse/` - sparse models, one numbered sub-directory per candidate
/// - `dense/` - undistorted images, depth/normal maps, meshing intermediates
/// - `ply/` - exported clouds and the final mesh
///
/// Exclusive access per root is handled by guard.rs.

pub mod database;
pub mod guard;
pub mod images;

use std::fs;
use std::path::PathBuf;

use log::info;

use crate::error::{ReconError, Result};

pub use guard::WorkspaceGuard;

/// Resolved paths of one workspace root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wrap a root without touching the filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and its `sparse`, `dense` and `ply` directories.
    ///
    /// Safe to call on an existing workspace: nothing is removed or rewritten.
    pub fn setup(root: impl Into<PathBuf>) -> Result<Self> {
        let workspace = Self::new(root);

        for dir in [
            workspace.root.clone(),
            workspace.sparse_dir(),
            workspace.dense_dir(),
            workspace.ply_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| ReconError::Workspace {
                path: dir.clone(),
                source,
            })?;
        }

        info!("📁 Workspace ready at {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("database.db")
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.root.join("sparse")
    }

    pub fn dense_dir(&self) -> PathBuf {
        self.root.join("dense")
    }

    pub fn ply_dir(&self) -> PathBuf {
        self.root.join("ply")
    }

    pub fn sparse_ply(&self) -> PathBuf {
        self.ply_dir().join("sparse.ply")
    }

    pub fn dense_ply(&self) -> PathBuf {
        self.ply_dir().join("dense.ply")
    }

    pub fn mesh_ply(&self) -> PathBuf {
        self.ply_dir().join("mesh.ply")
    }

    /// Dense cloud with guaranteed normals, input of the Poisson mesher
    pub fn oriented_cloud_path(&self) -> PathBuf {
        self.dense_dir().join("oriented.ply")
    }

    /// Raw Poisson output before normals are recomputed
    pub fn poisson_mesh_path(&self) -> PathBuf {
        self.dense_dir().join("poisson.ply")
    }
}
