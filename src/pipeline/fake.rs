//! In-process stand-in for COLMAP used by the pipeline tests.
//!
//! Writes small placeholder outputs at the same paths the real tool would,
//! records which stages ran and can be told to fail at one of them.

use byteorder::{LittleEndian, WriteBytesExt};
use nalgebra::{Point3, Vector3};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Reconstructor, Stage};
use crate::error::{ReconError, Result};
use crate::geometry::{ply, PointCloud, TriangleMesh};

pub(crate) struct FakeReconstructor {
    fail_at: Option<Stage>,
    /// Registered-image count of each model the mapper "finds"
    models: Vec<u64>,
    calls: Mutex<Vec<Stage>>,
    undistorted_from: Mutex<Option<PathBuf>>,
}

impl FakeReconstructor {
    pub const DATABASE_AFTER_MATCHING: &'static [u8] = b"features;matches";

    pub fn new() -> Self {
        Self {
            fail_at: None,
            models: vec![2],
            calls: Mutex::new(Vec::new()),
            undistorted_from: Mutex::new(None),
        }
    }

    pub fn failing_at(mut self, stage: Stage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    pub fn with_models(mut self, models: Vec<u64>) -> Self {
        self.models = models;
        self
    }

    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    /// Model directory the undistortion stage was pointed at
    pub fn undistorted_from(&self) -> Option<PathBuf> {
        self.undistorted_from.lock().unwrap().clone()
    }

    /// A 6x6 grid on the z = 0 plane, optionally with normals
    pub fn write_dense_cloud(path: &Path, with_normals: bool) {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                points.push(Point3::new(i as f32 * 0.2, j as f32 * 0.2, 0.0));
            }
        }
        let mut cloud = PointCloud::new(points);
        if with_normals {
            cloud.normals = Some(vec![Vector3::z(); cloud.len()]);
        }
        ply::write_point_cloud(path, &cloud).unwrap();
    }

    fn step(&self, stage: Stage) -> Result<()> {
        self.calls.lock().unwrap().push(stage);
        if self.fail_at == Some(stage) {
            return Err(ReconError::StageFailed {
                stage,
                status: "exit status: 1".to_string(),
                stderr_tail: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Reconstructor for FakeReconstructor {
    fn extract_features(&self, database: &Path, _images: &Path) -> Result<()> {
        self.step(Stage::ExtractFeatures)?;
        fs::write(database, b"features")?;
        Ok(())
    }

    fn match_exhaustive(&self, database: &Path) -> Result<()> {
        self.step(Stage::MatchExhaustive)?;
        let mut file = OpenOptions::new().append(true).open(database)?;
        file.write_all(b";matches")?;
        Ok(())
    }

    fn incremental_mapping(&self, _database: &Path, _images: &Path, sparse_dir: &Path) -> Result<()> {
        self.step(Stage::IncrementalMapping)?;
        for (index, registered) in self.models.iter().enumerate() {
            let model = sparse_dir.join(index.to_string());
            fs::create_dir_all(&model)?;
            let mut bytes = Vec::new();
            bytes.write_u64::<LittleEndian>(*registered)?;
            fs::write(model.join("images.bin"), bytes)?;
        }
        Ok(())
    }

    fn export_ply(&self, _model_dir: &Path, output: &Path) -> Result<()> {
        self.step(Stage::ExportSparse)?;
        let cloud = PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        ply::write_point_cloud(output, &cloud)
    }

    fn undistort_images(
        &self,
        _images: &Path,
        model_dir: &Path,
        dense_dir: &Path,
        _max_image_size: u32,
    ) -> Result<()> {
        self.step(Stage::UndistortImages)?;
        *self.undistorted_from.lock().unwrap() = Some(model_dir.to_path_buf());
        fs::create_dir_all(dense_dir.join("images"))?;
        Ok(())
    }

    fn patch_match_stereo(&self, dense_dir: &Path, _max_image_size: u32, _cache_size: u32) -> Result<()> {
        self.step(Stage::PatchMatchStereo)?;
        fs::create_dir_all(dense_dir.join("stereo").join("depth_maps"))?;
        Ok(())
    }

    fn stereo_fusion(&self, _dense_dir: &Path, output: &Path) -> Result<()> {
        self.step(Stage::StereoFusion)?;
        Self::write_dense_cloud(output, true);
        Ok(())
    }

    fn poisson_mesh(&self, input: &Path, output: &Path, _depth: u32) -> Result<()> {
        self.step(Stage::PoissonMeshing)?;
        let cloud = ply::read_point_cloud(input)?;
        if !cloud.has_usable_normals() {
            return Err(ReconError::Ply("Poisson input needs normals".to_string()));
        }

        // A tetrahedron spanning the input stands in for the surface
        let mesh = TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            faces: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
            ..Default::default()
        };
        ply::write_mesh(output, &mesh)
    }
}
