/// Geometry handling for the reconstruction outputs
///
/// - `ply.rs` - PLY reader/writer (ascii and binary little-endian)
/// - `normals.rs` - per-point normal estimation and per-vertex normal recomputation
///
/// Surface reconstruction itself is delegated to COLMAP; this module only
/// prepares its input and post-processes its output.

pub mod normals;
pub mod ply;

use nalgebra::{Point3, Vector3};

/// Points with optional per-point normals and colors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f32>>,
    pub normals: Option<Vec<Vector3<f32>>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3<f32>>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when every point carries a non-degenerate normal
    pub fn has_usable_normals(&self) -> bool {
        match &self.normals {
            Some(normals) => {
                normals.len() == self.points.len()
                    && normals.iter().all(|n| n.norm_squared() > 1e-12)
            }
            None => false,
        }
    }

    /// Axis-aligned bounds, `None` for an empty cloud
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        bounds_of(&self.points)
    }
}

/// Indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f32>>,
    pub normals: Option<Vec<Vector3<f32>>>,
    pub colors: Option<Vec<[u8; 3]>>,
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }
}

pub(crate) fn bounds_of(points: &[Point3<f32>]) -> Option<(Point3<f32>, Point3<f32>)> {
    let first = *points.first()?;
    let mut min = first;
    let mut max = first;

    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }

    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_normals_require_full_coverage() {
        let mut cloud = PointCloud::new(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        assert!(!cloud.has_usable_normals());

        cloud.normals = Some(vec![Vector3::z()]);
        assert!(!cloud.has_usable_normals());

        cloud.normals = Some(vec![Vector3::z(), Vector3::zeros()]);
        assert!(!cloud.has_usable_normals());

        cloud.normals = Some(vec![Vector3::z(), Vector3::x()]);
        assert!(cloud.has_usable_normals());
    }

    #[test]
    fn test_bounds() {
        let cloud = PointCloud::new(vec![
            Point3::new(1.0, -2.0, 3.0),
            Point3::new(-1.0, 4.0, 0.5),
        ]);
        let (min, max) = cloud.bounds().unwrap();
        assert_eq!(min, Point3::new(-1.0, -2.0, 0.5));
        assert_eq!(max, Point3::new(1.0, 4.0, 3.0));
        assert!(PointCloud::default().bounds().is_none());
    }
}
