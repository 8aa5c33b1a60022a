use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use rstar::RTree;

use super::{PointCloud, TriangleMesh};

/// Estimate per-point normals by PCA over the `k` nearest neighbours.
///
/// The normal is the eigenvector of the neighbourhood covariance with the
/// smallest eigenvalue, flipped to point away from the cloud centroid.
/// Points with fewer than three neighbours get +Z.
pub fn estimate_normals(cloud: &mut PointCloud, k: usize) {
    if cloud.is_empty() {
        return;
    }

    let tree = RTree::bulk_load(cloud.points.iter().map(|p| [p.x, p.y, p.z]).collect());

    let centroid = cloud
        .points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / cloud.len() as f32;

    let normals = cloud
        .points
        .par_iter()
        .map(|p| {
            let neighbors: Vec<&[f32; 3]> = tree
                .nearest_neighbor_iter(&[p.x, p.y, p.z])
                .take(k)
                .collect();

            if neighbors.len() < 3 {
                return Vector3::z();
            }

            let mut mean = Vector3::zeros();
            for n in &neighbors {
                mean += Vector3::new(n[0], n[1], n[2]);
            }
            mean /= neighbors.len() as f32;

            let mut cov = Matrix3::zeros();
            for n in &neighbors {
                let d = Vector3::new(n[0], n[1], n[2]) - mean;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f32;

            let eigen = SymmetricEigen::new(cov);
            let min_idx = eigen.eigenvalues.imin();
            let normal: Vector3<f32> = eigen.eigenvectors.column(min_idx).into_owned();

            orient_outward(normal, p, &centroid)
        })
        .collect();

    cloud.normals = Some(normals);
}

fn orient_outward(normal: Vector3<f32>, p: &Point3<f32>, centroid: &Vector3<f32>) -> Vector3<f32> {
    if normal.dot(&(p.coords - centroid)) < 0.0 {
        -normal
    } else {
        normal
    }
}

/// Recompute per-vertex normals as the area-weighted sum of adjacent face
/// normals. Vertices without a non-degenerate face get +Z.
pub fn compute_vertex_normals(mesh: &mut TriangleMesh) {
    let mut sums = vec![Vector3::<f32>::zeros(); mesh.vertices.len()];

    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| mesh.vertices[i as usize]);
        // Cross product length is twice the triangle area
        let weighted = (b - a).cross(&(c - a));
        for &i in face {
            sums[i as usize] += weighted;
        }
    }

    let normals = sums
        .into_iter()
        .map(|n| n.try_normalize(1e-12).unwrap_or_else(Vector3::z))
        .collect();

    mesh.normals = Some(normals);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_grid(z: f32, size: usize) -> Vec<Point3<f32>> {
        let mut points = Vec::new();
        for i in 0..size {
            for j in 0..size {
                points.push(Point3::new(i as f32 * 0.1, j as f32 * 0.1, z));
            }
        }
        points
    }

    #[test]
    fn test_planar_normals_are_perpendicular() {
        let mut cloud = PointCloud::new(plane_grid(0.0, 10));
        estimate_normals(&mut cloud, 8);

        let normals = cloud.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 100);
        for n in normals {
            assert!(n.z.abs() > 0.99, "normal {:?} is not along z", n);
        }
        assert!(cloud.has_usable_normals());
    }

    #[test]
    fn test_normals_point_away_from_centroid() {
        // Two parallel planes; each one's normals should face outwards
        let mut points = plane_grid(0.0, 8);
        points.extend(plane_grid(5.0, 8));
        let mut cloud = PointCloud::new(points);

        estimate_normals(&mut cloud, 6);

        let normals = cloud.normals.unwrap();
        assert!(normals[..64].iter().all(|n| n.z < 0.0));
        assert!(normals[64..].iter().all(|n| n.z > 0.0));
    }

    #[test]
    fn test_tiny_cloud_defaults_to_up() {
        let mut cloud = PointCloud::new(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        estimate_normals(&mut cloud, 16);
        assert_eq!(cloud.normals.unwrap(), vec![Vector3::z(); 2]);
    }

    #[test]
    fn test_vertex_normals_of_single_triangle() {
        let mut mesh = TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(9.0, 9.0, 9.0),
            ],
            faces: vec![[0, 1, 2]],
            ..Default::default()
        };

        compute_vertex_normals(&mut mesh);

        let normals = mesh.normals.unwrap();
        assert_eq!(normals.len(), 4);
        for n in &normals[..3] {
            assert!((n - Vector3::z()).norm() < 1e-6);
        }
        // Isolated vertex
        assert_eq!(normals[3], Vector3::z());
    }

    #[test]
    fn test_larger_face_dominates_vertex_normal() {
        // Shared vertex 0: a big triangle in the XY plane and a small one in XZ
        let mut mesh = TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(0.0, 10.0, 0.0),
                Point3::new(0.1, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.1),
            ],
            faces: vec![[0, 1, 2], [0, 4, 3]],
            ..Default::default()
        };

        compute_vertex_normals(&mut mesh);

        let n0 = mesh.normals.unwrap()[0];
        assert!(n0.z > 0.99);
    }
}
