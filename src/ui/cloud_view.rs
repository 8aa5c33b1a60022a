use cgmath::{InnerSpace, Matrix3, Rad, Vector2, Vector3};
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Program};
use iced::{Color, Point, Rectangle, Renderer, Size, Theme};
use log::info;
use std::sync::Arc;

use crate::geometry::{bounds_of, ply, PointCloud, TriangleMesh};
use crate::pipeline::{RunKind, RunOutcome};
use crate::Message;

/// Points drawn per frame at most; larger inputs are strided
pub const MAX_PREVIEW_POINTS: usize = 60_000;

const SPARSE_COLOR: Color = Color::from_rgb(1.0, 0.6, 0.2);
const DENSE_COLOR: Color = Color::from_rgb(0.8, 0.8, 0.85);
const BACKGROUND: Color = Color::from_rgb(0.08, 0.08, 0.1);

#[derive(Debug, Clone, Copy)]
struct PreviewPoint {
    position: Vector3<f32>,
    color: Color,
}

/// Everything the canvas needs to draw one result, cheap to clone
#[derive(Debug, Clone)]
pub struct PreviewScene {
    points: Arc<Vec<PreviewPoint>>,
    center: Vector3<f32>,
    radius: f32,
    pub title: String,
}

impl PreviewScene {
    /// Sparse and dense clouds side by side, dense shifted along +X
    pub fn from_clouds(sparse: &PointCloud, dense: &PointCloud) -> Self {
        let offset = match sparse.bounds() {
            Some((min, max)) if max.x > min.x => (max.x - min.x) * 1.1,
            _ => 1.0,
        };

        let mut points = sample_cloud(sparse, SPARSE_COLOR, 0.0, MAX_PREVIEW_POINTS / 4);
        points.extend(sample_cloud(dense, DENSE_COLOR, offset, MAX_PREVIEW_POINTS * 3 / 4));

        Self::from_points(
            points,
            format!("Sparse ({}) and dense ({}) clouds", sparse.len(), dense.len()),
        )
    }

    /// Mesh vertices shaded by their normals
    pub fn from_mesh(mesh: &TriangleMesh) -> Self {
        let light: Vector3<f32> = Vector3::new(0.3, 0.5, 0.8).normalize();
        let stride = stride_for(mesh.vertices.len(), MAX_PREVIEW_POINTS);

        let points = mesh
            .vertices
            .iter()
            .enumerate()
            .step_by(stride)
            .map(|(i, v)| {
                let shade = mesh
                    .normals
                    .as_ref()
                    .map(|normals| {
                        let n = normals[i];
                        0.25 + 0.75 * Vector3::new(n.x, n.y, n.z).dot(light).abs()
                    })
                    .unwrap_or(0.8);
                PreviewPoint {
                    position: Vector3::new(v.x, v.y, v.z),
                    color: Color::from_rgb(shade * 0.7, shade * 0.85, shade),
                }
            })
            .collect();

        Self::from_points(
            points,
            format!(
                "Mesh ({} vertices, {} faces)",
                mesh.num_vertices(),
                mesh.num_faces()
            ),
        )
    }

    fn from_points(points: Vec<PreviewPoint>, title: String) -> Self {
        let positions: Vec<nalgebra::Point3<f32>> = points
            .iter()
            .map(|p| nalgebra::Point3::new(p.position.x, p.position.y, p.position.z))
            .collect();

        let (center, radius) = match bounds_of(&positions) {
            Some((min, max)) => {
                let center = Vector3::new(
                    (min.x + max.x) * 0.5,
                    (min.y + max.y) * 0.5,
                    (min.z + max.z) * 0.5,
                );
                let radius = ((max - min).norm() * 0.5).max(1e-3);
                (center, radius)
            }
            None => (Vector3::new(0.0, 0.0, 0.0), 1.0),
        };

        Self {
            points: Arc::new(points),
            center,
            radius,
            title,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

fn stride_for(len: usize, budget: usize) -> usize {
    len.div_ceil(budget.max(1)).max(1)
}

fn sample_cloud(cloud: &PointCloud, fallback: Color, x_offset: f32, budget: usize) -> Vec<PreviewPoint> {
    cloud
        .points
        .iter()
        .enumerate()
        .step_by(stride_for(cloud.len(), budget))
        .map(|(i, p)| PreviewPoint {
            position: Vector3::new(p.x + x_offset, p.y, p.z),
            color: cloud
                .colors
                .as_ref()
                .map(|c| Color::from_rgb8(c[i][0], c[i][1], c[i][2]))
                .unwrap_or(fallback),
        })
        .collect()
}

/// Load whatever a finished run produced.
/// Runs in a background thread to avoid blocking the UI
pub async fn load_preview(outcome: RunOutcome) -> Result<PreviewScene, String> {
    tokio::task::spawn_blocking(move || -> crate::error::Result<PreviewScene> {
        let workspace = &outcome.workspace;
        let scene = match outcome.kind {
            RunKind::FullPipeline => {
                let sparse = ply::read_point_cloud(&workspace.sparse_ply())?;
                let dense = ply::read_point_cloud(&workspace.dense_ply())?;
                PreviewScene::from_clouds(&sparse, &dense)
            }
            RunKind::MeshOnly => PreviewScene::from_mesh(&ply::read_mesh(&workspace.mesh_ply())?),
        };
        info!("🖼️  Preview ready: {} ({} points drawn)", scene.title, scene.len());
        Ok(scene)
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))?
    .map_err(|e| e.to_string())
}

/// Orbit camera around the scene center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub yaw: f32,
    pub pitch: f32,
    /// 1.0 fits the scene in the view
    pub zoom: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            // COLMAP's y axis points down; look from slightly above
            pitch: std::f32::consts::PI + 0.3,
            zoom: 1.0,
        }
    }
}

impl OrbitCamera {
    pub fn orbit(&mut self, delta: Vector2<f32>) {
        self.yaw += delta.x;
        self.pitch += delta.y;
    }

    pub fn zoom_by(&mut self, delta: f32) {
        self.zoom = (self.zoom * (1.0 + delta)).clamp(0.1, 20.0);
    }

    fn rotation(&self) -> Matrix3<f32> {
        Matrix3::from_angle_x(Rad(self.pitch)) * Matrix3::from_angle_y(Rad(self.yaw))
    }

    /// Screen position and depth of a scene point
    fn project(&self, scene: &PreviewScene, p: Vector3<f32>, bounds: Size) -> (Point, f32) {
        let v = self.rotation() * (p - scene.center);
        let scale = 0.45 * bounds.width.min(bounds.height) / scene.radius * self.zoom;
        (
            Point::new(bounds.width * 0.5 + v.x * scale, bounds.height * 0.5 - v.y * scale),
            v.z,
        )
    }
}

/// Canvas program drawing a `PreviewScene`
pub struct CloudView<'a> {
    pub scene: &'a PreviewScene,
    pub camera: OrbitCamera,
}

impl Program<Message> for CloudView<'_> {
    type State = DragState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), BACKGROUND);

        let size = bounds.size();
        let mut projected: Vec<(Point, f32, Color)> = self
            .scene
            .points
            .iter()
            .map(|p| {
                let (screen, depth) = self.camera.project(self.scene, p.position, size);
                (screen, depth, p.color)
            })
            .filter(|(s, _, _)| s.x >= 0.0 && s.y >= 0.0 && s.x < size.width && s.y < size.height)
            .collect();

        // Painter's order: far points first
        projected.sort_by(|a, b| a.1.total_cmp(&b.1));

        let dot = Size::new(2.0, 2.0);
        for (screen, _, color) in projected {
            frame.fill_rectangle(Point::new(screen.x - 1.0, screen.y - 1.0), dot, color);
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        match event {
            // Mouse wheel for zooming
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                if cursor.is_over(bounds) {
                    let zoom_delta = match delta {
                        mouse::ScrollDelta::Lines { y, .. } => y * 0.1,
                        mouse::ScrollDelta::Pixels { y, .. } => y * 0.01,
                    };
                    return (canvas::event::Status::Captured, Some(Message::Zoom(zoom_delta)));
                }
            }

            // Mouse button press - start rotating
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(pos) = cursor.position_over(bounds) {
                    state.is_dragging = true;
                    state.last_position = Some(pos);
                    return (canvas::event::Status::Captured, None);
                }
            }

            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if state.is_dragging {
                    state.is_dragging = false;
                    state.last_position = None;
                    return (canvas::event::Status::Captured, None);
                }
            }

            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) if state.is_dragging => {
                if let (Some(current), Some(last)) = (cursor.position(), state.last_position) {
                    // Radians per pixel
                    let delta = Vector2::new(current.x - last.x, current.y - last.y) * 0.01;
                    state.last_position = Some(current);
                    return (canvas::event::Status::Captured, Some(Message::Orbit(delta)));
                }
            }

            _ => {}
        }

        (canvas::event::Status::Ignored, None)
    }
}

/// State for drag interactions
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pub is_dragging: bool,
    pub last_position: Option<Point>,
}
