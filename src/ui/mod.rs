/// User interface components
///
/// - `cloud_view.rs` - interactive point-cloud / mesh preview on an iced canvas

pub mod cloud_view;

pub use cloud_view::{load_preview, CloudView, OrbitCamera, PreviewScene};
