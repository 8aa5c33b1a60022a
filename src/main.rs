use cgmath::Vector2;
use iced::futures::{stream, Stream};
use iced::widget::{button, canvas, column, container, progress_bar, row, text, text_input, Column};
use iced::{Element, Length, Task, Theme};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

mod config;
mod error;
mod geometry;
mod pipeline;
mod ui;
mod workspace;

use config::{ReconOptions, Settings};
use pipeline::{CancelToken, ColmapCli, Progress, Reconstructor, RunEvent, RunKind, RunRequest};
use ui::{CloudView, OrbitCamera, PreviewScene};

/// A run the window is currently following
struct ActiveRun {
    kind: RunKind,
    cancel: CancelToken,
}

/// Main application state
struct ReconStudio {
    settings: Settings,
    images_dir: String,
    workspace_dir: String,
    /// Last progress value received from the worker
    progress: Progress,
    /// Status line under the progress bar
    status: String,
    active_run: Option<ActiveRun>,
    preview: Option<PreviewScene>,
    camera: OrbitCamera,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    ImagesDirChanged(String),
    WorkspaceDirChanged(String),
    BrowseImages,
    BrowseWorkspace,
    ImagesDirPicked(Option<PathBuf>),
    WorkspaceDirPicked(Option<PathBuf>),
    /// "Run reconstruction" button
    RunFullPipeline,
    /// "Build mesh" button
    RunMeshOnly,
    CancelRun,
    /// Forwarded from the worker's channel
    Run(RunEvent),
    PreviewLoaded(Result<PreviewScene, String>),
    Orbit(Vector2<f32>),
    Zoom(f32),
    DialogClosed,
}

impl ReconStudio {
    fn new() -> (Self, Task<Message>) {
        let settings = Settings::load();
        info!("🎨 Recon Studio started, COLMAP binary: {}", settings.colmap_binary.display());

        let path_text = |dir: &Option<PathBuf>| {
            dir.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };

        let studio = ReconStudio {
            images_dir: path_text(&settings.last_images_dir),
            workspace_dir: path_text(&settings.last_workspace_dir),
            settings,
            progress: Progress::default(),
            status: "Ready. Pick an image folder and a workspace.".to_string(),
            active_run: None,
            preview: None,
            camera: OrbitCamera::default(),
        };

        (studio, Task::none())
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ImagesDirChanged(value) => {
                self.images_dir = value;
                Task::none()
            }
            Message::WorkspaceDirChanged(value) => {
                self.workspace_dir = value;
                Task::none()
            }
            Message::BrowseImages => {
                Task::perform(pick_folder("Select the image folder"), Message::ImagesDirPicked)
            }
            Message::BrowseWorkspace => Task::perform(
                pick_folder("Select the workspace folder"),
                Message::WorkspaceDirPicked,
            ),
            Message::ImagesDirPicked(folder) => {
                if let Some(folder) = folder {
                    self.images_dir = folder.display().to_string();
                }
                Task::none()
            }
            Message::WorkspaceDirPicked(folder) => {
                if let Some(folder) = folder {
                    self.workspace_dir = folder.display().to_string();
                }
                Task::none()
            }
            Message::RunFullPipeline => self.start_run(RunKind::FullPipeline),
            Message::RunMeshOnly => self.start_run(RunKind::MeshOnly),
            Message::CancelRun => {
                if let Some(run) = &self.active_run {
                    run.cancel.cancel();
                    self.status = format!("Stopping {} after the current stage...", run.kind);
                }
                Task::none()
            }
            Message::Run(RunEvent::Progress(progress)) => {
                self.status = progress.label.clone();
                self.progress = progress;
                Task::none()
            }
            Message::Run(RunEvent::Finished(Ok(outcome))) => {
                self.active_run = None;
                self.status = format!("✅ {}", outcome.summary());
                Task::perform(ui::load_preview(outcome), Message::PreviewLoaded)
            }
            Message::Run(RunEvent::Finished(Err(message))) => {
                self.active_run = None;
                let headline = message.lines().next().unwrap_or_default();
                self.status = format!("❌ {}", headline);
                show_error(message)
            }
            Message::PreviewLoaded(Ok(scene)) => {
                self.preview = Some(scene);
                self.camera = OrbitCamera::default();
                Task::none()
            }
            Message::PreviewLoaded(Err(e)) => {
                warn!("⚠️  No preview: {}", e);
                self.status = format!("{} (preview unavailable: {})", self.status, e);
                Task::none()
            }
            Message::Orbit(delta) => {
                self.camera.orbit(delta);
                Task::none()
            }
            Message::Zoom(delta) => {
                self.camera.zoom_by(delta);
                Task::none()
            }
            Message::DialogClosed => Task::none(),
        }
    }

    /// Validate the two fields and hand the run to a worker
    fn start_run(&mut self, kind: RunKind) -> Task<Message> {
        if self.active_run.is_some() {
            return Task::none();
        }

        let request = RunRequest {
            kind,
            images_dir: self.images_dir.clone(),
            workspace_dir: self.workspace_dir.clone(),
        };
        let options = ReconOptions::from(&self.settings);
        let backend: Arc<dyn Reconstructor> = Arc::new(ColmapCli::from_options(&options));

        match pipeline::launch(request, backend, options) {
            Ok(handle) => {
                self.settings.last_images_dir = Some(PathBuf::from(self.images_dir.trim()));
                self.settings.last_workspace_dir = Some(handle.workspace().to_path_buf());
                if let Err(e) = self.settings.save() {
                    warn!("⚠️  Could not save settings: {}", e);
                }

                self.progress = Progress::default();
                self.status = format!("Starting {} in {}...", kind, handle.workspace().display());
                self.active_run = Some(ActiveRun {
                    kind: handle.kind(),
                    cancel: handle.cancel_token(),
                });

                Task::run(event_stream(handle.into_events()), Message::Run)
            }
            Err(e) => {
                let message = e.to_string();
                self.status = format!("❌ {}", message);
                show_error(message)
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let idle = self.active_run.is_none();

        let images_row = row![
            text_input("Image folder", &self.images_dir)
                .on_input(Message::ImagesDirChanged)
                .padding(8),
            button("Browse...")
                .on_press_maybe(idle.then_some(Message::BrowseImages))
                .padding(8),
        ]
        .spacing(10);

        let workspace_row = row![
            text_input("Workspace folder", &self.workspace_dir)
                .on_input(Message::WorkspaceDirChanged)
                .padding(8),
            button("Browse...")
                .on_press_maybe(idle.then_some(Message::BrowseWorkspace))
                .padding(8),
        ]
        .spacing(10);

        let actions = row![
            button("Run reconstruction")
                .on_press_maybe(idle.then_some(Message::RunFullPipeline))
                .padding(10),
            button("Build mesh")
                .on_press_maybe(idle.then_some(Message::RunMeshOnly))
                .padding(10),
            button("Cancel")
                .on_press_maybe((!idle).then_some(Message::CancelRun))
                .padding(10),
        ]
        .spacing(10);

        let preview: Element<Message> = match &self.preview {
            Some(scene) => column![
                text(&scene.title).size(14),
                canvas(CloudView {
                    scene,
                    camera: self.camera,
                })
                .width(Length::Fill)
                .height(Length::Fill),
            ]
            .spacing(6)
            .into(),
            None => container(text("The result of a finished run is shown here.").size(14))
                .width(Length::Fill)
                .height(Length::Fill)
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        let content: Column<Message> = column![
            text("Recon Studio").size(32),
            images_row,
            workspace_row,
            actions,
            progress_bar(0.0..=1.0, self.progress.fraction()),
            text(&self.status).size(16),
            preview,
        ]
        .spacing(14)
        .padding(24);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    iced::application("Recon Studio", ReconStudio::update, ReconStudio::view)
        .theme(ReconStudio::theme)
        .window_size((960.0, 760.0))
        .centered()
        .run_with(ReconStudio::new)
}

/// Native folder picker
async fn pick_folder(title: &'static str) -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title(title)
        .pick_folder()
        .await
        .map(|handle| handle.path().to_path_buf())
}

/// Modal error dialog; the window keeps running behind it
fn show_error(message: String) -> Task<Message> {
    Task::perform(
        async move {
            rfd::AsyncMessageDialog::new()
                .set_level(rfd::MessageLevel::Error)
                .set_title("Recon Studio")
                .set_description(message)
                .set_buttons(rfd::MessageButtons::Ok)
                .show()
                .await;
        },
        |_| Message::DialogClosed,
    )
}

/// Worker events as a stream, ending when the worker hangs up
fn event_stream(events: mpsc::Receiver<RunEvent>) -> impl Stream<Item = RunEvent> {
    stream::unfold(events, |mut events| async move {
        events.recv().await.map(|event| (event, events))
    })
}
