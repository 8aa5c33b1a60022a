//! Background execution of pipeline runs.
//!
//! `launch` does the cheap checks on the calling thread (non-empty paths,
//! workspace not already in use), then hands the run to a dedicated worker
//! thread and returns at once. Everything the worker has to say comes back
//! through one bounded channel: progress values in order, then exactly one
//! `Finished` event.

use log::{error, info};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

use super::runner::{run_full_pipeline, run_mesh_stage, RunKind, RunOutcome};
use super::{Progress, ProgressReporter, Reconstructor};
use crate::config::ReconOptions;
use crate::error::{ReconError, Result};
use crate::workspace::WorkspaceGuard;

/// The worker is never more than one event ahead of the window
const EVENT_CAPACITY: usize = 1;

/// Request to stop a run at the next stage boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Progress(Progress),
    /// Last event of every run; the error is already user-readable
    Finished(std::result::Result<RunOutcome, String>),
}

/// What the operator asked for, straight from the two text fields
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub kind: RunKind,
    pub images_dir: String,
    pub workspace_dir: String,
}

impl RunRequest {
    /// Both fields must be filled in; nothing else is checked up front
    pub fn validate(&self) -> Result<(PathBuf, PathBuf)> {
        let images = self.images_dir.trim();
        let workspace = self.workspace_dir.trim();

        match (images.is_empty(), workspace.is_empty()) {
            (true, true) => Err(ReconError::Validation(
                "Select both the image folder and the workspace folder.".to_string(),
            )),
            (true, false) => Err(ReconError::Validation(
                "Select the image folder.".to_string(),
            )),
            (false, true) => Err(ReconError::Validation(
                "Select the workspace folder.".to_string(),
            )),
            (false, false) => Ok((PathBuf::from(images), PathBuf::from(workspace))),
        }
    }
}

/// A run in flight
#[derive(Debug)]
pub struct RunHandle {
    kind: RunKind,
    workspace: PathBuf,
    cancel: CancelToken,
    events: mpsc::Receiver<RunEvent>,
}

impl RunHandle {
    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn into_events(self) -> mpsc::Receiver<RunEvent> {
        self.events
    }
}

/// Validate `request`, claim its workspace and start the run on a worker thread
pub fn launch(
    request: RunRequest,
    backend: Arc<dyn Reconstructor>,
    options: ReconOptions,
) -> Result<RunHandle> {
    let (images, root) = request.validate()?;
    let guard = WorkspaceGuard::acquire(&root)?;

    let (tx, events) = mpsc::channel(EVENT_CAPACITY);
    let cancel = CancelToken::default();
    let worker_cancel = cancel.clone();
    let kind = request.kind;
    let worker_root = root.clone();

    thread::Builder::new()
        .name("recon-worker".to_string())
        .spawn(move || {
            info!("🚀 Starting {} in {}", kind, worker_root.display());

            let progress_tx = tx.clone();
            let mut reporter = ProgressReporter::new(move |progress| {
                // A closed channel means the window is gone; finish quietly
                let _ = progress_tx.blocking_send(RunEvent::Progress(progress));
            });

            let result = panic::catch_unwind(AssertUnwindSafe(|| match kind {
                RunKind::FullPipeline => run_full_pipeline(
                    backend.as_ref(),
                    &images,
                    &worker_root,
                    &options,
                    &mut reporter,
                    &worker_cancel,
                ),
                RunKind::MeshOnly => run_mesh_stage(
                    backend.as_ref(),
                    &worker_root,
                    &options,
                    &mut reporter,
                    &worker_cancel,
                ),
            }));

            let finished = match result {
                Ok(Ok(outcome)) => {
                    info!("🎉 {}", outcome.summary());
                    Ok(outcome)
                }
                Ok(Err(e)) => {
                    error!("❌ {} failed: {}", kind, e);
                    Err(e.to_string())
                }
                Err(_) => {
                    error!("❌ {} worker panicked", kind);
                    Err(format!("The {} crashed unexpectedly.", kind))
                }
            };

            // Release before announcing, so a follow-up run is not rejected
            drop(guard);
            let _ = tx.blocking_send(RunEvent::Finished(finished));
        })?;

    Ok(RunHandle {
        kind,
        workspace: root,
        cancel,
        events,
    })
}
