//! Error types for the reconstruction shell
//!
//! Every failure a run can hit ends up here: workspace setup, the external
//! COLMAP calls, PLY handling and operator input. The controller turns these
//! into a single message for the user.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Debug, Error)]
pub enum ReconError {
    /// Operator input rejected before any work started
    #[error("{0}")]
    Validation(String),

    #[error("cannot create workspace directory {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a reconstruction is already running in {}", .0.display())]
    WorkspaceBusy(PathBuf),

    /// The external executable could not be started at all
    #[error("failed to launch '{tool}': {source}. Is COLMAP installed and on PATH?")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed ({status})\n{stderr_tail}")]
    StageFailed {
        stage: Stage,
        status: String,
        stderr_tail: String,
    },

    #[error("incremental mapping produced no reconstruction in {}", .0.display())]
    NoReconstruction(PathBuf),

    #[error("required input is missing: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("invalid PLY data: {0}")]
    Ply(String),

    #[error("cancelled before {0}")]
    Cancelled(Stage),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_message_names_stage() {
        let err = ReconError::StageFailed {
            stage: Stage::MatchExhaustive,
            status: "exit status: 1".to_string(),
            stderr_tail: "not enough matches".to_string(),
        };
        let message = err.to_string();
        assert!(message.starts_with("Exhaustive matching failed"));
        assert!(message.contains("not enough matches"));
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = ReconError::Validation("Select both folders".to_string());
        assert_eq!(err.to_string(), "Select both folders");
    }
}
