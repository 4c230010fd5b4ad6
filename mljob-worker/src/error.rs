//! Pipeline error taxonomy
//!
//! Every stage of the single-job pipeline fails with a `PipelineError`.
//! The executor turns it into a `failed` report and a log line.

use mljob_client::ClientError;
use thiserror::Error;

use crate::runtime::RuntimeError;
use crate::service::bundle::BundleError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("coordinator request failed: {0}")]
    Transport(#[from] ClientError),

    #[error("job was taken by another worker")]
    Conflict,

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("container exited with code {0}")]
    NonZeroExit(i64),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl PipelineError {
    /// Lines captured before the failure that belong in the job log
    pub fn output_lines(&self) -> &[String] {
        match self {
            Self::Runtime(RuntimeError::Build { output, .. }) => output,
            _ => &[],
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
