use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;
use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Generating,
    Vectorizing,
    Finalizing,
}

impl Stage {
    pub fn message(&self) -> &str {
        match self {
            Self::Generating => "Generating image via API...",
            Self::Vectorizing => "Vectorizing image...",
            Self::Finalizing => "Finalizing...",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub stage: Stage,
    pub message: String,
}

/// Terminal success. The caller owns `path` from here on and must move or
/// delete it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEvent {
    pub job_id: Uuid,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    /// `None` when the run was rejected before a job was allocated
    pub job_id: Option<Uuid>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn from_error(job_id: Option<Uuid>, error: &Error) -> Self {
        Self {
            job_id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Finished(ResultEvent),
    Failed(ErrorEvent),
}
