use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::{Error, Result};
use crate::events::Stage;

/// A validated prompt. Can only be built through [`GenerationRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput("Prompt cannot be empty.".into()));
        }
        Ok(Self { prompt })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Generating,
    Vectorizing,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

impl From<Stage> for JobState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Generating => Self::Generating,
            Stage::Vectorizing => Self::Vectorizing,
            Stage::Finalizing => Self::Finalizing,
        }
    }
}

/// One run of the pipeline. Temp file names derive from `id`, so jobs
/// sharing a work directory never collide.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub request: GenerationRequest,
    pub state: JobState,
    pub raster_path: PathBuf,
    pub vector_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(request: GenerationRequest, work_dir: &Path) -> Self {
        let id = Uuid::new_v4();

        Self {
            id,
            request,
            state: JobState::Pending,
            raster_path: work_dir.join(format!("{id}.png")),
            vector_path: work_dir.join(format!("{id}.svg")),
            created_at: Utc::now(),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }
}
