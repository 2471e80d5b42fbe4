pub mod artifact;
pub mod config;
pub mod error;
pub mod events;
pub mod image_client;
pub mod job;
pub mod pipeline;
pub mod vectorize;
mod model_types;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use events::{ErrorEvent, PipelineEvent, ProgressEvent, ResultEvent, Stage};
pub use image_client::{ImageGenerator, RemoteImageClient};
pub use job::{GenerationJob, GenerationRequest, JobState};
pub use model_types::ImageModel;
pub use pipeline::{CancelToken, JobHandle, PipelineRunner};
pub use vectorize::{Vectorizer, VectorizerKind};
