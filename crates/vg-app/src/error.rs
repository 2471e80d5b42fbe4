use thiserror::Error;
use vg_core::ErrorKind;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message} ({kind:?})")]
    Pipeline {
        kind: ErrorKind,
        message: String,
    },

    #[error("Generation ended without a result")]
    NoResult,
}
