use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewlineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid buffer size: {0}. Must be greater than zero")]
    InvalidBufferSize(u64),

    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Output path {} is the same file as the input", .0.display())]
    OutputIsInput(PathBuf),

    #[error("Output directory does not exist: {}", .0.display())]
    OutputDirMissing(PathBuf),

    #[error("Output location is not writable: {}", .0.display())]
    OutputNotWritable(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error(
        "Bucket of {bytes} bytes still exceeds the {budget} byte buffer at re-bucketing depth {depth}"
    )]
    ResourceExhausted { bytes: u64, budget: u64, depth: usize },

    #[error("Operation cancelled")]
    Cancelled,
}

impl NewlineError {
    /// True for errors caused by caller input rather than by the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidBufferSize(_)
                | Self::InputNotFound(_)
                | Self::OutputIsInput(_)
                | Self::OutputDirMissing(_)
                | Self::OutputNotWritable(_)
                | Self::InvalidArgument(_)
                | Self::UnsupportedMethod(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NewlineError>;
