// Fatal conditions the wrapper itself detects, as opposed to failures
// raised by the remote service (those stay `anyhow` errors).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NcwError {
    #[error("no token definition")]
    MissingToken,

    #[error("token file not found: {}", path.display())]
    TokenFileNotFound { path: PathBuf },

    #[error("no --token given and no ncwrc token file found")]
    NoTokenSource,

    #[error("action {action} requires --file")]
    MissingActionFile { action: String },

    #[error("action file not found: {}", path.display())]
    ActionFileNotFound { path: PathBuf },

    #[error("no valid input files in submission")]
    NoInputFiles,

    #[error("no job ids in download request")]
    NoJobIds,
}

impl NcwError {
    /// Whether the error comes from argument validation, in which case the
    /// driver prints usage help along with it.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            NcwError::TokenFileNotFound { .. }
                | NcwError::NoTokenSource
                | NcwError::MissingActionFile { .. }
                | NcwError::ActionFileNotFound { .. }
        )
    }
}
