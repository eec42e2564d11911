// Error types for the yt-dlp control layer

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::diagnostics::{diagnose_error, FailureReason};

#[derive(Debug, Error)]
pub enum YtDlpError {
    /// A builder setter received an empty or whitespace-only value
    #[error("{field} cannot be empty")]
    EmptyArgument { field: &'static str },

    /// A builder setter received a value it cannot use
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// A custom command fragment did not start with a known flag
    #[error("Invalid option: {0}")]
    UnrecognizedOption(String),

    /// yt-dlp could not be located at construction time
    #[error("yt-dlp executable not found at {0}. Install yt-dlp or specify a valid path.")]
    ExecutableNotFound(String),

    /// The process could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Fault while supervising a running process
    #[error("Error executing yt-dlp: {0}")]
    Process(String),

    /// yt-dlp exited with a non-zero status
    #[error("yt-dlp command failed with exit code {}: {stderr}", exit_code_label(.code))]
    CommandFailed { code: Option<i32>, stderr: String },

    /// The run was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// The output folder could not be created
    #[error("Failed to create output folder {}: {source}", .path.display())]
    OutputFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `--dump-json` output could not be decoded
    #[error("Failed to parse video metadata: {0}")]
    Metadata(#[source] serde_json::Error),

    /// A parsed record could not be written back out as JSON
    #[error("Failed to encode JSON output: {0}")]
    Encode(#[source] serde_json::Error),

    /// A batch was started without any inputs
    #[error("No URLs provided for batch download")]
    EmptyBatch,
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl YtDlpError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Configuration errors are programming errors on the caller side
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyArgument { .. } | Self::InvalidArgument { .. } | Self::UnrecognizedOption(_)
        )
    }

    /// Classify the captured stderr of a failed run
    pub fn diagnosis(&self) -> Option<FailureReason> {
        match self {
            Self::CommandFailed { stderr, .. } => diagnose_error(stderr),
            _ => None,
        }
    }
}
