// Downloader module - command building, process supervision and output parsing

pub mod batch;
pub mod command;
pub mod diagnostics;
pub mod errors;
pub mod formats;
pub mod models;
pub mod options;
pub mod process;
pub mod progress;
pub mod traits;

pub use batch::BatchReport;
pub use command::{CommandBuilder, CommandSpec};
pub use diagnostics::FailureReason;
pub use errors::YtDlpError;
pub use models::{
    event_channel, DownloadProgress, EventReceiver, EventSender, Metadata, UpdateStatus,
    VideoFormat, YtDlpEvent,
};
pub use options::{OptionCategory, OptionRegistry};
pub use process::{ProcessOutput, ProcessRunner};
pub use progress::ProgressParser;
pub use traits::UrlExecutor;
