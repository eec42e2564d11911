// ytdlp-control - drive the yt-dlp executable from async Rust

pub mod config;
pub mod downloader;
pub mod ytdlp;

pub use config::YtDlpConfig;
pub use downloader::{
    event_channel, BatchReport, CommandBuilder, EventReceiver, EventSender, FailureReason,
    Metadata, UpdateStatus, VideoFormat, YtDlpError, YtDlpEvent,
};
pub use ytdlp::YtDlp;
