// Common data models for the yt-dlp control layer

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::errors::YtDlpError;

/// One row of the `--list-formats` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Format ID (e.g., "137", "sb0"), unique within one listing
    pub id: String,
    pub extension: String,
    /// "1920x1080" or the literal "audio only"
    pub resolution: String,
    pub fps: Option<String>,
    /// Audio channel count
    pub channels: Option<String>,
    /// Approximate size with unit suffix (e.g., "~45.67MiB")
    pub file_size: Option<String>,
    pub tbr: Option<String>,
    /// One of https, m3u8, mhtml
    pub protocol: Option<String>,
    /// Codec name, "audio only", or "images" for storyboards
    pub vcodec: Option<String>,
    pub vbr: Option<String>,
    /// Codec name or "unknown"
    pub acodec: Option<String>,
    pub abr: Option<String>,
    pub asr: Option<String>,
    pub more_info: Option<String>,
}

impl VideoFormat {
    pub fn is_audio_only(&self) -> bool {
        self.resolution == "audio only"
    }

    pub fn is_storyboard(&self) -> bool {
        self.vcodec.as_deref() == Some("images")
    }
}

/// Thumbnail entry of the `--dump-json` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub id: Option<String>,
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Format entry of the `--dump-json` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataFormat {
    pub format_id: Option<String>,
    pub format_note: Option<String>,
    pub ext: Option<String>,
    pub protocol: Option<String>,
    pub url: Option<String>,
    pub resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<f64>,
    pub tbr: Option<f64>,
    pub vbr: Option<f64>,
    pub abr: Option<f64>,
    pub asr: Option<f64>,
}

/// Single-video metadata as printed by `--dump-json`.
///
/// The typed fields cover what callers commonly read; everything else the
/// document exposes lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub fulltitle: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub uploader_id: Option<String>,
    pub uploader_url: Option<String>,
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    /// YYYYMMDD
    pub upload_date: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
    pub extractor_key: Option<String>,
    pub ext: Option<String>,
    pub format_id: Option<String>,
    pub resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub is_live: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub thumbnails: Option<Vec<Thumbnail>>,
    pub formats: Option<Vec<MetadataFormat>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// Decode a `--dump-json` document, matching property names case-insensitively.
    ///
    /// Only the keys that map onto typed fields are folded: the top level and
    /// the entries of `formats` and `thumbnails`. Nested pass-through data such
    /// as `http_headers` keeps its original spelling.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json.trim())?;
        let value = match value {
            Value::Object(map) => Value::Object(
                lowercase_keys(map)
                    .into_iter()
                    .map(|(k, v)| {
                        if k == "formats" || k == "thumbnails" {
                            (k, lowercase_entries(v))
                        } else {
                            (k, v)
                        }
                    })
                    .collect(),
            ),
            other => other,
        };
        serde_json::from_value(value)
    }

    /// Pretty-printed JSON of the decoded document
    pub fn to_pretty_json(&self) -> Result<String, YtDlpError> {
        serde_json::to_string_pretty(self).map_err(YtDlpError::Encode)
    }
}

fn lowercase_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

fn lowercase_entries(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(lowercase_keys(map)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Live transfer state derived from one `[download]` progress line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: f32,
    /// Total size with unit (e.g., "343.72MiB"), prefixed with "~" when estimated
    pub total_size: Option<String>,
    /// Transfer rate (e.g., "420.30KiB/s")
    pub speed: Option<String>,
    /// Estimated time remaining (e.g., "12:32")
    pub eta: Option<String>,
    /// (current, total) for fragmented downloads
    pub fragments: Option<(u32, u32)>,
    /// Destination file announced for the current download, if seen
    pub file: Option<String>,
}

/// Everything a run reports back to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum YtDlpEvent {
    /// Raw stdout line
    Output(String),
    /// Raw stderr line
    ErrorLine(String),
    Progress(DownloadProgress),
    /// A file finished downloading (or was already present)
    DownloadComplete(String),
    /// A post-processor announced a step, e.g. `Merger` or `ExtractAudio`
    PostProcessing { step: String, detail: String },
    PostProcessingComplete(String),
    /// Informational stdout line that is not progress
    Message(String),
    /// `ERROR:` line printed on stdout
    Error(String),
    Completed { success: bool, message: String },
}

pub type EventSender = mpsc::UnboundedSender<YtDlpEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<YtDlpEvent>;

/// Create the channel a caller hands to a run
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Result of `yt-dlp -U`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    Updated,
    UpToDate,
    NoChange,
}

impl UpdateStatus {
    pub fn from_output(stdout: &str) -> Self {
        let lower = stdout.to_lowercase();
        if lower.contains("updated") && !lower.contains("up to date") {
            Self::Updated
        } else if lower.contains("up to date") {
            Self::UpToDate
        } else {
            Self::NoChange
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Updated => "yt-dlp was successfully updated to the latest version.",
            Self::UpToDate => "yt-dlp is already up to date.",
            Self::NoChange => "yt-dlp update check completed (no changes detected).",
        }
    }
}
