// Progress parser - turns yt-dlp stdout lines into typed events
//
// State lives for one invocation only; the runner creates a fresh parser
// (or calls `reset`) before every run.

use regex::Regex;

use super::models::{DownloadProgress, YtDlpEvent};

lazy_static::lazy_static! {
    // [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
    static ref PROGRESS_RE: Regex = Regex::new(
        r"^\[download\]\s+(\d+(?:\.\d+)?)%\s+of\s+(~?\s*\d+(?:\.\d+)?\s*[KMGTPE]?i?B)(?:\s+at\s+(Unknown\s+B/s|\d+(?:\.\d+)?\s*[KMGTPE]?i?B/s))?(?:\s+ETA\s+(\S+))?(?:\s+\(frag\s+(\d+)/(\d+)\))?"
    ).unwrap();
    // [download] 100% of   10.00MiB in 00:00:08 at 1.20MiB/s
    static ref COMPLETE_RE: Regex = Regex::new(
        r"^\[download\]\s+100(?:\.0+)?%\s+of\s+~?\s*\S+\s+in\s+\S+"
    ).unwrap();
    static ref DEST_RE: Regex = Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").unwrap();
    static ref ALREADY_RE: Regex = Regex::new(r"^\[download\]\s+(.+?) has already been downloaded").unwrap();
    // Post-processors are CamelCase ([Merger], [ExtractAudio]); extractors are lowercase
    static ref POSTPROCESS_RE: Regex = Regex::new(r"^\[([A-Z][A-Za-z0-9]*)\]\s*(.*)$").unwrap();
    static ref MERGE_TARGET_RE: Regex = Regex::new(r#"Merging formats into "(.+)"$"#).unwrap();
    static ref PP_DEST_RE: Regex = Regex::new(r"^Destination:\s+(.+)$").unwrap();
}

/// Line-oriented state machine over yt-dlp stdout
#[derive(Debug, Default)]
pub struct ProgressParser {
    current_file: Option<String>,
    downloading: bool,
    post_processing: Option<String>,
    completed_downloads: usize,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything seen so far; call before a new invocation
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn completed_downloads(&self) -> usize {
        self.completed_downloads
    }

    /// Classify one stdout line. Never fails; unknown shapes become `Message`.
    pub fn parse_line(&mut self, line: &str) -> Vec<YtDlpEvent> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Vec::new();
        }

        if line.starts_with("[download]") {
            return self.parse_download(line);
        }

        if let Some(rest) = line.strip_prefix("ERROR:") {
            tracing::debug!("[Progress] error line: {}", rest.trim());
            return vec![YtDlpEvent::Error(line.to_string())];
        }

        if let Some(caps) = POSTPROCESS_RE.captures(line) {
            let step = caps[1].to_string();
            let detail = caps[2].trim().to_string();
            let mut events = Vec::new();

            let target = MERGE_TARGET_RE
                .captures(&detail)
                .or_else(|| PP_DEST_RE.captures(&detail))
                .map(|c| c[1].trim_matches('"').to_string());
            if let Some(target) = target {
                self.post_processing = Some(target);
            } else if self.post_processing.is_none() {
                self.post_processing = self.current_file.clone();
            }

            self.downloading = false;
            events.push(YtDlpEvent::PostProcessing { step, detail });
            return events;
        }

        vec![YtDlpEvent::Message(line.to_string())]
    }

    /// Flush state at end of stream
    pub fn finish(&mut self) -> Vec<YtDlpEvent> {
        self.downloading = false;
        self.post_processing
            .take()
            .map(|file| vec![YtDlpEvent::PostProcessingComplete(file)])
            .unwrap_or_default()
    }

    fn parse_download(&mut self, line: &str) -> Vec<YtDlpEvent> {
        if let Some(caps) = DEST_RE.captures(line) {
            let mut events = self.finish();
            self.current_file = Some(caps[1].trim().to_string());
            self.downloading = true;
            events.push(YtDlpEvent::Message(line.to_string()));
            return events;
        }

        if let Some(caps) = ALREADY_RE.captures(line) {
            let file = caps[1].trim().to_string();
            self.current_file = Some(file.clone());
            self.downloading = false;
            self.completed_downloads += 1;
            return vec![YtDlpEvent::DownloadComplete(file)];
        }

        if COMPLETE_RE.is_match(line) {
            self.downloading = false;
            self.completed_downloads += 1;
            let file = self
                .current_file
                .clone()
                .unwrap_or_else(|| line.to_string());
            return vec![YtDlpEvent::DownloadComplete(file)];
        }

        if let Some(progress) = self.parse_progress(line) {
            self.downloading = true;
            return vec![YtDlpEvent::Progress(progress)];
        }

        vec![YtDlpEvent::Message(line.to_string())]
    }

    fn parse_progress(&self, line: &str) -> Option<DownloadProgress> {
        let caps = PROGRESS_RE.captures(line)?;
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        if !(0.0..=100.0).contains(&percent) {
            return None;
        }

        let fragments = match (caps.get(5), caps.get(6)) {
            (Some(current), Some(total)) => current
                .as_str()
                .parse()
                .ok()
                .zip(total.as_str().parse().ok()),
            _ => None,
        };

        Some(DownloadProgress {
            percent,
            total_size: caps.get(2).map(|m| m.as_str().replace(' ', "")),
            speed: caps.get(3).map(|m| m.as_str().to_string()),
            eta: caps.get(4).map(|m| m.as_str().to_string()),
            fragments,
            file: self.current_file.clone(),
        })
    }
}
