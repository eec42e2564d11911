// Format table parser - reads the `yt-dlp -F` listing into VideoFormat rows
//
// The listing is not a formal protocol. Columns are consumed left to right
// with a fixed order of optional fields, each accepted only if its pattern
// matches; anything left over becomes `more_info`.

use std::collections::HashSet;

use regex::Regex;

use super::models::VideoFormat;

lazy_static::lazy_static! {
    static ref ROW_RE: Regex = Regex::new(r"^\S+\s+\S+").unwrap();
    static ref DIGITS_RE: Regex = Regex::new(r"^\d+$").unwrap();
    static ref CHANNELS_RE: Regex = Regex::new(r"^\d+\|$").unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"^~?\d+\.\d+MiB$").unwrap();
    static ref BITRATE_RE: Regex = Regex::new(r"^\d+k$").unwrap();
    static ref CODEC_RE: Regex = Regex::new(r"^[a-zA-Z0-9\.]+$").unwrap();
}

const SECTION_MARKER: &str = "[info] Available formats";
const PROTOCOLS: [&str; 3] = ["https", "m3u8", "mhtml"];

/// Why a single row was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowError {
    MissingExtension,
    MissingResolution,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingExtension => write!(f, "missing extension"),
            Self::MissingResolution => write!(f, "missing resolution"),
        }
    }
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("---") || trimmed.starts_with('\u{2500}')
}

fn is_column_bar(token: &str) -> bool {
    token == "|" || token == "\u{2502}"
}

/// Parse the stdout of a `--list-formats` run.
///
/// Never fails: malformed rows are logged and skipped, a repeated format ID
/// keeps its first row.
pub fn parse_formats(output: &str) -> Vec<VideoFormat> {
    let mut formats: Vec<VideoFormat> = Vec::new();
    if output.trim().is_empty() {
        tracing::warn!("[Formats] Empty or null yt-dlp output");
        return formats;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut in_section = false;

    for raw in output.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        tracing::debug!("[Formats] Parsing line: {}", line);

        if line.contains(SECTION_MARKER) {
            in_section = true;
            continue;
        }

        if !in_section || line.contains("RESOLUTION") || is_separator_row(line) {
            continue;
        }

        if !ROW_RE.is_match(line) {
            tracing::debug!("[Formats] Stopping format parsing at non-format line: {}", line);
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            tracing::warn!("[Formats] Skipping line (too few parts): {}", line);
            continue;
        }

        if seen.contains(parts[0]) {
            tracing::warn!("[Formats] Skipping duplicate format ID: {}", parts[0]);
            continue;
        }

        match parse_row(&parts) {
            Ok(format) => {
                seen.insert(format.id.clone());
                formats.push(format);
            }
            Err(e) => {
                tracing::warn!("[Formats] Failed to parse line '{}': {}", line, e);
            }
        }
    }

    tracing::info!("[Formats] Parsed {} formats", formats.len());
    formats
}

/// Consume one row's tokens in column order
fn parse_row(parts: &[&str]) -> Result<VideoFormat, RowError> {
    let mut format = VideoFormat::default();
    let mut index = 0;

    let at = |i: usize| parts.get(i).copied();
    let is_pair = |i: usize, first: &str, second: &str| at(i) == Some(first) && at(i + 1) == Some(second);

    format.id = parts[index].to_string();
    index += 1;

    format.extension = at(index).ok_or(RowError::MissingExtension)?.to_string();
    index += 1;

    if is_pair(index, "audio", "only") {
        format.resolution = "audio only".to_string();
        index += 2;
    } else if let Some(token) = at(index) {
        format.resolution = token.to_string();
        index += 1;
    } else {
        return Err(RowError::MissingResolution);
    }

    // FPS, never present for audio-only rows
    if !format.is_audio_only() {
        if let Some(token) = at(index).filter(|t| DIGITS_RE.is_match(t)) {
            format.fps = Some(token.to_string());
            index += 1;
        }
    }

    if let Some(token) = at(index).filter(|t| CHANNELS_RE.is_match(t) || DIGITS_RE.is_match(t)) {
        format.channels = Some(token.trim_end_matches('|').to_string());
        index += 1;
    }

    if at(index).is_some_and(is_column_bar) {
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| SIZE_RE.is_match(t)) {
        format.file_size = Some(token.to_string());
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| BITRATE_RE.is_match(t)) {
        format.tbr = Some(token.to_string());
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| PROTOCOLS.contains(t)) {
        format.protocol = Some(token.to_string());
        index += 1;
    }

    if at(index).is_some_and(is_column_bar) {
        index += 1;
    }

    if is_pair(index, "audio", "only") {
        format.vcodec = Some("audio only".to_string());
        index += 2;
    } else if at(index) == Some("images") {
        format.vcodec = Some("images".to_string());
        index += 1;
    } else if let Some(token) = at(index).filter(|t| CODEC_RE.is_match(t)) {
        format.vcodec = Some(token.to_string());
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| BITRATE_RE.is_match(t)) {
        format.vbr = Some(token.to_string());
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| CODEC_RE.is_match(t) || *t == "unknown") {
        format.acodec = Some(token.to_string());
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| BITRATE_RE.is_match(t)) {
        format.abr = Some(token.to_string());
        index += 1;
    }

    if let Some(token) = at(index).filter(|t| BITRATE_RE.is_match(t)) {
        format.asr = Some(token.to_string());
        index += 1;
    }

    if index < parts.len() {
        let rest = parts[index..].join(" ");
        let rest = rest
            .strip_prefix('|')
            .or_else(|| rest.strip_prefix('\u{2502}'))
            .unwrap_or(&rest)
            .trim();
        if !rest.is_empty() {
            format.more_info = Some(rest.to_string());
        }
    }

    if format.is_storyboard() {
        format.acodec = None;
        format.more_info = Some("storyboard".to_string());
    }

    Ok(format)
}
