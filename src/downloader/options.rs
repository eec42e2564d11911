// Option registry - the closed vocabulary of flags accepted in custom commands

use std::collections::HashSet;
use std::fmt;

/// Category a recognized flag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionCategory {
    General,
    Authentication,
    Network,
    DownloadArchive,
    PostProcessing,
    SubtitleThumbnail,
    Debug,
    Advanced,
    Other,
}

impl OptionCategory {
    pub const ALL: [OptionCategory; 9] = [
        Self::General,
        Self::Authentication,
        Self::Network,
        Self::DownloadArchive,
        Self::PostProcessing,
        Self::SubtitleThumbnail,
        Self::Debug,
        Self::Advanced,
        Self::Other,
    ];

    /// Built-in flags of this category
    pub fn builtin_flags(&self) -> &'static [&'static str] {
        match self {
            Self::General => GENERAL,
            Self::Authentication => AUTHENTICATION,
            Self::Network => NETWORK,
            Self::DownloadArchive => DOWNLOAD_ARCHIVE,
            Self::PostProcessing => POST_PROCESSING,
            Self::SubtitleThumbnail => SUBTITLE_THUMBNAIL,
            Self::Debug => DEBUG,
            Self::Advanced => ADVANCED,
            Self::Other => OTHER,
        }
    }
}

impl fmt::Display for OptionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::DownloadArchive => "download-archive",
            Self::PostProcessing => "post-processing",
            Self::SubtitleThumbnail => "subtitle-thumbnail",
            Self::Debug => "debug",
            Self::Advanced => "advanced",
            Self::Other => "other",
        };
        write!(f, "{}", name)
    }
}

const GENERAL: &[&str] = &[
    "--format",
    "--output",
    "-o",
    "--no-overwrites",
    "--continue",
    "--no-continue",
    "--ignore-errors",
    "--no-part",
    "--no-mtime",
    "--write-description",
    "--write-info-json",
    "--write-annotations",
    "--write-thumbnail",
    "--write-all-thumbnails",
    "--write-sub",
    "--write-auto-sub",
    "--sub-format",
    "--sub-langs",
    "--skip-download",
    "--no-playlist",
    "--yes-playlist",
    "--playlist-items",
    "--playlist-start",
    "--playlist-end",
    "--match-title",
    "--reject-title",
    "--no-check-certificate",
    "--user-agent",
    "--referer",
    "--cookies",
    "--add-header",
    "--limit-rate",
    "--retries",
    "--fragment-retries",
    "--timeout",
    "--source-address",
    "--force-ipv4",
    "--force-ipv6",
];

const AUTHENTICATION: &[&str] = &[
    "--username",
    "--password",
    "--twofactor",
    "--netrc",
    "--netrc-location",
    "--video-password",
];

const NETWORK: &[&str] = &[
    "--proxy",
    "--geo-bypass",
    "--geo-bypass-country",
    "--geo-bypass-ip-block",
    "--no-geo-bypass",
];

const DOWNLOAD_ARCHIVE: &[&str] = &[
    "--download-archive",
    "--max-downloads",
    "--min-filesize",
    "--max-filesize",
    "--date",
    "--datebefore",
    "--dateafter",
    "--match-filter",
];

const POST_PROCESSING: &[&str] = &[
    "--extract-audio",
    "--audio-format",
    "--audio-quality",
    "--recode-video",
    "--postprocessor-args",
    "--embed-subs",
    "--embed-thumbnail",
    "--embed-metadata",
    "--embed-chapters",
    "--embed-info-json",
    "--convert-subs",
    "--merge-output-format",
];

const SUBTITLE_THUMBNAIL: &[&str] = &[
    "--write-sub",
    "--write-auto-sub",
    "--sub-lang",
    "--sub-format",
    "--write-thumbnail",
    "--write-all-thumbnails",
    "--convert-subs",
    "--embed-subs",
    "--embed-thumbnail",
];

const DEBUG: &[&str] = &[
    "--simulate",
    "--skip-download",
    "--print",
    "--quiet",
    "--no-warnings",
    "--verbose",
    "--dump-json",
    "--force-write-archive",
    "--no-progress",
    "--newline",
    "--write-log",
];

const ADVANCED: &[&str] = &[
    "--download-sections",
    "--concat-playlist",
    "--replace-in-metadata",
    "--call-home",
    "--write-pages",
    "--sleep-interval",
    "--max-sleep-interval",
    "--min-sleep-interval",
    "--sleep-subtitles",
    "--write-link",
    "--live-from-start",
    "--no-live-from-start",
    "--no-ads",
    "--force-keyframes-at-cuts",
    "--remux-video",
    "--no-color",
    "--paths",
    "--output-na-placeholder",
    "--playlist-random",
    "--sponsorblock-mark",
    "--sponsorblock-remove",
    "--sponsorblock-chapter-title",
];

const OTHER: &[&str] = &[
    "--config-location",
    "--write-video",
    "--write-audio",
    "--no-post-overwrites",
    "--break-on-existing",
    "--break-per-input",
    "--windows-filenames",
    "--restrict-filenames",
    "--ffmpeg-location",
    "--js-runtimes",
    "--remote-components",
];

/// Union of the accepted flag categories.
///
/// Pure set-membership data; builders share one instance through the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRegistry {
    flags: HashSet<String>,
}

impl OptionRegistry {
    pub fn empty() -> Self {
        Self {
            flags: HashSet::new(),
        }
    }

    /// Registry holding only the given categories
    pub fn with_categories(categories: &[OptionCategory]) -> Self {
        let mut registry = Self::empty();
        for category in categories {
            registry.extend(category.builtin_flags().iter().copied());
        }
        registry
    }

    /// Add extra flags, e.g. ones introduced by a newer yt-dlp
    pub fn extend<I, S>(&mut self, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
    }

    pub fn is_recognized(&self, option: &str) -> bool {
        self.flags.contains(option)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl Default for OptionRegistry {
    fn default() -> Self {
        Self::with_categories(&OptionCategory::ALL)
    }
}
