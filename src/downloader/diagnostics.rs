// Failure diagnostics - classifies the stderr of a failed yt-dlp run
//
// The presentation layer uses the reason to turn a raw stderr dump into
// an actionable message. Classification is a best-effort substring match.

use serde::{Deserialize, Serialize};

/// Why a yt-dlp run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// HTTP 403 Forbidden
    Forbidden,

    /// HTTP 429 or explicit rate limiting
    RateLimited,

    /// Not available in the caller's region
    GeoBlocked,

    /// Needs a signed-in, age-verified account
    AgeRestricted,

    /// Private video
    Private,

    /// Removed, deleted or otherwise gone
    Unavailable,

    /// No extractor handles the URL
    UnsupportedUrl,

    /// Socket timeout or unreachable network
    NetworkTimeout,

    /// The `-f` selector matched nothing
    FormatUnavailable,

    /// Post-processing needs ffmpeg/ffprobe and it is missing
    MissingFfmpeg,

    /// Something failed, but no known pattern matched
    Unknown,
}

impl FailureReason {
    /// Retrying later, or with other network settings, may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Forbidden | Self::RateLimited | Self::NetworkTimeout
        )
    }

    /// Nothing the user can change will make this input download
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unavailable | Self::UnsupportedUrl)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::RateLimited => "Too many requests, rate limited",
            Self::GeoBlocked => "Not available in your country",
            Self::AgeRestricted => "Age-restricted content",
            Self::Private => "Private video",
            Self::Unavailable => "Video unavailable",
            Self::UnsupportedUrl => "Unsupported URL",
            Self::NetworkTimeout => "Network timeout",
            Self::FormatUnavailable => "Requested format is not available",
            Self::MissingFfmpeg => "ffmpeg is required but was not found",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Analyze captured stderr and return the most specific reason
pub fn diagnose_error(stderr: &str) -> Option<FailureReason> {
    if stderr.trim().is_empty() {
        return None;
    }

    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") {
        return Some(FailureReason::UnsupportedUrl);
    }

    if lower.contains("requested format is not available") {
        return Some(FailureReason::FormatUnavailable);
    }

    if lower.contains("ffmpeg not found")
        || lower.contains("ffprobe and ffmpeg not found")
        || lower.contains("ffmpeg is not installed")
    {
        return Some(FailureReason::MissingFfmpeg);
    }

    if lower.contains("sign in to confirm your age") || lower.contains("age-restricted") {
        return Some(FailureReason::AgeRestricted);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(FailureReason::Private);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
    {
        return Some(FailureReason::Unavailable);
    }

    if lower.contains("not available in your country") || lower.contains("geo restrict") {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Forbidden);
    }

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("network is unreachable")
        || lower.contains("connection refused")
    {
        return Some(FailureReason::NetworkTimeout);
    }

    Some(FailureReason::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stderr_has_no_diagnosis() {
        assert_eq!(diagnose_error(""), None);
        assert_eq!(diagnose_error("  \n"), None);
    }

    #[test]
    fn test_403_detection() {
        let error = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(diagnose_error(error), Some(FailureReason::Forbidden));
    }

    #[test]
    fn test_rate_limit_detection() {
        let error = "ERROR: HTTP Error 429: Too Many Requests";
        assert_eq!(diagnose_error(error), Some(FailureReason::RateLimited));
    }

    #[test]
    fn test_unsupported_url_detection() {
        let error = "ERROR: Unsupported URL: https://example.com/page";
        assert_eq!(diagnose_error(error), Some(FailureReason::UnsupportedUrl));
        assert!(FailureReason::UnsupportedUrl.is_permanent());
    }

    #[test]
    fn test_format_unavailable_detection() {
        let error = "ERROR: [youtube] abc: Requested format is not available. Use --list-formats";
        assert_eq!(diagnose_error(error), Some(FailureReason::FormatUnavailable));
    }

    #[test]
    fn test_age_restricted_detection() {
        let error = "ERROR: [youtube] abc: Sign in to confirm your age";
        assert_eq!(diagnose_error(error), Some(FailureReason::AgeRestricted));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let reason = diagnose_error("ERROR: The read operation timed out").unwrap();
        assert_eq!(reason, FailureReason::NetworkTimeout);
        assert!(reason.is_retryable());
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(diagnose_error("something odd"), Some(FailureReason::Unknown));
    }
}
