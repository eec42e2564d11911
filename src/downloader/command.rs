// Command builder - accumulates validated yt-dlp arguments for one invocation

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::errors::YtDlpError;
use super::options::OptionRegistry;

pub const DEFAULT_FORMAT: &str = "best";
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const NEWLINE_FLAG: &str = "--newline";

/// Escape double quotes and backticks before a value is embedded in an argument.
///
/// Arguments are passed to the process directly, never through a shell; this
/// only keeps quote and backtick characters from being read as delimiters.
pub fn escape_value(input: &str) -> String {
    input.replace('"', "\\\"").replace('`', "\\`")
}

fn require(value: &str, field: &'static str) -> Result<(), YtDlpError> {
    if value.trim().is_empty() {
        return Err(YtDlpError::EmptyArgument { field });
    }
    Ok(())
}

/// Final, immutable argument list for one yt-dlp invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    args: Vec<String>,
    output_folder: PathBuf,
}

impl CommandSpec {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

/// Chainable builder for download commands.
///
/// Flags accumulate until [`CommandBuilder::take_spec`] turns them into a
/// [`CommandSpec`]; the accumulator is then empty again, while format,
/// output folder and output template stay configured for the next run.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    registry: Arc<OptionRegistry>,
    args: Vec<String>,
    format: String,
    output_folder: PathBuf,
    output_template: Option<String>,
    default_template: String,
}

impl CommandBuilder {
    pub fn new(registry: Arc<OptionRegistry>) -> Self {
        Self {
            registry,
            args: Vec::new(),
            format: DEFAULT_FORMAT.to_string(),
            output_folder: PathBuf::from("."),
            output_template: None,
            default_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
        }
    }

    /// Template used when no explicit output template was set
    pub fn with_default_template(mut self, template: impl Into<String>) -> Self {
        self.default_template = template.into();
        self
    }

    fn push(&mut self, token: impl Into<String>) -> &mut Self {
        self.args.push(token.into());
        self
    }

    fn push_value(&mut self, flag: &str, value: &str) -> &mut Self {
        self.args.push(flag.to_string());
        self.args.push(escape_value(value));
        self
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn output_template(&self) -> Option<&str> {
        self.output_template.as_deref()
    }

    /// Tokens accumulated so far
    pub fn pending_args(&self) -> &[String] {
        &self.args
    }

    pub fn preview_command(&self) -> String {
        self.args.join(" ").trim().to_string()
    }

    pub fn version(&mut self) -> &mut Self {
        self.push("--version")
    }

    pub fn update(&mut self) -> &mut Self {
        self.push("--update")
    }

    pub fn extract_audio(&mut self, audio_format: &str) -> Result<&mut Self, YtDlpError> {
        require(audio_format, "Audio format")?;
        self.push("--extract-audio");
        Ok(self.push_value("--audio-format", audio_format))
    }

    pub fn embed_metadata(&mut self) -> &mut Self {
        self.push("--embed-metadata")
    }

    pub fn embed_thumbnail(&mut self) -> &mut Self {
        self.push("--embed-thumbnail")
    }

    pub fn set_output_template(&mut self, template: &str) -> Result<&mut Self, YtDlpError> {
        require(template, "Output template")?;
        self.output_template = Some(template.replace('\\', "/").trim().to_string());
        Ok(self)
    }

    pub fn select_playlist_items(&mut self, items: &str) -> Result<&mut Self, YtDlpError> {
        require(items, "Playlist items")?;
        Ok(self.push_value("--playlist-items", items))
    }

    pub fn set_download_rate(&mut self, rate: &str) -> Result<&mut Self, YtDlpError> {
        require(rate, "Download rate")?;
        Ok(self.push_value("--limit-rate", rate))
    }

    pub fn use_proxy(&mut self, proxy: &str) -> Result<&mut Self, YtDlpError> {
        require(proxy, "Proxy URL")?;
        Ok(self.push_value("--proxy", proxy))
    }

    pub fn simulate(&mut self) -> &mut Self {
        self.push("--simulate")
    }

    pub fn write_metadata_to_json(&mut self) -> &mut Self {
        self.push("--write-info-json")
    }

    /// `languages` is a yt-dlp language list, e.g. "en,de" or "all"
    pub fn download_subtitles(&mut self, languages: &str) -> Result<&mut Self, YtDlpError> {
        require(languages, "Languages")?;
        self.push("--write-subs");
        Ok(self.push_value("--sub-langs", languages))
    }

    pub fn set_format(&mut self, format: &str) -> Result<&mut Self, YtDlpError> {
        require(format, "Format")?;
        self.format = format.trim().to_string();
        Ok(self)
    }

    pub fn download_thumbnails(&mut self) -> &mut Self {
        self.push("--write-thumbnail")
    }

    pub fn download_livestream(&mut self, from_start: bool) -> &mut Self {
        if from_start {
            self.push("--live-from-start")
        } else {
            self.push("--no-live-from-start")
        }
    }

    pub fn set_retries(&mut self, retries: &str) -> Result<&mut Self, YtDlpError> {
        require(retries, "Retries")?;
        Ok(self.push_value("--retries", retries))
    }

    pub fn download_sections(&mut self, time_ranges: &str) -> Result<&mut Self, YtDlpError> {
        require(time_ranges, "Time ranges")?;
        Ok(self.push_value("--download-sections", time_ranges))
    }

    pub fn concatenate_videos(&mut self) -> &mut Self {
        self.push("--concat-playlist");
        self.push("always")
    }

    /// The replacement may be empty, field and regex may not
    pub fn replace_metadata(
        &mut self,
        field: &str,
        regex: &str,
        replacement: &str,
    ) -> Result<&mut Self, YtDlpError> {
        require(field, "Metadata field")?;
        require(regex, "Metadata regex")?;
        self.push("--replace-in-metadata");
        self.push(escape_value(field));
        self.push(escape_value(regex));
        Ok(self.push(escape_value(replacement)))
    }

    pub fn skip_downloaded(&mut self) -> &mut Self {
        self.push_value("--download-archive", "downloaded.txt")
    }

    pub fn set_user_agent(&mut self, user_agent: &str) -> Result<&mut Self, YtDlpError> {
        require(user_agent, "User agent")?;
        Ok(self.push_value("--user-agent", user_agent))
    }

    pub fn log_to_file(&mut self, log_file: &str) -> Result<&mut Self, YtDlpError> {
        require(log_file, "Log file path")?;
        Ok(self.push_value("--write-log", log_file))
    }

    pub fn use_cookies(&mut self, cookie_file: &str) -> Result<&mut Self, YtDlpError> {
        require(cookie_file, "Cookie file path")?;
        Ok(self.push_value("--cookies", cookie_file))
    }

    pub fn set_referer(&mut self, referer: &str) -> Result<&mut Self, YtDlpError> {
        require(referer, "Referer URL")?;
        Ok(self.push_value("--referer", referer))
    }

    pub fn merge_playlist_into_single_video(
        &mut self,
        format: &str,
    ) -> Result<&mut Self, YtDlpError> {
        require(format, "Merge format")?;
        Ok(self.push_value("--merge-output-format", format))
    }

    pub fn set_custom_header(&mut self, header: &str, value: &str) -> Result<&mut Self, YtDlpError> {
        require(header, "Header")?;
        require(value, "Header value")?;
        self.push("--add-header");
        Ok(self.push(format!("{}:{}", escape_value(header), escape_value(value))))
    }

    /// Cap the video height, e.g. "720"
    pub fn set_resolution(&mut self, resolution: &str) -> Result<&mut Self, YtDlpError> {
        require(resolution, "Resolution")?;
        self.push("--format");
        Ok(self.push(format!("bestvideo[height<={}]", escape_value(resolution))))
    }

    pub fn extract_metadata_only(&mut self) -> &mut Self {
        self.push("--dump-json")
    }

    pub fn download_audio_and_video_separately(&mut self) -> &mut Self {
        self.push("--write-video");
        self.push("--write-audio")
    }

    pub fn post_process_files(&mut self, operation: &str) -> Result<&mut Self, YtDlpError> {
        require(operation, "Operation")?;
        Ok(self.push_value("--postprocessor-args", operation))
    }

    pub fn set_keep_temp_files(&mut self, keep: bool) -> &mut Self {
        if keep {
            self.push("-k");
        }
        self
    }

    pub fn set_download_timeout(&mut self, timeout: &str) -> Result<&mut Self, YtDlpError> {
        require(timeout, "Timeout")?;
        Ok(self.push_value("--download-timeout", timeout))
    }

    pub fn set_authentication(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<&mut Self, YtDlpError> {
        require(username, "Username")?;
        require(password, "Password")?;
        self.push_value("--username", username);
        Ok(self.push_value("--password", password))
    }

    pub fn set_output_folder(&mut self, folder: impl AsRef<Path>) -> Result<&mut Self, YtDlpError> {
        let folder = folder.as_ref();
        require(&folder.to_string_lossy(), "Output folder")?;
        self.output_folder = folder.to_path_buf();
        Ok(self)
    }

    pub fn disable_ads(&mut self) -> &mut Self {
        self.push("--no-ads")
    }

    pub fn download_live_stream_real_time(&mut self) -> &mut Self {
        self.push("--live-from-start");
        self.push_value("--recode-video", "mp4")
    }

    /// Append a free-form fragment such as `"--sleep-interval 5"`.
    ///
    /// The first token must be a flag known to the option registry; otherwise
    /// nothing is appended and `UnrecognizedOption` is returned.
    pub fn add_custom_command(&mut self, command: &str) -> Result<&mut Self, YtDlpError> {
        require(command, "Custom command")?;

        let parts: Vec<&str> = command.split_whitespace().collect();
        let recognized = parts
            .first()
            .map(|first| self.registry.is_recognized(&escape_value(first)))
            .unwrap_or(false);
        if !recognized {
            tracing::error!("[YtDlp] Invalid option: {}", command);
            return Err(YtDlpError::UnrecognizedOption(command.to_string()));
        }

        for part in parts {
            self.push(escape_value(part));
        }
        Ok(self)
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<&mut Self, YtDlpError> {
        if timeout.is_zero() {
            return Err(YtDlpError::InvalidArgument {
                field: "Timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        let seconds = timeout.as_secs_f64();
        Ok(self.push_value("--timeout", &seconds.to_string()))
    }

    /// Full output path template: folder joined with the configured template
    pub fn resolved_output_template(&self) -> String {
        let template = self
            .output_template
            .as_deref()
            .unwrap_or(&self.default_template);
        self.output_folder
            .join(template)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Finish the command for `url` and reset the accumulator.
    ///
    /// On error nothing is consumed.
    pub fn take_spec(&mut self, url: &str) -> Result<CommandSpec, YtDlpError> {
        require(url, "URL")?;

        let template = self.resolved_output_template();
        let mut args = mem::take(&mut self.args);
        // one progress update per line instead of \r-overwritten ticks
        if !args.iter().any(|a| a == NEWLINE_FLAG) {
            args.push(NEWLINE_FLAG.to_string());
        }
        args.extend([
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            template,
            escape_value(url),
        ]);

        Ok(CommandSpec {
            args,
            output_folder: self.output_folder.clone(),
        })
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(Arc::new(OptionRegistry::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn builder() -> CommandBuilder {
        CommandBuilder::default()
    }

    fn contains_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_value("a`b`"), r"a\`b\`");
        assert_eq!(escape_value("plain"), "plain");
    }

    #[test]
    fn test_setters_append_flag_and_escaped_value() {
        let mut b = builder();
        b.use_proxy("socks5://127.0.0.1:1080").unwrap();
        b.set_download_rate("50K").unwrap();
        b.set_retries("10").unwrap();
        b.select_playlist_items("1,3,5-7").unwrap();
        b.download_sections("*10:15-20:00").unwrap();
        b.set_user_agent(r#"Mozilla "X" `id`"#).unwrap();

        let args = b.pending_args();
        assert!(contains_pair(args, "--proxy", "socks5://127.0.0.1:1080"));
        assert!(contains_pair(args, "--limit-rate", "50K"));
        assert!(contains_pair(args, "--retries", "10"));
        assert!(contains_pair(args, "--playlist-items", "1,3,5-7"));
        assert!(contains_pair(args, "--download-sections", "*10:15-20:00"));
        assert!(contains_pair(args, "--user-agent", r#"Mozilla \"X\" \`id\`"#));
    }

    #[test]
    fn test_custom_header_is_escaped() {
        let mut b = builder();
        b.set_custom_header("X-Token", r#"a"b"#).unwrap();
        assert!(contains_pair(b.pending_args(), "--add-header", r#"X-Token:a\"b"#));
    }

    #[test]
    fn test_blank_inputs_rejected_without_mutation() {
        let mut b = builder();
        b.embed_metadata();
        let before = b.pending_args().to_vec();

        for blank in ["", "   ", "\t\n"] {
            assert!(matches!(
                b.use_proxy(blank),
                Err(YtDlpError::EmptyArgument { field: "Proxy URL" })
            ));
            assert!(b.set_download_rate(blank).is_err());
            assert!(b.set_retries(blank).is_err());
            assert!(b.download_sections(blank).is_err());
            assert!(b.select_playlist_items(blank).is_err());
            assert!(b.extract_audio(blank).is_err());
            assert!(b.set_custom_header("X-A", blank).is_err());
            assert!(b.set_custom_header(blank, "v").is_err());
            assert!(b.set_authentication("user", blank).is_err());
            assert!(b.replace_metadata("title", blank, "x").is_err());
            assert!(b.add_custom_command(blank).is_err());
            assert!(b.set_output_template(blank).is_err());
            assert!(b.set_format(blank).is_err());
        }

        assert_eq!(b.pending_args(), before.as_slice());
        assert_eq!(b.format(), DEFAULT_FORMAT);
        assert!(b.output_template().is_none());
    }

    #[test]
    fn test_replace_metadata_allows_empty_replacement() {
        let mut b = builder();
        b.replace_metadata("title", "[ _]+", "").unwrap();
        assert_eq!(
            b.pending_args(),
            &["--replace-in-metadata", "title", "[ _]+", ""]
        );
    }

    #[test]
    fn test_custom_command_validated_against_registry() {
        let mut b = builder();
        b.add_custom_command("--sleep-interval 5").unwrap();
        assert_eq!(b.pending_args(), &["--sleep-interval", "5"]);

        let err = b.add_custom_command("--exec rm -rf /").unwrap_err();
        assert!(matches!(err, YtDlpError::UnrecognizedOption(ref c) if c == "--exec rm -rf /"));
        assert_eq!(b.pending_args(), &["--sleep-interval", "5"]);
    }

    #[test]
    fn test_custom_command_uses_injected_registry() {
        let mut registry = OptionRegistry::empty();
        registry.extend(["--impersonate"]);
        let mut b = CommandBuilder::new(Arc::new(registry));
        assert!(b.add_custom_command("--proxy x").is_err());
        b.add_custom_command("--impersonate chrome").unwrap();
        assert_eq!(b.pending_args(), &["--impersonate", "chrome"]);
    }

    #[test]
    fn test_set_timeout_must_be_positive() {
        let mut b = builder();
        assert!(matches!(
            b.set_timeout(Duration::ZERO),
            Err(YtDlpError::InvalidArgument { field: "Timeout", .. })
        ));
        b.set_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(b.pending_args(), &["--timeout", "30"]);
    }

    #[test]
    fn test_take_spec_appends_format_template_and_url() {
        let mut b = builder();
        b.set_format("bv*+ba/b").unwrap();
        b.set_output_folder("downloads").unwrap();
        b.embed_thumbnail();

        let spec = b.take_spec(URL).unwrap();
        assert_eq!(
            spec.args(),
            &[
                "--embed-thumbnail",
                "--newline",
                "-f",
                "bv*+ba/b",
                "-o",
                "downloads/%(title)s.%(ext)s",
                URL,
            ]
        );
        assert_eq!(spec.output_folder(), Path::new("downloads"));
    }

    #[test]
    fn test_output_template_normalizes_backslashes() {
        let mut b = builder();
        b.set_output_folder("out").unwrap();
        b.set_output_template(r" %(uploader)s\%(title)s.%(ext)s ").unwrap();
        assert_eq!(b.output_template(), Some("%(uploader)s/%(title)s.%(ext)s"));
        assert_eq!(
            b.resolved_output_template(),
            "out/%(uploader)s/%(title)s.%(ext)s"
        );
    }

    #[test]
    fn test_accumulator_reset_after_take() {
        let mut b = builder();
        b.use_proxy("http://proxy:8080").unwrap();
        b.set_retries("3").unwrap();
        b.set_format("worst").unwrap();
        let first = b.take_spec(URL).unwrap();
        assert!(first.args().contains(&"--proxy".to_string()));

        assert!(b.pending_args().is_empty());
        let second = b.take_spec("https://example.com/v").unwrap();
        assert!(!second.args().contains(&"--proxy".to_string()));
        assert!(!second.args().contains(&"--retries".to_string()));
        // configured fields survive the reset
        assert!(contains_pair(second.args(), "-f", "worst"));
    }

    #[test]
    fn test_take_spec_requests_newline_progress_once() {
        let mut b = builder();
        let spec = b.take_spec(URL).unwrap();
        assert_eq!(spec.args().iter().filter(|a| *a == "--newline").count(), 1);

        b.add_custom_command("--newline").unwrap();
        let spec = b.take_spec(URL).unwrap();
        assert_eq!(spec.args().iter().filter(|a| *a == "--newline").count(), 1);
    }

    #[test]
    fn test_take_spec_rejects_blank_url_without_consuming() {
        let mut b = builder();
        b.simulate();
        assert!(b.take_spec("  ").is_err());
        assert_eq!(b.pending_args(), &["--simulate"]);
    }

    #[test]
    fn test_url_is_escaped() {
        let mut b = builder();
        let spec = b.take_spec("https://example.com/?q=\"x\"").unwrap();
        assert_eq!(spec.args().last().unwrap(), "https://example.com/?q=\\\"x\\\"");
    }

    #[test]
    fn test_flag_only_helpers() {
        let mut b = builder();
        b.concatenate_videos()
            .skip_downloaded()
            .download_livestream(false)
            .set_keep_temp_files(true)
            .download_live_stream_real_time();
        assert_eq!(
            b.preview_command(),
            "--concat-playlist always --download-archive downloaded.txt --no-live-from-start -k --live-from-start --recode-video mp4"
        );
    }
}
