// yt-dlp facade - ties config, builder, runner and parsers together

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::YtDlpConfig;
use crate::downloader::batch::{self, BatchReport};
use crate::downloader::command::{escape_value, CommandBuilder};
use crate::downloader::errors::YtDlpError;
use crate::downloader::formats::parse_formats;
use crate::downloader::models::{EventSender, Metadata, UpdateStatus, VideoFormat};
use crate::downloader::process::{ProcessOutput, ProcessRunner};
use crate::downloader::traits::UrlExecutor;

/// Handle on a resolved yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    runner: ProcessRunner,
    config: Arc<YtDlpConfig>,
}

impl YtDlp {
    /// Resolve the executable now; a missing one fails here, not on first use
    pub fn new(config: YtDlpConfig) -> Result<Self, YtDlpError> {
        let program = config.resolve_executable()?;
        tracing::info!("[YtDlp] Using executable {}", program.display());
        Ok(Self {
            runner: ProcessRunner::new(program),
            config: Arc::new(config),
        })
    }

    pub fn executable(&self) -> &Path {
        self.runner.program()
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Builder seeded with the configured format, folder and template
    pub fn command(&self) -> Result<CommandBuilder, YtDlpError> {
        self.config.builder()
    }

    /// Download `url` with whatever `builder` has accumulated.
    ///
    /// Creates the output folder if needed. The builder's flags are consumed
    /// and it is ready for the next URL afterwards.
    pub async fn execute(
        &self,
        builder: &mut CommandBuilder,
        url: &str,
        events: Option<&EventSender>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, YtDlpError> {
        require_url(url)?;
        ensure_output_folder(builder.output_folder()).await?;
        self.dispatch(builder, url, events, cancel).await
    }

    async fn dispatch(
        &self,
        builder: &mut CommandBuilder,
        url: &str,
        events: Option<&EventSender>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, YtDlpError> {
        let spec = builder.take_spec(url)?;
        tracing::info!("[YtDlp] Starting download for URL: {}", url);
        self.runner.run(spec.args(), events, cancel).await
    }

    /// Installed version string, e.g. `2024.08.06`
    pub async fn version(&self, cancel: &CancellationToken) -> Result<String, YtDlpError> {
        let output = self.runner.run(&["--version".to_string()], None, cancel).await?;
        let version = output.stdout.trim().to_string();
        tracing::info!("[YtDlp] yt-dlp version: {}", version);
        Ok(version)
    }

    /// Self-update via `-U`
    pub async fn update(&self, cancel: &CancellationToken) -> Result<UpdateStatus, YtDlpError> {
        let output = self.runner.run(&["-U".to_string()], None, cancel).await?;
        let status = UpdateStatus::from_output(&output.stdout);
        tracing::info!("[YtDlp] {}", status.message());
        Ok(status)
    }

    /// Single-video metadata from `--dump-json`
    pub async fn metadata(&self, url: &str, cancel: &CancellationToken) -> Result<Metadata, YtDlpError> {
        require_url(url)?;
        let args = ["--dump-json".to_string(), escape_value(url)];
        let output = self.runner.run(&args, None, cancel).await?;

        Metadata::from_json(&output.stdout).map_err(|e| {
            tracing::error!("[YtDlp] Failed to parse metadata for {}: {}", url, e);
            YtDlpError::Metadata(e)
        })
    }

    /// Formats listed by `-F`
    pub async fn available_formats(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoFormat>, YtDlpError> {
        require_url(url)?;
        let args = ["-F".to_string(), escape_value(url)];
        let output = self.runner.run(&args, None, cancel).await?;

        let formats = parse_formats(&output.stdout);
        tracing::info!("[YtDlp] {} formats available for {}", formats.len(), url);
        Ok(formats)
    }

    /// Download every URL in turn. Each item starts from a copy of `builder`.
    pub async fn execute_batch(
        &self,
        builder: &CommandBuilder,
        urls: &[String],
        events: Option<EventSender>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, YtDlpError> {
        if urls.is_empty() {
            return Err(YtDlpError::EmptyBatch);
        }
        ensure_output_folder(builder.output_folder()).await?;

        let job = self.batch_job(builder, events);
        batch::run_sequential(&job, urls, cancel).await
    }

    /// Download URLs concurrently, at most `max_concurrency` at a time
    pub async fn execute_batch_bounded(
        &self,
        builder: &CommandBuilder,
        urls: &[String],
        max_concurrency: usize,
        events: Option<EventSender>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, YtDlpError> {
        if urls.is_empty() {
            return Err(YtDlpError::EmptyBatch);
        }
        ensure_output_folder(builder.output_folder()).await?;

        let job: Arc<dyn UrlExecutor> = Arc::new(self.batch_job(builder, events));
        batch::run_bounded(job, urls, max_concurrency, cancel).await
    }

    fn batch_job(&self, builder: &CommandBuilder, events: Option<EventSender>) -> BatchJob {
        BatchJob {
            ytdlp: self.clone(),
            template: builder.clone(),
            events,
        }
    }
}

/// One batch item: a fresh copy of the template builder per URL
struct BatchJob {
    ytdlp: YtDlp,
    template: CommandBuilder,
    events: Option<EventSender>,
}

#[async_trait]
impl UrlExecutor for BatchJob {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn execute(&self, url: &str, cancel: &CancellationToken) -> Result<(), YtDlpError> {
        require_url(url)?;
        let mut builder = self.template.clone();
        self.ytdlp
            .dispatch(&mut builder, url, self.events.as_ref(), cancel)
            .await
            .map(|_| ())
    }
}

fn require_url(url: &str) -> Result<(), YtDlpError> {
    if url.trim().is_empty() {
        return Err(YtDlpError::EmptyArgument { field: "URL" });
    }
    Ok(())
}

async fn ensure_output_folder(folder: &Path) -> Result<(), YtDlpError> {
    tokio::fs::create_dir_all(folder)
        .await
        .map_err(|e| {
            tracing::error!("[YtDlp] Failed to create output folder {}: {}", folder.display(), e);
            YtDlpError::OutputFolder {
                path: folder.to_path_buf(),
                source: e,
            }
        })?;

    let shown = tokio::fs::canonicalize(folder)
        .await
        .unwrap_or_else(|_| PathBuf::from(folder));
    tracing::info!("[YtDlp] Output folder: {}", shown.display());
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::downloader::models::{event_channel, YtDlpEvent};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn fake_ytdlp(dir: &TempDir, body: &str) -> YtDlp {
        let path = dir.path().join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlp::new(
            YtDlpConfig::default()
                .with_executable(path)
                .with_output_folder(dir.path().join("out")),
        )
        .unwrap()
    }

    const ECHO_ARGS: &str = r#"for a in "$@"; do echo "$a"; done"#;

    #[test]
    fn test_missing_executable_fails_at_construction() {
        let result = YtDlp::new(YtDlpConfig::default().with_executable("/no/such/yt-dlp"));
        assert!(matches!(result, Err(YtDlpError::ExecutableNotFound(_))));
    }

    #[tokio::test]
    async fn test_version_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, "echo '2024.08.06'");
        let version = ytdlp.version(&CancellationToken::new()).await.unwrap();
        assert_eq!(version, "2024.08.06");
    }

    #[tokio::test]
    async fn test_update_classification() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, "echo 'yt-dlp is up to date (stable@2024.08.06)'");
        let status = ytdlp.update(&CancellationToken::new()).await.unwrap();
        assert_eq!(status, UpdateStatus::UpToDate);
    }

    #[tokio::test]
    async fn test_metadata_matches_keys_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(
            &dir,
            r#"echo '{"ID": "dQw4w9WgXcQ", "Title": "Never Gonna", "Duration": 212, "custom_field": 1}'"#,
        );
        let meta = ytdlp.metadata(URL, &CancellationToken::new()).await.unwrap();
        assert_eq!(meta.id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(meta.title.as_deref(), Some("Never Gonna"));
        assert_eq!(meta.duration, Some(212.0));
        assert!(meta.extra.contains_key("custom_field"));
    }

    #[tokio::test]
    async fn test_metadata_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, "echo 'not json'");
        let err = ytdlp.metadata(URL, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, YtDlpError::Metadata(_)));
    }

    #[tokio::test]
    async fn test_available_formats_parses_listing() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(
            &dir,
            r#"echo '[info] Available formats for dQw4w9WgXcQ:'
echo 'ID  EXT   RESOLUTION FPS CH |   FILESIZE   TBR PROTO | VCODEC          VBR ACODEC      ABR ASR MORE INFO'
echo '-------------------------------------------------------------------'
echo '139 m4a audio only 48k | 3.45MiB 64k https | audio only unknown'
echo '137 mp4 1920x1080 30 | 45.67MiB 2500k https | avc1.640028 2400k none | '"#,
        );
        let formats = ytdlp
            .available_formats(URL, &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<&str> = formats.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["139", "137"]);
    }

    #[tokio::test]
    async fn test_blank_url_is_rejected_before_spawn() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, "exit 0");
        let cancel = CancellationToken::new();
        assert!(matches!(
            ytdlp.available_formats("  ", &cancel).await,
            Err(YtDlpError::EmptyArgument { field: "URL" })
        ));
        let mut builder = ytdlp.command().unwrap();
        assert!(matches!(
            ytdlp.execute(&mut builder, "", None, &cancel).await,
            Err(YtDlpError::EmptyArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_creates_folder_and_resets_builder() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, ECHO_ARGS);
        let cancel = CancellationToken::new();
        let out = dir.path().join("out");

        let mut builder = ytdlp.command().unwrap();
        builder.use_proxy("socks5://127.0.0.1:1080").unwrap();
        let first = ytdlp.execute(&mut builder, URL, None, &cancel).await.unwrap();

        assert!(out.is_dir());
        let expected_template = format!("{}/%(title)s.%(ext)s", out.display());
        let lines: Vec<&str> = first.stdout.lines().collect();
        assert_eq!(
            lines,
            vec![
                "--proxy",
                "socks5://127.0.0.1:1080",
                "--newline",
                "-f",
                "best",
                "-o",
                expected_template.as_str(),
                URL,
            ]
        );

        let second = ytdlp.execute(&mut builder, URL, None, &cancel).await.unwrap();
        assert!(!second.stdout.contains("--proxy"));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(
            &dir,
            r#"case "$*" in *bad*) echo "ERROR: Unsupported URL" >&2; exit 1;; esac
echo done"#,
        );
        let urls: Vec<String> = ["https://a/1", "https://a/bad", "https://a/3", "https://a/4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let builder = ytdlp.command().unwrap();

        let report = ytdlp
            .execute_batch_bounded(&builder, &urls, 2, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "https://a/bad");
        assert!(dir.path().join("out").is_dir());
    }

    #[tokio::test]
    async fn test_batch_items_each_get_template_flags() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, ECHO_ARGS);
        let urls = vec!["https://a/1".to_string(), "https://a/2".to_string()];
        let mut builder = ytdlp.command().unwrap();
        builder.set_retries("5").unwrap();

        let (tx, mut rx) = event_channel();
        let report = ytdlp
            .execute_batch(&builder, &urls, Some(tx), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.all_succeeded());

        let mut retries = 0;
        while let Ok(event) = rx.try_recv() {
            if event == YtDlpEvent::Output("--retries".to_string()) {
                retries += 1;
            }
        }
        assert_eq!(retries, 2);
        assert_eq!(builder.pending_args(), &["--retries", "5"]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let dir = TempDir::new().unwrap();
        let ytdlp = fake_ytdlp(&dir, "exit 0");
        let builder = ytdlp.command().unwrap();
        let result = ytdlp
            .execute_batch(&builder, &[], None, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(YtDlpError::EmptyBatch)));
    }
}
