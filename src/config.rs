// Configuration - executable location, defaults and option vocabulary

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::downloader::batch::DEFAULT_CONCURRENCY;
use crate::downloader::command::{CommandBuilder, DEFAULT_FORMAT, DEFAULT_OUTPUT_TEMPLATE};
use crate::downloader::errors::YtDlpError;
use crate::downloader::options::OptionRegistry;

/// Environment override for the executable location
pub const EXECUTABLE_ENV: &str = "YTDLP_PATH";

const EXECUTABLE_NAME: &str = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };

/// Configuration for a [`crate::YtDlp`] handle
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Explicit executable path; resolved on construction when unset
    pub executable: Option<PathBuf>,
    pub format: String,
    pub output_folder: PathBuf,
    pub output_template: String,
    /// Max in-flight items for bounded batches
    pub concurrency: usize,
    pub registry: Arc<OptionRegistry>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            executable: None,
            format: DEFAULT_FORMAT.to_string(),
            output_folder: PathBuf::from("."),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            registry: Arc::new(OptionRegistry::default()),
        }
    }
}

impl YtDlpConfig {
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_output_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.output_folder = folder.into();
        self
    }

    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_registry(mut self, registry: OptionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Fresh builder seeded with this config's defaults
    pub fn builder(&self) -> Result<CommandBuilder, YtDlpError> {
        let mut builder = CommandBuilder::new(Arc::clone(&self.registry))
            .with_default_template(self.output_template.clone());
        builder
            .set_format(&self.format)?
            .set_output_folder(&self.output_folder)?;
        Ok(builder)
    }

    /// Locate the yt-dlp executable.
    ///
    /// Order: explicit path, `YTDLP_PATH`, common install locations, then the
    /// search path.
    pub fn resolve_executable(&self) -> Result<PathBuf, YtDlpError> {
        if let Some(path) = &self.executable {
            return check_explicit(path);
        }

        if let Ok(value) = std::env::var(EXECUTABLE_ENV) {
            if !value.trim().is_empty() {
                return check_explicit(Path::new(value.trim()));
            }
        }

        if let Some(path) = common_paths().into_iter().find(|p| p.is_file()) {
            tracing::debug!("[YtDlp] Found executable at {}", path.display());
            return Ok(path);
        }

        which::which(EXECUTABLE_NAME).map_err(|e| {
            YtDlpError::ExecutableNotFound(format!("{} not found on PATH: {}", EXECUTABLE_NAME, e))
        })
    }
}

fn check_explicit(path: &Path) -> Result<PathBuf, YtDlpError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    // bare names like "yt-dlp" go through the search path
    if path.components().count() == 1 {
        if let Ok(found) = which::which(path) {
            return Ok(found);
        }
    }
    Err(YtDlpError::ExecutableNotFound(path.display().to_string()))
}

fn common_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local").join("bin").join(EXECUTABLE_NAME));
    }

    #[cfg(unix)]
    paths.extend(
        [
            "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
            "/usr/local/bin/yt-dlp",
            "/usr/bin/yt-dlp",
        ]
        .into_iter()
        .map(PathBuf::from),
    );

    #[cfg(windows)]
    if let Some(data) = dirs::data_local_dir() {
        paths.push(data.join("Programs").join("yt-dlp").join(EXECUTABLE_NAME));
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = YtDlpConfig::default();
        assert_eq!(config.format, "best");
        assert_eq!(config.output_folder, PathBuf::from("."));
        assert_eq!(config.output_template, "%(title)s.%(ext)s");
        assert_eq!(config.concurrency, 3);
        assert!(config.registry.is_recognized("--proxy"));
    }

    #[test]
    fn test_builder_carries_defaults() {
        let config = YtDlpConfig::default()
            .with_format("bestaudio")
            .with_output_folder("downloads")
            .with_output_template("%(id)s.%(ext)s");
        let mut builder = config.builder().unwrap();

        let spec = builder.take_spec("https://example.com/v").unwrap();
        assert_eq!(
            spec.args(),
            &["--newline", "-f", "bestaudio", "-o", "downloads/%(id)s.%(ext)s", "https://example.com/v"]
        );
    }

    #[test]
    fn test_builder_rejects_blank_format() {
        let config = YtDlpConfig::default().with_format("  ");
        assert!(matches!(
            config.builder(),
            Err(YtDlpError::EmptyArgument { .. })
        ));
    }

    #[test]
    fn test_explicit_executable_must_exist() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("yt-dlp");
        std::fs::write(&present, "").unwrap();

        let config = YtDlpConfig::default().with_executable(&present);
        assert_eq!(config.resolve_executable().unwrap(), present);

        let missing = YtDlpConfig::default().with_executable(dir.path().join("nope"));
        assert!(matches!(
            missing.resolve_executable(),
            Err(YtDlpError::ExecutableNotFound(_))
        ));
    }
}
