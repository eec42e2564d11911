// ytdlp-control CLI

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use ytdlp_control::{event_channel, EventReceiver, YtDlp, YtDlpConfig, YtDlpError, YtDlpEvent};

/// Drive yt-dlp: downloads, format listings, metadata and self-update.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to the yt-dlp executable (defaults to YTDLP_PATH, then PATH).
    #[arg(long, global = true)]
    ytdlp: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Print the installed yt-dlp version.
    Version,
    /// Update yt-dlp to the latest release.
    Update,
    /// List the formats available for a URL.
    Formats { url: String },
    /// Print single-video metadata as JSON.
    Metadata { url: String },
    /// Download one or more URLs.
    Download(Download),
}

#[derive(Debug, Clone, clap::Args)]
struct Download {
    /// Format selector passed to -f.
    #[arg(short, long, default_value = "best")]
    format: String,

    /// Output folder, created if missing.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Output filename template.
    #[arg(short, long)]
    template: Option<String>,

    /// Max concurrent downloads when several URLs are given.
    #[arg(short, long, default_value_t = 3)]
    concurrency: usize,

    /// Extract audio in the given format (mp3, m4a, ...).
    #[arg(long)]
    extract_audio: Option<String>,

    /// Proxy URL.
    #[arg(long)]
    proxy: Option<String>,

    #[arg(required = true)]
    urls: Vec<String>,
}

async fn run(args: Args, cancel: CancellationToken) -> Result<(), YtDlpError> {
    let mut config = YtDlpConfig::default();
    if let Some(path) = args.ytdlp {
        config = config.with_executable(path);
    }

    match args.command {
        Commands::Version => {
            let ytdlp = YtDlp::new(config)?;
            println!("{}", ytdlp.version(&cancel).await?);
        }
        Commands::Update => {
            let ytdlp = YtDlp::new(config)?;
            println!("{}", ytdlp.update(&cancel).await?.message());
        }
        Commands::Formats { url } => {
            let ytdlp = YtDlp::new(config)?;
            for f in ytdlp.available_formats(&url, &cancel).await? {
                println!(
                    "{:<8} {:<5} {:<12} {:<10} {:<14} {}",
                    f.id,
                    f.extension,
                    f.resolution,
                    f.file_size.as_deref().unwrap_or("-"),
                    f.vcodec.as_deref().unwrap_or("-"),
                    f.acodec.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Metadata { url } => {
            let ytdlp = YtDlp::new(config)?;
            let metadata = ytdlp.metadata(&url, &cancel).await?;
            println!("{}", metadata.to_pretty_json()?);
        }
        Commands::Download(download) => {
            config = config
                .with_format(download.format.clone())
                .with_output_folder(download.output.clone())
                .with_concurrency(download.concurrency);
            if let Some(template) = &download.template {
                config = config.with_output_template(template.clone());
            }
            let ytdlp = YtDlp::new(config)?;
            run_download(&ytdlp, download, &cancel).await?;
        }
    }

    Ok(())
}

async fn run_download(
    ytdlp: &YtDlp,
    download: Download,
    cancel: &CancellationToken,
) -> Result<(), YtDlpError> {
    let mut builder = ytdlp.command()?;
    if let Some(format) = &download.extract_audio {
        builder.extract_audio(format)?;
    }
    if let Some(proxy) = &download.proxy {
        builder.use_proxy(proxy)?;
    }

    let (tx, rx) = event_channel();
    let printer = tokio::spawn(print_events(rx));

    let result = if let [url] = download.urls.as_slice() {
        ytdlp.execute(&mut builder, url, Some(&tx), cancel).await.map(|_| ())
    } else {
        let report = ytdlp
            .execute_batch_bounded(
                &builder,
                &download.urls,
                ytdlp.config().concurrency,
                Some(tx.clone()),
                cancel,
            )
            .await;
        report.and_then(|report| {
            eprintln!(
                "{} of {} downloads succeeded",
                report.succeeded.len(),
                report.total()
            );
            match report.failed.into_iter().next() {
                None => Ok(()),
                Some((url, e)) => {
                    eprintln!("first failure: {}", url);
                    Err(e)
                }
            }
        })
    };

    drop(tx);
    let _ = printer.await;
    result
}

async fn print_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            YtDlpEvent::Progress(p) => {
                let eta = p.eta.as_deref().unwrap_or("--:--");
                let speed = p.speed.as_deref().unwrap_or("-");
                eprintln!("{:>6.1}% at {} ETA {}", p.percent, speed, eta);
            }
            YtDlpEvent::DownloadComplete(file) => eprintln!("Downloaded {}", file),
            YtDlpEvent::PostProcessing { step, detail } => eprintln!("[{}] {}", step, detail),
            YtDlpEvent::Error(message) => eprintln!("{}", message),
            _ => {}
        }
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("[YtDlp] Interrupted, cancelling");
            trigger.cancel();
        }
    });

    match run(args, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            eprintln!("cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            if let Some(reason) = e.diagnosis() {
                eprintln!("hint: {}", reason.description());
            }
            ExitCode::FAILURE
        }
    }
}
