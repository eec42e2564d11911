// Process runner - spawns yt-dlp and supervises it to completion or cancellation

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::YtDlpError;
use super::models::{EventSender, YtDlpEvent};
use super::progress::ProgressParser;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured result of a finished run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns one yt-dlp process per call
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, args: &[String]) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so cancellation can take down ffmpeg children too
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }

    /// Run to completion.
    ///
    /// Both pipes are drained line by line on their own tasks. When `events`
    /// is given, stdout lines go through a fresh [`ProgressParser`] and are
    /// forwarded as events only, so `ProcessOutput::stdout` stays empty;
    /// without it stdout is captured. Stderr is always logged and captured.
    /// A non-zero exit is `CommandFailed` carrying stderr, and a triggered
    /// `cancel` kills the process tree and returns `Cancelled`.
    pub async fn run(
        &self,
        args: &[String],
        events: Option<&EventSender>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, YtDlpError> {
        if cancel.is_cancelled() {
            return Err(YtDlpError::Cancelled);
        }

        let program = self.program.display().to_string();
        tracing::debug!("[Runner] {} {}", program, args.join(" "));

        let mut child = self.command(args).spawn().map_err(|e| YtDlpError::Spawn {
            program: program.clone(),
            source: e,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| YtDlpError::Process(format!("Failed to capture stdout from {}", program)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| YtDlpError::Process(format!("Failed to capture stderr from {}", program)))?;

        let stdout_task = spawn_stdout_reader(stdout, events.cloned());
        let stderr_task = spawn_stderr_reader(stderr, events.cloned());
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();

        let drained = async move {
            let (out, err) = tokio::join!(stdout_task, stderr_task);
            let out = out
                .map_err(|e| YtDlpError::Process(format!("stdout task failed: {}", e)))?
                .map_err(|e| YtDlpError::Process(format!("Failed to read stdout: {}", e)))?;
            let err = err
                .map_err(|e| YtDlpError::Process(format!("stderr task failed: {}", e)))?
                .map_err(|e| YtDlpError::Process(format!("Failed to read stderr: {}", e)))?;
            Ok::<(String, String), YtDlpError>((out, err))
        };

        let supervised = async {
            let (stdout, stderr) = drained.await?;
            let status = child
                .wait()
                .await
                .map_err(|e| YtDlpError::Process(format!("Failed to wait for {}: {}", program, e)))?;
            Ok::<ProcessOutput, YtDlpError>(ProcessOutput {
                status,
                stdout,
                stderr,
            })
        };

        let output = tokio::select! {
            result = supervised => result,
            _ = cancel.cancelled() => {
                stdout_abort.abort();
                stderr_abort.abort();
                kill_process_tree(&mut child).await;
                tracing::warn!("[Runner] yt-dlp process killed due to cancellation.");
                return Err(YtDlpError::Cancelled);
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("[Runner] {}", e);
                kill_process_tree(&mut child).await;
                return Err(e);
            }
        };

        if !output.status.success() {
            let message = format!("Process failed with exit code {:?}.", output.status.code());
            tracing::error!("[Runner] {}", message);
            emit(events, YtDlpEvent::Completed { success: false, message });
            return Err(YtDlpError::CommandFailed {
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let message = "Process completed successfully.".to_string();
        tracing::info!("[Runner] {}", message);
        emit(events, YtDlpEvent::Completed { success: true, message });
        Ok(output)
    }
}

fn emit(events: Option<&EventSender>, event: YtDlpEvent) {
    if let Some(tx) = events {
        // a dropped receiver just means nobody is listening
        let _ = tx.send(event);
    }
}

fn spawn_stdout_reader(
    stdout: tokio::process::ChildStdout,
    events: Option<EventSender>,
) -> JoinHandle<std::io::Result<String>> {
    tokio::spawn(async move {
        let mut parser = ProgressParser::new();
        let mut captured = String::new();

        for_each_line(stdout, |line| match &events {
            Some(tx) => {
                for event in parser.parse_line(&line) {
                    let _ = tx.send(event);
                }
                let _ = tx.send(YtDlpEvent::Output(line));
            }
            None => {
                captured.push_str(&line);
                captured.push('\n');
            }
        })
        .await?;

        if let Some(tx) = &events {
            for event in parser.finish() {
                let _ = tx.send(event);
            }
        }
        Ok(captured)
    })
}

fn spawn_stderr_reader(
    stderr: tokio::process::ChildStderr,
    events: Option<EventSender>,
) -> JoinHandle<std::io::Result<String>> {
    tokio::spawn(async move {
        let mut captured = String::new();

        for_each_line(stderr, |line| {
            tracing::warn!("[yt-dlp] {}", line);
            captured.push_str(&line);
            captured.push('\n');
            if let Some(tx) = &events {
                let _ = tx.send(YtDlpEvent::ErrorLine(line));
            }
        })
        .await?;

        Ok(captured)
    })
}

/// Feed `reader` to `on_line` one line at a time until EOF.
///
/// A line ends at `\n` or at a bare `\r` (yt-dlp redraws progress with `\r`
/// when it is not asked for `--newline`). Bytes that are not UTF-8 are
/// replaced, never an error. Empty lines are dropped.
async fn for_each_line<R, F>(reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let mut start = 0;
        for (i, byte) in available.iter().enumerate() {
            if *byte == b'\n' || *byte == b'\r' {
                pending.extend_from_slice(&available[start..i]);
                if !pending.is_empty() {
                    on_line(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
                start = i + 1;
            }
        }
        pending.extend_from_slice(&available[start..]);

        let consumed = available.len();
        reader.consume(consumed);
    }

    if !pending.is_empty() {
        on_line(String::from_utf8_lossy(&pending).into_owned());
    }
    Ok(())
}

/// Kill the child and everything it spawned. Failures (e.g. already exited) are ignored.
async fn kill_process_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::debug!("[Runner] killpg({}) failed: {}", pid, e);
            }
        }

        #[cfg(windows)]
        {
            let result = TokioCommand::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .creation_flags(CREATE_NO_WINDOW)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = result {
                tracing::debug!("[Runner] taskkill {} failed: {}", pid, e);
            }
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
}
