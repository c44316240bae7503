use crate::config::DownloaderConfig;
use crate::engine::{
    BatchOutcome, DownloadHooks, DownloadOptions, HookFlow, MediaEngine, PostProcessor,
    ScanOptions,
};
use crate::models::{Extracted, MediaItemMetadata};
use crate::{DownloaderError, Result};
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TOOL_NAME: &str = "yt-dlp";
const POLL_INTERVAL_MS: u64 = 100;
/// Liked sets nest at most one level; anything deeper is reported, not walked.
const MAX_NESTING_DEPTH: usize = 4;

/// [`MediaEngine`] backed by the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: Option<PathBuf>,
    fallbacks: Vec<(String, Vec<String>)>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(None)
    }
}

impl YtDlp {
    pub fn new(program: Option<PathBuf>) -> Self {
        let mut fallbacks: Vec<(String, Vec<String>)> =
            vec![(TOOL_NAME.to_string(), Vec::new())];
        for python in ["python", "python3"] {
            fallbacks.push((
                python.to_string(),
                vec!["-m".to_string(), "yt_dlp".to_string()],
            ));
        }
        Self { program, fallbacks }
    }

    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self::new(config.yt_dlp_path.clone())
    }

    fn candidates(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        if let Some(program) = &self.program {
            out.push((program.to_string_lossy().to_string(), Vec::new()));
        }
        out.extend(self.fallbacks.iter().cloned());
        out
    }

    /// Runs the first candidate that starts and actually has yt-dlp behind it.
    /// Its output is returned whatever the exit status. A missing executable
    /// or a Python without the `yt_dlp` module moves on to the next candidate.
    fn run(&self, args: &[String], timeout_secs: u64) -> Result<Output> {
        for (program, prefix) in self.candidates() {
            let mut cmd = command(&program);
            cmd.args(&prefix);
            cmd.args(args);
            match run_with_timeout(&mut cmd, timeout_secs) {
                Ok(output) if !output.status.success() && is_missing_module(&output.stderr) => {
                    debug!(program = %program, "yt-dlp candidate has no yt_dlp module");
                    continue;
                }
                Ok(output) => return Ok(output),
                Err(RunError::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(program = %program, "yt-dlp candidate not found");
                    continue;
                }
                Err(RunError::Spawn(e)) | Err(RunError::Wait(e)) => {
                    return Err(DownloaderError::Io(e));
                }
                Err(RunError::TimedOut(secs)) => {
                    return Err(DownloaderError::ExternalToolTimedOut {
                        tool: TOOL_NAME.to_string(),
                        secs,
                    });
                }
            }
        }
        Err(DownloaderError::ExternalToolMissing {
            tool: TOOL_NAME.to_string(),
        })
    }

    fn run_json(&self, args: &[String], timeout_secs: u64) -> Result<serde_json::Value> {
        let output = self.run(args, timeout_secs)?;
        match serde_json::from_slice::<serde_json::Value>(&output.stdout) {
            Ok(value) if value.is_object() => {
                if !output.status.success() {
                    // --ignore-errors still prints the document when some entries failed.
                    warn!(
                        code = ?output.status.code(),
                        error = %stderr_summary(&output.stderr),
                        "yt-dlp reported errors while extracting"
                    );
                }
                Ok(value)
            }
            _ if !output.status.success() => Err(tool_failed(&output)),
            _ => Err(DownloaderError::UnexpectedOutput(
                "yt-dlp did not print a JSON object".to_string(),
            )),
        }
    }

    /// Full info document for one listing reference. Sets come back with
    /// their own `entries`.
    fn resolve(&self, url: &str, options: &DownloadOptions) -> Result<serde_json::Value> {
        self.run_json(&resolve_args(url, options), options.scan_timeout_secs)
    }

    /// Downloads from an already resolved info document so the page is not
    /// extracted a second time.
    fn fetch(&self, info_json: &serde_json::Value, options: &DownloadOptions) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("likes_dl_info_")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut file, info_json)?;
        file.flush()?;

        let args = download_args(file.path(), options);
        let output = self.run(&args, options.item_timeout_secs)?;
        if !output.status.success() {
            return Err(tool_failed(&output));
        }
        Ok(())
    }

    /// Resolves one flat listing entry and hands the result on. Returns the
    /// stop reason when a hook ends the batch.
    fn process_reference(
        &self,
        entry: &MediaItemMetadata,
        options: &DownloadOptions,
        hooks: &mut dyn DownloadHooks,
        depth: usize,
    ) -> Result<Option<String>> {
        let Some(target) = entry.reference_url().map(str::to_string) else {
            hooks.on_error(entry, "entry has no url to resolve");
            return Ok(None);
        };

        match self.resolve(&target, options) {
            Ok(value) => self.process_resolved(value, entry, options, hooks, depth),
            Err(e) => {
                item_failed(e, entry, options, hooks)?;
                Ok(None)
            }
        }
    }

    fn process_resolved(
        &self,
        mut value: serde_json::Value,
        entry: &MediaItemMetadata,
        options: &DownloadOptions,
        hooks: &mut dyn DownloadHooks,
        depth: usize,
    ) -> Result<Option<String>> {
        if let Some(serde_json::Value::Array(children)) =
            value.get_mut("entries").map(serde_json::Value::take)
        {
            if depth >= MAX_NESTING_DEPTH {
                hooks.on_error(entry, "playlist nesting too deep");
                return Ok(None);
            }
            debug!(count = children.len(), "walking nested playlist");
            for child in children {
                if !child.is_object() {
                    continue;
                }
                let child_entry: MediaItemMetadata =
                    serde_json::from_value(child.clone()).unwrap_or_default();
                let stop = if is_unresolved_reference(&child) {
                    self.process_reference(&child_entry, options, hooks, depth + 1)?
                } else {
                    self.process_resolved(child, &child_entry, options, hooks, depth + 1)?
                };
                if stop.is_some() {
                    return Ok(stop);
                }
            }
            return Ok(None);
        }

        let info: MediaItemMetadata = match serde_json::from_value(value.clone()) {
            Ok(info) => info,
            Err(e) => {
                item_failed(e.into(), entry, options, hooks)?;
                return Ok(None);
            }
        };

        if let Some(reason) = hooks.reject(&info) {
            info!(reason = %reason, "item rejected before download");
            return Ok(None);
        }

        if let Err(e) = self.fetch(&value, options) {
            item_failed(e, &info, options, hooks)?;
            return Ok(None);
        }

        match hooks.on_finished(&info) {
            HookFlow::Stop(reason) => Ok(Some(reason)),
            HookFlow::Continue => Ok(None),
        }
    }
}

impl MediaEngine for YtDlp {
    fn extract_flat(&self, url: &str, options: &ScanOptions) -> Result<Extracted> {
        let value = self.run_json(&scan_args(url, options), options.timeout_secs)?;
        Extracted::from_json(value)
    }

    fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        hooks: &mut dyn DownloadHooks,
    ) -> Result<BatchOutcome> {
        let listing = self.extract_flat(url, &options.scan_options())?;

        for entry in listing.into_entries().into_iter().flatten() {
            if let Some(reason) = self.process_reference(&entry, options, hooks, 0)? {
                return Ok(BatchOutcome::Cancelled { reason });
            }
        }

        Ok(BatchOutcome::Completed)
    }
}

pub fn scan_args(url: &str, options: &ScanOptions) -> Vec<String> {
    let mut args = vec!["-J".to_string()];
    if options.flat {
        args.push("--flat-playlist".to_string());
    }
    args.push("--skip-download".to_string());
    if options.ignore_errors {
        args.push("--ignore-errors".to_string());
    }
    if options.quiet {
        args.push("--quiet".to_string());
        args.push("--no-warnings".to_string());
    }
    push_remote_components(&mut args, &options.remote_components);
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

pub fn resolve_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    let mut args = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--skip-download".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "--sleep-requests".to_string(),
        options.pacing.sleep_requests_secs.to_string(),
    ];
    push_remote_components(&mut args, &options.remote_components);
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Download invocation for one resolved item. The info document replaces the
/// URL, so yt-dlp does not extract the page again.
pub fn download_args(info_json: &Path, options: &DownloadOptions) -> Vec<String> {
    let pacing = &options.pacing;
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "-f".to_string(),
        options.format.clone(),
        "-o".to_string(),
        options.output_template.clone(),
    ];
    if options.restrict_filenames {
        args.push("--restrict-filenames".to_string());
    }
    if options.windows_filenames {
        args.push("--windows-filenames".to_string());
    }

    args.extend([
        "--sleep-requests".to_string(),
        pacing.sleep_requests_secs.to_string(),
        "--sleep-interval".to_string(),
        pacing.sleep_interval_secs.to_string(),
        "--max-sleep-interval".to_string(),
        pacing
            .max_sleep_interval_secs
            .max(pacing.sleep_interval_secs)
            .to_string(),
        "--concurrent-fragments".to_string(),
        pacing.concurrent_fragments.max(1).to_string(),
    ]);
    if pacing.rate_limit_bytes > 0 {
        args.push("--limit-rate".to_string());
        args.push(pacing.rate_limit_bytes.to_string());
    }

    for pp in &options.postprocessors {
        match pp {
            PostProcessor::ExtractAudio { codec, quality } => {
                args.push("--extract-audio".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                args.push("--audio-quality".to_string());
                args.push(audio_quality_arg(quality));
            }
            PostProcessor::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
            PostProcessor::EmbedMetadata => args.push("--embed-metadata".to_string()),
        }
    }

    push_remote_components(&mut args, &options.remote_components);
    args.push("--load-info-json".to_string());
    args.push(info_json.to_string_lossy().to_string());
    args
}

fn push_remote_components(args: &mut Vec<String>, components: &[String]) {
    for component in components {
        let trimmed = component.trim();
        if trimmed.is_empty() {
            continue;
        }
        args.push("--remote-components".to_string());
        args.push(trimmed.to_string());
    }
}

/// Bare numbers are bitrates in kbit/s; anything else is passed through.
fn audio_quality_arg(quality: &str) -> String {
    let trimmed = quality.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("{trimmed}K")
    } else {
        trimmed.to_string()
    }
}

fn is_fatal(err: &DownloaderError) -> bool {
    matches!(
        err,
        DownloaderError::ExternalToolMissing { .. } | DownloaderError::Io(_)
    )
}

/// Reports a per-item failure through the hooks, or hands it back when the
/// batch should stop.
fn item_failed(
    err: DownloaderError,
    entry: &MediaItemMetadata,
    options: &DownloadOptions,
    hooks: &mut dyn DownloadHooks,
) -> Result<()> {
    if !options.ignore_errors || is_fatal(&err) {
        return Err(err);
    }
    hooks.on_error(entry, &item_error_message(&err));
    Ok(())
}

/// Playlist entries of `_type` url are pointers that still need resolving.
fn is_unresolved_reference(value: &serde_json::Value) -> bool {
    matches!(
        value.get("_type").and_then(serde_json::Value::as_str),
        Some("url" | "url_transparent")
    )
}

/// `python -m yt_dlp` without the package installed.
fn is_missing_module(stderr: &[u8]) -> bool {
    let text = String::from_utf8_lossy(stderr);
    text.contains("No module named") && text.contains("yt_dlp")
}

fn item_error_message(err: &DownloaderError) -> String {
    match err {
        DownloaderError::ExternalToolFailed { stderr, .. } => stderr.clone(),
        other => other.to_string(),
    }
}

fn tool_failed(output: &Output) -> DownloaderError {
    DownloaderError::ExternalToolFailed {
        tool: TOOL_NAME.to_string(),
        code: output.status.code(),
        stderr: stderr_summary(&output.stderr),
    }
}

/// Picks the last `ERROR:` line, falling back to the last non-empty line.
pub fn stderr_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if let Some(line) = lines.iter().rev().find(|l| l.starts_with("ERROR:")) {
        return line.trim_start_matches("ERROR:").trim().to_string();
    }
    lines
        .last()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null());
    hide_console_window(&mut cmd);
    cmd
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

/// Timed children lead their own process group so a timeout can take down
/// whatever they spawned (ffmpeg, a shell's `sleep`) along with them.
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

fn kill_child_process_tree(child: &mut Child) {
    let pid = child.id().to_string();

    #[cfg(windows)]
    {
        let _ = command("taskkill")
            .args(["/PID", &pid, "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    #[cfg(unix)]
    {
        let group = format!("-{pid}");
        let _ = command("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    #[cfg(not(any(windows, unix)))]
    let _ = pid;

    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug)]
enum RunError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(u64),
}

fn run_with_timeout(
    cmd: &mut Command,
    timeout_secs: u64,
) -> std::result::Result<Output, RunError> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if timeout_secs > 0 {
        own_process_group(cmd);
    }

    let mut child = cmd.spawn().map_err(RunError::Spawn)?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        RunError::Wait(std::io::Error::new(std::io::ErrorKind::Other, "stdout pipe missing"))
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| {
        RunError::Wait(std::io::Error::new(std::io::ErrorKind::Other, "stderr pipe missing"))
    })?;

    let stdout_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    let started = Instant::now();

    loop {
        if timeout_secs > 0 && started.elapsed() >= Duration::from_secs(timeout_secs) {
            kill_child_process_tree(&mut child);
            // A survivor may still hold the pipes; leave the readers detached.
            drop(stdout_handle);
            drop(stderr_handle);
            return Err(RunError::TimedOut(timeout_secs));
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = stdout_handle.join().unwrap_or_default();
                let stderr = stderr_handle.join().unwrap_or_default();
                return Ok(Output {
                    status,
                    stdout,
                    stderr,
                });
            }
            Ok(None) => thread::sleep(Duration::from_millis(POLL_INTERVAL_MS)),
            Err(err) => {
                kill_child_process_tree(&mut child);
                drop(stdout_handle);
                drop(stderr_handle);
                return Err(RunError::Wait(err));
            }
        }
    }
}
