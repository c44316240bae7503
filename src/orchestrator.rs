use crate::activity;
use crate::config::{self, DownloaderConfig};
use crate::engine::{
    BatchOutcome, DownloadHooks, DownloadOptions, HookFlow, MediaEngine, ScanOptions,
};
use crate::filter::check_duration;
use crate::identity::compute_key;
use crate::ledger::SeenLedger;
use crate::models::{MediaItemMetadata, PrecheckStats};
use crate::paths::OutputPaths;
use crate::precheck;
use crate::ytdlp::YtDlp;
use crate::{DownloaderError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Precheck found nothing new; the engine was never asked to download.
    NothingNew { stats: PrecheckStats },
    Completed {
        stats: PrecheckStats,
        downloaded: usize,
    },
    /// The new-item quota was reached.
    Cancelled {
        stats: PrecheckStats,
        downloaded: usize,
        reason: String,
    },
    Failed {
        stats: Option<PrecheckStats>,
        downloaded: usize,
        error: String,
    },
}

impl RunReport {
    pub fn downloaded(&self) -> usize {
        match self {
            RunReport::NothingNew { .. } => 0,
            RunReport::Completed { downloaded, .. }
            | RunReport::Cancelled { downloaded, .. }
            | RunReport::Failed { downloaded, .. } => *downloaded,
        }
    }
}

/// Mutable state shared with the engine's callbacks for one run.
#[derive(Debug)]
pub struct RunState {
    ledger: SeenLedger,
    completed: usize,
    limit: usize,
    max_duration_secs: u64,
    log_path: PathBuf,
    error_log_path: PathBuf,
    failure: Option<String>,
}

impl RunState {
    pub fn new(
        ledger: SeenLedger,
        limit: usize,
        max_duration_secs: u64,
        paths: &OutputPaths,
    ) -> Self {
        Self {
            ledger,
            completed: 0,
            limit,
            max_duration_secs,
            log_path: paths.log_path(),
            error_log_path: paths.error_log_path(),
            failure: None,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn ledger(&self) -> &SeenLedger {
        &self.ledger
    }

    fn fail(&mut self, message: String) -> HookFlow {
        warn!(error = %message, "stopping batch after local write failure");
        self.failure = Some(message.clone());
        HookFlow::Stop(message)
    }
}

impl DownloadHooks for RunState {
    fn reject(&mut self, info: &MediaItemMetadata) -> Option<String> {
        if let Some(reason) = check_duration(info, self.max_duration_secs) {
            return Some(reason);
        }
        let key = compute_key(info);
        if self.ledger.contains(&key) {
            return Some(format!("Skipping (already downloaded): {key}"));
        }
        None
    }

    fn on_error(&mut self, info: &MediaItemMetadata, error: &str) {
        let line = activity::error_line(info, error);
        warn!(key = %compute_key(info), error = %error, "item failed");
        if let Err(e) = activity::append_line(&self.error_log_path, &line) {
            warn!(path = %self.error_log_path.display(), error = %e, "could not write error log");
        }
    }

    fn on_finished(&mut self, info: &MediaItemMetadata) -> HookFlow {
        // Same checks as `reject`, repeated against the fully processed item.
        if check_duration(info, self.max_duration_secs).is_some() {
            return HookFlow::Continue;
        }
        let key = compute_key(info);
        if self.ledger.contains(&key) {
            return HookFlow::Continue;
        }

        if let Err(e) = self.ledger.record(info) {
            return self.fail(format!("failed to append {}: {e}", self.ledger.path().display()));
        }

        let line = activity::success_line(info);
        println!("Saved: {line}");
        info!(key = %key, "saved");
        if let Err(e) = activity::append_line(&self.log_path, &line) {
            return self.fail(format!("failed to append {}: {e}", self.log_path.display()));
        }

        self.completed += 1;
        if self.limit > 0 && self.completed >= self.limit {
            return HookFlow::Stop(format!("Reached new_song_limit={}", self.limit));
        }
        HookFlow::Continue
    }
}

pub struct Downloader<E: MediaEngine> {
    engine: E,
    config: DownloaderConfig,
    paths: OutputPaths,
}

impl<E: MediaEngine> Downloader<E> {
    pub fn new(engine: E, config: DownloaderConfig, paths: OutputPaths) -> Self {
        Self {
            engine,
            config,
            paths,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Precheck, then download at most `new_song_limit` new tracks
    /// (0 = unlimited).
    ///
    /// Only setup problems come back as `Err`; once the precheck starts,
    /// every outcome is reported through [`RunReport`] and whatever was
    /// already saved stays saved.
    pub fn run(&self, url: &str, new_song_limit: usize) -> Result<RunReport> {
        let url = validate_listing_url(url)?;
        let span = info_span!("run", url = %redact_url_for_log(&url), limit = new_song_limit);
        let _guard = span.enter();

        self.paths.ensure_dirs()?;
        let ledger = SeenLedger::load(self.paths.seen_path());
        info!(known = ledger.len(), "loaded seen ledger");

        let scan_options = ScanOptions::from_config(&self.config);
        let stats = match precheck::scan(&self.engine, &url, ledger.keys(), &scan_options) {
            Ok(stats) => stats,
            Err(e) => {
                println!("Precheck error: {e}");
                return Ok(RunReport::Failed {
                    stats: None,
                    downloaded: 0,
                    error: e.to_string(),
                });
            }
        };
        println!(
            "Precheck: total={} | new={} | already_seen={} | duplicates_in_list={}",
            stats.total, stats.new_items, stats.already_seen, stats.duplicates_in_list
        );

        if stats.new_items == 0 {
            println!("Nothing new to download. Exiting.");
            return Ok(RunReport::NothingNew { stats });
        }

        let options = DownloadOptions::from_config(&self.config, &self.paths);
        let mut state = RunState::new(
            ledger,
            new_song_limit,
            self.config.max_duration_secs,
            &self.paths,
        );

        let outcome = self.engine.download(&url, &options, &mut state);
        let downloaded = state.completed();

        let report = match (outcome, state.failure.take()) {
            (Ok(_), Some(error)) => {
                println!("Download error: {error}");
                RunReport::Failed {
                    stats: Some(stats),
                    downloaded,
                    error,
                }
            }
            (Ok(BatchOutcome::Completed), None) => RunReport::Completed { stats, downloaded },
            (Ok(BatchOutcome::Cancelled { reason }), None) => {
                println!("{reason}");
                RunReport::Cancelled {
                    stats,
                    downloaded,
                    reason,
                }
            }
            (Err(e), _) => {
                println!("Download error: {e}");
                RunReport::Failed {
                    stats: Some(stats),
                    downloaded,
                    error: e.to_string(),
                }
            }
        };
        info!(downloaded, "run finished");
        Ok(report)
    }
}

/// Runs against yt-dlp with `config.json` from the output directory, if any.
pub fn download_likes(url: &str, new_song_limit: usize, output_dir: &Path) -> Result<RunReport> {
    let paths = OutputPaths::new(output_dir);
    let config = config::load(&paths.config_path())?;
    let engine = YtDlp::from_config(&config);
    Downloader::new(engine, config, paths).run(url, new_song_limit)
}

fn validate_listing_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| DownloaderError::InvalidUrl(format!("{trimmed}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(DownloaderError::InvalidUrl(format!(
            "{trimmed}: unsupported scheme {other}"
        ))),
    }
}

fn redact_url_for_log(value: &str) -> String {
    match url::Url::parse(value) {
        Ok(u) => format!("{}://{}/...", u.scheme(), u.host_str().unwrap_or("unknown-host")),
        Err(_) => "[invalid-url]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::load_seen_keys;
    use crate::models::Extracted;
    use std::cell::Cell;

    const LIKES_URL: &str = "https://soundcloud.com/someone/likes";

    #[derive(Clone)]
    struct FakeItem {
        info: MediaItemMetadata,
        error: Option<String>,
    }

    fn track(id: &str) -> FakeItem {
        FakeItem {
            info: MediaItemMetadata {
                extractor_key: Some("Soundcloud".to_string()),
                id: Some(id.to_string()),
                webpage_url: Some(format!("https://soundcloud.com/artist/{id}")),
                title: Some(format!("Track {id}")),
                uploader: Some("Artist".to_string()),
                duration: Some(180.0),
                ..MediaItemMetadata::default()
            },
            error: None,
        }
    }

    fn long_track(id: &str) -> FakeItem {
        let mut item = track(id);
        item.info.duration = Some(901.0);
        item
    }

    fn failing_track(id: &str, error: &str) -> FakeItem {
        let mut item = track(id);
        item.error = Some(error.to_string());
        item
    }

    /// Mimics the engine: flat listing, then reject / error / finished per item.
    struct FakeEngine {
        items: Vec<FakeItem>,
        scan_error: bool,
        download_error: bool,
        download_calls: Cell<usize>,
        finished_calls: Cell<usize>,
    }

    impl FakeEngine {
        fn new(items: Vec<FakeItem>) -> Self {
            Self {
                items,
                scan_error: false,
                download_error: false,
                download_calls: Cell::new(0),
                finished_calls: Cell::new(0),
            }
        }
    }

    impl MediaEngine for FakeEngine {
        fn extract_flat(&self, _url: &str, options: &ScanOptions) -> Result<Extracted> {
            assert!(options.flat);
            if self.scan_error {
                return Err(DownloaderError::ExternalToolMissing {
                    tool: "yt-dlp".to_string(),
                });
            }
            let entries = self
                .items
                .iter()
                .map(|item| {
                    Some(MediaItemMetadata {
                        ie_key: item.info.extractor_key.clone(),
                        id: item.info.id.clone(),
                        url: item.info.webpage_url.clone(),
                        title: item.info.title.clone(),
                        ..MediaItemMetadata::default()
                    })
                })
                .collect();
            Ok(Extracted::Entries(entries))
        }

        fn download(
            &self,
            _url: &str,
            _options: &DownloadOptions,
            hooks: &mut dyn DownloadHooks,
        ) -> Result<BatchOutcome> {
            self.download_calls.set(self.download_calls.get() + 1);
            if self.download_error {
                return Err(DownloaderError::UnexpectedOutput("listing vanished".to_string()));
            }
            for item in &self.items {
                if hooks.reject(&item.info).is_some() {
                    continue;
                }
                if let Some(error) = &item.error {
                    hooks.on_error(&item.info, error);
                    continue;
                }
                self.finished_calls.set(self.finished_calls.get() + 1);
                if let HookFlow::Stop(reason) = hooks.on_finished(&item.info) {
                    return Ok(BatchOutcome::Cancelled { reason });
                }
            }
            Ok(BatchOutcome::Completed)
        }
    }

    fn downloader(dir: &Path, engine: FakeEngine) -> Downloader<FakeEngine> {
        Downloader::new(engine, DownloaderConfig::default(), OutputPaths::new(dir))
    }

    #[test]
    fn quota_stops_batch_without_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let items = (1..=5).map(|i| track(&i.to_string())).collect();
        let dl = downloader(dir.path(), FakeEngine::new(items));

        let report = dl.run(LIKES_URL, 2).expect("run");
        assert_eq!(
            report,
            RunReport::Cancelled {
                stats: PrecheckStats {
                    total: 5,
                    already_seen: 0,
                    new_items: 5,
                    duplicates_in_list: 0,
                },
                downloaded: 2,
                reason: "Reached new_song_limit=2".to_string(),
            }
        );

        let ledger = std::fs::read_to_string(dl.paths().seen_path()).expect("ledger");
        assert_eq!(ledger.lines().count(), 2);
        assert!(!dl.paths().error_log_path().exists());
        assert_eq!(dl.engine().finished_calls.get(), 2);
    }

    #[test]
    fn zero_limit_downloads_everything_new() {
        let dir = tempfile::tempdir().expect("tempdir");
        let items = (1..=3).map(|i| track(&i.to_string())).collect();
        let dl = downloader(dir.path(), FakeEngine::new(items));

        let report = dl.run(LIKES_URL, 0).expect("run");
        assert!(matches!(report, RunReport::Completed { downloaded: 3, .. }));

        let log = std::fs::read_to_string(dl.paths().log_path()).expect("log");
        assert_eq!(
            log.lines().collect::<Vec<_>>(),
            vec![
                "Track 1 - Artist (soundcloud:1)",
                "Track 2 - Artist (soundcloud:2)",
                "Track 3 - Artist (soundcloud:3)",
            ]
        );
    }

    #[test]
    fn nothing_new_skips_download_entirely() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = OutputPaths::new(dir.path());
        for i in 1..=3 {
            crate::ledger::append_seen_record(&paths.seen_path(), &track(&i.to_string()).info)
                .expect("seed ledger");
        }
        let items = (1..=3).map(|i| track(&i.to_string())).collect();
        let dl = downloader(dir.path(), FakeEngine::new(items));

        let report = dl.run(LIKES_URL, 0).expect("run");
        assert_eq!(
            report,
            RunReport::NothingNew {
                stats: PrecheckStats {
                    total: 3,
                    already_seen: 3,
                    new_items: 0,
                    duplicates_in_list: 0,
                },
            }
        );
        assert_eq!(dl.engine().download_calls.get(), 0);
    }

    #[test]
    fn known_and_overlong_items_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = OutputPaths::new(dir.path());
        crate::ledger::append_seen_record(&paths.seen_path(), &track("old").info)
            .expect("seed ledger");

        let items = vec![track("old"), long_track("long"), track("new")];
        let dl = downloader(dir.path(), FakeEngine::new(items));

        let report = dl.run(LIKES_URL, 0).expect("run");
        assert_eq!(report.downloaded(), 1);

        let keys = load_seen_keys(&paths.seen_path());
        assert!(keys.contains("soundcloud:new"));
        assert!(!keys.contains("soundcloud:long"));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn item_errors_are_logged_and_batch_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let items = vec![
            failing_track("bad", "HTTP Error 404: Not Found"),
            track("good"),
        ];
        let dl = downloader(dir.path(), FakeEngine::new(items));

        let report = dl.run(LIKES_URL, 0).expect("run");
        assert!(matches!(report, RunReport::Completed { downloaded: 1, .. }));

        let errors = std::fs::read_to_string(dl.paths().error_log_path()).expect("error log");
        assert_eq!(errors, "Track bad - HTTP Error 404: Not Found\n");
        assert!(!load_seen_keys(&dl.paths().seen_path()).contains("soundcloud:bad"));
    }

    #[test]
    fn download_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = FakeEngine::new(vec![track("1")]);
        engine.download_error = true;
        let dl = downloader(dir.path(), engine);

        let report = dl.run(LIKES_URL, 0).expect("run");
        let RunReport::Failed { stats, downloaded, error } = report else {
            panic!("expected failure report");
        };
        assert_eq!(stats.map(|s| s.new_items), Some(1));
        assert_eq!(downloaded, 0);
        assert!(error.contains("listing vanished"));
    }

    #[test]
    fn precheck_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = FakeEngine::new(vec![track("1")]);
        engine.scan_error = true;
        let dl = downloader(dir.path(), engine);

        let report = dl.run(LIKES_URL, 0).expect("run");
        assert!(matches!(report, RunReport::Failed { stats: None, .. }));
        assert_eq!(dl.engine().download_calls.get(), 0);
    }

    #[test]
    fn invalid_url_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out");
        let dl = downloader(&out, FakeEngine::new(Vec::new()));

        assert!(matches!(dl.run("not a url", 0), Err(DownloaderError::InvalidUrl(_))));
        assert!(matches!(
            dl.run("ftp://soundcloud.com/x", 0),
            Err(DownloaderError::InvalidUrl(_))
        ));
        assert!(!out.exists());
    }

    #[test]
    fn finished_hook_ignores_repeats_and_overlong_items() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = OutputPaths::new(dir.path());
        let ledger = SeenLedger::load(paths.seen_path());
        let mut state = RunState::new(ledger, 0, 900, &paths);

        let item = track("dup").info;
        assert_eq!(state.on_finished(&item), HookFlow::Continue);
        assert_eq!(state.on_finished(&item), HookFlow::Continue);
        assert_eq!(state.on_finished(&long_track("long").info), HookFlow::Continue);

        assert_eq!(state.completed(), 1);
        assert_eq!(state.ledger().len(), 1);
        let ledger = std::fs::read_to_string(paths.seen_path()).expect("ledger");
        assert_eq!(ledger.lines().count(), 1);
    }

    #[test]
    fn reject_reason_names_the_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = OutputPaths::new(dir.path());
        let mut state = RunState::new(SeenLedger::load(paths.seen_path()), 0, 900, &paths);

        let item = track("k").info;
        assert_eq!(state.reject(&item), None);
        state.on_finished(&item);
        assert_eq!(
            state.reject(&item),
            Some("Skipping (already downloaded): soundcloud:k".to_string())
        );
        assert!(state
            .reject(&long_track("x").info)
            .is_some_and(|r| r.contains("15 minutes")));
    }

    #[test]
    fn redacted_url_keeps_only_host() {
        assert_eq!(
            redact_url_for_log("https://soundcloud.com/someone/likes?secret=1"),
            "https://soundcloud.com/..."
        );
        assert_eq!(redact_url_for_log("::"), "[invalid-url]");
    }
}
