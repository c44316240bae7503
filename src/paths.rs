use std::path::{Path, PathBuf};

pub const SEEN_LEDGER_FILENAME: &str = "seen.jsonl";
pub const DOWNLOAD_LOG_FILENAME: &str = "download_log.txt";
pub const ERROR_LOG_FILENAME: &str = "download_log_ERROR.txt";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

/// Every file the downloader touches lives directly under one output directory.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub output_dir: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn seen_path(&self) -> PathBuf {
        self.output_dir.join(SEEN_LEDGER_FILENAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(DOWNLOAD_LOG_FILENAME)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.output_dir.join(ERROR_LOG_FILENAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.output_dir.join(CONFIG_FILENAME)
    }

    /// Joins a yt-dlp filename template onto the output directory so that
    /// every track lands in the same folder.
    pub fn output_template(&self, template: &str) -> String {
        let file_part = Path::new(template)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| template.to_string());
        self.output_dir.join(file_part).to_string_lossy().to_string()
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)
    }
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}
