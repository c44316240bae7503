use crate::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_DURATION_SECS: u64 = 900;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Tracks longer than this are never downloaded.
    pub max_duration_secs: u64,
    pub format: String,
    pub audio_codec: String,
    /// Target bitrate in kbit/s for the lossy codec.
    pub audio_quality: String,
    /// yt-dlp output template; only its file name part is used.
    pub output_template: String,
    pub restrict_filenames: bool,
    pub windows_filenames: bool,
    pub embed_thumbnail: bool,
    pub embed_metadata: bool,
    pub sleep_requests_secs: f64,
    pub sleep_interval_secs: f64,
    pub max_sleep_interval_secs: f64,
    pub rate_limit_bytes: u64,
    pub concurrent_fragments: u32,
    pub remote_components: Vec<String>,
    pub yt_dlp_path: Option<PathBuf>,
    /// 0 disables the timeout.
    pub scan_timeout_secs: u64,
    /// 0 disables the timeout.
    pub item_timeout_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            format: "bestaudio/best".to_string(),
            audio_codec: "mp3".to_string(),
            audio_quality: "320".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
            restrict_filenames: true,
            windows_filenames: true,
            embed_thumbnail: true,
            embed_metadata: true,
            sleep_requests_secs: 1.0,
            sleep_interval_secs: 2.0,
            max_sleep_interval_secs: 6.0,
            rate_limit_bytes: 2_000_000,
            concurrent_fragments: 1,
            remote_components: vec!["ejs:github".to_string()],
            yt_dlp_path: None,
            scan_timeout_secs: 600,
            item_timeout_secs: 0,
        }
    }
}

pub fn load(path: &Path) -> Result<DownloaderConfig> {
    if !path.exists() {
        return Ok(DownloaderConfig::default());
    }
    let bytes = std::fs::read(path)?;
    let parsed: DownloaderConfig =
        serde_json::from_slice(&bytes).map_err(|e| DownloaderError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(parsed)
}

pub fn save(path: &Path, config: &DownloaderConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}
