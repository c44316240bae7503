use crate::config::DownloaderConfig;
use crate::models::{Extracted, MediaItemMetadata};
use crate::paths::OutputPaths;
use crate::Result;

/// Options for a metadata-only listing scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub flat: bool,
    pub quiet: bool,
    pub ignore_errors: bool,
    pub remote_components: Vec<String>,
    pub timeout_secs: u64,
}

impl ScanOptions {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            flat: true,
            quiet: true,
            ignore_errors: true,
            remote_components: config.remote_components.clone(),
            timeout_secs: config.scan_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    pub sleep_requests_secs: f64,
    pub sleep_interval_secs: f64,
    pub max_sleep_interval_secs: f64,
    pub rate_limit_bytes: u64,
    pub concurrent_fragments: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostProcessor {
    ExtractAudio { codec: String, quality: String },
    EmbedThumbnail,
    EmbedMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    pub format: String,
    /// Full output template including the output directory.
    pub output_template: String,
    pub restrict_filenames: bool,
    pub windows_filenames: bool,
    pub pacing: Pacing,
    pub postprocessors: Vec<PostProcessor>,
    pub ignore_errors: bool,
    pub remote_components: Vec<String>,
    pub scan_timeout_secs: u64,
    pub item_timeout_secs: u64,
}

impl DownloadOptions {
    pub fn from_config(config: &DownloaderConfig, paths: &OutputPaths) -> Self {
        let mut postprocessors = vec![PostProcessor::ExtractAudio {
            codec: config.audio_codec.clone(),
            quality: config.audio_quality.clone(),
        }];
        if config.embed_thumbnail {
            postprocessors.push(PostProcessor::EmbedThumbnail);
        }
        if config.embed_metadata {
            postprocessors.push(PostProcessor::EmbedMetadata);
        }

        Self {
            format: config.format.clone(),
            output_template: paths.output_template(&config.output_template),
            restrict_filenames: config.restrict_filenames,
            windows_filenames: config.windows_filenames,
            pacing: Pacing {
                sleep_requests_secs: config.sleep_requests_secs,
                sleep_interval_secs: config.sleep_interval_secs,
                max_sleep_interval_secs: config.max_sleep_interval_secs,
                rate_limit_bytes: config.rate_limit_bytes,
                concurrent_fragments: config.concurrent_fragments.max(1),
            },
            postprocessors,
            ignore_errors: true,
            remote_components: config.remote_components.clone(),
            scan_timeout_secs: config.scan_timeout_secs,
            item_timeout_secs: config.item_timeout_secs,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            flat: true,
            quiet: true,
            ignore_errors: self.ignore_errors,
            remote_components: self.remote_components.clone(),
            timeout_secs: self.scan_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    /// Stop the rest of the batch. Not a failure.
    Stop(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed,
    Cancelled { reason: String },
}

/// Callbacks the engine invokes while working through a batch.
pub trait DownloadHooks {
    /// Checked with the resolved metadata before anything is fetched.
    /// `Some(reason)` skips the item.
    fn reject(&mut self, info: &MediaItemMetadata) -> Option<String>;

    fn on_error(&mut self, info: &MediaItemMetadata, error: &str);

    /// Fires once the item's whole post-processing chain has finished.
    fn on_finished(&mut self, info: &MediaItemMetadata) -> HookFlow;
}

/// The external extraction/download engine.
pub trait MediaEngine {
    fn extract_flat(&self, url: &str, options: &ScanOptions) -> Result<Extracted>;

    fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        hooks: &mut dyn DownloadHooks,
    ) -> Result<BatchOutcome>;
}
