use crate::identity::compute_key;
use crate::models::MediaItemMetadata;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// `<title> - <uploader> (<key>)`
pub fn success_line(info: &MediaItemMetadata) -> String {
    format!(
        "{} - {} ({})",
        info.display_title(),
        info.display_uploader().unwrap_or("Unknown"),
        compute_key(info)
    )
}

/// `<title> - <error>`
pub fn error_line(info: &MediaItemMetadata, error: &str) -> String {
    let error = if error.trim().is_empty() {
        "Unknown error"
    } else {
        error.trim()
    };
    format!("{} - {error}", info.display_title())
}

pub fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{line}\n").as_bytes())
}
