use crate::models::MediaItemMetadata;

/// Returns a skip reason when the item runs longer than `max_seconds`.
/// A missing duration counts as zero and passes.
pub fn check_duration(info: &MediaItemMetadata, max_seconds: u64) -> Option<String> {
    let duration = info.duration.unwrap_or(0.0);
    if duration > max_seconds as f64 {
        return Some(format!(
            "Skipping track longer than {} ({duration:.0}s)",
            describe_limit(max_seconds)
        ));
    }
    None
}

fn describe_limit(max_seconds: u64) -> String {
    if max_seconds >= 60 && max_seconds % 60 == 0 {
        format!("{} minutes", max_seconds / 60)
    } else {
        format!("{max_seconds} seconds")
    }
}
