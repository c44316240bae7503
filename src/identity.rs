use crate::models::{non_empty, MediaItemMetadata};

const UNKNOWN: &str = "unknown";

/// Stable `<extractor>:<id>` key for an item.
///
/// Works for both flat listing entries (`ie_key` + `url`) and fully resolved
/// items (`extractor_key` + `webpage_url`), so the same track yields the same
/// key whichever way it was scanned.
pub fn compute_key(info: &MediaItemMetadata) -> String {
    let extractor = non_empty(info.extractor_key.as_deref())
        .or_else(|| non_empty(info.extractor.as_deref()))
        .or_else(|| non_empty(info.ie_key.as_deref()))
        .unwrap_or(UNKNOWN)
        .to_lowercase();

    let item = non_empty(info.id.as_deref())
        .or_else(|| non_empty(info.webpage_url.as_deref()))
        .or_else(|| non_empty(info.url.as_deref()))
        .or_else(|| non_empty(info.original_url.as_deref()))
        .unwrap_or(UNKNOWN);

    format!("{extractor}:{item}")
}
