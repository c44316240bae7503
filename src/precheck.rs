use crate::engine::{MediaEngine, ScanOptions};
use crate::identity::compute_key;
use crate::models::{MediaItemMetadata, PrecheckStats};
use crate::Result;
use std::collections::HashSet;
use tracing::debug;

/// Metadata-only pass over a listing. Nothing is downloaded and the ledger
/// is not touched.
pub fn scan(
    engine: &dyn MediaEngine,
    url: &str,
    seen_keys: &HashSet<String>,
    options: &ScanOptions,
) -> Result<PrecheckStats> {
    let extracted = engine.extract_flat(url, options)?;
    Ok(tally(extracted.into_entries(), seen_keys))
}

/// Classifies each entry as new, already seen, or a repeat within the listing.
pub fn tally<I>(entries: I, seen_keys: &HashSet<String>) -> PrecheckStats
where
    I: IntoIterator<Item = Option<MediaItemMetadata>>,
{
    let mut stats = PrecheckStats::default();
    let mut in_list_keys: HashSet<String> = HashSet::new();

    for entry in entries.into_iter().flatten() {
        stats.total += 1;
        let key = compute_key(&entry);

        if !in_list_keys.insert(key.clone()) {
            debug!(key = %key, "duplicate entry in listing");
            stats.duplicates_in_list += 1;
            continue;
        }

        if seen_keys.contains(&key) {
            stats.already_seen += 1;
        } else {
            stats.new_items += 1;
        }
    }

    stats
}
