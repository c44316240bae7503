use crate::identity::compute_key;
use crate::models::{MediaItemMetadata, SeenRecord};
use crate::Result;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads every key out of a `seen.jsonl` file.
///
/// A missing file is an empty ledger. Blank lines, lines that are not JSON
/// objects and records without a `key` are skipped; this never fails.
pub fn load_seen_keys(path: &Path) -> HashSet<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return seen,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "seen ledger unreadable, starting empty");
            return seen;
        }
    };

    let mut skipped = 0_usize;
    for raw in bytes.split(|b| *b == b'\n') {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let key = serde_json::from_str::<serde_json::Value>(line)
            .ok()
            .and_then(|obj| obj.get("key").and_then(|k| k.as_str()).map(str::to_string))
            .filter(|k| !k.is_empty());
        match key {
            Some(key) => {
                seen.insert(key);
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(path = %path.display(), skipped, "skipped malformed ledger lines");
    }
    seen
}

pub fn seen_record(info: &MediaItemMetadata) -> SeenRecord {
    SeenRecord {
        key: compute_key(info),
        title: info.title.clone(),
        uploader: info.display_uploader().map(str::to_string),
        webpage_url: info.webpage_url.clone(),
    }
}

/// Appends one record as a single JSON line. The file is opened and closed
/// on every call; callers must not append to the same path concurrently.
pub fn append_seen_record(path: &Path, info: &MediaItemMetadata) -> Result<()> {
    let line = serde_json::to_string(&seen_record(info))?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format!("{line}\n").as_bytes())?;
    Ok(())
}

/// In-memory view of the ledger backed by its append-only file.
///
/// Both the key set and the file only ever grow.
#[derive(Debug, Clone)]
pub struct SeenLedger {
    path: PathBuf,
    keys: HashSet<String>,
}

impl SeenLedger {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let keys = load_seen_keys(&path);
        Self { path, keys }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> &HashSet<String> {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Appends the item's record, then holds its key. Returns `false` without
    /// touching the file when the key was already present. A failed append
    /// leaves the key out so memory never runs ahead of the file.
    pub fn record(&mut self, info: &MediaItemMetadata) -> Result<bool> {
        let key = compute_key(info);
        if self.keys.contains(&key) {
            return Ok(false);
        }
        append_seen_record(&self.path, info)?;
        self.keys.insert(key);
        Ok(true)
    }
}
