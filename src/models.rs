use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// One remote item as reported by the engine.
///
/// Flat listing entries usually carry only `ie_key`, `id`, `url` and a
/// title; fully resolved items carry `extractor_key`, `webpage_url`,
/// `uploader`, `duration` and so on. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaItemMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub extractor_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub extractor: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ie_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub webpage_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub uploader: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
}

impl MediaItemMetadata {
    pub fn display_title(&self) -> &str {
        non_empty(self.title.as_deref()).unwrap_or("Unknown")
    }

    pub fn display_uploader(&self) -> Option<&str> {
        non_empty(self.uploader.as_deref()).or_else(|| non_empty(self.channel.as_deref()))
    }

    /// URL that can be handed back to the engine to resolve this item.
    pub fn reference_url(&self) -> Option<&str> {
        non_empty(self.webpage_url.as_deref())
            .or_else(|| non_empty(self.url.as_deref()))
            .or_else(|| non_empty(self.original_url.as_deref()))
    }
}

/// One line of `seen.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub key: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub webpage_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckStats {
    pub total: usize,
    pub already_seen: usize,
    pub new_items: usize,
    pub duplicates_in_list: usize,
}

/// Result of a metadata-only extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Single(MediaItemMetadata),
    /// Entries the engine could not resolve are `None`.
    Entries(Vec<Option<MediaItemMetadata>>),
}

impl Extracted {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if let Some(entries) = value.get("entries").and_then(|v| v.as_array()) {
            let parsed = entries
                .iter()
                .map(|entry| {
                    if entry.is_object() {
                        serde_json::from_value(entry.clone()).ok()
                    } else {
                        None
                    }
                })
                .collect();
            return Ok(Extracted::Entries(parsed));
        }
        Ok(Extracted::Single(serde_json::from_value(value)?))
    }

    pub fn into_entries(self) -> Vec<Option<MediaItemMetadata>> {
        match self {
            Extracted::Single(item) => vec![Some(item)],
            Extracted::Entries(entries) => entries,
        }
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_json_keeps_null_entries_as_none() {
        let value = serde_json::json!({
            "_type": "playlist",
            "title": "Likes",
            "entries": [
                {"ie_key": "Soundcloud", "id": "111", "url": "https://soundcloud.com/a/one"},
                null,
                {"ie_key": "Soundcloud", "id": 222, "url": "https://soundcloud.com/a/two"}
            ]
        });

        let entries = Extracted::from_json(value).expect("parse").into_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_none());
        assert_eq!(entries[2].as_ref().and_then(|e| e.id.as_deref()), Some("222"));
    }

    #[test]
    fn single_item_json_becomes_one_entry() {
        let value = serde_json::json!({
            "extractor_key": "Soundcloud",
            "id": "333",
            "title": "Track",
            "duration": 241.5,
            "uploader": null
        });

        let extracted = Extracted::from_json(value).expect("parse");
        let Extracted::Single(item) = &extracted else {
            panic!("expected single item");
        };
        assert_eq!(item.duration, Some(241.5));
        assert_eq!(item.uploader, None);
        assert_eq!(extracted.into_entries().len(), 1);
    }

    #[test]
    fn display_fields_fall_back() {
        let item = MediaItemMetadata {
            title: Some(String::new()),
            channel: Some("Channel".to_string()),
            ..MediaItemMetadata::default()
        };
        assert_eq!(item.display_title(), "Unknown");
        assert_eq!(item.display_uploader(), Some("Channel"));
    }

    #[test]
    fn reference_url_prefers_webpage_url() {
        let item = MediaItemMetadata {
            webpage_url: Some("https://soundcloud.com/a/page".to_string()),
            url: Some("https://api.soundcloud.com/tracks/1".to_string()),
            ..MediaItemMetadata::default()
        };
        assert_eq!(item.reference_url(), Some("https://soundcloud.com/a/page"));

        let flat = MediaItemMetadata {
            url: Some("https://soundcloud.com/a/flat".to_string()),
            ..MediaItemMetadata::default()
        };
        assert_eq!(flat.reference_url(), Some("https://soundcloud.com/a/flat"));
    }
}
