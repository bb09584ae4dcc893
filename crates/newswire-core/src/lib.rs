//! Core article model, snapshot envelope and identity helpers for newswire.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const CRATE_NAME: &str = "newswire-core";

/// Length of the hex identifier derived from an article URL.
pub const ARTICLE_ID_LEN: usize = 16;

/// Fields that must be present (non-empty) before an article may be persisted.
pub const REQUIRED_FIELDS: [&str; 5] = ["id", "title", "source", "url", "published_at"];

/// Source-specific attributes (author, upvotes, ...). Insertion order is preserved.
pub type Metadata = serde_json::Map<String, JsonValue>;

/// Derive the stable article identifier from its URL.
///
/// The URL is hashed verbatim: trailing slashes, query strings and casing all
/// produce distinct ids.
pub fn identify(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ARTICLE_ID_LEN);
    id
}

/// One ingested news item.
///
/// Decoding is lenient so that loosely-formed records survive a load
/// untouched: absent or `null` fields take their defaults and keys this type
/// does not know are carried in `extra`. Completeness is only enforced at
/// save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub published_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub saved: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub extra: Metadata,
}

impl Article {
    /// Fresh, unsaved article whose id is derived from `url`.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
        published_at: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: identify(&url),
            title: title.into(),
            source: source.into(),
            url,
            summary: String::new(),
            published_at: published_at.into(),
            category: String::new(),
            saved: false,
            metadata: Metadata::new(),
            extra: Metadata::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Names of required fields that are empty on this record.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let values = [
            &self.id,
            &self.title,
            &self.source,
            &self.url,
            &self.published_at,
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(values)
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn published_at_utc(&self) -> Result<DateTime<Utc>, TimestampError> {
        parse_timestamp(&self.published_at)
    }

    /// Title used in diagnostics; falls back to the id for untitled records.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

/// Persisted aggregate: the full article set plus the time of the last save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub articles: Vec<Article>,
}

impl Snapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            articles: Vec::new(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Article> {
        self.articles.iter_mut().find(|a| a.id == id)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts any timestamp [`parse_timestamp`] understands; anything else
/// (null, a number, an unknown format) reads as the current time.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(JsonValue::as_str)
        .and_then(|s| parse_timestamp(s).ok())
        .unwrap_or_else(Utc::now))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,
    #[error("unrecognized timestamp format: {0}")]
    Unrecognized(String),
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(TimestampError::Unrecognized(trimmed.to_string()))
}
