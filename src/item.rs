//! Core data structures for the tagclip application.
//!
//! This module contains the item record persisted for every saved clip, the
//! reference record kept for uploaded documents, and the candidate a caller
//! hands to the store when adding a clip.
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Represents a single saved clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique identifier, derived from the creation time in milliseconds
    pub id: i64,
    /// The clipped text
    pub content: String,
    /// Optional link to an external document
    #[serde(default)]
    pub doc_link: Option<String>,
    /// Optional reference to an uploaded document
    #[serde(default)]
    pub doc_file: Option<DocFile>,
    /// Tags in the order they were entered
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the clip was created, always written with three fraction digits
    #[serde(serialize_with = "millis_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Reference to document bytes held by an [`AttachmentSink`](crate::AttachmentSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocFile {
    /// Original file name of the upload
    pub name: String,
    /// Opaque handle understood by the sink that stored the bytes
    #[serde(alias = "downloadId", deserialize_with = "locator_from_any")]
    pub locator: String,
    /// Media type reported for the upload
    #[serde(rename = "type", default)]
    pub media_type: String,
}

/// An uploaded document waiting to be handed to the attachment sink.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Everything a caller supplies when adding a clip.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub content: String,
    pub tags: Vec<String>,
    pub doc_link: Option<String>,
    pub attachment: Option<Attachment>,
}

impl Item {
    /// Creates a new item stamped with the given creation time
    pub fn new(
        id: i64,
        content: String,
        tags: Vec<String>,
        doc_link: Option<String>,
        doc_file: Option<DocFile>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Item {
            id,
            content,
            doc_link,
            doc_file,
            tags,
            timestamp,
        }
    }

    /// Case-insensitive containment check over content and tags.
    ///
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

impl NewItem {
    pub fn new(content: impl Into<String>, tags: Vec<String>) -> Self {
        NewItem {
            content: content.into(),
            tags,
            ..Default::default()
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.doc_link = Some(link.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Current time truncated to milliseconds, matching the precision of the id.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn millis_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// Older documents stored the locator as a numeric download id.
fn locator_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawLocator {
        Text(String),
        Number(i64),
    }

    Ok(match RawLocator::deserialize(deserializer)? {
        RawLocator::Text(s) => s,
        RawLocator::Number(n) => n.to_string(),
    })
}
