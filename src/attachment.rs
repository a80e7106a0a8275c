//! Byte storage for uploaded documents.
//!
//! Items never embed document bytes. The sink stores them and hands back a
//! locator; opening a document later passes that locator back to the same sink.
use std::{
    fs,
    io::Write,
    path::{Component, Path, PathBuf},
};

use chrono::Utc;
use log::{debug, error, info};
use tempfile::NamedTempFile;

use crate::{Attachment, ClipError, DocFile, Result};

pub trait AttachmentSink: Send {
    /// Stores the bytes and returns the reference to keep on the item.
    fn store(&self, attachment: &Attachment) -> Result<DocFile>;

    /// Resolves a locator previously returned by [`AttachmentSink::store`].
    fn open(&self, doc: &DocFile) -> Result<PathBuf>;
}

/// Keeps documents as plain files inside one directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn failed(name: &str, message: impl Into<String>) -> ClipError {
        ClipError::AttachmentFailed {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Reduces an uploaded file name to something safe to use inside the sink.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

impl AttachmentSink for DirectorySink {
    fn store(&self, attachment: &Attachment) -> Result<DocFile> {
        if attachment.name.trim().is_empty() {
            return Err(Self::failed("", "attachment has no file name"));
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            error!("Failed to create attachments directory {}: {}", self.dir.display(), e);
            Self::failed(&attachment.name, e.to_string())
        })?;

        let file_name = format!(
            "{}_{}",
            Utc::now().timestamp_millis(),
            sanitize_file_name(&attachment.name)
        );
        let target = self.dir.join(&file_name);
        if target.exists() {
            return Err(Self::failed(
                &attachment.name,
                format!("{} already exists", target.display()),
            ));
        }

        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| Self::failed(&attachment.name, e.to_string()))?;
        temp_file
            .write_all(&attachment.bytes)
            .and_then(|_| temp_file.flush())
            .map_err(|e| Self::failed(&attachment.name, e.to_string()))?;
        temp_file
            .persist(&target)
            .map_err(|e| Self::failed(&attachment.name, e.error.to_string()))?;

        info!(
            "Stored attachment '{}' ({} bytes) as {}",
            attachment.name,
            attachment.bytes.len(),
            file_name
        );

        Ok(DocFile {
            name: attachment.name.clone(),
            locator: file_name,
            media_type: attachment.media_type.clone(),
        })
    }

    fn open(&self, doc: &DocFile) -> Result<PathBuf> {
        let relative = Path::new(&doc.locator);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if doc.locator.is_empty() || !is_plain {
            return Err(Self::failed(
                &doc.name,
                format!("locator '{}' is outside the attachments directory", doc.locator),
            ));
        }

        let path = self.dir.join(relative);
        if !path.is_file() {
            return Err(Self::failed(
                &doc.name,
                format!("no stored document at {}", path.display()),
            ));
        }

        debug!("Resolved attachment '{}' to {}", doc.name, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn upload(name: &str) -> Attachment {
        Attachment {
            name: name.to_string(),
            media_type: "text/plain".to_string(),
            bytes: b"quarterly numbers".to_vec(),
        }
    }

    #[test]
    fn store_then_open_returns_the_same_bytes() {
        let tmp = TempDir::new().unwrap();
        let sink = DirectorySink::new(tmp.path().join("docs"));

        let doc = sink.store(&upload("notes.txt")).unwrap();
        assert_eq!(doc.name, "notes.txt");
        assert_eq!(doc.media_type, "text/plain");
        assert!(doc.locator.ends_with("_notes.txt"));

        let path = sink.open(&doc).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"quarterly numbers");
    }

    #[test]
    fn open_rejects_locators_leaving_the_directory() {
        let tmp = TempDir::new().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let doc = DocFile {
            name: "passwd".into(),
            locator: "../../etc/passwd".into(),
            media_type: String::new(),
        };

        assert!(matches!(
            sink.open(&doc),
            Err(ClipError::AttachmentFailed { .. })
        ));
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a b.pdf"), "a_b.pdf");
        assert_eq!(sanitize_file_name("../../.hidden"), "hidden");
        assert_eq!(sanitize_file_name("///"), "document");
    }
}
