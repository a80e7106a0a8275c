//! Error types for the tagclip application.
//!
//! This module defines custom error types that categorize the different failures
//! that can occur while managing clips, their attachments and the backup copy.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the tagclip application.
#[derive(Error, Debug)]
pub enum ClipError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input rejected before anything was written.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The persisted key-value store could not be read or written.
    #[error("Storage failure for key '{key}': {message}")]
    StorageFailure { key: String, message: String },

    /// Errors related to backup operations.
    #[error("Backup failed: {message}")]
    BackupFailed { message: String },

    /// The attachment sink could not store or resolve a document.
    #[error("Attachment '{name}' failed: {message}")]
    AttachmentFailed { name: String, message: String },

    /// Item was not found when performing an operation.
    #[error("Item not found: {id}")]
    ItemNotFound { id: i64 },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// file not found
    #[error("File not found: {file_path}")]
    FileNotFound { file_path: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl ClipError {
    pub(crate) fn storage(key: &str, message: impl Into<String>) -> Self {
        ClipError::StorageFailure {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
