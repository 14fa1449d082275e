//! Error types for the notekeeper library.
//!
//! This module defines the error enum shared by the store, the notebook
//! service, the backup manager and the migrator.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::DocumentKind;

/// The main error type for notekeeper.
#[derive(Error, Debug)]
pub enum NotebookError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to JSON serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised by the embedded document store.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Errors raised while writing CSV exports.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A compressed body was not valid base64.
    #[error("Body decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Document was not found when performing an operation.
    #[error("{kind} not found: {id}")]
    DocumentNotFound { kind: DocumentKind, id: i64 },

    /// Document content violates a model invariant.
    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Errors related to backup operations.
    #[error("Backup failed: {message}")]
    BackupFailed { message: String },

    /// Error when attempting to restore from backup.
    #[error("Restore failed: {message}")]
    RestoreFailed { message: String },

    /// Schema migration could not be completed.
    #[error("Migration failed: {message}")]
    MigrationFailed { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    #[error("Scheduler error: {message}")]
    SchedulerError { message: String },
}
