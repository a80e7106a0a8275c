// src/backup.rs - keeps the external backup file in sync with the store
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{load_items_from_file, ClipError, Item, Result, StorageChange, ITEMS_KEY};

#[derive(Debug, Clone, Default)]
pub struct BackupStatus {
    /// Whether the worker is running
    pub is_running: bool,
    /// The time the last snapshot was written
    pub last_backup_time: Option<DateTime<Utc>>,
    /// The path of the last snapshot
    pub last_backup_path: Option<PathBuf>,
    /// Snapshots written since the worker started
    pub snapshots_written: usize,
    /// Most recent write failure, cleared by the next success
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub enum BackupCommand {
    /// Write the given collection immediately and report the outcome
    SnapshotNow(Vec<Item>, oneshot::Sender<Result<()>>),
    /// Write anything still queued, then stop
    Stop,
}

/// Serializes `items` as a pretty JSON array and atomically replaces `path`.
pub fn write_snapshot(path: &Path, items: &[Item]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| ClipError::BackupFailed {
        message: format!("cannot create {}: {}", dir.display(), e),
    })?;

    let json = serde_json::to_string_pretty(items)?;
    let mut temp_file = NamedTempFile::new_in(&dir).map_err(|e| ClipError::BackupFailed {
        message: e.to_string(),
    })?;
    temp_file
        .write_all(json.as_bytes())
        .and_then(|_| temp_file.flush())
        .map_err(|e| ClipError::BackupFailed {
            message: format!("failed to write snapshot: {}", e),
        })?;
    temp_file.persist(path).map_err(|e| ClipError::BackupFailed {
        message: format!("failed to replace {}: {}", path.display(), e.error),
    })?;

    trace!("Wrote {} items to {}", items.len(), path.display());
    Ok(())
}

/// Reads the backup file, treating anything unusable as "no backup".
pub fn restore(path: &Path) -> Vec<Item> {
    if !path.exists() {
        info!("No backup found at {}", path.display());
        return Vec::new();
    }

    match load_items_from_file(path) {
        Ok(items) => {
            info!("Restored {} items from {}", items.len(), path.display());
            items
        }
        Err(e) => {
            warn!("Ignoring unreadable backup {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Writes a snapshot for a store change and records the outcome.
///
/// Failures stay here: they are logged and kept in the status, never returned.
fn on_store_changed(
    backup_file: &Path,
    new_value: serde_json::Value,
    status: &Mutex<BackupStatus>,
) {
    let result = serde_json::from_value::<Vec<Item>>(new_value)
        .map_err(ClipError::from)
        .and_then(|items| write_snapshot(backup_file, &items));
    record(backup_file, &result, status);
}

fn record(backup_file: &Path, result: &Result<()>, status: &Mutex<BackupStatus>) {
    let Ok(mut status) = status.lock() else {
        error!("Backup status lock poisoned");
        return;
    };

    match result {
        Ok(()) => {
            debug!("Backup written to {}", backup_file.display());
            status.last_backup_time = Some(Utc::now());
            status.last_backup_path = Some(backup_file.to_path_buf());
            status.snapshots_written += 1;
            status.last_error = None;
        }
        Err(e) => {
            error!("Backup to {} failed: {}", backup_file.display(), e);
            status.last_error = Some(e.to_string());
        }
    }
}

/// Only the newest queued value matters; every change carries the full collection.
fn latest_items_change(
    first: Option<StorageChange>,
    changes: &mut mpsc::UnboundedReceiver<StorageChange>,
) -> Option<StorageChange> {
    let mut latest = first.filter(|c| c.key == ITEMS_KEY);
    let mut skipped = 0;
    while let Ok(change) = changes.try_recv() {
        if change.key == ITEMS_KEY {
            if latest.replace(change).is_some() {
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        trace!("Coalesced {} queued snapshots", skipped);
    }
    latest
}

/// Background task that mirrors store changes into the backup file.
pub struct BackupWorker {
    /// File rewritten on every change
    backup_file: PathBuf,

    /// Channel to send commands to the worker task
    command_tx: Option<mpsc::Sender<BackupCommand>>,

    /// Handle to the worker task
    task: Option<JoinHandle<()>>,

    /// Shared with the task
    status: Arc<Mutex<BackupStatus>>,
}

impl BackupWorker {
    pub fn new(backup_file: impl Into<PathBuf>) -> Self {
        let backup_file = backup_file.into();
        info!("Initializing backup worker for {}", backup_file.display());

        Self {
            backup_file,
            command_tx: None,
            task: None,
            status: Arc::new(Mutex::new(BackupStatus::default())),
        }
    }

    pub fn backup_file(&self) -> &Path {
        &self.backup_file
    }

    /// Reads the backup this worker maintains.
    pub fn restore(&self) -> Vec<Item> {
        restore(&self.backup_file)
    }

    /// Spawns the worker on the current tokio runtime.
    pub fn start(&mut self, mut changes: mpsc::UnboundedReceiver<StorageChange>) -> Result<()> {
        if self.task.is_some() {
            return Err(ClipError::BackupFailed {
                message: "Backup worker is already running".to_string(),
            });
        }

        info!("Starting backup worker...");
        let (command_tx, mut command_rx) = mpsc::channel(10);
        let backup_file = self.backup_file.clone();
        let status = Arc::clone(&self.status);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    change = changes.recv() => match change {
                        Some(change) => {
                            if let Some(latest) = latest_items_change(Some(change), &mut changes) {
                                on_store_changed(&backup_file, latest.new_value, &status);
                            }
                        }
                        None => {
                            debug!("Change feed closed, backup worker exiting");
                            break;
                        }
                    },
                    Some(cmd) = command_rx.recv() => match cmd {
                        BackupCommand::SnapshotNow(items, reply) => {
                            let result = write_snapshot(&backup_file, &items);
                            record(&backup_file, &result, &status);
                            if reply.send(result).is_err() {
                                debug!("Snapshot requester went away before the reply");
                            }
                        }
                        BackupCommand::Stop => {
                            if let Some(latest) = latest_items_change(None, &mut changes) {
                                on_store_changed(&backup_file, latest.new_value, &status);
                            }
                            info!("Backup worker stopping...");
                            break;
                        }
                    }
                }
            }

            if let Ok(mut status) = status.lock() {
                status.is_running = false;
            }
        });

        self.command_tx = Some(command_tx);
        self.task = Some(task);
        if let Ok(mut status) = self.status.lock() {
            status.is_running = true;
        }

        Ok(())
    }

    /// Stop the worker if it's running, after it has written what was queued
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            debug!("Backup worker is not running");
            return Ok(());
        };

        if let Some(tx) = self.command_tx.take() {
            if let Err(e) = tx.send(BackupCommand::Stop).await {
                debug!("Backup worker already gone: {}", e);
            }
        }

        task.await.map_err(|e| {
            let error_mgs = format!("Failed to stop backup worker: {}", e);
            error!("{}", error_mgs);
            ClipError::BackupFailed { message: error_mgs }
        })?;

        info!("Backup worker stopped");
        Ok(())
    }

    /// Write a snapshot of `items` now, waiting for the worker's result
    pub async fn snapshot_now(&self, items: Vec<Item>) -> Result<()> {
        let tx = self.command_tx.as_ref().ok_or_else(|| ClipError::BackupFailed {
            message: "Backup worker is not running".to_string(),
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(BackupCommand::SnapshotNow(items, reply_tx))
            .await
            .map_err(|e| ClipError::BackupFailed {
                message: format!("Failed to send backup command: {}", e),
            })?;

        reply_rx.await.map_err(|_| ClipError::BackupFailed {
            message: "Backup worker stopped before writing the snapshot".to_string(),
        })?
    }

    /// Get the current status of the backup worker
    pub fn get_status(&self) -> BackupStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }
}
