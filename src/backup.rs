//! Point-in-time snapshots of the data directory.
//!
//! A snapshot is a directory `<data>/<prefix><unix-seconds>/` holding a
//! shallow copy of every file directly inside `<data>`. Only directories with
//! purely numeric names rotate; prefixed ones (upgrade snapshots) are kept.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::{now_unix, NotebookContext, NotebookError, Result};

/// Snapshots the data directory and prunes old snapshots.
#[derive(Debug, Clone)]
pub struct BackupManager {
    data_dir: PathBuf,
}

impl BackupManager {
    pub fn new(context: &NotebookContext) -> Self {
        Self::with_data_dir(context.data_dir())
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Takes a snapshot, logging and swallowing any failure.
    pub fn create_backup(&self, prefix: &str) -> Option<PathBuf> {
        match self.try_create_backup(prefix) {
            Ok(path) => {
                info!("Created data snapshot at {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to create data snapshot: {}", e);
                None
            }
        }
    }

    /// Takes a snapshot. `prefix` may contain path separators, in which case
    /// the intermediate directories are created.
    pub fn try_create_backup(&self, prefix: &str) -> Result<PathBuf> {
        let target = self.data_dir.join(format!("{}{}", prefix, now_unix()));
        fs::create_dir_all(&target).map_err(|e| {
            error!("Failed to create snapshot directory {}: {}", target.display(), e);
            NotebookError::DirectoryError {
                path: target.clone(),
            }
        })?;

        let mut copied = 0;
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let destination = target.join(entry.file_name());
            fs::copy(entry.path(), &destination).map_err(|e| NotebookError::BackupFailed {
                message: format!("Failed to copy {}: {}", entry.path().display(), e),
            })?;
            copied += 1;
        }

        debug!("Copied {} files into {}", copied, target.display());
        Ok(target)
    }

    /// Rotating snapshots, oldest first, with their timestamps.
    pub fn list_backups(&self) -> Result<Vec<(u64, PathBuf)>> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(timestamp) = name.parse::<u64>() {
                backups.push((timestamp, entry.path().to_path_buf()));
            }
        }

        backups.sort();
        Ok(backups)
    }

    /// Removes the oldest rotating snapshots until at most `max` remain.
    /// `max == 0` keeps everything. Returns how many were removed.
    pub fn delete_backups(&self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }

        let backups = match self.list_backups() {
            Ok(backups) => backups,
            Err(e) => {
                error!("Failed to list data snapshots: {}", e);
                return 0;
            }
        };

        let excess = backups.len().saturating_sub(max);
        let mut removed = 0;
        for (_, path) in backups.into_iter().take(excess) {
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!("Failed to remove snapshot {}: {}", path.display(), e);
                break;
            }
            debug!("Removed snapshot {}", path.display());
            removed += 1;
        }

        if removed > 0 {
            info!("Pruned {} data snapshots, keeping {}", removed, max);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_only_top_level_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path();
        fs::write(data.join("notebook.db"), b"db").unwrap();
        fs::write(data.join("notebook.json"), b"{}").unwrap();
        fs::create_dir_all(data.join("100")).unwrap();
        fs::write(data.join("100").join("old.db"), b"old").unwrap();

        let manager = BackupManager::with_data_dir(data);
        let snapshot = manager.try_create_backup("").unwrap();

        assert_eq!(fs::read(snapshot.join("notebook.db")).unwrap(), b"db");
        assert!(snapshot.join("notebook.json").exists());
        assert!(!snapshot.join("old.db").exists());
    }

    #[test]
    fn prefixed_snapshots_are_not_rotating() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::with_data_dir(dir.path());
        manager.try_create_backup("upgrade/v3_").unwrap();
        fs::create_dir_all(dir.path().join("v2_100")).unwrap();
        fs::create_dir_all(dir.path().join("200")).unwrap();

        let backups = manager.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].0, 200);
    }

    #[test]
    fn zero_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        for ts in [1, 2, 3] {
            fs::create_dir_all(dir.path().join(ts.to_string())).unwrap();
        }
        let manager = BackupManager::with_data_dir(dir.path());
        assert_eq!(manager.delete_backups(0), 0);
        assert_eq!(manager.list_backups().unwrap().len(), 3);
    }

    #[test]
    fn failed_snapshot_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let manager = BackupManager::with_data_dir(&blocker);
        assert!(manager.create_backup("").is_none());
    }
}
