use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{write_file_atomically, Category, Note, NotebookError, Result, STORE_FILE_NAME};

/// File name of the persisted configuration inside the root directory.
pub const CONFIG_FILE_NAME: &str = "notebook.json";

/// Directory holding the store file and its snapshots.
pub const DATA_DIR_NAME: &str = "data";

/// Directory receiving CSV exports.
pub const EXPORT_DIR_NAME: &str = "export";

/// Environment variable overriding the root directory.
pub const HOME_ENV_VAR: &str = "NOTEKEEPER_HOME";

/// Application configuration settings.
///
/// Keys are PascalCase so that configuration files written by earlier
/// versions, which embedded the documents directly, still parse.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase", default)]
pub struct NotebookConfig {
    /// Partial save interval in milliseconds
    pub save_frequency: u64,

    /// Full save interval in milliseconds
    pub full_save_frequency: u64,

    /// Filesystem snapshot interval in milliseconds
    pub backup_frequency: u64,

    /// Number of rotating snapshots to keep, 0 keeps all
    pub backup_retention: usize,

    /// Unix milliseconds of the last filesystem snapshot
    pub last_backup: i64,

    /// Persisted sort code for notes
    pub note_sort_type: i32,

    /// Persisted sort code for categories
    pub category_sort_type: i32,

    /// Whether notes without categories pass the category filter
    pub is_no_category_selected: bool,

    /// Whether text search also looks at note bodies
    pub include_note_bodies_in_search: bool,

    /// Where full saves mirror the JSON backup, if anywhere
    pub automatic_export_path: Option<PathBuf>,

    /// Application version that last wrote this file
    pub plugin_version: i32,

    /// Legacy embedded notes, emptied by the migrator
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,

    /// Legacy embedded categories, emptied by the migrator
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            save_frequency: 5_000,
            full_save_frequency: 14_400_000,
            backup_frequency: 86_400_000,
            backup_retention: 7,
            last_backup: 0,
            note_sort_type: 4,
            category_sort_type: 4,
            is_no_category_selected: true,
            include_note_bodies_in_search: false,
            automatic_export_path: None,
            plugin_version: 0,
            notes: Vec::new(),
            categories: Vec::new(),
        }
    }
}

impl NotebookConfig {
    /// The mirror path, ignoring blank values left by older versions.
    pub fn export_path(&self) -> Option<&Path> {
        self.automatic_export_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Whether documents are still embedded in the configuration.
    pub fn has_legacy_documents(&self) -> bool {
        !self.notes.is_empty() || !self.categories.is_empty()
    }
}

/// Owner of the live configuration and its file.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<NotebookConfig>,
}

impl ConfigStore {
    /// Loads the configuration at `path`, or defaults if the file is absent.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| NotebookError::ConfigError {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?
        } else {
            debug!(
                "No configuration at {}, using defaults",
                path.display()
            );
            NotebookConfig::default()
        };

        Ok(Self {
            path,
            config: Mutex::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, NotebookConfig>> {
        self.config
            .lock()
            .map_err(|_| NotebookError::LockAcquisitionFailed {
                message: "Failed to acquire lock on configuration".to_string(),
            })
    }

    /// A copy of the current configuration.
    pub fn snapshot(&self) -> Result<NotebookConfig> {
        Ok(self.lock()?.clone())
    }

    pub fn read<R>(&self, f: impl FnOnce(&NotebookConfig) -> R) -> Result<R> {
        Ok(f(&*self.lock()?))
    }

    /// Mutates the in-memory configuration. Call [`ConfigStore::save`] to persist.
    pub fn update<R>(&self, f: impl FnOnce(&mut NotebookConfig) -> R) -> Result<R> {
        Ok(f(&mut *self.lock()?))
    }

    /// Persists the configuration atomically.
    pub fn save(&self) -> Result<()> {
        let json = {
            let config = self.lock()?;
            serde_json::to_string_pretty(&*config)?
        };
        write_file_atomically(&self.path, json.as_bytes())?;
        debug!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}

/// Explicit context handed to every component constructor.
#[derive(Debug, Clone)]
pub struct NotebookContext {
    root_dir: PathBuf,
    config: Arc<ConfigStore>,
}

impl NotebookContext {
    /// Opens the notebook rooted at `root_dir`, creating the directory layout.
    pub fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let data_dir = root_dir.join(DATA_DIR_NAME);
        fs::create_dir_all(&data_dir).map_err(|e| {
            warn!("Failed to create data directory {}: {}", data_dir.display(), e);
            NotebookError::DirectoryError {
                path: data_dir.clone(),
            }
        })?;

        let config = ConfigStore::load(root_dir.join(CONFIG_FILE_NAME))?;
        info!("Notebook root: {}", root_dir.display());

        Ok(Self {
            root_dir,
            config: Arc::new(config),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root_dir.join(DATA_DIR_NAME)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.root_dir.join(EXPORT_DIR_NAME)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join(STORE_FILE_NAME)
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }
}

/// Picks the root directory: explicit value, then environment, then the
/// platform data directory, then the working directory.
pub fn resolve_root_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }

    if let Ok(dir) = std::env::var(HOME_ENV_VAR) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    match dirs::data_dir() {
        Some(dir) => dir.join("notekeeper"),
        None => PathBuf::from("notekeeper"),
    }
}
