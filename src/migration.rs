//! One-shot upgrade from configuration-embedded documents to the store.
//!
//! Earlier versions kept every note and category inside the configuration
//! file. When the store's schema version is still the legacy sentinel, the
//! migrator snapshots the old state, moves the documents into the store,
//! and repairs the category references on every note, which were built
//! against the pre-insert objects.
use std::{fs, path::PathBuf};

use log::{debug, error, info, warn};

use crate::{
    BackupManager, Category, Note, NotebookContext, NotebookError, NotebookService, Result,
    UniqueDocument, CONFIG_FILE_NAME,
};

/// Schema version of a store that has never been migrated.
pub const LEGACY_SCHEMA_VERSION: i32 = 0;

/// Schema version written by this release.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Subdirectory of the data directory holding pre-upgrade snapshots.
pub const UPGRADE_BACKUP_DIR: &str = "upgrade";

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The store was already at `version`; nothing changed.
    UpToDate { version: i32 },
    /// Legacy documents were moved into the store.
    Migrated {
        notes: usize,
        categories: usize,
        backup: PathBuf,
    },
}

/// Runs the legacy-to-store upgrade.
pub struct Migrator<'a> {
    context: &'a NotebookContext,
    service: &'a NotebookService,
    backups: &'a BackupManager,
}

impl<'a> Migrator<'a> {
    pub fn new(
        context: &'a NotebookContext,
        service: &'a NotebookService,
        backups: &'a BackupManager,
    ) -> Self {
        Self {
            context,
            service,
            backups,
        }
    }

    /// Migrates if needed. Returns `false` if the migration failed, in which
    /// case the caller must not start normal service.
    pub fn migrate(&self) -> bool {
        match self.try_migrate() {
            Ok(MigrationOutcome::UpToDate { version }) => {
                debug!("Store schema is up to date at version {}", version);
                true
            }
            Ok(MigrationOutcome::Migrated {
                notes, categories, ..
            }) => {
                info!(
                    "Migrated {} notes and {} categories to schema version {}",
                    notes, categories, CURRENT_SCHEMA_VERSION
                );
                true
            }
            Err(e) => {
                error!("Failed to migrate: {}", e);
                false
            }
        }
    }

    pub fn try_migrate(&self) -> Result<MigrationOutcome> {
        let store = self.service.store();
        let version = store.get_schema_version()?;

        if version > CURRENT_SCHEMA_VERSION {
            return Err(NotebookError::MigrationFailed {
                message: format!(
                    "store schema version {} is newer than supported version {}",
                    version, CURRENT_SCHEMA_VERSION
                ),
            });
        }
        if version != LEGACY_SCHEMA_VERSION {
            return Ok(MigrationOutcome::UpToDate { version });
        }

        info!(
            "Migrating store from schema version {} to {}",
            version, CURRENT_SCHEMA_VERSION
        );
        let backup = self.snapshot_legacy_state()?;

        let config = self.context.config();
        let (has_legacy, mut notes, mut categories) = config.read(|c| {
            (c.has_legacy_documents(), c.notes.clone(), c.categories.clone())
        })?;
        for note in notes.iter_mut() {
            prepare_legacy(note)?;
        }
        for category in categories.iter_mut() {
            prepare_legacy(category)?;
        }

        if has_legacy {
            // A previous attempt may have stopped after inserting.
            let stale_notes = store.delete_many::<Note>(|_| true)?;
            let stale_categories = store.delete_many::<Category>(|_| true)?;
            if stale_notes + stale_categories > 0 {
                warn!(
                    "Discarded {} notes and {} categories left by an interrupted migration",
                    stale_notes, stale_categories
                );
            }

            store.insert_many(&mut notes)?;
            store.insert_many(&mut categories)?;
        }

        config.update(|c| {
            c.notes.clear();
            c.categories.clear();
            c.is_no_category_selected = true;
        })?;
        config.save()?;

        store.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        self.service.load_documents()?;

        let categories = self.service.categories()?;
        let mut notes = self.service.notes()?;
        for note in notes.iter_mut() {
            for embedded in note.categories.iter_mut() {
                if let Some(current) = categories
                    .iter()
                    .find(|c| c.internal_name() == embedded.internal_name())
                {
                    *embedded = current.clone();
                }
            }
        }

        self.service.save_note_list(&mut notes)?;
        self.service.load_documents()?;

        Ok(MigrationOutcome::Migrated {
            notes: notes.len(),
            categories: categories.len(),
            backup,
        })
    }

    /// Copies the configuration next to the store and snapshots the data
    /// directory before anything is changed.
    fn snapshot_legacy_state(&self) -> Result<PathBuf> {
        let config_path = self.context.config().path();
        if config_path.exists() {
            let target = self.context.data_dir().join(CONFIG_FILE_NAME);
            fs::copy(config_path, &target).map_err(|e| NotebookError::MigrationFailed {
                message: format!("failed to copy configuration to {}: {}", target.display(), e),
            })?;
        }

        let plugin_version = self.context.config().read(|c| c.plugin_version)?;
        let prefix = format!("{}/v{}_", UPGRADE_BACKUP_DIR, plugin_version);
        self.backups
            .try_create_backup(&prefix)
            .map_err(|e| NotebookError::MigrationFailed {
                message: format!("pre-upgrade snapshot failed: {}", e),
            })
    }
}

fn prepare_legacy<T: UniqueDocument>(document: &mut T) -> Result<()> {
    document.validate()?;
    document.decompress_body()?;
    document.set_visible(true);
    document.set_id(0);
    Ok(())
}
