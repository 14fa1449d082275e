//! Notebook service: the single writer and cache owner for notes and
//! categories.
//!
//! The two cached lists sit behind one mutex. Long-running saves and imports
//! are single-flight: a call arriving while another is in flight returns
//! immediately without doing anything.
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use log::{debug, error, info, warn};

use crate::{
    now_unix, write_file_atomically, Category, CsvExport, DocumentBackup, DocumentKind,
    DocumentStore, Note, NotebookConfig, NotebookContext, NotebookError, RestoreSummary, Result,
    SortSpec, SortTarget, StoredDocument, UniqueDocument, DEFAULT_CATEGORY_NAME, DEFAULT_NOTE_NAME,
};

/// Picks files for user-directed export and import.
pub trait FileChooser: Send + Sync {
    /// Path to write a backup to, or `None` if the user cancelled.
    fn choose_save_path(&self, suggested_name: &str) -> Result<Option<PathBuf>>;

    /// Path to read a backup from, or `None` if the user cancelled.
    fn choose_open_path(&self) -> Result<Option<PathBuf>>;
}

/// A chooser that always answers with the same path, or always cancels.
#[derive(Debug, Clone, Default)]
pub struct FixedPathChooser {
    path: Option<PathBuf>,
}

impl FixedPathChooser {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl FileChooser for FixedPathChooser {
    fn choose_save_path(&self, _suggested_name: &str) -> Result<Option<PathBuf>> {
        Ok(self.path.clone())
    }

    fn choose_open_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.path.clone())
    }
}

/// Category filter inputs for [`is_note_visible`].
#[derive(Debug, Clone, Copy)]
pub struct NoteFilter<'a> {
    pub by_category: bool,
    pub no_category_selected: bool,
    pub selected: &'a [Category],
    pub text: &'a str,
    pub search_bodies: bool,
}

/// Applies the filter rules to one note. The first matching rule decides.
pub fn is_note_visible(note: &Note, filter: &NoteFilter<'_>) -> bool {
    if filter.by_category && note.categories.is_empty() {
        filter.no_category_selected
    } else if filter.by_category && !note.categories.iter().any(|c| filter.selected.contains(c)) {
        false
    } else if !filter.text.is_empty() {
        note.name().contains(filter.text) || (filter.search_bodies && note.body().contains(filter.text))
    } else {
        true
    }
}

#[derive(Debug, Default)]
struct Documents {
    notes: Vec<Note>,
    categories: Vec<Category>,
}

/// Clears its flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn compressed<T: StoredDocument + Clone>(items: &[T]) -> Result<Vec<T>> {
    items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            item.compress_body()?;
            Ok(item)
        })
        .collect()
}

/// Validates and decompresses freshly read documents, dropping any that fail.
fn prepare_loaded<T: StoredDocument>(items: Vec<T>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|mut item| {
            if let Err(e) = item.validate().and_then(|_| item.decompress_body()) {
                error!("Skipping {} {}: {}", T::KIND, item.id(), e);
                return None;
            }
            item.set_visible(true);
            Some(item)
        })
        .collect()
}

/// Fails if two documents in an imported collection claim the same Id.
fn reject_duplicate_ids<T: UniqueDocument>(items: &[T]) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items.iter().filter(|item| item.id() != 0) {
        if !seen.insert(item.id()) {
            return Err(NotebookError::RestoreFailed {
                message: format!("Duplicate {} Id {} in backup", T::KIND, item.id()),
            });
        }
    }
    Ok(())
}

/// Mediates every document operation between callers, the cache and the store.
pub struct NotebookService {
    context: NotebookContext,
    store: DocumentStore,
    documents: Mutex<Documents>,
    saving: AtomicBool,
    loading: AtomicBool,
}

impl NotebookService {
    /// Creates a service with an empty cache. Call
    /// [`NotebookService::load_documents`] before serving requests.
    pub fn new(context: &NotebookContext, store: DocumentStore) -> Self {
        Self {
            context: context.clone(),
            store,
            documents: Mutex::new(Documents::default()),
            saving: AtomicBool::new(false),
            loading: AtomicBool::new(false),
        }
    }

    /// Creates a service over the context's default store file.
    pub fn open(context: &NotebookContext) -> Self {
        Self::new(context, DocumentStore::new(context.store_path()))
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn context(&self) -> &NotebookContext {
        &self.context
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Documents>> {
        self.documents
            .lock()
            .map_err(|_| NotebookError::LockAcquisitionFailed {
                message: "Failed to acquire lock on notebook documents".to_string(),
            })
    }

    fn config(&self) -> Result<NotebookConfig> {
        self.context.config().snapshot()
    }

    /// Reloads the cache from the store and applies the persisted ordering.
    pub fn load_documents(&self) -> Result<()> {
        let config = self.config()?;
        // Store read and cache swap happen under one lock, as creates do.
        let mut documents = self.lock()?;
        let mut notes = prepare_loaded(self.store.get_all::<Note>()?);
        let mut categories = prepare_loaded(self.store.get_all::<Category>()?);

        SortSpec::from_code_or_default(config.note_sort_type).sort(&mut notes);
        SortSpec::from_code_or_default(config.category_sort_type).sort(&mut categories);

        info!(
            "Loaded {} notes and {} categories",
            notes.len(),
            categories.len()
        );

        documents.notes = notes;
        documents.categories = categories;
        Ok(())
    }

    /// Snapshot of the cached notes in display order.
    pub fn notes(&self) -> Result<Vec<Note>> {
        Ok(self.lock()?.notes.clone())
    }

    /// Snapshot of the cached categories in display order.
    pub fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.lock()?.categories.clone())
    }

    pub fn find_note(&self, id: i64) -> Result<Option<Note>> {
        Ok(self.lock()?.notes.iter().find(|n| n.id() == id).cloned())
    }

    pub fn find_category(&self, id: i64) -> Result<Option<Category>> {
        Ok(self.lock()?.categories.iter().find(|c| c.id() == id).cloned())
    }

    /// Creates, stores and caches a new empty note at the top of the list.
    pub fn create_note(&self) -> Result<Note> {
        let mut note = Note::new(DEFAULT_NOTE_NAME);
        note.compress_body()?;
        let mut documents = self.lock()?;
        self.store.insert(&mut note)?;
        documents.notes.insert(0, note.clone());
        info!("Created note {}", note.id());
        Ok(note)
    }

    /// Creates, stores and caches a new selected category with a random color.
    pub fn create_category(&self) -> Result<Category> {
        let mut category = Category::new(DEFAULT_CATEGORY_NAME);
        category.compress_body()?;
        let mut documents = self.lock()?;
        self.store.insert(&mut category)?;
        documents.categories.insert(0, category.clone());
        info!("Created category {}", category.id());
        Ok(category)
    }

    pub fn delete_note(&self, note: &Note) -> Result<()> {
        if !self.store.delete_by_id::<Note>(note.id())? {
            warn!("Note {} was not in the store", note.id());
        }
        self.lock()?.notes.retain(|n| n.id() != note.id());
        info!("Deleted note {}", note.id());
        Ok(())
    }

    /// Deletes `category` and detaches it from every note first, including
    /// notes that are only in the store.
    pub fn delete_category(&self, category: &Category) -> Result<()> {
        let mut documents = self.lock()?;

        let mut affected: Vec<Note> = documents
            .notes
            .iter()
            .filter(|n| n.has_category(category))
            .cloned()
            .collect();
        for note in affected.iter_mut() {
            note.remove_category(category);
            note.compress_body()?;
        }

        let cached: HashSet<i64> = documents.notes.iter().map(|n| n.id()).collect();
        let mut uncached = self
            .store
            .get_many::<Note>(|n| !cached.contains(&n.id()) && n.has_category(category))?;
        for note in uncached.iter_mut() {
            note.remove_category(category);
        }

        self.store.upsert_many(&mut affected)?;
        self.store.upsert_many(&mut uncached)?;
        self.store.delete_by_id::<Category>(category.id())?;

        let detached = affected.len() + uncached.len();
        for note in affected {
            if let Some(slot) = documents.notes.iter_mut().find(|n| n.id() == note.id()) {
                *slot = note;
            }
        }
        documents.categories.retain(|c| c != category);

        info!(
            "Deleted category {} and detached it from {} notes",
            category.id(),
            detached
        );
        Ok(())
    }

    /// Recomputes visibility on every cached note and returns them all in
    /// cache order. Callers keep only the visible ones.
    pub fn get_notes(&self, filter_by_category: bool, text: &str) -> Result<Vec<Note>> {
        let config = self.config()?;
        let mut documents = self.lock()?;
        let selected: Vec<Category> = documents
            .categories
            .iter()
            .filter(|c| c.is_selected)
            .cloned()
            .collect();

        let filter = NoteFilter {
            by_category: filter_by_category,
            no_category_selected: config.is_no_category_selected,
            selected: &selected,
            text,
            search_bodies: config.include_note_bodies_in_search,
        };

        for note in documents.notes.iter_mut() {
            let visible = is_note_visible(note, &filter);
            note.set_visible(visible);
        }
        Ok(documents.notes.clone())
    }

    /// Selects `category` and deselects every other one.
    pub fn select_one_category(&self, category: &Category) -> Result<()> {
        {
            let mut documents = self.lock()?;
            if !documents.categories.iter().any(|c| c == category) {
                return Err(NotebookError::DocumentNotFound {
                    kind: DocumentKind::Category,
                    id: category.id(),
                });
            }
            for c in documents.categories.iter_mut() {
                c.is_selected = *c == *category;
            }
            let mut stored = compressed(&documents.categories)?;
            self.store.upsert_many(&mut stored)?;
        }

        let config = self.context.config();
        config.update(|c| c.is_no_category_selected = false)?;
        config.save()?;
        debug!("Selected only category {}", category.id());
        Ok(())
    }

    /// Flips whether `category` is part of the filter. Returns the new value.
    pub fn toggle_category_selection(&self, category: &Category) -> Result<bool> {
        let mut documents = self.lock()?;
        let cached = documents
            .categories
            .iter_mut()
            .find(|c| **c == *category)
            .ok_or(NotebookError::DocumentNotFound {
                kind: DocumentKind::Category,
                id: category.id(),
            })?;
        cached.is_selected = !cached.is_selected;

        let mut stored = cached.clone();
        stored.compress_body()?;
        self.store.update(&stored)?;
        Ok(stored.is_selected)
    }

    /// Sets whether notes without categories pass the category filter.
    pub fn set_no_category_selected(&self, selected: bool) -> Result<()> {
        let config = self.context.config();
        config.update(|c| c.is_no_category_selected = selected)?;
        config.save()
    }

    pub fn sort_notes(&self, spec: SortSpec) -> Result<()> {
        self.persist_sort(SortTarget::Notes, spec)?;
        spec.sort(&mut self.lock()?.notes);
        Ok(())
    }

    pub fn sort_categories(&self, spec: SortSpec) -> Result<()> {
        self.persist_sort(SortTarget::Categories, spec)?;
        spec.sort(&mut self.lock()?.categories);
        Ok(())
    }

    fn persist_sort(&self, target: SortTarget, spec: SortSpec) -> Result<()> {
        let config = self.context.config();
        config.update(|c| match target {
            SortTarget::Notes => c.note_sort_type = spec.code(),
            SortTarget::Categories => c.category_sort_type = spec.code(),
        })?;
        config.save()?;
        debug!("Sorting {:?} by {}", target, spec);
        Ok(())
    }

    /// Writes `note` through to the store and the cache.
    pub fn save_note(&self, note: &Note) -> Result<()> {
        let mut stored = note.clone();
        stored.compress_body()?;
        if !self.store.update(&stored)? {
            return Err(NotebookError::DocumentNotFound {
                kind: DocumentKind::Note,
                id: note.id(),
            });
        }

        let mut documents = self.lock()?;
        if let Some(slot) = documents.notes.iter_mut().find(|n| n.id() == stored.id()) {
            *slot = stored;
        }
        Ok(())
    }

    /// Writes `category` through to the store and the cache, and refreshes
    /// the copies embedded in notes if its identity changed.
    pub fn save_category(&self, category: &Category) -> Result<()> {
        let mut stored = category.clone();
        stored.compress_body()?;
        if !self.store.update(&stored)? {
            return Err(NotebookError::DocumentNotFound {
                kind: DocumentKind::Category,
                id: category.id(),
            });
        }

        let mut documents = self.lock()?;
        let previous = documents
            .categories
            .iter_mut()
            .find(|c| c.id() == stored.id())
            .map(|slot| std::mem::replace(slot, stored.clone()));

        let Some(previous) = previous else {
            return Ok(());
        };

        let mut affected = Vec::new();
        for note in documents.notes.iter_mut() {
            let mut changed = false;
            for embedded in note.categories.iter_mut().filter(|c| **c == previous) {
                *embedded = stored.clone();
                changed = true;
            }
            if changed {
                let mut copy = note.clone();
                copy.compress_body()?;
                affected.push(copy);
            }
        }

        if !affected.is_empty() {
            self.store.upsert_many(&mut affected)?;
            debug!(
                "Refreshed category {} in {} notes",
                stored.id(),
                affected.len()
            );
        }
        Ok(())
    }

    /// Persists every cached note.
    pub fn save_notes(&self) -> Result<()> {
        let mut documents = self.lock()?;
        for note in documents.notes.iter_mut() {
            note.compress_body()?;
        }
        self.store.upsert_many(&mut documents.notes)?;
        Ok(())
    }

    /// Persists every cached category.
    pub fn save_categories(&self) -> Result<()> {
        let mut documents = self.lock()?;
        for category in documents.categories.iter_mut() {
            category.compress_body()?;
        }
        self.store.upsert_many(&mut documents.categories)?;
        Ok(())
    }

    /// Compresses and upserts an arbitrary list, assigning Ids to new items.
    pub fn save_note_list(&self, notes: &mut [Note]) -> Result<usize> {
        for note in notes.iter_mut() {
            note.compress_body()?;
        }
        self.store.upsert_many(notes)
    }

    pub fn save_category_list(&self, categories: &mut [Category]) -> Result<usize> {
        for category in categories.iter_mut() {
            category.compress_body()?;
        }
        self.store.upsert_many(categories)
    }

    /// Persists all documents and the configuration, then mirrors a JSON
    /// backup to the automatic export path if one is set.
    ///
    /// Returns `false` without doing anything if a save is already running.
    pub fn save_full_notebook(&self) -> Result<bool> {
        let Some(_guard) = FlightGuard::try_acquire(&self.saving) else {
            debug!("Full save already in progress, skipping");
            return Ok(false);
        };

        self.save_notes()?;
        self.save_categories()?;
        self.context.config().save()?;

        let config = self.config()?;
        if let Some(path) = config.export_path() {
            self.write_backup(path)?;
        }

        info!("Full save completed");
        Ok(true)
    }

    /// Writes the JSON backup of the current cache to `path`.
    pub fn write_backup(&self, path: &Path) -> Result<()> {
        let (notes, categories) = {
            let documents = self.lock()?;
            (
                compressed(&documents.notes)?,
                compressed(&documents.categories)?,
            )
        };

        let backup = DocumentBackup::new(notes, categories);
        let json = serde_json::to_string_pretty(&backup)?;
        write_file_atomically(path, json.as_bytes())?;
        info!("Wrote notebook backup to {}", path.display());
        Ok(())
    }

    /// Writes a JSON backup to the configured export path, when asked to and
    /// one is set, or to a path picked by `chooser`.
    ///
    /// Returns the written path, or `None` if cancelled or already running.
    pub fn create_backup(
        &self,
        chooser: &dyn FileChooser,
        write_to_configured_path: bool,
    ) -> Result<Option<PathBuf>> {
        let Some(_guard) = FlightGuard::try_acquire(&self.saving) else {
            debug!("Save already in progress, skipping backup");
            return Ok(None);
        };

        let configured = if write_to_configured_path {
            self.config()?.export_path().map(Path::to_path_buf)
        } else {
            None
        };

        let path = match configured {
            Some(path) => Some(path),
            None => chooser.choose_save_path(&format!("notebook_backup_{}.json", now_unix()))?,
        };

        let Some(path) = path else {
            info!("Backup cancelled");
            return Ok(None);
        };

        self.write_backup(&path)?;
        Ok(Some(path))
    }

    /// Replaces every document with the contents of a backup picked by
    /// `chooser`.
    pub fn load_backup(&self, chooser: &dyn FileChooser) -> Result<Option<RestoreSummary>> {
        let Some(_guard) = FlightGuard::try_acquire(&self.loading) else {
            debug!("Import already in progress, skipping");
            return Ok(None);
        };

        match chooser.choose_open_path()? {
            Some(path) => self.restore_from(&path).map(Some),
            None => {
                info!("Import cancelled");
                Ok(None)
            }
        }
    }

    /// Replaces every document with the contents of the backup at `path`.
    pub fn import_backup(&self, path: &Path) -> Result<Option<RestoreSummary>> {
        let Some(_guard) = FlightGuard::try_acquire(&self.loading) else {
            debug!("Import already in progress, skipping");
            return Ok(None);
        };
        self.restore_from(path).map(Some)
    }

    fn restore_from(&self, path: &Path) -> Result<RestoreSummary> {
        let content = fs::read_to_string(path)?;
        let backup: DocumentBackup =
            serde_json::from_str(&content).map_err(|e| NotebookError::RestoreFailed {
                message: format!("{} is not a notebook backup: {}", path.display(), e),
            })?;

        let DocumentBackup {
            mut notes,
            mut categories,
            ..
        } = backup;

        // Everything must decode before anything is replaced.
        for note in notes.iter_mut() {
            note.validate()?;
            note.decompress_body()?;
        }
        for category in categories.iter_mut() {
            category.validate()?;
            category.decompress_body()?;
        }

        reject_duplicate_ids(&notes)?;
        reject_duplicate_ids(&categories)?;

        self.store.replace_notebook(&mut notes, &mut categories)?;
        self.load_documents()?;

        info!(
            "Imported {} notes and {} categories from {}",
            notes.len(),
            categories.len(),
            path.display()
        );
        Ok(RestoreSummary {
            backup_file: path.to_path_buf(),
            notes_restored: notes.len(),
            categories_restored: categories.len(),
        })
    }

    /// Writes every cached note to `<root>/export/export_<unix-seconds>.csv`.
    pub fn export_notes_csv(&self) -> Result<CsvExport> {
        let notes = self.notes()?;
        let dir = self.context.export_dir();
        fs::create_dir_all(&dir).map_err(|e| {
            error!("Failed to create export directory {}: {}", dir.display(), e);
            NotebookError::DirectoryError { path: dir.clone() }
        })?;

        let path = dir.join(format!("export_{}.csv", now_unix()));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(["Name", "Id", "Body", "Created", "Modified", "Categories"])?;

        for note in &notes {
            let body = if note.body().is_empty() {
                "None".to_string()
            } else {
                note.body().to_string()
            };
            let categories = if note.categories.is_empty() {
                "None".to_string()
            } else {
                note.category_names().join("|")
            };
            writer.write_record([
                note.name().to_string(),
                note.id().to_string(),
                body,
                note.created().to_string(),
                note.modified().to_string(),
                categories,
            ])?;
        }
        writer.flush()?;

        let message = format!("Exported {} notes to {}.", notes.len(), path.display());
        info!("{}", message);
        Ok(CsvExport {
            path,
            count: notes.len(),
            message,
        })
    }
}
