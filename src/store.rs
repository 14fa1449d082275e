//! Embedded document store backed by SQLite.
//!
//! Every document type lives in its own collection table holding the
//! document's JSON. Each operation opens a fresh connection, does its work in
//! one transaction and closes the connection again, so no handle outlives a
//! call and a crash never exposes a torn write. Concurrent callers are
//! serialized by SQLite's file locking.
//!
//! The schema version stamp is SQLite's `user_version` pragma.
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{debug, error, trace};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{de::DeserializeOwned, Serialize};

use crate::{Category, Note, Result, UniqueDocument};

/// File name of the store inside the data directory.
pub const STORE_FILE_NAME: &str = "notebook.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A document type the store can hold.
pub trait StoredDocument: UniqueDocument + Serialize + DeserializeOwned {}

impl<T> StoredDocument for T where T: UniqueDocument + Serialize + DeserializeOwned {}

/// Typed, single-writer document storage.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    /// Creates a store handle for the database file at `path`.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(|e| {
            error!("Failed to open store {}: {}", self.path.display(), e);
            e
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Runs `f` inside one transaction on a fresh connection.
    fn with_transaction<R>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<R>) -> Result<R> {
        let started_at = Instant::now();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        trace!(
            "Store transaction committed in {} ms",
            started_at.elapsed().as_millis()
        );
        Ok(result)
    }

    fn ensure_collection<T: StoredDocument>(tx: &Transaction<'_>) -> Result<&'static str> {
        let table = T::KIND.collection();
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc TEXT NOT NULL
            );",
            table
        ))?;
        Ok(table)
    }

    fn insert_row<T: StoredDocument>(tx: &Transaction<'_>, table: &str, item: &mut T) -> Result<i64> {
        if item.id() != 0 {
            tx.execute(
                &format!("INSERT INTO {} (id, doc) VALUES (?1, ?2)", table),
                params![item.id(), serde_json::to_string(&*item)?],
            )?;
            return Ok(item.id());
        }

        tx.execute(
            &format!("INSERT INTO {} (doc) VALUES ('')", table),
            [],
        )?;
        let id = tx.last_insert_rowid();
        item.set_id(id);
        tx.execute(
            &format!("UPDATE {} SET doc = ?1 WHERE id = ?2", table),
            params![serde_json::to_string(&*item)?, id],
        )?;
        Ok(id)
    }

    fn load_rows<T: StoredDocument>(tx: &Transaction<'_>, table: &str) -> Result<Vec<T>> {
        let mut stmt = tx.prepare(&format!("SELECT id, doc FROM {} ORDER BY id", table))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, doc)| {
                let mut item: T = serde_json::from_str(&doc)?;
                item.set_id(id);
                Ok(item)
            })
            .collect()
    }

    /// Inserts `item`, assigning and returning its new Id.
    pub fn insert<T: StoredDocument>(&self, item: &mut T) -> Result<i64> {
        let id = self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            item.set_id(0);
            Self::insert_row(tx, table, item)
        })?;
        debug!("Inserted {} {}", T::KIND, id);
        Ok(id)
    }

    /// Inserts every item with a fresh Id.
    pub fn insert_many<T: StoredDocument>(&self, items: &mut [T]) -> Result<()> {
        self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            for item in items.iter_mut() {
                item.set_id(0);
                Self::insert_row(tx, table, item)?;
            }
            Ok(())
        })?;
        debug!("Inserted {} {} documents", items.len(), T::KIND);
        Ok(())
    }

    /// Inserts items without an Id and replaces the rest. Returns how many
    /// were inserted.
    pub fn upsert_many<T: StoredDocument>(&self, items: &mut [T]) -> Result<usize> {
        let inserted = self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            let mut inserted = 0;
            for item in items.iter_mut() {
                if item.id() == 0 {
                    Self::insert_row(tx, table, item)?;
                    inserted += 1;
                } else {
                    tx.execute(
                        &format!("INSERT OR REPLACE INTO {} (id, doc) VALUES (?1, ?2)", table),
                        params![item.id(), serde_json::to_string(&*item)?],
                    )?;
                }
            }
            Ok(inserted)
        })?;
        debug!(
            "Upserted {} {} documents ({} new)",
            items.len(),
            T::KIND,
            inserted
        );
        Ok(inserted)
    }

    /// Replaces the stored document with the same Id. Returns `false` when no
    /// such document exists.
    pub fn update<T: StoredDocument>(&self, item: &T) -> Result<bool> {
        self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            let changed = tx.execute(
                &format!("UPDATE {} SET doc = ?1 WHERE id = ?2", table),
                params![serde_json::to_string(item)?, item.id()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_by_id<T: StoredDocument>(&self, id: i64) -> Result<bool> {
        let deleted = self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            let changed = tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [id])?;
            Ok(changed > 0)
        })?;
        debug!("Delete {} {}: {}", T::KIND, id, deleted);
        Ok(deleted)
    }

    /// Deletes every document matching `predicate`, returning the count.
    pub fn delete_many<T: StoredDocument>(&self, predicate: impl Fn(&T) -> bool) -> Result<usize> {
        self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            let doomed: Vec<i64> = Self::load_rows::<T>(tx, table)?
                .into_iter()
                .filter(|item| predicate(item))
                .map(|item| item.id())
                .collect();

            let mut stmt = tx.prepare(&format!("DELETE FROM {} WHERE id = ?1", table))?;
            for id in &doomed {
                stmt.execute([id])?;
            }
            Ok(doomed.len())
        })
    }

    /// Swaps the entire collection for `items` in one transaction. Items keep
    /// a non-zero Id and get a fresh one otherwise.
    pub fn replace_all<T: StoredDocument>(&self, items: &mut [T]) -> Result<()> {
        self.with_transaction(|tx| Self::replace_collection(tx, items))?;
        debug!("Replaced {} collection with {} documents", T::KIND, items.len());
        Ok(())
    }

    /// Replaces both collections in one transaction; on error neither changes.
    pub fn replace_notebook(&self, notes: &mut [Note], categories: &mut [Category]) -> Result<()> {
        self.with_transaction(|tx| {
            Self::replace_collection(tx, notes)?;
            Self::replace_collection(tx, categories)
        })?;
        debug!(
            "Replaced notebook with {} notes and {} categories",
            notes.len(),
            categories.len()
        );
        Ok(())
    }

    fn replace_collection<T: StoredDocument>(tx: &Transaction<'_>, items: &mut [T]) -> Result<()> {
        let table = Self::ensure_collection::<T>(tx)?;
        tx.execute(&format!("DELETE FROM {}", table), [])?;
        for item in items.iter_mut() {
            Self::insert_row(tx, table, item)?;
        }
        Ok(())
    }

    pub fn get_by_id<T: StoredDocument>(&self, id: i64) -> Result<Option<T>> {
        self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            let doc: Option<String> = tx
                .query_row(
                    &format!("SELECT doc FROM {} WHERE id = ?1", table),
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            doc.map(|doc| {
                let mut item: T = serde_json::from_str(&doc)?;
                item.set_id(id);
                Ok(item)
            })
            .transpose()
        })
    }

    /// First document, in Id order, matching `predicate`.
    pub fn get_one<T: StoredDocument>(&self, predicate: impl Fn(&T) -> bool) -> Result<Option<T>> {
        Ok(self.get_many(predicate)?.into_iter().next())
    }

    /// Every document of type `T`, in Id order.
    pub fn get_all<T: StoredDocument>(&self) -> Result<Vec<T>> {
        self.with_transaction(|tx| {
            let table = Self::ensure_collection::<T>(tx)?;
            Self::load_rows(tx, table)
        })
    }

    pub fn get_many<T: StoredDocument>(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        Ok(self
            .get_all::<T>()?
            .into_iter()
            .filter(|item| predicate(item))
            .collect())
    }

    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.connect()?;
        let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    pub fn set_schema_version(&self, version: i32) -> Result<()> {
        let conn = self.connect()?;
        conn.pragma_update(None, "user_version", version)?;
        debug!("Store schema version set to {}", version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join(STORE_FILE_NAME));
        (dir, store)
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (_dir, store) = temp_store();
        let mut first = Note::new("First");
        let mut second = Note::new("Second");

        let a = store.insert(&mut first).unwrap();
        let b = store.insert(&mut second).unwrap();
        assert!(a > 0 && b > a);
        assert_eq!(first.id(), a);

        let loaded: Note = store.get_by_id(b).unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.id(), b);
    }

    #[test]
    fn empty_collections_read_as_empty() {
        let (_dir, store) = temp_store();
        assert!(store.get_all::<Category>().unwrap().is_empty());
        assert!(store.get_by_id::<Note>(1).unwrap().is_none());
        assert!(!store.delete_by_id::<Note>(1).unwrap());
    }

    #[test]
    fn update_reports_missing_rows() {
        let (_dir, store) = temp_store();
        let mut note = Note::new("Ghost");
        note.set_id(7);
        assert!(!store.update(&note).unwrap());

        store.insert(&mut note).unwrap();
        note.set_name("Renamed");
        assert!(store.update(&note).unwrap());
        let loaded: Note = store.get_by_id(note.id()).unwrap().unwrap();
        assert_eq!(loaded.name(), "Renamed");
    }

    #[test]
    fn upsert_inserts_new_and_replaces_existing() {
        let (_dir, store) = temp_store();
        let mut existing = Category::new("Old");
        store.insert(&mut existing).unwrap();
        existing.set_name("Changed");

        let mut items = vec![existing.clone(), Category::new("Fresh")];
        assert_eq!(store.upsert_many(&mut items).unwrap(), 1);
        assert!(items[1].id() > 0);

        let all: Vec<Category> = store.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name(), "Changed");
    }

    #[test]
    fn predicates_select_and_delete() {
        let (_dir, store) = temp_store();
        let mut notes = vec![Note::new("keep"), Note::new("drop"), Note::new("drop")];
        store.insert_many(&mut notes).unwrap();

        let found = store.get_one::<Note>(|n| n.name() == "drop").unwrap().unwrap();
        assert_eq!(found, notes[1]);
        assert_eq!(store.get_many::<Note>(|n| n.name() == "drop").unwrap().len(), 2);

        assert_eq!(store.delete_many::<Note>(|n| n.name() == "drop").unwrap(), 2);
        let rest: Vec<Note> = store.get_all().unwrap();
        assert_eq!(rest, vec![notes[0].clone()]);
    }

    #[test]
    fn replace_all_swaps_collection() {
        let (_dir, store) = temp_store();
        let mut old = vec![Note::new("a"), Note::new("b")];
        store.insert_many(&mut old).unwrap();

        let mut replacement = vec![Note::new("c")];
        store.replace_all(&mut replacement).unwrap();
        let all: Vec<Note> = store.get_all().unwrap();
        assert_eq!(all, replacement);
    }

    #[test]
    fn failed_notebook_replace_changes_nothing() {
        let (_dir, store) = temp_store();
        let mut existing = vec![Note::new("existing")];
        store.insert_many(&mut existing).unwrap();

        let mut notes = vec![Note::new("imported")];
        let mut categories = vec![Category::new("a"), Category::new("b")];
        categories[0].set_id(7);
        categories[1].set_id(7);
        assert!(store.replace_notebook(&mut notes, &mut categories).is_err());

        let all: Vec<Note> = store.get_all().unwrap();
        assert_eq!(all, existing);
        assert!(store.get_all::<Category>().unwrap().is_empty());
    }

    #[test]
    fn schema_version_persists() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_schema_version().unwrap(), 0);
        store.set_schema_version(2).unwrap();
        assert_eq!(store.get_schema_version().unwrap(), 2);
    }
}
