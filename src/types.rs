//! Core data structures shared across the notekeeper library.
//!
//! This module holds the sort specification, the backup payload, the CSV
//! export summary and the CLI command set.
use std::{cmp::Ordering, collections::BTreeMap, fmt, path::PathBuf};

use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::{Category, Note, NotebookError, UniqueDocument};

/// A specialized Result type for notekeeper operations.
pub type Result<T> = std::result::Result<T, NotebookError>;

/// Field a document list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SortKey {
    Name,
    Created,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One of the six orderings a document list can be displayed in.
///
/// The numeric code is what the configuration persists: `0` Name ascending,
/// `1` Name descending, `2` Created ascending, `3` Created descending,
/// `4` Modified ascending, `5` Modified descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub const ALL: [SortSpec; 6] = [
        SortSpec::new(SortKey::Name, SortDirection::Ascending),
        SortSpec::new(SortKey::Name, SortDirection::Descending),
        SortSpec::new(SortKey::Created, SortDirection::Ascending),
        SortSpec::new(SortKey::Created, SortDirection::Descending),
        SortSpec::new(SortKey::Modified, SortDirection::Ascending),
        SortSpec::new(SortKey::Modified, SortDirection::Descending),
    ];

    pub const fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Persisted form of this ordering.
    pub fn code(self) -> i32 {
        let key = match self.key {
            SortKey::Name => 0,
            SortKey::Created => 2,
            SortKey::Modified => 4,
        };
        match self.direction {
            SortDirection::Ascending => key,
            SortDirection::Descending => key + 1,
        }
    }

    /// Parses a persisted code. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    /// Parses a persisted code, falling back to the default ordering.
    pub fn from_code_or_default(code: i32) -> Self {
        Self::from_code(code).unwrap_or_default()
    }

    fn compare<T: UniqueDocument>(self, a: &T, b: &T) -> Ordering {
        let ordering = match self.key {
            SortKey::Name => a.name().cmp(b.name()),
            SortKey::Created => a.created().cmp(&b.created()),
            SortKey::Modified => a.modified().cmp(&b.modified()),
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }

    /// Stable in-place sort; ties keep their prior relative order.
    pub fn sort<T: UniqueDocument>(self, documents: &mut [T]) {
        documents.sort_by(|a, b| self.compare(a, b));
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec::new(SortKey::Modified, SortDirection::Ascending)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self.key {
            SortKey::Name => "Name",
            SortKey::Created => "Created",
            SortKey::Modified => "Modified",
        };
        let direction = match self.direction {
            SortDirection::Ascending => "Ascending",
            SortDirection::Descending => "Descending",
        };
        write!(f, "{} ({})", key, direction)
    }
}

/// Which cached list a sort applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortTarget {
    Notes,
    Categories,
}

/// Payload of the JSON backup file.
///
/// `Notes` and `Categories` are authoritative. The readable maps mirror the
/// plaintext bodies for browsing and are ignored on import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentBackup {
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default, skip_deserializing)]
    pub notes_readable: BTreeMap<String, String>,
    #[serde(default, skip_deserializing)]
    pub categories_readable: BTreeMap<String, String>,
}

impl DocumentBackup {
    /// Builds a payload from compressed documents whose plaintext bodies are
    /// still populated.
    pub fn new(notes: Vec<Note>, categories: Vec<Category>) -> Self {
        let notes_readable = notes
            .iter()
            .map(|n| (n.internal_name().to_string(), n.body().to_string()))
            .collect();
        let categories_readable = categories
            .iter()
            .map(|c| (c.internal_name().to_string(), c.body().to_string()))
            .collect();

        Self {
            notes,
            categories,
            notes_readable,
            categories_readable,
        }
    }
}

/// Summary of a backup restoration operation
#[derive(Debug, Clone)]
pub struct RestoreSummary {
    /// Path to the backup file that was restored
    pub backup_file: PathBuf,
    /// Number of notes now in the store
    pub notes_restored: usize,
    /// Number of categories now in the store
    pub categories_restored: usize,
}

/// Summary of a CSV export
#[derive(Debug, Clone)]
pub struct CsvExport {
    /// Path of the written file
    pub path: PathBuf,
    /// Number of rows written, header excluded
    pub count: usize,
    /// Human-readable status line
    pub message: String,
}

/// Available subcommands for the notekeeper application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new note
    NewNote {
        /// Display name of the note
        #[clap(short, long)]
        name: Option<String>,

        /// Body text of the note
        #[clap(short, long)]
        body: Option<String>,

        /// Path to a file containing the note's body
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Category names to attach (comma-separated)
        #[clap(short, long)]
        categories: Option<String>,
    },

    /// Create a new category
    NewCategory {
        /// Display name of the category
        #[clap(short, long)]
        name: Option<String>,

        /// Description of the category
        #[clap(short, long)]
        description: Option<String>,
    },

    /// List notes or categories
    List {
        /// Only show notes passing the category filter
        #[clap(short = 'f', long)]
        filter: bool,

        /// Only show notes whose name (or body, if enabled) contains this text
        #[clap(short, long)]
        search: Option<String>,

        /// List categories instead of notes
        #[clap(short, long)]
        categories: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show a note by ID
    Show {
        /// ID of the note to show
        id: i64,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Edit an existing note
    Edit {
        /// ID of the note to edit
        id: i64,

        /// New display name
        #[clap(short, long)]
        name: Option<String>,

        /// New body text
        #[clap(short, long)]
        body: Option<String>,

        /// Path to a file containing the new body
        #[clap(short, long)]
        file: Option<PathBuf>,
    },

    /// Attach a category to a note
    Tag {
        /// ID of the note
        note_id: i64,

        /// ID of the category
        category_id: i64,
    },

    /// Detach a category from a note
    Untag {
        /// ID of the note
        note_id: i64,

        /// ID of the category
        category_id: i64,
    },

    /// Delete a note by ID
    DeleteNote {
        /// ID of the note to delete
        id: i64,
    },

    /// Delete a category by ID and detach it from every note
    DeleteCategory {
        /// ID of the category to delete
        id: i64,
    },

    /// Make one category the only selected filter
    Select {
        /// ID of the category to select
        id: i64,
    },

    /// Flip a category's membership in the filter
    ToggleCategory {
        /// ID of the category to toggle
        id: i64,
    },

    /// Set whether uncategorized notes pass the filter
    ToggleNoCategory {
        /// Explicit value, flips the current one when omitted
        #[clap(long)]
        enabled: Option<bool>,
    },

    /// Change and persist the ordering of notes or categories
    Sort {
        /// List to sort
        #[clap(value_enum)]
        target: SortTarget,

        /// Field to sort by
        #[clap(value_enum)]
        key: SortKey,

        /// Sort direction
        #[clap(value_enum, default_value_t = SortDirection::Ascending)]
        direction: SortDirection,
    },

    /// Export all notes to a timestamped CSV file
    ExportCsv,

    /// Write a JSON backup of all documents
    Backup {
        /// Path for the backup file (default uses the automatic export path)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace all documents with the contents of a JSON backup
    Restore {
        /// Path to the backup file
        backup_file: PathBuf,
    },

    /// Snapshot the data directory and prune old snapshots
    Snapshot,

    /// Run the background save and backup timers until interrupted
    Run,
}
