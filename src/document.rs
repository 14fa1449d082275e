//! Shared document shape for notes and categories.
//!
//! Every document carries an `InternalName` of the form
//! `<DisplayName>#<UniqueSuffix>`. The display name is user editable, the
//! suffix is an opaque creation token. Equality between documents is defined
//! on the [`LogicalKey`] (variant + internal name) so that references survive
//! store Id reassignment.
//!
//! Bodies are held in plaintext only in memory. The persisted form is the
//! gzip-compressed, base64-encoded `InternalBody`; the two are synchronized
//! only by [`UniqueDocument::compress_body`] and
//! [`UniqueDocument::decompress_body`].
use std::{
    fmt,
    io::{Read, Write},
    sync::atomic::{AtomicI64, Ordering},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};

use crate::{now_unix, NotebookError, Result};

/// Separates the display name from the uniqueness suffix.
pub const NAME_SEPARATOR: char = '#';

static LAST_TOKEN: AtomicI64 = AtomicI64::new(0);

/// The two concrete document variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentKind {
    Note,
    Category,
}

impl DocumentKind {
    /// Name of the store collection holding documents of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            DocumentKind::Note => "notes",
            DocumentKind::Category => "categories",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Note => write!(f, "Note"),
            DocumentKind::Category => write!(f, "Category"),
        }
    }
}

/// Identity of a document independent of its store-assigned Id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey {
    pub kind: DocumentKind,
    pub internal_name: String,
}

/// Fields shared by every document variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentCore {
    /// Store-assigned identifier, 0 until first insert
    #[serde(default)]
    pub id: i64,
    /// `<DisplayName>#<UniqueSuffix>`
    pub internal_name: String,
    /// Plaintext body, never persisted
    #[serde(skip)]
    pub body: String,
    /// Compressed and base64-encoded body
    #[serde(default)]
    pub internal_body: String,
    /// Transient filter flag, recomputed on every query
    #[serde(skip, default = "visible_by_default")]
    pub is_visible: bool,
    /// Unix seconds
    #[serde(default)]
    pub created: i64,
    /// Unix seconds
    #[serde(default)]
    pub modified: i64,
}

fn visible_by_default() -> bool {
    true
}

impl DocumentCore {
    /// Creates a fresh, not yet stored document core with a unique suffix.
    pub fn new(display_name: &str, body: impl Into<String>) -> Self {
        let now = now_unix();
        Self {
            id: 0,
            internal_name: new_internal_name(display_name),
            body: body.into(),
            internal_body: String::new(),
            is_visible: true,
            created: now,
            modified: now,
        }
    }
}

/// Behaviour common to [`crate::Note`] and [`crate::Category`].
pub trait UniqueDocument {
    /// Which variant this document type is.
    const KIND: DocumentKind;

    fn core(&self) -> &DocumentCore;

    fn core_mut(&mut self) -> &mut DocumentCore;

    fn id(&self) -> i64 {
        self.core().id
    }

    fn set_id(&mut self, id: i64) {
        self.core_mut().id = id;
    }

    fn internal_name(&self) -> &str {
        &self.core().internal_name
    }

    /// Display name: everything before the first separator.
    fn name(&self) -> &str {
        split_internal_name(self.internal_name()).0
    }

    /// The `#suffix` segment, separator included.
    fn identifier_string(&self) -> &str {
        split_internal_name(self.internal_name()).1
    }

    /// Replaces the display name, keeping the uniqueness suffix.
    ///
    /// Separator characters are stripped from `name` so the internal name
    /// keeps exactly one boundary between name and suffix.
    fn set_name(&mut self, name: &str) {
        let name = name.replace(NAME_SEPARATOR, "");
        let internal_name = format!("{}{}", name, self.identifier_string());
        let core = self.core_mut();
        core.internal_name = internal_name;
        core.modified = now_unix();
    }

    fn body(&self) -> &str {
        &self.core().body
    }

    fn set_body(&mut self, body: &str) {
        let core = self.core_mut();
        core.body = body.to_string();
        core.modified = now_unix();
    }

    fn is_visible(&self) -> bool {
        self.core().is_visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.core_mut().is_visible = visible;
    }

    fn created(&self) -> i64 {
        self.core().created
    }

    fn modified(&self) -> i64 {
        self.core().modified
    }

    fn logical_key(&self) -> LogicalKey {
        LogicalKey {
            kind: Self::KIND,
            internal_name: self.internal_name().to_string(),
        }
    }

    /// Refreshes `InternalBody` from `Body`. Call immediately before a write.
    fn compress_body(&mut self) -> Result<()> {
        let compressed = compress_text(self.body())?;
        self.core_mut().internal_body = compressed;
        Ok(())
    }

    /// Refreshes `Body` from `InternalBody`. Call before reading a loaded body.
    fn decompress_body(&mut self) -> Result<()> {
        let body = decompress_text(&self.core().internal_body)?;
        self.core_mut().body = body;
        Ok(())
    }

    /// Checks the internal name invariant.
    fn validate(&self) -> Result<()> {
        if self.internal_name().contains(NAME_SEPARATOR) {
            Ok(())
        } else {
            Err(NotebookError::InvalidDocument {
                message: format!(
                    "{} '{}' has no '{}' separator in its internal name",
                    Self::KIND,
                    self.internal_name(),
                    NAME_SEPARATOR
                ),
            })
        }
    }
}

/// Splits an internal name at the first separator into `(name, #suffix)`.
pub fn split_internal_name(internal_name: &str) -> (&str, &str) {
    match internal_name.find(NAME_SEPARATOR) {
        Some(index) => internal_name.split_at(index),
        None => (internal_name, ""),
    }
}

/// Builds `<display_name>#<token>` with a fresh monotonic token.
pub fn new_internal_name(display_name: &str) -> String {
    format!(
        "{}{}{}",
        display_name.replace(NAME_SEPARATOR, ""),
        NAME_SEPARATOR,
        next_unique_token()
    )
}

/// Returns Unix-epoch nanoseconds, strictly increasing within the process.
pub fn next_unique_token() -> i64 {
    let now = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1_000);
    let previous = LAST_TOKEN
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

/// Gzip-compresses `text` and encodes the result as standard base64.
pub fn compress_text(text: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`compress_text`]. An empty input decodes to an empty body.
pub fn decompress_text(encoded: &str) -> Result<String> {
    if encoded.is_empty() {
        return Ok(String::new());
    }

    let compressed = STANDARD.decode(encoded)?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| NotebookError::InvalidDocument {
            message: format!("compressed body is corrupt: {}", e),
        })?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Note;

    #[test]
    fn compression_round_trips_text() {
        for text in ["", "plain ascii", "multi-byte: żółć 日本語 🎲", "line\nbreaks\r\n"] {
            let encoded = compress_text(text).expect("compress");
            assert_eq!(decompress_text(&encoded).expect("decompress"), text);
        }
    }

    #[test]
    fn corrupt_body_is_reported() {
        let error = decompress_text("bm90IGd6aXA=").expect_err("not gzip");
        assert!(matches!(error, NotebookError::InvalidDocument { .. }));

        let error = decompress_text("###").expect_err("not base64");
        assert!(matches!(error, NotebookError::Decode(_)));
    }

    #[test]
    fn internal_name_is_name_plus_identifier() {
        let mut note = Note::new("Shopping");
        assert_eq!(note.name(), "Shopping");
        assert!(note.identifier_string().starts_with('#'));
        assert_eq!(
            note.internal_name(),
            format!("{}{}", note.name(), note.identifier_string())
        );

        let suffix = note.identifier_string().to_string();
        note.set_name("Groceries #2");
        assert_eq!(note.name(), "Groceries 2");
        assert_eq!(note.identifier_string(), suffix);
    }

    #[test]
    fn legacy_double_separator_names_split_at_first() {
        assert_eq!(split_internal_name("Old##637"), ("Old", "##637"));
        assert_eq!(split_internal_name("NoSuffix"), ("NoSuffix", ""));
    }

    #[test]
    fn tokens_are_strictly_increasing() {
        let mut previous = next_unique_token();
        for _ in 0..1000 {
            let token = next_unique_token();
            assert!(token > previous);
            previous = token;
        }
    }

    #[test]
    fn set_body_touches_modified() {
        let mut note = Note::new("Draft");
        note.core_mut().modified = 0;
        note.set_body("text");
        assert!(note.modified() > 0);
        assert_eq!(note.body(), "text");
    }
}
