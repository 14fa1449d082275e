use std::{fs, io::Write, path::Path};

use chrono::Utc;
use log::{debug, error, trace};
use tempfile::NamedTempFile;

use crate::{NotebookError, Result};

/// Current time as Unix seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Current time as Unix milliseconds.
pub fn now_unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, so readers observe either the old or the new file.
pub fn write_file_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if !dir.exists() {
        debug!("Creating parent directory: {}", dir.display());
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create directory {}: {}", dir.display(), e);
            NotebookError::DirectoryError {
                path: dir.to_path_buf(),
            }
        })?;
    }

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        NotebookError::Io(e)
    })?;

    trace!("Writing {} bytes to temporary file", contents.len());
    temp_file.write_all(contents)?;
    temp_file.flush()?;

    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        NotebookError::Io(e.error)
    })?;

    debug!("Wrote {}", path.display());
    Ok(())
}

// Helper method for parsing comma-separated names
pub fn parse_names(names: Option<String>) -> Vec<String> {
    names
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");

        write_file_atomically(&path, b"first").unwrap();
        write_file_atomically(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files must not be left behind");
    }

    #[test]
    fn parse_names_trims_and_drops_blanks() {
        assert_eq!(
            parse_names(Some(" Work, ,Home ".to_string())),
            vec!["Work".to_string(), "Home".to_string()]
        );
        assert!(parse_names(None).is_empty());
    }
}
