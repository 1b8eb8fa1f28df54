use std::{
    fmt,
    path::{Path, PathBuf},
};

use common::helper::error_chain_fmt;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub kind: EntryKind,
    /// Path relative to the listed directory, `.` for the directory itself
    pub relative_path: PathBuf,
    /// Size in bytes of a file, `None` for directories or when it could not be read
    pub size: Option<u64>,
}

/// Human-readable listing of a local directory
///
/// Rendered with `Display`:
/// ```text
/// === Downloaded files in /tmp/downloads/2024-01-01_20240101_093005 ===
/// [DIR]  ./
/// [FILE] a.txt (5 bytes)
/// [DIR]  sub/
/// [FILE] sub/b.txt (3 bytes)
/// ```
#[derive(Debug, Clone)]
pub struct Inventory {
    pub title: String,
    pub entries: Vec<InventoryEntry>,
}

#[derive(thiserror::Error)]
pub enum InventoryError {
    #[error("Failed to walk through {path}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl std::fmt::Debug for InventoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl Inventory {
    /// Lists recursively a directory and everything below it
    pub fn of_tree(dir: &Path) -> Result<Self, InventoryError> {
        Self::walk(
            format!("=== Downloaded files in {} ===", dir.display()),
            WalkDir::new(dir),
            dir,
        )
    }

    /// Lists the direct children of a directory
    pub fn of_top_level(dir: &Path) -> Result<Self, InventoryError> {
        Self::walk(
            format!("=== All contents in {} ===", dir.display()),
            WalkDir::new(dir).min_depth(1).max_depth(1),
            dir,
        )
    }

    fn walk(title: String, walker: WalkDir, root: &Path) -> Result<Self, InventoryError> {
        let mut entries = vec![];

        for entry in walker.sort_by_file_name() {
            let entry = entry.map_err(|source| InventoryError::Walk {
                path: root.to_path_buf(),
                source,
            })?;

            let relative_path = match entry.path().strip_prefix(root) {
                Ok(relative) if relative.as_os_str().is_empty() => PathBuf::from("."),
                Ok(relative) => relative.to_path_buf(),
                Err(_) => entry.path().to_path_buf(),
            };

            let inventory_entry = if entry.file_type().is_dir() {
                InventoryEntry {
                    kind: EntryKind::Dir,
                    relative_path,
                    size: None,
                }
            } else {
                InventoryEntry {
                    kind: EntryKind::File,
                    relative_path,
                    size: entry.metadata().ok().map(|metadata| metadata.len()),
                }
            };

            entries.push(inventory_entry);
        }

        Ok(Self { title, entries })
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().filter_map(|entry| entry.size).sum()
    }
}

impl fmt::Display for InventoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.size) {
            (EntryKind::Dir, _) => write!(f, "[DIR]  {}/", self.relative_path.display()),
            (EntryKind::File, Some(size)) => {
                write!(f, "[FILE] {} ({} bytes)", self.relative_path.display(), size)
            }
            (EntryKind::File, None) => {
                write!(f, "[FILE] {} (size unknown)", self.relative_path.display())
            }
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}
