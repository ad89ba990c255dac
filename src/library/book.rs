//! Catalog item models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A book indexed in one of the libraries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookItem {
    /// Unique identifier for the book.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Name used for ordering (see [`sort_name`]).
    pub sort_name: String,

    /// Library the book belongs to.
    pub library_id: String,

    /// Immediate parent container.
    pub parent_id: Option<String>,

    /// Display name of the immediate parent container (usually the author folder).
    pub parent_name: Option<String>,

    /// Book description or summary.
    pub overview: Option<String>,

    /// Publisher name.
    pub publisher: Option<String>,

    /// Language code (e.g., "en", "fr").
    pub language: Option<String>,

    /// Path to the book file.
    pub path: Option<PathBuf>,

    /// Path to the primary image, if one was found.
    pub image_path: Option<PathBuf>,

    /// File size in bytes.
    pub size: Option<u64>,

    /// Last modified time.
    pub date_modified: DateTime<Utc>,

    /// First time the book was indexed.
    pub date_created: DateTime<Utc>,
}

impl BookItem {
    /// Create a book with minimal information from a file path.
    pub fn new(path: PathBuf, library_id: impl Into<String>) -> Self {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();
        let now = Utc::now();

        Self {
            id: item_id_for_path(&path),
            sort_name: sort_name(&name),
            name,
            library_id: library_id.into(),
            parent_id: None,
            parent_name: None,
            overview: None,
            publisher: None,
            language: None,
            path: Some(path),
            image_path: None,
            size: None,
            date_modified: now,
            date_created: now,
        }
    }

    /// Set the display name, keeping the sort name in step.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.sort_name = sort_name(&self.name);
    }

    /// Get the filename of the book.
    pub fn filename(&self) -> &str {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
    }
}

/// A directory inside a library (author, series, collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderItem {
    /// Unique identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Library the folder belongs to.
    pub library_id: String,

    /// Immediate parent container (None at the library root).
    pub parent_id: Option<String>,

    /// Path on disk.
    pub path: PathBuf,
}

impl FolderItem {
    /// Create a folder item from a directory path.
    pub fn new(path: PathBuf, library_id: impl Into<String>, parent_id: Option<String>) -> Self {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        Self {
            id: item_id_for_path(&path),
            name,
            library_id: library_id.into(),
            parent_id,
            path,
        }
    }
}

/// A genre facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Stable identifier derived from the normalized name.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Genre {
    /// Create a genre from its display name.
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_string();
        Self {
            id: genre_id(&name),
            name,
        }
    }
}

/// Deterministic item id from a path on disk.
pub fn item_id_for_path(path: &std::path::Path) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes()).to_string()
}

/// Deterministic genre id, case-insensitive on the name.
pub fn genre_id(name: &str) -> String {
    let key = format!("genre:{}", name.trim().to_lowercase());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Compute the name used for ordering.
///
/// Lowercased, with a leading English article dropped, so that
/// "The Hobbit" sorts under H.
pub fn sort_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    for article in ["the ", "a ", "an "] {
        if let Some(rest) = lower.strip_prefix(article) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    lower
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_name_drops_articles() {
        assert_eq!(sort_name("The Hobbit"), "hobbit");
        assert_eq!(sort_name("A Wizard of Earthsea"), "wizard of earthsea");
        assert_eq!(sort_name("An Instance"), "instance");
        assert_eq!(sort_name("Anathem"), "anathem");
        assert_eq!(sort_name("The"), "the");
    }

    #[test]
    fn test_book_new_uses_file_stem() {
        let book = BookItem::new(PathBuf::from("/lib/Ursula/The Dispossessed.epub"), "lib");
        assert_eq!(book.name, "The Dispossessed");
        assert_eq!(book.sort_name, "dispossessed");
        assert_eq!(book.filename(), "The Dispossessed.epub");
        assert_eq!(
            book.id,
            item_id_for_path(std::path::Path::new("/lib/Ursula/The Dispossessed.epub"))
        );
    }

    #[test]
    fn test_genre_id_is_case_insensitive() {
        assert_eq!(Genre::new("Fantasy").id, Genre::new(" fantasy ").id);
        assert_ne!(Genre::new("Fantasy").id, Genre::new("Horror").id);
    }
}
