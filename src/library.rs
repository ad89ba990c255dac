//! Library index: catalog items and the queries the feeds run against them.

pub mod book;
pub mod scanner;

pub use book::{BookItem, FolderItem, Genre, sort_name};

use crate::error::Result;
use std::net::IpAddr;

/// Kind of a catalog item, used to filter queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A book file.
    Book,
    /// A directory.
    Folder,
}

impl ItemKind {
    /// Storage tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Book => "book",
            ItemKind::Folder => "folder",
        }
    }
}

/// Any item the library index may return.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogItem {
    /// A book.
    Book(BookItem),
    /// A folder.
    Folder(FolderItem),
}

impl CatalogItem {
    /// Item identifier.
    pub fn id(&self) -> &str {
        match self {
            CatalogItem::Book(b) => &b.id,
            CatalogItem::Folder(f) => &f.id,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            CatalogItem::Book(b) => &b.name,
            CatalogItem::Folder(f) => &f.name,
        }
    }

    /// Kind of this item.
    pub fn kind(&self) -> ItemKind {
        match self {
            CatalogItem::Book(_) => ItemKind::Book,
            CatalogItem::Folder(_) => ItemKind::Folder,
        }
    }

    /// Keep only books.
    pub fn into_book(self) -> Option<BookItem> {
        match self {
            CatalogItem::Book(b) => Some(b),
            CatalogItem::Folder(_) => None,
        }
    }
}

/// A top-level library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRoot {
    /// Library id.
    pub id: String,
    /// Library name.
    pub name: String,
}

/// Field to order query results by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Article-stripped lowercase name.
    SortName,
    /// Display name.
    Name,
    /// First indexed time.
    DateCreated,
    /// Last modified time.
    DateModified,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Item query against the library index.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    /// Libraries (or folders, when not recursive) to search under.
    pub parent_ids: Vec<String>,
    /// Kinds to include; empty means every kind.
    pub include_kinds: Vec<ItemKind>,
    /// Include all descendants rather than direct children only.
    pub recursive: bool,
    /// Case-insensitive name prefix.
    pub name_starts_with: Option<String>,
    /// Items must carry at least one of these genres.
    pub genre_ids: Vec<String>,
    /// Items must be a favorite of this user.
    pub favorite_of: Option<String>,
    /// Ordering, most significant first.
    pub order_by: Vec<(SortField, SortOrder)>,
    /// Maximum number of items.
    pub limit: Option<usize>,
}

impl ItemQuery {
    /// Recursive book query under the given libraries.
    pub fn books_under(parent_ids: Vec<String>) -> Self {
        Self {
            parent_ids,
            include_kinds: vec![ItemKind::Book],
            recursive: true,
            name_starts_with: None,
            genre_ids: Vec::new(),
            favorite_of: None,
            order_by: vec![(SortField::SortName, SortOrder::Ascending)],
            limit: None,
        }
    }
}

/// Query for the genres present under a set of libraries.
#[derive(Debug, Clone, PartialEq)]
pub struct GenreQuery {
    /// Libraries to look under.
    pub parent_ids: Vec<String>,
    /// Only genres carried by items of these kinds.
    pub include_kinds: Vec<ItemKind>,
}

/// Full-text query against the search index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Raw search term.
    pub term: String,
    /// Maximum number of hits.
    pub limit: usize,
    /// Kinds to include.
    pub include_kinds: Vec<ItemKind>,
    /// Libraries the hits must live in.
    pub parent_ids: Vec<String>,
}

/// The media library index.
pub trait LibraryIndex: Send + Sync {
    /// Look up one item by id.
    fn get_item(&self, id: &str) -> Result<Option<CatalogItem>>;

    /// Run an item query.
    fn query_items(&self, query: &ItemQuery) -> Result<Vec<CatalogItem>>;

    /// Distinct genres, ordered by name.
    fn query_genres(&self, query: &GenreQuery) -> Result<Vec<Genre>>;

    /// Every library root known to the index.
    fn libraries(&self) -> Result<Vec<LibraryRoot>>;

    /// Ids of the libraries a user may see.
    fn visible_libraries(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Resolves a username and password to a user id.
pub trait CredentialStore: Send + Sync {
    /// Return the user id when the credentials are valid.
    fn authenticate(&self, username: &str, password: &str, remote: IpAddr)
    -> Result<Option<String>>;
}

/// Ranked term search over the library.
pub trait SearchIndex: Send + Sync {
    /// Items matching the query, best first.
    fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>>;
}
