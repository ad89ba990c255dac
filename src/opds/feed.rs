//! Catalog views: one feed per browsing operation.

use super::entry::{book_entry, navigation_entry};
use super::model::{Feed, Link, Person, Relation};
use super::search::{path_search_template, search_description};
use super::{
    ACQUISITION_TYPE, ATOM_TYPE, DEFAULT_SERVER_NAME, NAVIGATION_TYPE, OPENSEARCH_TYPE,
    OpenSearchDescription, PLUGIN_AUTHOR_NAME, PLUGIN_AUTHOR_URI,
};
use crate::auth::Identity;
use crate::error::{AppError, Result};
use crate::library::{
    BookItem, CatalogItem, GenreQuery, ItemKind, ItemQuery, LibraryIndex, SearchIndex,
    SearchQuery, SortField, SortOrder,
};
use crate::media::media_type_for_path;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Shard meaning "no letter filter".
pub const ALL_SHARD: &str = "00";

/// Maximum number of search hits in a feed.
pub const SEARCH_LIMIT: usize = 100;

/// Maximum number of books in the recently added feed.
pub const RECENTLY_ADDED_LIMIT: usize = 50;

/// Server identity and scope of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    /// Display name of the server.
    pub server_name: String,
    /// Path prefix of every URL, without trailing slash.
    pub base_url: String,
    /// Names or ids of the libraries served; empty serves every library.
    pub libraries: Vec<String>,
}

impl CatalogSettings {
    /// Create settings, normalizing the base URL.
    pub fn new(server_name: impl Into<String>, base_url: &str, libraries: Vec<String>) -> Self {
        Self {
            server_name: server_name.into(),
            base_url: normalize_base_url(base_url),
            libraries,
        }
    }

    /// Feed title: the server name, or the default when unset.
    pub fn title(&self) -> &str {
        let name = self.server_name.trim();
        if name.is_empty() {
            DEFAULT_SERVER_NAME
        } else {
            name
        }
    }
}

/// Normalize a path prefix: `/` and empty become empty, a leading slash
/// is added and trailing slashes are removed.
///
/// The result is always a plain path. Scheme and host of an absolute URL
/// are dropped.
pub fn normalize_base_url(base_url: &str) -> String {
    let mut path = base_url.trim();
    if let Some((_, after_scheme)) = path.split_once("://") {
        path = after_scheme.find('/').map_or("", |i| &after_scheme[i..]);
    }

    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Normalize a letter shard: anything but a single character means "all".
fn letter_filter(filter: &str) -> Option<String> {
    let mut chars = filter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c.to_string()),
        _ => None,
    }
}

/// Builds every catalog feed from the library and search collaborators.
pub struct FeedProvider {
    index: Arc<dyn LibraryIndex>,
    search: Arc<dyn SearchIndex>,
    settings: CatalogSettings,
}

impl FeedProvider {
    /// Create a new feed provider.
    pub fn new(
        index: Arc<dyn LibraryIndex>,
        search: Arc<dyn SearchIndex>,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            index,
            search,
            settings,
        }
    }

    /// Catalog settings.
    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/opds{}", self.base_url(), path)
    }

    /// Empty feed with id, title and author filled in.
    fn new_feed(&self) -> Feed {
        let mut feed = Feed::new(uuid::Uuid::new_v4().to_string(), self.settings.title());
        feed.author = Some(Person {
            name: PLUGIN_AUTHOR_NAME.to_string(),
            uri: Some(PLUGIN_AUTHOR_URI.to_string()),
        });
        feed
    }

    /// Self, start, optional up, then both search links.
    fn feed_links(&self, self_path: &str, self_type: &str, up_path: Option<&str>) -> Vec<Link> {
        let mut links = vec![
            Link::new(Relation::SelfLink, self.url(self_path), self_type),
            Link::new(Relation::Start, self.url(""), NAVIGATION_TYPE).with_title("Start"),
        ];
        if let Some(up) = up_path {
            links.push(Link::new(Relation::Up, self.url(up), NAVIGATION_TYPE));
        }
        links.push(Link::new(
            Relation::Search,
            self.url("/osd"),
            OPENSEARCH_TYPE,
        ));
        links.push(
            Link::new(
                Relation::Search,
                path_search_template(self.base_url()),
                ATOM_TYPE,
            )
            .with_title("Search"),
        );
        links
    }

    /// Acquisition feed listing the given books.
    fn book_feed(&self, self_path: &str, up_path: &str, books: Vec<BookItem>) -> Feed {
        let mut feed = self.new_feed();
        feed.links = self.feed_links(self_path, ACQUISITION_TYPE, Some(up_path));
        feed.entries = books
            .iter()
            .map(|book| book_entry(book, self.base_url()))
            .collect();
        feed
    }

    /// Library ids the identity may browse.
    ///
    /// Configured libraries, narrowed to the user's visible libraries when
    /// the identity is not anonymous.
    fn scoped_libraries(&self, identity: &Identity) -> Result<Vec<String>> {
        let configured: Vec<String> = self
            .index
            .libraries()?
            .into_iter()
            .filter(|lib| {
                self.settings.libraries.is_empty()
                    || self
                        .settings
                        .libraries
                        .iter()
                        .any(|wanted| wanted == &lib.id || wanted.eq_ignore_ascii_case(&lib.name))
            })
            .map(|lib| lib.id)
            .collect();

        match identity.user_id() {
            None => Ok(configured),
            Some(user_id) => {
                let visible: HashSet<String> =
                    self.index.visible_libraries(user_id)?.into_iter().collect();
                Ok(configured
                    .into_iter()
                    .filter(|id| visible.contains(id))
                    .collect())
            }
        }
    }

    /// Run a book query within the identity's scope, keeping only books.
    fn query_books(&self, identity: &Identity, mut query: ItemQuery) -> Result<Vec<BookItem>> {
        let scope = self.scoped_libraries(identity)?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        query.parent_ids = scope;

        let items = self.index.query_items(&query)?;
        Ok(items.into_iter().filter_map(CatalogItem::into_book).collect())
    }

    /// Root navigation feed.
    pub fn root_feed(&self) -> Feed {
        let now = Utc::now();
        let mut feed = self.new_feed();
        feed.links = self.feed_links("", NAVIGATION_TYPE, None);
        feed.entries = vec![
            navigation_entry(
                "Alphabetical Books",
                "/opds/books",
                self.url("/books"),
                NAVIGATION_TYPE,
                Some("Books sorted alphabetically"),
                now,
            ),
            navigation_entry(
                "Genres",
                "/opds/genres",
                self.url("/genres"),
                NAVIGATION_TYPE,
                Some("Books grouped by genre"),
                now,
            ),
        ];
        feed
    }

    /// Alphabetical index: "All" plus one shard per letter A-Z.
    pub fn alphabetical_feed(&self) -> Feed {
        let now = Utc::now();
        let mut feed = self.new_feed();
        feed.links = self.feed_links("/books", NAVIGATION_TYPE, Some(""));

        let shards = std::iter::once(("All".to_string(), ALL_SHARD.to_string()))
            .chain(('A'..='Z').map(|c| (c.to_string(), c.to_string())));
        feed.entries = shards
            .map(|(title, shard)| {
                let path = format!("/books/letter/{}", shard);
                navigation_entry(
                    &title,
                    &format!("/opds{}", path),
                    self.url(&path),
                    ACQUISITION_TYPE,
                    None,
                    now,
                )
            })
            .collect();
        feed
    }

    /// Books whose name starts with the shard letter, or every book.
    pub fn letter_feed(&self, identity: &Identity, filter: &str) -> Result<Feed> {
        let letter = letter_filter(filter);

        let mut query = ItemQuery::books_under(Vec::new());
        query.name_starts_with = letter.clone();
        let books = self.query_books(identity, query)?;

        tracing::debug!(shard = %filter, books = books.len(), "Built letter feed");

        let shard = letter.as_deref().unwrap_or(ALL_SHARD);
        let self_path = format!("/books/letter/{}", urlencoding::encode(shard));
        Ok(self.book_feed(&self_path, "/books", books))
    }

    /// Genre index.
    pub fn genres_feed(&self, identity: &Identity) -> Result<Feed> {
        let scope = self.scoped_libraries(identity)?;
        let genres = if scope.is_empty() {
            Vec::new()
        } else {
            self.index.query_genres(&GenreQuery {
                parent_ids: scope,
                include_kinds: vec![ItemKind::Book],
            })?
        };

        let now = Utc::now();
        let mut feed = self.new_feed();
        feed.links = self.feed_links("/genres", NAVIGATION_TYPE, Some(""));
        feed.entries = genres
            .iter()
            .map(|genre| {
                let path = format!("/genres/{}", urlencoding::encode(&genre.id));
                navigation_entry(
                    &genre.name,
                    &format!("/opds{}", path),
                    self.url(&path),
                    ACQUISITION_TYPE,
                    None,
                    now,
                )
            })
            .collect();
        Ok(feed)
    }

    /// Books carrying one genre.
    pub fn genre_feed(&self, identity: &Identity, genre_id: &str) -> Result<Feed> {
        let mut query = ItemQuery::books_under(Vec::new());
        query.genre_ids = vec![genre_id.to_string()];
        let books = self.query_books(identity, query)?;

        let self_path = format!("/genres/{}", urlencoding::encode(genre_id));
        Ok(self.book_feed(&self_path, "/genres", books))
    }

    /// Books most recently added to the library, newest first.
    pub fn recently_added_feed(&self, identity: &Identity) -> Result<Feed> {
        let mut query = ItemQuery::books_under(Vec::new());
        query.order_by = vec![
            (SortField::DateCreated, SortOrder::Descending),
            (SortField::SortName, SortOrder::Ascending),
        ];
        query.limit = Some(RECENTLY_ADDED_LIMIT);
        let books = self.query_books(identity, query)?;

        Ok(self.book_feed("/books/recentlyadded", "", books))
    }

    /// Books the user marked as favorite. Empty for anonymous requests.
    pub fn favorites_feed(&self, identity: &Identity) -> Result<Feed> {
        let books = match identity.user_id() {
            Some(user_id) => {
                let mut query = ItemQuery::books_under(Vec::new());
                query.favorite_of = Some(user_id.to_string());
                self.query_books(identity, query)?
            }
            None => Vec::new(),
        };

        Ok(self.book_feed("/books/favorite", "", books))
    }

    /// Search results in the order the search index ranks them.
    pub fn search_feed(&self, identity: &Identity, term: &str) -> Result<Feed> {
        let scope = self.scoped_libraries(identity)?;
        let books: Vec<BookItem> = if scope.is_empty() {
            Vec::new()
        } else {
            self.search
                .search(&SearchQuery {
                    term: term.to_string(),
                    limit: SEARCH_LIMIT,
                    include_kinds: vec![ItemKind::Book],
                    parent_ids: scope,
                })?
                .into_iter()
                .filter_map(CatalogItem::into_book)
                .take(SEARCH_LIMIT)
                .collect()
        };

        tracing::debug!(term = %term, hits = books.len(), "Built search feed");

        let self_path = format!("/search/{}", urlencoding::encode(term));
        Ok(self.book_feed(&self_path, "", books))
    }

    /// OpenSearch description of this catalog.
    pub fn search_description(&self) -> OpenSearchDescription {
        search_description(self.settings.title(), self.base_url())
    }

    fn get_book(&self, book_id: &str) -> Result<BookItem> {
        self.index
            .get_item(book_id)?
            .and_then(CatalogItem::into_book)
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", book_id)))
    }

    /// Cover image path of a book and its media type.
    pub fn cover_file(&self, book_id: &str) -> Result<(PathBuf, &'static str)> {
        let book = self.get_book(book_id)?;
        let path = book
            .image_path
            .ok_or_else(|| AppError::NotFound(format!("No cover for book: {}", book_id)))?;
        let media_type = media_type_for_path(&path).unwrap_or("image/jpeg");
        Ok((path, media_type))
    }

    /// Content file of a book, its media type and display filename.
    pub fn book_file(&self, book_id: &str) -> Result<(PathBuf, &'static str, String)> {
        let book = self.get_book(book_id)?;
        let filename = book.filename().to_string();
        let path = book
            .path
            .ok_or_else(|| AppError::NotFound(format!("No file for book: {}", book_id)))?;
        let media_type = media_type_for_path(&path).unwrap_or("application/octet-stream");
        Ok((path, media_type, filename))
    }
}
