use crate::auth::verify_password;
use crate::db::*;
use crate::error::{AppError, Result};
use crate::library::{
    BookItem, CatalogItem, CredentialStore, FolderItem, Genre, GenreQuery, ItemKind, ItemQuery,
    LibraryIndex, LibraryRoot, SearchIndex, SearchQuery, SortField, SortOrder,
};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ITEM_COLUMNS: &str = "id, kind, library_id, parent_id, name, sort_name, parent_name, \
     overview, publisher, language, path, image_path, size, date_modified, date_created";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_functions(&conn)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_login INTEGER,
                last_login_ip TEXT
            );

            -- Libraries table
            CREATE TABLE IF NOT EXISTS libraries (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                path TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            -- Library access table (private libraries)
            CREATE TABLE IF NOT EXISTS library_access (
                user_id TEXT NOT NULL,
                library_id TEXT NOT NULL,
                PRIMARY KEY (user_id, library_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (library_id) REFERENCES libraries(id) ON DELETE CASCADE
            );

            -- Catalog items: books and folders
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                library_id TEXT NOT NULL,
                parent_id TEXT,
                name TEXT NOT NULL,
                sort_name TEXT NOT NULL,
                parent_name TEXT,
                overview TEXT,
                publisher TEXT,
                language TEXT,
                path TEXT,
                image_path TEXT,
                size INTEGER,
                date_modified INTEGER NOT NULL,
                date_created INTEGER NOT NULL,
                FOREIGN KEY (library_id) REFERENCES libraries(id) ON DELETE CASCADE
            );

            -- Genres table
            CREATE TABLE IF NOT EXISTS genres (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            -- Item genres table
            CREATE TABLE IF NOT EXISTS item_genres (
                item_id TEXT NOT NULL,
                genre_id TEXT NOT NULL,
                PRIMARY KEY (item_id, genre_id),
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
                FOREIGN KEY (genre_id) REFERENCES genres(id) ON DELETE CASCADE
            );

            -- Favorites table
            CREATE TABLE IF NOT EXISTS favorites (
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, item_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_items_library ON items(library_id, kind);
            CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id);
            CREATE INDEX IF NOT EXISTS idx_items_sort ON items(sort_name);
            CREATE INDEX IF NOT EXISTS idx_items_created ON items(date_created);
            CREATE INDEX IF NOT EXISTS idx_item_genres_genre ON item_genres(genre_id);
            CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at, last_login, last_login_ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.password_hash,
                user.created_at,
                user.last_login,
                user.last_login_ip,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::InvalidInput(format!("Username '{}' already exists", user.username))
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(())
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, username, password_hash, created_at, last_login, last_login_ip
                 FROM users WHERE username = ?1",
                params![username],
                Self::row_to_user,
            )
            .optional()?)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, created_at, last_login, last_login_ip
             FROM users ORDER BY username",
        )?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
            last_login: row.get(4)?,
            last_login_ip: row.get(5)?,
        })
    }

    /// Update user password.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE username = ?2",
            params![password_hash, username],
        )?;
        Ok(rows > 0)
    }

    /// Record a successful login and the address it came from.
    pub fn update_user_last_login(&self, user_id: &str, remote: IpAddr) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1, last_login_ip = ?2 WHERE id = ?3",
            params![now_timestamp(), remote.to_string(), user_id],
        )?;
        Ok(())
    }

    /// Delete user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
        Ok(rows > 0)
    }

    // ========== LIBRARY OPERATIONS ==========

    /// Create library.
    pub fn create_library(&self, library: &Library) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO libraries (id, name, path, is_public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                library.id,
                library.name,
                library.path,
                library.is_public,
                library.created_at,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::InvalidInput(format!("Library '{}' already exists", library.name))
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(())
    }

    /// Get library by name.
    pub fn get_library_by_name(&self, name: &str) -> Result<Option<Library>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, name, path, is_public, created_at FROM libraries WHERE name = ?1",
                params![name],
                Self::row_to_library,
            )
            .optional()?)
    }

    /// List all libraries.
    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, path, is_public, created_at FROM libraries ORDER BY name",
        )?;

        let libraries = stmt
            .query_map([], Self::row_to_library)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(libraries)
    }

    fn row_to_library(row: &rusqlite::Row<'_>) -> rusqlite::Result<Library> {
        Ok(Library {
            id: row.get(0)?,
            name: row.get(1)?,
            path: row.get(2)?,
            is_public: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Delete library and everything indexed under it.
    pub fn delete_library(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM libraries WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    /// Give a user access to a library.
    pub fn grant_library_access(&self, user_id: &str, library_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO library_access (user_id, library_id) VALUES (?1, ?2)",
            params![user_id, library_id],
        )?;
        Ok(())
    }

    /// Remove a user's access to a library.
    pub fn revoke_library_access(&self, user_id: &str, library_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM library_access WHERE user_id = ?1 AND library_id = ?2",
            params![user_id, library_id],
        )?;
        Ok(rows > 0)
    }

    // ========== FAVORITE OPERATIONS ==========

    /// Mark or unmark a book as a favorite.
    pub fn set_favorite(&self, user_id: &str, item_id: &str, favorite: bool) -> Result<()> {
        let conn = self.conn.lock();

        if !favorite {
            conn.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
            )?;
            return Ok(());
        }

        let exists = conn
            .query_row(
                "SELECT 1 FROM items WHERE id = ?1 AND kind = ?2",
                params![item_id, ItemKind::Book.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(AppError::NotFound(format!("Book not found: {}", item_id)));
        }

        conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, item_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, item_id, now_timestamp()],
        )?;
        Ok(())
    }

    // ========== ITEM OPERATIONS ==========

    /// Save or update a book together with its genres.
    ///
    /// `date_created` of an existing row is kept.
    pub fn save_book(&self, book: &BookItem, genres: &[Genre]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO items ({ITEM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT (id) DO UPDATE SET
                    parent_id = excluded.parent_id,
                    name = excluded.name,
                    sort_name = excluded.sort_name,
                    parent_name = excluded.parent_name,
                    overview = excluded.overview,
                    publisher = excluded.publisher,
                    language = excluded.language,
                    path = excluded.path,
                    image_path = excluded.image_path,
                    size = excluded.size,
                    date_modified = excluded.date_modified"
            ),
            params![
                book.id,
                ItemKind::Book.as_str(),
                book.library_id,
                book.parent_id,
                book.name,
                book.sort_name,
                book.parent_name,
                book.overview,
                book.publisher,
                book.language,
                book.path.as_deref().map(path_to_string),
                book.image_path.as_deref().map(path_to_string),
                book.size.map(|s| s as i64),
                book.date_modified.timestamp(),
                book.date_created.timestamp(),
            ],
        )?;

        tx.execute(
            "DELETE FROM item_genres WHERE item_id = ?1",
            params![book.id],
        )?;
        for genre in genres {
            tx.execute(
                "INSERT OR IGNORE INTO genres (id, name) VALUES (?1, ?2)",
                params![genre.id, genre.name],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO item_genres (item_id, genre_id) VALUES (?1, ?2)",
                params![book.id, genre.id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Save or update a folder.
    pub fn save_folder(&self, folder: &FolderItem) -> Result<()> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            &format!(
                "INSERT INTO items ({ITEM_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, NULL, NULL, ?7, NULL, NULL, ?8, ?8)
                 ON CONFLICT (id) DO UPDATE SET
                    parent_id = excluded.parent_id,
                    name = excluded.name,
                    sort_name = excluded.sort_name,
                    path = excluded.path"
            ),
            params![
                folder.id,
                ItemKind::Folder.as_str(),
                folder.library_id,
                folder.parent_id,
                folder.name,
                crate::library::sort_name(&folder.name),
                path_to_string(&folder.path),
                now,
            ],
        )?;
        Ok(())
    }

    /// Size and timestamps of every book indexed under a library.
    pub fn book_stamps(&self, library_id: &str) -> Result<HashMap<String, ItemStamp>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, size, date_modified, date_created FROM items
             WHERE library_id = ?1 AND kind = ?2",
        )?;

        let stamps = stmt
            .query_map(params![library_id, ItemKind::Book.as_str()], |row| {
                let size: Option<i64> = row.get(1)?;
                Ok((
                    row.get::<_, String>(0)?,
                    ItemStamp {
                        size: size.map(|s| s as u64),
                        modified: row.get(2)?,
                        created: row.get(3)?,
                    },
                ))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(stamps)
    }

    /// Delete items of a library that are not in `keep_ids` (removed files).
    pub fn delete_items_not_in(&self, library_id: &str, keep_ids: &[String]) -> Result<usize> {
        let conn = self.conn.lock();

        if keep_ids.is_empty() {
            let deleted = conn.execute(
                "DELETE FROM items WHERE library_id = ?1",
                params![library_id],
            )?;
            return Ok(deleted);
        }

        let sql = format!(
            "DELETE FROM items WHERE library_id = ? AND id NOT IN ({})",
            placeholders(keep_ids.len())
        );

        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&library_id];
        for id in keep_ids {
            params.push(id);
        }

        let deleted = conn.execute(&sql, params_from_iter(params))?;
        Ok(deleted)
    }

    /// Drop genres no item carries any more.
    pub fn prune_genres(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM genres WHERE id NOT IN (SELECT DISTINCT genre_id FROM item_genres)",
            [],
        )?;
        Ok(deleted)
    }

    /// Number of indexed books per library id.
    pub fn book_counts(&self) -> Result<HashMap<String, usize>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT library_id, COUNT(*) FROM items WHERE kind = ?1 GROUP BY library_id",
        )?;

        let counts = stmt
            .query_map(params![ItemKind::Book.as_str()], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count as usize))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(counts)
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogItem> {
        let kind: String = row.get(1)?;
        let path: Option<String> = row.get(10)?;

        if kind == ItemKind::Folder.as_str() {
            return Ok(CatalogItem::Folder(FolderItem {
                id: row.get(0)?,
                name: row.get(4)?,
                library_id: row.get(2)?,
                parent_id: row.get(3)?,
                path: PathBuf::from(path.unwrap_or_default()),
            }));
        }

        let image_path: Option<String> = row.get(11)?;
        let size: Option<i64> = row.get(12)?;
        Ok(CatalogItem::Book(BookItem {
            id: row.get(0)?,
            library_id: row.get(2)?,
            parent_id: row.get(3)?,
            name: row.get(4)?,
            sort_name: row.get(5)?,
            parent_name: row.get(6)?,
            overview: row.get(7)?,
            publisher: row.get(8)?,
            language: row.get(9)?,
            path: path.map(PathBuf::from),
            image_path: image_path.map(PathBuf::from),
            size: size.map(|s| s as u64),
            date_modified: timestamp_to_datetime(row.get(13)?),
            date_created: timestamp_to_datetime(row.get(14)?),
        }))
    }

    fn query_item_rows(&self, sql: &str, values: Vec<Value>) -> Result<Vec<CatalogItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let items = stmt
            .query_map(params_from_iter(values), Self::row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Accumulates WHERE clauses and their bound values.
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.values.extend(values);
    }

    fn any_of(&mut self, column: &str, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        self.push(
            format!("{} IN ({})", column, placeholders(ids.len())),
            ids.iter().cloned().map(Value::Text),
        );
    }

    fn kinds(&mut self, kinds: &[ItemKind]) {
        let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
        self.any_of("kind", &kinds);
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn order_sql(order_by: &[(SortField, SortOrder)]) -> String {
    let mut terms: Vec<String> = order_by
        .iter()
        .map(|(field, order)| {
            let column = match field {
                SortField::SortName => "sort_name",
                SortField::Name => "name COLLATE NOCASE",
                SortField::DateCreated => "date_created",
                SortField::DateModified => "date_modified",
            };
            let direction = match order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            format!("{} {}", column, direction)
        })
        .collect();
    terms.push("id ASC".to_string());
    format!(" ORDER BY {}", terms.join(", "))
}

impl LibraryIndex for Database {
    fn get_item(&self, id: &str) -> Result<Option<CatalogItem>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id],
                Self::row_to_item,
            )
            .optional()?)
    }

    fn query_items(&self, query: &ItemQuery) -> Result<Vec<CatalogItem>> {
        let mut filter = Filter::default();

        let parent_column = if query.recursive {
            "library_id"
        } else {
            "parent_id"
        };
        filter.any_of(parent_column, &query.parent_ids);
        filter.kinds(&query.include_kinds);

        if let Some(prefix) = query.name_starts_with.as_deref().filter(|p| !p.is_empty()) {
            filter.push(
                "sort_name LIKE ? ESCAPE '\\'",
                [Value::Text(format!("{}%", escape_like(&prefix.to_lowercase())))],
            );
        }

        if !query.genre_ids.is_empty() {
            filter.push(
                format!(
                    "id IN (SELECT item_id FROM item_genres WHERE genre_id IN ({}))",
                    placeholders(query.genre_ids.len())
                ),
                query.genre_ids.iter().cloned().map(Value::Text),
            );
        }

        if let Some(user_id) = &query.favorite_of {
            filter.push(
                "id IN (SELECT item_id FROM favorites WHERE user_id = ?)",
                [Value::Text(user_id.clone())],
            );
        }

        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items{}", filter.where_sql());
        sql.push_str(&order_sql(&query.order_by));
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        self.query_item_rows(&sql, filter.values)
    }

    fn query_genres(&self, query: &GenreQuery) -> Result<Vec<Genre>> {
        let mut filter = Filter::default();
        filter.any_of("i.library_id", &query.parent_ids);
        let kinds: Vec<String> = query
            .include_kinds
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        filter.any_of("i.kind", &kinds);

        let sql = format!(
            "SELECT DISTINCT g.id, g.name FROM genres g
             JOIN item_genres ig ON ig.genre_id = g.id
             JOIN items i ON i.id = ig.item_id{}
             ORDER BY g.name COLLATE NOCASE, g.id",
            filter.where_sql()
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let genres = stmt
            .query_map(params_from_iter(filter.values), |row| {
                Ok(Genre {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    fn libraries(&self) -> Result<Vec<LibraryRoot>> {
        Ok(self
            .list_libraries()?
            .into_iter()
            .map(|lib| LibraryRoot {
                id: lib.id,
                name: lib.name,
            })
            .collect())
    }

    fn visible_libraries(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT l.id FROM libraries l
             WHERE l.is_public = 1
                OR EXISTS (SELECT 1 FROM library_access la
                           WHERE la.library_id = l.id AND la.user_id = ?1)
             ORDER BY l.name",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

impl CredentialStore for Database {
    fn authenticate(&self, username: &str, password: &str, remote: IpAddr) -> Result<Option<String>> {
        let Some(user) = self.get_user_by_username(username)? else {
            return Ok(None);
        };

        if !verify_password(password, &user.password_hash)? {
            return Ok(None);
        }

        self.update_user_last_login(&user.id, remote)?;
        Ok(Some(user.id))
    }
}

/// Register `unicode_lower`, a full Unicode lowercase. The builtin `lower`
/// only folds ASCII.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
    .map_err(|e| AppError::Internal(format!("Failed to register SQL functions: {}", e)))
}

impl SearchIndex for Database {
    /// Rank: exact name, name prefix, name substring, then author or
    /// overview substring. Ties broken by sort name.
    fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>> {
        let term = query.term.trim().to_lowercase();
        if term.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let escaped = escape_like(&term);
        let prefix = Value::Text(format!("{}%", escaped));
        let contains = Value::Text(format!("%{}%", escaped));

        let mut filter = Filter::default();
        filter.push(
            "(unicode_lower(name) LIKE ? ESCAPE '\\' \
             OR unicode_lower(coalesce(parent_name, '')) LIKE ? ESCAPE '\\' \
             OR unicode_lower(coalesce(overview, '')) LIKE ? ESCAPE '\\')",
            [contains.clone(), contains.clone(), contains.clone()],
        );
        filter.kinds(&query.include_kinds);
        filter.any_of("library_id", &query.parent_ids);

        let rank = "CASE WHEN unicode_lower(name) = ? OR sort_name = ? THEN 0 \
             WHEN unicode_lower(name) LIKE ? ESCAPE '\\' OR sort_name LIKE ? ESCAPE '\\' THEN 1 \
             WHEN unicode_lower(name) LIKE ? ESCAPE '\\' THEN 2 ELSE 3 END";
        let mut values = vec![
            Value::Text(term.clone()),
            Value::Text(term.clone()),
            prefix.clone(),
            prefix,
            contains,
        ];
        values.extend(filter.values.clone());

        let sql = format!(
            "SELECT {ITEM_COLUMNS}, {rank} AS rank FROM items{} \
             ORDER BY rank ASC, sort_name ASC, id ASC LIMIT {}",
            filter.where_sql(),
            query.limit
        );

        self.query_item_rows(&sql, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("dune"), "dune");
    }

    #[test]
    fn test_order_sql_appends_id_tiebreak() {
        let sql = order_sql(&[(SortField::DateCreated, SortOrder::Descending)]);
        assert_eq!(sql, " ORDER BY date_created DESC, id ASC");
    }

    #[test]
    fn test_filter_skips_empty_sets() {
        let mut filter = Filter::default();
        filter.any_of("library_id", &[]);
        assert_eq!(filter.where_sql(), "");

        filter.any_of("library_id", &["a".to_string(), "b".to_string()]);
        assert_eq!(filter.where_sql(), " WHERE library_id IN (?,?)");
        assert_eq!(filter.values.len(), 2);
    }
}
