//! Application state shared across handlers.

use crate::auth::Authenticator;
use crate::config::Config;
use crate::db::{self, Database, Library};
use crate::error::Result;
use crate::library::scanner::{LibraryScanner, ScanSummary};
use crate::opds::{CatalogSettings, FeedProvider};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Resolves request credentials to an identity.
    pub authenticator: Arc<Authenticator>,
    /// Builds the catalog feeds.
    pub feeds: Arc<FeedProvider>,
    /// Library scanner.
    pub scanner: LibraryScanner,
}

impl AppState {
    /// Create application state backed by a database.
    ///
    /// The database serves as library index, credential store and search
    /// index at once.
    pub fn new_with_db(config: Config, db: Database) -> Self {
        let shared = Arc::new(db.clone());

        let authenticator = Authenticator::new(
            shared.clone(),
            config.auth.allow_anonymous,
            config.auth.realm.clone(),
        );

        let settings = CatalogSettings::new(
            config.server.name.clone(),
            &config.server.base_url,
            config.catalog.libraries.clone(),
        );
        let feeds = FeedProvider::new(shared.clone(), shared, settings);

        let scanner =
            LibraryScanner::new(db.clone(), config.scan.workers, config.cache.covers_dir.clone());

        Self {
            config: Arc::new(config),
            db,
            authenticator: Arc::new(authenticator),
            feeds: Arc::new(feeds),
            scanner,
        }
    }

    /// Register the libraries listed in the config file that the database
    /// does not know yet. Returns how many were added.
    pub fn register_configured_libraries(&self) -> Result<usize> {
        let mut added = 0;

        for lib in &self.config.libraries {
            if self.db.get_library_by_name(&lib.name)?.is_some() {
                continue;
            }

            if !lib.path.is_dir() {
                tracing::warn!(library = %lib.name, path = %lib.path.display(), "Configured library path is not a directory");
            }

            self.db.create_library(&Library {
                id: uuid::Uuid::new_v4().to_string(),
                name: lib.name.clone(),
                path: lib.path.to_string_lossy().to_string(),
                is_public: lib.public,
                created_at: db::now_timestamp(),
            })?;
            tracing::info!(library = %lib.name, "Registered library from config");
            added += 1;
        }

        Ok(added)
    }

    /// Scan all libraries incrementally (only changed files).
    pub fn scan_all_libraries(&self) -> Result<ScanSummary> {
        self.scanner.scan_all()
    }

    /// Start a background scan (non-blocking).
    pub fn start_background_scan(&self) {
        let scanner = self.scanner.clone();
        std::thread::spawn(move || {
            if let Err(e) = scanner.scan_all() {
                tracing::error!(error = %e, "Background scan failed");
            }
        });
    }
}
