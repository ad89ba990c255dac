use crate::error::{AppError, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Read-only OPDS catalog server for ebook libraries.
#[derive(Parser, Debug, Clone)]
#[command(name = "opds-catalog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "OPDS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Allow browsing without credentials.
        #[arg(long)]
        allow_anonymous: bool,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Library management commands.
    Library {
        /// Library subcommand action.
        #[command(subcommand)]
        action: LibraryCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Username.
        username: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Delete a user.
    Del {
        /// Username to delete.
        username: String,
    },

    /// List all users.
    List,

    /// Change user password.
    Passwd {
        /// Username.
        username: String,
        /// New password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Give a user access to a private library.
    Grant {
        /// Username.
        username: String,
        /// Library name.
        library: String,
    },

    /// Take away a user's access to a private library.
    Revoke {
        /// Username.
        username: String,
        /// Library name.
        library: String,
    },

    /// Mark a book as favorite for a user.
    Favorite {
        /// Username.
        username: String,
        /// Book id.
        book_id: String,
        /// Remove the book from the favorites instead.
        #[arg(long)]
        remove: bool,
    },
}

/// Library management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum LibraryCommand {
    /// Add a new library.
    Add {
        /// Library name.
        name: String,
        /// Path to library directory.
        #[arg(short, long)]
        path: PathBuf,
        /// Only users granted access may see the library.
        #[arg(long)]
        private: bool,
    },

    /// Remove a library.
    Del {
        /// Library name.
        name: String,
    },

    /// List all libraries.
    List,

    /// Scan libraries for new books.
    Scan {
        /// Specific library name (all libraries when omitted).
        name: Option<String>,
    },
}

/// Main configuration from TOML file.
///
/// Every section is optional; missing keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening address and public naming.
    pub server: ServerConfig,
    /// SQLite index location.
    pub database: DatabaseConfig,
    /// Basic authentication policy.
    pub auth: AuthConfig,
    /// Which libraries the feeds serve.
    pub catalog: CatalogConfig,
    /// Background rescans.
    pub scan: ScanConfig,
    /// Extracted cover storage.
    pub cache: CacheConfig,
    /// Libraries registered at startup.
    pub libraries: Vec<LibraryConfig>,
}

/// A library declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Unique library name.
    pub name: String,
    /// Root directory of the library.
    pub path: PathBuf,
    /// Visible to every user, not only those granted access.
    #[serde(default = "LibraryConfig::default_public")]
    pub public: bool,
}

impl LibraryConfig {
    fn default_public() -> bool {
        true
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: SocketAddr,
    /// Server name used as feed title. Empty falls back to "Jellyfin".
    pub name: String,
    /// Path prefix the catalog is mounted under, e.g. "/jellyfin".
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8096)),
            name: String::new(),
            base_url: String::new(),
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/catalog.db"),
        }
    }
}

/// `[auth]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Serve requests without valid credentials as anonymous.
    pub allow_anonymous: bool,
    /// Realm announced in the Basic challenge.
    pub realm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: false,
            realm: "OPDS".to_string(),
        }
    }
}

/// `[catalog]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Library names (or ids) in scope. Empty serves every library.
    pub libraries: Vec<String>,
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Rescan interval in seconds (0 to disable).
    pub interval_seconds: u64,
    /// Number of parallel workers for metadata extraction (1 = sequential).
    /// Keep low for NAS/network storage to avoid saturation.
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            workers: 1,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory where embedded covers are written.
    pub covers_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            covers_dir: PathBuf::from("data/covers"),
        }
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.realm.contains('"') {
            return Err(AppError::Config(
                "auth.realm must not contain double quotes".to_string(),
            ));
        }

        let base_url = &self.server.base_url;
        if base_url.contains("://")
            || base_url
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '?' | '#' | '{' | '}'))
        {
            return Err(AppError::Config(format!(
                "server.base_url must be a plain path: {}",
                base_url
            )));
        }

        let mut seen = HashSet::new();
        for lib in &self.libraries {
            if lib.name.trim().is_empty() {
                return Err(AppError::Config("Library name cannot be empty".to_string()));
            }
            if !seen.insert(lib.name.to_lowercase()) {
                return Err(AppError::Config(format!(
                    "Library declared twice: {}",
                    lib.name
                )));
            }
        }

        for wanted in &self.catalog.libraries {
            if !self.libraries.is_empty() && !seen.contains(&wanted.to_lowercase()) {
                tracing::warn!(library = %wanted, "catalog.libraries names a library not declared in this file");
            }
        }

        Ok(())
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("config.toml"),
            PathBuf::from("opds-catalog.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("opds-catalog").join("config.toml"));
        }
        candidates.push(PathBuf::from("/etc/opds-catalog/config.toml"));

        candidates.into_iter().find(|p| p.is_file())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# opds-catalog configuration

[server]
bind = "0.0.0.0:8096"
# Feed title; empty falls back to "Jellyfin"
name = ""
# Path prefix when served behind a reverse proxy, e.g. "/jellyfin"
base_url = ""

[database]
# path = "/var/lib/opds-catalog/catalog.db"

[auth]
# Serve requests without credentials as anonymous
allow_anonymous = false
realm = "OPDS"

[catalog]
# Library names served by the feeds (empty = all)
libraries = []

[scan]
# Rescan interval in seconds (0 to disable)
interval_seconds = 300
workers = 1

[cache]
# covers_dir = "/var/lib/opds-catalog/covers"

# Libraries to register at startup (optional - can also use CLI)
# [[libraries]]
# name = "Books"
# path = "/mnt/nas/Books"
# public = true
"#
        .to_string()
    }
}
