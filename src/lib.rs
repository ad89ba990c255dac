//! opds-catalog: a read-only OPDS catalog server for ebook libraries.
//!
//! Books are indexed from library directories into SQLite and published
//! as OPDS 1.x Atom feeds that e-readers can browse, search and download
//! from.
//!
//! # Features
//!
//! - Alphabetical, genre, recently added and favorite book feeds
//! - OpenSearch description and search feed
//! - HTTP Basic authentication with optional anonymous access
//! - Per-user library visibility
//! - Incremental library scanning with EPUB and CBZ metadata extraction
//! - Cover and book file delivery

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Book format handlers.
pub mod formats;
/// Library index, items and scanning.
pub mod library;
/// Media types of book and image files.
pub mod media;
/// OPDS feed generation.
pub mod opds;
/// HTTP server.
pub mod server;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
