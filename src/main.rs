//! opds-catalog server entry point.

use clap::Parser;
use opds_catalog::{
    auth::UserService,
    config::{Cli, Command, Config, LibraryCommand, UserCommand},
    db::{self, Database, Library},
    library::scanner::LibraryScanner,
    server,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::User { action }) => cmd_user(action, &config),
        Some(Command::Library { action }) => cmd_library(action, &config),
        Some(Command::Serve {
            bind,
            allow_anonymous,
        }) => cmd_serve(config, bind, allow_anonymous).await,
        None => cmd_serve(config, None, false).await,
    }
}

/// Open the configured database, creating its directory if needed.
fn open_database(config: &Config) -> anyhow::Result<Database> {
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(&config.database.path)?)
}

/// Initialize config and database.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    open_database(&config)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: opds-catalog library add <name> --path /path/to/books");
    println!("And: opds-catalog user add <username>");

    Ok(())
}

/// User management commands.
fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let users = UserService::new(open_database(config)?);

    match action {
        UserCommand::Add { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = users.create_user(&username, &password)?;
            println!("Created user: {} (id: {})", user.username, user.id);
        }

        UserCommand::Del { username } => {
            if users.delete_user(&username)? {
                println!("Deleted user: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::List => {
            let list = users.list_users()?;
            if list.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<20} {:<36} {:<18} LAST IP", "USERNAME", "ID", "LAST LOGIN");
                println!("{}", "-".repeat(90));
                for user in list {
                    let last_login = user
                        .last_login
                        .map(|ts| {
                            db::timestamp_to_datetime(ts)
                                .format("%Y-%m-%d %H:%M")
                                .to_string()
                        })
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<20} {:<36} {:<18} {}",
                        user.username,
                        user.id,
                        last_login,
                        user.last_login_ip.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        UserCommand::Passwd { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if users.change_password(&username, &password)? {
                println!("Password changed for: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::Grant { username, library } => {
            users.grant_library(&username, &library)?;
            println!("Granted {} access to library: {}", username, library);
        }

        UserCommand::Revoke { username, library } => {
            if users.revoke_library(&username, &library)? {
                println!("Revoked {} access to library: {}", username, library);
            } else {
                println!("{} had no access to library: {}", username, library);
            }
        }

        UserCommand::Favorite {
            username,
            book_id,
            remove,
        } => {
            users.set_favorite(&username, &book_id, !remove)?;
            if remove {
                println!("Removed {} from favorites of {}", book_id, username);
            } else {
                println!("Added {} to favorites of {}", book_id, username);
            }
        }
    }

    Ok(())
}

/// Library management commands.
fn cmd_library(action: LibraryCommand, config: &Config) -> anyhow::Result<()> {
    let db = open_database(config)?;

    match action {
        LibraryCommand::Add {
            name,
            path,
            private,
        } => {
            if !path.is_dir() {
                anyhow::bail!("Path is not a directory: {}", path.display());
            }

            let library = Library {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.clone(),
                path: path.to_string_lossy().to_string(),
                is_public: !private,
                created_at: db::now_timestamp(),
            };

            db.create_library(&library)?;
            println!(
                "Added library: {} -> {} (public: {})",
                name,
                path.display(),
                !private
            );
        }

        LibraryCommand::Del { name } => {
            if db.delete_library(&name)? {
                println!("Deleted library: {}", name);
            } else {
                println!("Library not found: {}", name);
            }
        }

        LibraryCommand::List => {
            let libraries = db.list_libraries()?;
            if libraries.is_empty() {
                println!("No libraries found.");
            } else {
                let counts = db.book_counts()?;
                println!("{:<20} {:<44} {:<7} BOOKS", "NAME", "PATH", "PUBLIC");
                println!("{}", "-".repeat(80));
                for lib in libraries {
                    println!(
                        "{:<20} {:<44} {:<7} {}",
                        lib.name,
                        lib.path,
                        if lib.is_public { "yes" } else { "no" },
                        counts.get(&lib.id).copied().unwrap_or(0)
                    );
                }
            }
        }

        LibraryCommand::Scan { name } => {
            let libraries = match name {
                Some(name) => match db.get_library_by_name(&name)? {
                    Some(lib) => vec![lib],
                    None => anyhow::bail!("Library not found: {}", name),
                },
                None => db.list_libraries()?,
            };

            if libraries.is_empty() {
                println!("No libraries to scan.");
                return Ok(());
            }

            let scanner = LibraryScanner::new(
                db.clone(),
                config.scan.workers,
                config.cache.covers_dir.clone(),
            );
            for lib in libraries {
                println!("Scanning library: {} ({})", lib.name, lib.path);
                let summary = scanner.scan_library(&lib)?;
                println!(
                    "  {} new, {} updated, {} unchanged, {} removed",
                    summary.new, summary.updated, summary.unchanged, summary.removed
                );
            }
            db.prune_genres()?;
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<SocketAddr>,
    allow_anonymous: bool,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if allow_anonymous {
        config.auth.allow_anonymous = true;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opds_catalog=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = open_database(&config)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        allow_anonymous = config.auth.allow_anonymous,
        "Starting opds-catalog server"
    );

    let state = server::AppState::new_with_db(config.clone(), db.clone());

    let added = state.register_configured_libraries()?;
    if added == 0 && db.list_libraries()?.is_empty() {
        tracing::warn!(
            "No libraries configured. Add one with: opds-catalog library add <name> --path /path/to/books"
        );
    }

    // The index already in the database is served while this runs
    state.start_background_scan();

    if config.scan.interval_seconds > 0 {
        let state_clone = state.clone();
        let interval = Duration::from_secs(config.scan.interval_seconds);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                if state_clone.scanner.is_scanning() {
                    tracing::debug!("Previous scan still running, skipping");
                    continue;
                }
                tracing::debug!("Running scheduled library rescan");

                let state = state_clone.clone();
                let result = tokio::task::spawn_blocking(move || state.scan_all_libraries()).await;
                match result {
                    Ok(Err(e)) => tracing::warn!(error = %e, "Scheduled rescan failed"),
                    Err(e) => tracing::warn!(error = %e, "Scheduled rescan panicked"),
                    Ok(Ok(_)) => {}
                }
            }
        });
    }

    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
