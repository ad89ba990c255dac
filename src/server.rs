//! HTTP server and routes.

mod handlers;
mod state;

pub use handlers::Caller;
pub use state::AppState;

use axum::{
    Router,
    routing::{MethodRouter, get},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Register a handler under its lowercase path and its capitalized form.
fn route_both(
    router: Router<AppState>,
    lower: &str,
    capitalized: &str,
    handler: MethodRouter<AppState>,
) -> Router<AppState> {
    let router = router.route(lower, handler.clone());
    if lower == capitalized {
        router
    } else {
        router.route(capitalized, handler)
    }
}

/// Catalog routes, relative to the `/opds` prefix.
fn catalog_routes() -> Router<AppState> {
    let routes: [(&str, &str, MethodRouter<AppState>); 12] = [
        ("/", "/", get(handlers::root)),
        ("/books", "/Books", get(handlers::alphabetical)),
        (
            "/books/letter/{shard}",
            "/Books/Letter/{shard}",
            get(handlers::letter),
        ),
        (
            "/books/recentlyadded",
            "/Books/RecentlyAdded",
            get(handlers::recently_added),
        ),
        ("/books/favorite", "/Books/Favorite", get(handlers::favorites)),
        ("/genres", "/Genres", get(handlers::genres)),
        ("/genres/{genre_id}", "/Genres/{genre_id}", get(handlers::genre)),
        ("/search/{term}", "/Search/{term}", get(handlers::search_path)),
        ("/search", "/Search", get(handlers::search_query)),
        ("/osd", "/Osd", get(handlers::opensearch)),
        ("/cover/{book_id}", "/Cover/{book_id}", get(handlers::cover)),
        (
            "/download/{book_id}",
            "/Download/{book_id}",
            get(handlers::download),
        ),
    ];

    routes
        .into_iter()
        .fold(Router::new(), |router, (lower, capitalized, handler)| {
            route_both(router, lower, capitalized, handler)
        })
}

/// Create the application router.
///
/// The catalog is mounted under `{base_url}/opds`, matching the links the
/// feeds advertise.
pub fn create_router(state: AppState) -> Router {
    let prefix = format!("{}/opds", state.feeds.settings().base_url);

    Router::new()
        .nest(&prefix, catalog_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
