//! HTTP request handlers.

use crate::auth::Identity;
use crate::error::{AppError, Result};
use crate::opds::{DOCUMENT_CONTENT_TYPE, XmlDocument, to_xml};
use crate::server::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{StatusCode, header, request::Parts},
    response::Response,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tokio_util::io::ReaderStream;

/// Build a response, returning 500 on error (which shouldn't happen).
fn build_response(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal error"))
                .unwrap_or_default()
        })
}

/// Serialize a catalog document into a 200 response.
fn document_response<T: XmlDocument>(doc: &T) -> Result<Response<Body>> {
    let xml = to_xml(doc)?;
    Ok(build_response(StatusCode::OK, DOCUMENT_CONTENT_TYPE, xml))
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Identity of the caller, resolved from the Basic `Authorization` header.
///
/// Rejects the request with 401 when credentials are required and missing
/// or invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // A header that is not valid UTF-8 is treated like a missing one
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        // Password verification is CPU-bound and the store is synchronous
        let authenticator = state.authenticator.clone();
        let identity = tokio::task::spawn_blocking(move || {
            authenticator.authenticate(header.as_deref(), remote)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Authentication task failed: {}", e)))??;

        Ok(Caller(identity))
    }
}

// ============================================================================
// NAVIGATION FEEDS
// ============================================================================

/// Root navigation feed.
pub async fn root(State(state): State<AppState>, _caller: Caller) -> Result<Response<Body>> {
    document_response(&state.feeds.root_feed())
}

/// Alphabetical index.
pub async fn alphabetical(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Response<Body>> {
    document_response(&state.feeds.alphabetical_feed())
}

/// Books starting with one letter (`00` for all books).
pub async fn letter(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(shard): Path<String>,
) -> Result<Response<Body>> {
    document_response(&state.feeds.letter_feed(&identity, &shard)?)
}

/// Genre index.
pub async fn genres(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Response<Body>> {
    document_response(&state.feeds.genres_feed(&identity)?)
}

/// Books of one genre.
pub async fn genre(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(genre_id): Path<String>,
) -> Result<Response<Body>> {
    document_response(&state.feeds.genre_feed(&identity, &genre_id)?)
}

/// Recently added books.
pub async fn recently_added(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Response<Body>> {
    document_response(&state.feeds.recently_added_feed(&identity)?)
}

/// The caller's favorite books.
pub async fn favorites(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Response<Body>> {
    document_response(&state.feeds.favorites_feed(&identity)?)
}

// ============================================================================
// SEARCH
// ============================================================================

/// Search query parameters. Clients use any of the three names.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "searchTerms")]
    search_terms: Option<String>,
    q: Option<String>,
    query: Option<String>,
}

impl SearchParams {
    /// First non-empty term.
    fn term(&self) -> Option<&str> {
        [&self.search_terms, &self.q, &self.query]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .map(str::trim)
            .find(|t| !t.is_empty())
    }
}

/// Search with the term in the path.
pub async fn search_path(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(term): Path<String>,
) -> Result<Response<Body>> {
    let term = term.trim();
    if term.is_empty() {
        return Err(AppError::BadRequest("Missing search term".to_string()));
    }
    document_response(&state.feeds.search_feed(&identity, term)?)
}

/// Search with the term in the query string.
pub async fn search_query(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Query(params): Query<SearchParams>,
) -> Result<Response<Body>> {
    let term = params
        .term()
        .ok_or_else(|| AppError::BadRequest("Missing search term".to_string()))?;
    document_response(&state.feeds.search_feed(&identity, term)?)
}

/// OpenSearch description.
pub async fn opensearch(State(state): State<AppState>, _caller: Caller) -> Result<Response<Body>> {
    document_response(&state.feeds.search_description())
}

// ============================================================================
// FILES
// ============================================================================

/// Book cover image.
pub async fn cover(
    State(state): State<AppState>,
    _caller: Caller,
    Path(book_id): Path<String>,
) -> Result<Response<Body>> {
    let (path, content_type) = state.feeds.cover_file(&book_id)?;
    let data = tokio::fs::read(&path).await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from(data))
        .unwrap_or_else(|_| Response::default()))
}

/// Book download.
pub async fn download(
    State(state): State<AppState>,
    _caller: Caller,
    Path(book_id): Path<String>,
) -> Result<Response<Body>> {
    let (path, content_type, filename) = state.feeds.book_file(&book_id)?;

    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let content_disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        filename.replace('"', "'"),
        urlencoding::encode(&filename)
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CONTENT_LENGTH, length)
        .body(body)
        .unwrap_or_else(|_| Response::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Database, Library, now_timestamp};
    use crate::library::BookItem;
    use crate::opds::{Feed, OpenSearchDescription, Relation, from_xml};
    use axum::http::{HeaderValue, Request};
    use base64::{Engine, engine::general_purpose::STANDARD};
    use std::path::PathBuf;

    fn test_state(allow_anonymous: bool) -> AppState {
        let mut config = Config::default();
        config.auth.allow_anonymous = allow_anonymous;
        config.server.name = "Home".to_string();
        config.server.base_url = "/jf/".to_string();

        let db = Database::open_memory().unwrap();
        db.create_library(&Library {
            id: "lib-1".to_string(),
            name: "Books".to_string(),
            path: "/books".to_string(),
            is_public: true,
            created_at: now_timestamp(),
        })
        .unwrap();

        AppState::new_with_db(config, db)
    }

    fn add_book(state: &AppState, path: PathBuf, name: &str) -> BookItem {
        let mut book = BookItem::new(path, "lib-1");
        book.set_name(name);
        book.parent_name = Some("Author".to_string());
        state.db.save_book(&book, &[]).unwrap();
        book
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn caller(state: &AppState, authorization: Option<&str>) -> Result<Caller> {
        let mut request = Request::builder().uri("/opds");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        let (mut parts, _) = request.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn test_caller_requires_credentials() {
        let state = test_state(false);
        let err = caller(&state, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_caller_resolves_user() {
        let state = test_state(false);
        let user = crate::auth::UserService::new(state.db.clone())
            .create_user("alice", "secret:pw")
            .unwrap();

        let header = format!("Basic {}", STANDARD.encode("alice:secret:pw"));
        let Caller(identity) = caller(&state, Some(&header)).await.unwrap();
        assert_eq!(identity, Identity::User(user.id));

        let bad = format!("Basic {}", STANDARD.encode("alice:wrong"));
        assert!(caller(&state, Some(&bad)).await.is_err());
    }

    #[tokio::test]
    async fn test_caller_anonymous_when_allowed() {
        let state = test_state(true);
        let Caller(identity) = caller(&state, Some("Bearer token")).await.unwrap();
        assert_eq!(identity, Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_root_document() {
        let state = test_state(true);
        let response = root(State(state), Caller(Identity::Anonymous))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/atom+xml; charset=utf-8"
        );

        let feed: Feed = from_xml(&body_text(response).await).unwrap();
        assert_eq!(feed.title, "Home");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.link(&Relation::SelfLink).unwrap().href, "/jf/opds");
    }

    #[tokio::test]
    async fn test_letter_feed_lists_matching_books() {
        let state = test_state(true);
        add_book(&state, PathBuf::from("/books/Author/Dune.epub"), "Dune");
        add_book(&state, PathBuf::from("/books/Author/Emma.epub"), "Emma");

        let response = letter(
            State(state),
            Caller(Identity::Anonymous),
            Path("d".to_string()),
        )
        .await
        .unwrap();
        let feed: Feed = from_xml(&body_text(response).await).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].title, "Dune");
    }

    #[tokio::test]
    async fn test_search_query_requires_term() {
        let state = test_state(true);
        let params = SearchParams {
            q: Some("  ".to_string()),
            ..Default::default()
        };
        let err = search_query(State(state), Caller(Identity::Anonymous), Query(params))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_params_first_non_empty_wins() {
        let params = SearchParams {
            search_terms: Some(String::new()),
            q: Some("dune".to_string()),
            query: Some("emma".to_string()),
        };
        assert_eq!(params.term(), Some("dune"));
    }

    #[tokio::test]
    async fn test_search_path_finds_book() {
        let state = test_state(true);
        add_book(&state, PathBuf::from("/books/Author/Dune.epub"), "Dune");

        let response = search_path(
            State(state),
            Caller(Identity::Anonymous),
            Path("dun".to_string()),
        )
        .await
        .unwrap();
        let feed: Feed = from_xml(&body_text(response).await).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(
            feed.link(&Relation::SelfLink).unwrap().href,
            "/jf/opds/search/dun"
        );
    }

    #[tokio::test]
    async fn test_opensearch_document() {
        let state = test_state(true);
        let response = opensearch(State(state), Caller(Identity::Anonymous))
            .await
            .unwrap();
        let desc: OpenSearchDescription = from_xml(&body_text(response).await).unwrap();
        assert_eq!(desc.short_name.as_deref(), Some("Home"));
        assert_eq!(desc.urls[0].template, "/jf/opds/search/{searchTerms}");
    }

    #[tokio::test]
    async fn test_cover_and_download_missing_are_not_found() {
        let state = test_state(true);

        let err = cover(
            State(state.clone()),
            Caller(Identity::Anonymous),
            Path("nope".to_string()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        // Indexed, but without an image or with the file gone
        let book = add_book(&state, PathBuf::from("/books/gone/Missing.epub"), "Missing");
        let err = cover(
            State(state.clone()),
            Caller(Identity::Anonymous),
            Path(book.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = download(State(state), Caller(Identity::Anonymous), Path(book.id))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_streams_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dune.pdf");
        std::fs::write(&path, b"%PDF-1.4 dune").unwrap();

        let state = test_state(true);
        let book = add_book(&state, path, "Dune");

        let response = download(State(state), Caller(Identity::Anonymous), Path(book.id))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "13");
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .contains("Dune.pdf")
        );
        assert_eq!(body_text(response).await, "%PDF-1.4 dune");
    }
}
