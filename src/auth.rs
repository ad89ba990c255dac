//! Authentication module.

use crate::db::{Database, User, now_timestamp};
use crate::error::{AppError, Result};
use crate::library::CredentialStore;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::net::IpAddr;
use std::sync::Arc;

/// Who a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    /// No user; no library scoping applies.
    #[default]
    Anonymous,
    /// A resolved user id.
    User(String),
}

impl Identity {
    /// The user id, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User(id) => Some(id),
        }
    }

    /// Whether this is the anonymous sentinel.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

/// Username and password from a Basic `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Username.
    pub username: String,
    /// Password; may itself contain colons.
    pub password: String,
}

/// Parse a Basic `Authorization` header value.
///
/// Returns `None` for another scheme, a missing parameter, invalid base64,
/// non UTF-8 content or a payload without a colon.
pub fn parse_basic_credentials(header: &str) -> Option<BasicCredentials> {
    let (scheme, param) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let param = param.trim();
    if param.is_empty() {
        return None;
    }

    let decoded = STANDARD.decode(param).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Normalize a peer address: IPv4-mapped IPv6 becomes plain IPv4.
pub fn normalize_remote_ip(ip: IpAddr) -> IpAddr {
    ip.to_canonical()
}

/// Decides whether a request is served and on whose behalf.
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    allow_anonymous: bool,
    realm: String,
}

impl Authenticator {
    /// Create a new authenticator.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        allow_anonymous: bool,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            allow_anonymous,
            realm: realm.into(),
        }
    }

    /// Whether requests without valid credentials are served.
    pub fn allows_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    /// Resolve the raw `Authorization` header to an identity.
    ///
    /// Credential store failures propagate; they are not turned into
    /// anonymous access.
    pub fn authenticate(&self, header: Option<&str>, remote: IpAddr) -> Result<Identity> {
        let Some(credentials) = header.and_then(parse_basic_credentials) else {
            if header.is_some() {
                tracing::debug!("Malformed Authorization header");
            }
            return self.anonymous_or_fail();
        };

        let remote = normalize_remote_ip(remote);
        match self
            .credentials
            .authenticate(&credentials.username, &credentials.password, remote)?
        {
            Some(user_id) => Ok(Identity::User(user_id)),
            None => {
                tracing::info!(username = %credentials.username, remote = %remote, "Rejected credentials");
                self.anonymous_or_fail()
            }
        }
    }

    fn anonymous_or_fail(&self) -> Result<Identity> {
        if self.allow_anonymous {
            Ok(Identity::Anonymous)
        } else {
            Err(AppError::AuthenticationRequired(self.realm.clone()))
        }
    }
}

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// User administration for the command line.
pub struct UserService {
    db: Database,
}

impl UserService {
    /// Create a new user service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new user.
    pub fn create_user(&self, username: &str, password: &str) -> Result<User> {
        // Validate username
        if username.is_empty() || username.len() > 64 {
            return Err(AppError::InvalidInput(
                "Username must be 1-64 characters".to_string(),
            ));
        }

        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(AppError::InvalidInput(
                "Username can only contain letters, numbers, _, - and .".to_string(),
            ));
        }

        Self::validate_password(password)?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            created_at: now_timestamp(),
            last_login: None,
            last_login_ip: None,
        };

        self.db.create_user(&user)?;
        Ok(user)
    }

    /// Change user password.
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<bool> {
        Self::validate_password(new_password)?;
        let password_hash = hash_password(new_password)?;
        self.db.update_user_password(username, &password_hash)
    }

    /// Delete a user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        self.db.delete_user(username)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    /// Give a user access to a private library.
    pub fn grant_library(&self, username: &str, library: &str) -> Result<()> {
        let (user, library) = self.resolve(username, library)?;
        self.db.grant_library_access(&user.id, &library.id)
    }

    /// Take away a user's access to a private library.
    pub fn revoke_library(&self, username: &str, library: &str) -> Result<bool> {
        let (user, library) = self.resolve(username, library)?;
        self.db.revoke_library_access(&user.id, &library.id)
    }

    /// Mark or unmark a book as a favorite of a user.
    pub fn set_favorite(&self, username: &str, book_id: &str, favorite: bool) -> Result<()> {
        let user = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))?;
        self.db.set_favorite(&user.id, book_id, favorite)
    }

    fn resolve(&self, username: &str, library: &str) -> Result<(User, crate::db::Library)> {
        let user = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::NotFound(format!("User not found: {}", username)))?;
        let library = self
            .db
            .get_library_by_name(library)?
            .ok_or_else(|| AppError::NotFound(format!("Library not found: {}", library)))?;
        Ok((user, library))
    }

    fn validate_password(password: &str) -> Result<()> {
        if password.len() < 4 {
            return Err(AppError::InvalidInput(
                "Password must be at least 4 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn basic(payload: &str) -> String {
        format!("Basic {}", STANDARD.encode(payload))
    }

    /// Accepts exactly one username/password pair and records what it saw.
    struct FixedStore {
        seen: Mutex<Vec<(String, String, IpAddr)>>,
    }

    impl FixedStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl CredentialStore for FixedStore {
        fn authenticate(
            &self,
            username: &str,
            password: &str,
            remote: IpAddr,
        ) -> Result<Option<String>> {
            self.seen
                .lock()
                .push((username.to_string(), password.to_string(), remote));
            Ok((username == "alice" && password == "pa:ss:word").then(|| "user-1".to_string()))
        }
    }

    struct FailingStore;

    impl CredentialStore for FailingStore {
        fn authenticate(&self, _: &str, _: &str, _: IpAddr) -> Result<Option<String>> {
            Err(AppError::Internal("backend down".to_string()))
        }
    }

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_password_hash_and_verify() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_password_hashes_use_fresh_salts() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a).unwrap());
        assert!(verify_password("same", &b).unwrap());
    }

    #[test]
    fn test_parse_splits_at_first_colon() {
        let creds = parse_basic_credentials(&basic("alice:pa:ss:word")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "pa:ss:word");
    }

    #[test]
    fn test_parse_scheme_is_case_insensitive() {
        let header = format!("bAsIc {}", STANDARD.encode("bob:secret"));
        assert!(parse_basic_credentials(&header).is_some());
    }

    #[test]
    fn test_parse_rejects_malformed_headers() {
        assert!(parse_basic_credentials("Bearer abc").is_none());
        assert!(parse_basic_credentials("Basic").is_none());
        assert!(parse_basic_credentials("Basic    ").is_none());
        assert!(parse_basic_credentials("Basic !!!not-base64!!!").is_none());
        assert!(parse_basic_credentials(&basic("no-colon-here")).is_none());
        let invalid_utf8 = format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':', b'x']));
        assert!(parse_basic_credentials(&invalid_utf8).is_none());
    }

    #[test]
    fn test_empty_password_is_well_formed() {
        let creds = parse_basic_credentials(&basic("alice:")).unwrap();
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_missing_header_requires_auth_when_anonymous_disallowed() {
        let auth = Authenticator::new(FixedStore::new(), false, "Catalog");
        match auth.authenticate(None, LOCAL) {
            Err(AppError::AuthenticationRequired(realm)) => assert_eq!(realm, "Catalog"),
            other => panic!("expected AuthenticationRequired, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_header_is_anonymous_when_allowed() {
        let auth = Authenticator::new(FixedStore::new(), true, "Catalog");
        assert_eq!(auth.authenticate(None, LOCAL).unwrap(), Identity::Anonymous);
    }

    #[test]
    fn test_malformed_header_follows_anonymous_policy() {
        let strict = Authenticator::new(FixedStore::new(), false, "Catalog");
        assert!(strict.authenticate(Some("Digest abc"), LOCAL).is_err());

        let open = Authenticator::new(FixedStore::new(), true, "Catalog");
        assert_eq!(
            open.authenticate(Some("Digest abc"), LOCAL).unwrap(),
            Identity::Anonymous
        );
    }

    #[test]
    fn test_valid_credentials_resolve_user_with_colon_password() {
        let store = FixedStore::new();
        let auth = Authenticator::new(store.clone(), false, "Catalog");
        let identity = auth
            .authenticate(Some(&basic("alice:pa:ss:word")), LOCAL)
            .unwrap();
        assert_eq!(identity, Identity::User("user-1".to_string()));
        assert_eq!(store.seen.lock()[0].1, "pa:ss:word");
    }

    #[test]
    fn test_valid_credentials_used_even_when_anonymous_allowed() {
        let auth = Authenticator::new(FixedStore::new(), true, "Catalog");
        let identity = auth
            .authenticate(Some(&basic("alice:pa:ss:word")), LOCAL)
            .unwrap();
        assert_eq!(identity.user_id(), Some("user-1"));
    }

    #[test]
    fn test_rejected_credentials_follow_anonymous_policy() {
        let strict = Authenticator::new(FixedStore::new(), false, "Catalog");
        assert!(matches!(
            strict.authenticate(Some(&basic("alice:wrong")), LOCAL),
            Err(AppError::AuthenticationRequired(_))
        ));

        let open = Authenticator::new(FixedStore::new(), true, "Catalog");
        assert!(
            open.authenticate(Some(&basic("alice:wrong")), LOCAL)
                .unwrap()
                .is_anonymous()
        );
    }

    #[test]
    fn test_remote_address_is_normalized() {
        let store = FixedStore::new();
        let auth = Authenticator::new(store.clone(), false, "Catalog");
        let mapped = IpAddr::V6(Ipv4Addr::new(10, 0, 0, 7).to_ipv6_mapped());
        let _ = auth.authenticate(Some(&basic("alice:pa:ss:word")), mapped);
        assert_eq!(
            store.seen.lock()[0].2,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))
        );
        assert_eq!(
            normalize_remote_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        );
    }

    #[test]
    fn test_store_failure_propagates() {
        let auth = Authenticator::new(Arc::new(FailingStore), true, "Catalog");
        assert!(matches!(
            auth.authenticate(Some(&basic("alice:x")), LOCAL),
            Err(AppError::Internal(_))
        ));
    }
}
