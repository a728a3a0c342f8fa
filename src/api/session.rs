//! Cookie-backed session handling.
//!
//! A [`Session`] owns the credentials, the authentication state and a persisted
//! [`CookieJar`]. Before the first real request it probes the product's session
//! endpoint with the stored cookies; only when those are rejected does it fall back
//! to a single basic-auth probe, after which the fresh session cookie is made
//! persistent so later invocations can skip basic auth entirely.
//!
//! Processes sharing one cookie file race on it: the last writer wins. Nothing
//! locks the file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{header, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::auth::Auth;
use super::error::{ApiError, Result};
use super::transport::Transport;

/// Name of the cookie carrying the server-side session.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Which Atlassian product a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Jira,
    Confluence,
}

impl Product {
    /// Path (relative to the base URL) answering 200 only for an authenticated caller.
    pub fn session_path(self) -> &'static str {
        match self {
            Product::Jira => "rest/auth/1/session",
            Product::Confluence => "rest/prototype/latest/session",
        }
    }
}

/// Where a session stands with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Not probed yet, or probed anonymously.
    Unknown,
    /// The server accepted our cookies or credentials. No further probes.
    Authenticated,
    /// The credentials were rejected. Calls fail fast until new credentials arrive.
    Failed,
}

/// One cookie as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Session cookies are dropped when the jar is saved.
    #[serde(default)]
    pub discard: bool,
    /// Expiry as unix seconds.
    #[serde(default)]
    pub expires: Option<u64>,
}

impl StoredCookie {
    fn is_expired(&self, now: u64) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }

    fn matches(&self, url: &Url, now: u64) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = host == self.domain || host.ends_with(&format!(".{}", self.domain));
        let path_ok = path_matches(url.path(), &self.path);
        let scheme_ok = !self.secure || url.scheme() == "https";
        domain_ok && path_ok && scheme_ok && !self.is_expired(now)
    }
}

/// RFC 6265 path-match: `/jira` covers `/jira` and `/jira/...`, not `/jiraX`.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Directory part of a request path, used when a cookie names no path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// A cookie jar persisted as JSON.
///
/// With no backing file the jar lives in memory only.
#[derive(Debug, Default)]
pub struct CookieJar {
    file: Option<PathBuf>,
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    /// An in-memory jar that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the jar from `path`, creating an empty file (mode 0600) if none exists.
    ///
    /// A file that does not parse is replaced on the next save.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Creating cookie file {}", path.display());
                write_private(&path, b"")?;
                String::new()
            }
            Err(e) => {
                return Err(ApiError::CookieJar(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let cookies = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable cookie file {}: {}", path.display(), e);
                Vec::new()
            })
        };
        debug!("Loaded {} cookies from {}", cookies.len(), path.display());

        Ok(Self {
            file: Some(path),
            cookies,
        })
    }

    /// The backing file, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    pub fn get(&self, name: &str) -> Option<&StoredCookie> {
        self.cookies.iter().rev().find(|c| c.name == name)
    }

    /// Insert a cookie, replacing one with the same name, domain and path.
    pub fn insert(&mut self, cookie: StoredCookie) {
        self.cookies.retain(|c| {
            !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        });
        self.cookies.push(cookie);
    }

    /// Remove every cookie called `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.cookies.len();
        self.cookies.retain(|c| c.name != name);
        before - self.cookies.len()
    }

    /// Store the cookies a response set.
    pub fn absorb(&mut self, response: &Response) {
        let url = response.url().clone();
        let now = SystemTime::now();
        for cookie in response.cookies() {
            let domain = cookie
                .domain()
                .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
                .or_else(|| url.host_str().map(str::to_ascii_lowercase))
                .unwrap_or_default();
            let expires = cookie
                .max_age()
                .map(|age| now + age)
                .or_else(|| cookie.expires())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs());
            debug!("Received cookie {} for {}", cookie.name(), domain);
            self.insert(StoredCookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain,
                path: cookie
                    .path()
                    .map(str::to_string)
                    .unwrap_or_else(|| default_path(&url)),
                secure: cookie.secure(),
                http_only: cookie.http_only(),
                discard: expires.is_none(),
                expires,
            });
        }
    }

    /// `Cookie` header value for a request to `url`, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let now = unix_now();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Make the newest cookie called `name` survive saves and apply site-wide.
    ///
    /// Older cookies with the same name and domain are dropped. Returns `false`
    /// when no such cookie exists.
    pub fn mark_persistent(&mut self, name: &str) -> bool {
        let Some(index) = self.cookies.iter().rposition(|c| c.name == name) else {
            return false;
        };
        let mut cookie = self.cookies.remove(index);
        cookie.discard = false;
        cookie.http_only = false;
        cookie.path = "/".to_string();
        self.cookies
            .retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
        self.cookies.push(cookie);
        true
    }

    /// Write the persistent, unexpired cookies back to the file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let now = unix_now();
        let keep: Vec<&StoredCookie> = self
            .cookies
            .iter()
            .filter(|c| !c.discard && !c.is_expired(now))
            .collect();
        let json = serde_json::to_vec_pretty(&keep)
            .map_err(|e| ApiError::CookieJar(e.to_string()))?;
        write_private(path, &json)?;
        debug!("Saved {} cookies to {}", keep.len(), path.display());
        Ok(())
    }
}

/// Write `bytes` to `path`, creating it readable by the owner only.
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let map_err = |e: std::io::Error| ApiError::CookieJar(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(map_err)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path).map_err(map_err)?;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(map_err)?;
        file.write_all(bytes).map_err(map_err)?;
    }
    #[cfg(not(unix))]
    {
        let mut file = options.open(path).map_err(map_err)?;
        file.write_all(bytes).map_err(map_err)?;
    }
    Ok(())
}

/// Authentication state for one client.
#[derive(Debug)]
pub struct Session {
    product: Product,
    auth: Auth,
    state: AuthState,
    jar: CookieJar,
    /// The server accepted basic auth but issued no session cookie.
    basic_fallback: bool,
    /// An anonymous probe was already answered; don't repeat it.
    anonymous_checked: bool,
}

impl Session {
    pub fn new(product: Product, auth: Auth, jar: CookieJar) -> Self {
        Self {
            product,
            auth,
            state: AuthState::Unknown,
            jar,
            basic_fallback: false,
            anonymous_checked: false,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Whether requests carry an `Authorization` header.
    pub fn uses_basic_auth(&self) -> bool {
        self.basic_fallback
    }

    /// Replace the credentials and start over from [`AuthState::Unknown`].
    pub fn set_credentials(&mut self, auth: Auth) {
        self.auth = auth;
        self.state = AuthState::Unknown;
        self.basic_fallback = false;
        self.anonymous_checked = false;
    }

    /// Make sure the server will accept our requests.
    ///
    /// Issues at most two probes: one with stored cookies and, if that is rejected
    /// and credentials are available, one with basic auth.
    #[instrument(skip_all, fields(product = ?self.product))]
    pub async fn ensure_authenticated(&mut self, transport: &Transport) -> Result<()> {
        match self.state {
            AuthState::Authenticated => return Ok(()),
            AuthState::Failed => {
                return Err(ApiError::AuthenticationFailed(format!(
                    "credentials for {} were rejected earlier",
                    self.auth.username()
                )))
            }
            AuthState::Unknown if self.anonymous_checked => return Ok(()),
            AuthState::Unknown => {}
        }

        let url = transport.url(self.product.session_path())?;
        debug!("Checking stored session at {}", url);
        let response = transport
            .probe(&url, self.jar.header_for(&url), None)
            .await?;
        self.jar.absorb(&response);
        if response.status() == StatusCode::OK {
            debug!("Stored cookies are valid");
            self.state = AuthState::Authenticated;
            self.jar.save()?;
            return Ok(());
        }

        let Some(basic) = self.auth.header_value() else {
            warn!(
                "Session check returned {}; continuing anonymously",
                response.status()
            );
            self.anonymous_checked = true;
            return Ok(());
        };

        debug!("Stored cookies rejected, authenticating as {}", self.auth.username());
        // Only a cookie set by the basic-auth response may be made persistent.
        if self.jar.remove(SESSION_COOKIE) > 0 {
            debug!("Dropped rejected {} cookie", SESSION_COOKIE);
        }
        let response = transport.probe(&url, None, Some(basic)).await?;
        let status = response.status();
        if status != StatusCode::OK {
            self.state = AuthState::Failed;
            return Err(ApiError::AuthenticationFailed(format!(
                "{} rejected credentials for {} ({})",
                url,
                self.auth.username(),
                status
            )));
        }

        self.jar.absorb(&response);
        if !self.jar.mark_persistent(SESSION_COOKIE) {
            debug!("No session cookie issued, keeping basic auth for this process");
            self.basic_fallback = true;
        }
        self.jar.save()?;
        self.state = AuthState::Authenticated;
        info!("Authenticated as {}", self.auth.username());
        Ok(())
    }

    /// Attach cookies and, when needed, basic auth to a request for `url`.
    pub(crate) fn decorate(&self, builder: RequestBuilder, url: &Url) -> RequestBuilder {
        let mut builder = builder;
        if let Some(cookies) = self.jar.header_for(url) {
            builder = builder.header(header::COOKIE, cookies);
        }
        if self.basic_fallback {
            if let Some(basic) = self.auth.header_value() {
                builder = builder.header(header::AUTHORIZATION, basic);
            }
        }
        builder
    }

    /// Keep cookies the server set on a regular response.
    pub(crate) fn absorb(&mut self, response: &Response) {
        self.jar.absorb(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::TransportOptions;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cookie(name: &str, domain: &str, path: &str) -> StoredCookie {
        StoredCookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: domain.to_string(),
            path: path.to_string(),
            secure: false,
            http_only: false,
            discard: false,
            expires: None,
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_header_matches_domain_and_path() {
        let mut jar = CookieJar::in_memory();
        jar.insert(cookie("a", "example.com", "/"));
        jar.insert(cookie("b", "example.com", "/jira"));
        jar.insert(cookie("c", "other.com", "/"));

        assert_eq!(
            jar.header_for(&url("https://jira.example.com/jira/rest")),
            Some("a=v; b=v".to_string())
        );
        assert_eq!(
            jar.header_for(&url("https://example.com/wiki")),
            Some("a=v".to_string())
        );
        assert_eq!(jar.header_for(&url("https://nowhere.org/")), None);
    }

    #[test]
    fn test_path_match_needs_segment_boundary() {
        assert!(path_matches("/jira", "/jira"));
        assert!(path_matches("/jira/rest/api", "/jira"));
        assert!(path_matches("/jira/rest", "/jira/"));
        assert!(path_matches("/anything", "/"));
        assert!(!path_matches("/jiraX/rest", "/jira"));
        assert!(!path_matches("/wiki", "/jira"));

        let mut jar = CookieJar::in_memory();
        jar.insert(cookie("b", "example.com", "/jira"));
        assert_eq!(jar.header_for(&url("https://example.com/jiraX/rest")), None);
    }

    #[test]
    fn test_remove_drops_every_cookie_with_the_name() {
        let mut jar = CookieJar::in_memory();
        jar.insert(cookie(SESSION_COOKIE, "example.com", "/"));
        jar.insert(cookie(SESSION_COOKIE, "example.com", "/jira"));
        jar.insert(cookie("other", "example.com", "/"));
        assert_eq!(jar.remove(SESSION_COOKIE), 2);
        assert!(jar.get(SESSION_COOKIE).is_none());
        assert_eq!(jar.remove(SESSION_COOKIE), 0);
        assert_eq!(jar.cookies().len(), 1);
    }

    #[test]
    fn test_secure_and_expired_cookies_are_skipped() {
        let mut jar = CookieJar::in_memory();
        let mut secure = cookie("s", "example.com", "/");
        secure.secure = true;
        let mut stale = cookie("old", "example.com", "/");
        stale.expires = Some(1);
        jar.insert(secure);
        jar.insert(stale);

        assert_eq!(jar.header_for(&url("http://example.com/")), None);
        assert_eq!(
            jar.header_for(&url("https://example.com/")),
            Some("s=v".to_string())
        );
    }

    #[test]
    fn test_mark_persistent_rewrites_newest_cookie() {
        let mut jar = CookieJar::in_memory();
        let mut old = cookie(SESSION_COOKIE, "example.com", "/jira");
        old.value = "old".to_string();
        let mut new = cookie(SESSION_COOKIE, "example.com", "/rest/auth/1");
        new.value = "new".to_string();
        new.discard = true;
        new.http_only = true;
        jar.insert(old);
        jar.insert(new);

        assert!(jar.mark_persistent(SESSION_COOKIE));
        assert_eq!(jar.cookies().len(), 1);
        let kept = jar.get(SESSION_COOKIE).unwrap();
        assert_eq!(kept.value, "new");
        assert_eq!(kept.path, "/");
        assert!(!kept.discard);
        assert!(!kept.http_only);

        assert!(!jar.mark_persistent("missing"));
    }

    #[test]
    fn test_load_creates_private_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cookies");
        let jar = CookieJar::load(&file).unwrap();
        assert!(jar.cookies().is_empty());
        assert!(file.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_save_keeps_only_persistent_cookies() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cookies");
        let mut jar = CookieJar::load(&file).unwrap();

        let mut transient = cookie("t", "example.com", "/");
        transient.discard = true;
        let mut expiring = cookie("e", "example.com", "/");
        expiring.expires = Some(unix_now() + 3600);
        jar.insert(cookie(SESSION_COOKIE, "example.com", "/"));
        jar.insert(transient);
        jar.insert(expiring);
        jar.save().unwrap();

        let reloaded = CookieJar::load(&file).unwrap();
        let names: Vec<&str> = reloaded.cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![SESSION_COOKIE, "e"]);
    }

    #[test]
    fn test_unreadable_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cookies");
        fs::write(&file, "#LWP-Cookies-2.0\n").unwrap();
        let jar = CookieJar::load(&file).unwrap();
        assert!(jar.cookies().is_empty());
    }

    #[test]
    fn test_in_memory_jar_never_writes() {
        let mut jar = CookieJar::in_memory();
        jar.insert(cookie("a", "example.com", "/"));
        assert!(jar.save().is_ok());
        assert!(jar.file().is_none());
    }

    #[test]
    fn test_default_path() {
        assert_eq!(default_path(&url("http://h/rest/auth/1/session")), "/rest/auth/1");
        assert_eq!(default_path(&url("http://h/session")), "/");
    }

    fn transport(server: &MockServer) -> Transport {
        Transport::new(&server.uri(), &TransportOptions::default()).unwrap()
    }

    fn seeded_jar(dir: &TempDir, value: &str) -> CookieJar {
        let file = dir.path().join("cookies");
        let mut jar = CookieJar::load(&file).unwrap();
        let mut c = cookie(SESSION_COOKIE, "127.0.0.1", "/");
        c.value = value.to_string();
        jar.insert(c);
        jar.save().unwrap();
        CookieJar::load(&file).unwrap()
    }

    #[tokio::test]
    async fn test_valid_cookie_needs_one_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .and(header_is("cookie", "JSESSIONID=good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "jdoe"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut session = Session::new(
            Product::Jira,
            Auth::new("jdoe", "secret"),
            seeded_jar(&dir, "good"),
        );
        let transport = transport(&server);

        session.ensure_authenticated(&transport).await.unwrap();
        session.ensure_authenticated(&transport).await.unwrap();
        assert_eq!(session.state(), AuthState::Authenticated);
        assert!(!session.uses_basic_auth());
    }

    #[tokio::test]
    async fn test_invalid_cookie_falls_back_to_basic_and_rewrites_jar() {
        let server = MockServer::start().await;
        let basic = Auth::new("jdoe", "secret").header_value().unwrap().to_string();
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .and(header_is("authorization", basic.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "JSESSIONID=fresh; Path=/jira; HttpOnly")
                    .set_body_json(json!({"name": "jdoe"})),
            )
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut session = Session::new(
            Product::Jira,
            Auth::new("jdoe", "secret"),
            seeded_jar(&dir, "stale"),
        );
        session
            .ensure_authenticated(&transport(&server))
            .await
            .unwrap();
        assert_eq!(session.state(), AuthState::Authenticated);

        let saved = CookieJar::load(dir.path().join("cookies")).unwrap();
        let stored = saved.get(SESSION_COOKIE).unwrap();
        assert_eq!(stored.value, "fresh");
        assert_eq!(stored.path, "/");
        assert!(!stored.discard);
        assert!(!stored.http_only);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_fast_afterwards() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let mut session = Session::new(
            Product::Jira,
            Auth::new("jdoe", "wrong"),
            CookieJar::in_memory(),
        );
        let transport = transport(&server);

        let err = session.ensure_authenticated(&transport).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationFailed(_)));
        assert_eq!(session.state(), AuthState::Failed);

        // no further requests while failed
        let err = session.ensure_authenticated(&transport).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_new_credentials_reset_failed_state() {
        let mut session = Session::new(
            Product::Jira,
            Auth::new("jdoe", "wrong"),
            CookieJar::in_memory(),
        );
        session.state = AuthState::Failed;
        session.set_credentials(Auth::new("jdoe", "right"));
        assert_eq!(session.state(), AuthState::Unknown);
    }

    #[tokio::test]
    async fn test_anonymous_session_continues_after_rejected_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/prototype/latest/session"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = Session::new(Product::Confluence, Auth::anonymous(), CookieJar::in_memory());
        let transport = transport(&server);
        session.ensure_authenticated(&transport).await.unwrap();
        session.ensure_authenticated(&transport).await.unwrap();
        assert_eq!(session.state(), AuthState::Unknown);
    }

    #[tokio::test]
    async fn test_basic_auth_kept_when_no_session_cookie_issued() {
        let server = MockServer::start().await;
        let basic = Auth::new("jdoe", "secret").header_value().unwrap().to_string();
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .and(header_is("authorization", basic.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut session = Session::new(
            Product::Jira,
            Auth::new("jdoe", "secret"),
            CookieJar::in_memory(),
        );
        session
            .ensure_authenticated(&transport(&server))
            .await
            .unwrap();
        assert!(session.uses_basic_auth());
    }
    #[tokio::test]
    async fn test_stale_cookie_does_not_hide_basic_fallback() {
        let server = MockServer::start().await;
        let basic = Auth::new("jdoe", "secret").header_value().unwrap().to_string();
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .and(header_is("authorization", basic.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/priority"))
            .and(header_is("authorization", basic.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/priority"))
            .respond_with(ResponseTemplate::new(401))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut session = Session::new(
            Product::Jira,
            Auth::new("jdoe", "secret"),
            seeded_jar(&dir, "stale"),
        );
        let transport = transport(&server);
        session.ensure_authenticated(&transport).await.unwrap();
        assert_eq!(session.state(), AuthState::Authenticated);
        assert!(session.uses_basic_auth());
        assert!(session.jar().get(SESSION_COOKIE).is_none());

        let priorities = transport.get(&mut session, "rest/api/2/priority").await.unwrap();
        assert_eq!(priorities, json!([]));

        let saved = CookieJar::load(dir.path().join("cookies")).unwrap();
        assert!(saved.get(SESSION_COOKIE).is_none());
    }
}
