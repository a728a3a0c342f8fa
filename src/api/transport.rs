//! HTTP transport shared by the JIRA and Confluence clients.
//!
//! Every JSON call goes through [`Transport::send_json`]: make sure the session is
//! authenticated, attach cookies (and basic auth when the server issued no session
//! cookie), send, keep any new cookies, and classify the response.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{header, Certificate, Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::error::{ApiError, Result};
use super::session::Session;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Applies to connecting and to the whole request.
    pub timeout: Duration,
    /// PEM bundle added to the trusted roots.
    pub ca_cert: Option<PathBuf>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ca_cert: None,
        }
    }
}

/// An HTTP client bound to one Atlassian base URL.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    /// Always ends with `/`, so relative paths join beneath it.
    base_url: Url,
}

impl Transport {
    pub fn new(base_url: &str, options: &TransportOptions) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;

        let mut builder = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .user_agent(concat!("atlas-cli/", env!("CARGO_PKG_VERSION")));
        if let Some(path) = &options.ca_cert {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
            debug!("Trusting CA certificate {}", path.display());
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the base URL. A leading `/` is ignored.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    /// Send a session check, bypassing [`Session::ensure_authenticated`].
    pub(crate) async fn probe(
        &self,
        url: &Url,
        cookies: Option<String>,
        basic: Option<&str>,
    ) -> Result<Response> {
        let mut request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(cookies) = cookies {
            request = request.header(header::COOKIE, cookies);
        }
        if let Some(basic) = basic {
            request = request.header(header::AUTHORIZATION, basic);
        }
        Ok(request.send().await?)
    }

    /// Send one JSON request and return the parsed body.
    #[instrument(skip(self, session, query, body), fields(method = %method, path = %path))]
    pub async fn send_json(
        &self,
        session: &mut Session,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        session.ensure_authenticated(self).await?;

        let url = self.url(path)?;
        let mut request = self
            .client
            .request(method, url.clone())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            debug!("Request body: {}", body);
            request = request.json(body);
        }
        let response = session.decorate(request, &url).send().await?;
        session.absorb(&response);

        handle_response(response).await
    }

    pub async fn get(&self, session: &mut Session, path: &str) -> Result<Value> {
        self.send_json(session, Method::GET, path, &[], None).await
    }

    pub async fn get_with_query(
        &self,
        session: &mut Session,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        self.send_json(session, Method::GET, path, query, None).await
    }

    /// GET and deserialize into `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, session: &mut Session, path: &str) -> Result<T> {
        let value = self.get(session, path).await?;
        from_value(value, path)
    }

    pub async fn post(&self, session: &mut Session, path: &str, body: &Value) -> Result<Value> {
        self.send_json(session, Method::POST, path, &[], Some(body))
            .await
    }

    pub async fn put(&self, session: &mut Session, path: &str, body: &Value) -> Result<Value> {
        self.send_json(session, Method::PUT, path, &[], Some(body))
            .await
    }

    pub async fn delete(&self, session: &mut Session, path: &str) -> Result<Value> {
        self.send_json(session, Method::DELETE, path, &[], None)
            .await
    }

    /// Upload a local file as multipart form data under the `file` part.
    #[instrument(skip(self, session), fields(path = %path))]
    pub async fn post_file(&self, session: &mut Session, path: &str, file: &Path) -> Result<Value> {
        session.ensure_authenticated(self).await?;

        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::illegal(format!("{} is not a file", file.display())))?;
        debug!("Uploading {} ({} bytes)", file_name, bytes.len());
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));

        let url = self.url(path)?;
        let request = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, "application/json")
            .header("X-Atlassian-Token", "nocheck")
            .multipart(form);
        let response = session.decorate(request, &url).send().await?;
        session.absorb(&response);

        handle_response(response).await
    }

    /// Download `url` (absolute, e.g. an attachment's content link) into `dest`.
    ///
    /// Returns the number of bytes written.
    #[instrument(skip(self, session), fields(url = %url))]
    pub async fn download(&self, session: &mut Session, url: &str, dest: &Path) -> Result<u64> {
        session.ensure_authenticated(self).await?;

        let url = Url::parse(url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", url, e)))?;
        let response = session
            .decorate(self.client.get(url.clone()), &url)
            .send()
            .await?;
        session.absorb(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, &body));
        }
        let mut response = response;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("Wrote {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

/// Classify a response: 2xx parses as JSON, anything else is a client or server error.
async fn handle_response(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        parse_success_body(&body)
    } else {
        debug!("Error response body: {}", body);
        Err(ApiError::from_response(status, &body))
    }
}

/// Percent-encode a user-supplied path segment (issue key, project key, id).
pub(crate) fn segment(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}

/// Parse a 2xx body. An empty body (e.g. 204) is an empty object.
pub(crate) fn parse_success_body(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Deserialize a response body into a typed value.
pub(crate) fn from_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("Unexpected response from {}: {}", what, e)))
}

/// Parse the base URL and make sure it ends with `/`.
fn normalize_base_url(url: &str) -> Result<Url> {
    let trimmed = url.trim().trim_end_matches('/');
    let parsed = Url::parse(&format!("{}/", trimmed))
        .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", url, e)))?;
    if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Auth;
    use crate::api::session::{CookieJar, Product};
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_base_url_adds_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://jira.example.com/jira").unwrap().as_str(),
            "https://jira.example.com/jira/"
        );
        assert_eq!(
            normalize_base_url("https://jira.example.com///").unwrap().as_str(),
            "https://jira.example.com/"
        );
    }

    #[test]
    fn test_normalize_base_url_rejects_garbage() {
        assert!(normalize_base_url("not a url").is_err());
        assert!(normalize_base_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_url_keeps_context_path() {
        let transport =
            Transport::new("https://example.com/jira", &TransportOptions::default()).unwrap();
        assert_eq!(
            transport.url("/rest/api/2/priority").unwrap().as_str(),
            "https://example.com/jira/rest/api/2/priority"
        );
    }

    #[test]
    fn test_parse_success_body() {
        assert_eq!(parse_success_body("").unwrap(), json!({}));
        assert_eq!(parse_success_body("  \n").unwrap(), json!({}));
        assert_eq!(parse_success_body(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(
            parse_success_body("<html>"),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    async fn authenticated(server: &MockServer) -> (Transport, Session) {
        Mock::given(method("GET"))
            .and(path("/rest/auth/1/session"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        let transport = Transport::new(&server.uri(), &TransportOptions::default()).unwrap();
        let session = Session::new(Product::Jira, Auth::anonymous(), CookieJar::in_memory());
        (transport, session)
    }

    #[tokio::test]
    async fn test_no_content_parses_to_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/2/issue/ABC-1"))
            .and(body_json(json!({"update": {}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let value = transport
            .put(&mut session, "rest/api/2/issue/ABC-1", &json!({"update": {}}))
            .await
            .unwrap();
        assert_eq!(value, json!({}));
    }

    #[tokio::test]
    async fn test_server_error_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/priority"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "x"})))
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let err = transport
            .get(&mut session, "rest/api/2/priority")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.content(), Some(&json!({"error": "x"})));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_error_with_html_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/api/2/issue/ABC-1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("<html>Forbidden</html>"))
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let err = transport
            .delete(&mut session, "rest/api/2/issue/ABC-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ClientError { status: 403, .. }));
        assert_eq!(
            err.content(),
            Some(&Value::String("<html>Forbidden</html>".to_string()))
        );
    }

    #[tokio::test]
    async fn test_json_headers_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = ABC"))
            .and(header_is("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": []})))
            .expect(1)
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let value = transport
            .get_with_query(
                &mut session,
                "rest/api/2/search",
                &[("jql", "project = ABC".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"issues": []}));
    }

    #[tokio::test]
    async fn test_post_file_sends_nocheck_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue/ABC-1/attachments"))
            .and(header_is("x-atlassian-token", "nocheck"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": "7", "filename": "notes.txt"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        let value = transport
            .post_file(&mut session, "rest/api/2/issue/ABC-1/attachments", &file)
            .await
            .unwrap();
        assert_eq!(value[0]["id"], "7");
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure/attachment/7/notes.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("notes.txt");
        let url = format!("{}/secure/attachment/7/notes.txt", server.uri());
        let written = transport.download(&mut session, &url, &dest).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_download_writes_large_body_in_full() {
        let body: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure/attachment/8/dump.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dump.bin");
        let url = format!("{}/secure/attachment/8/dump.bin", server.uri());
        let written = transport.download(&mut session, &url, &dest).await.unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_error_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure/attachment/9/gone.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let (transport, mut session) = authenticated(&server).await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("gone.txt");
        let url = format!("{}/secure/attachment/9/gone.txt", server.uri());
        let err = transport.download(&mut session, &url, &dest).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(!dest.exists());
    }
}
