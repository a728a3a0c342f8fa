//! Credential pair used for HTTP basic authentication.
//!
//! The pair may be anonymous (empty username), in which case no basic-auth
//! fallback is attempted and requests rely on stored cookies alone.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Authentication credentials for an Atlassian instance.
#[derive(Clone)]
pub struct Auth {
    /// The username (empty for anonymous access).
    username: String,
    /// The complete "Basic ..." header value, `None` when anonymous.
    auth_header: Option<String>,
}

impl Auth {
    /// Create credentials from a username and password.
    ///
    /// The password is immediately encoded and the raw value is not stored.
    /// An empty username yields anonymous credentials.
    pub fn new(username: &str, password: &str) -> Self {
        if username.is_empty() {
            return Self::anonymous();
        }
        Self {
            username: username.to_string(),
            auth_header: Some(build_auth_header(username, password)),
        }
    }

    /// Anonymous credentials: cookies only, never basic auth.
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            auth_header: None,
        }
    }

    /// Whether these credentials carry a username.
    pub fn is_anonymous(&self) -> bool {
        self.auth_header.is_none()
    }

    /// Get the authorization header value for HTTP requests.
    pub fn header_value(&self) -> Option<&str> {
        self.auth_header.as_deref()
    }

    /// Get the username.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("anonymous", &self.is_anonymous())
            .finish()
    }
}

/// Build the Basic Auth header value.
///
/// Encodes "username:password" in Base64 and prepends "Basic ".
fn build_auth_header(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    let encoded = BASE64.encode(credentials.as_bytes());
    format!("Basic {}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_auth_header() {
        let header = build_auth_header("jdoe", "hunter2");
        assert!(header.starts_with("Basic "));

        let encoded = header.strip_prefix("Basic ").unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        let decoded_str = String::from_utf8(decoded).unwrap();
        assert_eq!(decoded_str, "jdoe:hunter2");
    }

    #[test]
    fn test_auth_new() {
        let auth = Auth::new("jdoe", "secret");
        assert_eq!(auth.username(), "jdoe");
        assert!(!auth.is_anonymous());
        assert!(auth.header_value().unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_empty_username_is_anonymous() {
        let auth = Auth::new("", "");
        assert!(auth.is_anonymous());
        assert!(auth.header_value().is_none());
    }

    #[test]
    fn test_auth_does_not_expose_password() {
        let auth = Auth::new("jdoe", "secret_password");
        let debug_output = format!("{:?}", auth);

        assert!(!debug_output.contains("secret_password"));
        assert!(!debug_output.contains("Basic"));
    }
}
