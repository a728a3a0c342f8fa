//! API error types for the JIRA and Confluence clients.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to an Atlassian REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials were rejected by the session check.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server rejected the request (4xx). Retrying it verbatim will not help.
    #[error("HTTP client error ({status} {reason}): {}", summarize(.content))]
    ClientError {
        status: u16,
        /// Parsed JSON body, or the raw text as a JSON string.
        content: Value,
        reason: String,
    },

    /// The server failed to handle the request (5xx). May be transient.
    #[error("HTTP server error ({status} {reason}): {}", summarize(.content))]
    ServerError {
        status: u16,
        content: Value,
        reason: String,
    },

    /// Network or HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A successful response whose body could not be understood.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// A user-supplied pattern is not a valid regular expression.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The request references something that cannot be resolved or combined.
    #[error("{0}")]
    IllegalArgument(String),

    /// The cookie jar could not be read or written.
    #[error("Cookie jar error: {0}")]
    CookieJar(String),

    /// Local file errors (attachments).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Classify a non-success HTTP response.
    ///
    /// The body is kept as parsed JSON when possible and as the raw text otherwise,
    /// so an HTML error page from a proxy never causes a second parse failure.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let content = serde_json::from_str::<Value>(body)
            .unwrap_or_else(|_| Value::String(body.to_string()));
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let code = status.as_u16();

        if code >= 500 {
            ApiError::ServerError {
                status: code,
                content,
                reason,
            }
        } else {
            ApiError::ClientError {
                status: code,
                content,
                reason,
            }
        }
    }

    /// Shorthand for an illegal-argument error.
    pub fn illegal(msg: impl Into<String>) -> Self {
        ApiError::IllegalArgument(msg.into())
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ClientError { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The response body carried by this error, if any.
    pub fn content(&self) -> Option<&Value> {
        match self {
            ApiError::ClientError { content, .. } | ApiError::ServerError { content, .. } => {
                Some(content)
            }
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::ServerError { .. } | ApiError::Network(_))
    }
}

/// Summarize an error body for display.
///
/// JIRA returns `errorMessages` (a list) and `errors` (a field map); fall back to the
/// raw text or compact JSON.
fn summarize(content: &Value) -> String {
    if let Some(messages) = content.get("errorMessages").and_then(Value::as_array) {
        let joined: Vec<&str> = messages.iter().filter_map(Value::as_str).collect();
        if !joined.is_empty() {
            return joined.join(", ");
        }
    }
    if let Some(errors) = content.get("errors").and_then(Value::as_object) {
        if !errors.is_empty() {
            return errors
                .iter()
                .map(|(k, v)| match v.as_str() {
                    Some(s) => format!("{}: {}", k, s),
                    None => format!("{}: {}", k, v),
                })
                .collect::<Vec<_>>()
                .join(", ");
        }
    }
    match content {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
