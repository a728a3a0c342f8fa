//! Centralized error types for atlas-cli.
//!
//! Every layer has its own `thiserror` enum; [`AppError`] aggregates them at the
//! command level and decides what the user sees and which exit code the process
//! returns.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::credentials::CredentialsError;

/// The main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Credential lookup or storage errors.
    #[error("{0}")]
    Credentials(#[from] CredentialsError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad command-line input that clap could not catch.
    #[error("{0}")]
    Usage(String),

    /// Generic errors with a message.
    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn usage(msg: impl Into<String>) -> Self {
        AppError::Usage(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        AppError::Other(msg.into())
    }

    /// Get a user-friendly message for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::ParseError(_) => {
                    format!("Configuration file is invalid: {}", e)
                }
                ConfigError::ProfileNotFound(name) => {
                    format!("Profile '{}' not found.", name)
                }
                other => format!("Configuration error: {}", other),
            },
            AppError::Api(e) => match e {
                ApiError::AuthenticationFailed(_) => format!(
                    "{}. Check your username and password (netrc, keyring or 'atlas login').",
                    e
                ),
                ApiError::Network(_) => {
                    format!("Connection failed. Please check the server URL and your network: {}", e)
                }
                ApiError::ServerError { .. } => format!("{} (the server may recover; try again)", e),
                _ => e.to_string(),
            },
            AppError::Credentials(e) => format!("Credentials: {}", e),
            AppError::Io(e) => format!("A file operation failed: {}", e),
            AppError::Usage(msg) | AppError::Other(msg) => msg.clone(),
        }
    }

    /// Process exit code for this error.
    ///
    /// 2 for bad input, 3 for authentication, 4 for a request the server rejected,
    /// 5 for server or network trouble, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Usage(_)
            | AppError::Api(ApiError::IllegalArgument(_))
            | AppError::Api(ApiError::InvalidPattern(_)) => 2,
            AppError::Api(ApiError::AuthenticationFailed(_)) => 3,
            AppError::Api(ApiError::ClientError { .. }) => 4,
            AppError::Api(e) if e.is_transient() => 5,
            _ => 1,
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;
