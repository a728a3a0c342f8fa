//! Application settings configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Name of the cookie file in the home directory.
const COOKIE_FILE_NAME: &str = ".atlas-cli-cookie";

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// The name of the default profile to use.
    pub default_profile: Option<String>,
    /// Connect and request timeout in seconds.
    pub timeout_secs: u64,
    /// Where the session cookies are kept. Defaults to `~/.atlas-cli-cookie`.
    pub cookie_file: Option<PathBuf>,
    /// Never read or write the cookie file.
    pub disable_cookies: bool,
    /// Extra PEM certificate to trust, for self-signed servers.
    pub cacert: Option<PathBuf>,
    /// Columns shown in issue tables when `--columns` is not given.
    pub columns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_profile: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cookie_file: None,
            disable_cookies: false,
            cacert: None,
            columns: Vec::new(),
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The cookie file to use, or `None` when cookies stay in memory.
    pub fn cookie_path(&self) -> Option<PathBuf> {
        if self.disable_cookies {
            return None;
        }
        self.cookie_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(COOKIE_FILE_NAME)))
    }
}
