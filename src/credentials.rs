//! Where usernames and passwords come from.
//!
//! Sources are asked in order and the first hit wins: `~/.netrc`, the OS keyring,
//! then an interactive prompt (only on a terminal). A source that fails is logged
//! and skipped. When nothing answers the client runs anonymously.

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::api::Auth;

/// Keyring service name for stored passwords.
const KEYRING_SERVICE: &str = "atlas-cli";

/// Fallback `.netrc` machine name when the server host has no entry.
pub const NETRC_MACHINE: &str = "atlas-cli";

/// Errors raised by credential sources.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("could not read {path}: {source}")]
    Netrc {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("{0}")]
    NotInteractive(String),
}

pub type Result<T> = std::result::Result<T, CredentialsError>;

/// A username and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn into_auth(self) -> Auth {
        Auth::new(&self.username, &self.password)
    }
}

/// What the sources are asked about.
#[derive(Debug, Clone)]
pub struct CredentialQuery {
    /// Host name of the server.
    pub host: String,
    /// Profile name, the keyring account key.
    pub profile: String,
    /// Username from the profile or `--user`, if known.
    pub username: Option<String>,
}

/// One place credentials may be found.
pub trait CredentialSource {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this source has nothing for the query.
    fn lookup(&self, query: &CredentialQuery) -> Result<Option<Credentials>>;
}

/// Ask each source in turn. Falls back to anonymous credentials.
pub fn resolve(sources: &[Box<dyn CredentialSource>], query: &CredentialQuery) -> Auth {
    for source in sources {
        match source.lookup(query) {
            Ok(Some(credentials)) => {
                debug!(
                    "Using credentials for {} from {}",
                    credentials.username,
                    source.name()
                );
                return credentials.into_auth();
            }
            Ok(None) => debug!("No credentials in {}", source.name()),
            Err(e) => warn!("Skipping credential source {}: {}", source.name(), e),
        }
    }
    debug!("No credentials found, continuing anonymously");
    Auth::anonymous()
}

/// Sources that answer without asking the user: netrc, then the keyring.
pub fn stored_sources() -> Vec<Box<dyn CredentialSource>> {
    let mut sources: Vec<Box<dyn CredentialSource>> = Vec::new();
    if let Some(netrc) = NetrcSource::default_location() {
        sources.push(Box::new(netrc));
    }
    sources.push(Box::new(KeyringSource));
    sources
}

/// The terminal prompt, consulted only once the server has rejected the stored
/// session and credentials.
pub fn interactive_source() -> Box<dyn CredentialSource> {
    Box::new(PromptSource)
}

/// One `machine` (or `default`) block of a netrc file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetrcEntry {
    /// `None` for the `default` block.
    machine: Option<String>,
    login: String,
    password: String,
}

/// Parse netrc text. Tokens may span lines; `macdef` bodies are skipped.
fn parse_netrc(content: &str) -> Vec<NetrcEntry> {
    let mut entries = Vec::new();
    let mut current: Option<NetrcEntry> = None;
    let mut in_macro = false;

    for line in content.lines() {
        if in_macro {
            if line.trim().is_empty() {
                in_macro = false;
            }
            continue;
        }
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "machine" | "default" => {
                    entries.extend(current.take());
                    let machine = if token == "machine" {
                        tokens.next().map(str::to_string)
                    } else {
                        None
                    };
                    current = Some(NetrcEntry {
                        machine,
                        login: String::new(),
                        password: String::new(),
                    });
                }
                "login" => {
                    if let (Some(entry), Some(value)) = (current.as_mut(), tokens.next()) {
                        entry.login = value.to_string();
                    }
                }
                "password" => {
                    if let (Some(entry), Some(value)) = (current.as_mut(), tokens.next()) {
                        entry.password = value.to_string();
                    }
                }
                "account" => {
                    tokens.next();
                }
                "macdef" => {
                    in_macro = true;
                    break;
                }
                _ => {}
            }
        }
    }
    entries.extend(current);
    entries
}

/// Credentials from a netrc file.
#[derive(Debug, Clone)]
pub struct NetrcSource {
    path: PathBuf,
}

impl NetrcSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.netrc`, if the home directory is known.
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".netrc")))
    }
}

impl CredentialSource for NetrcSource {
    fn name(&self) -> &'static str {
        "netrc"
    }

    fn lookup(&self, query: &CredentialQuery) -> Result<Option<Credentials>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialsError::Netrc {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let entries = parse_netrc(&content);

        let by_machine = |name: &str| {
            entries
                .iter()
                .find(|e| e.machine.as_deref() == Some(name))
        };
        let found = by_machine(&query.host)
            .or_else(|| by_machine(NETRC_MACHINE))
            .or_else(|| entries.iter().find(|e| e.machine.is_none()))
            .filter(|e| !e.login.is_empty())
            .filter(|e| query.username.as_deref().map_or(true, |u| u == e.login));

        Ok(found.map(|e| Credentials {
            username: e.login.clone(),
            password: e.password.clone(),
        }))
    }
}

/// Passwords stored with `atlas login`, keyed by profile name.
#[derive(Debug, Clone, Copy)]
pub struct KeyringSource;

impl CredentialSource for KeyringSource {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn lookup(&self, query: &CredentialQuery) -> Result<Option<Credentials>> {
        let Some(username) = &query.username else {
            return Ok(None);
        };
        match get_password(&query.profile) {
            Ok(password) => Ok(Some(Credentials {
                username: username.clone(),
                password,
            })),
            Err(CredentialsError::Keyring(keyring::Error::NoEntry)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Ask on the terminal. Never used when stdin is not a terminal.
#[derive(Debug, Clone, Copy)]
pub struct PromptSource;

impl CredentialSource for PromptSource {
    fn name(&self) -> &'static str {
        "prompt"
    }

    fn lookup(&self, query: &CredentialQuery) -> Result<Option<Credentials>> {
        if !std::io::stdin().is_terminal() {
            return Ok(None);
        }
        let username = match &query.username {
            Some(username) => username.clone(),
            None => dialoguer::Input::<String>::new()
                .with_prompt(format!("Username for {} (empty for anonymous)", query.host))
                .allow_empty(true)
                .interact_text()?,
        };
        if username.is_empty() {
            return Ok(None);
        }
        let password = prompt_password(&format!("Password for {}@{}", username, query.host))?;
        Ok(Some(Credentials { username, password }))
    }
}

/// Read a password from the terminal without echo.
pub fn prompt_password(prompt: &str) -> Result<String> {
    if !std::io::stdin().is_terminal() {
        return Err(CredentialsError::NotInteractive(
            "a password can only be entered on a terminal".to_string(),
        ));
    }
    Ok(dialoguer::Password::new().with_prompt(prompt).interact()?)
}

/// Store a password in the OS keyring for a profile.
pub fn store_password(profile: &str, password: &str) -> Result<()> {
    keyring::Entry::new(KEYRING_SERVICE, profile)?.set_password(password)?;
    Ok(())
}

/// Retrieve a stored password.
pub fn get_password(profile: &str) -> Result<String> {
    Ok(keyring::Entry::new(KEYRING_SERVICE, profile)?.get_password()?)
}

/// Remove a stored password. Returns `false` when there was none.
pub fn delete_password(profile: &str) -> Result<bool> {
    match keyring::Entry::new(KEYRING_SERVICE, profile)?.delete_password() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn query(host: &str, username: Option<&str>) -> CredentialQuery {
        CredentialQuery {
            host: host.to_string(),
            profile: "work".to_string(),
            username: username.map(str::to_string),
        }
    }

    fn netrc(content: &str) -> (TempDir, NetrcSource) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".netrc");
        fs::write(&path, content).unwrap();
        (dir, NetrcSource::new(path))
    }

    #[test]
    fn test_parse_netrc_multiline_and_single_line() {
        let entries = parse_netrc(
            "machine jira.example.com\n  login jdoe\n  password s3cret\n\
             machine other.com login bob password pw account x\n\
             default login anon password none\n",
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].machine.as_deref(), Some("jira.example.com"));
        assert_eq!(entries[0].password, "s3cret");
        assert_eq!(entries[1].login, "bob");
        assert_eq!(entries[2].machine, None);
    }

    #[test]
    fn test_parse_netrc_skips_macros() {
        let entries = parse_netrc(
            "macdef init\nmachine fake login evil password evil\n\nmachine real login jdoe password pw\n",
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].machine.as_deref(), Some("real"));
    }

    #[test]
    fn test_netrc_prefers_host_then_fixed_machine() {
        let (_dir, source) = netrc(
            "machine atlas-cli login fallback password fb\n\
             machine jira.example.com login jdoe password pw\n",
        );
        let found = source.lookup(&query("jira.example.com", None)).unwrap().unwrap();
        assert_eq!(found.username, "jdoe");

        let found = source.lookup(&query("elsewhere.com", None)).unwrap().unwrap();
        assert_eq!(found.username, "fallback");
    }

    #[test]
    fn test_netrc_username_must_agree() {
        let (_dir, source) = netrc("machine jira.example.com login jdoe password pw\n");
        assert!(source
            .lookup(&query("jira.example.com", Some("someone")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_netrc_is_no_answer() {
        let dir = TempDir::new().unwrap();
        let source = NetrcSource::new(dir.path().join("absent"));
        assert!(source.lookup(&query("h", None)).unwrap().is_none());
    }

    struct Fixed(Option<Credentials>);

    impl CredentialSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn lookup(&self, _: &CredentialQuery) -> Result<Option<Credentials>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl CredentialSource for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn lookup(&self, _: &CredentialQuery) -> Result<Option<Credentials>> {
            Err(CredentialsError::NotInteractive("nope".to_string()))
        }
    }

    #[test]
    fn test_first_hit_wins_and_errors_are_skipped() {
        let sources: Vec<Box<dyn CredentialSource>> = vec![
            Box::new(Broken),
            Box::new(Fixed(None)),
            Box::new(Fixed(
                Some(Credentials {
                    username: "jdoe".to_string(),
                    password: "pw".to_string(),
                }))),
        ];
        let auth = resolve(&sources, &query("h", None));
        assert_eq!(auth.username(), "jdoe");
        assert!(!auth.is_anonymous());
    }

    #[test]
    fn test_nothing_found_is_anonymous() {
        let sources: Vec<Box<dyn CredentialSource>> = vec![Box::new(Fixed(None))];
        assert!(resolve(&sources, &query("h", None)).is_anonymous());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: "jdoe".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
