//! Server profile configuration.

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};

/// A named JIRA (and optionally Confluence) server.
///
/// Passwords are never stored here; see `crate::credentials`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// The name of this profile.
    ///
    /// Must be non-empty and unique across all profiles.
    pub name: String,

    /// The JIRA base URL, including any context path (e.g. "https://example.com/jira").
    pub url: String,

    /// Login name. When absent the credential sources are asked without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// The Confluence base URL, if the `wiki` command is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki_url: Option<String>,
}

impl Profile {
    /// Create a new profile.
    pub fn new(name: String, url: String, username: Option<String>) -> Self {
        Self {
            name,
            url,
            username,
            wiki_url: None,
        }
    }

    /// Validate this profile.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` with details if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "profile name cannot be empty".to_string(),
            ));
        }

        if self.name.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "profile name '{}' cannot contain whitespace",
                self.name
            )));
        }

        check_url(&self.name, "URL", &self.url)?;
        if let Some(wiki) = &self.wiki_url {
            check_url(&self.name, "wiki URL", wiki)?;
        }

        if self.username.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': username cannot be empty; leave it out instead",
                self.name
            )));
        }

        Ok(())
    }
}

fn check_url(profile: &str, what: &str, url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "profile '{}': {} cannot be empty",
            profile, what
        )));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ConfigError::ValidationError(format!(
            "profile '{}': {} must start with http:// or https://",
            profile, what
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, url: &str) -> Profile {
        Profile::new(name.to_string(), url.to_string(), Some("jdoe".to_string()))
    }

    #[test]
    fn test_valid_profile() {
        assert!(profile("work", "https://jira.example.com/jira").validate().is_ok());
    }

    #[test]
    fn test_anonymous_profile_is_valid() {
        let p = Profile::new("public".to_string(), "http://localhost:2990/jira".to_string(), None);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = profile("", "https://jira.example.com").validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("name cannot be empty"));
    }

    #[test]
    fn test_whitespace_name_rejected() {
        let result = profile("my work", "https://jira.example.com").validate();
        assert!(result.unwrap_err().to_string().contains("whitespace"));
    }

    #[test]
    fn test_url_scheme_required() {
        let result = profile("work", "jira.example.com").validate();
        assert!(result.unwrap_err().to_string().contains("http://"));
    }

    #[test]
    fn test_wiki_url_checked() {
        let mut p = profile("work", "https://jira.example.com");
        p.wiki_url = Some("wiki.example.com".to_string());
        assert!(p.validate().unwrap_err().to_string().contains("wiki URL"));
    }

    #[test]
    fn test_empty_username_rejected() {
        let mut p = profile("work", "https://jira.example.com");
        p.username = Some(String::new());
        assert!(p.validate().is_err());
    }
}
