//! JIRA API request and response types.
//!
//! Issues themselves are handled as `serde_json::Value`; the flat view of an issue
//! lives in `crate::output`. The typed structs here cover the named entities the
//! resolver works on.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Something the resolver can match by name.
pub trait Named {
    /// The opaque entity identifier.
    fn id(&self) -> &str;
    /// The display name patterns are matched against.
    fn name(&self) -> &str;
}

/// Accept an id sent either as a JSON string or a JSON number.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

macro_rules! impl_named {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Named for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
                fn name(&self) -> &str {
                    &self.name
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.name)
                }
            }
        )+
    };
}

/// Issue priority. Returned by `GET /rest/api/2/priority`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priority {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
}

/// Issue resolution. Returned by `GET /rest/api/2/resolution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A project component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// The component lead.
    #[serde(default)]
    pub lead: Option<User>,
}

/// A project version, used for both fix and affected versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub released: bool,
    #[serde(default)]
    pub archived: bool,
}

/// Issue type (Bug, Story, Sub-task, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueType {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    /// Whether this is a sub-task type.
    #[serde(default)]
    pub subtask: bool,
}

/// A kind of link between two issues ("Blocks", "Duplicate", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueLinkType {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub inward: String,
    #[serde(default)]
    pub outward: String,
}

/// Returned by `GET /rest/api/2/issueLinkType`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLinkTypes {
    #[serde(default)]
    pub issue_link_types: Vec<IssueLinkType>,
}

/// A workflow transition available on an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// The action name ("Resolve Issue", "Start Progress", ...).
    pub name: String,
    /// The destination state.
    pub to: TransitionTarget,
}

/// The state a transition leads to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionTarget {
    pub name: String,
}

/// Returned by `GET /rest/api/2/issue/{key}/transitions`.
#[derive(Debug, Clone, Deserialize)]
pub struct Transitions {
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl_named!(
    Priority,
    Resolution,
    Component,
    Version,
    IssueType,
    IssueLinkType,
    Transition
);

/// A JIRA user as returned by the assignable-user search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The login name, used to set the assignee.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: Option<String>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

/// Returned by `GET /rest/api/2/issue/createmeta?projectKeys=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeta {
    #[serde(default)]
    pub projects: Vec<CreateMetaProject>,
}

/// One project entry in the create metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMetaProject {
    pub key: String,
    #[serde(default)]
    pub issuetypes: Vec<IssueType>,
}

/// An issue attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Download URL of the attachment content.
    #[serde(default)]
    pub content: String,
}

/// The two facts about an existing issue the update compiler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub key: String,
    pub project_key: String,
}

impl IssueRef {
    /// Extract the issue key and its project key from an issue document.
    pub fn from_issue(issue: &Value) -> Option<Self> {
        let key = issue.get("key")?.as_str()?.to_string();
        let project_key = issue
            .pointer("/fields/project/key")
            .and_then(Value::as_str)?
            .to_string();
        Some(Self { key, project_key })
    }
}
