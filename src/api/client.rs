//! JIRA API client implementation.
//!
//! This module provides the main client for interacting with the JIRA REST API v2.
//! Every operation authenticates lazily through the [`Session`], fetches whatever
//! entity collections it needs to turn names into ids, and sends one request.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::auth::Auth;
use super::error::{ApiError, Result};
use super::resolver;
use super::session::{CookieJar, Product, Session};
use super::transport::{from_value, segment, Transport, TransportOptions};
use super::types::{
    Attachment, Component, CreateMeta, IssueLinkType, IssueLinkTypes, IssueRef, IssueType,
    Named, Priority, Resolution, Transitions, Version,
};
use super::update::{self, Catalogs, CreateRequest, EditRequest, TransitionRequest};

/// REST API prefix, relative to the base URL.
const API: &str = "rest/api/2";

/// Field selection for issue reads: everything except the (often huge) comment list.
const ISSUE_FIELDS: &str = "*all,-comment";

/// Candidates requested from the assignable-user search. Two is enough to tell
/// "unique" from "ambiguous".
const ASSIGNEE_CANDIDATES: &str = "2";

/// A request to link two issues.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub outward_key: String,
    pub inward_key: String,
    /// Pattern matched against link type names.
    pub link_type: String,
    pub comment: Option<String>,
}

/// The JIRA API client.
#[derive(Debug)]
pub struct JiraClient {
    transport: Transport,
    session: Session,
}

impl JiraClient {
    /// Create a client. No request is sent until the first operation.
    pub fn new(
        base_url: &str,
        auth: Auth,
        jar: CookieJar,
        options: &TransportOptions,
    ) -> Result<Self> {
        let transport = Transport::new(base_url, options)?;
        info!("JIRA client for {} as {:?}", transport.base_url(), auth);
        Ok(Self {
            transport,
            session: Session::new(Product::Jira, auth, jar),
        })
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url().as_str()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Replace the credentials, e.g. after the user typed a new password.
    pub fn set_credentials(&mut self, auth: Auth) {
        self.session.set_credentials(auth);
    }

    /// Run the session check now instead of on the first operation.
    pub async fn ensure_authenticated(&mut self) -> Result<()> {
        self.session.ensure_authenticated(&self.transport).await
    }

    async fn get(&mut self, path: &str) -> Result<Value> {
        self.transport.get(&mut self.session, path).await
    }

    async fn get_query(&mut self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.transport
            .get_with_query(&mut self.session, path, query)
            .await
    }

    async fn get_as<T: DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        self.transport.get_as(&mut self.session, path).await
    }

    async fn post(&mut self, path: &str, body: &Value) -> Result<Value> {
        self.transport.post(&mut self.session, path, body).await
    }

    async fn put(&mut self, path: &str, body: &Value) -> Result<Value> {
        self.transport.put(&mut self.session, path, body).await
    }

    async fn delete(&mut self, path: &str) -> Result<Value> {
        self.transport.delete(&mut self.session, path).await
    }

    /// Search for issues using JQL. Comments are not included.
    #[instrument(skip(self))]
    pub async fn search(&mut self, jql: &str) -> Result<Vec<Value>> {
        let result = self
            .get_query(
                &format!("{}/search", API),
                &[
                    ("jql", jql.to_string()),
                    ("fields", ISSUE_FIELDS.to_string()),
                ],
            )
            .await?;
        let issues = match result.get("issues") {
            Some(Value::Array(issues)) => issues.clone(),
            _ => Vec::new(),
        };
        let total = result.get("total").cloned().unwrap_or_default();
        debug!("Found {} issues (total: {})", issues.len(), total);
        Ok(issues)
    }

    /// Get a single issue by key ("ABC-1") or numeric id.
    #[instrument(skip(self))]
    pub async fn get_issue(&mut self, key_or_id: &str) -> Result<Value> {
        self.get_query(
            &format!("{}/issue/{}", API, segment(key_or_id)),
            &[("fields", ISSUE_FIELDS.to_string())],
        )
        .await
    }

    async fn issue_ref(&mut self, key_or_id: &str) -> Result<IssueRef> {
        let issue = self.get_issue(key_or_id).await?;
        IssueRef::from_issue(&issue).ok_or_else(|| {
            ApiError::InvalidResponse(format!("Issue {} has no key or project", key_or_id))
        })
    }

    #[instrument(skip(self))]
    pub async fn comments(&mut self, key: &str) -> Result<Vec<Value>> {
        let result = self
            .get(&format!("{}/issue/{}/comment", API, segment(key)))
            .await?;
        Ok(match result.get("comments") {
            Some(Value::Array(comments)) => comments.clone(),
            _ => Vec::new(),
        })
    }

    #[instrument(skip(self, body))]
    pub async fn add_comment(&mut self, key: &str, body: &str) -> Result<Value> {
        let comment = self
            .post(
                &format!("{}/issue/{}/comment", API, segment(key)),
                &json!({ "body": body }),
            )
            .await?;
        info!("Added comment to {}", key);
        Ok(comment)
    }

    /// Fetch an entity collection and pick the lowest-id entry matching `pattern`.
    pub async fn resolve_entity<T>(&mut self, path: &str, pattern: &str) -> Result<Option<T>>
    where
        T: Named + Clone + DeserializeOwned,
    {
        let entities: Vec<T> = self.get_as(path).await?;
        Ok(resolver::resolve(&entities, pattern)?.cloned())
    }

    /// Move an issue through its workflow.
    ///
    /// Returns the warnings for optional values that could not be resolved.
    #[instrument(skip(self, request), fields(target = %request.target))]
    pub async fn transition(&mut self, key: &str, request: &TransitionRequest) -> Result<Vec<String>> {
        let path = format!("{}/issue/{}/transitions", API, segment(key));
        let transitions: Transitions = self.get_as(&path).await?;
        let resolutions: Vec<Resolution> = if request.resolution.is_some() {
            self.get_as(&format!("{}/resolution", API)).await?
        } else {
            Vec::new()
        };

        let compiled =
            update::compile_transition(&transitions.transitions, request, &resolutions)?;
        self.post(&path, &compiled.update.payload.to_value()).await?;
        info!(
            "Transitioned {} via '{}' to '{}'",
            key, compiled.transition.name, compiled.transition.to.name
        );
        Ok(compiled.update.warnings)
    }

    /// Collect the entity lists an edit refers to, and nothing else.
    async fn catalogs_for_edit(&mut self, issue: &IssueRef, request: &EditRequest) -> Result<Catalogs> {
        let mut catalogs = Catalogs::default();
        if request.priority.is_some() {
            catalogs.priorities = self.priorities().await?;
        }
        if request.resolution.is_some() {
            catalogs.resolutions = self.get_as(&format!("{}/resolution", API)).await?;
        }
        if !request.components.is_empty() {
            catalogs.components = self.components(&issue.project_key).await?;
        }
        if !request.fix_versions.is_empty() || !request.affects_versions.is_empty() {
            catalogs.versions = self.versions(&issue.project_key).await?;
        }
        if request.issue_type.is_some() {
            catalogs.issue_types = self.creatable_issue_types(&issue.project_key).await?;
        }
        if let Some(query) = &request.assignee {
            catalogs.assignees = self
                .get_query(
                    &format!("{}/user/assignable/search", API),
                    &[
                        ("issueKey", issue.key.clone()),
                        ("maxResults", ASSIGNEE_CANDIDATES.to_string()),
                        ("username", query.clone()),
                    ],
                )
                .await
                .and_then(|v| from_value(v, "user/assignable/search"))?;
        }
        Ok(catalogs)
    }

    /// Edit an existing issue.
    ///
    /// Returns the warnings for values that could not be resolved and were skipped.
    #[instrument(skip(self, request))]
    pub async fn update(&mut self, key: &str, request: &EditRequest) -> Result<Vec<String>> {
        let issue = self.issue_ref(key).await?;
        let catalogs = self.catalogs_for_edit(&issue, request).await?;
        let compiled = update::compile_update(&issue, request, &catalogs)?;

        self.put(
            &format!("{}/issue/{}", API, segment(&issue.key)),
            &compiled.payload.to_value(),
        )
        .await?;
        info!("Updated issue {}", issue.key);
        Ok(compiled.warnings)
    }

    /// Create an issue. Returns the server's answer (`id`, `key`, `self`) and the
    /// warnings for skipped values.
    #[instrument(skip(self, request), fields(project = %request.project_key))]
    pub async fn create(&mut self, request: &CreateRequest) -> Result<(Value, Vec<String>)> {
        let project = &request.project_key;
        let mut catalogs = Catalogs {
            issue_types: self.creatable_issue_types(project).await?,
            ..Default::default()
        };
        if request.priority.is_some() {
            catalogs.priorities = self.priorities().await?;
        }
        if !request.components.is_empty() {
            catalogs.components = self.components(project).await?;
        }
        if !request.fix_versions.is_empty() {
            catalogs.versions = self.versions(project).await?;
        }
        if let Some(query) = &request.assignee {
            catalogs.assignees = self
                .get_query(
                    &format!("{}/user/assignable/search", API),
                    &[
                        ("project", project.clone()),
                        ("maxResults", ASSIGNEE_CANDIDATES.to_string()),
                        ("username", query.clone()),
                    ],
                )
                .await
                .and_then(|v| from_value(v, "user/assignable/search"))?;
        }

        let compiled = update::compile_create(request, &catalogs)?;
        let created = self
            .post(&format!("{}/issue", API), &compiled.payload.to_value())
            .await?;
        let key = created.get("key").and_then(Value::as_str).unwrap_or("?");
        info!("Created issue {}", key);
        Ok((created, compiled.warnings))
    }

    #[instrument(skip(self))]
    pub async fn delete_issue(&mut self, key: &str) -> Result<()> {
        self.delete(&format!("{}/issue/{}", API, segment(key))).await?;
        info!("Deleted issue {}", key);
        Ok(())
    }

    pub async fn priorities(&mut self) -> Result<Vec<Priority>> {
        self.get_as(&format!("{}/priority", API)).await
    }

    pub async fn components(&mut self, project: &str) -> Result<Vec<Component>> {
        self.get_as(&format!("{}/project/{}/components", API, segment(project)))
            .await
    }

    pub async fn versions(&mut self, project: &str) -> Result<Vec<Version>> {
        self.get_as(&format!("{}/project/{}/versions", API, segment(project)))
            .await
    }

    /// Issue types that can be created in `project`.
    pub async fn creatable_issue_types(&mut self, project: &str) -> Result<Vec<IssueType>> {
        let meta: CreateMeta = self
            .get_query(
                &format!("{}/issue/createmeta", API),
                &[("projectKeys", project.to_string())],
            )
            .await
            .and_then(|v| from_value(v, "issue/createmeta"))?;
        meta.projects
            .into_iter()
            .next()
            .map(|p| p.issuetypes)
            .ok_or_else(|| ApiError::illegal(format!("No projects found for key {}", project)))
    }

    /// Link two issues with the first link type (by id) matching the request.
    #[instrument(skip(self, request))]
    pub async fn link_issues(&mut self, request: &LinkRequest) -> Result<IssueLinkType> {
        let types: IssueLinkTypes = self.get_as(&format!("{}/issueLinkType", API)).await?;
        let link_type = resolver::resolve(&types.issue_link_types, &request.link_type)?
            .cloned()
            .ok_or_else(|| {
                ApiError::illegal(format!(
                    "No links found that match the regex {}",
                    request.link_type
                ))
            })?;

        let mut body = json!({
            "type": { "id": link_type.id },
            "inwardIssue": { "key": request.inward_key },
            "outwardIssue": { "key": request.outward_key },
        });
        if let Some(comment) = &request.comment {
            body["comment"] = json!({ "body": comment });
        }
        self.post(&format!("{}/issueLink", API), &body).await?;
        info!(
            "Linked {} {} {}",
            request.outward_key, link_type.outward, request.inward_key
        );
        Ok(link_type)
    }

    /// Remove the link of a matching type from `inward_key` to `outward_key`.
    #[instrument(skip(self, request))]
    pub async fn unlink_issues(&mut self, request: &LinkRequest) -> Result<()> {
        let regex = resolver::compile_pattern(&request.link_type)?;
        let issue = self.get_issue(&request.inward_key).await?;
        let links = issue
            .pointer("/fields/issuelinks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let found = links.iter().find(|link| {
            let type_name = link.pointer("/type/name").and_then(Value::as_str);
            let outward = link.pointer("/outwardIssue/key").and_then(Value::as_str);
            type_name.is_some_and(|n| regex.is_match(n))
                && outward == Some(request.outward_key.as_str())
        });
        let Some(id) = found.and_then(|l| l.get("id")).and_then(Value::as_str) else {
            return Err(ApiError::illegal(format!(
                "No links found that match the regex '{}' for issue {} to issue {}",
                request.link_type, request.outward_key, request.inward_key
            )));
        };

        debug!("Deleting issue link {}", id);
        self.delete(&format!("{}/issueLink/{}", API, segment(id))).await?;
        info!(
            "Removed link between {} and {}",
            request.outward_key, request.inward_key
        );
        Ok(())
    }

    /// Attachments listed on an issue.
    pub async fn attachments(&mut self, key_or_id: &str) -> Result<Vec<Attachment>> {
        let issue = self.get_issue(key_or_id).await?;
        match issue.pointer("/fields/attachment") {
            Some(list @ Value::Array(_)) => from_value(list.clone(), "issue attachments"),
            _ => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn attach_file(&mut self, key: &str, file: &Path) -> Result<Attachment> {
        let response = self
            .transport
            .post_file(
                &mut self.session,
                &format!("{}/issue/{}/attachments", API, segment(key)),
                file,
            )
            .await?;
        let attachment: Attachment = match response {
            Value::Array(mut items) if !items.is_empty() => {
                from_value(items.swap_remove(0), "attachment upload")?
            }
            other => {
                return Err(ApiError::InvalidResponse(format!(
                    "Unexpected attachment upload response: {}",
                    other
                )))
            }
        };
        info!(
            "Created attachment {} with id {} size {} mimetype {}",
            attachment.filename,
            attachment.id,
            attachment.size,
            attachment.mime_type.as_deref().unwrap_or("unknown")
        );
        Ok(attachment)
    }

    #[instrument(skip(self))]
    pub async fn delete_attachment(&mut self, id: &str) -> Result<()> {
        self.delete(&format!("{}/attachment/{}", API, segment(id))).await?;
        info!("Deleted attachment {}", id);
        Ok(())
    }

    /// Delete every attachment whose filename matches `pattern`. Returns what was deleted.
    #[instrument(skip(self))]
    pub async fn delete_attachments_matching(
        &mut self,
        key_or_id: &str,
        pattern: &str,
    ) -> Result<Vec<Attachment>> {
        let regex = resolver::compile_pattern(pattern)?;
        let matching: Vec<Attachment> = self
            .attachments(key_or_id)
            .await?
            .into_iter()
            .filter(|a| regex.is_match(&a.filename))
            .collect();
        if matching.is_empty() {
            warn!("No attachment of {} matches {}", key_or_id, pattern);
        }
        for attachment in &matching {
            self.delete_attachment(&attachment.id).await?;
        }
        Ok(matching)
    }

    /// Download an attachment by id, into `dest` or the file's own name in the
    /// current directory.
    #[instrument(skip(self))]
    pub async fn download_attachment(&mut self, id: &str, dest: Option<&Path>) -> Result<PathBuf> {
        let attachment: Attachment = self
            .get_as(&format!("{}/attachment/{}", API, segment(id)))
            .await?;
        self.fetch_attachment(&attachment, dest).await
    }

    /// Download the first attachment whose filename matches `pattern`.
    #[instrument(skip(self))]
    pub async fn download_attachment_matching(
        &mut self,
        key_or_id: &str,
        pattern: &str,
        dest: Option<&Path>,
    ) -> Result<PathBuf> {
        let regex = resolver::compile_pattern(pattern)?;
        let attachment = self
            .attachments(key_or_id)
            .await?
            .into_iter()
            .find(|a| regex.is_match(&a.filename))
            .ok_or_else(|| {
                ApiError::illegal(format!(
                    "No attachment found that match the filename '{}' for issue {}",
                    pattern, key_or_id
                ))
            })?;
        self.fetch_attachment(&attachment, dest).await
    }

    async fn fetch_attachment(&mut self, attachment: &Attachment, dest: Option<&Path>) -> Result<PathBuf> {
        let dest = match dest {
            Some(path) if path.is_dir() => path.join(&attachment.filename),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(&attachment.filename),
        };
        info!(
            "Downloading attachment {} ({}) to {}",
            attachment.id,
            attachment.filename,
            dest.display()
        );
        self.transport
            .download(&mut self.session, &attachment.content, &dest)
            .await?;
        Ok(dest)
    }
}
