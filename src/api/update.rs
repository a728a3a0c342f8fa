//! Request bodies for issue edits, creation and transitions.
//!
//! Everything in here is pure: the client fetches the entity collections a request
//! needs into [`Catalogs`], and the compiler turns names into ids and ids into the
//! JSON body. Unresolved optional values become warnings; unresolved mandatory
//! values (transition target, issue type change) are errors.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::error::{ApiError, Result};
use super::resolver::{self, IssueTypeChoice, UserMatch};
use super::types::{
    Component, IssueRef, IssueType, Named, Priority, Resolution, Transition, User, Version,
};

/// One operation on one issue field.
///
/// Serializes as `{"set": ..}`, `{"add": ..}` or `{"remove": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldEdit {
    Set(Value),
    Add(Value),
    Remove(Value),
}

/// Direction of a multi-value token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Add,
    Remove,
}

impl EditOp {
    fn edit(self, value: Value) -> FieldEdit {
        match self {
            EditOp::Add => FieldEdit::Add(value),
            EditOp::Remove => FieldEdit::Remove(value),
        }
    }
}

/// Split a `+name` / `-name` / `name` token into its operation and bare name.
pub fn parse_token(token: &str) -> (EditOp, &str) {
    if let Some(rest) = token.strip_prefix('+') {
        (EditOp::Add, rest)
    } else if let Some(rest) = token.strip_prefix('-') {
        (EditOp::Remove, rest)
    } else {
        (EditOp::Add, token)
    }
}

/// Outbound JSON body for an edit, create or transition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub update: BTreeMap<String, Vec<FieldEdit>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl UpdatePayload {
    fn push(&mut self, field: &str, edit: FieldEdit) {
        self.update.entry(field.to_string()).or_default().push(edit);
    }

    fn add_comment(&mut self, body: &str) {
        self.push("comment", FieldEdit::Add(json!({ "body": body })));
    }

    /// The body as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// A compiled body plus the warnings produced while resolving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledUpdate {
    pub payload: UpdatePayload,
    pub warnings: Vec<String>,
}

impl CompiledUpdate {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Entity collections fetched for one operation. Only the collections the
/// request needs are filled in; the rest stay empty.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub priorities: Vec<Priority>,
    pub resolutions: Vec<Resolution>,
    pub components: Vec<Component>,
    pub versions: Vec<Version>,
    pub issue_types: Vec<IssueType>,
    /// Result of the assignable-user search for the requested assignee.
    pub assignees: Vec<User>,
}

/// Multi-valued issue fields edited with `+`/`-` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiField {
    Components,
    FixVersions,
    AffectsVersions,
}

impl MultiField {
    pub const ALL: [MultiField; 3] = [
        MultiField::Components,
        MultiField::FixVersions,
        MultiField::AffectsVersions,
    ];

    /// The field key the write API expects (case-sensitive).
    pub fn field_key(self) -> &'static str {
        match self {
            MultiField::Components => "components",
            MultiField::FixVersions => "fixVersions",
            MultiField::AffectsVersions => "versions",
        }
    }

    fn label(self) -> &'static str {
        match self {
            MultiField::Components => "component",
            MultiField::FixVersions => "fix version",
            MultiField::AffectsVersions => "affected version",
        }
    }

    fn tokens(self, request: &EditRequest) -> &[String] {
        match self {
            MultiField::Components => &request.components,
            MultiField::FixVersions => &request.fix_versions,
            MultiField::AffectsVersions => &request.affects_versions,
        }
    }

    fn is_managed(key: &str) -> bool {
        Self::ALL.iter().any(|f| f.field_key() == key)
    }
}

/// What a caller wants changed on an existing issue.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    /// Scalar fields replaced verbatim (`summary`, `description`, ...).
    pub fields: BTreeMap<String, Value>,
    /// Custom fields written under `fields` as given.
    pub custom_fields: BTreeMap<String, Value>,
    pub comment: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub components: Vec<String>,
    pub fix_versions: Vec<String>,
    pub affects_versions: Vec<String>,
    /// Issue type pattern; an empty pattern picks the default type.
    pub issue_type: Option<String>,
    pub parent: Option<String>,
    pub assignee: Option<String>,
}

impl EditRequest {
    /// Whether the request asks for no change at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.custom_fields.is_empty()
            && self.comment.is_none()
            && self.priority.is_none()
            && self.resolution.is_none()
            && self.components.is_empty()
            && self.fix_versions.is_empty()
            && self.affects_versions.is_empty()
            && self.issue_type.is_none()
            && self.parent.is_none()
            && self.assignee.is_none()
    }
}

/// Resolve each token against `entities` and emit add/remove edits.
///
/// Unresolved tokens are skipped with a warning; they never block their neighbours.
fn compile_tokens<T: Named>(
    out: &mut CompiledUpdate,
    field: MultiField,
    tokens: &[String],
    entities: &[T],
) -> Result<Vec<FieldEdit>> {
    let mut edits = Vec::new();
    for token in tokens {
        let (op, name) = parse_token(token);
        match resolver::resolve(entities, name)? {
            Some(entity) => {
                debug!(
                    "Matched {} {:?} => {} for regex {}",
                    field.label(),
                    op,
                    entity.name(),
                    name
                );
                edits.push(op.edit(json!({ "id": entity.id() })));
            }
            None => out.warn(format!(
                "Unable to find {} for {}, ignoring!",
                field.label(),
                name
            )),
        }
    }
    Ok(edits)
}

/// Resolve a single-valued named field ("priority", "resolution") to a `{"id"}`.
fn resolve_id<T: Named>(
    out: &mut CompiledUpdate,
    label: &str,
    entities: &[T],
    pattern: &str,
) -> Result<Option<Value>> {
    match resolver::resolve(entities, pattern)? {
        Some(entity) => Ok(Some(json!({ "id": entity.id() }))),
        None => {
            out.warn(format!("Unable to find {} for {}, ignoring!", label, pattern));
            Ok(None)
        }
    }
}

/// Apply the unique-assignee rule; `None` (with a warning) unless exactly one
/// candidate came back.
fn resolve_assignee(out: &mut CompiledUpdate, query: &str, candidates: &[User]) -> Option<Value> {
    match resolver::unique_user(candidates) {
        UserMatch::Unique(user) => Some(json!({ "name": user.name })),
        UserMatch::NotFound => {
            out.warn(format!(
                "Unable to find UNIQUE assignee for {}, ignoring (no candidates; check spelling?)",
                query
            ));
            None
        }
        UserMatch::Ambiguous(names) => {
            out.warn(format!(
                "Unable to find UNIQUE assignee for {}, ignoring (try a larger substring). Candidates: {}",
                query,
                names.join(", ")
            ));
            None
        }
    }
}

/// Build the body for `PUT /rest/api/2/issue/{key}`.
pub fn compile_update(
    issue: &IssueRef,
    request: &EditRequest,
    catalogs: &Catalogs,
) -> Result<CompiledUpdate> {
    if request.is_empty() {
        return Err(ApiError::illegal(format!(
            "Nothing to update for issue {}",
            issue.key
        )));
    }
    if let Some(key) = request.fields.keys().find(|k| MultiField::is_managed(k)) {
        return Err(ApiError::illegal(format!(
            "Field '{}' is multi-valued and cannot be set directly; use +name/-name tokens",
            key
        )));
    }
    if request.parent.is_some() && request.issue_type.is_none() {
        return Err(ApiError::illegal(
            "A parent can only be set together with an issue type change",
        ));
    }

    let mut out = CompiledUpdate::default();

    for (field, value) in &request.fields {
        out.payload.push(field, FieldEdit::Set(value.clone()));
    }
    for (field, value) in &request.custom_fields {
        out.payload.fields.insert(field.clone(), value.clone());
    }

    if let Some(comment) = &request.comment {
        out.payload.add_comment(comment);
    }

    if let Some(pattern) = &request.priority {
        if let Some(id) = resolve_id(&mut out, "priority", &catalogs.priorities, pattern)? {
            out.payload.push("priority", FieldEdit::Set(id));
        }
    }
    if let Some(pattern) = &request.resolution {
        if let Some(id) = resolve_id(&mut out, "resolution", &catalogs.resolutions, pattern)? {
            out.payload.push("resolution", FieldEdit::Set(id));
        }
    }

    for field in MultiField::ALL {
        let tokens = field.tokens(request);
        if tokens.is_empty() {
            continue;
        }
        let edits = match field {
            MultiField::Components => {
                compile_tokens(&mut out, field, tokens, &catalogs.components)?
            }
            MultiField::FixVersions | MultiField::AffectsVersions => {
                compile_tokens(&mut out, field, tokens, &catalogs.versions)?
            }
        };
        if !edits.is_empty() {
            out.payload.update.insert(field.field_key().to_string(), edits);
        }
    }

    if let Some(pattern) = &request.issue_type {
        let choice = resolver::select_issue_type(
            &catalogs.issue_types,
            Some(pattern),
            request.parent.is_some(),
        )?;
        let found = match choice {
            Some(IssueTypeChoice::Matched(t)) => t,
            Some(IssueTypeChoice::Default(t)) if pattern.is_empty() => t,
            _ => {
                return Err(ApiError::illegal(format!(
                    "Unable to find matching issue type for regex {}",
                    pattern
                )))
            }
        };
        debug!("Matched issue type {} with regex {}", found.name, pattern);
        out.payload
            .fields
            .insert("issuetype".to_string(), json!({ "id": found.id }));
        if let Some(parent) = &request.parent {
            debug!("Including parent key {}", parent);
            out.payload
                .fields
                .insert("parent".to_string(), json!({ "key": parent }));
        }
    }

    if let Some(query) = &request.assignee {
        if let Some(user) = resolve_assignee(&mut out, query, &catalogs.assignees) {
            out.payload.push("assignee", FieldEdit::Set(user));
        }
    }

    Ok(out)
}

/// What a caller wants in a new issue.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub project_key: String,
    /// Scalar fields (`summary`, `description`, ...).
    pub fields: BTreeMap<String, Value>,
    pub custom_fields: BTreeMap<String, Value>,
    pub issue_type: Option<String>,
    pub parent: Option<String>,
    pub priority: Option<String>,
    pub components: Vec<String>,
    pub fix_versions: Vec<String>,
    pub assignee: Option<String>,
}

/// Build the body for `POST /rest/api/2/issue`.
///
/// `catalogs.issue_types` must hold the project's creatable types. Multi-value
/// tokens may carry a prefix, but a new issue can only gain values, so `-` is
/// treated like `+`.
pub fn compile_create(request: &CreateRequest, catalogs: &Catalogs) -> Result<CompiledUpdate> {
    let mut out = CompiledUpdate::default();
    let fields = &mut out.payload.fields;

    for (field, value) in request.fields.iter().chain(&request.custom_fields) {
        fields.insert(field.clone(), value.clone());
    }
    fields.insert(
        "project".to_string(),
        json!({ "key": request.project_key }),
    );

    let choice = resolver::select_issue_type(
        &catalogs.issue_types,
        request.issue_type.as_deref(),
        request.parent.is_some(),
    )?
    .ok_or_else(|| {
        ApiError::illegal(format!(
            "No usable issue type for project {}",
            request.project_key
        ))
    })?;
    match choice {
        IssueTypeChoice::Matched(t) => {
            debug!("Matched issue type {} with regex {:?}", t.name, request.issue_type)
        }
        IssueTypeChoice::Default(t) => {
            debug!("Using default issue type {} regex {:?}", t.name, request.issue_type)
        }
    }
    let issue_type = choice.issue_type();
    out.payload
        .fields
        .insert("issuetype".to_string(), json!({ "id": issue_type.id }));
    if issue_type.subtask {
        out.payload
            .fields
            .insert("parent".to_string(), json!({ "key": request.parent }));
    }

    if let Some(pattern) = &request.priority {
        if let Some(id) = resolve_id(&mut out, "priority", &catalogs.priorities, pattern)? {
            out.payload.fields.insert("priority".to_string(), id);
        }
    }

    let components = create_list(
        &mut out,
        MultiField::Components,
        &request.components,
        &catalogs.components,
    )?;
    if !components.is_empty() {
        out.payload
            .fields
            .insert("components".to_string(), Value::Array(components));
    }
    let fix_versions = create_list(
        &mut out,
        MultiField::FixVersions,
        &request.fix_versions,
        &catalogs.versions,
    )?;
    if !fix_versions.is_empty() {
        out.payload
            .fields
            .insert("fixVersions".to_string(), Value::Array(fix_versions));
    }

    if let Some(query) = &request.assignee {
        if let Some(user) = resolve_assignee(&mut out, query, &catalogs.assignees) {
            out.payload.fields.insert("assignee".to_string(), user);
        }
    }

    Ok(out)
}

/// Plain `[{"id"}]` list for creation; prefixes are stripped and ignored.
fn create_list<T: Named>(
    out: &mut CompiledUpdate,
    field: MultiField,
    tokens: &[String],
    entities: &[T],
) -> Result<Vec<Value>> {
    Ok(compile_tokens(out, field, tokens, entities)?
        .into_iter()
        .map(|edit| match edit {
            FieldEdit::Set(v) | FieldEdit::Add(v) | FieldEdit::Remove(v) => v,
        })
        .collect())
}

/// What a caller wants from a workflow transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    /// Pattern matched against transition names and destination states.
    pub target: String,
    pub comment: Option<String>,
    /// Resolution to set, for workflows that require one on close.
    pub resolution: Option<String>,
}

/// A compiled transition and the transition it will perform.
#[derive(Debug, Clone)]
pub struct CompiledTransition<'a> {
    pub update: CompiledUpdate,
    pub transition: &'a Transition,
}

/// Build the body for `POST /rest/api/2/issue/{key}/transitions`.
pub fn compile_transition<'a>(
    transitions: &'a [Transition],
    request: &TransitionRequest,
    resolutions: &[Resolution],
) -> Result<CompiledTransition<'a>> {
    let transition = resolver::resolve_transition(transitions, &request.target)?.ok_or_else(
        || {
            ApiError::illegal(format!(
                "Unable to find matching state transition for new state {}",
                request.target
            ))
        },
    )?;

    let mut out = CompiledUpdate::default();
    out.payload.transition = Some(json!({ "id": transition.id }));

    if let Some(comment) = &request.comment {
        out.payload.add_comment(comment);
    }
    if let Some(pattern) = &request.resolution {
        if let Some(id) = resolve_id(&mut out, "resolution", resolutions, pattern)? {
            out.payload.fields.insert("resolution".to_string(), id);
        }
    }

    Ok(CompiledTransition {
        update: out,
        transition,
    })
}
