//! Turning API responses into tables and JSON for the terminal.
//!
//! Issues are flattened through [`Column`]: each column knows where its value
//! lives in the issue document, where it sorts, and how it prints.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Map, Value};
use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::api::types::{Attachment, Component};

/// Columns shown when neither `--columns` nor the config names any.
pub const DEFAULT_COLUMNS: &[&str] = &["key", "priority", "status", "assignee", "summary"];

/// An issue column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Key,
    Url,
    Priority,
    Status,
    Resolution,
    Reporter,
    Assignee,
    Created,
    Updated,
    Components,
    FixVersions,
    AffectsVersions,
    Summary,
    Description,
    /// Any other issue field, read from `fields.<name>`.
    Field(String),
}

impl Column {
    /// Every named column, in display order.
    pub const KNOWN: [Column; 15] = [
        Column::Id,
        Column::Key,
        Column::Priority,
        Column::Status,
        Column::Resolution,
        Column::Reporter,
        Column::Assignee,
        Column::Created,
        Column::Updated,
        Column::Components,
        Column::FixVersions,
        Column::AffectsVersions,
        Column::Summary,
        Column::Description,
        Column::Url,
    ];

    /// Parse a column name. Unknown names become [`Column::Field`].
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        Self::KNOWN
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| Column::Field(name.to_string()))
    }

    /// Parse a comma-separated column list, ignoring empty entries.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn name(&self) -> &str {
        match self {
            Column::Id => "id",
            Column::Key => "key",
            Column::Url => "url",
            Column::Priority => "priority",
            Column::Status => "status",
            Column::Resolution => "resolution",
            Column::Reporter => "reporter",
            Column::Assignee => "assignee",
            Column::Created => "created",
            Column::Updated => "updated",
            Column::Components => "components",
            Column::FixVersions => "fixversions",
            Column::AffectsVersions => "affectsversions",
            Column::Summary => "summary",
            Column::Description => "description",
            Column::Field(name) => name,
        }
    }

    /// Sort weight; smaller sorts first. `None` for free-form fields.
    pub fn weight(&self) -> Option<u32> {
        match self {
            Column::Id => Some(10100),
            Column::Key => Some(11000),
            Column::Priority => Some(20100),
            Column::Status => Some(20200),
            Column::Resolution => Some(20300),
            Column::Reporter => Some(21100),
            Column::Assignee => Some(21200),
            Column::Created => Some(22000),
            Column::Updated => Some(22100),
            Column::Components => Some(25100),
            Column::FixVersions => Some(25200),
            Column::AffectsVersions => Some(25300),
            Column::Summary => Some(30000),
            Column::Description => Some(30100),
            Column::Url => Some(80100),
            Column::Field(_) => None,
        }
    }

    /// Pull this column's raw value out of an issue document.
    pub fn extract(&self, issue: &Value) -> Value {
        let at = |pointer: &str| issue.pointer(pointer).cloned().unwrap_or(Value::Null);
        let names = |pointer: &str| match issue.pointer(pointer) {
            Some(Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .filter_map(|item| item.get("name").cloned())
                    .collect(),
            ),
            _ => Value::Null,
        };
        match self {
            Column::Id => at("/id"),
            Column::Key => at("/key"),
            Column::Url => at("/self"),
            Column::Priority => at("/fields/priority/name"),
            Column::Status => at("/fields/status/name"),
            Column::Resolution => match at("/fields/resolution/name") {
                Value::Null => Value::String("<none>".to_string()),
                name => name,
            },
            Column::Reporter => at("/fields/reporter/name"),
            Column::Assignee => at("/fields/assignee/name"),
            Column::Created => at("/fields/created"),
            Column::Updated => at("/fields/updated"),
            Column::Components => names("/fields/components"),
            Column::FixVersions => names("/fields/fixVersions"),
            Column::AffectsVersions => names("/fields/versions"),
            Column::Summary => at("/fields/summary"),
            Column::Description => at("/fields/description"),
            Column::Field(name) => issue
                .get("fields")
                .and_then(|fields| fields.get(name))
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    /// Render an extracted value as table text.
    pub fn render(&self, value: &Value) -> String {
        match (self, value) {
            (_, Value::Null) => String::new(),
            (Column::Components | Column::FixVersions | Column::AffectsVersions, Value::Array(items)) => {
                quoted_list(items)
            }
            (_, Value::String(s)) => strip_cr(s),
            (_, Value::Object(map)) => match map.get("name").or_else(|| map.get("value")) {
                Some(Value::String(s)) => strip_cr(s),
                _ => value.to_string(),
            },
            (_, other) => other.to_string(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PartialOrd for Column {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Known columns by weight, then free-form fields alphabetically.
impl Ord for Column {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.weight(), other.weight()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.name().cmp(other.name()),
        }
    }
}

/// `'a', 'b'` for a list of names; empty for an empty list.
fn quoted_list(items: &[Value]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let names: Vec<String> = items
        .iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect();
    format!("'{}'", names.join("', '"))
}

/// Carriage returns from pasted Windows text break table layout.
fn strip_cr(text: &str) -> String {
    text.replace('\r', "")
}

/// Deduplicate and order columns for display.
pub fn sort_columns(columns: &[Column]) -> Vec<Column> {
    let mut sorted = columns.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// The column set to show, from `--columns`, then the config, then the defaults.
pub fn choose_columns(flag: Option<&str>, configured: &[String]) -> Vec<Column> {
    let columns = match flag {
        Some(list) => Column::parse_list(list),
        None if !configured.is_empty() => configured.iter().map(|c| Column::parse(c)).collect(),
        None => DEFAULT_COLUMNS.iter().map(|c| Column::parse(c)).collect(),
    };
    sort_columns(&columns)
}

/// One issue as (column, text) pairs.
pub fn flatten(issue: &Value, columns: &[Column]) -> Vec<(Column, String)> {
    columns
        .iter()
        .map(|c| (c.clone(), c.render(&c.extract(issue))))
        .collect()
}

/// One issue as a JSON object of raw column values.
pub fn flatten_json(issue: &Value, columns: &[Column]) -> Value {
    let map: Map<String, Value> = columns
        .iter()
        .map(|c| (c.name().to_string(), c.extract(issue)))
        .collect();
    Value::Object(map)
}

/// A table with one row per issue.
pub fn issue_table(issues: &[Value], columns: &[Column]) -> String {
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.name().to_string()));
    for issue in issues {
        builder.push_record(flatten(issue, columns).into_iter().map(|(_, text)| text));
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    table.to_string()
}

/// A two-column table showing every known column of one issue.
pub fn issue_details(issue: &Value) -> String {
    let mut builder = Builder::default();
    for (column, text) in flatten(issue, &Column::KNOWN) {
        builder.push_record([column.name().to_string(), text]);
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    table.to_string()
}

#[derive(Tabled)]
struct CommentRow {
    #[tabled(rename = "Author")]
    author: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Comment")]
    body: String,
}

pub fn comments_table(comments: &[Value]) -> String {
    let text = |c: &Value, pointer: &str| {
        c.pointer(pointer)
            .and_then(Value::as_str)
            .map(strip_cr)
            .unwrap_or_default()
    };
    let rows = comments.iter().map(|c| CommentRow {
        author: text(c, "/author/displayName"),
        created: text(c, "/created"),
        body: text(c, "/body"),
    });
    Table::new(rows).with(Style::sharp()).to_string()
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Lead")]
    lead: String,
}

pub fn components_table(components: &[Component]) -> String {
    let rows = components.iter().map(|c| ComponentRow {
        id: c.id.clone(),
        name: c.name.clone(),
        description: c.description.as_deref().map(strip_cr).unwrap_or_default(),
        lead: c.lead.as_ref().map(|u| u.name.clone()).unwrap_or_default(),
    });
    Table::new(rows).with(Style::sharp()).to_string()
}

#[derive(Tabled)]
struct AttachmentRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Filename")]
    filename: String,
    #[tabled(rename = "Size")]
    size: u64,
}

pub fn attachments_table(attachments: &[Attachment]) -> String {
    let rows = attachments.iter().map(|a| AttachmentRow {
        id: a.id.clone(),
        filename: a.filename.clone(),
        size: a.size,
    });
    Table::new(rows).with(Style::sharp()).to_string()
}

/// Title and body of a Confluence page.
pub fn page_text(page: &Value) -> String {
    let title = page.get("title").and_then(Value::as_str).unwrap_or("");
    let body = page
        .pointer("/body/value")
        .and_then(Value::as_str)
        .map(strip_cr)
        .unwrap_or_default();
    format!("{}\n\n{}", title, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue() -> Value {
        json!({
            "id": "10001",
            "key": "ABC-1",
            "self": "https://jira.example.com/rest/api/2/issue/10001",
            "fields": {
                "summary": "Crash on\r\n start",
                "priority": {"name": "Major"},
                "status": {"name": "Open"},
                "resolution": null,
                "assignee": {"name": "jdoe"},
                "components": [{"name": "Backend"}, {"name": "UI"}],
                "fixVersions": [],
                "customfield_10010": {"value": "Team A"},
                "storyPoints": 3
            }
        })
    }

    #[test]
    fn test_parse_known_and_custom_columns() {
        assert_eq!(Column::parse("Key"), Column::Key);
        assert_eq!(Column::parse("fixVersions"), Column::FixVersions);
        assert_eq!(
            Column::parse("customfield_10010"),
            Column::Field("customfield_10010".to_string())
        );
        assert_eq!(
            Column::parse_list("key, summary,,status"),
            vec![Column::Key, Column::Summary, Column::Status]
        );
    }

    #[test]
    fn test_columns_sort_by_weight_then_name() {
        let sorted = sort_columns(&[
            Column::Summary,
            Column::Field("zeta".to_string()),
            Column::Url,
            Column::Key,
            Column::Field("alpha".to_string()),
            Column::Key,
        ]);
        assert_eq!(
            sorted,
            vec![
                Column::Key,
                Column::Summary,
                Column::Url,
                Column::Field("alpha".to_string()),
                Column::Field("zeta".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_values() {
        let issue = issue();
        let render = |c: Column| c.render(&c.extract(&issue));
        assert_eq!(render(Column::Components), "'Backend', 'UI'");
        assert_eq!(render(Column::FixVersions), "");
        assert_eq!(render(Column::AffectsVersions), "");
        assert_eq!(render(Column::Resolution), "<none>");
        assert_eq!(render(Column::Summary), "Crash on\n start");
        assert_eq!(render(Column::Description), "");
        assert_eq!(render(Column::Field("customfield_10010".to_string())), "Team A");
        assert_eq!(render(Column::Field("storyPoints".to_string())), "3");
    }

    #[test]
    fn test_choose_columns() {
        assert_eq!(
            choose_columns(Some("summary,key"), &[]),
            vec![Column::Key, Column::Summary]
        );
        assert_eq!(
            choose_columns(None, &["status".to_string()]),
            vec![Column::Status]
        );
        assert_eq!(choose_columns(None, &[]).len(), DEFAULT_COLUMNS.len());
    }

    #[test]
    fn test_flatten_json_keeps_raw_values() {
        let flat = flatten_json(&issue(), &[Column::Key, Column::Components]);
        assert_eq!(flat, json!({"key": "ABC-1", "components": ["Backend", "UI"]}));
    }

    #[test]
    fn test_issue_table_has_header_and_row() {
        let table = issue_table(&[issue()], &[Column::Key, Column::Status]);
        assert!(table.contains("key"));
        assert!(table.contains("ABC-1"));
        assert!(table.contains("Open"));
    }

    #[test]
    fn test_components_table() {
        let components: Vec<Component> = serde_json::from_value(json!([
            {"id": "10", "name": "Backend", "lead": {"name": "jdoe"}}
        ]))
        .unwrap();
        let table = components_table(&components);
        assert!(table.contains("Backend"));
        assert!(table.contains("jdoe"));
    }

    #[test]
    fn test_page_text() {
        let page = json!({"title": "Notes", "body": {"value": "<p>x</p>\r"}});
        assert_eq!(page_text(&page), "Notes\n\n<p>x</p>");
    }
}
