//! Name-to-id resolution for JIRA entities.
//!
//! Users type names ("crit", "ui", "1.2"); the API wants ids. Patterns are used
//! verbatim as case-insensitive regular expressions and matched against display
//! names. When several entities match, the one with the lowest id wins, so the
//! result does not depend on the order the server happened to return.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::error::Result;
use super::types::{IssueType, Named, Transition, User};

/// Sort key for entity ids: numeric ids compare as integers and sort before
/// non-numeric ids, which compare lexically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum IdKey<'a> {
    Numeric(u64),
    Text(&'a str),
}

impl<'a> IdKey<'a> {
    fn of(id: &'a str) -> Self {
        match id.parse::<u64>() {
            Ok(n) => IdKey::Numeric(n),
            Err(_) => IdKey::Text(id),
        }
    }
}

/// Compare two entity ids under the resolver's ordering.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    IdKey::of(a).cmp(&IdKey::of(b))
}

/// Compile a user pattern as a case-insensitive regex.
///
/// The pattern is not escaped; a malformed pattern is an error.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Entities ordered by ascending id.
fn sorted_by_id<T: Named>(entities: &[T]) -> Vec<&T> {
    let mut sorted: Vec<&T> = entities.iter().collect();
    sorted.sort_by(|a, b| compare_ids(a.id(), b.id()));
    sorted
}

/// Find the lowest-id entity whose name matches `pattern`.
///
/// Returns `Ok(None)` when nothing matches.
pub fn resolve<'a, T: Named>(entities: &'a [T], pattern: &str) -> Result<Option<&'a T>> {
    let regex = compile_pattern(pattern)?;
    Ok(resolve_with(entities, &regex))
}

/// [`resolve`] with an already compiled pattern.
pub fn resolve_with<'a, T: Named>(entities: &'a [T], regex: &Regex) -> Option<&'a T> {
    let found = sorted_by_id(entities)
        .into_iter()
        .find(|e| regex.is_match(e.name()));
    if let Some(entity) = found {
        debug!(id = entity.id(), name = entity.name(), pattern = %regex, "Matched entity");
    }
    found
}

/// Find the transition to perform for a requested target.
///
/// Transitions keep the server's order. Each transition is tried against its
/// action name and then its destination-state name; the first hit wins.
pub fn resolve_transition<'a>(
    transitions: &'a [Transition],
    pattern: &str,
) -> Result<Option<&'a Transition>> {
    let regex = compile_pattern(pattern)?;
    for transition in transitions {
        if regex.is_match(&transition.name) {
            debug!("Matched transition name {}", transition.name);
            return Ok(Some(transition));
        }
        if regex.is_match(&transition.to.name) {
            debug!(
                "Matched destination state {} of transition {}",
                transition.to.name, transition.name
            );
            return Ok(Some(transition));
        }
    }
    Ok(None)
}

/// How an issue type was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueTypeChoice<'a> {
    /// The pattern matched this type.
    Matched(&'a IssueType),
    /// No pattern was given, or it matched nothing; this is the lowest-id eligible type.
    Default(&'a IssueType),
}

impl<'a> IssueTypeChoice<'a> {
    pub fn issue_type(&self) -> &'a IssueType {
        match self {
            IssueTypeChoice::Matched(t) | IssueTypeChoice::Default(t) => t,
        }
    }
}

/// Pick an issue type.
///
/// Sub-task types are only eligible when the new issue has a parent. Among
/// eligible types the pattern is matched in ascending-id order; without a match
/// the lowest-id eligible type is offered as the default. `None` only when no
/// type is eligible at all.
pub fn select_issue_type<'a>(
    types: &'a [IssueType],
    pattern: Option<&str>,
    has_parent: bool,
) -> Result<Option<IssueTypeChoice<'a>>> {
    let eligible: Vec<&IssueType> = sorted_by_id(types)
        .into_iter()
        .filter(|t| has_parent || !t.subtask)
        .collect();

    if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
        let regex = compile_pattern(pattern)?;
        if let Some(found) = eligible.iter().copied().find(|t| regex.is_match(&t.name)) {
            return Ok(Some(IssueTypeChoice::Matched(found)));
        }
    }

    Ok(eligible.first().copied().map(IssueTypeChoice::Default))
}

/// Outcome of an assignable-user search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMatch<'a> {
    Unique(&'a User),
    NotFound,
    /// More than one candidate; carries their login names.
    Ambiguous(Vec<String>),
}

/// An assignee is only taken when the search returned exactly one candidate.
pub fn unique_user(candidates: &[User]) -> UserMatch<'_> {
    match candidates {
        [] => UserMatch::NotFound,
        [only] => UserMatch::Unique(only),
        many => UserMatch::Ambiguous(many.iter().map(|u| u.name.clone()).collect()),
    }
}
