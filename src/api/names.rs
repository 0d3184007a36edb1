//! Resource name formatting and parsing.
//!
//! Names follow the `projects/{project}/notes/{note}` and
//! `projects/{project}/occurrences/{occurrence}` patterns. Ids are single
//! non-empty path segments.

use thiserror::Error;

pub const PROJECTS: &str = "projects";
pub const NOTES: &str = "notes";
pub const OCCURRENCES: &str = "occurrences";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} name {name:?}, expected {pattern}")]
pub struct NameError {
    kind: &'static str,
    name: String,
    pattern: &'static str,
}

pub fn project(project_id: &str) -> String {
    format!("{PROJECTS}/{project_id}")
}

pub fn note(project_id: &str, note_id: &str) -> String {
    format!("{PROJECTS}/{project_id}/{NOTES}/{note_id}")
}

pub fn occurrence(project_id: &str, occurrence_id: &str) -> String {
    format!("{PROJECTS}/{project_id}/{OCCURRENCES}/{occurrence_id}")
}

/// `projects/{project}` → `project`.
pub fn parse_project(name: &str) -> Result<&str, NameError> {
    match segments(name).as_slice() {
        [PROJECTS, project_id] => Ok(*project_id),
        _ => Err(NameError {
            kind: "project",
            name: name.to_string(),
            pattern: "projects/{project}",
        }),
    }
}

/// `projects/{project}/notes/{note}` → `(project, note)`.
pub fn parse_note(name: &str) -> Result<(&str, &str), NameError> {
    match segments(name).as_slice() {
        [PROJECTS, project_id, NOTES, note_id] => Ok((*project_id, *note_id)),
        _ => Err(NameError {
            kind: "note",
            name: name.to_string(),
            pattern: "projects/{project}/notes/{note}",
        }),
    }
}

/// `projects/{project}/occurrences/{occurrence}` → `(project, occurrence)`.
pub fn parse_occurrence(name: &str) -> Result<(&str, &str), NameError> {
    match segments(name).as_slice() {
        [PROJECTS, project_id, OCCURRENCES, occurrence_id] => {
            Ok((*project_id, *occurrence_id))
        }
        _ => Err(NameError {
            kind: "occurrence",
            name: name.to_string(),
            pattern: "projects/{project}/occurrences/{occurrence}",
        }),
    }
}

/// Split into segments; any empty segment invalidates the whole name.
fn segments(name: &str) -> Vec<&str> {
    let parts: Vec<&str> = name.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Vec::new();
    }
    parts
}
