//! gRPC service implementations.
//!
//! [`GrafeasApi`] and [`ProjectsApi`] validate request shapes and resource
//! names, then delegate to the injected storage capability. Metadata
//! semantics beyond that live in the storage backend.

mod grafeas;
pub mod names;
mod projects;

pub use grafeas::GrafeasApi;
pub use projects::ProjectsApi;

use tonic::Status;

use crate::storage::StorageError;

impl From<names::NameError> for Status {
    fn from(err: names::NameError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// Require an optional request field.
fn required<T>(value: Option<T>, field: &str) -> Result<T, Status> {
    value.ok_or_else(|| Status::invalid_argument(format!("{field} is required")))
}

/// Reject note ids that cannot round-trip through a note resource name.
fn check_note_id(note_id: &str) -> Result<(), Status> {
    if note_id.is_empty() || note_id.contains('/') {
        return Err(Status::invalid_argument(format!(
            "invalid note_id {note_id:?}"
        )));
    }
    Ok(())
}

/// Fold per-item batch failures into one status.
fn batch_status(mut errors: Vec<StorageError>) -> Result<(), Status> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0).into()),
        n => {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Err(Status::aborted(format!("{n} items failed: {joined}")))
        }
    }
}
