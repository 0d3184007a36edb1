//! Storage capability consumed by the API services.
//!
//! The server core never constructs or interprets a backend: it receives an
//! `Arc<S>` where `S` implements both [`GrafeasStorage`] and
//! [`ProjectStorage`], and hands it to the RPC registrar. Backends can be
//! swapped (in-memory, relational, embedded) without touching the protocol
//! layer.

pub mod memory;

pub use memory::MemStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::server::proto::{Note, Occurrence, Project};

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Internal(String),
}

impl From<StorageError> for tonic::Status {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::NotFound(_) => tonic::Status::not_found(message),
            StorageError::AlreadyExists(_) => tonic::Status::already_exists(message),
            StorageError::InvalidArgument(_) => tonic::Status::invalid_argument(message),
            StorageError::Internal(_) => tonic::Status::internal(message),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One page of a listing plus the token for the next page (empty when done).
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: String,
}

/// Notes and occurrences.
///
/// Implementations must be thread-safe; every method may be called
/// concurrently from independent connections.
#[async_trait]
pub trait GrafeasStorage: Send + Sync {
    // =========================================================================
    // Occurrences
    // =========================================================================

    async fn get_occurrence(&self, project_id: &str, occurrence_id: &str)
    -> StorageResult<Occurrence>;

    async fn list_occurrences(
        &self,
        project_id: &str,
        filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Occurrence>>;

    /// Store a new occurrence; the backend assigns its name.
    async fn create_occurrence(
        &self,
        project_id: &str,
        occurrence: Occurrence,
    ) -> StorageResult<Occurrence>;

    /// Create each occurrence independently, returning the created ones and
    /// the errors for the rest.
    async fn batch_create_occurrences(
        &self,
        project_id: &str,
        occurrences: Vec<Occurrence>,
    ) -> (Vec<Occurrence>, Vec<StorageError>) {
        let mut created = Vec::with_capacity(occurrences.len());
        let mut errors = Vec::new();
        for occurrence in occurrences {
            match self.create_occurrence(project_id, occurrence).await {
                Ok(o) => created.push(o),
                Err(e) => errors.push(e),
            }
        }
        (created, errors)
    }

    async fn update_occurrence(
        &self,
        project_id: &str,
        occurrence_id: &str,
        occurrence: Occurrence,
    ) -> StorageResult<Occurrence>;

    async fn delete_occurrence(&self, project_id: &str, occurrence_id: &str) -> StorageResult<()>;

    /// The note an occurrence is attached to.
    async fn get_occurrence_note(&self, project_id: &str, occurrence_id: &str)
    -> StorageResult<Note>;

    // =========================================================================
    // Notes
    // =========================================================================

    async fn get_note(&self, project_id: &str, note_id: &str) -> StorageResult<Note>;

    async fn list_notes(
        &self,
        project_id: &str,
        filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Note>>;

    async fn create_note(&self, project_id: &str, note_id: &str, note: Note)
    -> StorageResult<Note>;

    /// Create each note independently, keyed by note id.
    async fn batch_create_notes(
        &self,
        project_id: &str,
        notes: HashMap<String, Note>,
    ) -> (Vec<Note>, Vec<StorageError>) {
        let mut created = Vec::with_capacity(notes.len());
        let mut errors = Vec::new();
        for (note_id, note) in notes {
            match self.create_note(project_id, &note_id, note).await {
                Ok(n) => created.push(n),
                Err(e) => errors.push(e),
            }
        }
        (created, errors)
    }

    async fn update_note(&self, project_id: &str, note_id: &str, note: Note)
    -> StorageResult<Note>;

    async fn delete_note(&self, project_id: &str, note_id: &str) -> StorageResult<()>;

    /// Occurrences referencing the given note.
    async fn list_note_occurrences(
        &self,
        project_id: &str,
        note_id: &str,
        filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Occurrence>>;
}

/// Projects owning notes and occurrences.
#[async_trait]
pub trait ProjectStorage: Send + Sync {
    async fn create_project(&self, project_id: &str) -> StorageResult<Project>;

    async fn get_project(&self, project_id: &str) -> StorageResult<Project>;

    async fn list_projects(
        &self,
        filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Project>>;

    async fn delete_project(&self, project_id: &str) -> StorageResult<()>;
}

/// Slice `items` (already in a stable order) into the page addressed by
/// `page_token`, an offset encoded as a decimal string.
pub(crate) fn paginate<T>(items: Vec<T>, page_size: i32, page_token: &str) -> StorageResult<Page<T>> {
    let start = if page_token.is_empty() {
        0
    } else {
        page_token
            .parse::<usize>()
            .map_err(|_| StorageError::InvalidArgument(format!("page token {page_token:?}")))?
    };
    let total = items.len();
    let end = match usize::try_from(page_size) {
        Ok(size) if size > 0 => start.saturating_add(size).min(total),
        _ => total,
    };
    let next_page_token = if end < total {
        end.to_string()
    } else {
        String::new()
    };
    let items = items.into_iter().skip(start).take(end.saturating_sub(start)).collect();
    Ok(Page {
        items,
        next_page_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_walks_all_pages() {
        let items: Vec<u32> = (0..5).collect();

        let first = paginate(items.clone(), 2, "").unwrap();
        assert_eq!(first.items, vec![0, 1]);
        assert_eq!(first.next_page_token, "2");

        let second = paginate(items.clone(), 2, &first.next_page_token).unwrap();
        assert_eq!(second.items, vec![2, 3]);

        let last = paginate(items, 2, &second.next_page_token).unwrap();
        assert_eq!(last.items, vec![4]);
        assert!(last.next_page_token.is_empty());
    }

    #[test]
    fn paginate_without_page_size_returns_everything() {
        let page = paginate(vec![1, 2, 3], 0, "").unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_page_token.is_empty());
    }

    #[test]
    fn paginate_rejects_bad_token() {
        let err = paginate(vec![1], 1, "abc").unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn storage_errors_map_to_status_codes() {
        let status: tonic::Status = StorageError::NotFound("projects/x".into()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);
        let status: tonic::Status = StorageError::AlreadyExists("projects/x".into()).into();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
        let status: tonic::Status = StorageError::Internal("boom".into()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
