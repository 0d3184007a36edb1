//! In-memory storage backend
//!
//! Default storage implementation using in-memory maps keyed by resource
//! name. Suitable for development and tests. Data is lost on restart.
//! Filters are accepted but not evaluated.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{GrafeasStorage, Page, ProjectStorage, StorageError, StorageResult, paginate};
use crate::api::names;
use crate::server::proto::{Note, Occurrence, Project};

/// In-memory store implementing every storage capability.
#[derive(Debug, Default)]
pub struct MemStore {
    projects: RwLock<BTreeMap<String, Project>>,
    notes: RwLock<BTreeMap<String, Note>>,
    occurrences: RwLock<BTreeMap<String, Occurrence>>,
}

impl MemStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

/// Items of `map` whose key lives under `prefix`, in name order.
fn under_prefix<T: Clone>(map: &BTreeMap<String, T>, prefix: &str) -> Vec<T> {
    map.range(prefix.to_string()..)
        .take_while(|(name, _)| name.starts_with(prefix))
        .map(|(_, item)| item.clone())
        .collect()
}

#[async_trait]
impl GrafeasStorage for MemStore {
    // =========================================================================
    // Occurrences
    // =========================================================================

    async fn get_occurrence(
        &self,
        project_id: &str,
        occurrence_id: &str,
    ) -> StorageResult<Occurrence> {
        let name = names::occurrence(project_id, occurrence_id);
        let occurrences = self.occurrences.read().await;
        occurrences
            .get(&name)
            .cloned()
            .ok_or(StorageError::NotFound(name))
    }

    async fn list_occurrences(
        &self,
        project_id: &str,
        _filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Occurrence>> {
        let prefix = names::occurrence(project_id, "");
        let items = under_prefix(&*self.occurrences.read().await, &prefix);
        paginate(items, page_size, page_token)
    }

    async fn create_occurrence(
        &self,
        project_id: &str,
        mut occurrence: Occurrence,
    ) -> StorageResult<Occurrence> {
        let name = names::occurrence(project_id, &Uuid::new_v4().to_string());
        occurrence.name = name.clone();

        let mut occurrences = self.occurrences.write().await;
        if occurrences.contains_key(&name) {
            return Err(StorageError::AlreadyExists(name));
        }
        debug!(%name, note = %occurrence.note_name, "creating occurrence");
        occurrences.insert(name, occurrence.clone());
        Ok(occurrence)
    }

    async fn update_occurrence(
        &self,
        project_id: &str,
        occurrence_id: &str,
        mut occurrence: Occurrence,
    ) -> StorageResult<Occurrence> {
        let name = names::occurrence(project_id, occurrence_id);
        let mut occurrences = self.occurrences.write().await;
        let Some(existing) = occurrences.get_mut(&name) else {
            return Err(StorageError::NotFound(name));
        };
        occurrence.name = name;
        *existing = occurrence.clone();
        Ok(occurrence)
    }

    async fn delete_occurrence(&self, project_id: &str, occurrence_id: &str) -> StorageResult<()> {
        let name = names::occurrence(project_id, occurrence_id);
        match self.occurrences.write().await.remove(&name) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(name)),
        }
    }

    async fn get_occurrence_note(
        &self,
        project_id: &str,
        occurrence_id: &str,
    ) -> StorageResult<Note> {
        let occurrence = self.get_occurrence(project_id, occurrence_id).await?;
        let (note_project, note_id) = names::parse_note(&occurrence.note_name)
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        self.get_note(note_project, note_id).await
    }

    // =========================================================================
    // Notes
    // =========================================================================

    async fn get_note(&self, project_id: &str, note_id: &str) -> StorageResult<Note> {
        let name = names::note(project_id, note_id);
        let notes = self.notes.read().await;
        notes.get(&name).cloned().ok_or(StorageError::NotFound(name))
    }

    async fn list_notes(
        &self,
        project_id: &str,
        _filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Note>> {
        let prefix = names::note(project_id, "");
        let items = under_prefix(&*self.notes.read().await, &prefix);
        paginate(items, page_size, page_token)
    }

    async fn create_note(
        &self,
        project_id: &str,
        note_id: &str,
        mut note: Note,
    ) -> StorageResult<Note> {
        let name = names::note(project_id, note_id);
        note.name = name.clone();

        let mut notes = self.notes.write().await;
        if notes.contains_key(&name) {
            return Err(StorageError::AlreadyExists(name));
        }
        debug!(%name, "creating note");
        notes.insert(name, note.clone());
        Ok(note)
    }

    async fn update_note(
        &self,
        project_id: &str,
        note_id: &str,
        mut note: Note,
    ) -> StorageResult<Note> {
        let name = names::note(project_id, note_id);
        let mut notes = self.notes.write().await;
        let Some(existing) = notes.get_mut(&name) else {
            return Err(StorageError::NotFound(name));
        };
        note.name = name;
        *existing = note.clone();
        Ok(note)
    }

    async fn delete_note(&self, project_id: &str, note_id: &str) -> StorageResult<()> {
        let name = names::note(project_id, note_id);
        match self.notes.write().await.remove(&name) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(name)),
        }
    }

    async fn list_note_occurrences(
        &self,
        project_id: &str,
        note_id: &str,
        _filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Occurrence>> {
        let note_name = self.get_note(project_id, note_id).await?.name;
        let items: Vec<Occurrence> = self
            .occurrences
            .read()
            .await
            .values()
            .filter(|o| o.note_name == note_name)
            .cloned()
            .collect();
        paginate(items, page_size, page_token)
    }
}

#[async_trait]
impl ProjectStorage for MemStore {
    async fn create_project(&self, project_id: &str) -> StorageResult<Project> {
        let name = names::project(project_id);
        let mut projects = self.projects.write().await;
        if projects.contains_key(&name) {
            return Err(StorageError::AlreadyExists(name));
        }
        debug!(%name, "creating project");
        let project = Project { name: name.clone() };
        projects.insert(name, project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: &str) -> StorageResult<Project> {
        let name = names::project(project_id);
        let projects = self.projects.read().await;
        projects.get(&name).cloned().ok_or(StorageError::NotFound(name))
    }

    async fn list_projects(
        &self,
        _filter: &str,
        page_size: i32,
        page_token: &str,
    ) -> StorageResult<Page<Project>> {
        let items: Vec<Project> = self.projects.read().await.values().cloned().collect();
        paginate(items, page_size, page_token)
    }

    async fn delete_project(&self, project_id: &str) -> StorageResult<()> {
        let name = names::project(project_id);
        match self.projects.write().await.remove(&name) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::proto::NoteKind;

    fn vuln_note() -> Note {
        Note {
            short_description: "CVE-2024-0001".to_string(),
            kind: NoteKind::Vulnerability as i32,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn project_lifecycle() {
        let store = MemStore::new();
        let project = store.create_project("demo").await.unwrap();
        assert_eq!(project.name, "projects/demo");

        let dup = store.create_project("demo").await.unwrap_err();
        assert_eq!(dup, StorageError::AlreadyExists("projects/demo".into()));

        assert_eq!(store.get_project("demo").await.unwrap(), project);
        store.delete_project("demo").await.unwrap();
        assert!(matches!(
            store.get_project("demo").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn notes_are_scoped_to_their_project() {
        let store = MemStore::new();
        store.create_note("demo", "cve-1", vuln_note()).await.unwrap();
        store.create_note("demo", "cve-2", vuln_note()).await.unwrap();
        store.create_note("demo-2", "cve-1", vuln_note()).await.unwrap();

        let page = store.list_notes("demo", "", 0, "").await.unwrap();
        let names: Vec<_> = page.items.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["projects/demo/notes/cve-1", "projects/demo/notes/cve-2"]
        );
    }

    #[tokio::test]
    async fn occurrence_gets_generated_name_and_links_to_note() {
        let store = MemStore::new();
        let note = store.create_note("demo", "cve-1", vuln_note()).await.unwrap();

        let occurrence = store
            .create_occurrence(
                "demo",
                Occurrence {
                    note_name: note.name.clone(),
                    kind: NoteKind::Vulnerability as i32,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (project_id, occurrence_id) = names::parse_occurrence(&occurrence.name).unwrap();
        assert_eq!(project_id, "demo");

        let linked = store
            .get_occurrence_note(project_id, occurrence_id)
            .await
            .unwrap();
        assert_eq!(linked, note);

        let page = store
            .list_note_occurrences("demo", "cve-1", "", 0, "")
            .await
            .unwrap();
        assert_eq!(page.items, vec![occurrence]);
    }

    #[tokio::test]
    async fn batch_create_reports_partial_failures() {
        let store = MemStore::new();
        store.create_note("demo", "cve-1", vuln_note()).await.unwrap();

        let notes = [("cve-1", vuln_note()), ("cve-2", vuln_note())]
            .into_iter()
            .map(|(id, n)| (id.to_string(), n))
            .collect();
        let (created, errors) = store.batch_create_notes("demo", notes).await;
        assert_eq!(created.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn update_missing_note_is_not_found() {
        let store = MemStore::new();
        let err = store
            .update_note("demo", "missing", vuln_note())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
