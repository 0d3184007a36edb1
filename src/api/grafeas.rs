use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use super::{batch_status, check_note_id, names, required};
use crate::server::proto::{self, grafeas_server::Grafeas};
use crate::storage::GrafeasStorage;

/// `grafeas.v1.Grafeas` over a storage capability.
pub struct GrafeasApi<S> {
    storage: Arc<S>,
}

impl<S> GrafeasApi<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[tonic::async_trait]
impl<S: GrafeasStorage + 'static> Grafeas for GrafeasApi<S> {
    #[instrument(skip_all)]
    async fn get_occurrence(
        &self,
        request: Request<proto::GetOccurrenceRequest>,
    ) -> Result<Response<proto::Occurrence>, Status> {
        let req = request.into_inner();
        let (project_id, occurrence_id) = names::parse_occurrence(&req.name)?;
        let occurrence = self
            .storage
            .get_occurrence(project_id, occurrence_id)
            .await?;
        Ok(Response::new(occurrence))
    }

    #[instrument(skip_all)]
    async fn list_occurrences(
        &self,
        request: Request<proto::ListOccurrencesRequest>,
    ) -> Result<Response<proto::ListOccurrencesResponse>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.parent)?;
        let page = self
            .storage
            .list_occurrences(project_id, &req.filter, req.page_size, &req.page_token)
            .await?;
        Ok(Response::new(proto::ListOccurrencesResponse {
            occurrences: page.items,
            next_page_token: page.next_page_token,
        }))
    }

    #[instrument(skip_all)]
    async fn delete_occurrence(
        &self,
        request: Request<proto::DeleteOccurrenceRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        let (project_id, occurrence_id) = names::parse_occurrence(&req.name)?;
        self.storage
            .delete_occurrence(project_id, occurrence_id)
            .await?;
        Ok(Response::new(proto::Empty {}))
    }

    #[instrument(skip_all)]
    async fn create_occurrence(
        &self,
        request: Request<proto::CreateOccurrenceRequest>,
    ) -> Result<Response<proto::Occurrence>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.parent)?;
        let occurrence = required(req.occurrence, "occurrence")?;
        names::parse_note(&occurrence.note_name)?;
        let created = self
            .storage
            .create_occurrence(project_id, occurrence)
            .await?;
        Ok(Response::new(created))
    }

    #[instrument(skip_all)]
    async fn batch_create_occurrences(
        &self,
        request: Request<proto::BatchCreateOccurrencesRequest>,
    ) -> Result<Response<proto::BatchCreateOccurrencesResponse>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.parent)?;
        if req.occurrences.is_empty() {
            return Err(Status::invalid_argument("at least one occurrence is required"));
        }
        for occurrence in &req.occurrences {
            names::parse_note(&occurrence.note_name)?;
        }
        let (occurrences, errors) = self
            .storage
            .batch_create_occurrences(project_id, req.occurrences)
            .await;
        batch_status(errors)?;
        Ok(Response::new(proto::BatchCreateOccurrencesResponse {
            occurrences,
        }))
    }

    #[instrument(skip_all)]
    async fn update_occurrence(
        &self,
        request: Request<proto::UpdateOccurrenceRequest>,
    ) -> Result<Response<proto::Occurrence>, Status> {
        let req = request.into_inner();
        let (project_id, occurrence_id) = names::parse_occurrence(&req.name)?;
        let occurrence = required(req.occurrence, "occurrence")?;
        names::parse_note(&occurrence.note_name)?;
        let updated = self
            .storage
            .update_occurrence(project_id, occurrence_id, occurrence)
            .await?;
        Ok(Response::new(updated))
    }

    #[instrument(skip_all)]
    async fn get_occurrence_note(
        &self,
        request: Request<proto::GetOccurrenceNoteRequest>,
    ) -> Result<Response<proto::Note>, Status> {
        let req = request.into_inner();
        let (project_id, occurrence_id) = names::parse_occurrence(&req.name)?;
        let note = self
            .storage
            .get_occurrence_note(project_id, occurrence_id)
            .await?;
        Ok(Response::new(note))
    }

    #[instrument(skip_all)]
    async fn get_note(
        &self,
        request: Request<proto::GetNoteRequest>,
    ) -> Result<Response<proto::Note>, Status> {
        let req = request.into_inner();
        let (project_id, note_id) = names::parse_note(&req.name)?;
        Ok(Response::new(self.storage.get_note(project_id, note_id).await?))
    }

    #[instrument(skip_all)]
    async fn list_notes(
        &self,
        request: Request<proto::ListNotesRequest>,
    ) -> Result<Response<proto::ListNotesResponse>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.parent)?;
        let page = self
            .storage
            .list_notes(project_id, &req.filter, req.page_size, &req.page_token)
            .await?;
        Ok(Response::new(proto::ListNotesResponse {
            notes: page.items,
            next_page_token: page.next_page_token,
        }))
    }

    #[instrument(skip_all)]
    async fn delete_note(
        &self,
        request: Request<proto::DeleteNoteRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        let (project_id, note_id) = names::parse_note(&req.name)?;
        self.storage.delete_note(project_id, note_id).await?;
        Ok(Response::new(proto::Empty {}))
    }

    #[instrument(skip_all)]
    async fn create_note(
        &self,
        request: Request<proto::CreateNoteRequest>,
    ) -> Result<Response<proto::Note>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.parent)?;
        check_note_id(&req.note_id)?;
        let note = required(req.note, "note")?;
        let created = self
            .storage
            .create_note(project_id, &req.note_id, note)
            .await?;
        Ok(Response::new(created))
    }

    #[instrument(skip_all)]
    async fn batch_create_notes(
        &self,
        request: Request<proto::BatchCreateNotesRequest>,
    ) -> Result<Response<proto::BatchCreateNotesResponse>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.parent)?;
        if req.notes.is_empty() {
            return Err(Status::invalid_argument("at least one note is required"));
        }
        for note_id in req.notes.keys() {
            check_note_id(note_id)?;
        }
        let (notes, errors) = self.storage.batch_create_notes(project_id, req.notes).await;
        batch_status(errors)?;
        Ok(Response::new(proto::BatchCreateNotesResponse { notes }))
    }

    #[instrument(skip_all)]
    async fn update_note(
        &self,
        request: Request<proto::UpdateNoteRequest>,
    ) -> Result<Response<proto::Note>, Status> {
        let req = request.into_inner();
        let (project_id, note_id) = names::parse_note(&req.name)?;
        let note = required(req.note, "note")?;
        let updated = self.storage.update_note(project_id, note_id, note).await?;
        Ok(Response::new(updated))
    }

    #[instrument(skip_all)]
    async fn list_note_occurrences(
        &self,
        request: Request<proto::ListNoteOccurrencesRequest>,
    ) -> Result<Response<proto::ListNoteOccurrencesResponse>, Status> {
        let req = request.into_inner();
        let (project_id, note_id) = names::parse_note(&req.name)?;
        let page = self
            .storage
            .list_note_occurrences(
                project_id,
                note_id,
                &req.filter,
                req.page_size,
                &req.page_token,
            )
            .await?;
        Ok(Response::new(proto::ListNoteOccurrencesResponse {
            occurrences: page.items,
            next_page_token: page.next_page_token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tonic::Code;

    use super::*;
    use crate::server::proto::{Note, NoteKind, Occurrence};
    use crate::storage::MemStore;

    fn api() -> GrafeasApi<MemStore> {
        GrafeasApi::new(Arc::new(MemStore::new()))
    }

    fn note() -> Note {
        Note {
            kind: NoteKind::Vulnerability as i32,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn batch_create_notes_rejects_unaddressable_ids() {
        let api = api();
        for bad in ["a/b", ""] {
            let notes = HashMap::from([("ok".to_string(), note()), (bad.to_string(), note())]);
            let err = api
                .batch_create_notes(Request::new(proto::BatchCreateNotesRequest {
                    parent: "projects/p".into(),
                    notes,
                }))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument, "id {bad:?}");
        }

        let listed = api
            .list_notes(Request::new(proto::ListNotesRequest {
                parent: "projects/p".into(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(listed.notes.is_empty());
    }

    #[tokio::test]
    async fn update_occurrence_requires_a_note_name() {
        let api = api();
        api.create_note(Request::new(proto::CreateNoteRequest {
            parent: "projects/p".into(),
            note_id: "n".into(),
            note: Some(note()),
        }))
        .await
        .unwrap();
        let created = api
            .create_occurrence(Request::new(proto::CreateOccurrenceRequest {
                parent: "projects/p".into(),
                occurrence: Some(Occurrence {
                    note_name: "projects/p/notes/n".into(),
                    ..Default::default()
                }),
            }))
            .await
            .unwrap()
            .into_inner();

        let err = api
            .update_occurrence(Request::new(proto::UpdateOccurrenceRequest {
                name: created.name.clone(),
                occurrence: Some(Occurrence {
                    note_name: "garbage".into(),
                    ..Default::default()
                }),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let note = api
            .get_occurrence_note(Request::new(proto::GetOccurrenceNoteRequest {
                name: created.name,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(note.name, "projects/p/notes/n");
    }
}
