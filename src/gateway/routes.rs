//! REST routes and their handlers.
//!
//! Each handler maps path, query and body onto the request message, calls
//! the RPC through the upstream channel and renders the reply as JSON.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::Deserialize;
use tonic::Code;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::Channel;

use super::error::{ErrorBody, GatewayError};
use super::json::parse_body;
use crate::api::names;
use crate::server::proto::{
    self, Note, Occurrence, Project, grafeas_client::GrafeasClient,
    projects_client::ProjectsClient,
};

/// Incoming headers with this prefix are forwarded as metadata, prefix
/// stripped.
const METADATA_PREFIX: &str = "grpc-metadata-";

type Reply<T> = Result<Json<T>, GatewayError>;

/// Clients of the RPC services, sharing one channel.
#[derive(Debug, Clone)]
pub(crate) struct Upstream {
    grafeas: GrafeasClient<Channel>,
    projects: ProjectsClient<Channel>,
}

impl Upstream {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            grafeas: GrafeasClient::new(channel.clone()),
            projects: ProjectsClient::new(channel),
        }
    }
}

/// `filter`, `page_size` and `page_token` query parameters of list calls.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListParams {
    filter: String,
    #[serde(alias = "pageSize")]
    page_size: i32,
    #[serde(alias = "pageToken")]
    page_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateNoteParams {
    #[serde(alias = "noteId")]
    note_id: String,
}

pub(crate) fn router(upstream: Upstream) -> Router {
    Router::new()
        .route("/v1/projects", get(list_projects).post(create_project))
        .route(
            "/v1/projects/{project}",
            get(get_project).delete(delete_project),
        )
        .route(
            "/v1/projects/{project}/notes",
            get(list_notes).post(create_note),
        )
        .route(
            "/v1/projects/{project}/notes:batchCreate",
            post(batch_create_notes),
        )
        .route(
            "/v1/projects/{project}/notes/{note}",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .route(
            "/v1/projects/{project}/notes/{note}/occurrences",
            get(list_note_occurrences),
        )
        .route(
            "/v1/projects/{project}/occurrences",
            get(list_occurrences).post(create_occurrence),
        )
        .route(
            "/v1/projects/{project}/occurrences:batchCreate",
            post(batch_create_occurrences),
        )
        .route(
            "/v1/projects/{project}/occurrences/{occurrence}",
            get(get_occurrence)
                .patch(update_occurrence)
                .delete(delete_occurrence),
        )
        .route(
            "/v1/projects/{project}/occurrences/{occurrence}/notes",
            get(get_occurrence_note),
        )
        .fallback(not_found)
        .with_state(upstream)
}

/// Wrap `message` in an RPC request carrying the forwardable headers.
fn forward<T>(headers: &HeaderMap, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    for (name, value) in headers {
        let key = if name == AUTHORIZATION {
            name.as_str()
        } else if let Some(key) = name.as_str().strip_prefix(METADATA_PREFIX) {
            key
        } else {
            continue;
        };
        let Ok(key) = AsciiMetadataKey::from_bytes(key.as_bytes()) else {
            continue;
        };
        let Some(value) = value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<AsciiMetadataValue>().ok())
        else {
            continue;
        };
        request.metadata_mut().append(key, value);
    }
    request
}

async fn not_found(method: Method, uri: Uri) -> Response {
    let message = format!("no route for {method} {}", uri.path());
    let body = ErrorBody {
        error: message.clone(),
        code: Code::NotFound as i32,
        message,
        details: Vec::new(),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// =============================================================================
// Projects
// =============================================================================

async fn create_project(
    State(mut upstream): State<Upstream>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<Project> {
    let project: Project = parse_body(&body)?;
    let request = forward(
        &headers,
        proto::CreateProjectRequest {
            project: Some(project),
        },
    );
    Ok(Json(upstream.projects.create_project(request).await?.into_inner()))
}

async fn get_project(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Reply<Project> {
    let request = forward(
        &headers,
        proto::GetProjectRequest {
            name: names::project(&project),
        },
    );
    Ok(Json(upstream.projects.get_project(request).await?.into_inner()))
}

async fn list_projects(
    State(mut upstream): State<Upstream>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Reply<proto::ListProjectsResponse> {
    let request = forward(
        &headers,
        proto::ListProjectsRequest {
            filter: params.filter,
            page_size: params.page_size,
            page_token: params.page_token,
        },
    );
    Ok(Json(upstream.projects.list_projects(request).await?.into_inner()))
}

async fn delete_project(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Reply<proto::Empty> {
    let request = forward(
        &headers,
        proto::DeleteProjectRequest {
            name: names::project(&project),
        },
    );
    Ok(Json(upstream.projects.delete_project(request).await?.into_inner()))
}

// =============================================================================
// Notes
// =============================================================================

async fn get_note(
    State(mut upstream): State<Upstream>,
    Path((project, note)): Path<(String, String)>,
    headers: HeaderMap,
) -> Reply<Note> {
    let request = forward(
        &headers,
        proto::GetNoteRequest {
            name: names::note(&project, &note),
        },
    );
    Ok(Json(upstream.grafeas.get_note(request).await?.into_inner()))
}

async fn list_notes(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Reply<proto::ListNotesResponse> {
    let request = forward(
        &headers,
        proto::ListNotesRequest {
            parent: names::project(&project),
            filter: params.filter,
            page_size: params.page_size,
            page_token: params.page_token,
        },
    );
    Ok(Json(upstream.grafeas.list_notes(request).await?.into_inner()))
}

async fn create_note(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    Query(params): Query<CreateNoteParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<Note> {
    let note: Note = parse_body(&body)?;
    let request = forward(
        &headers,
        proto::CreateNoteRequest {
            parent: names::project(&project),
            note_id: params.note_id,
            note: Some(note),
        },
    );
    Ok(Json(upstream.grafeas.create_note(request).await?.into_inner()))
}

async fn batch_create_notes(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<proto::BatchCreateNotesResponse> {
    let mut message: proto::BatchCreateNotesRequest = parse_body(&body)?;
    message.parent = names::project(&project);
    let request = forward(&headers, message);
    Ok(Json(upstream.grafeas.batch_create_notes(request).await?.into_inner()))
}

async fn update_note(
    State(mut upstream): State<Upstream>,
    Path((project, note_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<Note> {
    let note: Note = parse_body(&body)?;
    let request = forward(
        &headers,
        proto::UpdateNoteRequest {
            name: names::note(&project, &note_id),
            note: Some(note),
        },
    );
    Ok(Json(upstream.grafeas.update_note(request).await?.into_inner()))
}

async fn delete_note(
    State(mut upstream): State<Upstream>,
    Path((project, note)): Path<(String, String)>,
    headers: HeaderMap,
) -> Reply<proto::Empty> {
    let request = forward(
        &headers,
        proto::DeleteNoteRequest {
            name: names::note(&project, &note),
        },
    );
    Ok(Json(upstream.grafeas.delete_note(request).await?.into_inner()))
}

async fn list_note_occurrences(
    State(mut upstream): State<Upstream>,
    Path((project, note)): Path<(String, String)>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Reply<proto::ListNoteOccurrencesResponse> {
    let request = forward(
        &headers,
        proto::ListNoteOccurrencesRequest {
            name: names::note(&project, &note),
            filter: params.filter,
            page_size: params.page_size,
            page_token: params.page_token,
        },
    );
    Ok(Json(
        upstream
            .grafeas
            .list_note_occurrences(request)
            .await?
            .into_inner(),
    ))
}

// =============================================================================
// Occurrences
// =============================================================================

async fn get_occurrence(
    State(mut upstream): State<Upstream>,
    Path((project, occurrence)): Path<(String, String)>,
    headers: HeaderMap,
) -> Reply<Occurrence> {
    let request = forward(
        &headers,
        proto::GetOccurrenceRequest {
            name: names::occurrence(&project, &occurrence),
        },
    );
    Ok(Json(upstream.grafeas.get_occurrence(request).await?.into_inner()))
}

async fn list_occurrences(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Reply<proto::ListOccurrencesResponse> {
    let request = forward(
        &headers,
        proto::ListOccurrencesRequest {
            parent: names::project(&project),
            filter: params.filter,
            page_size: params.page_size,
            page_token: params.page_token,
        },
    );
    Ok(Json(upstream.grafeas.list_occurrences(request).await?.into_inner()))
}

async fn create_occurrence(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<Occurrence> {
    let occurrence: Occurrence = parse_body(&body)?;
    let request = forward(
        &headers,
        proto::CreateOccurrenceRequest {
            parent: names::project(&project),
            occurrence: Some(occurrence),
        },
    );
    Ok(Json(upstream.grafeas.create_occurrence(request).await?.into_inner()))
}

async fn batch_create_occurrences(
    State(mut upstream): State<Upstream>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<proto::BatchCreateOccurrencesResponse> {
    let mut message: proto::BatchCreateOccurrencesRequest = parse_body(&body)?;
    message.parent = names::project(&project);
    let request = forward(&headers, message);
    Ok(Json(
        upstream
            .grafeas
            .batch_create_occurrences(request)
            .await?
            .into_inner(),
    ))
}

async fn update_occurrence(
    State(mut upstream): State<Upstream>,
    Path((project, occurrence_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<Occurrence> {
    let occurrence: Occurrence = parse_body(&body)?;
    let request = forward(
        &headers,
        proto::UpdateOccurrenceRequest {
            name: names::occurrence(&project, &occurrence_id),
            occurrence: Some(occurrence),
        },
    );
    Ok(Json(upstream.grafeas.update_occurrence(request).await?.into_inner()))
}

async fn delete_occurrence(
    State(mut upstream): State<Upstream>,
    Path((project, occurrence)): Path<(String, String)>,
    headers: HeaderMap,
) -> Reply<proto::Empty> {
    let request = forward(
        &headers,
        proto::DeleteOccurrenceRequest {
            name: names::occurrence(&project, &occurrence),
        },
    );
    Ok(Json(upstream.grafeas.delete_occurrence(request).await?.into_inner()))
}

async fn get_occurrence_note(
    State(mut upstream): State<Upstream>,
    Path((project, occurrence)): Path<(String, String)>,
    headers: HeaderMap,
) -> Reply<Note> {
    let request = forward(
        &headers,
        proto::GetOccurrenceNoteRequest {
            name: names::occurrence(&project, &occurrence),
        },
    );
    Ok(Json(upstream.grafeas.get_occurrence_note(request).await?.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn forwards_authorization_and_prefixed_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert("grpc-metadata-tenant", HeaderValue::from_static("acme"));
        headers.insert("x-other", HeaderValue::from_static("dropped"));

        let request = forward(&headers, ());
        let metadata = request.metadata();
        assert_eq!(
            metadata.get("authorization").unwrap().to_str().unwrap(),
            "Bearer abc"
        );
        assert_eq!(metadata.get("tenant").unwrap().to_str().unwrap(), "acme");
        assert!(metadata.get("x-other").is_none());
    }

    #[test]
    fn list_params_accept_both_spellings() {
        let params: ListParams =
            query_params("filter=kind%3DBUILD&pageSize=5&page_token=10");
        assert_eq!(params.filter, "kind=BUILD");
        assert_eq!(params.page_size, 5);
        assert_eq!(params.page_token, "10");
    }

    fn query_params<T: serde::de::DeserializeOwned>(query: &str) -> T {
        let uri: Uri = format!("/v1/projects?{query}").parse().unwrap();
        Query::<T>::try_from_uri(&uri).unwrap().0
    }
}
