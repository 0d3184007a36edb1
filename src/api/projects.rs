use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use super::{names, required};
use crate::server::proto::{self, projects_server::Projects};
use crate::storage::ProjectStorage;

/// `grafeas.v1.Projects` over a storage capability.
pub struct ProjectsApi<S> {
    storage: Arc<S>,
}

impl<S> ProjectsApi<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[tonic::async_trait]
impl<S: ProjectStorage + 'static> Projects for ProjectsApi<S> {
    #[instrument(skip_all)]
    async fn create_project(
        &self,
        request: Request<proto::CreateProjectRequest>,
    ) -> Result<Response<proto::Project>, Status> {
        let project = required(request.into_inner().project, "project")?;
        let project_id = names::parse_project(&project.name)?;
        Ok(Response::new(self.storage.create_project(project_id).await?))
    }

    #[instrument(skip_all)]
    async fn get_project(
        &self,
        request: Request<proto::GetProjectRequest>,
    ) -> Result<Response<proto::Project>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.name)?;
        Ok(Response::new(self.storage.get_project(project_id).await?))
    }

    #[instrument(skip_all)]
    async fn list_projects(
        &self,
        request: Request<proto::ListProjectsRequest>,
    ) -> Result<Response<proto::ListProjectsResponse>, Status> {
        let req = request.into_inner();
        let page = self
            .storage
            .list_projects(&req.filter, req.page_size, &req.page_token)
            .await?;
        Ok(Response::new(proto::ListProjectsResponse {
            projects: page.items,
            next_page_token: page.next_page_token,
        }))
    }

    #[instrument(skip_all)]
    async fn delete_project(
        &self,
        request: Request<proto::DeleteProjectRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        let project_id = names::parse_project(&req.name)?;
        self.storage.delete_project(project_id).await?;
        Ok(Response::new(proto::Empty {}))
    }
}
