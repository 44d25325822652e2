use async_trait::async_trait;
use planbridge_core::pagination::PageRequest;
use planbridge_core::CoreError;
use thiserror::Error;

use crate::api_types::{
    AttachmentReference, AttachmentRequest, ProjectInfo, RemoteRun, RemoteTestResult,
    ResultPayload, ResultUpdatePayload, RunCreateModel, WireTestPoint,
};

#[derive(Debug, Error)]
/// Enumerates failures of remote test-plan API calls.
pub enum ApiError {
    #[error("invalid api url '{0}'")]
    InvalidUrl(String),
    #[error("invalid {0} header")]
    InvalidHeader(&'static str),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error(transparent)]
    Pagination(#[from] CoreError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the host could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

#[async_trait]
/// Operations of the remote test-plan service used by the publishing pipeline.
pub trait TestPlanApi: Send + Sync {
    async fn get_project(&self, project: &str) -> Result<ProjectInfo, ApiError>;

    async fn create_run(&self, model: &RunCreateModel) -> Result<RemoteRun, ApiError>;

    async fn query_points(
        &self,
        test_case_ids: &[u64],
        page: PageRequest,
    ) -> Result<Vec<WireTestPoint>, ApiError>;

    async fn add_results(
        &self,
        run_id: u64,
        results: &[ResultPayload],
    ) -> Result<Vec<RemoteTestResult>, ApiError>;

    async fn list_results(
        &self,
        run_id: u64,
        page: PageRequest,
    ) -> Result<Vec<RemoteTestResult>, ApiError>;

    async fn update_results(
        &self,
        run_id: u64,
        updates: &[ResultUpdatePayload],
    ) -> Result<Vec<RemoteTestResult>, ApiError>;

    async fn create_result_attachment(
        &self,
        run_id: u64,
        result_id: u64,
        request: &AttachmentRequest,
    ) -> Result<AttachmentReference, ApiError>;

    async fn create_run_attachment(
        &self,
        run_id: u64,
        request: &AttachmentRequest,
    ) -> Result<AttachmentReference, ApiError>;

    async fn complete_run(&self, run_id: u64) -> Result<RemoteRun, ApiError>;
}
