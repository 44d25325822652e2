//! In-memory [`TestPlanApi`] that records calls, for pipeline tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use planbridge_core::pagination::PageRequest;

use crate::api::{ApiError, TestPlanApi};
use crate::api_types::{
    AttachmentReference, AttachmentRequest, ProjectInfo, RemoteRun, RemoteTestResult,
    ResultPayload, ResultUpdatePayload, RunCreateModel, ShallowReference, WireTestPoint,
};
use crate::lock_or_recover;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    GetProject,
    CreateRun,
    QueryPoints { skip: usize },
    AddResults { run_id: u64, count: usize },
    ListResults { skip: usize },
    UpdateResults { run_id: u64, count: usize },
    CreateResultAttachment { result_id: u64 },
    CreateRunAttachment,
    CompleteRun(u64),
}

pub fn wire_point(id: u64, plan_id: u64, case_id: &str, configuration_id: u64) -> WireTestPoint {
    WireTestPoint {
        id,
        test_plan: ShallowReference::new(plan_id),
        test_case: ShallowReference::new(case_id),
        configuration: ShallowReference::new(configuration_id),
    }
}

pub fn remote_result(id: u64, point_id: u64) -> RemoteTestResult {
    RemoteTestResult {
        id,
        test_point: Some(ShallowReference::new(point_id)),
        test_case: None,
        test_case_title: None,
        outcome: None,
    }
}

fn status_error(operation: &str, status: u16) -> ApiError {
    ApiError::Status {
        operation: operation.to_string(),
        status,
        body: "fake failure".to_string(),
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<ApiCall>,
    submitted: Vec<ResultPayload>,
    updated: Vec<ResultUpdatePayload>,
    created_runs: Vec<RunCreateModel>,
    attachments: Vec<(u64, AttachmentRequest)>,
    run_attachments: Vec<AttachmentRequest>,
    results: Vec<RemoteTestResult>,
    next_result_id: u64,
}

#[derive(Default)]
pub struct FakeTestPlanApi {
    state: Mutex<FakeState>,
    points: Vec<WireTestPoint>,
    project_status: Option<u16>,
    create_run_status: Option<u16>,
    add_results_status: Option<u16>,
    add_results_delay: Option<Duration>,
    add_results_without_ids: bool,
    failing_attachment_prefix: Option<String>,
}

impl FakeTestPlanApi {
    pub const RUN_ID: u64 = 150;

    pub fn with_points(mut self, points: Vec<WireTestPoint>) -> Self {
        self.points = points;
        self
    }

    pub fn with_project_status(mut self, status: u16) -> Self {
        self.project_status = Some(status);
        self
    }

    pub fn with_create_run_status(mut self, status: u16) -> Self {
        self.create_run_status = Some(status);
        self
    }

    pub fn with_add_results_status(mut self, status: u16) -> Self {
        self.add_results_status = Some(status);
        self
    }

    pub fn with_add_results_delay(mut self, delay: Duration) -> Self {
        self.add_results_delay = Some(delay);
        self
    }

    /// Accept submitted results but answer with an empty list.
    pub fn with_add_results_without_ids(mut self) -> Self {
        self.add_results_without_ids = true;
        self
    }

    pub fn with_failing_attachment_prefix(mut self, prefix: &str) -> Self {
        self.failing_attachment_prefix = Some(prefix.to_string());
        self
    }

    pub fn with_existing_results(self, results: Vec<RemoteTestResult>) -> Self {
        lock_or_recover(&self.state).results = results;
        self
    }

    pub fn run_id(&self) -> u64 {
        Self::RUN_ID
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock_or_recover(&self.state).calls.clone()
    }

    pub fn submitted(&self) -> Vec<ResultPayload> {
        lock_or_recover(&self.state).submitted.clone()
    }

    pub fn updated(&self) -> Vec<ResultUpdatePayload> {
        lock_or_recover(&self.state).updated.clone()
    }

    pub fn created_runs(&self) -> Vec<RunCreateModel> {
        lock_or_recover(&self.state).created_runs.clone()
    }

    pub fn attachments(&self) -> Vec<(u64, AttachmentRequest)> {
        lock_or_recover(&self.state).attachments.clone()
    }

    pub fn run_attachments(&self) -> Vec<AttachmentRequest> {
        lock_or_recover(&self.state).run_attachments.clone()
    }

    fn record(&self, call: ApiCall) {
        lock_or_recover(&self.state).calls.push(call);
    }
}

fn page_of<T: Clone>(rows: &[T], page: PageRequest) -> Vec<T> {
    rows.iter().skip(page.skip).take(page.top).cloned().collect()
}

#[async_trait]
impl TestPlanApi for FakeTestPlanApi {
    async fn get_project(&self, project: &str) -> Result<ProjectInfo, ApiError> {
        self.record(ApiCall::GetProject);
        if let Some(status) = self.project_status {
            return Err(status_error("get project", status));
        }
        Ok(ProjectInfo {
            id: "project-1".to_string(),
            name: project.to_string(),
        })
    }

    async fn create_run(&self, model: &RunCreateModel) -> Result<RemoteRun, ApiError> {
        self.record(ApiCall::CreateRun);
        if let Some(status) = self.create_run_status {
            return Err(status_error("create test run", status));
        }
        lock_or_recover(&self.state).created_runs.push(model.clone());
        Ok(RemoteRun {
            id: Self::RUN_ID,
            name: model.name.clone(),
            state: Some("InProgress".to_string()),
        })
    }

    async fn query_points(
        &self,
        _test_case_ids: &[u64],
        page: PageRequest,
    ) -> Result<Vec<WireTestPoint>, ApiError> {
        self.record(ApiCall::QueryPoints { skip: page.skip });
        Ok(page_of(&self.points, page))
    }

    async fn add_results(
        &self,
        run_id: u64,
        results: &[ResultPayload],
    ) -> Result<Vec<RemoteTestResult>, ApiError> {
        self.record(ApiCall::AddResults {
            run_id,
            count: results.len(),
        });
        if let Some(delay) = self.add_results_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.add_results_status {
            return Err(status_error("add test results", status));
        }
        let mut state = lock_or_recover(&self.state);
        let mut created = Vec::new();
        for payload in results {
            state.next_result_id += 1;
            let point_id = payload.test_point.id.parse().unwrap_or_default();
            let result = remote_result(100_000 + state.next_result_id, point_id);
            state.results.push(result.clone());
            state.submitted.push(payload.clone());
            created.push(result);
        }
        if self.add_results_without_ids {
            created.clear();
        }
        Ok(created)
    }

    async fn list_results(
        &self,
        _run_id: u64,
        page: PageRequest,
    ) -> Result<Vec<RemoteTestResult>, ApiError> {
        self.record(ApiCall::ListResults { skip: page.skip });
        Ok(page_of(&lock_or_recover(&self.state).results, page))
    }

    async fn update_results(
        &self,
        run_id: u64,
        updates: &[ResultUpdatePayload],
    ) -> Result<Vec<RemoteTestResult>, ApiError> {
        self.record(ApiCall::UpdateResults {
            run_id,
            count: updates.len(),
        });
        let mut state = lock_or_recover(&self.state);
        state.updated.extend(updates.iter().cloned());
        Ok(updates
            .iter()
            .map(|update| remote_result(update.id, 0))
            .collect())
    }

    async fn create_result_attachment(
        &self,
        _run_id: u64,
        result_id: u64,
        request: &AttachmentRequest,
    ) -> Result<AttachmentReference, ApiError> {
        self.record(ApiCall::CreateResultAttachment { result_id });
        if self
            .failing_attachment_prefix
            .as_deref()
            .is_some_and(|prefix| request.file_name.starts_with(prefix))
        {
            return Err(status_error("create result attachment", 500));
        }
        let mut state = lock_or_recover(&self.state);
        state.attachments.push((result_id, request.clone()));
        let id = state.attachments.len() as u64;
        Ok(AttachmentReference {
            id,
            url: format!("https://fake.invalid/attachments/{id}"),
        })
    }

    async fn create_run_attachment(
        &self,
        _run_id: u64,
        request: &AttachmentRequest,
    ) -> Result<AttachmentReference, ApiError> {
        self.record(ApiCall::CreateRunAttachment);
        let mut state = lock_or_recover(&self.state);
        state.run_attachments.push(request.clone());
        Ok(AttachmentReference {
            id: state.run_attachments.len() as u64,
            url: "https://fake.invalid/run-attachment".to_string(),
        })
    }

    async fn complete_run(&self, run_id: u64) -> Result<RemoteRun, ApiError> {
        self.record(ApiCall::CompleteRun(run_id));
        Ok(RemoteRun {
            id: run_id,
            name: String::new(),
            state: Some("Completed".to_string()),
        })
    }
}
