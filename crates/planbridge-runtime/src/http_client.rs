//! reqwest-backed implementation of [`TestPlanApi`] with bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use planbridge_core::pagination::PageRequest;
use planbridge_core::text::truncate_for_error;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;

use crate::api::{ApiError, TestPlanApi};
use crate::api_types::{
    AttachmentReference, AttachmentRequest, ListResponse, PointsFilter, PointsQuery,
    PointsQueryResponse, ProjectInfo, RemoteRun, RemoteTestResult, ResultPayload,
    ResultUpdatePayload, RunCreateModel, RunUpdateModel, WireTestPoint, RUN_STATE_COMPLETED,
};
use crate::config::AuthScheme;
use crate::retry::{
    is_retryable_transport_error, parse_retry_after_ms, retry_delay, should_retry_status,
};

pub const API_VERSION: &str = "7.1";
/// Newer api-versions of the add-results endpoint omit the created result
/// ids from the response, so that one call stays pinned to 5.0.
pub const ADD_RESULTS_API_VERSION: &str = "5.0";
pub const ATTACHMENT_API_VERSION: &str = "7.1-preview.1";
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone)]
/// Connection settings for [`HttpTestPlanClient`].
pub struct ApiClientConfig {
    pub org_url: String,
    pub project: String,
    pub token: String,
    pub auth_scheme: AuthScheme,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone)]
/// Process-wide client for the remote test-plan REST API.
pub struct HttpTestPlanClient {
    http: reqwest::Client,
    org_url: reqwest::Url,
    project: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl HttpTestPlanClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let org_url = reqwest::Url::parse(config.org_url.trim())
            .map_err(|_| ApiError::InvalidUrl(config.org_url.clone()))?;
        if org_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.org_url));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("planbridge-reporter"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth_header = match config.auth_scheme {
            AuthScheme::Pat => format!(
                "Basic {}",
                STANDARD.encode(format!(":{}", config.token.trim()))
            ),
            AuthScheme::Bearer => format!("Bearer {}", config.token.trim()),
        };
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_header)
                .map_err(|_| ApiError::InvalidHeader("authorization"))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            http,
            org_url,
            project: config.project,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<String, ApiError> {
        let mut url = self.org_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.org_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url.into())
    }

    fn test_url(&self, segments: &[&str]) -> Result<String, ApiError> {
        let mut full = vec![self.project.as_str(), "_apis", "test"];
        full.extend_from_slice(segments);
        self.url(&full)
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder().send().await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|source| {
                            ApiError::Decode {
                                operation: operation.to_string(),
                                source,
                            }
                        });
                    }

                    let retry_after = parse_retry_after_ms(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && should_retry_status(status.as_u16()) {
                        tracing::debug!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            "retrying test plan api call"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    return Err(ApiError::Status {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tracing::debug!(
                            operation,
                            attempt,
                            error = %error,
                            "retrying test plan api call after transport error"
                        );
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(ApiError::Transport {
                        operation: operation.to_string(),
                        source: error,
                    });
                }
            }
        }
    }
}

fn page_query(page: PageRequest, api_version: &'static str) -> [(&'static str, String); 3] {
    [
        ("$skip", page.skip.to_string()),
        ("$top", page.top.to_string()),
        ("api-version", api_version.to_string()),
    ]
}

#[async_trait]
impl TestPlanApi for HttpTestPlanClient {
    async fn get_project(&self, project: &str) -> Result<ProjectInfo, ApiError> {
        let url = self.url(&["_apis", "projects", project])?;
        self.request_json("get project", || {
            self.http
                .get(url.as_str())
                .query(&[("api-version", API_VERSION)])
        })
        .await
    }

    async fn create_run(&self, model: &RunCreateModel) -> Result<RemoteRun, ApiError> {
        let url = self.test_url(&["runs"])?;
        self.request_json("create test run", || {
            self.http
                .post(url.as_str())
                .query(&[("api-version", API_VERSION)])
                .json(model)
        })
        .await
    }

    async fn query_points(
        &self,
        test_case_ids: &[u64],
        page: PageRequest,
    ) -> Result<Vec<WireTestPoint>, ApiError> {
        let url = self.test_url(&["points"])?;
        let body = PointsQuery {
            points_filter: PointsFilter {
                testcase_ids: test_case_ids.to_vec(),
            },
        };
        let query = page_query(page, API_VERSION);
        let response: PointsQueryResponse = self
            .request_json("query test points", || {
                self.http.post(url.as_str()).query(&query).json(&body)
            })
            .await?;
        Ok(response.points)
    }

    async fn add_results(
        &self,
        run_id: u64,
        results: &[ResultPayload],
    ) -> Result<Vec<RemoteTestResult>, ApiError> {
        let run_id = run_id.to_string();
        let url = self.test_url(&["Runs", run_id.as_str(), "results"])?;
        let response: ListResponse<RemoteTestResult> = self
            .request_json("add test results", || {
                self.http
                    .post(url.as_str())
                    .query(&[("api-version", ADD_RESULTS_API_VERSION)])
                    .json(results)
            })
            .await?;
        Ok(response.value)
    }

    async fn list_results(
        &self,
        run_id: u64,
        page: PageRequest,
    ) -> Result<Vec<RemoteTestResult>, ApiError> {
        let run_id = run_id.to_string();
        let url = self.test_url(&["Runs", run_id.as_str(), "results"])?;
        let query = page_query(page, API_VERSION);
        let response: ListResponse<RemoteTestResult> = self
            .request_json("list test results", || {
                self.http.get(url.as_str()).query(&query)
            })
            .await?;
        Ok(response.value)
    }

    async fn update_results(
        &self,
        run_id: u64,
        updates: &[ResultUpdatePayload],
    ) -> Result<Vec<RemoteTestResult>, ApiError> {
        let run_id = run_id.to_string();
        let url = self.test_url(&["Runs", run_id.as_str(), "results"])?;
        let response: ListResponse<RemoteTestResult> = self
            .request_json("update test results", || {
                self.http
                    .patch(url.as_str())
                    .query(&[("api-version", API_VERSION)])
                    .json(updates)
            })
            .await?;
        Ok(response.value)
    }

    async fn create_result_attachment(
        &self,
        run_id: u64,
        result_id: u64,
        request: &AttachmentRequest,
    ) -> Result<AttachmentReference, ApiError> {
        let run_id = run_id.to_string();
        let result_id = result_id.to_string();
        let url = self.test_url(&[
            "Runs",
            run_id.as_str(),
            "Results",
            result_id.as_str(),
            "attachments",
        ])?;
        self.request_json("create result attachment", || {
            self.http
                .post(url.as_str())
                .query(&[("api-version", ATTACHMENT_API_VERSION)])
                .json(request)
        })
        .await
    }

    async fn create_run_attachment(
        &self,
        run_id: u64,
        request: &AttachmentRequest,
    ) -> Result<AttachmentReference, ApiError> {
        let run_id = run_id.to_string();
        let url = self.test_url(&["Runs", run_id.as_str(), "attachments"])?;
        self.request_json("create run attachment", || {
            self.http
                .post(url.as_str())
                .query(&[("api-version", ATTACHMENT_API_VERSION)])
                .json(request)
        })
        .await
    }

    async fn complete_run(&self, run_id: u64) -> Result<RemoteRun, ApiError> {
        let run_id = run_id.to_string();
        let url = self.test_url(&["runs", run_id.as_str()])?;
        let body = RunUpdateModel {
            state: RUN_STATE_COMPLETED.to_string(),
        };
        self.request_json("complete test run", || {
            self.http
                .patch(url.as_str())
                .query(&[("api-version", API_VERSION)])
                .json(&body)
        })
        .await
    }
}
