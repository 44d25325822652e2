//! Reporter configuration: serde model, defaults and validation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use planbridge_core::attachment_policy::AttachmentMatcher;
use planbridge_core::case_ids::{CaseIdMatcher, CaseIdZone, DEFAULT_CASE_ID_PATTERN};
use planbridge_core::identity::LocalTestIdentity;
use planbridge_core::pagination::{Paginator, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use planbridge_core::test_points::TestPoint;
use planbridge_core::CoreError;
use serde::Deserialize;
use thiserror::Error;

use crate::http_client::ApiClientConfig;

/// Process environment value carrying the resolved run id.
pub const RUN_ID_ENV: &str = "PLANBRIDGE_TEST_RUN_ID";
pub const DEFAULT_RUN_TITLE: &str = "Automated test run";
pub const DEFAULT_CONFIGURATION_ID: u64 = 1;
pub const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// How completed tests are turned into remote results.
pub enum PublishMode {
    /// Publish each test as soon as it completes.
    #[default]
    TestResult,
    /// Accumulate and publish in chunks at the end of the suite.
    TestRun,
    /// Update results already present in an externally created run.
    ExistingRun,
}

impl PublishMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestResult => "testResult",
            Self::TestRun => "testRun",
            Self::ExistingRun => "existingRun",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthScheme {
    /// HTTP Basic with an empty user and the token as password.
    #[default]
    Pat,
    Bearer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestRunConfig {
    pub configuration_ids: Vec<u64>,
    pub owner: Option<String>,
    pub comment: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestCaseSummaryConfig {
    pub enabled: bool,
    pub output_path: Option<PathBuf>,
    pub publish_to_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Static options supplied once when the reporter is constructed.
pub struct ReporterConfig {
    pub org_url: String,
    pub token: String,
    pub project_name: String,
    pub plan_id: u64,
    pub auth_scheme: AuthScheme,
    pub publish_mode: PublishMode,
    pub test_run_title: String,
    pub environment: Option<String>,
    pub upload_attachments: bool,
    pub attachments_type: Vec<String>,
    pub upload_logs: bool,
    pub test_run_config: TestRunConfig,
    pub is_existing_test_run: bool,
    pub test_run_id: Option<u64>,
    pub complete_existing_run: bool,
    pub test_case_id_matcher: Vec<String>,
    pub test_case_id_zone: CaseIdZone,
    pub batch_size: usize,
    pub page_size: usize,
    pub max_pages: usize,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub test_case_summary: TestCaseSummaryConfig,
    pub logging: bool,
    pub is_disabled: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            org_url: String::new(),
            token: String::new(),
            project_name: String::new(),
            plan_id: 0,
            auth_scheme: AuthScheme::default(),
            publish_mode: PublishMode::default(),
            test_run_title: DEFAULT_RUN_TITLE.to_string(),
            environment: None,
            upload_attachments: false,
            attachments_type: vec!["screenshot".to_string()],
            upload_logs: false,
            test_run_config: TestRunConfig::default(),
            is_existing_test_run: false,
            test_run_id: None,
            complete_existing_run: false,
            test_case_id_matcher: vec![DEFAULT_CASE_ID_PATTERN.to_string()],
            test_case_id_zone: CaseIdZone::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            test_case_summary: TestCaseSummaryConfig::default(),
            logging: false,
            is_disabled: false,
        }
    }
}

#[derive(Debug, Error)]
/// Enumerates configuration problems that disable publishing.
pub enum ConfigError {
    #[error("missing required option '{0}'")]
    MissingOption(&'static str),
    #[error("option 'planId' must be greater than 0")]
    InvalidPlanId,
    #[error("option '{0}' must be greater than 0")]
    ZeroValue(&'static str),
    #[error("option 'orgUrl' must be an http(s) url, got '{0}'")]
    InvalidOrgUrl(String),
    #[error("an existing run id is required: set 'testRunId' or {RUN_ID_ENV}")]
    MissingExistingRunId,
    #[error(transparent)]
    Pattern(#[from] CoreError),
}

impl ReporterConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse reporter config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reporter config {}", path.display()))?;
        let parsed = if path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
        {
            serde_json::from_str(&raw).context("failed to parse reporter config")?
        } else {
            Self::from_toml_str(&raw)?
        };
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.org_url.trim().is_empty() {
            return Err(ConfigError::MissingOption("orgUrl"));
        }
        let org_url = self.org_url.trim();
        if !(org_url.starts_with("http://") || org_url.starts_with("https://")) {
            return Err(ConfigError::InvalidOrgUrl(self.org_url.clone()));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingOption("token"));
        }
        if self.project_name.trim().is_empty() {
            return Err(ConfigError::MissingOption("projectName"));
        }
        if self.plan_id == 0 {
            return Err(ConfigError::InvalidPlanId);
        }
        for (name, value) in [
            ("batchSize", self.batch_size),
            ("pageSize", self.page_size),
            ("maxPages", self.max_pages),
            ("retryMaxAttempts", self.retry_max_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }
        if self.attaches_to_existing_run() && self.existing_run_id().is_none() {
            return Err(ConfigError::MissingExistingRunId);
        }
        self.case_id_matcher()?;
        self.attachment_matcher()?;
        Ok(())
    }

    /// Existing-run mode always attaches; other modes attach when asked to.
    pub fn attaches_to_existing_run(&self) -> bool {
        self.is_existing_test_run || self.publish_mode == PublishMode::ExistingRun
    }

    /// Configured run id, falling back to the process environment.
    pub fn existing_run_id(&self) -> Option<u64> {
        self.test_run_id.or_else(|| {
            std::env::var(RUN_ID_ENV)
                .ok()
                .and_then(|value| value.trim().parse().ok())
        })
    }

    /// Whether the run is marked completed once every publish has settled.
    pub fn completes_run(&self) -> bool {
        !self.attaches_to_existing_run() || self.complete_existing_run
    }

    pub fn run_title(&self) -> String {
        match self
            .environment
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(environment) => format!("[{environment}]: {}", self.test_run_title),
            None => self.test_run_title.clone(),
        }
    }

    pub fn configuration_ids(&self) -> Vec<u64> {
        if self.test_run_config.configuration_ids.is_empty() {
            vec![DEFAULT_CONFIGURATION_ID]
        } else {
            self.test_run_config.configuration_ids.clone()
        }
    }

    /// Test points are filtered by configuration only when ids were configured explicitly.
    pub fn configuration_filter(&self) -> Option<HashSet<u64>> {
        if self.test_run_config.configuration_ids.is_empty() {
            None
        } else {
            Some(
                self.test_run_config
                    .configuration_ids
                    .iter()
                    .copied()
                    .collect(),
            )
        }
    }

    pub fn case_id_matcher(&self) -> Result<CaseIdMatcher, CoreError> {
        CaseIdMatcher::new(self.test_case_id_matcher.iter().map(String::as_str))
    }

    pub fn attachment_matcher(&self) -> Result<AttachmentMatcher, CoreError> {
        AttachmentMatcher::new(self.attachments_type.iter().map(String::as_str))
    }

    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.page_size, self.max_pages)
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            org_url: self.org_url.trim().to_string(),
            project: self.project_name.trim().to_string(),
            token: self.token.clone(),
            auth_scheme: self.auth_scheme,
            request_timeout_ms: self.request_timeout_ms,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
        }
    }
}

/// Picks among several candidate points for one local test.
pub type PointMapper = Arc<dyn Fn(&LocalTestIdentity, &[TestPoint]) -> Vec<TestPoint> + Send + Sync>;

#[derive(Clone, Default)]
/// Configuration plus the options that cannot be expressed in a config file.
pub struct ReporterOptions {
    pub config: ReporterConfig,
    pub point_mapper: Option<PointMapper>,
}

impl ReporterOptions {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            point_mapper: None,
        }
    }

    pub fn with_point_mapper(mut self, mapper: PointMapper) -> Self {
        self.point_mapper = Some(mapper);
        self
    }
}
