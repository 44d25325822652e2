//! Host-facing reporter: the three lifecycle hooks and the pipeline behind them.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use planbridge_core::case_ids::CaseIdMatcher;
use planbridge_core::identity::LocalTestIdentity;
use planbridge_core::test_result::{LocalTest, TestResult};

use crate::api::TestPlanApi;
use crate::api_types::{
    AttachmentRequest, IdentityRef, RunCreateModel, ShallowReference, GENERAL_ATTACHMENT_TYPE,
};
use crate::attachments::AttachmentUploader;
use crate::config::{ConfigError, PublishMode, ReporterConfig, ReporterOptions, RUN_ID_ENV};
use crate::http_client::HttpTestPlanClient;
use crate::in_flight::InFlightRegistry;
use crate::point_resolver::PointResolver;
use crate::publisher::{CompletedTest, Publisher, PublisherSettings};
use crate::run_lifecycle::{RunLifecycle, RunPhase, RunSetupFailure};
use crate::summary::{
    render_summary_markdown, write_summary, PublishSummary, SummaryCollector, UnmatchedReason,
};

const SUMMARY_FILE_NAME: &str = "test-case-summary.md";

#[async_trait]
/// Lifecycle callbacks invoked by the host test runner. None of them fail:
/// problems are logged and, when they affect the whole run, disable publishing.
pub trait ReporterHooks: Send + Sync {
    async fn on_begin(&self);

    async fn on_test_end(&self, test: &LocalTest, result: &TestResult);

    async fn on_end(&self);
}

struct Pipeline {
    config: ReporterConfig,
    api: Arc<dyn TestPlanApi>,
    lifecycle: Arc<RunLifecycle>,
    publisher: Arc<Publisher>,
    registry: Arc<InFlightRegistry>,
    summary: Arc<SummaryCollector>,
    matcher: CaseIdMatcher,
}

impl Pipeline {
    fn build(options: ReporterOptions, api: Arc<dyn TestPlanApi>) -> Result<Self, ConfigError> {
        let ReporterOptions {
            config,
            point_mapper,
        } = options;
        config.validate()?;
        let matcher = config.case_id_matcher()?;
        let uploader = if config.upload_attachments {
            Some(AttachmentUploader::new(
                api.clone(),
                config.attachment_matcher()?,
                config.upload_logs,
            ))
        } else {
            None
        };

        let paginator = config.paginator();
        let lifecycle = Arc::new(RunLifecycle::new(api.clone(), config.project_name.trim()));
        let summary = Arc::new(SummaryCollector::default());
        let resolver = PointResolver::new(
            api.clone(),
            config.plan_id,
            config.configuration_filter(),
            paginator,
            point_mapper,
        );
        let publisher = Arc::new(Publisher::new(
            api.clone(),
            lifecycle.clone(),
            resolver,
            uploader,
            summary.clone(),
            PublisherSettings {
                batch_size: config.batch_size,
                paginator,
                logging: config.logging,
            },
        ));

        Ok(Self {
            config,
            api,
            lifecycle,
            publisher,
            registry: InFlightRegistry::new(),
            summary,
            matcher,
        })
    }

    fn run_create_model(&self) -> RunCreateModel {
        let run_config = &self.config.test_run_config;
        RunCreateModel {
            name: self.config.run_title(),
            automated: true,
            plan: ShallowReference::new(self.config.plan_id),
            configuration_ids: self.config.configuration_ids(),
            owner: run_config.owner.clone().map(|display_name| IdentityRef { display_name }),
            comment: run_config.comment.clone(),
            custom_test_fields: Vec::new(),
        }
        .with_custom_fields(&run_config.custom_fields)
    }

    async fn emit_summary(&self) {
        let settings = &self.config.test_case_summary;
        if !settings.enabled {
            return;
        }
        let rendered = render_summary_markdown(&self.summary.snapshot());
        tracing::info!(summary = %rendered, "test case publishing summary");

        if let Some(path) = settings.output_path.as_deref() {
            if let Err(error) = write_summary(path, &rendered) {
                tracing::warn!(error = %format!("{error:#}"), "failed to write summary file");
            }
        }
        if settings.publish_to_run {
            let Some(run_id) = self.lifecycle.run_id() else {
                return;
            };
            let request = AttachmentRequest {
                stream: STANDARD.encode(rendered.as_bytes()),
                file_name: SUMMARY_FILE_NAME.to_string(),
                comment: "Test case publishing summary".to_string(),
                attachment_type: GENERAL_ATTACHMENT_TYPE.to_string(),
            };
            if let Err(error) = self.api.create_run_attachment(run_id, &request).await {
                tracing::warn!(run_id, error = %error, "failed to attach summary to run");
            }
        }
    }
}

/// Publishes runner outcomes to a remote test plan.
pub struct PlanReporter {
    pipeline: Option<Pipeline>,
}

impl PlanReporter {
    /// Build a reporter talking HTTP to the configured organisation.
    pub fn new(options: ReporterOptions) -> Self {
        if options.config.is_disabled {
            return Self::disabled();
        }
        if let Err(error) = options.config.validate() {
            tracing::error!(error = %error, "invalid reporter configuration; publishing disabled");
            return Self::disabled();
        }
        match HttpTestPlanClient::new(options.config.api_client_config()) {
            Ok(client) => Self::with_api(options, Arc::new(client)),
            Err(error) => {
                tracing::error!(error = %error, "failed to build api client; publishing disabled");
                Self::disabled()
            }
        }
    }

    /// Build a reporter on top of an existing API implementation.
    pub fn with_api(options: ReporterOptions, api: Arc<dyn TestPlanApi>) -> Self {
        if options.config.is_disabled {
            return Self::disabled();
        }
        match Pipeline::build(options, api) {
            Ok(pipeline) => Self {
                pipeline: Some(pipeline),
            },
            Err(error) => {
                tracing::error!(error = %error, "invalid reporter configuration; publishing disabled");
                Self::disabled()
            }
        }
    }

    fn disabled() -> Self {
        Self { pipeline: None }
    }

    pub fn is_disabled(&self) -> bool {
        match self.pipeline.as_ref() {
            Some(pipeline) => pipeline.lifecycle.is_disabled(),
            None => true,
        }
    }

    pub fn run_id(&self) -> Option<u64> {
        self.pipeline
            .as_ref()
            .and_then(|pipeline| pipeline.lifecycle.run_id())
    }

    pub fn run_phase(&self) -> Option<RunPhase> {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.lifecycle.phase())
    }

    /// Number of tests with at least one published result.
    pub fn published_count(&self) -> usize {
        self.pipeline
            .as_ref()
            .map_or(0, |pipeline| pipeline.summary.published_count())
    }

    pub fn in_flight_count(&self) -> usize {
        self.pipeline
            .as_ref()
            .map_or(0, |pipeline| pipeline.registry.len())
    }

    pub fn summary(&self) -> PublishSummary {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.summary.snapshot())
            .unwrap_or_default()
    }
}

/// Export the run id for collaborating processes. Only called from
/// `on_begin`, before any publish task is spawned, since the process
/// environment is not synchronized with readers on other threads.
fn export_run_id(run_id: u64) {
    std::env::set_var(RUN_ID_ENV, run_id.to_string());
}

#[async_trait]
impl ReporterHooks for PlanReporter {
    async fn on_begin(&self) {
        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };
        let config = &pipeline.config;
        if config.attaches_to_existing_run() {
            let attached = match config.existing_run_id() {
                Some(run_id) => pipeline.lifecycle.attach(run_id),
                None => {
                    let failure =
                        RunSetupFailure::Configuration(ConfigError::MissingExistingRunId.to_string());
                    pipeline.lifecycle.disable(failure.clone());
                    Err(failure)
                }
            };
            match attached {
                Ok(run_id) => {
                    export_run_id(run_id);
                    chatter!(config.logging, run_id, "attached to existing test run");
                }
                Err(failure) => tracing::error!(error = %failure, "publishing disabled"),
            }
            return;
        }

        match pipeline.lifecycle.create(pipeline.run_create_model()).await {
            Ok(run_id) => {
                export_run_id(run_id);
                chatter!(
                    config.logging,
                    run_id,
                    title = %config.run_title(),
                    mode = config.publish_mode.as_str(),
                    "test run created"
                );
            }
            Err(failure) => tracing::error!(error = %failure, "publishing disabled"),
        }
    }

    async fn on_test_end(&self, test: &LocalTest, result: &TestResult) {
        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };
        if pipeline.lifecycle.is_disabled() {
            return;
        }
        let identity =
            LocalTestIdentity::from_test(test, &pipeline.matcher, pipeline.config.test_case_id_zone);
        if !identity.is_publishable() {
            chatter!(
                pipeline.config.logging,
                test = %identity.title,
                "no test case ids found; result not published"
            );
            pipeline
                .summary
                .record_unmatched(&identity.title, &[], UnmatchedReason::NoCaseIds);
            return;
        }

        let completed = CompletedTest {
            identity,
            result: result.clone(),
        };
        match pipeline.config.publish_mode {
            PublishMode::TestResult => {
                let Some(guard) = pipeline.registry.track(&completed.identity.alias) else {
                    tracing::debug!(alias = %completed.identity.alias, "publish already in flight");
                    return;
                };
                tokio::spawn(pipeline.publisher.clone().publish_tracked(guard, completed));
            }
            PublishMode::TestRun | PublishMode::ExistingRun => pipeline.publisher.enqueue(completed),
        }
    }

    async fn on_end(&self) {
        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };
        if pipeline.lifecycle.phase() == RunPhase::Uninitialized {
            pipeline.lifecycle.disable(RunSetupFailure::Other(
                "suite ended before the test run was set up".to_string(),
            ));
        }

        match pipeline.config.publish_mode {
            PublishMode::TestResult => pipeline.registry.wait_drained().await,
            PublishMode::TestRun => pipeline.publisher.flush_batch().await,
            PublishMode::ExistingRun => pipeline.publisher.flush_existing_run().await,
        }
        pipeline.emit_summary().await;

        let summary = pipeline.summary.snapshot();
        chatter!(
            pipeline.config.logging,
            published = summary.published,
            unmatched = summary.unmatched.len(),
            failed = summary.failed.len(),
            "publishing finished"
        );

        if pipeline.config.completes_run() && pipeline.lifecycle.run_id().is_some() {
            match pipeline.lifecycle.complete().await {
                Ok(()) => chatter!(
                    pipeline.config.logging,
                    run_id = ?pipeline.lifecycle.run_id(),
                    "test run completed"
                ),
                Err(error) => tracing::error!(error = %error, "failed to complete test run"),
            }
        }
    }
}
