//! Outcome reconciler: turns completed tests into remote result records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use planbridge_core::identity::LocalTestIdentity;
use planbridge_core::outcome::{outcome_loses_status, RemoteOutcome};
use planbridge_core::pagination::{chunk_items, Paginator};
use planbridge_core::test_points::TestPoint;
use planbridge_core::test_result::TestResult;
use planbridge_core::text::{strip_ansi, truncate_for_error};

use crate::api::TestPlanApi;
use crate::api_types::{
    RemoteTestResult, ResultPayload, ResultUpdatePayload, ShallowReference,
    RESULT_STATE_COMPLETED,
};
use crate::attachments::AttachmentUploader;
use crate::in_flight::InFlightGuard;
use crate::lock_or_recover;
use crate::point_resolver::PointResolver;
use crate::run_lifecycle::RunLifecycle;
use crate::summary::{SummaryCollector, UnmatchedReason};

const FAILURE_TEXT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone)]
/// A local test paired with its outcome, waiting to be published.
pub struct CompletedTest {
    pub identity: LocalTestIdentity,
    pub result: TestResult,
}

#[derive(Debug)]
struct SubmittedTest {
    point_ids: Vec<u64>,
    result_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherSettings {
    pub batch_size: usize,
    pub paginator: Paginator,
    pub logging: bool,
}

fn error_fields(result: &TestResult) -> (Option<String>, Option<String>) {
    let Some(error) = result.error.as_ref() else {
        return (None, None);
    };
    let clean = |text: &Option<String>| {
        text.as_deref()
            .map(strip_ansi)
            .filter(|text| !text.trim().is_empty())
    };
    (clean(&error.message), clean(&error.stack))
}

fn status_comment(result: &TestResult) -> Option<String> {
    outcome_loses_status(result.status).then(|| format!("status: {}", result.status.as_str()))
}

/// Result payload for one resolved test point, with ANSI codes stripped.
pub fn build_result_payload(point: &TestPoint, completed: &CompletedTest) -> ResultPayload {
    let (error_message, stack_trace) = error_fields(&completed.result);
    ResultPayload {
        test_point: ShallowReference::new(point.id),
        test_case_title: completed.identity.title.clone(),
        outcome: RemoteOutcome::from(completed.result.status),
        state: RESULT_STATE_COMPLETED.to_string(),
        duration_in_ms: completed.result.duration_ms,
        error_message,
        stack_trace,
        comment: status_comment(&completed.result),
    }
}

pub fn build_result_update(result_id: u64, completed: &CompletedTest) -> ResultUpdatePayload {
    let (error_message, stack_trace) = error_fields(&completed.result);
    ResultUpdatePayload {
        id: result_id,
        outcome: RemoteOutcome::from(completed.result.status),
        state: RESULT_STATE_COMPLETED.to_string(),
        duration_in_ms: completed.result.duration_ms,
        error_message,
        stack_trace,
        comment: status_comment(&completed.result),
    }
}

/// Newest remote result id per test point id.
pub fn latest_result_by_point(results: &[RemoteTestResult]) -> HashMap<u64, u64> {
    let mut latest = HashMap::new();
    for result in results {
        let Some(point_id) = result.test_point_id() else {
            continue;
        };
        latest
            .entry(point_id)
            .and_modify(|id: &mut u64| *id = (*id).max(result.id))
            .or_insert(result.id);
    }
    latest
}

/// Publishes results in per-test, batch or existing-run fashion.
pub struct Publisher {
    api: Arc<dyn TestPlanApi>,
    lifecycle: Arc<RunLifecycle>,
    resolver: PointResolver,
    uploader: Option<AttachmentUploader>,
    summary: Arc<SummaryCollector>,
    pending: Mutex<Vec<CompletedTest>>,
    settings: PublisherSettings,
}

impl Publisher {
    pub fn new(
        api: Arc<dyn TestPlanApi>,
        lifecycle: Arc<RunLifecycle>,
        resolver: PointResolver,
        uploader: Option<AttachmentUploader>,
        summary: Arc<SummaryCollector>,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            api,
            lifecycle,
            resolver,
            uploader,
            summary,
            pending: Mutex::new(Vec::new()),
            settings,
        }
    }

    /// Resolve and submit one test. Returns the number of results created;
    /// `0` when publishing is disabled or no point matched.
    pub async fn publish_one(&self, completed: &CompletedTest) -> Result<usize> {
        let Some(run_id) = self.lifecycle.wait_for_run_id().await else {
            return Ok(0);
        };
        let identity = &completed.identity;
        let mut resolved = self
            .resolver
            .resolve_tests(&[identity])
            .await
            .context("failed to resolve test points")?;
        let points = resolved.remove(&identity.alias).unwrap_or_default();
        if points.is_empty() {
            self.report_no_points(identity);
            return Ok(0);
        }

        let payloads = points
            .iter()
            .map(|point| build_result_payload(point, completed))
            .collect::<Vec<_>>();
        let created = self
            .api
            .add_results(run_id, &payloads)
            .await
            .context("failed to submit test results")?;
        self.summary.record_published(created.len());
        chatter!(
            self.settings.logging,
            test = %identity.title,
            run_id,
            results = created.len(),
            "published test result"
        );

        let result_ids = created.iter().map(|result| result.id).collect::<Vec<_>>();
        self.upload_attachments(run_id, completed, &result_ids).await;
        Ok(created.len())
    }

    /// Publish one test and release its in-flight entry however it settles.
    pub async fn publish_tracked(self: Arc<Self>, guard: InFlightGuard, completed: CompletedTest) {
        if let Err(error) = self.publish_one(&completed).await {
            self.report_failure(&completed.identity, &error);
        }
        tracing::debug!(alias = guard.alias(), "publish settled");
        drop(guard);
    }

    /// Hold a completed test until the end-of-suite flush.
    pub fn enqueue(&self, completed: CompletedTest) {
        lock_or_recover(&self.pending).push(completed);
    }

    pub fn pending_len(&self) -> usize {
        lock_or_recover(&self.pending).len()
    }

    fn take_pending(&self) -> Vec<CompletedTest> {
        std::mem::take(&mut *lock_or_recover(&self.pending))
    }

    /// Submit every queued test in chunks: one point query and one results
    /// call per chunk, then attach artifacts to the created results.
    pub async fn flush_batch(&self) {
        let pending = self.take_pending();
        if pending.is_empty() {
            return;
        }
        let Some(run_id) = self.lifecycle.wait_for_run_id().await else {
            return;
        };

        let mut published = Vec::new();
        for chunk in chunk_items(pending, self.settings.batch_size) {
            match self.submit_chunk(run_id, &chunk).await {
                Ok(submitted) => {
                    for (completed, submitted) in chunk.into_iter().zip(submitted) {
                        if !submitted.point_ids.is_empty() {
                            self.summary.record_published(submitted.point_ids.len());
                            published.push((completed, submitted));
                        }
                    }
                }
                Err(error) => {
                    for completed in &chunk {
                        self.report_failure(&completed.identity, &error);
                    }
                }
            }
        }
        chatter!(
            self.settings.logging,
            run_id,
            tests = published.len(),
            "published batched test results"
        );
        self.upload_batch_attachments(run_id, published).await;
    }

    /// Returns, per test of the chunk, the points that received a result and
    /// the created result ids when the response lists one per payload.
    async fn submit_chunk(&self, run_id: u64, chunk: &[CompletedTest]) -> Result<Vec<SubmittedTest>> {
        let identities = chunk
            .iter()
            .map(|completed| &completed.identity)
            .collect::<Vec<_>>();
        let mut resolved = self
            .resolver
            .resolve_tests(&identities)
            .await
            .context("failed to resolve test points for batch")?;

        let mut payloads = Vec::new();
        let mut submitted = Vec::with_capacity(chunk.len());
        for completed in chunk {
            let points = resolved
                .remove(&completed.identity.alias)
                .unwrap_or_default();
            if points.is_empty() {
                self.report_no_points(&completed.identity);
            }
            payloads.extend(
                points
                    .iter()
                    .map(|point| build_result_payload(point, completed)),
            );
            submitted.push(SubmittedTest {
                point_ids: points.iter().map(|point| point.id).collect(),
                result_ids: None,
            });
        }
        if payloads.is_empty() {
            return Ok(submitted);
        }
        let created = self
            .api
            .add_results(run_id, &payloads)
            .await
            .with_context(|| format!("failed to submit batch of {} results", payloads.len()))?;
        if created.len() == payloads.len() {
            // Results come back in request order.
            let mut created = created.into_iter().map(|result| result.id);
            for test in &mut submitted {
                test.result_ids = Some(created.by_ref().take(test.point_ids.len()).collect());
            }
        } else {
            tracing::debug!(
                run_id,
                submitted = payloads.len(),
                returned = created.len(),
                "result ids missing from submission response"
            );
        }
        Ok(submitted)
    }

    async fn upload_batch_attachments(&self, run_id: u64, published: Vec<(CompletedTest, SubmittedTest)>) {
        let Some(uploader) = self.uploader.as_ref() else {
            return;
        };
        let published = published
            .into_iter()
            .filter(|(completed, _)| uploader.has_candidates(&completed.result))
            .collect::<Vec<_>>();
        if published.is_empty() {
            return;
        }

        let needs_listing = published
            .iter()
            .any(|(_, submitted)| submitted.result_ids.is_none());
        let by_point = if needs_listing {
            match self.list_run_results(run_id).await {
                Ok(results) => Some(latest_result_by_point(&results)),
                Err(error) => {
                    tracing::warn!(
                        run_id,
                        error = %format!("{error:#}"),
                        "failed to locate created results; attachments skipped"
                    );
                    None
                }
            }
        } else {
            None
        };

        for (completed, submitted) in published {
            let result_ids = match (submitted.result_ids, by_point.as_ref()) {
                (Some(result_ids), _) => result_ids,
                (None, Some(by_point)) => submitted
                    .point_ids
                    .iter()
                    .filter_map(|point_id| by_point.get(point_id).copied())
                    .collect(),
                (None, None) => continue,
            };
            self.upload_attachments(run_id, &completed, &result_ids)
                .await;
        }
    }

    /// Update the results of an externally created run, matched by test point.
    pub async fn flush_existing_run(&self) {
        let pending = self.take_pending();
        if pending.is_empty() {
            return;
        }
        let Some(run_id) = self.lifecycle.wait_for_run_id().await else {
            return;
        };
        let existing = match self.list_run_results(run_id).await {
            Ok(existing) => existing,
            Err(error) => {
                let error = error.context("failed to list results of existing run");
                for completed in &pending {
                    self.report_failure(&completed.identity, &error);
                }
                return;
            }
        };
        let by_point = latest_result_by_point(&existing);

        for chunk in chunk_items(pending, self.settings.batch_size) {
            let identities = chunk
                .iter()
                .map(|completed| &completed.identity)
                .collect::<Vec<_>>();
            let mut resolved = match self.resolver.resolve_tests(&identities).await {
                Ok(resolved) => resolved,
                Err(error) => {
                    let error = anyhow::Error::new(error).context("failed to resolve test points");
                    for completed in &chunk {
                        self.report_failure(&completed.identity, &error);
                    }
                    continue;
                }
            };

            let mut updates = Vec::new();
            let mut targets = Vec::new();
            for completed in &chunk {
                let result_ids = resolved
                    .remove(&completed.identity.alias)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|point| by_point.get(&point.id).copied())
                    .collect::<Vec<_>>();
                if result_ids.is_empty() {
                    self.report_no_points(&completed.identity);
                    continue;
                }
                updates.extend(
                    result_ids
                        .iter()
                        .map(|result_id| build_result_update(*result_id, completed)),
                );
                targets.push((completed, result_ids));
            }
            if updates.is_empty() {
                continue;
            }

            match self.api.update_results(run_id, &updates).await {
                Ok(_) => {
                    for (completed, result_ids) in targets {
                        self.summary.record_published(result_ids.len());
                        self.upload_attachments(run_id, completed, &result_ids)
                            .await;
                    }
                }
                Err(error) => {
                    let error = anyhow::Error::new(error).context("failed to update existing results");
                    for (completed, _) in targets {
                        self.report_failure(&completed.identity, &error);
                    }
                }
            }
        }
    }

    async fn list_run_results(&self, run_id: u64) -> Result<Vec<RemoteTestResult>> {
        let api = self.api.as_ref();
        self.settings
            .paginator
            .fetch_all(move |page| api.list_results(run_id, page))
            .await
            .with_context(|| format!("failed to list results of run {run_id}"))
    }

    async fn upload_attachments(&self, run_id: u64, completed: &CompletedTest, result_ids: &[u64]) {
        let Some(uploader) = self.uploader.as_ref() else {
            return;
        };
        for result_id in result_ids {
            let urls = uploader
                .upload(run_id, *result_id, &completed.result, &completed.identity)
                .await;
            if !urls.is_empty() {
                chatter!(
                    self.settings.logging,
                    test = %completed.identity.title,
                    result_id,
                    attachments = urls.len(),
                    "uploaded attachments"
                );
            }
        }
    }

    fn report_no_points(&self, identity: &LocalTestIdentity) {
        tracing::warn!(
            test = %identity.title,
            case_ids = %identity.case_ids.join(","),
            "no test points matched; result not published"
        );
        self.summary
            .record_unmatched(&identity.title, &identity.case_ids, UnmatchedReason::NoTestPoints);
    }

    fn report_failure(&self, identity: &LocalTestIdentity, error: &anyhow::Error) {
        let rendered = truncate_for_error(&format!("{error:#}"), FAILURE_TEXT_MAX_CHARS);
        tracing::warn!(test = %identity.title, error = %rendered, "failed to publish test result");
        self.summary.record_failed(&identity.title, &rendered);
    }
}
