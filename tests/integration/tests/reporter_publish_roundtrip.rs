use std::sync::Arc;

use httpmock::prelude::*;
use planbridge_core::outcome::TestStatus;
use planbridge_core::test_result::{LocalTest, TestAttachment, TestResult};
use planbridge_runtime::{
    ApiClientConfig, HttpTestPlanClient, PlanReporter, PublishMode, ReporterConfig,
    ReporterHooks, ReporterOptions, RunPhase, RUN_ID_ENV,
};
use serde_json::json;

const PROJECT_PATH: &str = "/org/_apis/projects/SampleProject";
const TEST_API: &str = "/org/SampleProject/_apis/test";

fn config(server: &MockServer) -> ReporterConfig {
    ReporterConfig {
        org_url: format!("{}/org", server.base_url()),
        token: "secret".to_string(),
        project_name: "SampleProject".to_string(),
        plan_id: 4,
        test_run_title: "Nightly".to_string(),
        environment: Some("QA".to_string()),
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
        request_timeout_ms: 5_000,
        ..ReporterConfig::default()
    }
}

fn failed_result() -> TestResult {
    TestResult::new(TestStatus::Failed, 42).with_error(
        "\u{1b}[31mexpected true, received false\u{1b}[39m",
        Some("\u{1b}[2mat checkout.spec.ts:12:5\u{1b}[22m".to_string()),
    )
}

fn mock_project(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path(PROJECT_PATH)
            .header("authorization", "Basic OnNlY3JldA==");
        then.status(200)
            .json_body(json!({"id": "p-1", "name": "SampleProject"}));
    })
}

fn mock_create_run(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{TEST_API}/runs"))
            .json_body_includes(json!({
                "name": "[QA]: Nightly",
                "automated": true,
                "plan": {"id": "4"},
                "configurationIds": [1]
            }).to_string());
        then.status(200)
            .json_body(json!({"id": 150, "name": "[QA]: Nightly", "state": "InProgress"}));
    })
}

fn mock_points(server: &MockServer, points: serde_json::Value) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{TEST_API}/points"))
            .query_param("$skip", "0")
            .query_param("$top", "200");
        then.status(200).json_body(json!({ "points": points }));
    })
}

fn mock_complete_run(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{TEST_API}/runs/150"))
            .json_body(json!({"state": "Completed"}));
        then.status(200)
            .json_body(json!({"id": 150, "name": "[QA]: Nightly", "state": "Completed"}));
    })
}

fn point(id: u64, case_id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "testPlan": {"id": "4"},
        "testCase": {"id": case_id},
        "configuration": {"id": "1"}
    })
}

#[tokio::test]
async fn integration_failed_test_is_published_with_clean_error_and_run_completed() {
    let server = MockServer::start();
    let project = mock_project(&server);
    let create_run = mock_create_run(&server);
    let points = mock_points(&server, json!([point(11, "3"), point(12, "99")]));
    let results = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{TEST_API}/Runs/150/results"))
            .query_param("api-version", "5.0")
            .body_includes("\"testPoint\":{\"id\":\"11\"}")
            .body_includes("\"outcome\":\"Failed\"")
            .body_includes("\"state\":\"Completed\"")
            .body_includes("\"errorMessage\":\"expected true, received false\"")
            .body_includes("\"stackTrace\":\"at checkout.spec.ts:12:5\"");
        then.status(200).json_body(json!({
            "count": 1,
            "value": [{"id": 100000, "testPoint": {"id": "11"}}]
        }));
    });
    let complete = mock_complete_run(&server);

    let reporter = PlanReporter::new(ReporterOptions::new(config(&server)));
    reporter.on_begin().await;
    assert_eq!(reporter.run_id(), Some(150));
    assert_eq!(std::env::var(RUN_ID_ENV).ok().as_deref(), Some("150"));

    reporter
        .on_test_end(&LocalTest::new("[3] foobar"), &failed_result())
        .await;
    reporter.on_end().await;

    project.assert();
    create_run.assert();
    points.assert();
    results.assert();
    complete.assert();
    assert_eq!(reporter.in_flight_count(), 0);
    assert_eq!(reporter.published_count(), 1);
    assert_eq!(reporter.run_phase(), Some(RunPhase::Completed));
}

#[tokio::test]
async fn integration_batch_mode_submits_once_and_attaches_to_returned_results() {
    let server = MockServer::start();
    let _project = mock_project(&server);
    let _create_run = mock_create_run(&server);
    let points = mock_points(&server, json!([point(11, "3"), point(12, "8")]));
    let results = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{TEST_API}/Runs/150/results"))
            .query_param("api-version", "5.0");
        then.status(200).json_body(json!({
            "count": 2,
            "value": [
                {"id": 100000, "testPoint": {"id": "11"}},
                {"id": 100001, "testPoint": {"id": "12"}}
            ]
        }));
    });
    let listed = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{TEST_API}/Runs/150/results"))
            .query_param("$skip", "0");
        then.status(200).json_body(json!({
            "count": 2,
            "value": [
                {"id": 100000, "testPoint": {"id": "11"}},
                {"id": 100001, "testPoint": {"id": "12"}}
            ]
        }));
    });
    let attachment = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{TEST_API}/Runs/150/Results/100000/attachments"))
            .query_param("api-version", "7.1-preview.1")
            .body_includes("\"attachmentType\":\"GeneralAttachment\"")
            .body_includes("\"stream\":\"cG5nLWJ5dGVz\"");
        then.status(200)
            .json_body(json!({"id": 1, "url": "https://dev.example.com/attachments/1"}));
    });
    let complete = mock_complete_run(&server);

    let mut config = config(&server);
    config.publish_mode = PublishMode::TestRun;
    config.upload_attachments = true;
    let reporter = PlanReporter::new(ReporterOptions::new(config));

    reporter.on_begin().await;
    let first = failed_result().with_attachment(TestAttachment {
        name: "screenshot".to_string(),
        content_type: Some("image/png".to_string()),
        path: None,
        body: Some(b"png-bytes".to_vec()),
    });
    reporter
        .on_test_end(&LocalTest::new("[3] checkout"), &first)
        .await;
    reporter
        .on_test_end(
            &LocalTest::new("[8] login"),
            &TestResult::new(TestStatus::Passed, 5),
        )
        .await;
    reporter.on_end().await;

    points.assert_calls(1);
    results.assert_calls(1);
    listed.assert_calls(0);
    attachment.assert_calls(1);
    complete.assert();
    assert_eq!(reporter.published_count(), 2);
}

#[tokio::test]
async fn integration_missing_project_disables_every_submission() {
    let server = MockServer::start();
    let project = server.mock(|when, then| {
        when.method(GET).path(PROJECT_PATH);
        then.status(404).body("project not found");
    });
    let create_run = mock_create_run(&server);
    let points = mock_points(&server, json!([point(11, "3")]));
    let complete = mock_complete_run(&server);

    let reporter = PlanReporter::new(ReporterOptions::new(config(&server)));
    reporter.on_begin().await;
    assert!(reporter.is_disabled());
    reporter
        .on_test_end(&LocalTest::new("[3] foobar"), &failed_result())
        .await;
    reporter.on_end().await;

    project.assert();
    create_run.assert_calls(0);
    points.assert_calls(0);
    complete.assert_calls(0);
    assert_eq!(reporter.run_phase(), Some(RunPhase::Failed));
}

#[tokio::test]
async fn integration_existing_run_results_are_updated_in_place() {
    let server = MockServer::start();
    let project = mock_project(&server);
    let _points = mock_points(&server, json!([point(11, "3")]));
    let listed = server.mock(|when, then| {
        when.method(GET).path(format!("{TEST_API}/Runs/150/results"));
        then.status(200).json_body(json!({
            "count": 1,
            "value": [{"id": 900, "testPoint": {"id": "11"}, "outcome": "Unspecified"}]
        }));
    });
    let updated = server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{TEST_API}/Runs/150/results"))
            .body_includes("\"id\":900")
            .body_includes("\"outcome\":\"Failed\"")
            .body_includes("\"comment\":\"status: timedOut\"");
        then.status(200)
            .json_body(json!({"count": 1, "value": [{"id": 900}]}));
    });
    let complete = mock_complete_run(&server);

    let mut config = config(&server);
    config.publish_mode = PublishMode::ExistingRun;
    config.test_run_id = Some(150);
    let reporter = PlanReporter::new(ReporterOptions::new(config));

    reporter.on_begin().await;
    reporter
        .on_test_end(
            &LocalTest::new("[3] foobar"),
            &TestResult::new(TestStatus::TimedOut, 30_000),
        )
        .await;
    reporter.on_end().await;

    project.assert_calls(0);
    listed.assert_calls(1);
    updated.assert_calls(1);
    complete.assert_calls(0);
    assert_eq!(reporter.published_count(), 1);
}

#[tokio::test]
async fn integration_http_client_shares_run_with_collaborating_reporter() {
    let server = MockServer::start();
    let points = mock_points(&server, json!([point(11, "3")]));
    let client = HttpTestPlanClient::new(ApiClientConfig {
        org_url: format!("{}/org", server.base_url()),
        project: "SampleProject".to_string(),
        token: "secret".to_string(),
        auth_scheme: planbridge_runtime::AuthScheme::Pat,
        request_timeout_ms: 5_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("client");

    let mut config = config(&server);
    config.is_existing_test_run = true;
    config.test_run_id = Some(150);
    let results = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{TEST_API}/Runs/150/results"))
            .query_param("api-version", "5.0");
        then.status(200).json_body(json!({
            "count": 1,
            "value": [{"id": 100000, "testPoint": {"id": "11"}}]
        }));
    });
    let reporter = PlanReporter::with_api(ReporterOptions::new(config), Arc::new(client));
    reporter.on_begin().await;
    reporter
        .on_test_end(
            &LocalTest::new("[3] foobar"),
            &TestResult::new(TestStatus::Passed, 1),
        )
        .await;
    reporter.on_end().await;

    points.assert();
    results.assert();
    assert_eq!(reporter.run_id(), Some(150));
    assert_eq!(reporter.run_phase(), Some(RunPhase::Ready));
}
