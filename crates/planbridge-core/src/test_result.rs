//! Host-facing data model for one completed local test.

use std::path::PathBuf;

use serde::Deserialize;

use crate::outcome::TestStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Free-form annotation declared on a local test.
pub struct TestAnnotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// The runner's view of a test case.
pub struct LocalTest {
    pub title: String,
    pub title_path: Vec<String>,
    pub annotations: Vec<TestAnnotation>,
    pub tags: Vec<String>,
}

impl LocalTest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Failure detail reported by the runner.
pub struct TestError {
    pub message: Option<String>,
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Artifact produced by a test: either an in-memory body or a file on disk.
pub struct TestAttachment {
    pub name: String,
    pub content_type: Option<String>,
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Outcome of one test attempt.
pub struct TestResult {
    pub status: TestStatus,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<TestError>,
    #[serde(default)]
    pub attachments: Vec<TestAttachment>,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub retry: u32,
}

impl TestResult {
    pub fn new(status: TestStatus, duration_ms: u64) -> Self {
        Self {
            status,
            duration_ms,
            error: None,
            attachments: Vec::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            retry: 0,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>, stack: Option<String>) -> Self {
        self.error = Some(TestError {
            message: Some(message.into()),
            stack,
        });
        self
    }

    pub fn with_attachment(mut self, attachment: TestAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// One test-completion callback as recorded in a JSON-lines event file.
pub struct TestCompletionEvent {
    pub test: LocalTest,
    pub result: TestResult,
}
