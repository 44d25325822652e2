//! Reconciliation summary: what was published and what could not be matched.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    NoCaseIds,
    NoTestPoints,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCaseIds => "no test case ids in title",
            Self::NoTestPoints => "no matching test points",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedTest {
    pub title: String,
    pub case_ids: Vec<String>,
    pub reason: UnmatchedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPublish {
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Snapshot of the reconciliation counters.
pub struct PublishSummary {
    pub published: usize,
    pub published_results: usize,
    pub unmatched: Vec<UnmatchedTest>,
    pub failed: Vec<FailedPublish>,
}

#[derive(Debug, Default)]
/// Thread-safe accumulator shared by every publish path.
pub struct SummaryCollector {
    inner: Mutex<PublishSummary>,
}

impl SummaryCollector {
    pub fn record_published(&self, result_count: usize) {
        let mut summary = lock_or_recover(&self.inner);
        summary.published = summary.published.saturating_add(1);
        summary.published_results = summary.published_results.saturating_add(result_count);
    }

    pub fn record_unmatched(&self, title: &str, case_ids: &[String], reason: UnmatchedReason) {
        lock_or_recover(&self.inner).unmatched.push(UnmatchedTest {
            title: title.to_string(),
            case_ids: case_ids.to_vec(),
            reason,
        });
    }

    pub fn record_failed(&self, title: &str, error: &str) {
        lock_or_recover(&self.inner).failed.push(FailedPublish {
            title: title.to_string(),
            error: error.to_string(),
        });
    }

    pub fn published_count(&self) -> usize {
        lock_or_recover(&self.inner).published
    }

    pub fn snapshot(&self) -> PublishSummary {
        lock_or_recover(&self.inner).clone()
    }
}

pub fn render_summary_markdown(summary: &PublishSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Test case publishing summary");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- published tests: {} ({} results)",
        summary.published, summary.published_results
    );
    let _ = writeln!(out, "- unmatched tests: {}", summary.unmatched.len());
    let _ = writeln!(out, "- failed publishes: {}", summary.failed.len());

    if !summary.unmatched.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Unmatched tests");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Test | Case ids | Reason |");
        let _ = writeln!(out, "| --- | --- | --- |");
        for test in &summary.unmatched {
            let case_ids = if test.case_ids.is_empty() {
                "-".to_string()
            } else {
                test.case_ids.join(", ")
            };
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                escape_cell(&test.title),
                case_ids,
                test.reason.as_str()
            );
        }
    }

    if !summary.failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Failed publishes");
        let _ = writeln!(out);
        for failure in &summary.failed {
            let _ = writeln!(
                out,
                "- {}: {}",
                escape_cell(&failure.title),
                failure.error
            );
        }
    }
    out
}

fn escape_cell(raw: &str) -> String {
    raw.replace('|', "\\|")
}

pub fn write_summary(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, rendered)
        .with_context(|| format!("failed to write summary {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{render_summary_markdown, write_summary, SummaryCollector, UnmatchedReason};

    #[test]
    fn functional_collector_accumulates_counts() {
        let collector = SummaryCollector::default();
        collector.record_published(2);
        collector.record_published(1);
        collector.record_unmatched("untagged", &[], UnmatchedReason::NoCaseIds);
        collector.record_failed("[3] foobar", "status 500");
        let summary = collector.snapshot();
        assert_eq!(summary.published, 2);
        assert_eq!(summary.published_results, 3);
        assert_eq!(collector.published_count(), 2);
        assert_eq!(summary.unmatched.len(), 1);
        assert_eq!(summary.failed[0].error, "status 500");
    }

    #[test]
    fn unit_markdown_lists_unmatched_tests() {
        let collector = SummaryCollector::default();
        collector.record_unmatched(
            "[9] a|b",
            &["9".to_string()],
            UnmatchedReason::NoTestPoints,
        );
        let rendered = render_summary_markdown(&collector.snapshot());
        assert!(rendered.contains("- unmatched tests: 1"));
        assert!(rendered.contains("| [9] a\\|b | 9 | no matching test points |"));
        assert!(!rendered.contains("## Failed publishes"));
    }

    #[test]
    fn integration_write_summary_creates_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("reports").join("summary.md");
        write_summary(&path, "body").expect("write");
        assert_eq!(std::fs::read_to_string(path).expect("read"), "body");
    }
}
