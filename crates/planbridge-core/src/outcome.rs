use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Result status reported by the host runner.
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
    Interrupted,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::TimedOut => "timedOut",
            Self::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Outcome vocabulary understood by the remote test-plan service.
pub enum RemoteOutcome {
    Passed,
    Failed,
    Paused,
}

impl RemoteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Paused => "Paused",
        }
    }
}

impl From<TestStatus> for RemoteOutcome {
    /// `skipped` is reported as `Paused`; `timedOut` and `interrupted` collapse
    /// into `Failed` because the remote vocabulary has no closer match.
    fn from(status: TestStatus) -> Self {
        match status {
            TestStatus::Passed => Self::Passed,
            TestStatus::Failed => Self::Failed,
            TestStatus::Skipped => Self::Paused,
            TestStatus::TimedOut => Self::Failed,
            TestStatus::Interrupted => Self::Failed,
        }
    }
}

/// True when the mapping drops information about the local status.
pub fn outcome_loses_status(status: TestStatus) -> bool {
    matches!(status, TestStatus::TimedOut | TestStatus::Interrupted)
}

#[cfg(test)]
mod tests {
    use super::{outcome_loses_status, RemoteOutcome, TestStatus};

    #[test]
    fn unit_outcome_mapping_table_is_exhaustive() {
        let table = [
            (TestStatus::Passed, RemoteOutcome::Passed),
            (TestStatus::Failed, RemoteOutcome::Failed),
            (TestStatus::Skipped, RemoteOutcome::Paused),
            (TestStatus::TimedOut, RemoteOutcome::Failed),
            (TestStatus::Interrupted, RemoteOutcome::Failed),
        ];
        for (status, expected) in table {
            assert_eq!(RemoteOutcome::from(status), expected, "{}", status.as_str());
        }
    }

    #[test]
    fn unit_remote_outcome_serializes_as_pascal_case() {
        let raw = serde_json::to_string(&RemoteOutcome::Paused).expect("serialize");
        assert_eq!(raw, "\"Paused\"");
        let status: TestStatus = serde_json::from_str("\"timedOut\"").expect("deserialize");
        assert_eq!(status, TestStatus::TimedOut);
    }

    #[test]
    fn regression_lossy_statuses_are_flagged() {
        assert!(outcome_loses_status(TestStatus::TimedOut));
        assert!(outcome_loses_status(TestStatus::Interrupted));
        assert!(!outcome_loses_status(TestStatus::Failed));
        assert!(!outcome_loses_status(TestStatus::Skipped));
    }
}
