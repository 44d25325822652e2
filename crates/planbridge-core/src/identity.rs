use rand::Rng;

use crate::case_ids::{CaseIdMatcher, CaseIdZone};
use crate::test_result::LocalTest;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Derived view of a local test used for publishing and in-flight tracking.
pub struct LocalTestIdentity {
    pub title: String,
    /// Random short id plus title; distinct across retries of the same title.
    pub alias: String,
    pub case_ids: Vec<String>,
}

impl LocalTestIdentity {
    pub fn new(title: impl Into<String>, case_ids: Vec<String>) -> Self {
        let title = title.into();
        Self {
            alias: generate_alias(&title),
            title,
            case_ids,
        }
    }

    pub fn from_test(test: &LocalTest, matcher: &CaseIdMatcher, zone: CaseIdZone) -> Self {
        Self::new(test.title.clone(), matcher.extract_from_test(test, zone))
    }

    /// Tests without case ids are never sent to the remote service.
    pub fn is_publishable(&self) -> bool {
        !self.case_ids.is_empty()
    }
}

/// Eight lowercase hex characters from the thread-local RNG.
pub fn random_hex_id() -> String {
    let value: u32 = rand::rng().random();
    format!("{value:08x}")
}

pub fn generate_alias(title: &str) -> String {
    format!("{}-{}", random_hex_id(), title)
}
