//! Extraction of remote test-case ids from local test titles and annotations.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::test_result::LocalTest;
use crate::CoreError;

/// Default matcher: bracketed groups of comma/whitespace separated integers.
pub const DEFAULT_CASE_ID_PATTERN: &str = r"\[([\d,\s]+)\]";

/// Annotation type that carries test case ids when `CaseIdZone::Annotation` is used.
pub const CASE_ID_ANNOTATION_TYPE: &str = "testcase";

static DEFAULT_CASE_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_CASE_ID_PATTERN).expect("default case id pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Where case ids are read from on a local test.
pub enum CaseIdZone {
    #[default]
    Title,
    Annotation,
}

#[derive(Debug, Clone)]
/// Ordered set of regular expressions used to find case ids.
///
/// Each pattern's first capture group (or the whole match when the pattern has
/// no groups) is split on commas and whitespace; every all-digit token becomes
/// one id.
pub struct CaseIdMatcher {
    patterns: Vec<Regex>,
}

impl Default for CaseIdMatcher {
    fn default() -> Self {
        Self {
            patterns: vec![DEFAULT_CASE_ID_REGEX.clone()],
        }
    }
}

impl CaseIdMatcher {
    /// Compile custom matchers. An empty list falls back to the default pattern.
    pub fn new<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Self, CoreError> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(pattern).map_err(|source| CoreError::InvalidCaseIdMatcher {
                pattern: pattern.to_string(),
                source,
            })?;
            compiled.push(regex);
        }
        if compiled.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { patterns: compiled })
    }

    /// Scan `text` and return ids in left-to-right order of appearance,
    /// duplicates preserved.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut located = Vec::new();
        for pattern in &self.patterns {
            for captures in pattern.captures_iter(text) {
                let Some(group) = captures.get(1).or_else(|| captures.get(0)) else {
                    continue;
                };
                located.push((group.start(), split_case_id_group(group.as_str())));
            }
        }
        located.sort_by_key(|(start, _)| *start);
        located.into_iter().flat_map(|(_, ids)| ids).collect()
    }

    /// Extract ids from the configured zone of a local test.
    pub fn extract_from_test(&self, test: &LocalTest, zone: CaseIdZone) -> Vec<String> {
        match zone {
            CaseIdZone::Title => self.extract(&test.title),
            CaseIdZone::Annotation => {
                let mut ids = Vec::new();
                for annotation in &test.annotations {
                    if !annotation
                        .kind
                        .trim()
                        .eq_ignore_ascii_case(CASE_ID_ANNOTATION_TYPE)
                    {
                        continue;
                    }
                    let Some(description) = annotation.description.as_deref() else {
                        continue;
                    };
                    let matched = self.extract(description);
                    if matched.is_empty() {
                        ids.extend(split_case_id_group(description));
                    } else {
                        ids.extend(matched);
                    }
                }
                for tag in &test.tags {
                    ids.extend(self.extract(tag));
                }
                ids
            }
        }
    }
}

/// Extract ids from a title with the default bracket matcher.
pub fn extract_case_ids(title: &str) -> Vec<String> {
    CaseIdMatcher::default().extract(title)
}

fn split_case_id_group(raw: &str) -> Vec<String> {
    raw.split(|ch: char| ch == ',' || ch.is_whitespace())
        .map(str::trim)
        .filter(|token| !token.is_empty() && token.chars().all(|ch| ch.is_ascii_digit()))
        .map(ToOwned::to_owned)
        .collect()
}
