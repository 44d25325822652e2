//! Filtering and grouping of remote test points.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Binding of one test case to one configuration within a plan.
pub struct TestPoint {
    pub id: u64,
    pub plan_id: u64,
    pub test_case_id: String,
    pub configuration_id: u64,
}

/// Comparison key for a case id: numeric ids compare by value, so `"03"`
/// and `"3"` name the same case.
pub fn case_id_key(case_id: &str) -> String {
    let trimmed = case_id.trim();
    trimmed
        .parse::<u64>()
        .map(|id| id.to_string())
        .unwrap_or_else(|_| trimmed.to_string())
}

/// Keep only points that belong to `plan_id`, reference one of `case_ids`,
/// and, when a filter is given, use one of the filtered configurations.
pub fn retain_matching_points(
    points: Vec<TestPoint>,
    plan_id: u64,
    case_ids: &HashSet<String>,
    configuration_filter: Option<&HashSet<u64>>,
) -> Vec<TestPoint> {
    let wanted = case_ids
        .iter()
        .map(|case_id| case_id_key(case_id))
        .collect::<HashSet<_>>();
    points
        .into_iter()
        .filter(|point| point.plan_id == plan_id)
        .filter(|point| wanted.contains(&case_id_key(&point.test_case_id)))
        .filter(|point| {
            configuration_filter
                .map(|filter| filter.contains(&point.configuration_id))
                .unwrap_or(true)
        })
        .collect()
}

/// Group points by [`case_id_key`], preserving the order points were returned in.
pub fn group_points_by_case(points: &[TestPoint]) -> BTreeMap<String, Vec<TestPoint>> {
    let mut grouped: BTreeMap<String, Vec<TestPoint>> = BTreeMap::new();
    for point in points {
        grouped
            .entry(case_id_key(&point.test_case_id))
            .or_default()
            .push(point.clone());
    }
    grouped
}

/// Collect the points of one local test: case ids in declaration order, each
/// point at most once.
pub fn points_for_case_ids(
    grouped: &BTreeMap<String, Vec<TestPoint>>,
    case_ids: &[String],
) -> Vec<TestPoint> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for case_id in case_ids {
        let Some(points) = grouped.get(&case_id_key(case_id)) else {
            continue;
        };
        for point in points {
            if seen.insert(point.id) {
                selected.push(point.clone());
            }
        }
    }
    selected
}

/// Case ids in `requested` that have no retained point.
pub fn unmatched_case_ids(
    grouped: &BTreeMap<String, Vec<TestPoint>>,
    requested: &[String],
) -> Vec<String> {
    requested
        .iter()
        .filter(|case_id| !grouped.contains_key(&case_id_key(case_id)))
        .cloned()
        .collect()
}
