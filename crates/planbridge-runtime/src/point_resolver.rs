//! Maps local test-case ids to remote test points.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use planbridge_core::identity::LocalTestIdentity;
use planbridge_core::pagination::Paginator;
use planbridge_core::test_points::{
    group_points_by_case, points_for_case_ids, retain_matching_points, TestPoint,
};

use crate::api::{ApiError, TestPlanApi};
use crate::config::PointMapper;

/// Queries, filters and disambiguates test points for a plan.
pub struct PointResolver {
    api: Arc<dyn TestPlanApi>,
    plan_id: u64,
    configuration_filter: Option<HashSet<u64>>,
    paginator: Paginator,
    mapper: Option<PointMapper>,
}

impl PointResolver {
    pub fn new(
        api: Arc<dyn TestPlanApi>,
        plan_id: u64,
        configuration_filter: Option<HashSet<u64>>,
        paginator: Paginator,
        mapper: Option<PointMapper>,
    ) -> Self {
        Self {
            api,
            plan_id,
            configuration_filter,
            paginator,
            mapper,
        }
    }

    /// Fetch every page of points for `case_ids` and keep the ones bound to
    /// this plan and configuration filter, grouped by case id.
    pub async fn resolve_case_ids(
        &self,
        case_ids: &HashSet<String>,
    ) -> Result<BTreeMap<String, Vec<TestPoint>>, ApiError> {
        let numeric_ids = case_ids
            .iter()
            .filter_map(|case_id| case_id.trim().parse::<u64>().ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        if numeric_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let api = self.api.as_ref();
        let ids = numeric_ids.as_slice();
        let wire_points = self
            .paginator
            .fetch_all(move |page| api.query_points(ids, page))
            .await?;
        let points = wire_points
            .into_iter()
            .filter_map(|point| point.into_test_point())
            .collect::<Vec<_>>();
        let retained = retain_matching_points(
            points,
            self.plan_id,
            case_ids,
            self.configuration_filter.as_ref(),
        );
        Ok(group_points_by_case(&retained))
    }

    /// Resolve the points of several tests with one paginated query. The map
    /// is keyed by alias; tests without retained points map to an empty list.
    pub async fn resolve_tests(
        &self,
        tests: &[&LocalTestIdentity],
    ) -> Result<HashMap<String, Vec<TestPoint>>, ApiError> {
        let requested = tests
            .iter()
            .flat_map(|test| test.case_ids.iter().cloned())
            .collect::<HashSet<_>>();
        let grouped = self.resolve_case_ids(&requested).await?;
        Ok(tests
            .iter()
            .map(|test| {
                let candidates = points_for_case_ids(&grouped, &test.case_ids);
                (test.alias.clone(), self.disambiguate(test, candidates))
            })
            .collect())
    }

    fn disambiguate(&self, test: &LocalTestIdentity, candidates: Vec<TestPoint>) -> Vec<TestPoint> {
        if candidates.len() <= 1 {
            return candidates;
        }
        match self.mapper.as_ref() {
            Some(mapper) => mapper(test, &candidates),
            None => {
                tracing::warn!(
                    test = %test.title,
                    candidates = candidates.len(),
                    "several test points match this test and no point mapper is set; publishing to all of them"
                );
                candidates
            }
        }
    }
}
