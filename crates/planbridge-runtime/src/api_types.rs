//! Wire shapes of the remote test-plan REST API.

use std::collections::BTreeMap;

use planbridge_core::outcome::RemoteOutcome;
use planbridge_core::test_points::TestPoint;
use serde::{Deserialize, Deserializer, Serialize};

pub const RESULT_STATE_COMPLETED: &str = "Completed";
pub const RUN_STATE_COMPLETED: &str = "Completed";
pub const GENERAL_ATTACHMENT_TYPE: &str = "GeneralAttachment";

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(u64),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(text) => text,
        IdRepr::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// `{ "id": "..." }` reference used throughout the API.
pub struct ShallowReference {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

impl ShallowReference {
    pub fn new(id: impl ToString) -> Self {
        Self { id: id.to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTestField {
    pub field_name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Body of the create-run call.
pub struct RunCreateModel {
    pub name: String,
    pub automated: bool,
    pub plan: ShallowReference,
    pub configuration_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdentityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "customTestFields", skip_serializing_if = "Vec::is_empty")]
    pub custom_test_fields: Vec<CustomTestField>,
}

impl RunCreateModel {
    pub fn with_custom_fields(mut self, fields: &BTreeMap<String, String>) -> Self {
        self.custom_test_fields = fields
            .iter()
            .map(|(field_name, value)| CustomTestField {
                field_name: field_name.clone(),
                value: value.clone(),
            })
            .collect();
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRun {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsQuery {
    pub points_filter: PointsFilter,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointsFilter {
    #[serde(rename = "testcaseIds")]
    pub testcase_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointsQueryResponse {
    #[serde(default)]
    pub points: Vec<WireTestPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTestPoint {
    pub id: u64,
    pub test_plan: ShallowReference,
    pub test_case: ShallowReference,
    pub configuration: ShallowReference,
}

impl WireTestPoint {
    /// `None` when the plan or configuration id is not numeric.
    pub fn into_test_point(self) -> Option<TestPoint> {
        Some(TestPoint {
            id: self.id,
            plan_id: self.test_plan.id.trim().parse().ok()?,
            test_case_id: self.test_case.id.trim().to_string(),
            configuration_id: self.configuration.id.trim().parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// One result submitted against a test point.
pub struct ResultPayload {
    pub test_point: ShallowReference,
    pub test_case_title: String,
    pub outcome: RemoteOutcome,
    pub state: String,
    pub duration_in_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Outcome update for a result that already exists in the run.
pub struct ResultUpdatePayload {
    pub id: u64,
    pub outcome: RemoteOutcome,
    pub state: String,
    pub duration_in_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTestResult {
    pub id: u64,
    #[serde(default)]
    pub test_point: Option<ShallowReference>,
    #[serde(default)]
    pub test_case: Option<ShallowReference>,
    #[serde(default)]
    pub test_case_title: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl RemoteTestResult {
    pub fn test_point_id(&self) -> Option<u64> {
        self.test_point
            .as_ref()
            .and_then(|point| point.id.trim().parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    /// Base64 payload.
    pub stream: String,
    pub file_name: String,
    pub comment: String,
    pub attachment_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentReference {
    pub id: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunUpdateModel {
    pub state: String,
}

#[cfg(test)]
mod tests {
    use planbridge_core::outcome::RemoteOutcome;
    use serde_json::json;

    use super::{
        ListResponse, PointsQueryResponse, RemoteTestResult, ResultPayload, ShallowReference,
        RESULT_STATE_COMPLETED,
    };

    #[test]
    fn unit_points_response_accepts_string_and_numeric_ids() {
        let response: PointsQueryResponse = serde_json::from_value(json!({
            "points": [
                {"id": 5, "testPlan": {"id": "4"}, "testCase": {"id": "3"}, "configuration": {"id": 1}},
                {"id": 6, "testPlan": {"id": 4}, "testCase": {"id": 8}, "configuration": {"id": "x"}}
            ]
        }))
        .expect("points parse");
        let mut points = response.points.into_iter();
        let first = points
            .next()
            .and_then(|point| point.into_test_point())
            .expect("first point");
        assert_eq!(first.plan_id, 4);
        assert_eq!(first.test_case_id, "3");
        assert_eq!(first.configuration_id, 1);
        assert!(points
            .next()
            .and_then(|point| point.into_test_point())
            .is_none());
    }

    #[test]
    fn unit_result_payload_serializes_expected_wire_shape() {
        let payload = ResultPayload {
            test_point: ShallowReference::new(5),
            test_case_title: "[3] foobar".to_string(),
            outcome: RemoteOutcome::Failed,
            state: RESULT_STATE_COMPLETED.to_string(),
            duration_in_ms: 12,
            error_message: Some("boom".to_string()),
            stack_trace: None,
            comment: None,
        };
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!({
                "testPoint": {"id": "5"},
                "testCaseTitle": "[3] foobar",
                "outcome": "Failed",
                "state": "Completed",
                "durationInMs": 12,
                "errorMessage": "boom"
            })
        );
    }

    #[test]
    fn functional_list_response_tolerates_missing_value() {
        let response: ListResponse<RemoteTestResult> =
            serde_json::from_value(json!({"count": 0})).expect("list parse");
        assert!(response.value.is_empty());
        let response: ListResponse<RemoteTestResult> = serde_json::from_value(json!({
            "count": 1,
            "value": [{"id": 100000, "testPoint": {"id": "5"}}]
        }))
        .expect("list parse");
        assert_eq!(response.value[0].test_point_id(), Some(5));
    }
}
