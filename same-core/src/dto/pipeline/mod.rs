//! Kubeflow Pipelines API DTOs (v1beta1)

use serde::{Deserialize, Serialize};

/// A pipeline registered with Kubeflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPipeline {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ApiParameter>,
    /// Most recently uploaded version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<ApiPipelineVersion>,
}

/// One uploaded revision of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPipelineVersion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ApiParameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_references: Vec<ResourceReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiParameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Response of the pipeline list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPipelines {
    #[serde(default)]
    pub pipelines: Vec<ApiPipeline>,
    #[serde(default)]
    pub total_size: i64,
    #[serde(default)]
    pub next_page_token: String,
}

// =============================================================================
// Resource references
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Experiment,
    Job,
    Pipeline,
    PipelineVersion,
    Namespace,
    #[serde(rename = "UNKNOWN_RESOURCE_TYPE", other)]
    Unknown,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Experiment => "EXPERIMENT",
            ResourceType::Job => "JOB",
            ResourceType::Pipeline => "PIPELINE",
            ResourceType::PipelineVersion => "PIPELINE_VERSION",
            ResourceType::Namespace => "NAMESPACE",
            ResourceType::Unknown => "UNKNOWN_RESOURCE_TYPE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    Owner,
    Creator,
    #[default]
    #[serde(rename = "UNKNOWN_RELATIONSHIP", other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKey {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub id: String,
}

/// Link from a run or version to the resource that owns or created it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    pub key: ResourceKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub relationship: Relationship,
}

impl ResourceReference {
    pub fn owner(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self::new(resource_type, id, Relationship::Owner)
    }

    pub fn creator(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self::new(resource_type, id, Relationship::Creator)
    }

    fn new(resource_type: ResourceType, id: impl Into<String>, relationship: Relationship) -> Self {
        Self {
            key: ResourceKey {
                resource_type,
                id: id.into(),
            },
            name: None,
            relationship,
        }
    }
}

// =============================================================================
// Experiments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiExperiment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Request to create an experiment
#[derive(Debug, Clone, Serialize)]
pub struct CreateExperiment {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Response of the experiment list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListExperiments {
    #[serde(default)]
    pub experiments: Vec<ApiExperiment>,
    #[serde(default)]
    pub total_size: i64,
    #[serde(default)]
    pub next_page_token: String,
}

/// List filter, sent JSON-encoded in the `filter` query parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub op: &'static str,
    pub key: String,
    pub string_value: String,
}

impl Filter {
    /// Match resources whose name equals `name`
    pub fn name_equals(name: impl Into<String>) -> Self {
        Self {
            predicates: vec![Predicate {
                op: "EQUALS",
                key: "name".to_string(),
                string_value: name.into(),
            }],
        }
    }
}

// =============================================================================
// Runs
// =============================================================================

/// Which pipeline a run executes, and with what parameters
///
/// `pipeline_id` is left out when the run references a pipeline version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiPipelineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ApiParameter>,
}

/// Request to start a run
#[derive(Debug, Clone, Serialize)]
pub struct CreateRun {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub pipeline_spec: ApiPipelineSpec,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_references: Vec<ResourceReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetric {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub number_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRun {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<ApiPipelineSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_references: Vec<ResourceReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<RunMetric>,
}

impl ApiRun {
    /// Id of the first referenced resource of the given type
    pub fn reference(&self, resource_type: ResourceType) -> Option<&str> {
        self.resource_references
            .iter()
            .find(|r| r.key.resource_type == resource_type)
            .map(|r| r.key.id.as_str())
    }
}

/// Argo workflow state of a run, as a JSON document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineRuntime {
    #[serde(default)]
    pub workflow_manifest: String,
}

/// Response of the run create and get endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct RunDetail {
    pub run: ApiRun,
    #[serde(default)]
    pub pipeline_runtime: Option<PipelineRuntime>,
}

/// Response of the run list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRuns {
    #[serde(default)]
    pub runs: Vec<ApiRun>,
    #[serde(default)]
    pub total_size: i64,
    #[serde(default)]
    pub next_page_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_pipelines_tolerates_missing_fields() {
        let body = r#"{"pipelines":[{"id":"abc","name":"iris",
            "created_at":"2021-05-01T10:00:00Z"}],"total_size":1}"#;
        let list: ListPipelines = serde_json::from_str(body).unwrap();
        assert_eq!(list.pipelines.len(), 1);
        assert_eq!(list.pipelines[0].name, "iris");
        assert!(list.pipelines[0].created_at.is_some());
        assert!(list.next_page_token.is_empty());
    }

    #[test]
    fn test_empty_list_body() {
        let list: ListPipelines = serde_json::from_str("{}").unwrap();
        assert!(list.pipelines.is_empty());

        let runs: ListRuns = serde_json::from_str("{}").unwrap();
        assert!(runs.runs.is_empty());
    }

    #[test]
    fn test_create_run_with_experiment_and_version() {
        let request = CreateRun {
            name: "nightly".to_string(),
            description: None,
            pipeline_spec: ApiPipelineSpec {
                parameters: vec![ApiParameter {
                    name: "epochs".to_string(),
                    value: "5".to_string(),
                }],
                ..ApiPipelineSpec::default()
            },
            resource_references: vec![
                ResourceReference::owner(ResourceType::Experiment, "exp-1"),
                ResourceReference::creator(ResourceType::PipelineVersion, "ver-1"),
            ],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "name": "nightly",
                "pipeline_spec": { "parameters": [{ "name": "epochs", "value": "5" }] },
                "resource_references": [
                    { "key": { "type": "EXPERIMENT", "id": "exp-1" }, "relationship": "OWNER" },
                    {
                        "key": { "type": "PIPELINE_VERSION", "id": "ver-1" },
                        "relationship": "CREATOR"
                    },
                ],
            })
        );
    }

    #[test]
    fn test_run_detail_with_references_and_metrics() {
        let body = json!({
            "run": {
                "id": "run-1",
                "name": "nightly",
                "status": "Succeeded",
                "pipeline_spec": { "pipeline_name": "tacos" },
                "resource_references": [
                    { "key": { "type": "EXPERIMENT", "id": "exp-1" }, "relationship": "OWNER" },
                    { "key": { "type": "PIPELINE_VERSION", "id": "ver-1" } },
                    { "key": { "type": "SOMETHING_NEW", "id": "x" } }
                ],
                "metrics": [{ "name": "accuracy", "node_id": "n1", "number_value": 0.93 }]
            },
            "pipeline_runtime": { "workflow_manifest": "{}" }
        });

        let detail: RunDetail = serde_json::from_value(body).unwrap();
        assert_eq!(detail.run.reference(ResourceType::Experiment), Some("exp-1"));
        assert_eq!(detail.run.reference(ResourceType::PipelineVersion), Some("ver-1"));
        assert_eq!(
            detail.run.resource_references[1].relationship,
            Relationship::Unknown
        );
        assert_eq!(
            detail.run.resource_references[2].key.resource_type,
            ResourceType::Unknown
        );
        assert_eq!(detail.run.metrics[0].number_value, 0.93);
        assert!(detail.pipeline_runtime.is_some());
    }

    #[test]
    fn test_name_filter() {
        let filter = Filter::name_equals("tacos");
        assert_eq!(
            serde_json::to_string(&filter).unwrap(),
            r#"{"predicates":[{"op":"EQUALS","key":"name","string_value":"tacos"}]}"#
        );
    }
}
