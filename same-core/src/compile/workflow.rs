//! Argo workflow document
//!
//! Kubeflow Pipelines executes pipelines as Argo `Workflow` objects. The graph
//! compiles to one DAG template (the entrypoint), one resource template per
//! volume that creates the claim, and one container template per operation.
//!
//! All collections are either ordered vectors or `BTreeMap`s so that a given
//! graph always renders to the same bytes.

use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::operation::ParamValue;
use crate::domain::volume::VolumeSpec;
use crate::graph::{OperationNode, PipelineGraph};

pub const API_VERSION: &str = "argoproj.io/v1alpha1";
pub const PIPELINE_SPEC_ANNOTATION: &str = "pipelines.kubeflow.org/pipeline_spec";
pub const SERVICE_ACCOUNT: &str = "pipeline-runner";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub api_version: String,
    pub kind: String,
    pub metadata: WorkflowMetadata,
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    pub generate_name: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub entrypoint: String,
    #[serde(skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    pub service_account_name: String,
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Arguments {
    pub parameters: Vec<Parameter>,
}

impl Arguments {
    fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

impl Parameter {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: None,
        }
    }

    fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::named(name)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueFrom {
    Path(String),
    JsonPath(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(skip_serializing_if = "Arguments::is_empty")]
    pub inputs: Arguments,
    #[serde(skip_serializing_if = "Arguments::is_empty")]
    pub outputs: Arguments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag: Option<Dag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl Template {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Arguments::default(),
            outputs: Arguments::default(),
            dag: None,
            container: None,
            resource: None,
            volumes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dag {
    pub tasks: Vec<DagTask>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagTask {
    pub name: String,
    pub template: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub action: String,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub persistent_volume_claim: ClaimSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    pub claim_name: String,
}

/// Where the container writes the value of output `name`
pub fn output_path(name: &str) -> String {
    format!("/tmp/outputs/{}/data", name)
}

fn output_parameter(operation: &str, output: &str) -> String {
    format!("{}-{}", operation, output)
}

fn claim_name_parameter(volume: &str) -> String {
    format!("{}-name", volume)
}

/// Render a bound value as an Argo expression
fn render_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Literal(literal) => literal.clone(),
        ParamValue::Pipeline(name) => format!("{{{{workflow.parameters.{}}}}}", name),
        ParamValue::Output(output) => format!(
            "{{{{tasks.{}.outputs.parameters.{}}}}}",
            output.operation,
            output_parameter(&output.operation, &output.output)
        ),
    }
}

/// Lowercase DNS label derived from a display name
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c.to_ascii_lowercase());
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }
    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        "pipeline".to_string()
    } else {
        trimmed.chars().take(52).collect::<String>().trim_end_matches('-').to_string()
    }
}

/// Build the workflow document for a graph
pub fn render(graph: &PipelineGraph) -> Workflow {
    let base_name = sanitize_name(graph.name());
    let mut entrypoint = base_name.clone();
    while graph.operation(&entrypoint).is_some() || graph.volume(&entrypoint).is_some() {
        entrypoint.push_str("-dag");
    }

    let mut tasks = Vec::new();
    let mut templates = Vec::new();

    for volume in graph.volumes() {
        tasks.push(DagTask {
            name: volume.name.clone(),
            template: volume.name.clone(),
            dependencies: Vec::new(),
            arguments: Arguments::default(),
        });
        templates.push(volume_template(volume));
    }

    for id in graph.topological_order() {
        let Some(node) = graph.operation(id) else {
            continue;
        };
        tasks.push(operation_task(node));
        templates.push(operation_template(node));
    }

    let mut entry = Template::named(entrypoint.clone());
    entry.dag = Some(Dag { tasks });
    templates.insert(0, entry);

    let arguments = Arguments {
        parameters: graph
            .parameters()
            .iter()
            .map(|(name, default)| Parameter::with_value(name, default))
            .collect(),
    };

    let mut annotations = BTreeMap::new();
    annotations.insert(
        PIPELINE_SPEC_ANNOTATION.to_string(),
        pipeline_spec_annotation(graph),
    );

    Workflow {
        api_version: API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata {
            generate_name: format!("{}-", base_name),
            annotations,
        },
        spec: WorkflowSpec {
            entrypoint,
            arguments,
            service_account_name: SERVICE_ACCOUNT.to_string(),
            templates,
        },
    }
}

fn pipeline_spec_annotation(graph: &PipelineGraph) -> String {
    let inputs: Vec<_> = graph
        .parameters()
        .iter()
        .map(|(name, default)| json!({ "name": name, "default": default }))
        .collect();

    let mut spec = json!({ "name": graph.name(), "inputs": inputs });
    if let Some(description) = graph.description() {
        spec["description"] = json!(description);
    }
    spec.to_string()
}

fn volume_template(volume: &VolumeSpec) -> Template {
    let mut claim_spec = json!({
        "accessModes": [volume.access_mode.as_str()],
        "resources": { "requests": { "storage": volume.capacity.to_string() } },
    });
    if let Some(class) = &volume.storage_class {
        claim_spec["storageClassName"] = json!(class);
    }

    let manifest = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": format!("{{{{workflow.name}}}}-{}", volume.name) },
        "spec": claim_spec,
    });

    let mut template = Template::named(volume.name.clone());
    template.resource = Some(Resource {
        action: "create".to_string(),
        manifest: manifest.to_string(),
    });
    template.outputs.parameters = vec![
        Parameter {
            value_from: Some(ValueFrom::JsonPath("{.metadata.name}".to_string())),
            ..Parameter::named(claim_name_parameter(&volume.name))
        },
        Parameter {
            value_from: Some(ValueFrom::JsonPath(
                "{.status.capacity.storage}".to_string(),
            )),
            ..Parameter::named(format!("{}-size", volume.name))
        },
    ];
    template
}

fn operation_task(node: &OperationNode) -> DagTask {
    let spec = &node.spec;
    let mut dependencies: BTreeSet<String> = node.depends_on.clone();

    let mut parameters: Vec<Parameter> = spec
        .params
        .iter()
        .map(|(name, value)| Parameter::with_value(name, render_value(value)))
        .collect();

    for mount in &spec.mounts {
        dependencies.insert(mount.volume.clone());
        parameters.push(Parameter::with_value(
            claim_name_parameter(&mount.volume),
            format!(
                "{{{{tasks.{}.outputs.parameters.{}}}}}",
                mount.volume,
                claim_name_parameter(&mount.volume)
            ),
        ));
    }

    DagTask {
        name: spec.id.clone(),
        template: spec.id.clone(),
        dependencies: dependencies.into_iter().collect(),
        arguments: Arguments { parameters },
    }
}

fn operation_template(node: &OperationNode) -> Template {
    let spec = &node.spec;
    let mut template = Template::named(spec.id.clone());

    let mut args = Vec::new();
    for name in spec.params.keys() {
        template.inputs.parameters.push(Parameter::named(name));
        args.push(format!("--{}", name));
        args.push(format!("{{{{inputs.parameters.{}}}}}", name));
    }
    for output in &spec.outputs {
        args.push(format!("--{}-output-path", output));
        args.push(output_path(output));
        template.outputs.parameters.push(Parameter {
            value_from: Some(ValueFrom::Path(output_path(output))),
            ..Parameter::named(output_parameter(&spec.id, output))
        });
    }

    let mut volume_mounts = Vec::new();
    for mount in &spec.mounts {
        let claim_param = claim_name_parameter(&mount.volume);
        template.inputs.parameters.push(Parameter::named(&claim_param));
        template.volumes.push(Volume {
            name: mount.volume.clone(),
            persistent_volume_claim: ClaimSource {
                claim_name: format!("{{{{inputs.parameters.{}}}}}", claim_param),
            },
        });
        volume_mounts.push(VolumeMount {
            name: mount.volume.clone(),
            mount_path: mount.path.clone(),
        });
    }

    template.container = Some(Container {
        image: spec.image.clone(),
        command: spec.command.clone(),
        args,
        volume_mounts,
    });
    template
}
