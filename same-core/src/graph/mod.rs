//! Pipeline graph builder
//!
//! Operations are kept in an insertion-ordered map keyed by id, each with the
//! set of operations it must run after. Every mutating call validates its
//! input before touching the graph, so a failed call leaves no trace:
//!
//! - ids are unique across operations and volumes
//! - output handles must point at an existing operation and a declared output
//! - explicit edges are rejected if the prerequisite can already reach the
//!   dependent (depth-first search over `depends_on`)
//!
//! Because output handles can only reference operations that already exist,
//! inferred edges always point backwards and can never close a cycle.

mod error;

pub use error::{GraphError, Result};

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::domain::operation::{OperationHandle, OperationSpec, ParamValue};
use crate::domain::quantity::{Capacity, InvalidCapacity};
use crate::domain::volume::{AccessMode, VolumeHandle, VolumeSpec};

/// An operation registered in a graph together with its ordering edges
#[derive(Debug, Clone)]
pub struct OperationNode {
    pub spec: OperationSpec,
    pub depends_on: BTreeSet<String>,
}

/// A pipeline under construction
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    name: String,
    description: Option<String>,
    parameters: IndexMap<String, String>,
    volumes: IndexMap<String, VolumeSpec>,
    operations: IndexMap<String, OperationNode>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: IndexMap::new(),
            volumes: IndexMap::new(),
            operations: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &IndexMap<String, String> {
        &self.parameters
    }

    pub fn volumes(&self) -> impl Iterator<Item = &VolumeSpec> {
        self.volumes.values()
    }

    pub fn volume(&self, name: &str) -> Option<&VolumeSpec> {
        self.volumes.get(name)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationNode> {
        self.operations.values()
    }

    pub fn operation(&self, id: &str) -> Option<&OperationNode> {
        self.operations.get(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Whether `dependent` has a direct ordering edge on `prerequisite`
    pub fn has_dependency(&self, dependent: &str, prerequisite: &str) -> bool {
        self.operations
            .get(dependent)
            .is_some_and(|node| node.depends_on.contains(prerequisite))
    }

    /// Declare a global parameter supplied when a run starts
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        default: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        validate_parameter_name(&name)?;
        if self.parameters.contains_key(&name) {
            return Err(GraphError::DuplicateParameter(name));
        }
        self.parameters.insert(name, default.into());
        Ok(())
    }

    /// Register a persistent volume claim
    ///
    /// An empty `storage_class` leaves provisioning to the cluster default.
    pub fn declare_volume(
        &mut self,
        name: &str,
        capacity: &str,
        access_mode: AccessMode,
        storage_class: &str,
    ) -> Result<VolumeHandle> {
        validate_object_name(name)?;
        if self.is_taken(name) {
            return Err(GraphError::DuplicateOperation(name.to_string()));
        }

        let capacity: Capacity =
            capacity
                .parse()
                .map_err(|e: InvalidCapacity| GraphError::InvalidCapacity {
                    volume: name.to_string(),
                    reason: e.to_string(),
                })?;

        let storage_class = match storage_class.trim() {
            "" => None,
            class => Some(class.to_string()),
        };

        debug!("Declared volume {} ({}, {})", name, capacity, access_mode.as_str());

        self.volumes.insert(
            name.to_string(),
            VolumeSpec {
                name: name.to_string(),
                capacity,
                access_mode,
                storage_class,
            },
        );

        Ok(VolumeHandle::new(name))
    }

    /// Register an operation
    ///
    /// Each parameter bound to another operation's output adds an ordering
    /// edge on that operation.
    pub fn add_operation(&mut self, spec: OperationSpec) -> Result<OperationHandle> {
        validate_object_name(&spec.id)?;
        if self.is_taken(&spec.id) {
            return Err(GraphError::DuplicateOperation(spec.id));
        }

        let mut depends_on = BTreeSet::new();
        for (name, value) in &spec.params {
            validate_parameter_name(name)?;
            match value {
                ParamValue::Literal(_) => {}
                ParamValue::Pipeline(parameter) => {
                    if !self.parameters.contains_key(parameter) {
                        return Err(GraphError::UnknownParameter(parameter.clone()));
                    }
                }
                ParamValue::Output(output) => {
                    let producer = self
                        .operations
                        .get(&output.operation)
                        .ok_or_else(|| GraphError::UnknownOperation(output.operation.clone()))?;
                    if !producer.spec.outputs.contains(&output.output) {
                        return Err(GraphError::UnknownOutput {
                            operation: output.operation.clone(),
                            output: output.output.clone(),
                        });
                    }
                    depends_on.insert(output.operation.clone());
                }
            }
        }

        for output in &spec.outputs {
            validate_parameter_name(output)?;
        }

        let mut mounted = HashSet::new();
        for mount in &spec.mounts {
            if !self.volumes.contains_key(&mount.volume) {
                return Err(GraphError::UnknownVolume(mount.volume.clone()));
            }
            if !mount.path.starts_with('/') {
                return Err(GraphError::InvalidMountPath(mount.path.clone()));
            }
            if !mounted.insert(mount.volume.as_str()) {
                return Err(GraphError::DuplicateMount {
                    operation: spec.id.clone(),
                    volume: mount.volume.clone(),
                });
            }
        }

        check_reserved_names(&spec)?;

        if !depends_on.is_empty() {
            debug!(
                "Operation {} inferred dependencies: {:?}",
                spec.id, depends_on
            );
        }

        let handle = OperationHandle::new(spec.id.clone());
        self.operations
            .insert(spec.id.clone(), OperationNode { spec, depends_on });
        Ok(handle)
    }

    /// Require `dependent` to run after `prerequisite`
    pub fn add_dependency(&mut self, dependent: &str, prerequisite: &str) -> Result<()> {
        for id in [dependent, prerequisite] {
            if !self.operations.contains_key(id) {
                return Err(GraphError::UnknownOperation(id.to_string()));
            }
        }

        if dependent == prerequisite || self.reaches(prerequisite, dependent) {
            return Err(GraphError::Cycle {
                dependent: dependent.to_string(),
                prerequisite: prerequisite.to_string(),
            });
        }

        if let Some(node) = self.operations.get_mut(dependent) {
            node.depends_on.insert(prerequisite.to_string());
        }
        Ok(())
    }

    /// Operation ids in a valid execution order
    ///
    /// Ties are broken by insertion order, so the result is stable.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut emitted: HashSet<&str> = HashSet::with_capacity(self.operations.len());
        let mut order = Vec::with_capacity(self.operations.len());

        while order.len() < self.operations.len() {
            let next = self.operations.values().find(|node| {
                !emitted.contains(node.spec.id.as_str())
                    && node
                        .depends_on
                        .iter()
                        .all(|dep| emitted.contains(dep.as_str()))
            });

            // Acyclicity is enforced on insertion, so a ready node always exists.
            let Some(node) = next else { break };
            emitted.insert(node.spec.id.as_str());
            order.push(node.spec.id.as_str());
        }

        order
    }

    /// Depth-first search along `depends_on` edges
    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.operations.get(current) {
                stack.extend(node.depends_on.iter().map(String::as_str));
            }
        }

        false
    }

    fn is_taken(&self, name: &str) -> bool {
        self.operations.contains_key(name) || self.volumes.contains_key(name)
    }
}

/// Operation and volume ids become Kubernetes object and template names
fn validate_object_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| GraphError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > 63 {
        return Err(invalid("name must be at most 63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "name may only contain lowercase letters, digits and '-'",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("name must start and end with a letter or digit"));
    }
    Ok(())
}

/// Compilation adds a `<volume>-name` input per mount and an
/// `--<output>-output-path` argument per output; user names must not collide
fn check_reserved_names(spec: &OperationSpec) -> Result<()> {
    let mut reserved: Vec<(String, String)> = Vec::new();
    for mount in &spec.mounts {
        reserved.push((
            format!("{}-name", mount.volume),
            format!("the claim of volume '{}'", mount.volume),
        ));
    }
    for output in &spec.outputs {
        reserved.push((
            format!("{}-output-path", output),
            format!("the path of output '{}'", output),
        ));
    }

    let names = spec.params.keys().chain(spec.outputs.iter());
    for name in names {
        if let Some((_, reserved_for)) = reserved.iter().find(|(taken, _)| taken == name) {
            return Err(GraphError::ReservedName {
                operation: spec.id.clone(),
                name: name.clone(),
                reserved_for: reserved_for.clone(),
            });
        }
    }
    Ok(())
}

fn validate_parameter_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GraphError::InvalidName {
            name: name.to_string(),
            reason: "parameter names may only contain letters, digits, '_' and '-'".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocess_and_train() -> (PipelineGraph, VolumeHandle) {
        let mut graph = PipelineGraph::new("tacos-and-burritos");
        let data = graph
            .declare_volume("data", "10Gi", AccessMode::ReadWriteMany, "")
            .unwrap();

        let preprocess = graph
            .add_operation(
                OperationSpec::new("preprocess", "python:3.9-slim")
                    .output("train_data")
                    .mount(data.at("/mnt/data")),
            )
            .unwrap();

        graph
            .add_operation(
                OperationSpec::new("train", "tensorflow/tensorflow:2.4.1")
                    .param("train_data", preprocess.output("train_data"))
                    .mount(data.at("/mnt/data")),
            )
            .unwrap();

        (graph, data)
    }

    #[test]
    fn test_output_reference_infers_edge() {
        let (graph, data) = preprocess_and_train();

        assert!(graph.has_dependency("train", "preprocess"));
        assert!(!graph.has_dependency("preprocess", "train"));
        assert_eq!(graph.topological_order(), vec!["preprocess", "train"]);

        for node in graph.operations() {
            assert_eq!(node.spec.mounts, vec![data.at("/mnt/data")]);
        }
    }

    #[test]
    fn test_duplicate_operation_leaves_graph_unchanged() {
        let (mut graph, _) = preprocess_and_train();

        let result = graph.add_operation(OperationSpec::new("train", "other:latest"));
        assert_eq!(
            result.unwrap_err(),
            GraphError::DuplicateOperation("train".to_string())
        );
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.operation("train").unwrap().spec.image,
            "tensorflow/tensorflow:2.4.1"
        );
    }

    #[test]
    fn test_operation_cannot_reuse_volume_name() {
        let (mut graph, _) = preprocess_and_train();

        let result = graph.add_operation(OperationSpec::new("data", "busybox"));
        assert!(matches!(result, Err(GraphError::DuplicateOperation(_))));
    }

    #[test]
    fn test_cycle_is_rejected_and_graph_unchanged() {
        let mut graph = PipelineGraph::new("chain");
        for id in ["a", "b", "c"] {
            graph.add_operation(OperationSpec::new(id, "busybox")).unwrap();
        }
        graph.add_dependency("b", "a").unwrap();
        graph.add_dependency("c", "b").unwrap();

        let result = graph.add_dependency("a", "c");
        assert_eq!(
            result.unwrap_err(),
            GraphError::Cycle {
                dependent: "a".to_string(),
                prerequisite: "c".to_string(),
            }
        );
        assert!(graph.operation("a").unwrap().depends_on.is_empty());
        assert_eq!(graph.topological_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = PipelineGraph::new("single");
        graph.add_operation(OperationSpec::new("a", "busybox")).unwrap();

        assert!(matches!(
            graph.add_dependency("a", "a"),
            Err(GraphError::Cycle { .. })
        ));
    }

    #[test]
    fn test_repeated_edge_is_noop() {
        let (mut graph, _) = preprocess_and_train();

        graph.add_dependency("train", "preprocess").unwrap();
        assert_eq!(graph.operation("train").unwrap().depends_on.len(), 1);
    }

    #[test]
    fn test_unknown_references_are_rejected() {
        let (mut graph, data) = preprocess_and_train();

        let missing_op = graph.add_operation(
            OperationSpec::new("evaluate", "busybox").param(
                "model",
                OperationHandle::new("deploy").output("model"),
            ),
        );
        assert_eq!(
            missing_op.unwrap_err(),
            GraphError::UnknownOperation("deploy".to_string())
        );

        let missing_output = graph.add_operation(
            OperationSpec::new("evaluate", "busybox").param(
                "model",
                OperationHandle::new("train").output("model"),
            ),
        );
        assert!(matches!(
            missing_output,
            Err(GraphError::UnknownOutput { .. })
        ));

        let missing_param = graph.add_operation(
            OperationSpec::new("evaluate", "busybox")
                .param("epochs", ParamValue::pipeline("epochs")),
        );
        assert_eq!(
            missing_param.unwrap_err(),
            GraphError::UnknownParameter("epochs".to_string())
        );

        let relative_mount = graph.add_operation(
            OperationSpec::new("evaluate", "busybox").mount(data.at("mnt/data")),
        );
        assert!(matches!(
            relative_mount,
            Err(GraphError::InvalidMountPath(_))
        ));

        let double_mount = graph.add_operation(
            OperationSpec::new("evaluate", "busybox")
                .mount(data.at("/mnt/a"))
                .mount(data.at("/mnt/b")),
        );
        assert!(matches!(double_mount, Err(GraphError::DuplicateMount { .. })));

        assert!(graph.operation("evaluate").is_none());
    }

    #[test]
    fn test_param_cannot_shadow_claim_name() {
        let (mut graph, data) = preprocess_and_train();

        let result = graph.add_operation(
            OperationSpec::new("evaluate", "busybox")
                .param("data-name", ParamValue::literal("x"))
                .mount(data.at("/mnt/data")),
        );
        assert_eq!(
            result.unwrap_err(),
            GraphError::ReservedName {
                operation: "evaluate".to_string(),
                name: "data-name".to_string(),
                reserved_for: "the claim of volume 'data'".to_string(),
            }
        );
        assert!(graph.operation("evaluate").is_none());

        // Without the mount the name is free
        graph
            .add_operation(
                OperationSpec::new("evaluate", "busybox")
                    .param("data-name", ParamValue::literal("x")),
            )
            .unwrap();
    }

    #[test]
    fn test_param_cannot_shadow_output_path() {
        let mut graph = PipelineGraph::new("outputs");

        let result = graph.add_operation(
            OperationSpec::new("train", "busybox")
                .param("model-output-path", ParamValue::literal("/tmp/model"))
                .output("model"),
        );
        assert!(matches!(
            result,
            Err(GraphError::ReservedName { ref name, .. }) if name == "model-output-path"
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_pipeline_parameters() {
        let mut graph = PipelineGraph::new("params");
        graph.add_parameter("epochs", "5").unwrap();
        assert_eq!(
            graph.add_parameter("epochs", "10").unwrap_err(),
            GraphError::DuplicateParameter("epochs".to_string())
        );

        graph
            .add_operation(
                OperationSpec::new("train", "busybox")
                    .param("epochs", ParamValue::pipeline("epochs")),
            )
            .unwrap();
        assert_eq!(graph.parameters().get("epochs").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_volume_validation() {
        let mut graph = PipelineGraph::new("volumes");

        assert!(matches!(
            graph.declare_volume("scratch", "0Gi", AccessMode::ReadWriteOnce, ""),
            Err(GraphError::InvalidCapacity { .. })
        ));
        assert!(matches!(
            graph.declare_volume("Bad_Name", "1Gi", AccessMode::ReadWriteOnce, ""),
            Err(GraphError::InvalidName { .. })
        ));

        graph
            .declare_volume("scratch", "1Gi", AccessMode::ReadWriteOnce, "blob")
            .unwrap();
        assert_eq!(
            graph.volume("scratch").unwrap().storage_class.as_deref(),
            Some("blob")
        );
        assert!(matches!(
            graph.declare_volume("scratch", "2Gi", AccessMode::ReadWriteOnce, ""),
            Err(GraphError::DuplicateOperation(_))
        ));
    }

    #[test]
    fn test_topological_order_respects_explicit_edges() {
        let mut graph = PipelineGraph::new("diamond");
        for id in ["sink", "left", "right", "source"] {
            graph.add_operation(OperationSpec::new(id, "busybox")).unwrap();
        }
        graph.add_dependency("left", "source").unwrap();
        graph.add_dependency("right", "source").unwrap();
        graph.add_dependency("sink", "left").unwrap();
        graph.add_dependency("sink", "right").unwrap();

        assert_eq!(
            graph.topological_order(),
            vec!["source", "left", "right", "sink"]
        );
    }
}
