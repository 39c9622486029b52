//! SAME program file (`same.yaml`)
//!
//! Describes the notebook to compile, the disks every step can mount, the
//! Kubeflow target and default run parameters. Unknown keys are ignored so
//! files written for newer tools still load.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Namespace used when the program file does not name one
pub const DEFAULT_NAMESPACE: &str = "kubeflow";

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read program file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse program file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid program file: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    #[serde(default)]
    pub metadata: ProgramMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub kubeflow: Kubeflow,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_sets: Vec<DataSet>,
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Cluster resources the program expects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_pool_name: String,
    #[serde(default)]
    pub create_new_node_pool: bool,
    #[serde(default)]
    pub cores: Cores,
    #[serde(default)]
    pub gpu: Gpus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cores {
    #[serde(default)]
    pub requested: u32,
    #[serde(default)]
    pub required: u32,
    #[serde(default)]
    pub minimum_per_machine: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gpus {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub gpu_type: String,
    #[serde(default)]
    pub per_machine: u32,
}

/// A disk mounted into every step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Disk {
    pub name: String,
    pub size: String,
    #[serde(default)]
    pub volume_mount: VolumeMountSection,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeMountSection {
    #[serde(default)]
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Kubeflow {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeflow_api_server: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeflow_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeflow_namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential_file: String,
}

/// The notebook (or compiled archive) that makes up the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub package: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub make_local_copy: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, serde_yaml::Value>,
}

impl ProgramConfig {
    /// Load and validate a program file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ProgramError> {
        let config: ProgramConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ProgramError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        for disk in &self.resources.disks {
            if disk.name.trim().is_empty() {
                return Err(ProgramError::Invalid("every disk needs a name".to_string()));
            }
            if disk.volume_mount.mount_path.trim().is_empty() {
                return Err(ProgramError::Invalid(format!(
                    "disk '{}' has no volume_mount.mount_path",
                    disk.name
                )));
            }
        }

        for (name, value) in &self.run.parameters {
            if scalar_to_string(value).is_none() {
                return Err(ProgramError::Invalid(format!(
                    "run parameter '{}' must be a string, number or boolean",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Pipeline name, falling back to the program name
    pub fn pipeline_name(&self) -> &str {
        if self.pipeline.name.is_empty() {
            &self.metadata.name
        } else {
            &self.pipeline.name
        }
    }

    /// Experiment that runs of this program are grouped under
    pub fn experiment_name(&self) -> &str {
        if self.metadata.name.is_empty() {
            self.pipeline_name()
        } else {
            &self.metadata.name
        }
    }

    pub fn namespace(&self) -> &str {
        if self.kubeflow.kubeflow_namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.kubeflow.kubeflow_namespace
        }
    }

    /// The pipeline package, resolved relative to the program file's directory
    pub fn package_path(&self, config_path: impl AsRef<Path>) -> Result<PathBuf, ProgramError> {
        if self.pipeline.package.trim().is_empty() {
            return Err(ProgramError::Invalid(
                "pipeline.package is not set".to_string(),
            ));
        }
        let root = config_path.as_ref().parent().unwrap_or(Path::new(""));
        Ok(root.join(&self.pipeline.package))
    }

    /// Run parameters from the file, overridden by `overrides`
    pub fn run_parameters(&self, overrides: &[(String, String)]) -> IndexMap<String, String> {
        let mut parameters: IndexMap<String, String> = self
            .run
            .parameters
            .iter()
            .filter_map(|(name, value)| Some((name.clone(), scalar_to_string(value)?)))
            .collect();

        for (name, value) in overrides {
            parameters.insert(name.clone(), value.clone());
        }
        parameters
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"
apiVersion: sameproject.ml/v1alpha1
metadata:
  name: Tacos vs. Burritos
  labels:
    team: vision
  version: 0.0.1
resources:
  disks:
    - name: pipelinepvc
      size: 10Gi
      storage_class: blob
      volume_mount:
        mount_path: /mnt/azure
kubeflow:
  kubeflow_namespace: pipelines
pipeline:
  name: tacos
  description: Simple TF CNN
  package: notebooks/tacos.ipynb
data_sets:
  - type: remote
    url: https://example.com/tacodata.zip
run:
  name: nightly
  parameters:
    epochs: 5
    learning_rate: 0.0001
    optimizer: adam
"#;

    #[test]
    fn test_parse_program_file() {
        let config = ProgramConfig::from_yaml(PROGRAM).unwrap();

        assert_eq!(config.api_version, "sameproject.ml/v1alpha1");
        assert_eq!(config.metadata.labels.get("team").unwrap(), "vision");
        assert_eq!(config.resources.disks[0].size, "10Gi");
        assert_eq!(config.resources.disks[0].volume_mount.mount_path, "/mnt/azure");
        assert_eq!(config.namespace(), "pipelines");
        assert_eq!(config.pipeline_name(), "tacos");
        assert_eq!(config.data_sets[0].data_type, "remote");
    }

    #[test]
    fn test_run_parameters_with_overrides() {
        let config = ProgramConfig::from_yaml(PROGRAM).unwrap();
        let params = config.run_parameters(&[("epochs".to_string(), "10".to_string())]);

        assert_eq!(params.get("epochs").unwrap(), "10");
        assert_eq!(params.get("learning_rate").unwrap(), "0.0001");
        assert_eq!(params.get("optimizer").unwrap(), "adam");
        let names: Vec<&str> = params.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["epochs", "learning_rate", "optimizer"]);
    }

    #[test]
    fn test_package_path_is_relative_to_config() {
        let config = ProgramConfig::from_yaml(PROGRAM).unwrap();
        let path = config.package_path("/work/project/same.yaml").unwrap();
        assert_eq!(path, PathBuf::from("/work/project/notebooks/tacos.ipynb"));
    }

    #[test]
    fn test_defaults() {
        let config = ProgramConfig::from_yaml("metadata:\n  name: bare\n").unwrap();
        assert_eq!(config.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(config.pipeline_name(), "bare");
        assert_eq!(config.experiment_name(), "bare");
        assert!(config.package_path("same.yaml").is_err());

        let unnamed = ProgramConfig::from_yaml("pipeline:\n  name: only-pipeline\n").unwrap();
        assert_eq!(unnamed.experiment_name(), "only-pipeline");
    }

    #[test]
    fn test_disk_without_mount_path_is_invalid() {
        let result = ProgramConfig::from_yaml(
            "resources:\n  disks:\n    - name: data\n      size: 1Gi\n",
        );
        assert!(matches!(result, Err(ProgramError::Invalid(_))));
    }

    #[test]
    fn test_nested_run_parameter_is_invalid() {
        let result = ProgramConfig::from_yaml("run:\n  parameters:\n    layers: [1, 2]\n");
        assert!(matches!(result, Err(ProgramError::Invalid(_))));
    }

    #[test]
    fn test_round_trip_keeps_package() {
        let mut config = ProgramConfig::from_yaml(PROGRAM).unwrap();
        config.pipeline.package = "pipeline.tar.gz".to_string();

        let reloaded = ProgramConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(reloaded.pipeline.package, "pipeline.tar.gz");
        assert_eq!(reloaded.resources.disks.len(), 1);
    }
}
