//! Pipeline graph from a parsed notebook
//!
//! Each notebook step becomes one container operation named `same-step-N`
//! that runs after the previous step. Every disk in the program file is
//! declared once and mounted into every step.

use indexmap::IndexMap;
use same_core::domain::operation::{OperationSpec, ParamValue};
use same_core::domain::program::ProgramConfig;
use same_core::domain::volume::{AccessMode, Mount};
use same_core::graph::{PipelineGraph, Result};
use tracing::{debug, info};

use crate::parser::{ParsedNotebook, Step};

/// Image used for steps when none is configured
pub const DEFAULT_BASE_IMAGE: &str = "python:3.9-slim-buster";

/// Turns `--name value` argument pairs into module globals before the step runs
const ARGUMENT_PRELUDE: &str = r#"import ast as _same_ast
import sys as _same_sys

_same_args = _same_sys.argv[1:]
for _same_key, _same_raw in zip(_same_args[0::2], _same_args[1::2]):
    try:
        _same_value = _same_ast.literal_eval(_same_raw)
    except (ValueError, SyntaxError):
        _same_value = _same_raw
    globals()[_same_key.lstrip("-").replace("-", "_")] = _same_value

"#;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub image: String,
    /// Run parameters; override notebook values of the same name
    pub parameters: IndexMap<String, String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            image: DEFAULT_BASE_IMAGE.to_string(),
            parameters: IndexMap::new(),
        }
    }
}

/// Build the pipeline graph for a program's notebook
pub fn build_graph(
    program: &ProgramConfig,
    notebook: &ParsedNotebook,
    options: &BuildOptions,
) -> Result<PipelineGraph> {
    let mut graph = PipelineGraph::new(program.pipeline_name());
    if !program.pipeline.description.is_empty() {
        graph = graph.with_description(program.pipeline.description.clone());
    }

    let parameters = merge_parameters(&notebook.parameters, &options.parameters);
    for (name, default) in &parameters {
        graph.add_parameter(name.as_str(), default.as_str())?;
    }

    let mut mounts: Vec<Mount> = Vec::new();
    for disk in &program.resources.disks {
        let volume = graph.declare_volume(
            &disk.name,
            &disk.size,
            AccessMode::ReadWriteMany,
            &disk.storage_class,
        )?;
        mounts.push(volume.at(disk.volume_mount.mount_path.clone()));
    }

    let mut previous: Option<String> = None;
    for step in &notebook.steps {
        let mut spec = OperationSpec::new(step_id(step.index), options.image.clone())
            .command(step_command(step));
        for name in parameters.keys() {
            spec = spec.param(name.clone(), ParamValue::pipeline(name.clone()));
        }
        for mount in &mounts {
            spec = spec.mount(mount.clone());
        }

        let handle = graph.add_operation(spec)?;
        if let Some(previous) = &previous {
            graph.add_dependency(handle.id(), previous)?;
        }
        debug!(
            "Added {} ({} package(s))",
            handle.id(),
            step.packages.len()
        );
        previous = Some(handle.id().to_string());
    }

    info!(
        "Built pipeline '{}' with {} step(s)",
        graph.name(),
        graph.len()
    );

    Ok(graph)
}

pub fn step_id(index: u32) -> String {
    format!("same-step-{}", index)
}

/// Notebook parameters in file order, then run-only parameters
fn merge_parameters(
    notebook: &IndexMap<String, String>,
    run: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut merged = notebook.clone();
    for (name, value) in run {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// `sh -ec <launcher> <program> [args...]`
///
/// The launcher installs the step's packages, writes the program to a temp
/// file and runs it with the remaining arguments.
fn step_command(step: &Step) -> Vec<String> {
    let install = if step.packages.is_empty() {
        String::new()
    } else {
        let packages = step.packages.join(" ");
        let pip = "python3 -m pip install --quiet --no-warn-script-location";
        format!(
            "{pip} {packages} || \
             PIP_DISABLE_PIP_VERSION_CHECK=1 {pip} {packages} --user\n"
        )
    };

    let launcher = format!(
        "{install}program_path=$(mktemp)\n\
         printf \"%s\" \"$0\" > \"$program_path\"\n\
         python3 -u \"$program_path\" \"$@\"\n"
    );

    vec![
        "sh".to_string(),
        "-ec".to_string(),
        launcher,
        format!("{}{}", ARGUMENT_PRELUDE, step.code),
    ]
}
