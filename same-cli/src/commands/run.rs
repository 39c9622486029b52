//! Kubeflow run command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use same_client::PipelinesClient;
use same_core::domain::program::ProgramConfig;
use same_core::dto::pipeline::{ApiRun, ResourceType, RunDetail};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// List the runs of a program's experiment, newest first
    List {
        /// Path to the program file
        #[arg(short, long, default_value = "same.yaml")]
        file: PathBuf,

        /// Experiment name (defaults to metadata.name in the program file)
        #[arg(short, long)]
        experiment: Option<String>,
    },
    /// Show a single run with its parameters, metrics and outputs
    Describe {
        /// Run ID
        id: String,
    },
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, client: &PipelinesClient) -> Result<()> {
    match command {
        RunCommands::List { file, experiment } => list_runs(client, file, experiment).await,
        RunCommands::Describe { id } => describe_run(client, &id).await,
    }
}

async fn list_runs(
    client: &PipelinesClient,
    file: PathBuf,
    experiment: Option<String>,
) -> Result<()> {
    let name = match experiment {
        Some(name) => name,
        None => ProgramConfig::load(&file)
            .with_context(|| format!("Failed to load program file: {}", file.display()))?
            .experiment_name()
            .to_string(),
    };

    let Some(experiment) = client
        .find_experiment(&name)
        .await
        .context("Failed to look up experiment")?
    else {
        println!("{}", format!("No experiment named '{}'.", name).yellow());
        return Ok(());
    };

    let runs = client
        .list_all_runs(Some((ResourceType::Experiment, &experiment.id)))
        .await
        .context("Failed to list runs")?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} run(s) in experiment {}:", runs.len(), experiment.name).bold()
    );
    println!();
    let metrics = metric_names(&runs);
    for run in &runs {
        print_run_summary(run, &metrics);
    }

    Ok(())
}

async fn describe_run(client: &PipelinesClient, id: &str) -> Result<()> {
    let detail = client
        .get_run(id)
        .await
        .with_context(|| format!("Failed to get run {}", id))?;

    print_run_details(&detail);
    Ok(())
}

fn print_run_summary(run: &ApiRun, metrics: &[String]) {
    println!("  {} {}", "▸".cyan(), run.name.bold());
    println!("    ID:      {}", run.id.dimmed());
    println!("    Status:  {}", colorize_status(&run.status));
    if let Some(created) = run.created_at {
        println!(
            "    Created: {}",
            created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if let Some(version) = run.reference(ResourceType::PipelineVersion) {
        println!("    Version: {}", version.dimmed());
    }
    for name in metrics {
        let value = run
            .metrics
            .iter()
            .find(|m| &m.name == name)
            .map(|m| format!("{:.4}", m.number_value))
            .unwrap_or_else(|| "-".to_string());
        println!("    {}: {}", name.cyan(), value);
    }
    println!();
}

fn print_run_details(detail: &RunDetail) {
    let run = &detail.run;

    println!("{}", "Run Details:".bold());
    println!("  ID:          {}", run.id.cyan());
    println!("  Name:        {}", run.name.bold());
    println!("  Status:      {}", colorize_status(&run.status));

    let spec = run.pipeline_spec.as_ref();
    if let Some(pipeline) = spec.and_then(|s| s.pipeline_name.as_deref()) {
        println!("  Pipeline:    {}", pipeline);
    }
    if let Some(version) = run.reference(ResourceType::PipelineVersion) {
        println!("  Version ID:  {}", version.dimmed());
    }
    if let Some(experiment) = run.reference(ResourceType::Experiment) {
        println!("  Experiment:  {}", experiment.dimmed());
    }
    if let Some(created) = run.created_at {
        println!("  Created:     {}", created.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(finished) = run.finished_at {
        println!("  Finished:    {}", finished.format("%Y-%m-%d %H:%M:%S"));
        if let Some(created) = run.created_at {
            let seconds = finished.signed_duration_since(created).num_seconds();
            println!("  Duration:    {}s", seconds);
        }
    }
    if let Some(error) = run.error.as_deref().filter(|e| !e.is_empty()) {
        println!("  Error:       {}", error.red());
    }

    let parameters = spec.map(|s| s.parameters.as_slice()).unwrap_or_default();
    if !parameters.is_empty() {
        println!("\n{}", "Parameters:".bold());
        for parameter in parameters {
            println!("  {}: {}", parameter.name.cyan(), parameter.value);
        }
    }

    if !run.metrics.is_empty() {
        println!("\n{}", "Metrics:".bold());
        for metric in &run.metrics {
            println!("  {}: {:.4}", metric.name.cyan(), metric.number_value);
        }
    }

    let outputs = detail
        .pipeline_runtime
        .as_ref()
        .map(|runtime| workflow_outputs(&runtime.workflow_manifest))
        .unwrap_or_default();
    if !outputs.is_empty() {
        println!("\n{}", "Outputs:".bold());
        for (name, value) in outputs {
            println!("  {}: {}", name.cyan(), value.dimmed());
        }
    }
}

/// Metric names reported by any of the runs, sorted
fn metric_names(runs: &[ApiRun]) -> Vec<String> {
    runs.iter()
        .flat_map(|run| run.metrics.iter().map(|m| m.name.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `(step.parameter, value)` for every output parameter in an Argo workflow
/// status, sorted by name
fn workflow_outputs(manifest: &str) -> Vec<(String, String)> {
    let Ok(workflow) = serde_json::from_str::<JsonValue>(manifest) else {
        return Vec::new();
    };
    let Some(nodes) = workflow["status"]["nodes"].as_object() else {
        return Vec::new();
    };

    let mut outputs = Vec::new();
    for node in nodes.values() {
        let step = node["displayName"].as_str().unwrap_or_default();
        let Some(parameters) = node["outputs"]["parameters"].as_array() else {
            continue;
        };
        for parameter in parameters {
            if let (Some(name), Some(value)) =
                (parameter["name"].as_str(), parameter["value"].as_str())
            {
                outputs.push((format!("{}.{}", step, name), value.to_string()));
            }
        }
    }
    outputs.sort();
    outputs
}

fn colorize_status(status: &str) -> ColoredString {
    match status {
        "Succeeded" | "Completed" => status.green(),
        "Failed" | "Error" => status.red(),
        "Running" => status.cyan(),
        "Skipped" | "Terminated" => status.dimmed(),
        "" => "Pending".yellow(),
        _ => status.yellow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, metrics: &[(&str, f64)]) -> ApiRun {
        serde_json::from_value(json!({
            "id": format!("{}-id", name),
            "name": name,
            "metrics": metrics
                .iter()
                .map(|(name, value)| json!({ "name": name, "number_value": value }))
                .collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    #[test]
    fn test_metric_names_are_sorted_and_unique() {
        let runs = vec![
            run("a", &[("loss", 0.3), ("accuracy", 0.9)]),
            run("b", &[("accuracy", 0.8)]),
            run("c", &[]),
        ];
        assert_eq!(metric_names(&runs), vec!["accuracy", "loss"]);
    }

    #[test]
    fn test_workflow_outputs() {
        let manifest = json!({
            "status": {
                "nodes": {
                    "n2": {
                        "displayName": "train",
                        "outputs": { "parameters": [{ "name": "model", "value": "/mnt/model" }] }
                    },
                    "n1": {
                        "displayName": "pipelinepvc",
                        "outputs": { "parameters": [
                            { "name": "pipelinepvc-name", "value": "run-abc-pipelinepvc" }
                        ] }
                    },
                    "n0": { "displayName": "tacos" }
                }
            }
        })
        .to_string();

        assert_eq!(
            workflow_outputs(&manifest),
            vec![
                (
                    "pipelinepvc.pipelinepvc-name".to_string(),
                    "run-abc-pipelinepvc".to_string()
                ),
                ("train.model".to_string(), "/mnt/model".to_string()),
            ]
        );
        assert!(workflow_outputs("not json").is_empty());
        assert!(workflow_outputs("{}").is_empty());
    }

    #[test]
    fn test_colorize_pending() {
        assert_eq!(colorize_status("").to_string(), "Pending".yellow().to_string());
    }
}
