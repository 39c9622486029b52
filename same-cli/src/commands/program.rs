//! Program command handlers
//!
//! Compiles the notebook named by a `same.yaml` into a pipeline archive,
//! shows its graph, uploads it to Kubeflow and starts runs. Also lists and
//! deletes the pipelines already on the server.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;
use same_core::compile::read_archive;
use same_core::domain::program::ProgramConfig;
use same_core::dto::pipeline::{
    ApiParameter, ApiPipeline, ApiPipelineSpec, CreateRun, ResourceReference, ResourceType,
};
use same_core::graph::PipelineGraph;
use same_notebook::{
    BuildOptions, DEFAULT_BASE_IMAGE, build_graph, load_notebook, parse_notebook,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::parse_key_val;
use crate::config::Config;
use same_client::PipelinesClient;

/// File name of the compiled archive inside the output directory
const ARCHIVE_FILE: &str = "pipeline.tar.gz";

/// Options shared by every program subcommand
#[derive(Args, Debug, Clone)]
pub struct ProgramArgs {
    /// Path to the program file
    #[arg(short, long, default_value = "same.yaml")]
    file: PathBuf,

    /// Container image for every step
    #[arg(long, default_value = DEFAULT_BASE_IMAGE)]
    image: String,

    /// Run parameters as key=value pairs (override same.yaml)
    #[arg(short, long, value_parser = parse_key_val)]
    param: Vec<(String, String)>,
}

/// Program subcommands
#[derive(Subcommand)]
pub enum ProgramCommands {
    /// Compile the notebook into a pipeline archive
    Compile {
        #[command(flatten)]
        args: ProgramArgs,

        /// Directory for the archive and rewritten same.yaml (temp dir if unset)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Show the steps, edges and volumes of the compiled pipeline
    Graph {
        #[command(flatten)]
        args: ProgramArgs,

        /// Print the workflow document instead of a summary
        #[arg(long)]
        yaml: bool,
    },
    /// Upload the pipeline to Kubeflow
    Create {
        #[command(flatten)]
        args: ProgramArgs,
    },
    /// Start a run in the program's experiment
    ///
    /// Uploads the pipeline if it does not exist yet, or a new version of it
    /// if it does.
    Run {
        #[command(flatten)]
        args: ProgramArgs,

        /// Pipeline ID to run as-is (looked up by name if unset)
        #[arg(long)]
        pipeline_id: Option<String>,

        /// Run name (defaults to run.name in same.yaml, then the pipeline name)
        #[arg(long)]
        run_name: Option<String>,

        /// Run the pipeline already on the server without uploading anything
        #[arg(long)]
        run_only: bool,
    },
    /// List pipelines on the Kubeflow server
    List,
    /// Delete a pipeline and all of its versions
    Delete {
        /// Pipeline ID
        #[arg(short, long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,

        /// Pipeline name
        #[arg(short, long)]
        name: Option<String>,
    },
}

/// What a new run executes
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineTarget {
    /// The pipeline's default version
    Pipeline(String),
    /// A specific uploaded version
    Version {
        pipeline_id: String,
        version_id: String,
    },
}

impl PipelineTarget {
    fn pipeline_id(&self) -> &str {
        match self {
            PipelineTarget::Pipeline(id) => id,
            PipelineTarget::Version { pipeline_id, .. } => pipeline_id,
        }
    }
}

/// Handle program commands
pub async fn handle_program_command(command: ProgramCommands, config: &Config) -> Result<()> {
    match command {
        ProgramCommands::Compile { args, output_dir } => compile_program(&args, output_dir).await,
        ProgramCommands::Graph { args, yaml } => show_graph(&args, yaml).await,
        ProgramCommands::Create { args } => {
            let client = config.pipelines_client()?;
            create_pipeline(&client, &args).await
        }
        ProgramCommands::Run {
            args,
            pipeline_id,
            run_name,
            run_only,
        } => {
            let client = config.pipelines_client()?;
            run_program(&client, &args, pipeline_id, run_name, run_only).await
        }
        ProgramCommands::List => list_programs(&config.pipelines_client()?).await,
        ProgramCommands::Delete { id, name } => {
            let client = config.pipelines_client()?;
            delete_program(&client, id, name).await
        }
    }
}

/// Load the program file and build the graph for its notebook
async fn load_program(args: &ProgramArgs) -> Result<(ProgramConfig, PipelineGraph)> {
    let program = ProgramConfig::load(&args.file)
        .with_context(|| format!("Failed to load program file: {}", args.file.display()))?;

    let notebook_path = program.package_path(&args.file)?;
    let source = load_notebook(&notebook_path).await?;
    let notebook = parse_notebook(&source)
        .with_context(|| format!("Failed to parse notebook: {}", notebook_path.display()))?;

    let options = BuildOptions {
        image: args.image.clone(),
        parameters: program.run_parameters(&args.param),
    };
    let graph = build_graph(&program, &notebook, &options)
        .context("Failed to build pipeline graph")?;

    Ok((program, graph))
}

/// Archive bytes for the program, compiling the notebook unless the package
/// is already an archive
async fn program_archive(args: &ProgramArgs) -> Result<(ProgramConfig, Vec<u8>)> {
    let program = ProgramConfig::load(&args.file)
        .with_context(|| format!("Failed to load program file: {}", args.file.display()))?;
    let package = program.package_path(&args.file)?;

    if is_archive(&package) {
        read_archive(&package)
            .with_context(|| format!("Invalid pipeline archive: {}", package.display()))?;
        let bytes = std::fs::read(&package)
            .with_context(|| format!("Failed to read archive: {}", package.display()))?;
        debug!("Using precompiled archive {}", package.display());
        return Ok((program, bytes));
    }

    let (program, graph) = load_program(args).await?;
    let archive = graph.compile()?.to_archive()?;
    Ok((program, archive))
}

fn is_archive(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Compile to an archive and write a same.yaml pointing at it
async fn compile_program(args: &ProgramArgs, output_dir: Option<PathBuf>) -> Result<()> {
    let (mut program, graph) = load_program(args).await?;
    let artifact = graph.compile()?;

    let output_dir = match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            dir
        }
        None => tempfile::Builder::new()
            .prefix("SAME-compile-")
            .tempdir()
            .context("Failed to create temporary directory")?
            .keep(),
    };

    let archive_path = output_dir.join(ARCHIVE_FILE);
    artifact
        .write_archive(&archive_path)
        .with_context(|| format!("Failed to write {}", archive_path.display()))?;

    program.pipeline.package = ARCHIVE_FILE.to_string();
    let program_path = output_dir.join("same.yaml");
    std::fs::write(&program_path, program.to_yaml()?)
        .with_context(|| format!("Failed to write {}", program_path.display()))?;

    info!("Compiled {} into {}", args.file.display(), output_dir.display());

    println!("{}", "✓ Program compiled successfully!".green().bold());
    println!("  Pipeline: {}", artifact.name().bold());
    println!("  Steps:    {}", graph.len().to_string().cyan());
    println!("  Archive:  {}", archive_path.display().to_string().dimmed());
    println!("  Program:  {}", program_path.display().to_string().dimmed());

    Ok(())
}

/// Print the graph in execution order
async fn show_graph(args: &ProgramArgs, yaml: bool) -> Result<()> {
    let (_, graph) = load_program(args).await?;

    if yaml {
        let artifact = graph.compile()?;
        print!("{}", String::from_utf8_lossy(artifact.as_bytes()));
        return Ok(());
    }

    println!("{}", format!("Pipeline {}", graph.name()).bold());

    if !graph.parameters().is_empty() {
        println!("  Parameters:");
        for (name, default) in graph.parameters() {
            println!("    - {} = {}", name.cyan(), default.dimmed());
        }
    }

    let volumes: Vec<_> = graph.volumes().collect();
    if !volumes.is_empty() {
        println!("  Volumes:");
        for volume in volumes {
            println!(
                "    - {} {} {}",
                volume.name.cyan(),
                volume.capacity.to_string().dimmed(),
                volume.access_mode.as_str().dimmed()
            );
        }
    }

    println!("  Steps:");
    for id in graph.topological_order() {
        let Some(node) = graph.operation(id) else {
            continue;
        };
        println!("  {} {}", "▸".cyan(), id.bold());
        if !node.depends_on.is_empty() {
            let after: Vec<&str> = node.depends_on.iter().map(String::as_str).collect();
            println!("    After:  {}", after.join(", ").dimmed());
        }
        for input in node.spec.referenced_operations() {
            println!(
                "    Input:  {}.{}",
                input.operation.dimmed(),
                input.output.dimmed()
            );
        }
        for mount in &node.spec.mounts {
            println!("    Mount:  {} at {}", mount.volume.dimmed(), mount.path.dimmed());
        }
    }

    Ok(())
}

/// Upload the program as a new pipeline
async fn create_pipeline(client: &PipelinesClient, args: &ProgramArgs) -> Result<()> {
    let (program, archive) = program_archive(args).await?;
    let description = non_empty(&program.pipeline.description);

    let pipeline = client
        .upload_pipeline(program.pipeline_name(), description, archive)
        .await
        .context("Failed to upload pipeline")?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:   {}", pipeline.id.cyan());
    println!("  Name: {}", pipeline.name.bold());

    Ok(())
}

/// Start a run of the program's pipeline inside its experiment
async fn run_program(
    client: &PipelinesClient,
    args: &ProgramArgs,
    pipeline_id: Option<String>,
    run_name: Option<String>,
    run_only: bool,
) -> Result<()> {
    let program = ProgramConfig::load(&args.file)
        .with_context(|| format!("Failed to load program file: {}", args.file.display()))?;

    let target = match pipeline_id {
        Some(id) => PipelineTarget::Pipeline(id),
        None => resolve_pipeline(client, args, &program, run_only).await?,
    };

    let experiment = client
        .ensure_experiment(program.experiment_name(), None)
        .await
        .context("Failed to find or create experiment")?;

    let name = run_name
        .or_else(|| non_empty(&program.run.name).map(str::to_string))
        .unwrap_or_else(|| program.pipeline_name().to_string());
    let request = run_request(
        name,
        non_empty(&program.pipeline.description).map(str::to_string),
        &target,
        &experiment.id,
        run_parameters(&program, args),
    );

    let detail = client
        .create_run(request)
        .await
        .context("Failed to start run")?;

    println!("{}", "✓ Run started successfully!".green().bold());
    println!("  Run ID:      {}", detail.run.id.cyan());
    println!("  Name:        {}", detail.run.name.bold());
    println!("  Pipeline ID: {}", target.pipeline_id().dimmed());
    if let PipelineTarget::Version { version_id, .. } = &target {
        println!("  Version ID:  {}", version_id.dimmed());
    }
    println!("  Experiment:  {}", experiment.name.dimmed());
    if !detail.run.status.is_empty() {
        println!("  Status:      {}", detail.run.status.yellow());
    }

    Ok(())
}

/// Upload the program as a new pipeline, or as a new version of the
/// pipeline with the same name
async fn resolve_pipeline(
    client: &PipelinesClient,
    args: &ProgramArgs,
    program: &ProgramConfig,
    run_only: bool,
) -> Result<PipelineTarget> {
    let existing = client
        .find_pipeline(program.pipeline_name())
        .await
        .context("Failed to look up pipeline")?;

    match existing {
        Some(pipeline) if run_only => {
            debug!("Found pipeline {} ({})", pipeline.name, pipeline.id);
            Ok(PipelineTarget::Pipeline(pipeline.id))
        }
        None if run_only => anyhow::bail!(
            "Pipeline '{}' not found; create it with `same program create` first",
            program.pipeline_name()
        ),
        Some(pipeline) => {
            let (_, archive) = program_archive(args).await?;
            let version = client
                .upload_pipeline_version(&pipeline.id, &Uuid::new_v4().to_string(), archive)
                .await
                .context("Failed to upload pipeline version")?;
            Ok(PipelineTarget::Version {
                pipeline_id: pipeline.id,
                version_id: version.id,
            })
        }
        None => {
            let (program, archive) = program_archive(args).await?;
            let description = non_empty(&program.pipeline.description);
            let pipeline = client
                .upload_pipeline(program.pipeline_name(), description, archive)
                .await
                .context("Failed to upload pipeline")?;
            Ok(PipelineTarget::Pipeline(pipeline.id))
        }
    }
}

/// Run request owned by the experiment; a version target is referenced as
/// the run's creator instead of by pipeline id
fn run_request(
    name: String,
    description: Option<String>,
    target: &PipelineTarget,
    experiment_id: &str,
    parameters: Vec<ApiParameter>,
) -> CreateRun {
    let mut resource_references = vec![ResourceReference::owner(
        ResourceType::Experiment,
        experiment_id,
    )];
    let pipeline_id = match target {
        PipelineTarget::Pipeline(id) => Some(id.clone()),
        PipelineTarget::Version { version_id, .. } => {
            resource_references.push(ResourceReference::creator(
                ResourceType::PipelineVersion,
                version_id.clone(),
            ));
            None
        }
    };

    CreateRun {
        name,
        description,
        pipeline_spec: ApiPipelineSpec {
            pipeline_id,
            parameters,
            ..ApiPipelineSpec::default()
        },
        resource_references,
    }
}

/// Print every pipeline on the server
async fn list_programs(client: &PipelinesClient) -> Result<()> {
    let pipelines = client
        .list_all_pipelines()
        .await
        .context("Failed to list pipelines")?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} pipeline(s):", pipelines.len()).bold()
    );
    println!();
    for pipeline in &pipelines {
        print_pipeline_summary(pipeline);
    }

    Ok(())
}

fn print_pipeline_summary(pipeline: &ApiPipeline) {
    println!("  {} {}", "▸".cyan(), pipeline.name.bold());
    println!("    ID:      {}", pipeline.id.dimmed());
    if let Some(created) = pipeline.created_at {
        println!(
            "    Created: {}",
            created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if let Some(version) = &pipeline.default_version {
        println!("    Version: {}", version.name.dimmed());
    }
    if let Some(description) = pipeline.description.as_deref().and_then(non_empty) {
        println!("    Description: {}", description.dimmed());
    }
    println!();
}

/// Delete a pipeline given its ID, or its name
async fn delete_program(
    client: &PipelinesClient,
    id: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let id = match (id, name) {
        (Some(id), _) => id,
        (None, Some(name)) => client
            .find_pipeline(&name)
            .await
            .context("Failed to look up pipeline")?
            .map(|pipeline| pipeline.id)
            .ok_or_else(|| anyhow::anyhow!("No pipeline named '{}'", name))?,
        (None, None) => anyhow::bail!("Either --id or --name is required"),
    };

    client
        .delete_pipeline(&id)
        .await
        .with_context(|| format!("Failed to delete pipeline {}", id))?;

    println!(
        "{}",
        format!("✓ Pipeline {} deleted successfully!", id)
            .green()
            .bold()
    );

    Ok(())
}

/// Run parameters from same.yaml overridden by `--param`
fn run_parameters(program: &ProgramConfig, args: &ProgramArgs) -> Vec<ApiParameter> {
    program
        .run_parameters(&args.param)
        .into_iter()
        .map(|(name, value)| ApiParameter { name, value })
        .collect()
}

fn non_empty(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"
metadata:
  name: sample
pipeline:
  name: sample
  package: sample.py
run:
  name: nightly
  parameters:
    epochs: 5
"#;

    const NOTEBOOK: &str = "# + tags=[\"parameters\"]\nepochs = 1\n# -\n\n\
                            # SAME-step-1\nprint(epochs)\n\n\
                            # SAME-step-2\nprint('done')\n";

    fn workspace() -> (tempfile::TempDir, ProgramArgs) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("same.yaml"), PROGRAM).unwrap();
        std::fs::write(dir.path().join("sample.py"), NOTEBOOK).unwrap();
        let args = ProgramArgs {
            file: dir.path().join("same.yaml"),
            image: DEFAULT_BASE_IMAGE.to_string(),
            param: vec![],
        };
        (dir, args)
    }

    #[tokio::test]
    async fn test_compile_writes_archive_and_program() {
        let (dir, args) = workspace();
        let output = dir.path().join("out");

        compile_program(&args, Some(output.clone())).await.unwrap();

        let document = read_archive(output.join(ARCHIVE_FILE)).unwrap();
        assert!(String::from_utf8(document).unwrap().contains("same-step-2"));

        let rewritten = ProgramConfig::load(output.join("same.yaml")).unwrap();
        assert_eq!(rewritten.pipeline.package, ARCHIVE_FILE);
        assert_eq!(rewritten.run.name, "nightly");
    }

    #[tokio::test]
    async fn test_program_archive_uses_precompiled_package() {
        let (dir, args) = workspace();
        let output = dir.path().join("out");
        compile_program(&args, Some(output.clone())).await.unwrap();

        let compiled = ProgramArgs {
            file: output.join("same.yaml"),
            ..args
        };
        let (_, bytes) = program_archive(&compiled).await.unwrap();
        assert_eq!(bytes, std::fs::read(output.join(ARCHIVE_FILE)).unwrap());
    }

    #[tokio::test]
    async fn test_load_program_applies_overrides() {
        let (_dir, mut args) = workspace();
        args.param = vec![("epochs".to_string(), "9".to_string())];

        let (_, graph) = load_program(&args).await.unwrap();
        assert_eq!(graph.parameters().get("epochs").unwrap(), "9");
        assert_eq!(graph.topological_order(), vec!["same-step-1", "same-step-2"]);
    }

    #[test]
    fn test_run_parameters() {
        let (_dir, mut args) = workspace();
        args.param = vec![("seed".to_string(), "3".to_string())];
        let program = ProgramConfig::load(&args.file).unwrap();

        let parameters = run_parameters(&program, &args);
        assert_eq!(
            parameters,
            vec![
                ApiParameter {
                    name: "epochs".to_string(),
                    value: "5".to_string()
                },
                ApiParameter {
                    name: "seed".to_string(),
                    value: "3".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("out/pipeline.tar.gz")));
        assert!(is_archive(Path::new("pipeline.tgz")));
        assert!(!is_archive(Path::new("notebook.ipynb")));
    }

    #[test]
    fn test_run_request_for_new_version() {
        let target = PipelineTarget::Version {
            pipeline_id: "pipe-1".to_string(),
            version_id: "ver-2".to_string(),
        };

        let request = run_request("nightly".to_string(), None, &target, "exp-1", vec![]);

        assert_eq!(request.pipeline_spec.pipeline_id, None);
        assert_eq!(
            request.resource_references,
            vec![
                ResourceReference::owner(ResourceType::Experiment, "exp-1"),
                ResourceReference::creator(ResourceType::PipelineVersion, "ver-2"),
            ]
        );
        assert_eq!(target.pipeline_id(), "pipe-1");
    }

    #[test]
    fn test_run_request_for_pipeline() {
        let target = PipelineTarget::Pipeline("pipe-1".to_string());

        let request = run_request("nightly".to_string(), None, &target, "exp-1", vec![]);

        assert_eq!(request.pipeline_spec.pipeline_id.as_deref(), Some("pipe-1"));
        assert_eq!(
            request.resource_references,
            vec![ResourceReference::owner(ResourceType::Experiment, "exp-1")]
        );
    }
}
