//! SAME CLI
//!
//! Command-line interface for compiling notebooks into Kubeflow pipelines,
//! managing registry pull secrets and recording training runs.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "same")]
#[command(about = "Compile notebooks into Kubeflow pipelines", long_about = None)]
struct Cli {
    /// Kubernetes API server URL
    #[arg(
        long,
        global = true,
        env = "SAME_KUBE_API_URL",
        default_value = "https://kubernetes.default.svc"
    )]
    kube_api_url: String,

    /// Bearer token for the Kubernetes API
    #[arg(long, global = true, env = "SAME_KUBE_TOKEN", hide_env_values = true)]
    kube_token: Option<String>,

    /// Kubeflow Pipelines API URL
    #[arg(
        long,
        global = true,
        env = "SAME_KFP_API_URL",
        default_value = "http://localhost:8888"
    )]
    kfp_api_url: String,

    /// Per-request timeout in seconds (no timeout if unset)
    #[arg(long, global = true, env = "SAME_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "same_cli=info,same_core=info,same_client=info,same_notebook=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        kube_api_url: cli.kube_api_url,
        kube_token: cli.kube_token,
        kfp_api_url: cli.kfp_api_url,
        request_timeout: cli.request_timeout.map(Duration::from_secs),
    };
    config.validate()?;

    handle_command(cli.command, &config).await
}
