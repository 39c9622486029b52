//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod program;
mod record;
mod run;
mod secret;

pub use program::ProgramCommands;
pub use record::RecordCommands;
pub use run::RunCommands;
pub use secret::SecretCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Compile, upload and run notebook programs
    Program {
        #[command(subcommand)]
        command: ProgramCommands,
    },
    /// Registry pull secrets
    Secret {
        #[command(subcommand)]
        command: SecretCommands,
    },
    /// Kubeflow runs of a program
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Signed training run records (params.json)
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Program { command } => program::handle_program_command(command, config).await,
        Commands::Secret { command } => secret::handle_secret_command(command, config).await,
        Commands::Run { command } => {
            let client = config.pipelines_client()?;
            run::handle_run_command(command, &client).await
        }
        Commands::Record { command } => record::handle_record_command(command),
    }
}

/// Parse a single key=value pair
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("epochs=5").unwrap(),
            ("epochs".to_string(), "5".to_string())
        );
        assert_eq!(
            parse_key_val("url=http://x?a=b").unwrap(),
            ("url".to_string(), "http://x?a=b".to_string())
        );
        assert!(parse_key_val("epochs").is_err());
    }
}
