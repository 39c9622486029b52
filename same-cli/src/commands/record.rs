//! Run record command handlers
//!
//! Writes and reads the signed `params.json` a training step leaves next to
//! its model.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use indexmap::IndexMap;
use same_core::domain::run_record::{DEFAULT_SIGNING_KEY, RunRecord};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

use super::parse_key_val;

/// Record subcommands
#[derive(Subcommand)]
pub enum RecordCommands {
    /// Write params.json with hyperparameters and dataset/model signatures
    Create {
        /// Dataset index file to sign
        #[arg(long)]
        dataset: PathBuf,

        /// Trained model file to sign
        #[arg(long)]
        model: PathBuf,

        /// Where to write the record
        #[arg(short, long, default_value = "params.json")]
        output: PathBuf,

        /// Signing key
        #[arg(
            long,
            env = "SAME_SIGNING_KEY",
            hide_env_values = true,
            default_value = DEFAULT_SIGNING_KEY
        )]
        key: String,

        /// Hyperparameters as key=value pairs; JSON values are kept typed
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,
    },
    /// Show a run record
    Show {
        /// Path to the record
        #[arg(default_value = "params.json")]
        path: PathBuf,
    },
}

/// Handle record commands
pub fn handle_record_command(command: RecordCommands) -> Result<()> {
    match command {
        RecordCommands::Create {
            dataset,
            model,
            output,
            key,
            param,
        } => create_record(dataset, model, output, &key, param),
        RecordCommands::Show { path } => show_record(path),
    }
}

fn create_record(
    dataset: PathBuf,
    model: PathBuf,
    output: PathBuf,
    key: &str,
    params: Vec<(String, String)>,
) -> Result<()> {
    let record = RunRecord::new(hyperparameters(params))
        .with_signatures(&dataset, &model, key)
        .context("Failed to sign dataset and model")?;
    record
        .write(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{}", "✓ Run recorded successfully!".green().bold());
    println!("  Run ID: {}", record.run_id.to_string().cyan());
    println!("  Output: {}", output.display().to_string().dimmed());

    Ok(())
}

fn show_record(path: PathBuf) -> Result<()> {
    let record =
        RunRecord::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;

    println!("{}", "Run Record:".bold());
    println!("  Run ID:  {}", record.run_id.to_string().cyan());
    println!(
        "  Created: {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(signature) = &record.dataset_signature {
        println!("  Dataset: {}", signature.dimmed());
    }
    if let Some(signature) = &record.model_signature {
        println!("  Model:   {}", signature.dimmed());
    }
    if !record.hyperparameters.is_empty() {
        println!("  Hyperparameters:");
    }
    for (name, value) in &record.hyperparameters {
        println!("    - {}: {}", name.cyan(), value);
    }

    Ok(())
}

/// Parse each value as JSON, falling back to a plain string
fn hyperparameters(params: Vec<(String, String)>) -> IndexMap<String, JsonValue> {
    params
        .into_iter()
        .map(|(name, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw));
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hyperparameters_keep_types() {
        let params = hyperparameters(vec![
            ("epochs".to_string(), "5".to_string()),
            ("lr".to_string(), "0.001".to_string()),
            ("optimizer".to_string(), "adam".to_string()),
            ("augment".to_string(), "true".to_string()),
        ]);

        assert_eq!(params["epochs"], json!(5));
        assert_eq!(params["lr"], json!(0.001));
        assert_eq!(params["optimizer"], json!("adam"));
        assert_eq!(params["augment"], json!(true));
    }

    #[test]
    fn test_create_record_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("train.txt");
        let model = dir.path().join("latest.h5");
        let output = dir.path().join("params.json");
        std::fs::write(&dataset, "a.jpg\n").unwrap();
        std::fs::write(&model, b"weights").unwrap();

        create_record(
            dataset,
            model,
            output.clone(),
            DEFAULT_SIGNING_KEY,
            vec![("epochs".to_string(), "5".to_string())],
        )
        .unwrap();

        let record = RunRecord::read(&output).unwrap();
        assert_eq!(record.hyperparameters["epochs"], json!(5));
        assert!(record.dataset_signature.is_some());
        assert!(show_record(output).is_ok());
    }

    #[test]
    fn test_hyperparameter_named_like_record_field() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("train.txt");
        let model = dir.path().join("latest.h5");
        let output = dir.path().join("params.json");
        std::fs::write(&dataset, "a.jpg\n").unwrap();
        std::fs::write(&model, b"weights").unwrap();

        create_record(
            dataset,
            model,
            output.clone(),
            DEFAULT_SIGNING_KEY,
            vec![("run_id".to_string(), "5".to_string())],
        )
        .unwrap();

        let record = RunRecord::read(&output).unwrap();
        assert_eq!(record.hyperparameters["run_id"], json!(5));
        assert!(show_record(output).is_ok());
    }
}
