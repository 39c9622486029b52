//! Training run records
//!
//! A run record is the `params.json` written next to a trained model: the
//! hyperparameters used plus keyed signatures of the dataset index and of the
//! model file, so a later step can tell whether either changed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Key used for signatures unless the caller supplies one
pub const DEFAULT_SIGNING_KEY: &str = "kf_pipeline";

#[derive(Debug, Error)]
pub enum RunRecordError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid run record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signing key rejected")]
    InvalidKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_signature: Option<String>,
    #[serde(default)]
    pub hyperparameters: IndexMap<String, serde_json::Value>,
}

impl RunRecord {
    pub fn new(hyperparameters: IndexMap<String, serde_json::Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            dataset_signature: None,
            model_signature: None,
            hyperparameters,
        }
    }

    /// Sign the dataset and model files with `key`
    pub fn with_signatures(
        mut self,
        dataset: impl AsRef<Path>,
        model: impl AsRef<Path>,
        key: &str,
    ) -> Result<Self, RunRecordError> {
        self.dataset_signature = Some(sign_file(dataset, key)?);
        self.model_signature = Some(sign_file(model, key)?);
        Ok(self)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), RunRecordError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, RunRecordError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// HMAC-SHA256 of a file's contents, upper-case hex
pub fn sign_file(path: impl AsRef<Path>, key: &str) -> Result<String, RunRecordError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key.as_bytes()).map_err(|_| RunRecordError::InvalidKey)?;

    let mut file = File::open(path)?;
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        mac.update(&buffer[..read]);
    }

    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}
