//! Create-or-replace for registry pull secrets
//!
//! Create first. If the key already exists, replace it, but only when every
//! credential field is present; an incomplete credential leaves the stored
//! secret untouched and is reported as [`UpsertOutcome::Aborted`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::{SecretStore, StoreError, WriteOutcome};
use crate::domain::credential::{RegistryCredential, Secret, SecretKey};

/// Everything the upsert needs, assembled by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySecretConfig {
    pub namespace: String,
    pub name: String,
    pub credential: RegistryCredential,
}

impl RegistrySecretConfig {
    pub fn key(&self) -> SecretKey {
        SecretKey::new(&self.namespace, &self.name)
    }
}

/// How an upsert finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No secret existed; it was created
    Created,
    /// A secret existed and was overwritten
    Replaced,
    /// A secret existed and the credential was incomplete; nothing changed
    Aborted { missing: Vec<&'static str> },
}

/// Ensure the pull secret described by `config` exists with the given value
///
/// Any store failure other than a create conflict is returned unchanged and
/// not retried.
pub async fn upsert_registry_secret(
    store: &dyn SecretStore,
    config: &RegistrySecretConfig,
) -> Result<UpsertOutcome, StoreError> {
    let key = config.key();
    let secret = Secret::docker_registry(key.clone(), &config.credential);

    debug!("Creating secret {}", key);
    match store.create(&secret).await {
        WriteOutcome::Written => {
            info!("Created secret {}", key);
            return Ok(UpsertOutcome::Created);
        }
        WriteOutcome::Failed(error) => return Err(error),
        WriteOutcome::Conflict => {
            debug!("Secret {} already exists", key);
        }
    }

    let missing = config.credential.missing_fields();
    if !missing.is_empty() {
        warn!(
            "Secret {} already exists and the credential is missing {}; leaving it unchanged",
            key,
            missing.join(", ")
        );
        return Ok(UpsertOutcome::Aborted { missing });
    }

    match store.replace(&secret).await {
        WriteOutcome::Written => {
            info!("Replaced secret {}", key);
            Ok(UpsertOutcome::Replaced)
        }
        WriteOutcome::Conflict => Err(StoreError::Rejected {
            status: 409,
            message: format!("secret {} changed while it was being replaced", key),
        }),
        WriteOutcome::Failed(error) => Err(error),
    }
}
