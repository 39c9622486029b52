//! Secret store adapter interface

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::credential::{Secret, SecretKey};

/// Failures reported by a secret store other than a create conflict
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store answered with an error status
    #[error("secret store rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got an answer
    #[error("secret store request failed: {0}")]
    Transport(String),

    #[error("secret store request timed out")]
    Timeout,

    #[error("invalid response from secret store: {0}")]
    InvalidResponse(String),
}

/// Result of a create or replace request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// A secret with the same key already exists
    Conflict,
    Failed(StoreError),
}

/// A key-value store addressed by (namespace, name)
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create a secret; reports [`WriteOutcome::Conflict`] if the key exists
    async fn create(&self, secret: &Secret) -> WriteOutcome;

    /// Overwrite an existing secret
    async fn replace(&self, secret: &Secret) -> WriteOutcome;

    /// Fetch a secret, `None` if absent
    async fn read(&self, key: &SecretKey) -> Result<Option<Secret>, StoreError>;
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that counts writes and can be told to fail
    #[derive(Default)]
    pub(crate) struct MemorySecretStore {
        secrets: Mutex<BTreeMap<SecretKey, Secret>>,
        pub(crate) creates: AtomicUsize,
        pub(crate) replaces: AtomicUsize,
        pub(crate) fail_with: Option<StoreError>,
    }

    impl MemorySecretStore {
        pub(crate) fn with_secret(secret: Secret) -> Self {
            let store = Self::default();
            store
                .secrets
                .lock()
                .unwrap()
                .insert(secret.key.clone(), secret);
            store
        }

        pub(crate) fn failing(error: StoreError) -> Self {
            Self {
                fail_with: Some(error),
                ..Self::default()
            }
        }

        pub(crate) fn get(&self, key: &SecretKey) -> Option<Secret> {
            self.secrets.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl SecretStore for MemorySecretStore {
        async fn create(&self, secret: &Secret) -> WriteOutcome {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = &self.fail_with {
                return WriteOutcome::Failed(error.clone());
            }
            let mut secrets = self.secrets.lock().unwrap();
            if secrets.contains_key(&secret.key) {
                return WriteOutcome::Conflict;
            }
            secrets.insert(secret.key.clone(), secret.clone());
            WriteOutcome::Written
        }

        async fn replace(&self, secret: &Secret) -> WriteOutcome {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            let mut secrets = self.secrets.lock().unwrap();
            if !secrets.contains_key(&secret.key) {
                return WriteOutcome::Failed(StoreError::Rejected {
                    status: 404,
                    message: format!("secret {} not found", secret.key),
                });
            }
            secrets.insert(secret.key.clone(), secret.clone());
            WriteOutcome::Written
        }

        async fn read(&self, key: &SecretKey) -> Result<Option<Secret>, StoreError> {
            Ok(self.get(key))
        }
    }
}
