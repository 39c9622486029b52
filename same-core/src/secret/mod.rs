//! Secret store seam and credential upsert
//!
//! The store adapter reports each write as an explicit [`WriteOutcome`]; the
//! upsert routine drives its create / check / replace steps from those values
//! rather than from error handling.

mod store;
mod upsert;

pub use store::{SecretStore, StoreError, WriteOutcome};
pub use upsert::{RegistrySecretConfig, UpsertOutcome, upsert_registry_secret};

#[cfg(test)]
pub(crate) use store::memory::MemorySecretStore;
