//! Secret command handlers
//!
//! Creates or replaces the image pull secret steps use to reach a private
//! registry, and shows what is stored.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use same_core::domain::credential::{RegistryCredential, SecretKey};
use same_core::domain::program::DEFAULT_NAMESPACE;
use same_core::dto::secret::DOCKER_CONFIG_KEY;
use same_core::secret::{
    RegistrySecretConfig, SecretStore, UpsertOutcome, upsert_registry_secret,
};

use crate::config::Config;

/// Secret subcommands
#[derive(Subcommand)]
pub enum SecretCommands {
    /// Create the registry pull secret, replacing it if it exists
    Upsert {
        /// Registry server (e.g., myregistry.azurecr.io)
        #[arg(long, env = "SAME_REGISTRY_SERVER", default_value = "")]
        server: String,

        /// Registry user name
        #[arg(long, env = "SAME_REGISTRY_READ_ONLY_SP_ID", default_value = "")]
        username: String,

        /// Registry password
        #[arg(
            long,
            env = "SAME_REGISTRY_READ_ONLY_SP_PASSWORD",
            hide_env_values = true,
            default_value = ""
        )]
        password: String,

        /// Contact email stored with the credential
        #[arg(long, env = "SAME_REGISTRY_READ_ONLY_EMAIL", default_value = "")]
        email: String,

        /// Namespace that holds the secret
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Secret name (lower-cased)
        #[arg(long, default_value = "regcred")]
        name: String,
    },
    /// Show a stored secret without revealing its values
    Get {
        /// Namespace that holds the secret
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Secret name
        #[arg(long, default_value = "regcred")]
        name: String,
    },
}

/// Handle secret commands
pub async fn handle_secret_command(command: SecretCommands, config: &Config) -> Result<()> {
    let store = config.secret_client()?;

    match command {
        SecretCommands::Upsert {
            server,
            username,
            password,
            email,
            namespace,
            name,
        } => {
            let config = RegistrySecretConfig {
                namespace,
                name,
                credential: RegistryCredential {
                    server,
                    username,
                    password,
                    email,
                },
            };
            upsert_secret(&store, &config).await
        }
        SecretCommands::Get { namespace, name } => {
            get_secret(&store, &SecretKey::new(namespace, name)).await
        }
    }
}

async fn upsert_secret(store: &dyn SecretStore, config: &RegistrySecretConfig) -> Result<()> {
    let key = config.key();
    let outcome = upsert_registry_secret(store, config)
        .await
        .with_context(|| format!("Failed to upsert secret {}", key))?;

    match outcome {
        UpsertOutcome::Created => {
            println!("{}", format!("✓ Secret {} created", key).green().bold());
        }
        UpsertOutcome::Replaced => {
            println!("{}", format!("✓ Secret {} replaced", key).green().bold());
        }
        UpsertOutcome::Aborted { missing } => {
            println!(
                "{}",
                format!("! Secret {} already exists and was left unchanged", key)
                    .yellow()
                    .bold()
            );
            println!("  Missing: {}", missing.join(", ").yellow());
        }
    }

    Ok(())
}

async fn get_secret(store: &dyn SecretStore, key: &SecretKey) -> Result<()> {
    let Some(secret) = store
        .read(key)
        .await
        .with_context(|| format!("Failed to read secret {}", key))?
    else {
        println!("{}", format!("Secret {} not found.", key).yellow());
        return Ok(());
    };

    println!("{}", "Secret Details:".bold());
    println!("  Name: {}", secret.key.to_string().cyan());
    println!("  Type: {}", secret.secret_type);
    let keys: Vec<&str> = secret.data.keys().map(String::as_str).collect();
    println!("  Keys: {}", keys.join(", ").dimmed());

    if let Some(servers) = registry_servers(secret.decoded(DOCKER_CONFIG_KEY).as_deref()) {
        println!("  Registries: {}", servers.join(", ").dimmed());
    }

    Ok(())
}

/// Registry hosts named in a decoded `.dockerconfigjson`
fn registry_servers(config: Option<&[u8]>) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_slice(config?).ok()?;
    let auths = value.get("auths")?.as_object()?;
    Some(auths.keys().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use same_core::domain::credential::Secret;

    #[test]
    fn test_registry_servers() {
        let credential = RegistryCredential {
            server: "registry.example.com".to_string(),
            username: "reader".to_string(),
            password: "s3cret".to_string(),
            email: "ops@example.com".to_string(),
        };
        let secret = Secret::docker_registry(SecretKey::new("kubeflow", "regcred"), &credential);

        let servers = registry_servers(secret.decoded(DOCKER_CONFIG_KEY).as_deref());
        assert_eq!(servers, Some(vec!["registry.example.com".to_string()]));
    }

    #[test]
    fn test_registry_servers_ignores_other_payloads() {
        assert_eq!(registry_servers(None), None);
        assert_eq!(registry_servers(Some(&b"not json"[..])), None);
    }
}
