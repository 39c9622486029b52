//! Registry credential types
//!
//! A credential is turned into a `kubernetes.io/dockerconfigjson` secret so
//! that pipeline pods can pull images from a private registry.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::dto::secret::{DOCKER_CONFIG_KEY, DOCKER_CONFIG_TYPE, SecretManifest};

/// Login for a container registry
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub server: String,
    pub username: String,
    pub password: String,
    pub email: String,
}

impl std::fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

impl RegistryCredential {
    /// Names of the fields that are empty or whitespace
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("server", &self.server),
            ("username", &self.username),
            ("password", &self.password),
            ("email", &self.email),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// base64 of `username:password`
    pub fn auth_token(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }

    /// The docker `config.json` document for this credential
    pub fn docker_config(&self) -> serde_json::Value {
        json!({
            "auths": {
                self.server.clone(): {
                    "username": self.username,
                    "password": self.password,
                    "email": self.email,
                    "auth": self.auth_token(),
                }
            }
        })
    }
}

/// Natural key of a secret in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretKey {
    pub namespace: String,
    pub name: String,
}

impl SecretKey {
    /// Object names are lower-cased; the store only accepts DNS labels
    pub fn new(namespace: impl Into<String>, name: impl AsRef<str>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.as_ref().to_lowercase(),
        }
    }
}

impl std::fmt::Display for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A secret as held by the store: type plus base64-encoded data entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub key: SecretKey,
    pub secret_type: String,
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Image pull secret for `credential`
    pub fn docker_registry(key: SecretKey, credential: &RegistryCredential) -> Self {
        let config = credential.docker_config().to_string();
        let mut data = BTreeMap::new();
        data.insert(DOCKER_CONFIG_KEY.to_string(), STANDARD.encode(config));

        Self {
            key,
            secret_type: DOCKER_CONFIG_TYPE.to_string(),
            data,
        }
    }

    /// Decode one data entry
    pub fn decoded(&self, entry: &str) -> Option<Vec<u8>> {
        self.data.get(entry).and_then(|v| STANDARD.decode(v).ok())
    }

    pub fn to_manifest(&self) -> SecretManifest {
        SecretManifest::new(
            &self.key.namespace,
            &self.key.name,
            &self.secret_type,
            self.data.clone(),
        )
    }

    pub fn from_manifest(manifest: SecretManifest) -> Self {
        Self {
            key: SecretKey {
                namespace: manifest.metadata.namespace.unwrap_or_default(),
                name: manifest.metadata.name,
            },
            secret_type: manifest.secret_type.unwrap_or_default(),
            data: manifest.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> RegistryCredential {
        RegistryCredential {
            server: "registry.example.com".to_string(),
            username: "reader".to_string(),
            password: "s3cret".to_string(),
            email: "ml@example.com".to_string(),
        }
    }

    #[test]
    fn test_missing_fields() {
        assert!(credential().is_complete());

        let partial = RegistryCredential {
            password: String::new(),
            email: "   ".to_string(),
            ..credential()
        };
        assert_eq!(partial.missing_fields(), vec!["password", "email"]);
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_docker_config_payload() {
        let secret =
            Secret::docker_registry(SecretKey::new("kubeflow", "SAME-Experiment"), &credential());

        assert_eq!(secret.key.name, "same-experiment");
        assert_eq!(secret.secret_type, "kubernetes.io/dockerconfigjson");

        let decoded = secret.decoded(".dockerconfigjson").unwrap();
        let config: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        let auth = &config["auths"]["registry.example.com"];
        assert_eq!(auth["username"], "reader");
        assert_eq!(auth["email"], "ml@example.com");
        assert_eq!(auth["auth"], "cmVhZGVyOnMzY3JldA==");
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", credential());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
