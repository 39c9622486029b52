//! Configuration module
//!
//! Connection settings shared by every command, collected from flags and
//! their `SAME_*` environment fallbacks.

use anyhow::Result;
use same_client::{KubeSecretClient, PipelinesClient, http_client};
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Kubernetes API server URL
    pub kube_api_url: String,

    /// Bearer token for the Kubernetes API
    pub kube_token: Option<String>,

    /// Kubeflow Pipelines API URL
    pub kfp_api_url: String,

    /// Applied to every HTTP request when set
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("kube_api_url", &self.kube_api_url),
            ("kfp_api_url", &self.kfp_api_url),
        ] {
            if url.is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn secret_client(&self) -> Result<KubeSecretClient> {
        let client = http_client(self.request_timeout)?;
        Ok(KubeSecretClient::with_client(&self.kube_api_url, client)
            .with_token(self.kube_token.clone()))
    }

    pub fn pipelines_client(&self) -> Result<PipelinesClient> {
        let client = http_client(self.request_timeout)?;
        Ok(PipelinesClient::with_client(&self.kfp_api_url, client))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kube_api_url: "https://kubernetes.default.svc".to_string(),
            kube_token: None,
            kfp_api_url: "http://localhost:8888".to_string(),
            request_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.request_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.kfp_api_url = "localhost:8888".to_string();
        assert!(config.validate().is_err());

        config.kfp_api_url = "http://localhost:8888".to_string();
        config.kube_api_url = String::new();
        assert!(config.validate().is_err());

        config.kube_api_url = "https://10.0.0.1:6443".to_string();
        config.request_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config.request_timeout = Some(Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_clients_use_configured_urls() {
        let config = Config {
            kube_api_url: "https://10.0.0.1:6443/".to_string(),
            kube_token: Some("token".to_string()),
            ..Config::default()
        };

        assert_eq!(config.secret_client().unwrap().base_url(), "https://10.0.0.1:6443");
        assert_eq!(
            config.pipelines_client().unwrap().base_url(),
            "http://localhost:8888"
        );
    }
}
