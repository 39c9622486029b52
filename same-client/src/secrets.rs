//! Kubernetes secret store
//!
//! Speaks the core `v1` Secret API. A `409` on create is reported as a
//! conflict so the upsert routine can decide whether to replace; `404` on
//! read means the secret does not exist.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use same_core::domain::credential::{Secret, SecretKey};
use same_core::dto::secret::{SecretManifest, Status};
use same_core::secret::{SecretStore, StoreError, WriteOutcome};
use tracing::debug;

use crate::error::ClientError;
use crate::normalize_base_url;

/// Secret store backed by the Kubernetes API server
#[derive(Debug, Clone)]
pub struct KubeSecretClient {
    /// Base URL of the API server (e.g., "https://10.0.0.1:6443")
    base_url: String,
    /// Bearer token sent with every request, if any
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl KubeSecretClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client with a configured reqwest Client (timeouts, TLS, ...)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            token: None,
            client,
        }
    }

    /// Authenticate with a bearer token; blank tokens are ignored
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{}/secrets", self.base_url, namespace)
    }

    fn secret_url(&self, key: &SecretKey) -> String {
        format!("{}/{}", self.collection_url(&key.namespace), key.name)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn write(&self, request: RequestBuilder, secret: &Secret) -> WriteOutcome {
        let response = match self
            .authorize(request)
            .json(&secret.to_manifest())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return WriteOutcome::Failed(ClientError::from(e).into()),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("Secret {} write answered {}", secret.key, status);
        classify_write(status, &body)
    }
}

#[async_trait]
impl SecretStore for KubeSecretClient {
    async fn create(&self, secret: &Secret) -> WriteOutcome {
        let request = self.client.post(self.collection_url(&secret.key.namespace));
        self.write(request, secret).await
    }

    async fn replace(&self, secret: &Secret) -> WriteOutcome {
        let request = self.client.put(self.secret_url(&secret.key));
        self.write(request, secret).await
    }

    async fn read(&self, key: &SecretKey) -> Result<Option<Secret>, StoreError> {
        let response = self
            .authorize(self.client.get(self.secret_url(key)))
            .send()
            .await
            .map_err(ClientError::from)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.map_err(ClientError::from)?;
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: status_message(&body),
            });
        }

        let manifest: SecretManifest = serde_json::from_str(&body)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let mut secret = Secret::from_manifest(manifest);
        if secret.key.namespace.is_empty() {
            secret.key.namespace = key.namespace.clone();
        }
        Ok(Some(secret))
    }
}

/// Map a write response to the outcome the upsert routine expects
fn classify_write(status: StatusCode, body: &str) -> WriteOutcome {
    if status.is_success() {
        WriteOutcome::Written
    } else if status == StatusCode::CONFLICT {
        WriteOutcome::Conflict
    } else {
        WriteOutcome::Failed(StoreError::Rejected {
            status: status.as_u16(),
            message: status_message(body),
        })
    }
}

/// The `message` of a Kubernetes `Status` body, or the raw body
fn status_message(body: &str) -> String {
    match serde_json::from_str::<Status>(body) {
        Ok(status) if !status.message.is_empty() => status.message,
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_urls() {
        let client = KubeSecretClient::new("https://kube.local:6443/");
        let key = SecretKey::new("kubeflow", "Regcred");

        assert_eq!(client.base_url(), "https://kube.local:6443");
        assert_eq!(
            client.collection_url("kubeflow"),
            "https://kube.local:6443/api/v1/namespaces/kubeflow/secrets"
        );
        assert_eq!(
            client.secret_url(&key),
            "https://kube.local:6443/api/v1/namespaces/kubeflow/secrets/regcred"
        );
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let client = KubeSecretClient::new("http://localhost").with_token(Some("  ".to_string()));
        assert!(client.token.is_none());

        let client = KubeSecretClient::new("http://localhost").with_token(Some("abc".to_string()));
        assert_eq!(client.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_classify_write() {
        assert_eq!(classify_write(StatusCode::CREATED, ""), WriteOutcome::Written);
        assert_eq!(classify_write(StatusCode::OK, ""), WriteOutcome::Written);
        assert_eq!(
            classify_write(StatusCode::CONFLICT, "{}"),
            WriteOutcome::Conflict
        );

        let body = concat!(
            r#"{"kind":"Status","message":"secrets is forbidden","#,
            r#""reason":"Forbidden","code":403}"#
        );
        assert_eq!(
            classify_write(StatusCode::FORBIDDEN, body),
            WriteOutcome::Failed(StoreError::Rejected {
                status: 403,
                message: "secrets is forbidden".to_string()
            })
        );
    }

    #[test]
    fn test_status_message_falls_back_to_body() {
        assert_eq!(status_message("upstream connect error\n"), "upstream connect error");
    }
}
