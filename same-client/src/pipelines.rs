//! Kubeflow Pipelines v1beta1 endpoints

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use same_core::dto::pipeline::{
    ApiExperiment, ApiPipeline, ApiPipelineVersion, ApiRun, CreateExperiment, CreateRun, Filter,
    ListExperiments, ListPipelines, ListRuns, ResourceType, RunDetail,
};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::{handle_empty_response, handle_response, normalize_base_url};

/// File name the upload endpoints see for compiled archives
const UPLOAD_FILE_NAME: &str = "pipeline.tar.gz";

/// HTTP client for the Kubeflow Pipelines API server
#[derive(Debug, Clone)]
pub struct PipelinesClient {
    /// Base URL of the API server (e.g., "http://localhost:8888")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl PipelinesClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client with a configured reqwest Client (timeouts, TLS, ...)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/apis/v1beta1/{}", self.base_url, path)
    }

    // =============================================================================
    // Pipelines
    // =============================================================================

    /// Upload a compiled pipeline archive
    ///
    /// # Arguments
    /// * `name` - Display name of the new pipeline; must be unique on the server
    /// * `description` - Optional description
    /// * `archive` - Bytes of the gzipped tarball produced by `compile`
    pub async fn upload_pipeline(
        &self,
        name: &str,
        description: Option<&str>,
        archive: Vec<u8>,
    ) -> Result<ApiPipeline> {
        let url = self.url("pipelines/upload");

        let mut query = vec![("name", name)];
        if let Some(description) = description {
            query.push(("description", description));
        }

        debug!("Uploading pipeline '{}' to {}", name, url);
        let response = self
            .client
            .post(&url)
            .query(&query)
            .multipart(archive_form(archive)?)
            .send()
            .await?;

        let pipeline: ApiPipeline = handle_response(response).await?;
        info!("Uploaded pipeline {} ({})", pipeline.name, pipeline.id);
        Ok(pipeline)
    }

    /// Upload a compiled archive as a new version of an existing pipeline
    ///
    /// # Arguments
    /// * `pipeline_id` - The pipeline the version belongs to
    /// * `name` - Version name; must be unique within the pipeline
    /// * `archive` - Bytes of the gzipped tarball produced by `compile`
    pub async fn upload_pipeline_version(
        &self,
        pipeline_id: &str,
        name: &str,
        archive: Vec<u8>,
    ) -> Result<ApiPipelineVersion> {
        let url = self.url("pipelines/upload_version");

        debug!("Uploading version '{}' of pipeline {}", name, pipeline_id);
        let response = self
            .client
            .post(&url)
            .query(&[("name", name), ("pipelineid", pipeline_id)])
            .multipart(archive_form(archive)?)
            .send()
            .await?;

        let version: ApiPipelineVersion = handle_response(response).await?;
        info!(
            "Uploaded version {} ({}) of pipeline {}",
            version.name, version.id, pipeline_id
        );
        Ok(version)
    }

    /// List pipelines, one page at a time
    ///
    /// Pass the previous page's `next_page_token` to continue.
    pub async fn list_pipelines(&self, page_token: Option<&str>) -> Result<ListPipelines> {
        let response = self
            .client
            .get(self.url("pipelines"))
            .query(&page_query(page_token))
            .send()
            .await?;

        handle_response(response).await
    }

    /// Every pipeline on the server, following page tokens
    pub async fn list_all_pipelines(&self) -> Result<Vec<ApiPipeline>> {
        let mut pipelines = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_pipelines(page_token.as_deref()).await?;
            pipelines.extend(page.pipelines);
            if page.next_page_token.is_empty() {
                return Ok(pipelines);
            }
            page_token = Some(page.next_page_token);
        }
    }

    /// Find a pipeline by exact display name across all pages
    pub async fn find_pipeline(&self, name: &str) -> Result<Option<ApiPipeline>> {
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_pipelines(page_token.as_deref()).await?;
            if let Some(found) = page.pipelines.into_iter().find(|p| p.name == name) {
                return Ok(Some(found));
            }
            if page.next_page_token.is_empty() {
                return Ok(None);
            }
            page_token = Some(page.next_page_token);
        }
    }

    /// Delete a pipeline and all of its versions
    pub async fn delete_pipeline(&self, pipeline_id: &str) -> Result<()> {
        let url = self.url(&format!("pipelines/{}", pipeline_id));
        let response = self.client.delete(&url).send().await?;

        handle_empty_response(response).await?;
        info!("Deleted pipeline {}", pipeline_id);
        Ok(())
    }

    // =============================================================================
    // Experiments
    // =============================================================================

    /// List experiments, optionally filtered, one page at a time
    pub async fn list_experiments(
        &self,
        filter: Option<&Filter>,
        page_token: Option<&str>,
    ) -> Result<ListExperiments> {
        let response = self
            .client
            .get(self.url("experiments"))
            .query(&experiment_query(filter, page_token)?)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Find an experiment by exact name
    pub async fn find_experiment(&self, name: &str) -> Result<Option<ApiExperiment>> {
        let filter = Filter::name_equals(name);
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_experiments(Some(&filter), page_token.as_deref())
                .await?;
            if let Some(found) = page.experiments.into_iter().find(|e| e.name == name) {
                return Ok(Some(found));
            }
            if page.next_page_token.is_empty() {
                return Ok(None);
            }
            page_token = Some(page.next_page_token);
        }
    }

    pub async fn create_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ApiExperiment> {
        let request = CreateExperiment {
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        let response = self
            .client
            .post(self.url("experiments"))
            .json(&request)
            .send()
            .await?;

        let experiment: ApiExperiment = handle_response(response).await?;
        info!("Created experiment {} ({})", experiment.name, experiment.id);
        Ok(experiment)
    }

    /// Find the experiment named `name`, creating it if it does not exist
    ///
    /// A create that conflicts because another client created the experiment
    /// first falls back to a second lookup.
    pub async fn ensure_experiment(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ApiExperiment> {
        if let Some(experiment) = self.find_experiment(name).await? {
            debug!("Found experiment {} ({})", experiment.name, experiment.id);
            return Ok(experiment);
        }

        match self.create_experiment(name, description).await {
            Err(e) if e.is_conflict() => {
                debug!("Experiment {} was created concurrently", name);
                self.find_experiment(name).await?.ok_or(e)
            }
            result => result,
        }
    }

    // =============================================================================
    // Runs
    // =============================================================================

    /// Start a run of an uploaded pipeline
    pub async fn create_run(&self, req: CreateRun) -> Result<RunDetail> {
        let response = self.client.post(self.url("runs")).json(&req).send().await?;

        let detail: RunDetail = handle_response(response).await?;
        info!("Started run {} ({})", detail.run.name, detail.run.id);
        Ok(detail)
    }

    /// List runs, newest first, one page at a time
    ///
    /// # Arguments
    /// * `owner` - Only runs referencing this resource (e.g. an experiment)
    /// * `page_token` - The previous page's `next_page_token`
    pub async fn list_runs(
        &self,
        owner: Option<(ResourceType, &str)>,
        page_token: Option<&str>,
    ) -> Result<ListRuns> {
        let response = self
            .client
            .get(self.url("runs"))
            .query(&run_query(owner, page_token))
            .send()
            .await?;

        handle_response(response).await
    }

    /// Every run referencing `owner`, following page tokens
    pub async fn list_all_runs(&self, owner: Option<(ResourceType, &str)>) -> Result<Vec<ApiRun>> {
        let mut runs = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list_runs(owner, page_token.as_deref()).await?;
            runs.extend(page.runs);
            if page.next_page_token.is_empty() {
                return Ok(runs);
            }
            page_token = Some(page.next_page_token);
        }
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunDetail> {
        let url = self.url(&format!("runs/{}", run_id));
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }
}

fn archive_form(archive: Vec<u8>) -> Result<Form> {
    let part = Part::bytes(archive)
        .file_name(UPLOAD_FILE_NAME)
        .mime_str("application/gzip")?;
    Ok(Form::new().part("uploadfile", part))
}

fn page_query(page_token: Option<&str>) -> Vec<(&'static str, String)> {
    page_token
        .filter(|t| !t.is_empty())
        .map(|token| vec![("page_token", token.to_string())])
        .unwrap_or_default()
}

fn experiment_query(
    filter: Option<&Filter>,
    page_token: Option<&str>,
) -> Result<Vec<(&'static str, String)>> {
    let mut query = page_query(page_token);
    if let Some(filter) = filter {
        let encoded = serde_json::to_string(filter)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid filter: {}", e)))?;
        query.push(("filter", encoded));
    }
    Ok(query)
}

fn run_query(
    owner: Option<(ResourceType, &str)>,
    page_token: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut query = page_query(page_token);
    query.push(("sort_by", "created_at desc".to_string()));
    if let Some((resource_type, id)) = owner {
        query.push(("resource_reference_key.type", resource_type.as_str().to_string()));
        query.push(("resource_reference_key.id", id.to_string()));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PipelinesClient::new("http://localhost:8888");
        assert_eq!(client.base_url(), "http://localhost:8888");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = PipelinesClient::new("http://localhost:8888/pipeline/");
        assert_eq!(client.base_url(), "http://localhost:8888/pipeline");
        assert_eq!(
            client.url("pipelines/upload_version"),
            "http://localhost:8888/pipeline/apis/v1beta1/pipelines/upload_version"
        );
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = crate::http_client(Some(std::time::Duration::from_secs(30))).unwrap();
        let client = PipelinesClient::with_client("http://localhost:8888", http_client);
        assert_eq!(client.base_url(), "http://localhost:8888");
    }

    #[test]
    fn test_page_query_skips_empty_token() {
        assert!(page_query(None).is_empty());
        assert!(page_query(Some("")).is_empty());
        assert_eq!(page_query(Some("abc")), vec![("page_token", "abc".to_string())]);
    }

    #[test]
    fn test_experiment_query_encodes_filter() {
        let filter = Filter::name_equals("tacos");
        let query = experiment_query(Some(&filter), None).unwrap();

        assert_eq!(query.len(), 1);
        assert_eq!(query[0].0, "filter");
        assert!(query[0].1.contains(r#""string_value":"tacos""#));
    }

    #[test]
    fn test_run_query_by_experiment() {
        let query = run_query(Some((ResourceType::Experiment, "exp-1")), Some("next"));

        assert_eq!(
            query,
            vec![
                ("page_token", "next".to_string()),
                ("sort_by", "created_at desc".to_string()),
                ("resource_reference_key.type", "EXPERIMENT".to_string()),
                ("resource_reference_key.id", "exp-1".to_string()),
            ]
        );
    }
}
