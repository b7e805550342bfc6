use crate::{
    config::BackendConfig,
    error::BackendError,
    logging::MaskedSecret,
    models::{CreateJobResponse, JobHandle, QueryDefinition, QueryJobResponse},
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// Job-based search API consumed by the query engine.
///
/// Implementations only translate requests; retry and reuse policy live in
/// `QueryJob`. A 404 must surface as `BackendError::NotFound`.
#[async_trait]
pub trait JobBackend: Send + Sync + 'static {
    /// `POST /{repository}/queryjobs`
    async fn create_job(
        &self,
        repository: &str,
        definition: &QueryDefinition,
    ) -> Result<JobHandle, BackendError>;

    /// `GET /{repository}/queryjobs/{id}`
    async fn poll_job(
        &self,
        repository: &str,
        handle: &JobHandle,
    ) -> Result<QueryJobResponse, BackendError>;

    /// `DELETE /{repository}/queryjobs/{id}`
    async fn delete_job(&self, repository: &str, handle: &JobHandle) -> Result<(), BackendError>;
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: String,
}

/// reqwest implementation of the query-job REST API
pub struct HttpJobBackend {
    client: Client,
    base_url: Url,
    token: String,
    timeout: Duration,
}

impl HttpJobBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(config.base_url.clone()));
        }

        tracing::debug!(
            base_url = %base_url,
            token = %MaskedSecret::new(&config.token),
            timeout_seconds = config.timeout_seconds,
            "Created query job backend"
        );

        Ok(Self {
            client: Client::new(),
            base_url,
            token: config.token.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    /// `{base}/api/v1/repositories/{repository}/queryjobs[/{id}]`
    fn jobs_url(&self, repository: &str, handle: Option<&JobHandle>) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::InvalidUrl(self.base_url.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["api", "v1", "repositories", repository, "queryjobs"]);
            if let Some(handle) = handle {
                segments.push(handle.as_str());
            }
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout);

        if !self.token.is_empty() {
            req = req.bearer_auth(&self.token);
        }
        req
    }
}

/// Map a non-2xx response onto the error taxonomy
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound);
    }

    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    let message = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => err.detail.trim().to_string(),
        Err(_) => body.trim().to_string(),
    };

    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl JobBackend for HttpJobBackend {
    async fn create_job(
        &self,
        repository: &str,
        definition: &QueryDefinition,
    ) -> Result<JobHandle, BackendError> {
        let url = self.jobs_url(repository, None)?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(definition)
            .send()
            .await?;

        let created: CreateJobResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(JobHandle::new(created.id))
    }

    async fn poll_job(
        &self,
        repository: &str,
        handle: &JobHandle,
    ) -> Result<QueryJobResponse, BackendError> {
        let url = self.jobs_url(repository, Some(handle))?;
        let response = self.request(reqwest::Method::GET, url).send().await?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn delete_job(&self, repository: &str, handle: &JobHandle) -> Result<(), BackendError> {
        let url = self.jobs_url(repository, Some(handle))?;
        let response = self.request(reqwest::Method::DELETE, url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}
