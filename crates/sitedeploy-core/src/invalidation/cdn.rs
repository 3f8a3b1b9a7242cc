//! CDN control-plane client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CdnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationStatus {
    InProgress,
    Completed,
}

/// The two CDN operations the orchestrator needs.
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Issue an invalidation and return its id. Reusing `caller_reference`
    /// returns the invalidation created by the first call.
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, CdnError>;

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, CdnError>;
}

/// Where the CDN API lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnConfig {
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl CdnConfig {
    pub const ENDPOINT_ENV: &'static str = "SITEDEPLOY_CDN_ENDPOINT";
    pub const TOKEN_ENV: &'static str = "SITEDEPLOY_CDN_TOKEN";

    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Read `SITEDEPLOY_CDN_ENDPOINT` and `SITEDEPLOY_CDN_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(Self::ENDPOINT_ENV).ok()?;
        let mut config = Self::new(&endpoint);
        config.token = std::env::var(Self::TOKEN_ENV).ok();
        Some(config)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvalidationRequest<'a> {
    paths: &'a [String],
    caller_reference: &'a str,
}

#[derive(Deserialize)]
struct InvalidationBody {
    id: String,
    status: InvalidationStatus,
}

/// JSON-over-HTTP client for a CDN control API.
///
/// `POST {endpoint}/distributions/{id}/invalidations` creates an
/// invalidation; `GET {endpoint}/distributions/{id}/invalidations/{inv}`
/// reports its status.
#[derive(Debug, Clone)]
pub struct HttpCdnClient {
    config: CdnConfig,
    http: reqwest::Client,
}

impl HttpCdnClient {
    pub fn new(config: CdnConfig) -> Result<Self, CdnError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sitedeploy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    fn url(&self, distribution_id: &str, rest: &str) -> String {
        format!(
            "{}/distributions/{}/invalidations{}",
            self.config.endpoint, distribution_id, rest
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_body(
        resp: reqwest::Response,
        not_found: impl FnOnce() -> CdnError,
    ) -> Result<InvalidationBody, CdnError> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(not_found());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CdnError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CdnClient for HttpCdnClient {
    async fn create_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, CdnError> {
        let req = self
            .http
            .post(self.url(distribution_id, ""))
            .json(&CreateInvalidationRequest {
                paths,
                caller_reference,
            });
        let resp = self.authorize(req).send().await?;
        let body = Self::read_body(resp, || {
            CdnError::DistributionNotFound(distribution_id.to_string())
        })
        .await?;
        debug!(distribution_id, invalidation_id = %body.id, "created invalidation");
        Ok(body.id)
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, CdnError> {
        let req = self
            .http
            .get(self.url(distribution_id, &format!("/{invalidation_id}")));
        let resp = self.authorize(req).send().await?;
        let body = Self::read_body(resp, || {
            CdnError::InvalidationNotFound(invalidation_id.to_string())
        })
        .await?;
        Ok(body.status)
    }
}
