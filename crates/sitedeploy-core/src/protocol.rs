//! Custom-resource request/response envelope.
//!
//! Field names match what provisioning engines send and expect, so a
//! handler built on these types is a drop-in replacement for an existing
//! resource provider. Only `RequestType` and `ResourceProperties` are
//! required; the rest of the envelope defaults to empty.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{DeployError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "Create",
            RequestType::Update => "Update",
            RequestType::Delete => "Delete",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle request for a resource with properties `P`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", bound(deserialize = "P: Deserialize<'de>"))]
pub struct CustomResourceEvent<P> {
    pub request_type: RequestType,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub stack_id: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(rename = "ResponseURL", default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
    pub resource_properties: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<P>,
}

impl<P> CustomResourceEvent<P> {
    /// The physical id an Update or Delete refers to.
    pub fn require_physical_id(&self) -> Result<&str> {
        self.physical_resource_id.as_deref().ok_or_else(|| {
            DeployError::InvalidRequest(format!(
                "{} request without PhysicalResourceId",
                self.request_type
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// The single completion signal returned for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub no_echo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CustomResourceResponse {
    pub fn success<P>(
        event: &CustomResourceEvent<P>,
        physical_resource_id: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: None,
            physical_resource_id: physical_resource_id.into(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            no_echo: false,
            data,
        }
    }

    pub fn failed<P>(
        event: &CustomResourceEvent<P>,
        physical_resource_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: Some(reason.into()),
            physical_resource_id: physical_resource_id.into(),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            no_echo: false,
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// `PUT` the response to the pre-signed `ResponseURL`.
///
/// The URL is signed without a content type, so the header must be empty.
pub async fn deliver_response(
    client: &reqwest::Client,
    url: &str,
    response: &CustomResourceResponse,
) -> Result<()> {
    let body = serde_json::to_vec(response)?;
    let delivery_error = |reason: String| DeployError::ResponseDelivery {
        url: url.to_string(),
        reason,
    };

    let resp = client
        .put(url)
        .header(reqwest::header::CONTENT_TYPE, "")
        .body(body)
        .send()
        .await
        .map_err(|e| delivery_error(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(delivery_error(format!("{status}: {text}")));
    }
    info!(url = %url, status = ?response.status, "delivered response");
    Ok(())
}

/// Deliver `response` if the event carries a `ResponseURL`.
///
/// Delivery failures are logged; the caller still holds the response.
pub async fn respond<P>(
    client: &reqwest::Client,
    event: &CustomResourceEvent<P>,
    response: &CustomResourceResponse,
) {
    if let Some(url) = &event.response_url {
        if let Err(e) = deliver_response(client, url, response).await {
            warn!(error = %e, "response delivery failed");
        }
    }
}

/// Accept `true`/`false` or their string forms; engines stringify properties.
pub fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(de::Error::custom(format!("expected a boolean, got '{other}'"))),
        },
    }
}
