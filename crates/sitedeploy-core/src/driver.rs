//! Local end-to-end deployment.
//!
//! [`LocalDriver`] stands in for the provisioning engine: it packages the
//! site, publishes the archives, sends the deployment resource a Create or
//! Update, and replaces the invalidation resource when the build id moved.
//! The deployment is recorded in the state file as soon as it succeeds; the
//! invalidation record is only replaced once the invalidation completes, so
//! a failed invalidation is retried by the next deploy.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sitedeploy_store::StoreRegistry;
use tracing::info;
use uuid::Uuid;

use crate::config::SiteConfig;
use crate::error::{CdnError, DeployError, Result};
use crate::fingerprint::BuildId;
use crate::invalidation::{
    CdnClient, HandlerOutcome, InvalidationEvent, InvalidationOrchestrator, InvalidationProperties,
};
use crate::lifecycle::{DeploymentEvent, DeploymentHandler, DeploymentProperties};
use crate::package::{self, SitePackage};
use crate::protocol::{CustomResourceEvent, CustomResourceResponse, RequestType};
use crate::state::{DeployState, ResourceRecord, StateFile};

const STACK_ID: &str = "local";
const DEPLOYMENT_LOGICAL_ID: &str = "SiteDeployment";
const INVALIDATION_LOGICAL_ID: &str = "SiteInvalidation";

/// Summary of one `deploy`.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub request_type: RequestType,
    pub physical_resource_id: String,
    pub build_id: BuildId,
    pub placeholder: bool,
    pub invalidated: bool,
    pub data: Option<Value>,
}

pub struct LocalDriver {
    config: SiteConfig,
    registry: StoreRegistry,
    cdn: Option<Arc<dyn CdnClient>>,
    state: StateFile,
}

fn event<P>(
    request_type: RequestType,
    logical_id: &str,
    physical_id: Option<String>,
    properties: P,
    old: Option<P>,
) -> CustomResourceEvent<P> {
    CustomResourceEvent {
        request_type,
        request_id: Uuid::new_v4().to_string(),
        stack_id: STACK_ID.to_string(),
        logical_resource_id: logical_id.to_string(),
        physical_resource_id: physical_id,
        response_url: None,
        resource_properties: properties,
        old_resource_properties: old,
    }
}

fn require_success(
    resource: &'static str,
    request_type: RequestType,
    response: &CustomResourceResponse,
) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(DeployError::ResourceFailed {
        resource,
        request_type: request_type.to_string(),
        reason: response.reason.clone().unwrap_or_default(),
    })
}

impl LocalDriver {
    pub fn new(
        config: SiteConfig,
        registry: StoreRegistry,
        cdn: Option<Arc<dyn CdnClient>>,
    ) -> Self {
        let state = StateFile::new(config.state_path());
        Self {
            config,
            registry,
            cdn,
            state,
        }
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    async fn package(&self, dev: bool) -> Result<SitePackage> {
        let options = self.config.package_options(dev);
        tokio::task::spawn_blocking(move || package::package_site(&options))
            .await
            .map_err(|e| DeployError::Io(std::io::Error::other(e)))?
    }

    fn deployment_properties(
        &self,
        package: &SitePackage,
        published: &package::PublishedAssets,
    ) -> Result<DeploymentProperties> {
        let mut props = DeploymentProperties::new(
            published.sources.clone(),
            self.config.destination.bucket.clone(),
        );
        if self.config.site.purge_files {
            props.filenames = Some(published.filenames.clone());
        }
        props.file_options = self.config.file_option_rules()?;
        props.replace_values = self.config.replace_values.clone();
        props.build_id = Some(package.build_id.clone());
        props.destination_auto_delete = self.config.site.destination_auto_delete;
        Ok(props)
    }

    /// Package, publish, deploy and invalidate.
    pub async fn deploy(&self, dev: bool) -> Result<DeployOutcome> {
        let package = self.package(dev).await?;
        let assets = self.registry.bucket(&self.config.assets.bucket)?;
        let published =
            package::publish_assets(&package, assets.as_ref(), &self.config.assets.bucket).await?;
        let props = self.deployment_properties(&package, &published)?;

        let previous = self.state.load()?;
        let request_type = if previous.is_some() {
            RequestType::Update
        } else {
            RequestType::Create
        };
        let deploy_event: DeploymentEvent = event(
            request_type,
            DEPLOYMENT_LOGICAL_ID,
            previous
                .as_ref()
                .map(|s| s.deployment.physical_resource_id.clone()),
            props.clone(),
            previous.as_ref().map(|s| s.deployment.properties.clone()),
        );
        let response = DeploymentHandler::new(self.registry.clone())
            .handle(&deploy_event)
            .await;
        require_success("deployment", request_type, &response)?;

        let deployment = ResourceRecord {
            physical_resource_id: response.physical_resource_id.clone(),
            properties: props,
        };
        let previous_invalidation = previous.and_then(|s| s.invalidation);
        self.record(&package.build_id, &deployment, previous_invalidation.clone())?;

        let invalidation_current = previous_invalidation.as_ref().is_some_and(|r| {
            r.properties.build_id == package.build_id
                && r.properties.distribution_id == self.config.cdn.distribution_id
        });
        let invalidated = if invalidation_current && !package.build_id.is_live() {
            info!(build_id = %package.build_id.short(), "build id unchanged, skipping invalidation");
            false
        } else {
            let record = self.invalidate(&package.build_id).await?;
            let issued = record.is_some();
            if issued {
                self.record(&package.build_id, &deployment, record)?;
            }
            issued
        };

        Ok(DeployOutcome {
            request_type,
            physical_resource_id: deployment.physical_resource_id,
            build_id: package.build_id,
            placeholder: package.placeholder,
            invalidated,
            data: response.data,
        })
    }

    fn record(
        &self,
        build_id: &BuildId,
        deployment: &ResourceRecord<DeploymentProperties>,
        invalidation: Option<ResourceRecord<InvalidationProperties>>,
    ) -> Result<()> {
        self.state.save(&DeployState {
            build_id: build_id.clone(),
            deployment: deployment.clone(),
            invalidation,
            updated_at: chrono::Utc::now(),
        })
    }

    /// Create a fresh invalidation resource for `build_id` and drive it to
    /// completion, resuming suspended waits in-process.
    async fn invalidate(
        &self,
        build_id: &BuildId,
    ) -> Result<Option<ResourceRecord<InvalidationProperties>>> {
        if self.config.cdn.distribution_id.is_empty() {
            info!("no distribution configured, skipping invalidation");
            return Ok(None);
        }
        let client = self.cdn.clone().ok_or_else(|| {
            CdnError::NotConfigured(format!(
                "set [cdn].endpoint or {}",
                crate::invalidation::CdnConfig::ENDPOINT_ENV
            ))
        })?;

        let props = InvalidationProperties {
            build_id: build_id.clone(),
            distribution_id: self.config.cdn.distribution_id.clone(),
            distribution_paths: self.config.site.distribution_paths.clone(),
            wait_for_invalidation: self.config.site.wait_for_invalidation,
        };
        let invalidation_event: InvalidationEvent = event(
            RequestType::Create,
            INVALIDATION_LOGICAL_ID,
            None,
            props.clone(),
            None,
        );

        let orchestrator = InvalidationOrchestrator::new(client, self.config.waiter_config());
        let mut outcome = orchestrator.handle(&invalidation_event).await;
        let response = loop {
            match outcome {
                HandlerOutcome::Complete(response) => break response,
                HandlerOutcome::Suspended(token) => outcome = orchestrator.resume(token).await,
            }
        };
        require_success("invalidation", RequestType::Create, &response)?;

        Ok(Some(ResourceRecord {
            physical_resource_id: response.physical_resource_id,
            properties: props,
        }))
    }

    /// Delete the deployment and forget it. Returns false when nothing was
    /// deployed.
    pub async fn destroy(&self) -> Result<bool> {
        let Some(state) = self.state.load()? else {
            info!(path = %self.state.path().display(), "nothing deployed");
            return Ok(false);
        };

        let delete_event: DeploymentEvent = event(
            RequestType::Delete,
            DEPLOYMENT_LOGICAL_ID,
            Some(state.deployment.physical_resource_id.clone()),
            state.deployment.properties.clone(),
            None,
        );
        let response = DeploymentHandler::new(self.registry.clone())
            .handle(&delete_event)
            .await;
        require_success("deployment", RequestType::Delete, &response)?;

        self.state.clear()?;
        Ok(true)
    }
}
