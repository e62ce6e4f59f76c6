// ── Device clients ──
//
// One trait, three backends. `AnyClient` is the closed set the factory
// hands out; it forwards every call to the concrete variant.

use std::future::Future;

use trmnl_relay_api::cloud::CloudDevice;

use crate::error::CoreError;
use crate::model::{
    BackendKind, DeliveryMetadata, DeviceId, DeviceStatus, ImageUrl, MergeStrategy, RefreshRate,
    SendRequest, ValidatedPayload, Variables,
};
use crate::validate;

mod byos;
mod standard;

pub use byos::{GenericClient, TerminusClient};
pub use standard::StandardClient;

/// Backend-specific delivery of images and variables to one device.
///
/// Every send performs at most one outbound HTTP call and never retries.
pub trait DeviceClient: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn device_id(&self) -> &DeviceId;

    /// Shape validation shared by all backends.
    fn validate(&self, request: &SendRequest) -> Result<ValidatedPayload, CoreError> {
        validate::payload(&request.payload)
    }

    /// Fails fast, without network I/O, when the client cannot send yet.
    fn ensure_ready(&self) -> Result<(), CoreError> {
        Ok(())
    }

    fn send_image(
        &self,
        image_url: &ImageUrl,
        refresh_rate: Option<RefreshRate>,
    ) -> impl Future<Output = Result<DeliveryMetadata, CoreError>> + Send;

    fn send_variables(
        &self,
        variables: &Variables,
        merge_strategy: MergeStrategy,
    ) -> impl Future<Output = Result<DeliveryMetadata, CoreError>> + Send;

    fn device_status(&self) -> impl Future<Output = Result<DeviceStatus, CoreError>> + Send;

    fn send(
        &self,
        payload: &ValidatedPayload,
    ) -> impl Future<Output = Result<DeliveryMetadata, CoreError>> + Send {
        async move {
            match payload {
                ValidatedPayload::Image {
                    image_url,
                    refresh_rate,
                } => self.send_image(image_url, *refresh_rate).await,
                ValidatedPayload::Variables {
                    variables,
                    merge_strategy,
                } => self.send_variables(variables, *merge_strategy).await,
            }
        }
    }
}

// ── AnyClient ───────────────────────────────────────────────────────

/// A client for any supported backend.
pub enum AnyClient {
    Standard(StandardClient),
    Terminus(TerminusClient),
    Generic(GenericClient),
}

impl AnyClient {
    /// Register a private plugin (standard backend only).
    pub async fn register(&self) -> Result<String, CoreError> {
        match self {
            Self::Standard(c) => c.register().await,
            Self::Terminus(_) | Self::Generic(_) => Err(CoreError::invalid(
                "backend",
                format!("{} devices have no registration step", self.backend()),
            )),
        }
    }

    /// Devices owned by the cloud account (standard backend only).
    pub async fn account_devices(&self) -> Result<Vec<CloudDevice>, CoreError> {
        match self {
            Self::Standard(c) => c.list_devices().await,
            Self::Terminus(_) | Self::Generic(_) => Err(CoreError::invalid(
                "backend",
                format!("{} servers have no account device list", self.backend()),
            )),
        }
    }

    /// Check the backend is reachable without changing what the device shows.
    pub async fn check_connection(&self) -> Result<(), CoreError> {
        match self {
            Self::Standard(c) => c.current_screen().await.map(|_| ()),
            Self::Terminus(c) => c.check_setup().await,
            Self::Generic(c) => c.check_setup().await,
        }
    }

    pub fn plugin_uuid(&self) -> Option<&str> {
        match self {
            Self::Standard(c) => c.plugin_uuid(),
            Self::Terminus(_) | Self::Generic(_) => None,
        }
    }
}

impl DeviceClient for AnyClient {
    fn backend(&self) -> BackendKind {
        match self {
            Self::Standard(c) => c.backend(),
            Self::Terminus(c) => c.backend(),
            Self::Generic(c) => c.backend(),
        }
    }

    fn device_id(&self) -> &DeviceId {
        match self {
            Self::Standard(c) => c.device_id(),
            Self::Terminus(c) => c.device_id(),
            Self::Generic(c) => c.device_id(),
        }
    }

    fn validate(&self, request: &SendRequest) -> Result<ValidatedPayload, CoreError> {
        match self {
            Self::Standard(c) => c.validate(request),
            Self::Terminus(c) => c.validate(request),
            Self::Generic(c) => c.validate(request),
        }
    }

    fn ensure_ready(&self) -> Result<(), CoreError> {
        match self {
            Self::Standard(c) => c.ensure_ready(),
            Self::Terminus(c) => c.ensure_ready(),
            Self::Generic(c) => c.ensure_ready(),
        }
    }

    async fn send_image(
        &self,
        image_url: &ImageUrl,
        refresh_rate: Option<RefreshRate>,
    ) -> Result<DeliveryMetadata, CoreError> {
        match self {
            Self::Standard(c) => c.send_image(image_url, refresh_rate).await,
            Self::Terminus(c) => c.send_image(image_url, refresh_rate).await,
            Self::Generic(c) => c.send_image(image_url, refresh_rate).await,
        }
    }

    async fn send_variables(
        &self,
        variables: &Variables,
        merge_strategy: MergeStrategy,
    ) -> Result<DeliveryMetadata, CoreError> {
        match self {
            Self::Standard(c) => c.send_variables(variables, merge_strategy).await,
            Self::Terminus(c) => c.send_variables(variables, merge_strategy).await,
            Self::Generic(c) => c.send_variables(variables, merge_strategy).await,
        }
    }

    async fn device_status(&self) -> Result<DeviceStatus, CoreError> {
        match self {
            Self::Standard(c) => c.device_status().await,
            Self::Terminus(c) => c.device_status().await,
            Self::Generic(c) => c.device_status().await,
        }
    }
}
