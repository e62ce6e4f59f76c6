// BYOS backends: Terminus and generic self-hosted servers.
//
// Both POST to `/api/display` with the `ID` header and an optional bearer
// token. Terminus answers with JSON we decode and trust; a generic server
// only has to return 2xx.

use tracing::trace;
use trmnl_relay_api::ByosClient;
use trmnl_relay_api::byos::{DisplayStatus, DisplayUpdate};

use super::DeviceClient;
use crate::error::CoreError;
use crate::model::{
    BackendKind, DeliveryMetadata, DeviceConfig, DeviceId, DeviceStatus, ImageUrl, MergeStrategy,
    RefreshRate, Variables,
};

struct Byos {
    device_id: DeviceId,
    api: ByosClient,
}

impl Byos {
    fn new(config: &DeviceConfig, kind: BackendKind) -> Result<Self, CoreError> {
        let api = ByosClient::new(
            &config.endpoint()?,
            config.device_id.as_str(),
            config.api_key.as_ref(),
            kind.auth_scheme(),
            &config.transport(),
        )?;
        Ok(Self {
            device_id: config.device_id.clone(),
            api,
        })
    }

    async fn status(&self, backend: BackendKind) -> Result<DeviceStatus, CoreError> {
        let DisplayStatus {
            image_url,
            filename,
            refresh_rate,
        } = self.api.display_status().await?;
        Ok(DeviceStatus {
            device_id: self.device_id.clone(),
            backend,
            image_url,
            filename,
            refresh_rate: Some(refresh_rate),
            plugin_uuid: None,
        })
    }
}

fn image_update(image_url: &ImageUrl, refresh_rate: Option<RefreshRate>) -> DisplayUpdate {
    DisplayUpdate::Image {
        image_url: image_url.to_string(),
        refresh_rate: refresh_rate.map(RefreshRate::get),
    }
}

fn variables_update(variables: &Variables, merge_strategy: MergeStrategy) -> DisplayUpdate {
    DisplayUpdate::Variables {
        variables: variables.as_map().clone(),
        merge_strategy: merge_strategy.to_string(),
    }
}

// ── Terminus ────────────────────────────────────────────────────────

/// Terminus server; JSON acknowledgements are decoded strictly.
pub struct TerminusClient(Byos);

impl TerminusClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, CoreError> {
        Byos::new(config, BackendKind::Terminus).map(Self)
    }

    pub async fn check_setup(&self) -> Result<(), CoreError> {
        Ok(self.0.api.check_setup().await?)
    }

    async fn post(
        &self,
        update: &DisplayUpdate,
        image_url: Option<&ImageUrl>,
    ) -> Result<DeliveryMetadata, CoreError> {
        let ack = self.0.api.post_display(update).await?;
        trace!(device = %self.0.device_id, ?ack, "terminus acknowledged");
        Ok(DeliveryMetadata {
            refresh_rate: ack.refresh_rate,
            message: ack.message,
            image_url: ack.image_url.or_else(|| image_url.map(ToString::to_string)),
        })
    }
}

impl DeviceClient for TerminusClient {
    fn backend(&self) -> BackendKind {
        BackendKind::Terminus
    }

    fn device_id(&self) -> &DeviceId {
        &self.0.device_id
    }

    async fn send_image(
        &self,
        image_url: &ImageUrl,
        refresh_rate: Option<RefreshRate>,
    ) -> Result<DeliveryMetadata, CoreError> {
        self.post(&image_update(image_url, refresh_rate), Some(image_url))
            .await
    }

    async fn send_variables(
        &self,
        variables: &Variables,
        merge_strategy: MergeStrategy,
    ) -> Result<DeliveryMetadata, CoreError> {
        self.post(&variables_update(variables, merge_strategy), None)
            .await
    }

    async fn device_status(&self) -> Result<DeviceStatus, CoreError> {
        self.0.status(BackendKind::Terminus).await
    }
}

// ── Generic ─────────────────────────────────────────────────────────

/// Any BYOS server; any 2xx is success and the body is never parsed.
pub struct GenericClient(Byos);

impl GenericClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, CoreError> {
        Byos::new(config, BackendKind::Generic).map(Self)
    }

    pub async fn check_setup(&self) -> Result<(), CoreError> {
        Ok(self.0.api.check_setup().await?)
    }
}

impl DeviceClient for GenericClient {
    fn backend(&self) -> BackendKind {
        BackendKind::Generic
    }

    fn device_id(&self) -> &DeviceId {
        &self.0.device_id
    }

    async fn send_image(
        &self,
        image_url: &ImageUrl,
        refresh_rate: Option<RefreshRate>,
    ) -> Result<DeliveryMetadata, CoreError> {
        self.0
            .api
            .post_display_unchecked(&image_update(image_url, refresh_rate))
            .await?;
        Ok(DeliveryMetadata {
            image_url: Some(image_url.to_string()),
            ..DeliveryMetadata::default()
        })
    }

    async fn send_variables(
        &self,
        variables: &Variables,
        merge_strategy: MergeStrategy,
    ) -> Result<DeliveryMetadata, CoreError> {
        self.0
            .api
            .post_display_unchecked(&variables_update(variables, merge_strategy))
            .await?;
        Ok(DeliveryMetadata::default())
    }

    async fn device_status(&self) -> Result<DeviceStatus, CoreError> {
        self.0.status(BackendKind::Generic).await
    }
}
