// Standard backend: the hosted service's private-plugin webhooks.
//
// The cloud has no "show this image" call. A private plugin (strategy
// `webhook`) is created once per device, and its template renders the
// merge variables we push, `image_url` included.

use secrecy::SecretString;
use tokio::sync::OnceCell;
use tracing::debug;
use trmnl_relay_api::cloud::{CloudDevice, CurrentScreen, MergeVariablesPayload};
use trmnl_relay_api::CloudClient;

use super::DeviceClient;
use crate::error::CoreError;
use crate::model::{
    BackendKind, DeliveryMetadata, DeviceConfig, DeviceId, DeviceStatus, ImageUrl, MergeStrategy,
    RefreshRate, Variables,
};

pub struct StandardClient {
    device_id: DeviceId,
    api: CloudClient,
    plugin_uuid: OnceCell<String>,
}

impl StandardClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, CoreError> {
        let key: &SecretString = config.api_key.as_ref().ok_or_else(|| CoreError::Config {
            message: format!("standard device {} needs an api_key", config.device_id),
        })?;
        let api = CloudClient::from_api_key(
            &config.endpoint()?,
            config.device_id.as_str(),
            key,
            &config.transport(),
        )?;
        Ok(Self::with_api(config, api))
    }

    /// Build around an existing cloud client.
    pub fn with_api(config: &DeviceConfig, api: CloudClient) -> Self {
        Self {
            device_id: config.device_id.clone(),
            api,
            plugin_uuid: OnceCell::new_with(config.plugin_uuid.clone()),
        }
    }

    pub fn plugin_uuid(&self) -> Option<&str> {
        self.plugin_uuid.get().map(String::as_str)
    }

    /// Create the device's private plugin unless one is already known.
    ///
    /// Concurrent first calls share a single network request.
    pub async fn register(&self) -> Result<String, CoreError> {
        let uuid = self
            .plugin_uuid
            .get_or_try_init(|| async {
                let name = format!("trmnl-relay {}", self.device_id);
                let registration = self.api.create_plugin(&name).await?;
                debug!(device = %self.device_id, uuid = %registration.uuid, "private plugin registered");
                Ok::<_, CoreError>(registration.uuid)
            })
            .await?;
        Ok(uuid.clone())
    }

    pub async fn current_screen(&self) -> Result<CurrentScreen, CoreError> {
        Ok(self.api.current_screen().await?)
    }

    pub async fn list_devices(&self) -> Result<Vec<CloudDevice>, CoreError> {
        Ok(self.api.list_devices().await?)
    }

    fn require_uuid(&self) -> Result<&str, CoreError> {
        self.plugin_uuid().ok_or_else(|| CoreError::NotRegistered {
            device_id: self.device_id.to_string(),
        })
    }

    async fn push(
        &self,
        payload: &MergeVariablesPayload,
        image_url: Option<&ImageUrl>,
    ) -> Result<DeliveryMetadata, CoreError> {
        let uuid = self.require_uuid()?;
        let ack = self.api.post_merge_variables(uuid, payload).await?;
        Ok(DeliveryMetadata {
            refresh_rate: ack.refresh_rate,
            message: ack.message,
            image_url: image_url.map(ToString::to_string),
        })
    }
}

impl DeviceClient for StandardClient {
    fn backend(&self) -> BackendKind {
        BackendKind::Standard
    }

    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    fn ensure_ready(&self) -> Result<(), CoreError> {
        self.require_uuid().map(|_| ())
    }

    async fn send_image(
        &self,
        image_url: &ImageUrl,
        refresh_rate: Option<RefreshRate>,
    ) -> Result<DeliveryMetadata, CoreError> {
        let payload =
            MergeVariablesPayload::image(image_url.as_str(), refresh_rate.map(RefreshRate::get));
        self.push(&payload, Some(image_url)).await
    }

    async fn send_variables(
        &self,
        variables: &Variables,
        merge_strategy: MergeStrategy,
    ) -> Result<DeliveryMetadata, CoreError> {
        let payload =
            MergeVariablesPayload::variables(variables.as_map().clone(), merge_strategy.as_ref());
        self.push(&payload, None).await
    }

    async fn device_status(&self) -> Result<DeviceStatus, CoreError> {
        let screen = self.current_screen().await?;
        Ok(DeviceStatus {
            device_id: self.device_id.clone(),
            backend: BackendKind::Standard,
            image_url: screen.image_url,
            filename: screen.filename,
            refresh_rate: screen.refresh_rate,
            plugin_uuid: self.plugin_uuid().map(str::to_owned),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> DeviceConfig {
        DeviceConfig::new("aa:bb:cc:dd:ee:ff", "standard")
            .with_api_key(SecretString::from("k".to_owned()))
            .with_endpoint("http://127.0.0.1:9")
    }

    #[tokio::test]
    async fn unregistered_send_fails_without_network() {
        // Port 9 would refuse; NotRegistered proves we never got that far.
        let client = StandardClient::new(&config()).unwrap();
        assert!(matches!(client.ensure_ready(), Err(CoreError::NotRegistered { .. })));

        let url = ImageUrl::parse("https://x/a.png").unwrap();
        let err = client.send_image(&url, None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotRegistered { ref device_id } if device_id == "AA:BB:CC:DD:EE:FF"));
    }

    #[tokio::test]
    async fn preconfigured_uuid_skips_registration() {
        let client = StandardClient::new(&config().with_plugin_uuid("plug-9")).unwrap();
        assert_eq!(client.register().await.unwrap(), "plug-9");
        assert!(client.ensure_ready().is_ok());
    }

    #[test]
    fn api_key_is_required() {
        let cfg = DeviceConfig::new("dev", "standard");
        assert!(matches!(StandardClient::new(&cfg), Err(CoreError::Config { .. })));
    }
}
