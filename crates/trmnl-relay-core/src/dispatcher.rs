// ── Service dispatcher ──
//
// Entry point for callers. A request's device is resolved, its client
// validates the payload, a rate-limit slot is taken, and only then is the
// backend called. Every
// failure comes back as a `SendResult`; nothing is retried and a slot is
// never refunded, even when the send fails or times out.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use trmnl_relay_api::cloud::CloudDevice;

use crate::client::{AnyClient, DeviceClient};
use crate::error::CoreError;
use crate::factory::ClientFactory;
use crate::limiter::{Decision, LimiterStatus, RateLimiter};
use crate::model::{
    DeviceConfig, DeviceId, DeviceStatus, RateLimitOptions, SendImageParams,
    SendMergeVariablesParams, SendRequest, SendResult,
};

/// Owns the device registry, one limiter and the client cache.
#[derive(Default)]
pub struct ServiceDispatcher {
    devices: DashMap<DeviceId, DeviceConfig>,
    limiter: RateLimiter,
    factory: ClientFactory,
}

impl ServiceDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `defaults` for limiter windows of devices added later.
    pub fn with_rate_limit_defaults(defaults: RateLimitOptions) -> Self {
        Self {
            limiter: RateLimiter::new(defaults),
            ..Self::default()
        }
    }

    // ── Device registry ──────────────────────────────────────────────

    /// Add or replace a device. Rejects unknown backend kinds up front.
    pub fn add_device(&self, config: DeviceConfig) -> Result<(), CoreError> {
        config.backend_kind()?;
        let id = config.device_id.clone();
        self.limiter.configure(&id, config.rate_limit);
        self.factory.invalidate(&id);
        self.devices.insert(id, config);
        Ok(())
    }

    /// Replace an existing device's configuration.
    ///
    /// Limiter options apply immediately; the cached client is rebuilt on
    /// next use. Already admitted timestamps stay in the window.
    pub fn reconfigure(&self, config: DeviceConfig) -> Result<(), CoreError> {
        if !self.devices.contains_key(&config.device_id) {
            return Err(not_found(&config.device_id));
        }
        self.add_device(config)
    }

    pub fn remove_device(&self, device_id: &DeviceId) -> Option<DeviceConfig> {
        let (_, config) = self.devices.remove(device_id)?;
        self.limiter.forget(device_id);
        self.factory.invalidate(device_id);
        Some(config)
    }

    pub fn device(&self, device_id: &DeviceId) -> Option<DeviceConfig> {
        self.devices.get(device_id).map(|c| c.value().clone())
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn config(&self, device_id: &DeviceId) -> Result<DeviceConfig, CoreError> {
        self.device(device_id).ok_or_else(|| not_found(device_id))
    }

    fn client(&self, device_id: &DeviceId) -> Result<(DeviceConfig, Arc<AnyClient>), CoreError> {
        let config = self.config(device_id)?;
        let client = self.factory.get(&config)?;
        Ok((config, client))
    }

    // ── Registration and status ──────────────────────────────────────

    /// Register the device's private plugin (standard backend).
    ///
    /// Idempotent. The uuid is written back into the stored config so a
    /// rebuilt client keeps it.
    pub async fn register(&self, device_id: &DeviceId) -> Result<String, CoreError> {
        let (config, client) = self.client(device_id)?;
        let uuid = bounded(config.timeout, client.register()).await?;
        if let Some(mut stored) = self.devices.get_mut(device_id) {
            stored.plugin_uuid = Some(uuid.clone());
        }
        Ok(uuid)
    }

    pub async fn status(&self, device_id: &DeviceId) -> Result<DeviceStatus, CoreError> {
        let (config, client) = self.client(device_id)?;
        bounded(config.timeout, client.device_status()).await
    }

    pub async fn check_connection(&self, device_id: &DeviceId) -> Result<(), CoreError> {
        let (config, client) = self.client(device_id)?;
        bounded(config.timeout, client.check_connection()).await
    }

    /// Devices owned by this device's cloud account.
    pub async fn account_devices(&self, device_id: &DeviceId) -> Result<Vec<CloudDevice>, CoreError> {
        let (config, client) = self.client(device_id)?;
        bounded(config.timeout, client.account_devices()).await
    }

    /// The shared limiter, for callers that persist windows between runs.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn limiter_status(&self, device_id: &DeviceId) -> Result<LimiterStatus, CoreError> {
        if !self.devices.contains_key(device_id) {
            return Err(not_found(device_id));
        }
        Ok(self.limiter.status(device_id))
    }

    // ── Sending ──────────────────────────────────────────────────────

    pub async fn send_image(&self, params: SendImageParams) -> SendResult {
        self.dispatch(SendRequest::from(params)).await
    }

    pub async fn send_merge_variables(&self, params: SendMergeVariablesParams) -> SendResult {
        self.dispatch(SendRequest::from(params)).await
    }

    /// Run one request through validation, rate limiting and delivery.
    pub async fn dispatch(&self, request: SendRequest) -> SendResult {
        let operation = request.operation();
        let device_id = request.device_id.clone();

        // Everything up to `acquire` is local: a malformed request or a
        // device that cannot send at all must not burn quota.
        let prepared = self.client(&device_id).and_then(|(config, client)| {
            let payload = client.validate(&request)?;
            client.ensure_ready()?;
            Ok((config, client, payload))
        });
        let (config, client, payload) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return SendResult::failed(device_id, operation, e),
        };

        if let Decision::Deny { retry_after } = self.limiter.acquire(&device_id) {
            return SendResult::denied(device_id, operation, retry_after);
        }

        match bounded(config.timeout, client.send(&payload)).await {
            Ok(metadata) => SendResult::delivered(device_id, operation, metadata),
            Err(e) => SendResult::failed(device_id, operation, e),
        }
    }

    /// Dispatch requests concurrently; results keep the input order.
    pub async fn dispatch_all(&self, requests: Vec<SendRequest>) -> Vec<SendResult> {
        join_all(requests.into_iter().map(|r| self.dispatch(r))).await
    }
}

fn not_found(device_id: &DeviceId) -> CoreError {
    CoreError::DeviceNotFound {
        device_id: device_id.to_string(),
    }
}

/// Bound a backend call by the device timeout.
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, CoreError>>,
) -> Result<T, CoreError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| {
            Err(CoreError::Transport {
                message: format!("request timed out after {}s", timeout.as_secs_f64()),
                timed_out: true,
            })
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{Operation, RequestState};
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use serde_json::json;

    fn standard(uuid: Option<&str>) -> DeviceConfig {
        let cfg = DeviceConfig::new("AA:BB:CC:DD:EE:FF", "standard")
            .with_api_key(SecretString::from("k".to_owned()))
            .with_endpoint("http://127.0.0.1:9");
        match uuid {
            Some(u) => cfg.with_plugin_uuid(u),
            None => cfg,
        }
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let dispatcher = ServiceDispatcher::new();
        let result = dispatcher
            .dispatch(SendRequest::image("11:22:33:44:55:66", "https://x/a.png", None))
            .await;
        assert_eq!(result.state, RequestState::Failed);
        assert_eq!(result.error_kind, Some(ErrorKind::DeviceNotFound));
    }

    #[tokio::test]
    async fn invalid_request_does_not_consume_quota() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher.add_device(standard(Some("p"))).unwrap();
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");

        let result = dispatcher
            .send_image(SendImageParams {
                device_id: id.to_string(),
                image_url: "not-a-url".into(),
                refresh_rate: None,
            })
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidArgument));
        assert_eq!(result.operation, Operation::SendImage);
        assert_eq!(dispatcher.limiter_status(&id).unwrap().used, 0);
    }

    #[tokio::test]
    async fn client_validation_precedes_readiness() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher.add_device(standard(None)).unwrap();
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");

        // Unregistered, but the malformed payload is reported first.
        let result = dispatcher
            .dispatch(SendRequest::variables(id.as_str(), json!(["not", "a", "map"]), None))
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidArgument));
        assert_eq!(dispatcher.limiter_status(&id).unwrap().used, 0);

        let unknown = dispatcher
            .dispatch(SendRequest::image("11:22:33:44:55:66", "not-a-url", None))
            .await;
        assert_eq!(unknown.error_kind, Some(ErrorKind::DeviceNotFound));
    }

    #[tokio::test]
    async fn unregistered_standard_does_not_consume_quota() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher.add_device(standard(None)).unwrap();
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");

        let result = dispatcher
            .send_merge_variables(SendMergeVariablesParams {
                device_id: id.to_string(),
                variables: json!({"a": 1}),
                merge_strategy: None,
            })
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotRegistered));
        assert_eq!(dispatcher.limiter_status(&id).unwrap().used, 0);
    }

    #[tokio::test]
    async fn zero_quota_denies_before_transport() {
        let dispatcher = ServiceDispatcher::new();
        let mut cfg = standard(Some("p"));
        cfg.rate_limit.quota = 0;
        dispatcher.add_device(cfg).unwrap();

        let result = dispatcher
            .dispatch(SendRequest::image("AA:BB:CC:DD:EE:FF", "https://x/a.png", None))
            .await;
        assert_eq!(result.state, RequestState::Denied);
        assert_eq!(result.retry_after, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn registry_operations() {
        let dispatcher = ServiceDispatcher::new();
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF");

        assert!(matches!(
            dispatcher.reconfigure(standard(None)),
            Err(CoreError::DeviceNotFound { .. })
        ));
        assert!(matches!(
            dispatcher.add_device(DeviceConfig::new("x", "nope")),
            Err(CoreError::UnknownBackend { .. })
        ));

        dispatcher.add_device(standard(None)).unwrap();
        let mut cfg = standard(None);
        cfg.rate_limit.quota = 30;
        dispatcher.reconfigure(cfg).unwrap();
        assert_eq!(dispatcher.limiter_status(&id).unwrap().quota, 30);
        assert_eq!(dispatcher.device_ids(), vec![id.clone()]);

        assert!(dispatcher.remove_device(&id).is_some());
        assert!(dispatcher.device(&id).is_none());
        assert!(matches!(
            dispatcher.limiter_status(&id),
            Err(CoreError::DeviceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn terminus_has_no_registration() {
        let dispatcher = ServiceDispatcher::new();
        dispatcher
            .add_device(DeviceConfig::new("term", "terminus").with_endpoint("http://127.0.0.1:9"))
            .unwrap();
        let err = dispatcher.register(&DeviceId::new("term")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
