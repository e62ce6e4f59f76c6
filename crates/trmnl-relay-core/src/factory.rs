// ── Client factory ──
//
// Picks the client variant from a device's backend kind and caches one
// instance per device. Cached clients hold the HTTP connection pool and
// the standard backend's plugin uuid.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::client::{AnyClient, GenericClient, StandardClient, TerminusClient};
use crate::error::CoreError;
use crate::model::{BackendKind, DeviceConfig, DeviceId};

#[derive(Default)]
pub struct ClientFactory {
    cache: DashMap<DeviceId, Arc<AnyClient>>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh client for `config` without touching the cache.
    pub fn build(config: &DeviceConfig) -> Result<AnyClient, CoreError> {
        let kind = config.backend_kind()?;
        debug!(device = %config.device_id, backend = %kind, "creating client");
        Ok(match kind {
            BackendKind::Standard => AnyClient::Standard(StandardClient::new(config)?),
            BackendKind::Terminus => AnyClient::Terminus(TerminusClient::new(config)?),
            BackendKind::Generic => AnyClient::Generic(GenericClient::new(config)?),
        })
    }

    /// Cached client for the device, built on first use.
    pub fn get(&self, config: &DeviceConfig) -> Result<Arc<AnyClient>, CoreError> {
        if let Some(client) = self.cache.get(&config.device_id) {
            return Ok(Arc::clone(client.value()));
        }
        let client = Arc::new(Self::build(config)?);
        let entry = self
            .cache
            .entry(config.device_id.clone())
            .or_insert(client);
        Ok(Arc::clone(entry.value()))
    }

    /// Drop the cached client so the next `get` rebuilds it.
    pub fn invalidate(&self, device_id: &DeviceId) {
        self.cache.remove(device_id);
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
