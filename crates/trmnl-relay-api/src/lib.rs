// trmnl-relay-api: async HTTP clients for TRMNL display backends
//
// Two wire protocols live here:
// - `cloud`: the usetrmnl.com account API and private-plugin webhooks
// - `byos`:  self-hosted servers speaking the device `/api/display` protocol
//
// Neither client validates payload semantics or retries; that is the job
// of `trmnl-relay-core`.

pub mod auth;
pub mod byos;
pub mod cloud;
pub mod error;
mod response;
pub mod transport;

pub use auth::AuthScheme;
pub use byos::ByosClient;
pub use cloud::CloudClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};

/// Default base URL of the hosted TRMNL service.
pub const CLOUD_BASE_URL: &str = "https://usetrmnl.com";
