//! Rate limiting, backend selection and dispatch for TRMNL e-ink displays.
//!
//! This crate sits between `trmnl-relay-api` (raw HTTP) and callers such
//! as the `trmnl-relay` CLI:
//!
//! - **[`ServiceDispatcher`]** is the entry point. It validates a
//!   [`SendRequest`], resolves the device, takes a slot from the
//!   [`RateLimiter`] and hands the payload to the device's client,
//!   folding every outcome into a [`SendResult`].
//!
//! - **[`RateLimiter`]** keeps a sliding window of admitted timestamps
//!   per device (`DashMap` of per-device mutexes), so devices never block
//!   each other.
//!
//! - **[`DeviceClient`]** is implemented by [`StandardClient`] (hosted
//!   service, private-plugin webhooks), [`TerminusClient`] and
//!   [`GenericClient`] (self-hosted `/api/display` servers), unified as
//!   [`AnyClient`] and built by the [`ClientFactory`].

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod limiter;
pub mod model;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{AnyClient, DeviceClient, GenericClient, StandardClient, TerminusClient};
pub use dispatcher::ServiceDispatcher;
pub use error::{CoreError, ErrorKind};
pub use factory::ClientFactory;
pub use limiter::{Decision, LimiterStatus, RateLimiter};
pub use trmnl_relay_api::cloud::CloudDevice;

pub use model::{
    BackendKind, DEFAULT_QUOTA, DEFAULT_TIMEOUT, DEFAULT_WINDOW, DeliveryMetadata, DeviceConfig,
    DeviceId, DeviceStatus, ImageUrl, MergeStrategy, Operation, PREMIUM_QUOTA, Payload,
    RateLimitOptions, RefreshRate, RequestState, SendImageParams, SendMergeVariablesParams,
    SendRequest, SendResult, TlsVerification, ValidatedPayload, Variables,
};
