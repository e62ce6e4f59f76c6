// ── Domain model ──
//
// Device configuration, send requests and their outcomes.

pub mod device;
pub mod request;
pub mod result;

pub use device::{
    BackendKind, DEFAULT_QUOTA, DEFAULT_TIMEOUT, DEFAULT_WINDOW, DeviceConfig, DeviceId,
    PREMIUM_QUOTA, RateLimitOptions, TlsVerification,
};
pub use request::{
    ImageUrl, MergeStrategy, Operation, Payload, RefreshRate, SendImageParams,
    SendMergeVariablesParams, SendRequest, ValidatedPayload, Variables,
};
pub use result::{DeliveryMetadata, DeviceStatus, RequestState, SendResult};
