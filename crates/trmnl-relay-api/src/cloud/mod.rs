// TRMNL cloud API (usetrmnl.com)

pub mod client;
pub mod devices;
pub mod models;
pub mod plugins;

pub use client::CloudClient;
pub use models::{
    CloudDevice, CurrentScreen, MergeVariablesPayload, PluginRegistration, WebhookAck,
};
