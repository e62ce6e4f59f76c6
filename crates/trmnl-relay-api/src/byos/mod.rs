// Self-hosted ("bring your own server") display backends

pub mod client;
pub mod models;

pub use client::ByosClient;
pub use models::{DisplayAck, DisplayStatus, DisplayUpdate};
