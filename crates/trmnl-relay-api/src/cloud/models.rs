// Wire types for the TRMNL cloud API.
//
// Response types are lenient (`#[serde(default)]` everywhere)
// because the service adds fields freely and omits null ones.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Private plugin webhook ───────────────────────────────────────────

/// Body of `POST /api/custom_plugins/{uuid}`.
#[derive(Debug, Clone, Serialize)]
pub struct MergeVariablesPayload {
    pub merge_variables: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<String>,
}

impl MergeVariablesPayload {
    /// Wrap an image URL as merge variables for a plugin template.
    ///
    /// The cloud service has no direct "show this image" call; a private
    /// plugin template renders `{{ image_url }}` instead.
    pub fn image(image_url: &str, refresh_rate: Option<u32>) -> Self {
        let mut vars = Map::new();
        vars.insert("image_url".into(), Value::String(image_url.to_owned()));
        if let Some(rate) = refresh_rate {
            vars.insert("refresh_rate".into(), Value::from(rate));
        }
        Self {
            merge_variables: vars,
            merge_strategy: None,
        }
    }

    pub fn variables(variables: Map<String, Value>, merge_strategy: &str) -> Self {
        Self {
            merge_variables: variables,
            merge_strategy: Some(merge_strategy.to_owned()),
        }
    }
}

/// Acknowledgement returned by the webhook endpoint (may be empty).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub refresh_rate: Option<u32>,
}

// ── Plugin registration ──────────────────────────────────────────────

/// Body of `POST /api/custom_plugins`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePluginRequest<'a> {
    pub name: &'a str,
    pub strategy: &'a str,
}

/// Response of `POST /api/custom_plugins`.
///
/// The service has shipped both a bare object and a `{"data": {...}}`
/// envelope; both decode here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginRegistrationResponse {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub data: Option<PluginRegistration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginRegistration {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl PluginRegistrationResponse {
    pub fn into_registration(self) -> Option<PluginRegistration> {
        match (self.data, self.uuid) {
            (Some(data), _) => Some(data),
            (None, Some(uuid)) => Some(PluginRegistration { uuid, name: None }),
            (None, None) => None,
        }
    }
}

// ── Account / device endpoints ───────────────────────────────────────

/// Response of `GET /api/current_screen`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentScreen {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub refresh_rate: Option<u32>,
}

/// One device owned by the account (`GET /api/devices`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudDevice {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub friendly_id: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub battery_voltage: Option<f64>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

impl CloudDevice {
    /// Best identifier for configuring this device: MAC, then uuid, then id.
    pub fn identifier(&self) -> Option<String> {
        self.mac_address
            .clone()
            .or_else(|| self.uuid.clone())
            .or_else(|| self.id.as_ref().map(|v| v.to_string().trim_matches('"').to_owned()))
    }
}

/// `GET /api/devices` has answered as a bare list and as an envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DeviceList {
    Bare(Vec<CloudDevice>),
    Devices { devices: Vec<CloudDevice> },
    Data { data: Vec<CloudDevice> },
}

impl DeviceList {
    pub(crate) fn into_vec(self) -> Vec<CloudDevice> {
        match self {
            Self::Bare(v) | Self::Devices { devices: v } | Self::Data { data: v } => v,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn image_payload_carries_refresh_rate_only_when_set() {
        let with = serde_json::to_value(MergeVariablesPayload::image("https://x/a.png", Some(900)))
            .unwrap();
        assert_eq!(
            with,
            json!({"merge_variables": {"image_url": "https://x/a.png", "refresh_rate": 900}})
        );

        let without =
            serde_json::to_value(MergeVariablesPayload::image("https://x/a.png", None)).unwrap();
        assert_eq!(without, json!({"merge_variables": {"image_url": "https://x/a.png"}}));
    }

    #[test]
    fn registration_accepts_both_shapes() {
        let bare: PluginRegistrationResponse = serde_json::from_value(json!({"uuid": "u-1"})).unwrap();
        assert_eq!(bare.into_registration().unwrap().uuid, "u-1");

        let wrapped: PluginRegistrationResponse =
            serde_json::from_value(json!({"data": {"uuid": "u-2", "name": "ha"}})).unwrap();
        let reg = wrapped.into_registration().unwrap();
        assert_eq!(reg.uuid, "u-2");
        assert_eq!(reg.name.as_deref(), Some("ha"));

        let empty: PluginRegistrationResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.into_registration().is_none());
    }

    #[test]
    fn device_list_shapes() {
        for body in [
            json!([{"uuid": "a"}]),
            json!({"devices": [{"uuid": "a"}]}),
            json!({"data": [{"uuid": "a"}]}),
        ] {
            let list: DeviceList = serde_json::from_value(body).unwrap();
            assert_eq!(list.into_vec().len(), 1);
        }
    }

    #[test]
    fn identifier_prefers_mac() {
        let dev: CloudDevice = serde_json::from_value(json!({
            "id": 42, "uuid": "u", "mac_address": "AA:BB:CC:DD:EE:FF"
        }))
        .unwrap();
        assert_eq!(dev.identifier().as_deref(), Some("AA:BB:CC:DD:EE:FF"));

        let numeric: CloudDevice = serde_json::from_value(json!({"id": 42})).unwrap();
        assert_eq!(numeric.identifier().as_deref(), Some("42"));
    }
}
