// Wire types for the BYOS `/api/display` protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Refresh interval BYOS servers fall back to when they report none.
pub const DEFAULT_REFRESH_RATE: u32 = 1800;

/// Body of `POST /api/display`.
///
/// Untagged: the server tells the two shapes apart by their keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DisplayUpdate {
    Image {
        image_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_rate: Option<u32>,
    },
    Variables {
        variables: Map<String, Value>,
        merge_strategy: String,
    },
}

/// Optional JSON acknowledgement of a display update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DisplayAck {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub refresh_rate: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /api/display`: what the device will fetch next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayStatus {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u32,
}

fn default_refresh_rate() -> u32 {
    DEFAULT_REFRESH_RATE
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn image_update_shape() {
        let update = DisplayUpdate::Image {
            image_url: "http://ha.local/img.png".into(),
            refresh_rate: None,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"image_url": "http://ha.local/img.png"})
        );
    }

    #[test]
    fn variables_update_shape() {
        let mut vars = Map::new();
        vars.insert("temp".into(), json!(21.5));
        let update = DisplayUpdate::Variables {
            variables: vars,
            merge_strategy: "stream".into(),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"variables": {"temp": 21.5}, "merge_strategy": "stream"})
        );
    }

    #[test]
    fn status_defaults_refresh_rate() {
        let status: DisplayStatus = serde_json::from_value(json!({"image_url": "x"})).unwrap();
        assert_eq!(status.refresh_rate, DEFAULT_REFRESH_RATE);
    }
}
