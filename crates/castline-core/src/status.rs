//! Status panels reported to the remote controller.
//!
//! The device overlay has a top-left and a top-right panel. Each line is an
//! optional [`StatusItem`]; lines the host does not show are left out of
//! the JSON entirely.

use serde::{Deserialize, Serialize};

/// One status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusItem {
    pub message: String,
    /// False when the line should be highlighted as a problem.
    #[serde(default = "default_ok")]
    pub ok: bool,
}

fn default_ok() -> bool {
    true
}

impl StatusItem {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ok: true,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ok: false,
        }
    }
}

/// Stream-centric status lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTopLeft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mic: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewers: Option<StatusItem>,
}

/// Device and link status lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTopRight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_level: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtmp_server: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_control: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_controller: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srtla: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<StatusItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_widgets: Option<StatusItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_lines_are_omitted() {
        let top_right = StatusTopRight {
            rtmp_server: Some(StatusItem::ok("1 publisher")),
            ..Default::default()
        };
        let json = serde_json::to_value(&top_right).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "rtmpServer": { "message": "1 publisher", "ok": true } })
        );
    }

    #[test]
    fn missing_ok_defaults_to_true() {
        let item: StatusItem = serde_json::from_str(r#"{"message":"Live"}"#).unwrap();
        assert_eq!(item, StatusItem::ok("Live"));
    }
}
