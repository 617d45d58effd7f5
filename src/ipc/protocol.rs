//! IPC protocol definitions
//!
//! Line-delimited JSON, one message per line, tagged `type` with the data in
//! `payload`. Requests whose fields are all optional may omit `payload`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::video::PlayerStatus;

/// Transport commands from the controlling process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Play,
    Pause,
    /// Rewind and keep the play/pause state
    Restart,
    /// Pause and rewind
    Stop,
}

/// IPC message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcMessage {
    // === Controller -> Viewer ===

    /// Transport command
    #[serde(rename = "control")]
    Control(ControlCommand),

    /// Write the current frame to disk; default location when `path` is absent
    #[serde(rename = "save_snapshot")]
    SaveSnapshot {
        #[serde(default)]
        path: Option<String>,
    },

    /// Jump to a position, keeping the play/pause state
    #[serde(rename = "seek")]
    Seek { position_ms: u64 },

    /// Close the viewer
    #[serde(rename = "shutdown")]
    Shutdown,

    // === Viewer -> Controller ===

    /// Periodic playback status
    #[serde(rename = "status_update")]
    StatusUpdate {
        state: String,
        pipeline: Option<String>,
        accepted: u64,
        dropped: u64,
        width: Option<u32>,
        height: Option<u32>,
        position_ms: Option<u64>,
        duration_ms: Option<u64>,
    },

    /// Snapshot written
    #[serde(rename = "snapshot_saved")]
    SnapshotSaved { path: String },

    /// Viewer ready for commands
    #[serde(rename = "ready")]
    Ready,

    /// Error occurred
    #[serde(rename = "error")]
    Error { code: i32, message: String },
}

impl IpcMessage {
    /// Create a status update from the player state and the surface's dropped-frame count
    pub fn status_update(status: &PlayerStatus, dropped: u64) -> Self {
        IpcMessage::StatusUpdate {
            state: status.sink_state.display_name().to_string(),
            pipeline: status.pipeline.map(|p| p.display_name().to_string()),
            accepted: status.stats.accepted,
            dropped,
            width: status.size.map(|s| s.width),
            height: status.size.map(|s| s.height),
            position_ms: status.position.map(millis),
            duration_ms: status.duration.map(millis),
        }
    }

    /// Create a ready message
    pub fn ready() -> Self {
        IpcMessage::Ready
    }

    /// Create an error message
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        IpcMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// Serialize to JSON string (line-delimited)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(s)?;
        if let Some(object) = value.as_object_mut() {
            let optional_payload = object
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| OPTIONAL_PAYLOAD.contains(&kind));
            if optional_payload {
                object
                    .entry("payload")
                    .or_insert_with(|| Value::Object(Default::default()));
            }
        }
        serde_json::from_value(value)
    }
}

/// Message types that are valid without a `payload`
const OPTIONAL_PAYLOAD: &[&str] = &["save_snapshot"];

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Error codes
pub mod error_codes {
    pub const INVALID_MESSAGE: i32 = 1;
    pub const SOURCE_FAILED: i32 = 2;
    pub const SNAPSHOT_FAILED: i32 = 3;
    pub const INTERNAL_ERROR: i32 = 100;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSize;
    use crate::pipeline::PipelineState;
    use crate::sink::{SinkState, SinkStats};

    #[test]
    fn test_message_serialization() {
        let msg = IpcMessage::ready();
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"ready"}"#);

        let parsed = IpcMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, IpcMessage::Ready));
    }

    #[test]
    fn test_control_command() {
        let msg = IpcMessage::from_json(r#"{"type":"control","payload":"restart"}"#).unwrap();
        assert_eq!(msg, IpcMessage::Control(ControlCommand::Restart));

        let json = IpcMessage::Control(ControlCommand::Play).to_json().unwrap();
        assert_eq!(json, r#"{"type":"control","payload":"play"}"#);
    }

    #[test]
    fn test_save_snapshot_path_is_optional() {
        let msg = IpcMessage::from_json(r#"{"type":"save_snapshot","payload":{}}"#).unwrap();
        assert_eq!(msg, IpcMessage::SaveSnapshot { path: None });

        let msg =
            IpcMessage::from_json(r#"{"type":"save_snapshot","payload":{"path":"a.png"}}"#).unwrap();
        assert_eq!(msg, IpcMessage::SaveSnapshot { path: Some("a.png".into()) });

        let msg = IpcMessage::from_json(r#"{"type":"save_snapshot"}"#).unwrap();
        assert_eq!(msg, IpcMessage::SaveSnapshot { path: None });
    }

    #[test]
    fn test_required_payload_stays_required() {
        assert!(IpcMessage::from_json(r#"{"type":"seek"}"#).is_err());
        assert!(IpcMessage::from_json(r#"{"type":"control"}"#).is_err());

        let msg = IpcMessage::from_json(r#"{"type":"seek","payload":{"position_ms":2500}}"#).unwrap();
        assert_eq!(msg, IpcMessage::Seek { position_ms: 2500 });
    }

    #[test]
    fn test_status_update() {
        let status = PlayerStatus {
            sink_state: SinkState::Streaming,
            pipeline: Some(PipelineState::Playing),
            stats: SinkStats { accepted: 42, rejected: 0 },
            size: Some(FrameSize::new(640, 360)),
            source: None,
            position: Some(Duration::from_millis(1500)),
            duration: None,
        };
        let json = IpcMessage::status_update(&status, 3).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "status_update");
        assert_eq!(value["payload"]["state"], "Streaming");
        assert_eq!(value["payload"]["pipeline"], "Playing");
        assert_eq!(value["payload"]["accepted"], 42);
        assert_eq!(value["payload"]["dropped"], 3);
        assert_eq!(value["payload"]["width"], 640);
        assert_eq!(value["payload"]["height"], 360);
        assert_eq!(value["payload"]["position_ms"], 1500);
        assert!(value["payload"]["duration_ms"].is_null());
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(IpcMessage::from_json(r#"{"type":"load_config"}"#).is_err());
        assert!(IpcMessage::from_json("not json").is_err());
    }
}
