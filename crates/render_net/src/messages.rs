//! Message types exchanged with the job queue, the event stream, and the
//! manager.
//!
//! All payloads are JSON. Routing metadata (the publishing node) travels in
//! NATS headers, not in the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Job queue ───────────────────────────────────────────────────────────────

/// A command read from a job queue, selected by its `command` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum JobCommand {
    /// Render one frame of a scene.
    Render(RenderRequest),
}

/// Body of a `render` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Frame number.
    pub frame: i64,
    /// Scene identifier, relative to the node's scene root.
    pub scene: String,
    /// Engine key (e.g. `"BLENDER"`).
    #[serde(rename = "type")]
    pub render_type: String,
    /// Job identifier assigned by the manager.
    pub uuid: String,
}

// ── Event stream ────────────────────────────────────────────────────────────

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A render was accepted and its process launched.
    RenderStart,
    /// A render succeeded; artifacts are being uploaded.
    RenderFinish,
    /// A render failed after exhausting its attempts.
    RenderFail,
}

/// A lifecycle event published on [`subjects::EVENTS`](crate::subjects::EVENTS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderEvent {
    /// What happened.
    pub event: EventKind,
    /// Frame number.
    pub frame: i64,
    /// Scene identifier.
    pub scene: String,
    /// When it happened.
    pub time: DateTime<Utc>,
    /// Job identifier.
    pub uuid: String,
    /// Engine key.
    #[serde(rename = "type")]
    pub render_type: String,
}

impl RenderEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn now(
        event: EventKind,
        frame: i64,
        scene: impl Into<String>,
        uuid: impl Into<String>,
        render_type: impl Into<String>,
    ) -> Self {
        Self {
            event,
            frame,
            scene: scene.into(),
            time: Utc::now(),
            uuid: uuid.into(),
            render_type: render_type.into(),
        }
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// A queue id as sent by the manager: a JSON integer or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueueId {
    /// Numeric id.
    Int(i64),
    /// String id.
    Str(String),
}

impl From<QueueId> for String {
    fn from(id: QueueId) -> Self {
        match id {
            QueueId::Int(n) => n.to_string(),
            QueueId::Str(s) => s,
        }
    }
}

/// One entry of the manager's priority list, `[queue-id, job-type]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(QueueId, String)")]
pub struct AvailableJob {
    /// Queue id, normalised to a string.
    pub queue: String,
    /// Engine key of the jobs in that queue.
    pub job_type: String,
}

impl AvailableJob {
    /// Create an entry.
    #[must_use]
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            job_type: job_type.into(),
        }
    }
}

impl From<(QueueId, String)> for AvailableJob {
    fn from((queue, job_type): (QueueId, String)) -> Self {
        Self {
            queue: queue.into(),
            job_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_command, encode_event};

    #[test]
    fn test_decode_render_command() {
        let body = br#"{"command":"render","frame":12,"scene":"forest","type":"BLENDER","uuid":"abc"}"#;
        let command = decode_command(body).unwrap();
        assert_eq!(
            command,
            JobCommand::Render(RenderRequest {
                frame: 12,
                scene: "forest".to_string(),
                render_type: "BLENDER".to_string(),
                uuid: "abc".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_commands_are_rejected() {
        let cases: [&[u8]; 4] = [
            b"not json",
            br#"{"command":"render","frame":12,"scene":"forest","type":"BLENDER"}"#,
            br#"{"command":"explode","frame":1}"#,
            br#"{"frame":1,"scene":"a","type":"BLENDER","uuid":"x"}"#,
        ];
        for body in cases {
            assert!(decode_command(body).is_err());
        }
    }

    #[test]
    fn test_event_wire_format() {
        let mut event = RenderEvent::now(EventKind::RenderFinish, 12, "forest", "abc", "BLENDER");
        event.time = DateTime::parse_from_rfc3339("2024-05-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);

        let json: serde_json::Value = serde_json::from_slice(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "render_finish",
                "frame": 12,
                "scene": "forest",
                "time": "2024-05-01T10:20:30Z",
                "uuid": "abc",
                "type": "BLENDER",
            })
        );
    }

    #[test]
    fn test_available_jobs_accept_mixed_ids() {
        let jobs: Vec<AvailableJob> =
            serde_json::from_slice(br#"[[7,"BLENDER"],["b","RENDERMAN"]]"#).unwrap();
        assert_eq!(
            jobs,
            vec![
                AvailableJob::new("7", "BLENDER"),
                AvailableJob::new("b", "RENDERMAN"),
            ]
        );
    }
}
