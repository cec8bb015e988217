//! Relay wire protocol.
//!
//! The host page and the worker relay exchange JSON objects tagged by a
//! `type` field. Commands flow page -> relay, events flow relay -> page,
//! both in send order over a single channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A page -> relay message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// The page finished rendering the initial document.
    Rendered,

    /// A document patch produced by the page.
    Patch {
        patch: Value,
        #[serde(default)]
        buffers: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg_id: Option<String>,
    },

    /// Browser location state, JSON-encoded as a string.
    Location { location: String },
}

impl Command {
    /// Tag name, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rendered => "rendered",
            Self::Patch { .. } => "patch",
            Self::Location { .. } => "location",
        }
    }
}

/// A relay -> page message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Progress or failure text for the loading indicator.
    Status { msg: String },

    /// A document patch pushed by the interpreter.
    Patch {
        patch: Value,
        #[serde(default)]
        buffers: Vec<Value>,
    },

    /// Initial document state produced by the bootstrap script.
    Render {
        docs_json: Value,
        render_items: Value,
        root_ids: Value,
    },

    /// The relay finished applying a host patch.
    Idle,
}

impl Event {
    pub fn status(msg: impl Into<String>) -> Self {
        Self::Status { msg: msg.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Patch { .. } => "patch",
            Self::Render { .. } => "render",
            Self::Idle => "idle",
        }
    }
}

/// Output of a successful bootstrap script run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentState {
    pub docs_json: Value,
    pub render_items: Value,
    pub root_ids: Value,
}

impl From<DocumentState> for Event {
    fn from(doc: DocumentState) -> Self {
        Event::Render {
            docs_json: doc.docs_json,
            render_items: doc.render_items,
            root_ids: doc.root_ids,
        }
    }
}

/// Where a patch applied to the interpreter's document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOrigin {
    /// The host page (setter `js`).
    Host,
    /// The interpreter itself.
    Interpreter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_rendered_deser() {
        let cmd: Command = serde_json::from_str(r#"{"type":"rendered"}"#).unwrap();
        assert_eq!(cmd, Command::Rendered);
    }

    #[test]
    fn test_command_patch_defaults() {
        let cmd: Command =
            serde_json::from_value(json!({"type": "patch", "patch": {"events": []}})).unwrap();
        match cmd {
            Command::Patch {
                patch,
                buffers,
                msg_id,
            } => {
                assert_eq!(patch, json!({"events": []}));
                assert!(buffers.is_empty());
                assert!(msg_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_command_location_keeps_string_payload() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "location",
            "location": "{\"pathname\":\"/app\"}"
        }))
        .unwrap();
        assert_eq!(cmd.kind(), "location");
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn test_event_wire_shape() {
        let idle = serde_json::to_value(Event::Idle).unwrap();
        assert_eq!(idle, json!({"type": "idle"}));

        let status = serde_json::to_value(Event::status("Loading pyodide")).unwrap();
        assert_eq!(status, json!({"type": "status", "msg": "Loading pyodide"}));

        let render: Event = DocumentState {
            docs_json: json!({"doc": 1}),
            render_items: json!([]),
            root_ids: json!(["r1"]),
        }
        .into();
        let v = serde_json::to_value(render).unwrap();
        assert_eq!(v["type"], "render");
        assert_eq!(v["root_ids"], json!(["r1"]));
    }
}
