//! CDP wire types.
//!
//! Only the frame shapes every exchange needs; domain payloads stay as
//! `serde_json::Value` and are picked apart where they are consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command id, monotonically increasing per connection.
pub type CommandId = u64;

/// Target id assigned by the browser.
pub type TargetId = String;

/// Session id for an attached target.
pub type SessionId = String;

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct CdpCommand {
    pub id: CommandId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Reply to a command.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpReply {
    pub id: CommandId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpErrorBody>,
}

/// Error body inside a reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdpErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Unsolicited event from the browser (no command id).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Any inbound frame. Replies carry an `id`, events carry a `method`;
/// untagged deserialization tries replies first.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpFrame {
    Reply(CdpReply),
    Event(CdpEvent),
}

/// Payload of `/json/version` on the DevTools HTTP endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_id_parses_as_reply() {
        let frame: CdpFrame =
            serde_json::from_str(r#"{"id":7,"result":{"frameId":"F1"}}"#).unwrap();
        match frame {
            CdpFrame::Reply(reply) => {
                assert_eq!(reply.id, 7);
                assert!(reply.error.is_none());
            }
            CdpFrame::Event(_) => panic!("expected reply"),
        }
    }

    #[test]
    fn frame_without_id_parses_as_event() {
        let frame: CdpFrame = serde_json::from_str(
            r#"{"method":"Network.loadingFailed","params":{"requestId":"1.1"},"sessionId":"S1"}"#,
        )
        .unwrap();
        match frame {
            CdpFrame::Event(event) => {
                assert_eq!(event.method, "Network.loadingFailed");
                assert_eq!(event.session_id.as_deref(), Some("S1"));
            }
            CdpFrame::Reply(_) => panic!("expected event"),
        }
    }

    #[test]
    fn error_reply_carries_code_and_message() {
        let frame: CdpFrame = serde_json::from_str(
            r#"{"id":3,"error":{"code":-32000,"message":"No node with given id found"}}"#,
        )
        .unwrap();
        match frame {
            CdpFrame::Reply(reply) => {
                let error = reply.error.unwrap();
                assert_eq!(error.code, -32000);
                assert!(error.message.contains("No node"));
            }
            CdpFrame::Event(_) => panic!("expected reply"),
        }
    }

    #[test]
    fn command_omits_empty_fields() {
        let command = CdpCommand {
            id: 1,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };
        let json = serde_json::to_string(&command).unwrap();
        assert_eq!(json, r#"{"id":1,"method":"Page.enable"}"#);
    }
}
