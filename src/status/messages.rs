//! `{Type, Content}` envelopes exchanged on the live channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{TaskConfig, TaskState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Content", default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    State(Box<TaskState>),
    Pong,
    /// Payload that could not be decoded, or an explicit agent error.
    Error(String),
    Other { kind: String, content: Value },
}

impl InboundMessage {
    /// Never fails: undecodable frames become `Error("Cannot decode <raw>")`.
    pub fn decode(raw: &str) -> Self {
        let cannot_decode = || Self::Error(format!("Cannot decode {raw}"));
        let Ok(envelope) = serde_json::from_str::<Envelope>(raw) else {
            return cannot_decode();
        };
        match envelope.kind.as_str() {
            "STATE" => match serde_json::from_value::<TaskState>(envelope.content) {
                Ok(state) => Self::State(Box::new(state)),
                Err(_) => cannot_decode(),
            },
            "PONG" => Self::Pong,
            "ERROR" => Self::Error(match envelope.content {
                Value::String(text) => text,
                other => other.to_string(),
            }),
            _ => Self::Other {
                kind: envelope.kind,
                content: envelope.content,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCommand {
    Loop,
    Resync,
    Pause,
    Resume,
    Delete,
    Edit,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigCommand {
    Create,
    Edit,
    Delete,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Ping,
    Cmd {
        uuid: Option<String>,
        cmd: TaskCommand,
    },
    Config {
        cmd: ConfigCommand,
        config: Option<TaskConfig>,
        authority: Option<Value>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CmdContent<'a> {
    #[serde(rename = "UUID", skip_serializing_if = "Option::is_none")]
    uuid: Option<&'a str>,
    cmd: TaskCommand,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfigContent<'a> {
    cmd: ConfigCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a TaskConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authority: Option<&'a Value>,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Cmd { .. } => "CMD",
            Self::Config { .. } => "CONFIG",
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let content = match self {
            Self::Ping => Value::Null,
            Self::Cmd { uuid, cmd } => serde_json::to_value(CmdContent {
                uuid: uuid.as_deref(),
                cmd: *cmd,
            })?,
            Self::Config {
                cmd,
                config,
                authority,
            } => serde_json::to_value(ConfigContent {
                cmd: *cmd,
                config: config.as_ref(),
                authority: authority.as_ref(),
            })?,
        };
        Ok(Envelope {
            kind: self.kind().to_string(),
            content,
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::types::TaskStatus;

    #[test]
    fn test_decode_state() {
        let msg = InboundMessage::decode(r#"{"Type":"STATE","Content":{"UUID":"a","Status":3}}"#);
        match msg {
            InboundMessage::State(state) => {
                assert_eq!(state.uuid, "a");
                assert_eq!(state.status, TaskStatus::Processing);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage_becomes_error() {
        assert_eq!(
            InboundMessage::decode("not json"),
            InboundMessage::Error("Cannot decode not json".to_string())
        );
        // STATE whose content is not a task
        let raw = r#"{"Type":"STATE","Content":{"Nope":1}}"#;
        assert_eq!(
            InboundMessage::decode(raw),
            InboundMessage::Error(format!("Cannot decode {raw}"))
        );
    }

    #[test]
    fn test_decode_unknown_type_passes_through() {
        let msg = InboundMessage::decode(r#"{"Type":"UPDATE","Content":{"Version":"1.2"}}"#);
        assert!(matches!(msg, InboundMessage::Other { ref kind, .. } if kind == "UPDATE"));
        assert_eq!(InboundMessage::decode(r#"{"Type":"PONG"}"#), InboundMessage::Pong);
    }

    #[test]
    fn test_encode_outbound() {
        assert_eq!(OutboundMessage::Ping.encode().unwrap(), r#"{"Type":"PING"}"#);

        let cmd = OutboundMessage::Cmd {
            uuid: Some("a".to_string()),
            cmd: TaskCommand::Pause,
        };
        assert_eq!(
            cmd.encode().unwrap(),
            r#"{"Type":"CMD","Content":{"UUID":"a","Cmd":"pause"}}"#
        );

        let list = OutboundMessage::Config {
            cmd: ConfigCommand::List,
            config: None,
            authority: None,
        };
        assert_eq!(
            list.encode().unwrap(),
            r#"{"Type":"CONFIG","Content":{"Cmd":"list"}}"#
        );
    }
}
