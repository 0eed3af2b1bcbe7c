use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_FRAME_SIZE;
use crate::identity::PublicIdentity;
use crate::types::TrustState;

/// Progression of a single session. Every operation is legal in exactly one
/// phase; the engine rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    StartOfDay,
    Session,
    Identity,
    Confirmation,
    Message,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::StartOfDay => "start-of-day",
            Phase::Session => "session",
            Phase::Identity => "identity",
            Phase::Confirmation => "confirmation",
            Phase::Message => "message",
        };
        write!(f, "{name}")
    }
}

/// Session parameters negotiated during the confirmation phase. The client
/// names the address it dialed; the server echoes the document back, with
/// `error` set when it refuses or `state` set to `Queued` when the peer
/// still awaits operator approval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub looking_for: String,
    pub max_frame_size: usize,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub state: TrustState,
}

impl Confirmation {
    pub fn new(looking_for: &str) -> Self {
        Self {
            looking_for: looking_for.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            error: String::new(),
            state: TrustState::Invalid,
        }
    }
}

/// Payload of the `sendfile` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFileRpc {
    pub filename: String,
    pub mime: String,
    pub content: Vec<u8>,
}

/// Every post-session-phase message: a command tag plus its payload,
/// serialized as `{"command": ..., "payload": ...}` and sealed in an
/// envelope before it touches the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "lowercase")]
pub enum Rpc {
    Identity(PublicIdentity),
    Confirmation(Confirmation),
    SendFile(SendFileRpc),
}

impl Rpc {
    pub fn command(&self) -> &'static str {
        match self {
            Rpc::Identity(_) => "identity",
            Rpc::Confirmation(_) => "confirmation",
            Rpc::SendFile(_) => "sendfile",
        }
    }

    /// The only phase in which this command may be sent or received.
    pub fn required_phase(&self) -> Phase {
        match self {
            Rpc::Identity(_) => Phase::Session,
            Rpc::Confirmation(_) => Phase::Identity,
            Rpc::SendFile(_) => Phase::Message,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Sidecar written next to each received file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub version: u32,
    pub mime: String,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_wire_shape() {
        let rpc = Rpc::SendFile(SendFileRpc {
            filename: "note.txt".to_string(),
            mime: "text/plain".to_string(),
            content: b"hello".to_vec(),
        });

        let json: serde_json::Value = serde_json::from_slice(&rpc.to_bytes().unwrap()).unwrap();
        assert_eq!(json["command"], "sendfile");
        assert_eq!(json["payload"]["filename"], "note.txt");
    }

    #[test]
    fn rpc_round_trip() {
        let rpc = Rpc::Confirmation(Confirmation::new("bob@host-b"));
        let restored = Rpc::from_bytes(&rpc.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, rpc);
    }

    #[test]
    fn command_phase_mapping() {
        let identity = crate::identity::Identity::session();
        assert_eq!(
            Rpc::Identity(identity.public).required_phase(),
            Phase::Session
        );
        assert_eq!(
            Rpc::Confirmation(Confirmation::default()).required_phase(),
            Phase::Identity
        );
        assert_eq!(
            Rpc::SendFile(SendFileRpc {
                filename: String::new(),
                mime: String::new(),
                content: Vec::new(),
            })
            .required_phase(),
            Phase::Message
        );
    }

    #[test]
    fn unknown_command_rejected() {
        let err = Rpc::from_bytes(br#"{"command":"exfiltrate","payload":{}}"#);
        assert!(err.is_err());
    }
}
