use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Per-peer trust decision. Serialized as its integer value; any other
/// integer is rejected on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TrustState {
    #[default]
    Invalid,
    Queued,
    Denied,
    Allowed,
}

impl From<TrustState> for i32 {
    fn from(state: TrustState) -> i32 {
        match state {
            TrustState::Invalid => 0,
            TrustState::Queued => 1,
            TrustState::Denied => 2,
            TrustState::Allowed => 100,
        }
    }
}

impl TryFrom<i32> for TrustState {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(TrustState::Invalid),
            1 => Ok(TrustState::Queued),
            2 => Ok(TrustState::Denied),
            100 => Ok(TrustState::Allowed),
            other => Err(ProtocolError::InvalidTrustState(other)),
        }
    }
}

impl std::fmt::Display for TrustState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrustState::Invalid => "Invalid",
            TrustState::Queued => "Queued",
            TrustState::Denied => "Denied",
            TrustState::Allowed => "Allowed",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_integer_round_trip() {
        for state in [
            TrustState::Invalid,
            TrustState::Queued,
            TrustState::Denied,
            TrustState::Allowed,
        ] {
            let raw: i32 = state.into();
            assert_eq!(TrustState::try_from(raw).unwrap(), state);
        }
    }

    #[test]
    fn unknown_integer_rejected() {
        assert!(TrustState::try_from(3).is_err());
        assert!(TrustState::try_from(99).is_err());
        assert!(serde_json::from_str::<TrustState>("7").is_err());
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&TrustState::Allowed).unwrap(), "100");
        assert_eq!(serde_json::to_string(&TrustState::Queued).unwrap(), "1");
    }
}
