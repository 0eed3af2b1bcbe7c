use thiserror::Error;

use crate::protocol::Phase;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Invalid key bytes")]
    InvalidKeyBytes,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Secret key does not match recorded public identity")]
    KeyMismatch,

    #[error("Malformed identity document: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{command} is not legal in phase {phase}")]
    WrongPhase { command: &'static str, phase: Phase },

    #[error("expected {expected}, received {received}")]
    UnexpectedMessage {
        expected: &'static str,
        received: &'static str,
    },

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("address does not match public identity: contacted {contacted}, reply came from {reported}")]
    AddressMismatch { contacted: String, reported: String },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("payload of {size} bytes exceeds the negotiated limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("session is missing {0}")]
    MissingSlot(&'static str),

    #[error("invalid trust state {0}")]
    InvalidTrustState(i32),
}
