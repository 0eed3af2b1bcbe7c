use thiserror::Error;

use scomms_net::NetError;
use scomms_shared::{CryptoError, IdentityError, ProtocolError};
use scomms_store::StoreError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("No identity loaded")]
    NoIdentity,

    #[error("Invalid destination {0}: expected user@host")]
    InvalidDestination(String),

    #[error("You previously denied to trust this identity")]
    PreviouslyDenied,

    #[error("Remote queued your communication request, please try again later")]
    RemoteQueued,

    #[error("Public identity confirmation was cancelled")]
    ConfirmationCancelled,

    #[error("A verification is already pending for {0}")]
    DuplicateWaiter(String),

    #[error("Core channel closed")]
    ChannelClosed,

    #[error("Lock poisoned")]
    Lock,
}

pub type Result<T> = std::result::Result<T, CoreError>;
