use thiserror::Error;

use scomms_shared::{CryptoError, ProtocolError};

#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Invalid server name: {0}")]
    ServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error("Certificate generation error: {0}")]
    Cert(#[from] rcgen::Error),

    #[error("No usable key in {0}")]
    NoPrivateKey(String),

    #[error("No valid listen address")]
    NoListeners,

    #[error("Timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Protocol(ProtocolError::Malformed(err))
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
