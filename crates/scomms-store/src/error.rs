use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not found")]
    NotFound,

    #[error("Public key already exists")]
    Duplicate,

    #[error("Store lock poisoned")]
    Lock,

    #[error("Stored record could not be decrypted: {0}")]
    Crypto(#[from] scomms_shared::CryptoError),

    #[error("Malformed record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Unusable path component: {0}")]
    BadName(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
