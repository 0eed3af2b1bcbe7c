/// TCP port peers listen on and dial to
pub const DEFAULT_PORT: u16 = 12345;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// x25519 / ed25519 public key size in bytes
pub const KEY_SIZE: usize = 32;

/// Default upper bound on a single application payload (10 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Slack on top of the negotiated frame size for envelope and JSON overhead
pub const FRAME_OVERHEAD: usize = 8192;

/// Read/write buffer hint for the framed channel
pub const CHANNEL_BUFFER: usize = 4096;

/// Handshake timeout, dial timeout, and per-phase read timeout in seconds
pub const RPC_TIMEOUT_SECS: u64 = 10;

/// Key derivation context (BLAKE3)
pub const KDF_CONTEXT_ENVELOPE: &str = "scomms-envelope-key-v1";

/// On-disk file names under the data directory
pub const IDENTITY_FILENAME: &str = "scomms.id";
pub const CERT_FILENAME: &str = "scomms.cert";
pub const KEY_FILENAME: &str = "scomms.key";
pub const TRUST_DIRNAME: &str = "trust";
pub const SPOOL_DIRNAME: &str = "spool";

/// Identifier tag for a profile picture blob on a public identity
pub const IDENTIFIER_PROFILE_PICTURE: &str = "ProfilePicture";
