// Types shared between the node's crates: identities, the hybrid
// encryption envelope, the wire protocol, and trust states.

pub mod constants;
pub mod envelope;
pub mod identity;
pub mod protocol;
pub mod types;

mod error;

pub use envelope::Envelope;
pub use error::{CryptoError, IdentityError, ProtocolError};
pub use identity::{Identifier, Identity, PublicIdentity};
pub use protocol::{Confirmation, MetaRecord, Phase, Rpc, SendFileRpc};
pub use types::TrustState;
