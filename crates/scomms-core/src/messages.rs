//! Typed mailbox between the core and its front-end.
//!
//! The front-end never shares memory with the core; each side owns one half
//! of a pair of mpsc channels and reacts to the other's messages in its own
//! receive loop.

use scomms_shared::{Identifier, PublicIdentity, TrustState};
use scomms_store::TrustRecord;

/// Messages from the front-end into the core.
#[derive(Debug)]
pub enum UiEvent {
    /// The front-end is up; load or begin creating the identity.
    Ready,
    /// The operator confirmed the first-run identity dialog.
    ConfirmIdentityReply {
        name: String,
        address: String,
        identifiers: Vec<Identifier>,
    },
    /// The operator decided about a newly seen peer. Any state other than
    /// `Allowed` or `Denied` means the dialog was cancelled.
    ConfirmPublicIdentityReply {
        state: TrustState,
        public_identity: PublicIdentity,
    },
    /// Unconditionally overwrite a trust record.
    UpdateTrustRecord(TrustRecord),
    /// Deliver a file to a peer.
    SendFile {
        to: String,
        filename: std::path::PathBuf,
        mime: String,
    },
    /// Begin shutdown; the core answers with [`CoreEvent::Exit`].
    Shutdown,
}

/// Messages from the core out to the front-end.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// First run: ask the operator to confirm name and address.
    ConfirmIdentity {
        message: String,
        suggested_name: String,
        suggested_address: String,
    },
    /// The local identity to display.
    RenderIdentity(PublicIdentity),
    /// The current trust table to display.
    RenderTrust(Vec<TrustRecord>),
    /// A previously unseen peer wants to talk; ask the operator.
    ConfirmPublicIdentity(PublicIdentity),
    /// Something the operator should see.
    Popup { title: String, message: String },
    /// The core is done; the front-end may exit.
    Exit,
}
