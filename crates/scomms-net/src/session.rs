//! The phased session engine.
//!
//! A session walks `StartOfDay -> Session -> Identity -> Confirmation ->
//! Message`; every operation is legal in exactly one phase and the first
//! failure is terminal. The caller closes the connection, there is no
//! retry here.
//!
//! Ordering is driven by role: the client sends first and the server
//! receives first in every phase. Both ends doing anything else deadlocks,
//! so the engine never attempts a parallel send/receive inside one phase.
//!
//! The session phase exchanges fresh anonymous session identities as plain
//! JSON; everything after it travels as an encrypted envelope keyed by
//! those identities, so the long-term identity never crosses the wire in
//! the clear.

use tokio::io::{AsyncRead, AsyncWrite};

use scomms_shared::constants::{DEFAULT_MAX_FRAME_SIZE, FRAME_OVERHEAD};
use scomms_shared::{
    Confirmation, Envelope, Identity, Phase, ProtocolError, PublicIdentity, Rpc, SendFileRpc,
};

use crate::error::{NetError, Result};
use crate::framing::{self, MessageChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

pub struct Session<T> {
    channel: MessageChannel<T>,
    role: Role,
    phase: Phase,
    local_pid: Option<PublicIdentity>,
    peer_pid: Option<PublicIdentity>,
    session_identity: Option<Identity>,
    peer_session: Option<PublicIdentity>,
    confirmation: Option<Confirmation>,
    max_frame_size: usize,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, role: Role) -> Self {
        Self {
            channel: framing::channel(io, DEFAULT_MAX_FRAME_SIZE),
            role,
            phase: Phase::StartOfDay,
            local_pid: None,
            peer_pid: None,
            session_identity: None,
            peer_session: None,
            confirmation: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The peer's long-term public identity, once the identity phase ran.
    pub fn peer(&self) -> Option<&PublicIdentity> {
        self.peer_pid.as_ref()
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Run the session and identity phases back to back.
    pub async fn establish(&mut self, pid: &PublicIdentity) -> Result<()> {
        self.session_phase().await?;
        self.identity_phase(pid).await
    }

    /// Phase 0 → 1: exchange single-use session identities.
    pub async fn session_phase(&mut self) -> Result<()> {
        if self.phase != Phase::StartOfDay {
            return Err(wrong_phase("session exchange", self.phase));
        }

        match self.role {
            Role::Server => {
                self.session_recv().await?;
                self.session_send().await?;
            }
            Role::Client => {
                self.session_send().await?;
                self.session_recv().await?;
            }
        }

        self.phase = Phase::Session;
        Ok(())
    }

    async fn session_send(&mut self) -> Result<()> {
        let session_identity = Identity::session();
        let doc = serde_json::to_vec(&session_identity.public)?;
        self.session_identity = Some(session_identity);
        framing::send(&mut self.channel, doc).await
    }

    async fn session_recv(&mut self) -> Result<()> {
        let doc = framing::recv_timeout(&mut self.channel).await?;
        self.peer_session = Some(serde_json::from_slice(&doc)?);
        Ok(())
    }

    /// Phase 1 → 2: exchange long-term public identities, encrypted.
    pub async fn identity_phase(&mut self, pid: &PublicIdentity) -> Result<()> {
        if self.phase != Phase::Session {
            return Err(wrong_phase("identity exchange", self.phase));
        }

        match self.role {
            Role::Server => {
                self.identity_recv().await?;
                self.rpc_send(&Rpc::Identity(pid.clone())).await?;
            }
            Role::Client => {
                self.rpc_send(&Rpc::Identity(pid.clone())).await?;
                self.identity_recv().await?;
            }
        }

        self.phase = Phase::Identity;
        self.local_pid = Some(pid.clone());
        Ok(())
    }

    async fn identity_recv(&mut self) -> Result<()> {
        match self.rpc_receive().await? {
            Rpc::Identity(peer) => {
                self.peer_pid = Some(peer);
                Ok(())
            }
            other => Err(unexpected("identity", &other)),
        }
    }

    /// Phase 2 → 3: negotiate session parameters. The server verifies the
    /// client reached who it was looking for and reports refusals inside
    /// the echoed confirmation before failing locally; the client surfaces
    /// any error the server reported.
    pub async fn confirmation_phase(&mut self, confirmation: &mut Confirmation) -> Result<()> {
        if self.phase != Phase::Identity {
            return Err(wrong_phase("confirmation exchange", self.phase));
        }

        match self.role {
            Role::Server => {
                let received = self.confirmation_recv().await?;

                let local = self
                    .local_pid
                    .as_ref()
                    .ok_or(NetError::Protocol(ProtocolError::MissingSlot(
                        "local public identity",
                    )))?;
                if local.address != received.looking_for {
                    confirmation.error = format!("unknown user {}", received.looking_for);
                    self.confirmation_send(confirmation).await?;
                    return Err(NetError::Protocol(ProtocolError::UnknownUser(
                        received.looking_for,
                    )));
                }

                self.apply_frame_limit(confirmation.max_frame_size, received.max_frame_size);
                self.confirmation_send(confirmation).await?;
                self.confirmation = Some(received);
            }
            Role::Client => {
                self.confirmation_send(confirmation).await?;
                let received = self.confirmation_recv().await?;

                if !received.error.is_empty() {
                    return Err(NetError::Protocol(ProtocolError::Remote(received.error)));
                }

                self.apply_frame_limit(confirmation.max_frame_size, received.max_frame_size);
                *confirmation = received.clone();
                self.confirmation = Some(received);
            }
        }

        self.phase = Phase::Confirmation;
        Ok(())
    }

    async fn confirmation_send(&mut self, confirmation: &Confirmation) -> Result<()> {
        self.rpc_send(&Rpc::Confirmation(confirmation.clone())).await
    }

    async fn confirmation_recv(&mut self) -> Result<Confirmation> {
        match self.rpc_receive().await? {
            Rpc::Confirmation(confirmation) => Ok(confirmation),
            other => Err(unexpected("confirmation", &other)),
        }
    }

    // Both sides converge on the smaller of the two advertised limits; an
    // advertisement of zero means no preference.
    fn apply_frame_limit(&mut self, local: usize, remote: usize) {
        let mut negotiated = self.max_frame_size;
        if local > 0 {
            negotiated = negotiated.min(local);
        }
        if remote > 0 {
            negotiated = negotiated.min(remote);
        }
        self.max_frame_size = negotiated;
        self.channel
            .codec_mut()
            .set_max_frame_length(negotiated + FRAME_OVERHEAD);
    }

    /// Phase 3 → 4: verify every slot the message phase relies on is
    /// populated, then enter it.
    pub fn become_ready(&mut self) -> Result<()> {
        if self.phase != Phase::Confirmation {
            return Err(wrong_phase("become-ready", self.phase));
        }
        let missing = if self.peer_pid.is_none() {
            Some("peer public identity")
        } else if self.session_identity.is_none() {
            Some("session identity")
        } else if self.peer_session.is_none() {
            Some("peer session identity")
        } else if self.confirmation.is_none() {
            Some("confirmation")
        } else {
            None
        };
        if let Some(slot) = missing {
            return Err(NetError::Protocol(ProtocolError::MissingSlot(slot)));
        }

        self.phase = Phase::Message;
        Ok(())
    }

    /// Seal an RPC in an envelope keyed by the session identities and ship
    /// it as one frame. The command must match the current phase.
    pub async fn rpc_send(&mut self, rpc: &Rpc) -> Result<()> {
        if rpc.required_phase() != self.phase {
            return Err(wrong_phase_cmd(rpc, self.phase));
        }
        if let Rpc::SendFile(file) = rpc {
            if file.content.len() > self.max_frame_size {
                return Err(NetError::Protocol(ProtocolError::FrameTooLarge {
                    size: file.content.len(),
                    limit: self.max_frame_size,
                }));
            }
        }

        let (session_identity, peer_session) = self.inner_keys()?;
        let envelope = session_identity.encrypt(peer_session, &rpc.to_bytes()?)?;
        framing::send(&mut self.channel, envelope.marshal()?).await
    }

    /// Receive one frame, open the envelope, and validate the command
    /// against the current phase. A mismatch is a protocol error and the
    /// caller is expected to drop the connection.
    pub async fn rpc_receive(&mut self) -> Result<Rpc> {
        // no read deadline here: a server sits in the confirmation phase
        // for as long as the remote operator takes to decide, and peers may
        // idle in the message phase. Closing the channel aborts the read.
        let raw = framing::recv(&mut self.channel).await?;

        let (session_identity, peer_session) = self.inner_keys()?;
        let envelope = Envelope::unmarshal(&raw)?;
        let plaintext = session_identity.decrypt(peer_session, &envelope)?;
        let rpc = Rpc::from_bytes(&plaintext)?;

        if rpc.required_phase() != self.phase {
            return Err(wrong_phase_cmd(&rpc, self.phase));
        }
        if let Rpc::SendFile(file) = &rpc {
            if file.content.len() > self.max_frame_size {
                return Err(NetError::Protocol(ProtocolError::FrameTooLarge {
                    size: file.content.len(),
                    limit: self.max_frame_size,
                }));
            }
        }

        Ok(rpc)
    }

    /// Ship a file to the peer. Message phase only.
    pub async fn send_file(&mut self, filename: &str, mime: &str, content: Vec<u8>) -> Result<()> {
        self.rpc_send(&Rpc::SendFile(SendFileRpc {
            filename: filename.to_string(),
            mime: mime.to_string(),
            content,
        }))
        .await
    }

    fn inner_keys(&self) -> Result<(&Identity, &PublicIdentity)> {
        let session_identity = self
            .session_identity
            .as_ref()
            .ok_or(NetError::Protocol(ProtocolError::MissingSlot(
                "session identity",
            )))?;
        let peer_session = self
            .peer_session
            .as_ref()
            .ok_or(NetError::Protocol(ProtocolError::MissingSlot(
                "peer session identity",
            )))?;
        Ok((session_identity, peer_session))
    }

    /// Flush and shut the underlying stream down. Best effort; the session
    /// is unusable afterwards.
    pub async fn close(&mut self) -> Result<()> {
        use futures::SinkExt;
        self.channel.close().await?;
        Ok(())
    }
}

fn wrong_phase(command: &'static str, phase: Phase) -> NetError {
    NetError::Protocol(ProtocolError::WrongPhase { command, phase })
}

fn wrong_phase_cmd(rpc: &Rpc, phase: Phase) -> NetError {
    NetError::Protocol(ProtocolError::WrongPhase {
        command: rpc.command(),
        phase,
    })
}

fn unexpected(expected: &'static str, received: &Rpc) -> NetError {
    NetError::Protocol(ProtocolError::UnexpectedMessage {
        expected,
        received: received.command(),
    })
}
