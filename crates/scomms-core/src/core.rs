//! The orchestrator.
//!
//! One receive loop demultiplexes everything the front-end sends; inbound
//! sessions and outbound dials each run on their own task. The loop owns
//! the identity, the trust store, the spool, and the verify-waiter table,
//! and shares them with session tasks through a cloneable handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use scomms_net::{transport, NetError, Session};
use scomms_shared::{Confirmation, Identity, ProtocolError, PublicIdentity, Rpc, TrustState};
use scomms_store::{FileSpool, StoreError, TrustRecord, TrustStore};

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::identity::IdentityManager;
use crate::messages::{CoreEvent, UiEvent};
use crate::verify::VerifyWaiters;

const FIRST_RUN_MESSAGE: &str = "This is the first time scomms runs.\n\
    Note that the ID domain *MUST* resolve and be reachable on port 12345!\n\n\
    ID must be in email address format, e.g. jd@mydomain.com\n\
    Name is a full name, e.g. John Doe\n";

/// Shared state handed to every session task.
#[derive(Clone)]
pub struct CoreHandle {
    pub(crate) config: CoreConfig,
    pub(crate) trust: Arc<TrustStore>,
    pub(crate) spool: FileSpool,
    pub(crate) waiters: Arc<VerifyWaiters>,
    pub(crate) events: mpsc::Sender<CoreEvent>,
    pub(crate) identity: Arc<Mutex<Option<Arc<Identity>>>>,
}

pub struct Core {
    handle: CoreHandle,
    ui_rx: mpsc::Receiver<UiEvent>,
}

impl Core {
    pub fn new(
        config: CoreConfig,
        ui_rx: mpsc::Receiver<UiEvent>,
        events: mpsc::Sender<CoreEvent>,
    ) -> Result<Self> {
        create_private_dir(&config.data_dir)?;
        let trust = Arc::new(TrustStore::open(&config.data_dir)?);
        let spool = FileSpool::new(&config.data_dir);

        Ok(Self {
            handle: CoreHandle {
                config,
                trust,
                spool,
                waiters: Arc::new(VerifyWaiters::new()),
                events,
                identity: Arc::new(Mutex::new(None)),
            },
            ui_rx,
        })
    }

    pub fn handle(&self) -> CoreHandle {
        self.handle.clone()
    }

    /// The receive loop. Runs until the front-end asks for shutdown or
    /// drops its sender.
    pub async fn run(mut self) {
        info!("core started");

        while let Some(event) = self.ui_rx.recv().await {
            match event {
                UiEvent::Ready => self.handle.handle_ready().await,
                UiEvent::ConfirmIdentityReply {
                    name,
                    address,
                    identifiers,
                } => {
                    self.handle
                        .handle_confirm_identity_reply(&name, &address, identifiers)
                        .await
                }
                UiEvent::ConfirmPublicIdentityReply {
                    state,
                    public_identity,
                } => {
                    self.handle
                        .handle_confirm_public_identity_reply(state, &public_identity)
                        .await
                }
                UiEvent::UpdateTrustRecord(record) => {
                    self.handle.handle_update_trust_record(&record).await
                }
                UiEvent::SendFile { to, filename, mime } => {
                    self.handle.handle_send_file(to, filename, mime)
                }
                UiEvent::Shutdown => {
                    let _ = self.handle.events.send(CoreEvent::Exit).await;
                    break;
                }
            }
        }

        info!("core stopped");
    }
}

impl CoreHandle {
    pub(crate) fn identity(&self) -> Result<Arc<Identity>> {
        self.identity
            .lock()
            .map_err(|_| CoreError::Lock)?
            .clone()
            .ok_or(CoreError::NoIdentity)
    }

    async fn popup(&self, title: &str, message: &str) {
        let _ = self
            .events
            .send(CoreEvent::Popup {
                title: title.to_string(),
                message: message.to_string(),
            })
            .await;
    }

    pub(crate) async fn render_trust(&self) {
        let records = match self.identity() {
            Ok(identity) => match self.trust.get_all(&identity) {
                Ok(records) => records,
                Err(e) => {
                    self.popup("Could not read trust database", &e.to_string())
                        .await;
                    return;
                }
            },
            // nothing to decrypt with yet
            Err(_) => Vec::new(),
        };
        let _ = self.events.send(CoreEvent::RenderTrust(records)).await;
    }

    async fn handle_ready(&self) {
        let manager = IdentityManager::new(&self.config.data_dir);
        if manager.exists() {
            match manager.load() {
                Ok(identity) => self.adopt_identity(identity).await,
                Err(e) => self.popup("Could not load identity", &e.to_string()).await,
            }
        } else {
            let (name, address) = suggested_identity();
            let _ = self
                .events
                .send(CoreEvent::ConfirmIdentity {
                    message: FIRST_RUN_MESSAGE.to_string(),
                    suggested_name: name,
                    suggested_address: address,
                })
                .await;
        }
        self.render_trust().await;
    }

    async fn handle_confirm_identity_reply(
        &self,
        name: &str,
        address: &str,
        identifiers: Vec<scomms_shared::Identifier>,
    ) {
        let manager = IdentityManager::new(&self.config.data_dir);
        match manager.create(name, address, identifiers) {
            Ok(identity) => self.adopt_identity(identity).await,
            Err(e) => {
                self.popup("Could not create identity", &e.to_string())
                    .await
            }
        }
    }

    async fn adopt_identity(&self, identity: Identity) {
        let identity = Arc::new(identity);
        if let Ok(mut slot) = self.identity.lock() {
            *slot = Some(identity.clone());
        }
        let _ = self
            .events
            .send(CoreEvent::RenderIdentity(identity.public.clone()))
            .await;
        self.start_listener().await;
    }

    async fn start_listener(&self) {
        let listen = transport::listen(
            &self.config.listen_addrs,
            &self.config.cert_path(),
            &self.config.key_path(),
            self.config.port,
        )
        .await;

        match listen {
            Ok((addrs, mut sessions)) => {
                info!(addrs = ?addrs, "listener started");
                let handle = self.clone();
                tokio::spawn(async move {
                    while let Some(session) = sessions.recv().await {
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_session(&handle, session).await {
                                debug!(error = %e, "inbound session failed");
                            }
                        });
                    }
                });
            }
            Err(e) => {
                self.popup("Could not start listener", &e.to_string())
                    .await
            }
        }
    }

    async fn handle_confirm_public_identity_reply(
        &self,
        state: TrustState,
        public_identity: &PublicIdentity,
    ) {
        let fingerprint = public_identity.fingerprint();

        if !matches!(state, TrustState::Allowed | TrustState::Denied) {
            // the operator cancelled; drop the parked session
            self.waiters.remove(&fingerprint);
            return;
        }

        let identity = match self.identity() {
            Ok(identity) => identity,
            Err(e) => {
                self.popup("Public identity verification failed", &e.to_string())
                    .await;
                self.waiters.remove(&fingerprint);
                return;
            }
        };

        if let Err(e) =
            self.trust
                .add(&identity, public_identity, state, HashMap::new(), false)
        {
            self.popup(
                &format!(
                    "Could not add {} to the trust database",
                    public_identity.address
                ),
                &e.to_string(),
            )
            .await;
            self.waiters.remove(&fingerprint);
            return;
        }
        self.render_trust().await;

        if !self.waiters.complete(&fingerprint) {
            self.popup(
                "Public identity verification failed",
                &format!("no session is waiting for {fingerprint}"),
            )
            .await;
        }
    }

    async fn handle_update_trust_record(&self, record: &TrustRecord) {
        let identity = match self.identity() {
            Ok(identity) => identity,
            Err(e) => {
                self.popup("Could not update trust record", &e.to_string())
                    .await;
                return;
            }
        };

        if let Err(e) = self.trust.update(&identity, record) {
            self.popup(
                &format!(
                    "Could not update {} in the trust database",
                    record.public_identity.address
                ),
                &e.to_string(),
            )
            .await;
            return;
        }
        self.render_trust().await;
    }

    fn handle_send_file(&self, to: String, filename: PathBuf, mime: String) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Err(e) = send_file_to_peer(&handle, &to, &filename, &mime).await {
                handle.popup("Send file failed", &e.to_string()).await;
            }
        });
    }
}

/// Drive one inbound session: establish, decide trust, and on approval
/// accept files into the spool until the peer goes away.
pub(crate) async fn serve_session<T>(handle: &CoreHandle, mut session: Session<T>) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let identity = handle.identity()?;
    session.establish(&identity.public).await?;

    let peer = session
        .peer()
        .cloned()
        .ok_or(CoreError::Protocol(ProtocolError::MissingSlot(
            "peer public identity",
        )))?;
    debug!(
        peer = %peer.address,
        fingerprint = %peer.short_fingerprint(),
        "inbound session established"
    );

    let mut confirmation = Confirmation {
        max_frame_size: scomms_shared::constants::DEFAULT_MAX_FRAME_SIZE,
        ..Confirmation::default()
    };

    match handle.trust.get(&identity, &peer) {
        Ok(record) => {
            if record.state != TrustState::Allowed {
                debug!(peer = %peer.address, state = %record.state, "refusing peer");
                let _ = session.close().await;
                return Ok(());
            }
        }
        Err(StoreError::NotFound) => {
            // first contact: queue the peer for the operator and tell the
            // client it has to wait
            handle
                .trust
                .add(&identity, &peer, TrustState::Queued, HashMap::new(), false)?;
            confirmation.state = TrustState::Queued;
            handle.render_trust().await;
        }
        Err(e) => return Err(e.into()),
    }

    session.confirmation_phase(&mut confirmation).await?;

    if confirmation.state == TrustState::Queued {
        debug!(peer = %peer.address, "queued for approval, closing");
        let _ = session.close().await;
        return Ok(());
    }

    // approval may have been withdrawn while the handshake ran; the
    // message phase is only for peers allowed right now
    let record = handle.trust.get(&identity, &peer)?;
    if record.state != TrustState::Allowed {
        debug!(peer = %peer.address, state = %record.state, "approval withdrawn");
        let _ = session.close().await;
        return Ok(());
    }

    session.become_ready()?;

    loop {
        match session.rpc_receive().await {
            Ok(Rpc::SendFile(file)) => {
                match handle
                    .spool
                    .store(&peer.address, &file.filename, &file.mime, &file.content)
                {
                    Ok(path) => {
                        handle
                            .popup(
                                "New file received",
                                &format!(
                                    "A file from {} was saved as {}",
                                    peer.address,
                                    path.display()
                                ),
                            )
                            .await
                    }
                    Err(e) => {
                        handle
                            .popup("Could not store received file", &e.to_string())
                            .await
                    }
                }
            }
            Ok(other) => {
                warn!(command = other.command(), "unexpected command in message phase")
            }
            Err(NetError::Closed) => {
                debug!(peer = %peer.address, "session ended");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Dial `to`, authenticate, verify trust (possibly parking on operator
/// approval), and deliver one file.
async fn send_file_to_peer(
    handle: &CoreHandle,
    to: &str,
    filename: &Path,
    mime: &str,
) -> Result<()> {
    let host = match to.split_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() => host,
        _ => return Err(CoreError::InvalidDestination(to.to_string())),
    };

    let identity = handle.identity()?;
    let mut session = transport::dial(host, handle.config.port).await?;

    let outcome = drive_outbound(handle, &identity, &mut session, to, filename, mime).await;
    let _ = session.close().await;
    outcome
}

async fn drive_outbound<T>(
    handle: &CoreHandle,
    identity: &Identity,
    session: &mut Session<T>,
    to: &str,
    filename: &Path,
    mime: &str,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    session.establish(&identity.public).await?;
    let peer = session
        .peer()
        .cloned()
        .ok_or(CoreError::Protocol(ProtocolError::MissingSlot(
            "peer public identity",
        )))?;

    verify_host(handle, identity, to, &peer).await?;

    let mut confirmation = Confirmation::new(to);
    session.confirmation_phase(&mut confirmation).await?;
    if confirmation.state == TrustState::Queued {
        return Err(CoreError::RemoteQueued);
    }

    session.become_ready()?;

    let content = tokio::fs::read(filename).await?;
    let base = filename
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    session.send_file(&base, mime, content).await?;

    info!(to = %to, file = %base, "file delivered");
    Ok(())
}

/// Decide whether the dialed peer may be acted on. The DNS answer and the
/// cryptographic identity must agree first; then the trust store rules.
/// An unknown peer parks this task until the operator answers the
/// confirmation dialog.
pub(crate) async fn verify_host(
    handle: &CoreHandle,
    identity: &Identity,
    expected_address: &str,
    peer: &PublicIdentity,
) -> Result<()> {
    if expected_address != peer.address {
        return Err(CoreError::Protocol(ProtocolError::AddressMismatch {
            contacted: expected_address.to_string(),
            reported: peer.address.clone(),
        }));
    }

    match handle.trust.get(identity, peer) {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            handle
                .events
                .send(CoreEvent::ConfirmPublicIdentity(peer.clone()))
                .await
                .map_err(|_| CoreError::ChannelClosed)?;

            let decided = handle.waiters.add(&peer.fingerprint())?;
            decided
                .await
                .map_err(|_| CoreError::ConfirmationCancelled)?;
        }
        Err(e) => return Err(e.into()),
    }

    let record = handle.trust.get(identity, peer)?;
    match record.state {
        TrustState::Allowed => Ok(()),
        TrustState::Denied => Err(CoreError::PreviouslyDenied),
        TrustState::Queued => Err(CoreError::RemoteQueued),
        TrustState::Invalid => Err(CoreError::ConfirmationCancelled),
    }
}

fn suggested_identity() -> (String, String) {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    (user.clone(), format!("{user}@{host}"))
}

fn create_private_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
    }
    #[cfg(not(unix))]
    std::fs::create_dir_all(dir)?;

    Ok(())
}
