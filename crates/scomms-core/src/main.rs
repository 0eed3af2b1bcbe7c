use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use scomms_core::{Core, CoreConfig, CoreEvent, UiEvent};
use scomms_shared::TrustState;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("scomms_core=debug,scomms_net=debug,scomms_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = CoreConfig::from_env();
    info!(dir = %config.data_dir.display(), "starting scomms node");

    let (ui_tx, ui_rx) = mpsc::channel(50);
    let (events_tx, mut events_rx) = mpsc::channel(50);

    let core = match Core::new(config, ui_rx, events_tx) {
        Ok(core) => core,
        Err(e) => {
            error!(error = %e, "could not initialise core");
            std::process::exit(1);
        }
    };
    let core_task = tokio::spawn(core.run());

    let _ = ui_tx.send(UiEvent::Ready).await;

    // Headless front-end: adopt the suggested identity on first run, log
    // renders and popups, and cancel interactive peer confirmations since
    // nobody is there to answer them.
    let ui = ui_tx.clone();
    let front_end = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                CoreEvent::ConfirmIdentity {
                    suggested_name,
                    suggested_address,
                    ..
                } => {
                    info!(
                        name = %suggested_name,
                        address = %suggested_address,
                        "first run, adopting suggested identity"
                    );
                    let _ = ui
                        .send(UiEvent::ConfirmIdentityReply {
                            name: suggested_name,
                            address: suggested_address,
                            identifiers: Vec::new(),
                        })
                        .await;
                }
                CoreEvent::ConfirmPublicIdentity(public_identity) => {
                    warn!(
                        peer = %public_identity.address,
                        fingerprint = %public_identity.short_fingerprint(),
                        "no interactive front-end to approve peer, cancelling"
                    );
                    let _ = ui
                        .send(UiEvent::ConfirmPublicIdentityReply {
                            state: TrustState::Invalid,
                            public_identity,
                        })
                        .await;
                }
                CoreEvent::RenderIdentity(public_identity) => {
                    info!(
                        name = %public_identity.name,
                        address = %public_identity.address,
                        fingerprint = %public_identity.short_fingerprint(),
                        "identity"
                    );
                }
                CoreEvent::RenderTrust(records) => {
                    info!(peers = records.len(), "trust table updated");
                    for record in &records {
                        info!(
                            peer = %record.public_identity.address,
                            state = %record.state,
                            "trusted peer"
                        );
                    }
                }
                CoreEvent::Popup { title, message } => {
                    info!(%title, %message, "notice");
                }
                CoreEvent::Exit => break,
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "could not wait for shutdown signal");
    }
    info!("shutting down");

    let _ = ui_tx.send(UiEvent::Shutdown).await;
    let _ = front_end.await;
    let _ = core_task.await;
}
