//! TLS listener and dialer.
//!
//! Listen addresses are split by family so each binds on the right
//! interface; a subset of binds failing is tolerated and only an empty
//! listener set is fatal. Accepted and dialed connections come back as
//! framed [`Session`]s; what happens on them afterwards is the engine's
//! business.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use scomms_shared::constants::RPC_TIMEOUT_SECS;

use crate::error::{NetError, Result};
use crate::session::{Role, Session};
use crate::tls;

pub type TlsSession = Session<TlsStream<TcpStream>>;

/// Split configured listen addresses into IPv4 and IPv6 socket addresses.
/// An empty host or `*` lands in both families; anything that fails to
/// parse is skipped with a warning so one bad entry cannot take the whole
/// listener set down.
pub fn parse_listeners(
    addrs: &[String],
    default_port: u16,
) -> (Vec<SocketAddr>, Vec<SocketAddr>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();

    for addr in addrs {
        let (host, port_str) = match addr.rsplit_once(':') {
            Some((h, p)) if !h.contains(':') || h.starts_with('[') => (h, p),
            // no port, or a bare IPv6 literal that swallowed the split
            _ => (addr.as_str(), ""),
        };

        let port = if port_str.is_empty() {
            default_port
        } else {
            match port_str.parse::<u16>() {
                Ok(p) => p,
                Err(_) => {
                    warn!(addr = %addr, "skipping listen address with invalid port");
                    continue;
                }
            }
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || host == "*" {
            v4.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
            v6.push(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port));
            continue;
        }

        match host.parse::<IpAddr>() {
            Ok(ip @ IpAddr::V4(_)) => v4.push(SocketAddr::new(ip, port)),
            Ok(ip @ IpAddr::V6(_)) => v6.push(SocketAddr::new(ip, port)),
            Err(_) => warn!(addr = %addr, "skipping listen address with invalid host"),
        }
    }

    (v4, v6)
}

/// Bind every configured address and hand accepted, TLS-upgraded sessions
/// to the receiver. Returns the locally bound addresses alongside it.
pub async fn listen(
    addrs: &[String],
    cert_path: &Path,
    key_path: &Path,
    default_port: u16,
) -> Result<(Vec<SocketAddr>, mpsc::Receiver<TlsSession>)> {
    let config = tls::server_config(cert_path, key_path)?;
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let (v4, v6) = parse_listeners(addrs, default_port);

    let mut listeners = Vec::new();
    let mut local_addrs = Vec::new();
    for addr in v4.into_iter().chain(v6) {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let local = listener.local_addr()?;
                info!(addr = %local, "listening");
                local_addrs.push(local);
                listeners.push(listener);
            }
            Err(e) => warn!(addr = %addr, error = %e, "failed to bind listener"),
        }
    }
    if listeners.is_empty() {
        return Err(NetError::NoListeners);
    }

    let (tx, rx) = mpsc::channel(16);
    for listener in listeners {
        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "listener accept failed");
                        break;
                    }
                };

                let acceptor = acceptor.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let upgrade = timeout(
                        Duration::from_secs(RPC_TIMEOUT_SECS),
                        acceptor.accept(stream),
                    )
                    .await;
                    match upgrade {
                        Ok(Ok(stream)) => {
                            debug!(peer = %peer_addr, "accepted connection");
                            let session = Session::new(TlsStream::from(stream), Role::Server);
                            let _ = tx.send(session).await;
                        }
                        Ok(Err(e)) => {
                            debug!(peer = %peer_addr, error = %e, "TLS accept failed")
                        }
                        Err(_) => {
                            debug!(peer = %peer_addr, "TLS accept timed out")
                        }
                    }
                });
            }
        });
    }

    Ok((local_addrs, rx))
}

/// Connect to `host:port`, TLS-upgrade, and return a client-role session.
/// The whole connect-and-handshake is bounded by one timeout.
pub async fn dial(host: &str, port: u16) -> Result<TlsSession> {
    let connector = TlsConnector::from(Arc::new(tls::client_config()));

    let host_owned = host.to_string();
    let connect = async move {
        let stream = TcpStream::connect((host_owned.as_str(), port)).await?;
        let server_name = ServerName::try_from(host_owned)?;
        Ok::<_, NetError>(connector.connect(server_name, stream).await?)
    };

    let stream = timeout(Duration::from_secs(RPC_TIMEOUT_SECS), connect)
        .await
        .map_err(|_| NetError::Timeout)??;

    debug!(host = %host, port, "dialed peer");
    Ok(Session::new(TlsStream::from(stream), Role::Client))
}
