//! rustls configuration for both ends of a connection.
//!
//! Certificates here are transport plumbing, not authentication: every node
//! presents a self-signed certificate derived from its identity, and the
//! client side accepts any certificate. Peers authenticate each other at
//! the inner protocol layer by public-key comparison against the trust
//! store.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pemfile::{certs, private_key};

use crate::error::{NetError, Result};

#[derive(Debug)]
struct PermissiveVerifier;

impl ServerCertVerifier for PermissiveVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
        ]
    }
}

/// Dialer configuration: TLS 1.2 or newer, no certificate verification.
pub fn client_config() -> ClientConfig {
    let mut config = ClientConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS13,
        &rustls::version::TLS12,
    ])
    .with_root_certificates(RootCertStore::empty())
    .with_no_client_auth();

    config
        .dangerous()
        .set_certificate_verifier(Arc::new(PermissiveVerifier));

    config
}

/// Listener configuration from the PEM certificate and key that
/// `identity save` wrote.
pub fn server_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    let mut reader = BufReader::new(File::open(cert_path)?);
    let chain = certs(&mut reader).collect::<std::result::Result<Vec<_>, _>>()?;

    let mut reader = BufReader::new(File::open(key_path)?);
    let key = private_key(&mut reader)?
        .ok_or_else(|| NetError::NoPrivateKey(key_path.display().to_string()))?;

    Ok(ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?)
}
