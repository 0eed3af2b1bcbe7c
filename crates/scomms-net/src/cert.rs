//! Self-signed transport certificates derived from the node's identity.
//!
//! The certificate exists so the TLS layer has something to present; trust
//! comes from the inner identity exchange. The public identity (identifier
//! blobs stripped, so the certificate stays small and stable) rides along
//! in a private extension for peers that want to cross-check.

use std::path::Path;

use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};

use scomms_shared::PublicIdentity;

use crate::error::Result;

/// Private-arc OID carrying the JSON public identity.
const IDENTITY_EXTENSION_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 62694, 1];

/// Generate a fresh certificate and key for `public` and write both as PEM,
/// owner-read only. Existing files are replaced.
pub fn generate(cert_path: &Path, key_path: &Path, public: &PublicIdentity) -> Result<()> {
    let stripped = public.without_identifiers();
    let payload = stripped.marshal()?;

    let host = host_part(&public.address);
    let mut params = CertificateParams::new(vec![host.clone()])?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, public.address.clone());
    if !public.name.is_empty() {
        dn.push(DnType::OrganizationName, public.name.clone());
    }
    params.distinguished_name = dn;
    params
        .custom_extensions
        .push(CustomExtension::from_oid_content(
            IDENTITY_EXTENSION_OID,
            payload,
        ));

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    write_private_file(cert_path, cert.pem().as_bytes())?;
    write_private_file(key_path, key_pair.serialize_pem().as_bytes())?;

    tracing::debug!(
        cert = %cert_path.display(),
        host = %host,
        "regenerated transport certificate"
    );

    Ok(())
}

// The SAN wants a hostname, not a user@host address.
fn host_part(address: &str) -> String {
    match address.rsplit_once('@') {
        Some((_, host)) if !host.is_empty() => host.to_string(),
        _ => "localhost".to_string(),
    }
}

fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    // earlier runs left these owner-read only, so truncating in place fails
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o400);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    Ok(())
}
