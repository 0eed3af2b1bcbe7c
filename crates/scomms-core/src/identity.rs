//! Lifecycle of the node's long-term identity.
//!
//! The identity is created once, written to `scomms.id` owner-read only,
//! and never mutated afterwards. Saving also regenerates the transport
//! certificate and key from the public half, identifier blobs stripped.

use std::path::{Path, PathBuf};

use tracing::info;

use scomms_shared::constants::{CERT_FILENAME, IDENTITY_FILENAME, KEY_FILENAME};
use scomms_shared::{Identifier, Identity};

use crate::error::Result;

pub struct IdentityManager {
    dir: PathBuf,
}

impl IdentityManager {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn identity_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILENAME)
    }

    pub fn exists(&self) -> bool {
        self.identity_path().exists()
    }

    pub fn load(&self) -> Result<Identity> {
        let data = std::fs::read(self.identity_path())?;
        let identity = Identity::unmarshal(&data)?;
        info!(
            address = %identity.public.address,
            fingerprint = %identity.public.short_fingerprint(),
            "loaded identity"
        );
        Ok(identity)
    }

    pub fn create(
        &self,
        name: &str,
        address: &str,
        identifiers: Vec<Identifier>,
    ) -> Result<Identity> {
        let mut identity = Identity::generate(name, address);
        identity.public.identifiers = identifiers;
        self.save(&identity)?;
        info!(
            address = %address,
            fingerprint = %identity.public.short_fingerprint(),
            "created identity"
        );
        Ok(identity)
    }

    /// Write the identity file, then regenerate the transport certificate
    /// and key from its public half.
    pub fn save(&self, identity: &Identity) -> Result<()> {
        write_owner_read(&self.identity_path(), &identity.marshal()?)?;

        scomms_net::cert::generate(
            &self.dir.join(CERT_FILENAME),
            &self.dir.join(KEY_FILENAME),
            &identity.public,
        )?;

        Ok(())
    }
}

fn write_owner_read(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    // a previous save left the file owner-read only
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IdentityManager::new(dir.path());

        assert!(!manager.exists());
        let created = manager
            .create("Alice", "alice@localhost", Vec::new())
            .unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.public, created.public);
    }

    #[test]
    fn save_regenerates_transport_material() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IdentityManager::new(dir.path());

        let identity = manager
            .create("Alice", "alice@localhost", Vec::new())
            .unwrap();

        let cert_path = dir.path().join(CERT_FILENAME);
        let key_path = dir.path().join(KEY_FILENAME);
        assert!(cert_path.exists());
        assert!(key_path.exists());

        let before = std::fs::read(&cert_path).unwrap();
        manager.save(&identity).unwrap();
        assert_ne!(std::fs::read(&cert_path).unwrap(), before);
    }

    #[test]
    fn load_without_identity_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = IdentityManager::new(dir.path());
        assert!(manager.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn identity_file_is_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let manager = IdentityManager::new(dir.path());
        manager
            .create("Alice", "alice@localhost", Vec::new())
            .unwrap();

        let mode = std::fs::metadata(dir.path().join(IDENTITY_FILENAME))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o400);
    }
}
