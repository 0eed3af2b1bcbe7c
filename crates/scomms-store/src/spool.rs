//! Holding area for received files.
//!
//! Each peer gets its own directory under `<data>/spool/`; payloads land
//! there with a `.meta` sidecar describing mime type and arrival time.
//! Nothing is rolled back on failure; partial files stay on disk for the
//! operator to inspect.

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use scomms_shared::protocol::MetaRecord;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct FileSpool {
    root: PathBuf,
}

impl FileSpool {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            root: base_dir.join(scomms_shared::constants::SPOOL_DIRNAME),
        }
    }

    /// Persist a received payload for `peer_address` and return the final
    /// path. An empty filename hint gets a random name; a colliding hint is
    /// renamed rather than overwritten.
    pub fn store(
        &self,
        peer_address: &str,
        filename_hint: &str,
        mime: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.root.join(sanitize_component(peer_address)?);
        create_private_dir(&dir)?;

        let mut filename = if filename_hint.is_empty() {
            random_name("unknown")
        } else {
            sanitize_component(filename_hint)?
        };

        if dir.join(&filename).exists() {
            filename = random_name(&filename);
        }
        let target = dir.join(&filename);

        let meta = MetaRecord {
            version: 1,
            mime: mime.to_string(),
            created: Utc::now(),
        };
        write_private_file(
            &dir.join(format!("{filename}.meta")),
            &serde_json::to_vec(&meta)?,
        )?;
        write_private_file(&target, content)?;

        tracing::info!(path = %target.display(), bytes = content.len(), "spooled file");

        Ok(target)
    }
}

/// Reduce an untrusted name to its final path component.
fn sanitize_component(name: &str) -> Result<String> {
    let cleaned = name.replace('\\', "/");
    match Path::new(&cleaned).file_name() {
        Some(base) => Ok(base.to_string_lossy().into_owned()),
        None => Err(StoreError::BadName(name.to_string())),
    }
}

fn random_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
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

fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_file_with_meta_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::new(dir.path());

        let path = spool
            .store("alice@host-a", "note.txt", "text/plain", b"hello")
            .unwrap();

        assert!(path.ends_with("alice@host-a/note.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        let meta: MetaRecord = serde_json::from_slice(
            &std::fs::read(path.with_extension("txt.meta")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.mime, "text/plain");
    }

    #[test]
    fn empty_hint_gets_random_name() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::new(dir.path());

        let path = spool.store("alice@host-a", "", "text/plain", b"x").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert!(name.starts_with("unknown-"));
        assert_eq!(std::fs::read(&path).unwrap(), b"x");
    }

    #[test]
    fn collision_gets_fresh_name() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::new(dir.path());

        let first = spool
            .store("alice@host-a", "note.txt", "text/plain", b"one")
            .unwrap();
        let second = spool
            .store("alice@host-a", "note.txt", "text/plain", b"two")
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("note.txt-"));
    }

    #[test]
    fn traversal_hints_are_reduced_to_basename() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::new(dir.path());

        let path = spool
            .store("alice@host-a", "../../etc/passwd", "text/plain", b"nope")
            .unwrap();

        assert!(path.ends_with("alice@host-a/passwd"));
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn unusable_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let spool = FileSpool::new(dir.path());

        assert!(matches!(
            spool.store("alice@host-a", "..", "text/plain", b"x"),
            Err(StoreError::BadName(_))
        ));
        assert!(matches!(
            spool.store("/", "note.txt", "text/plain", b"x"),
            Err(StoreError::BadName(_))
        ));
    }
}
