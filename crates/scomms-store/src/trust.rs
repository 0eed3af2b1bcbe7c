//! Encrypted-at-rest trust database.
//!
//! One record per known peer, keyed by the peer's exchange-key bytes. Every
//! record is sealed to the local identity's own public key before it is
//! written, so the file on disk yields nothing without `scomms.id`. The
//! store itself never polices state transitions; the orchestrator does.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scomms_shared::{Envelope, Identity, PublicIdentity, TrustState};

use crate::error::{Result, StoreError};
use crate::kv::KvStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub public_identity: PublicIdentity,
    pub inserted: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub state: TrustState,
    /// User-definable key/value pairs, untouched by the core.
    #[serde(default)]
    pub free_to_use: HashMap<String, String>,
}

pub struct TrustStore {
    // rusqlite connections are not Sync, so one mutex serialises readers
    // and writers alike.
    kv: Mutex<KvStore>,
}

impl TrustStore {
    /// Open (or create) the trust database under `base_dir/trust/`.
    pub fn open(base_dir: &Path) -> Result<Self> {
        let dir = base_dir.join(scomms_shared::constants::TRUST_DIRNAME);
        create_private_dir(&dir)?;

        let kv = KvStore::open(&dir.join("trust.db"))?;
        Ok(Self { kv: Mutex::new(kv) })
    }

    fn kv(&self) -> Result<MutexGuard<'_, KvStore>> {
        self.kv.lock().map_err(|_| StoreError::Lock)
    }

    /// Insert a record for `trustee`. Fails with [`StoreError::Duplicate`]
    /// when the peer is already present and `overwrite` is false.
    pub fn add(
        &self,
        id: &Identity,
        trustee: &PublicIdentity,
        state: TrustState,
        free_to_use: HashMap<String, String>,
        overwrite: bool,
    ) -> Result<()> {
        let kv = self.kv()?;

        if !overwrite && kv.contains(&trustee.key)? {
            return Err(StoreError::Duplicate);
        }

        let record = TrustRecord {
            public_identity: trustee.clone(),
            inserted: Utc::now(),
            last_update: DateTime::<Utc>::UNIX_EPOCH,
            state,
            free_to_use,
        };

        put_sealed(&kv, id, &record)
    }

    /// Overwrite a record unconditionally, refreshing its `last_update`.
    pub fn update(&self, id: &Identity, record: &TrustRecord) -> Result<()> {
        let kv = self.kv()?;

        let record = TrustRecord {
            last_update: Utc::now(),
            ..record.clone()
        };

        put_sealed(&kv, id, &record)
    }

    pub fn get(&self, id: &Identity, trustee: &PublicIdentity) -> Result<TrustRecord> {
        let sealed = self.kv()?.get(&trustee.key)?;
        open_sealed(id, &sealed)
    }

    /// All records in store order. A record that fails to decrypt aborts
    /// the enumeration; that is a data-integrity problem, not a skippable
    /// row.
    pub fn get_all(&self, id: &Identity) -> Result<Vec<TrustRecord>> {
        let kv = self.kv()?;

        let mut records = Vec::new();
        for (_key, sealed) in kv.iterate()? {
            records.push(open_sealed(id, &sealed)?);
        }
        Ok(records)
    }

    pub fn close(self) -> Result<()> {
        self.kv
            .into_inner()
            .map_err(|_| StoreError::Lock)?
            .close()
    }
}

fn put_sealed(kv: &KvStore, id: &Identity, record: &TrustRecord) -> Result<()> {
    let payload = serde_json::to_vec(record)?;
    // sealing to self: only the holder of the local secret can read it back
    let envelope = id.encrypt(&id.public, &payload)?;
    kv.put(&record.public_identity.key, &envelope.marshal()?)
}

fn open_sealed(id: &Identity, sealed: &[u8]) -> Result<TrustRecord> {
    let envelope = Envelope::unmarshal(sealed)?;
    let payload = id.decrypt(&id.public, &envelope)?;
    Ok(serde_json::from_slice(&payload)?)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, TrustStore) {
        let dir = tempfile::tempdir().unwrap();
        let trust = TrustStore::open(dir.path()).unwrap();
        (dir, trust)
    }

    #[test]
    fn add_and_get() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        let mut notes = HashMap::new();
        notes.insert("moo".to_string(), "meh".to_string());

        trust
            .add(&alice, &bob.public, TrustState::Allowed, notes.clone(), false)
            .unwrap();

        let record = trust.get(&alice, &bob.public).unwrap();
        assert_eq!(record.public_identity, bob.public);
        assert_eq!(record.state, TrustState::Allowed);
        assert_eq!(record.free_to_use, notes);
        assert_eq!(record.last_update, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn duplicate_add_trips() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        trust
            .add(&alice, &bob.public, TrustState::Allowed, HashMap::new(), false)
            .unwrap();

        assert!(matches!(
            trust.add(&alice, &bob.public, TrustState::Queued, HashMap::new(), false),
            Err(StoreError::Duplicate)
        ));

        // the original record survived
        let record = trust.get(&alice, &bob.public).unwrap();
        assert_eq!(record.state, TrustState::Allowed);
    }

    #[test]
    fn overwrite_replaces() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        trust
            .add(&alice, &bob.public, TrustState::Queued, HashMap::new(), false)
            .unwrap();
        trust
            .add(&alice, &bob.public, TrustState::Allowed, HashMap::new(), true)
            .unwrap();

        let record = trust.get(&alice, &bob.public).unwrap();
        assert_eq!(record.state, TrustState::Allowed);
    }

    #[test]
    fn update_refreshes_last_update() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        trust
            .add(&alice, &bob.public, TrustState::Queued, HashMap::new(), false)
            .unwrap();

        let mut record = trust.get(&alice, &bob.public).unwrap();
        record.state = TrustState::Allowed;
        trust.update(&alice, &record).unwrap();

        let updated = trust.get(&alice, &bob.public).unwrap();
        assert_eq!(updated.state, TrustState::Allowed);
        assert!(updated.last_update > record.last_update);
        assert_eq!(updated.inserted, record.inserted);
    }

    #[test]
    fn missing_peer_is_not_found() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        assert!(matches!(
            trust.get(&alice, &bob.public),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        let mut notes = HashMap::new();
        notes.insert("note".to_string(), "hi".to_string());

        let trust = TrustStore::open(dir.path()).unwrap();
        trust
            .add(&alice, &bob.public, TrustState::Allowed, notes, false)
            .unwrap();
        let before = trust.get(&alice, &bob.public).unwrap();
        trust.close().unwrap();

        let trust = TrustStore::open(dir.path()).unwrap();
        let after = trust.get(&alice, &bob.public).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn get_all_returns_every_record() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");
        let carol = Identity::generate("Carol", "carol@localhost");

        trust
            .add(&alice, &bob.public, TrustState::Allowed, HashMap::new(), false)
            .unwrap();
        trust
            .add(&alice, &carol.public, TrustState::Queued, HashMap::new(), false)
            .unwrap();

        let records = trust.get_all(&alice).unwrap();
        assert_eq!(records.len(), 2);
        let addresses: Vec<&str> = records
            .iter()
            .map(|r| r.public_identity.address.as_str())
            .collect();
        assert!(addresses.contains(&"bob@localhost"));
        assert!(addresses.contains(&"carol@localhost"));
    }

    #[test]
    fn foreign_record_aborts_get_all() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let mallory = Identity::generate("Mallory", "mallory@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        trust
            .add(&alice, &bob.public, TrustState::Allowed, HashMap::new(), false)
            .unwrap();

        // a record sealed by someone else is unreadable and must abort
        assert!(trust.get_all(&mallory).is_err());
    }

    #[test]
    fn corrupt_state_rejected_on_load() {
        let (_dir, trust) = open_temp();
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        // seal a record whose state integer is not a known value
        let payload = serde_json::json!({
            "public_identity": bob.public,
            "inserted": Utc::now(),
            "last_update": Utc::now(),
            "state": 7,
            "free_to_use": {},
        });
        let payload = serde_json::to_vec(&payload).unwrap();
        let envelope = alice.encrypt(&alice.public, &payload).unwrap();
        trust
            .kv()
            .unwrap()
            .put(&bob.public.key, &envelope.marshal().unwrap())
            .unwrap();

        assert!(matches!(
            trust.get(&alice, &bob.public),
            Err(StoreError::Serde(_))
        ));
    }
}
