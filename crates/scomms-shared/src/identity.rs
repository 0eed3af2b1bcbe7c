use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as ExchangePublic, StaticSecret};

use crate::error::IdentityError;

/// Tagged blob attached to a public identity, e.g. a profile picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: String,
    pub value: Vec<u8>,
}

/// The shareable half of an identity: a name, a `user@host` address, the
/// x25519 exchange key, the ed25519 verifying key, and optional identifier
/// blobs. This is what crosses the wire and what the trust store records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub name: String,
    pub address: String,
    pub key: [u8; 32],
    pub signer: [u8; 32],
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
}

impl PublicIdentity {
    /// Deterministic hex fingerprint over both public keys.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.key);
        hasher.update(&self.signer);
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Abbreviated fingerprint for log lines and dialogs.
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint()[..16].to_string()
    }

    /// Copy with the identifier blobs stripped. Identifiers can be large
    /// and mutable; everything derived from the identity (certificates,
    /// fingerprints shown to peers) uses this form.
    pub fn without_identifiers(&self) -> Self {
        Self {
            identifiers: Vec::new(),
            ..self.clone()
        }
    }

    pub fn marshal(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// A keypair plus its public half. Long-term identities carry a name and
/// address and live in `scomms.id`; session identities are generated with
/// empty ones, key a single connection, and are never persisted.
pub struct Identity {
    signing: SigningKey,
    exchange: StaticSecret,
    pub public: PublicIdentity,
}

/// On-disk form of an [`Identity`].
#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    signing_secret: [u8; 32],
    exchange_secret: [u8; 32],
    public: PublicIdentity,
}

impl Identity {
    pub fn generate(name: &str, address: &str) -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let exchange = StaticSecret::random_from_rng(OsRng);
        let public = PublicIdentity {
            name: name.to_string(),
            address: address.to_string(),
            key: ExchangePublic::from(&exchange).to_bytes(),
            signer: signing.verifying_key().to_bytes(),
            identifiers: Vec::new(),
        };
        Self {
            signing,
            exchange,
            public,
        }
    }

    /// Fresh anonymous identity keying the inner encryption layer of one
    /// connection.
    pub fn session() -> Self {
        Self::generate("", "")
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    pub(crate) fn exchange_secret(&self) -> &StaticSecret {
        &self.exchange
    }

    pub fn marshal(&self) -> Result<Vec<u8>, IdentityError> {
        let record = IdentityRecord {
            signing_secret: self.signing.to_bytes(),
            exchange_secret: self.exchange.to_bytes(),
            public: self.public.clone(),
        };
        Ok(serde_json::to_vec_pretty(&record)?)
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self, IdentityError> {
        let record: IdentityRecord = serde_json::from_slice(data)?;
        let signing = SigningKey::from_bytes(&record.signing_secret);
        let exchange = StaticSecret::from(record.exchange_secret);

        // the recorded public half must be the one these secrets produce
        if record.public.key != ExchangePublic::from(&exchange).to_bytes()
            || record.public.signer != signing.verifying_key().to_bytes()
        {
            return Err(IdentityError::KeyMismatch);
        }

        Ok(Self {
            signing,
            exchange,
            public: record.public,
        })
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_round_trip() {
        let mut identity = Identity::generate("Alice", "alice@localhost");
        identity.public.identifiers.push(Identifier {
            kind: crate::constants::IDENTIFIER_PROFILE_PICTURE.to_string(),
            value: vec![1, 2, 3],
        });

        let bytes = identity.marshal().unwrap();
        let restored = Identity::unmarshal(&bytes).unwrap();

        assert_eq!(restored.public, identity.public);
        assert_eq!(
            restored.sign(b"probe").to_bytes(),
            identity.sign(b"probe").to_bytes()
        );
    }

    #[test]
    fn tampered_public_half_rejected() {
        let identity = Identity::generate("Alice", "alice@localhost");
        let bytes = identity.marshal().unwrap();

        let mut record: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        record["public"]["key"][0] = ((identity.public.key[0] ^ 1) as u64).into();
        let bytes = serde_json::to_vec(&record).unwrap();

        assert!(matches!(
            Identity::unmarshal(&bytes),
            Err(IdentityError::KeyMismatch)
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_ignores_identifiers() {
        let mut identity = Identity::generate("Alice", "alice@localhost");
        let before = identity.public.fingerprint();

        identity.public.identifiers.push(Identifier {
            kind: "note".to_string(),
            value: vec![9; 128],
        });

        assert_eq!(identity.public.fingerprint(), before);
        assert_eq!(before.len(), 64);
        assert_eq!(identity.public.short_fingerprint(), before[..16]);
    }

    #[test]
    fn session_identity_is_anonymous_and_unique() {
        let a = Identity::session();
        let b = Identity::session();

        assert!(a.public.name.is_empty());
        assert!(a.public.address.is_empty());
        assert_ne!(a.public.key, b.public.key);
    }

    #[test]
    fn without_identifiers_strips_blobs_only() {
        let mut identity = Identity::generate("Alice", "alice@localhost");
        identity.public.identifiers.push(Identifier {
            kind: "note".to_string(),
            value: vec![1],
        });

        let stripped = identity.public.without_identifiers();
        assert!(stripped.identifiers.is_empty());
        assert_eq!(stripped.key, identity.public.key);
        assert_eq!(stripped.address, identity.public.address);
    }
}
