//! Hybrid authenticated encryption between two identities.
//!
//! The sender derives a symmetric key from an X25519 exchange with the
//! recipient's public key, seals the payload with XChaCha20-Poly1305, and
//! signs `nonce || ciphertext` with its ed25519 key. The recipient verifies
//! the signature against the sender's public identity before decrypting, so
//! a valid envelope proves both confidentiality and origin.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey as ExchangePublic;

use crate::constants::{KDF_CONTEXT_ENVELOPE, NONCE_SIZE};
use crate::error::CryptoError;
use crate::identity::{Identity, PublicIdentity};

/// Authenticated ciphertext produced by [`Identity::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    pub fn marshal(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

// Exchange + KDF with domain separation; both directions of a pair derive
// the same key.
fn derive_shared_key(local: &Identity, peer_key: &[u8; 32]) -> [u8; 32] {
    let shared = local
        .exchange_secret()
        .diffie_hellman(&ExchangePublic::from(*peer_key));
    blake3::derive_key(KDF_CONTEXT_ENVELOPE, shared.as_bytes())
}

impl Identity {
    /// Seal `plaintext` for the holder of `recipient`'s exchange key.
    pub fn encrypt(
        &self,
        recipient: &PublicIdentity,
        plaintext: &[u8],
    ) -> Result<Envelope, CryptoError> {
        let key = derive_shared_key(self, &recipient.key);
        let cipher = XChaCha20Poly1305::new(&key.into());

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut signed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        signed.extend_from_slice(&nonce);
        signed.extend_from_slice(&ciphertext);
        let signature = self.sign(&signed);

        Ok(Envelope {
            nonce,
            ciphertext,
            signature: signature.to_bytes().to_vec(),
        })
    }

    /// Open an envelope sealed by `sender` for this identity. Verifies the
    /// sender's signature before touching the ciphertext.
    pub fn decrypt(
        &self,
        sender: &PublicIdentity,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, CryptoError> {
        let verifying =
            VerifyingKey::from_bytes(&sender.signer).map_err(|_| CryptoError::InvalidKeyBytes)?;
        let signature = Signature::from_slice(&envelope.signature)
            .map_err(|_| CryptoError::BadSignature)?;

        let mut signed = Vec::with_capacity(NONCE_SIZE + envelope.ciphertext.len());
        signed.extend_from_slice(&envelope.nonce);
        signed.extend_from_slice(&envelope.ciphertext);
        verifying
            .verify(&signed, &signature)
            .map_err(|_| CryptoError::BadSignature)?;

        let key = derive_shared_key(self, &sender.key);
        let cipher = XChaCha20Poly1305::new(&key.into());

        cipher
            .decrypt(XNonce::from_slice(&envelope.nonce), &envelope.ciphertext[..])
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");
        let plaintext = b"meet me on port 12345";

        let envelope = alice.encrypt(&bob.public, plaintext).unwrap();
        let decrypted = bob.decrypt(&alice.public, &envelope).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn encrypt_to_self_round_trip() {
        let alice = Identity::generate("Alice", "alice@localhost");

        let envelope = alice.encrypt(&alice.public, b"at rest").unwrap();
        let decrypted = alice.decrypt(&alice.public, &envelope).unwrap();

        assert_eq!(decrypted, b"at rest");
    }

    #[test]
    fn wrong_recipient_fails() {
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");
        let eve = Identity::generate("Eve", "eve@localhost");

        let envelope = alice.encrypt(&bob.public, b"secret").unwrap();
        assert!(matches!(
            eve.decrypt(&alice.public, &envelope),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn forged_sender_fails_signature_check() {
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");
        let eve = Identity::generate("Eve", "eve@localhost");

        // eve seals a payload but claims alice sent it
        let envelope = eve.encrypt(&bob.public, b"forged").unwrap();
        let mut claimed = alice.public.clone();
        claimed.key = eve.public.key;

        assert!(matches!(
            bob.decrypt(&claimed, &envelope),
            Err(CryptoError::BadSignature)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        let mut envelope = alice.encrypt(&bob.public, b"payload").unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0xFF;

        assert!(matches!(
            bob.decrypt(&alice.public, &envelope),
            Err(CryptoError::BadSignature)
        ));
    }

    #[test]
    fn envelope_marshal_round_trip() {
        let alice = Identity::generate("Alice", "alice@localhost");
        let bob = Identity::generate("Bob", "bob@localhost");

        let envelope = alice.encrypt(&bob.public, b"wire form").unwrap();
        let restored = Envelope::unmarshal(&envelope.marshal().unwrap()).unwrap();

        assert_eq!(restored, envelope);
        assert_eq!(bob.decrypt(&alice.public, &restored).unwrap(), b"wire form");
    }
}
