/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide three categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.
//! 3. **Key management**: the [`KeyManager`] trait through which the consensus core signs outgoing
//!    messages and verifies incoming ones, plus [`Ed25519KeyManager`], its default implementation.

use borsh::BorshSerialize;

use super::basic::{MemberId, SignatureBytes};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// Signs message content with the local replica's key and verifies signatures made by other members.
///
/// The consensus core never touches key material directly; it only calls into this trait. Any
/// implementation must be deterministic in `verify`: the same `(content, signature, signer)` triple
/// must always verify the same way.
pub trait KeyManager: Send + Sync {
    /// The identity of the local replica.
    fn my_id(&self) -> MemberId;

    /// Sign `content` with the local replica's key.
    fn sign(&self, content: &[u8]) -> SignatureBytes;

    /// Check whether `signature` is a signature over `content` created by `signer`.
    fn verify(&self, content: &[u8], signature: &SignatureBytes, signer: &MemberId) -> bool;
}

/// A facade around [`SigningKey`] that implements method for [`sign`](Self::sign)-ing messages as well
/// as a getter for the [`public`](Self::public) key associated with the signing key.
#[derive(Clone)]
pub(crate) struct Keypair(pub(crate) SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub(crate) fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub(crate) fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub(crate) fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}

/// [`KeyManager`] backed by an Ed25519 signing key. Member identities are Ed25519 verifying keys.
#[derive(Clone)]
pub struct Ed25519KeyManager {
    keypair: Keypair,
}

impl Ed25519KeyManager {
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            keypair: Keypair::new(signing_key),
        }
    }
}

impl KeyManager for Ed25519KeyManager {
    fn my_id(&self) -> MemberId {
        MemberId::from(self.keypair.public())
    }

    fn sign(&self, content: &[u8]) -> SignatureBytes {
        self.keypair.sign(content)
    }

    fn verify(&self, content: &[u8], signature: &SignatureBytes, signer: &MemberId) -> bool {
        let Ok(verifying_key) = signer.verifying_key() else {
            return false;
        };
        let signature = Signature::from_bytes(&signature.bytes());
        verifying_key.verify(content, &signature).is_ok()
    }
}

/// Canonical byte encoding of `value`, used as the input to both hashing and signing.
pub(crate) fn canonical_bytes<T: BorshSerialize + ?Sized>(value: &T) -> Vec<u8> {
    // Serializing into an in-memory buffer cannot hit an I/O error.
    value
        .try_to_vec()
        .expect("borsh serialization into a Vec is infallible")
}
