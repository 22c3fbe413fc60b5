//! Key derivation: entropy → SHA-512 → clamped X25519 scalar → public key

use phrasekey_core::{PhraseKeyError, PhraseKeyResult};
use sha2::{Digest, Sha512};
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};
use zeroize::{Zeroize, Zeroizing};

use crate::{PublicKey, KEY_SIZE};

/// A clamped X25519 private scalar.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct PrivateKey {
    bytes: [u8; KEY_SIZE],
}

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Scalar multiplication against the Curve25519 base point.
    pub fn public_key(&self) -> PublicKey {
        x25519(self.bytes, X25519_BASEPOINT_BYTES)
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An X25519 key pair derived from phrase entropy.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

/// Derive the X25519 key pair for a seed.
///
/// The private key is `clamp(SHA-512(entropy)[..32])`, which is how Ed25519
/// expands a 32-byte seed; changing any step breaks every existing identity.
pub fn derive_keypair(entropy: &[u8]) -> PhraseKeyResult<KeyPair> {
    let mut wide = Zeroizing::new([0u8; 64]);
    wide.copy_from_slice(&Sha512::digest(entropy));

    let mut scalar = [0u8; KEY_SIZE];
    scalar.copy_from_slice(&wide[..KEY_SIZE]);
    clamp(&mut scalar);

    let private = PrivateKey::from_bytes(scalar);
    scalar.zeroize();

    let public = private.public_key();
    if public == [0u8; KEY_SIZE] {
        return Err(PhraseKeyError::KeyDerivation(
            "X25519 scalar multiplication produced the identity point".into(),
        ));
    }

    Ok(KeyPair { private, public })
}

fn clamp(scalar: &mut [u8; KEY_SIZE]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}
