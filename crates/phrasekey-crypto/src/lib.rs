//! phrasekey-crypto: X25519 identities derived from BIP-39 phrases
//!
//! Derivation (compatible with ssh-to-age and melt):
//! ```text
//! phrase ──BIP-39──▶ entropy ──SHA-512──▶ [0..32] ──clamp──▶ private scalar
//!                                                            │
//!                                              X25519(basepoint)
//!                                                            ▼
//!                                                       public key
//! ```
//!
//! File keys are wrapped with the age v1 X25519 recipient scheme:
//! ephemeral ECDH → HKDF-SHA256 (salt = ephemeral ‖ recipient) →
//! ChaCha20-Poly1305 under a zero nonce.

pub mod derive;
pub mod encoding;
pub mod mnemonic;
pub mod stanza;

pub use derive::{derive_keypair, KeyPair, PrivateKey};
pub use encoding::{
    decode_identity, decode_recipient, encode_identity, encode_recipient, IDENTITY_HRP,
    RECIPIENT_HRP,
};
pub use mnemonic::{derive_from_mnemonic, generate_mnemonic, mnemonic_to_entropy};
pub use stanza::{unwrap, wrap, Stanza, X25519_LABEL, X25519_TAG};

/// Size of an X25519 key (private scalar or public point) in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// An X25519 public key.
pub type PublicKey = [u8; KEY_SIZE];
