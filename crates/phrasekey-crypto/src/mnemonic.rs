//! BIP-39 seed phrases
//!
//! A new identity gets a 24-word phrase (256 bits of entropy). The phrase is
//! never stored digitally: the identity file only carries the public key,
//! and the private key is re-derived from the phrase whenever it is needed.

use bip39::Mnemonic;
use phrasekey_core::{PhraseKeyError, PhraseKeyResult};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::derive::{derive_keypair, KeyPair};

/// Entropy size of a generated phrase (24 words)
pub const ENTROPY_SIZE: usize = 32;

/// Validate a phrase (word list and checksum) and return its entropy.
pub fn mnemonic_to_entropy(phrase: &str) -> PhraseKeyResult<Zeroizing<Vec<u8>>> {
    let mnemonic: Mnemonic = phrase
        .trim()
        .parse()
        .map_err(|_| PhraseKeyError::InvalidMnemonic)?;
    Ok(Zeroizing::new(mnemonic.to_entropy()))
}

/// Generate a fresh 24-word phrase from OS randomness.
pub fn generate_mnemonic() -> PhraseKeyResult<SecretString> {
    let mut entropy = Zeroizing::new([0u8; ENTROPY_SIZE]);
    OsRng
        .try_fill_bytes(&mut entropy[..])
        .map_err(|e| PhraseKeyError::RandomnessUnavailable(e.to_string()))?;

    let mnemonic = Mnemonic::from_entropy(&entropy[..])
        .map_err(|e| PhraseKeyError::KeyDerivation(format!("BIP-39 encoding failed: {e}")))?;

    Ok(SecretString::from(mnemonic.to_string()))
}

/// Validate a phrase and derive its X25519 key pair.
pub fn derive_from_mnemonic(phrase: &SecretString) -> PhraseKeyResult<KeyPair> {
    let entropy = mnemonic_to_entropy(phrase.expose_secret())?;
    derive_keypair(&entropy)
}
