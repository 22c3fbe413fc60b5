//! Phrase identities and recipients
//!
//! An identity is only a public key at rest. Unlocking it means finding the
//! matching private key: first in the [`KeyCache`], then by asking a
//! [`PhraseProvider`] for the seed phrase and re-deriving.
//!
//! Identity file format (one identity per line, `#` comments allowed):
//! ```text
//! # created: 2026-01-01T00:00:00+00:00
//! # public key: age1…
//! AGE-PLUGIN-BIP39-1…
//! ```

use anyhow::Context;
use phrasekey_core::{PhraseKeyError, PhraseKeyResult};
use phrasekey_crypto::{
    decode_identity, decode_recipient, derive_keypair, encode_identity, encode_recipient,
    mnemonic_to_entropy, stanza, PrivateKey, PublicKey, Stanza, IDENTITY_HRP, KEY_SIZE,
    X25519_TAG,
};
use secrecy::ExposeSecret;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::cache::KeyCache;
use crate::prompt::{PhraseProvider, PHRASE_PROMPT};

/// Decryption capability bound to a phrase-derived public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhraseIdentity {
    public_key: PublicKey,
}

impl PhraseIdentity {
    pub fn from_public_key(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    /// Build from a raw 32-byte public key payload.
    pub fn parse_identity(bytes: &[u8]) -> PhraseKeyResult<Self> {
        let public_key = <PublicKey>::try_from(bytes).map_err(|_| {
            PhraseKeyError::InvalidIdentity(format!(
                "expected {KEY_SIZE}-byte public key, found {} bytes",
                bytes.len()
            ))
        })?;
        Ok(Self { public_key })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The recipient that encrypts to this identity.
    pub fn to_recipient(&self) -> PhraseRecipient {
        PhraseRecipient {
            public_key: self.public_key,
        }
    }
}

impl FromStr for PhraseIdentity {
    type Err = PhraseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_identity(s).map(Self::from_public_key)
    }
}

impl fmt::Display for PhraseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = encode_identity(&self.public_key).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

/// Encryption capability: wraps file keys to a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhraseRecipient {
    public_key: PublicKey,
}

impl PhraseRecipient {
    pub fn from_public_key(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    /// Build from a raw 32-byte public key payload.
    pub fn parse_recipient(bytes: &[u8]) -> PhraseKeyResult<Self> {
        let public_key = <PublicKey>::try_from(bytes).map_err(|_| {
            PhraseKeyError::InvalidRecipient(format!(
                "expected {KEY_SIZE}-byte public key, found {} bytes",
                bytes.len()
            ))
        })?;
        Ok(Self { public_key })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Wrap `file_key` into a single X25519 stanza.
    pub fn wrap(&self, file_key: &[u8]) -> PhraseKeyResult<Vec<Stanza>> {
        Ok(vec![stanza::wrap(&self.public_key, file_key)?])
    }
}

/// Accepts an `age1…` recipient or an `AGE-PLUGIN-BIP39-1…` identity.
impl FromStr for PhraseRecipient {
    type Err = PhraseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.to_ascii_lowercase().starts_with(IDENTITY_HRP) {
            return decode_identity(s).map(Self::from_public_key);
        }
        decode_recipient(s).map(Self::from_public_key)
    }
}

impl fmt::Display for PhraseRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = encode_recipient(&self.public_key).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

/// Turns identities into private keys: cache first, then the phrase.
pub struct Unlocker {
    cache: KeyCache,
    provider: Box<dyn PhraseProvider>,
}

impl Unlocker {
    pub fn new(cache: KeyCache, provider: Box<dyn PhraseProvider>) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Private key for `identity`.
    ///
    /// A derived key is checked against the identity before it is cached or
    /// used; a valid phrase for some other identity is `MnemonicMismatch`.
    pub fn private_key(&self, identity: &PhraseIdentity) -> PhraseKeyResult<PrivateKey> {
        if let Some(private) = self.cache.get(&identity.public_key) {
            return Ok(private);
        }

        let phrase = self
            .provider
            .acquire_phrase(PHRASE_PROMPT, true)?
            .ok_or(PhraseKeyError::UserCancelled)?;
        let entropy = mnemonic_to_entropy(phrase.expose_secret())?;
        let pair = derive_keypair(&entropy)?;

        if pair.public != identity.public_key {
            tracing::debug!("seed phrase derives a different public key");
            return Err(PhraseKeyError::MnemonicMismatch);
        }

        self.cache.put(&pair.public, &pair.private);
        Ok(pair.private)
    }

    /// Recover the file key addressed to `identity`.
    ///
    /// Without any X25519 stanza this is `IncorrectIdentity` straight away:
    /// the cache is not read and no phrase is requested.
    pub fn unwrap(
        &self,
        identity: &PhraseIdentity,
        stanzas: &[Stanza],
    ) -> PhraseKeyResult<Zeroizing<Vec<u8>>> {
        if !stanzas.iter().any(|s| s.tag == X25519_TAG) {
            return Err(PhraseKeyError::IncorrectIdentity);
        }
        let private = self.private_key(identity)?;
        stanza::unwrap(&private, &identity.public_key, stanzas)
    }

    /// Pair `identity` with this unlocker for use as an `age::Identity`.
    pub fn bind<'a>(&'a self, identity: &'a PhraseIdentity) -> UnlockingIdentity<'a> {
        UnlockingIdentity {
            identity,
            unlocker: self,
        }
    }
}

/// An identity together with the means to unlock it.
pub struct UnlockingIdentity<'a> {
    pub(crate) identity: &'a PhraseIdentity,
    pub(crate) unlocker: &'a Unlocker,
}

/// Parse identity file contents.
pub fn parse_identity_file(contents: &str) -> PhraseKeyResult<Vec<PhraseIdentity>> {
    let mut identities = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let identity = line.parse::<PhraseIdentity>().map_err(|e| match e {
            PhraseKeyError::InvalidIdentity(msg) => {
                PhraseKeyError::InvalidIdentity(format!("line {}: {msg}", index + 1))
            }
            other => other,
        })?;
        identities.push(identity);
    }

    if identities.is_empty() {
        return Err(PhraseKeyError::InvalidIdentity(
            "no identities found".into(),
        ));
    }
    Ok(identities)
}

/// Read and parse an identity file.
pub fn read_identity_file(path: &Path) -> anyhow::Result<Vec<PhraseIdentity>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading identity file: {}", path.display()))?;
    parse_identity_file(&contents)
        .with_context(|| format!("parsing identity file: {}", path.display()))
}

/// Render an identity file with creation and public key comments.
pub fn render_identity_file(identity: &PhraseIdentity, created: &str) -> String {
    format!(
        "# created: {created}\n# public key: {}\n{identity}\n",
        identity.to_recipient()
    )
}
