//! age v1 X25519 stanzas: wrap and unwrap a file key under one-shot ECDH
//!
//! ```text
//! shared  = X25519(ephemeral_secret, recipient)
//! key     = HKDF-SHA256(ikm = shared, salt = ephemeral_pub ‖ recipient, info = LABEL)
//! body    = ChaCha20-Poly1305(key, nonce = 0¹², file_key)
//! stanza  = -> X25519 base64(ephemeral_pub)
//!           base64(body)
//! ```
//!
//! The zero nonce is only sound because every wrap draws a new ephemeral
//! secret, so no wrapping key is ever used twice.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use phrasekey_core::{PhraseKeyError, PhraseKeyResult};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::derive::PrivateKey;
use crate::{PublicKey, KEY_SIZE};

/// HKDF info string of the age X25519 recipient type
pub const X25519_LABEL: &str = "age-encryption.org/v1/X25519";

/// Stanza type tag
pub const X25519_TAG: &str = "X25519";

/// Column width of stanza body lines in the text form
const BODY_COLUMNS: usize = 64;

/// A wrapped file key addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    pub tag: String,
    pub args: Vec<String>,
    pub body: Vec<u8>,
}

/// Wrap `file_key` to `recipient` with a freshly generated ephemeral key.
///
/// Any length is accepted, including empty; length policy belongs to the
/// file format using the stanza.
pub fn wrap(recipient: &PublicKey, file_key: &[u8]) -> PhraseKeyResult<Stanza> {
    let mut ephemeral_bytes = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(&mut ephemeral_bytes[..])
        .map_err(|e| PhraseKeyError::RandomnessUnavailable(e.to_string()))?;
    let ephemeral = StaticSecret::from(*ephemeral_bytes);
    let ephemeral_public = X25519PublicKey::from(&ephemeral).to_bytes();

    let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(*recipient));
    if !shared.was_contributory() {
        return Err(PhraseKeyError::EcdhFailure);
    }

    let key = wrapping_key(shared.as_bytes(), &ephemeral_public, recipient)?;
    let body = ChaCha20Poly1305::new(Key::from_slice(&key[..]))
        .encrypt(&Nonce::default(), file_key)
        .map_err(|e| anyhow::anyhow!("file key wrapping failed: {e}"))?;

    Ok(Stanza {
        tag: X25519_TAG.to_string(),
        args: vec![STANDARD_NO_PAD.encode(ephemeral_public)],
        body,
    })
}

/// Recover the file key from the first stanza addressed to this key pair.
///
/// Stanzas of other types, malformed X25519 stanzas, and stanzas for other
/// recipients are skipped. `IncorrectIdentity` if nothing opens.
pub fn unwrap(
    private: &PrivateKey,
    public: &PublicKey,
    stanzas: &[Stanza],
) -> PhraseKeyResult<Zeroizing<Vec<u8>>> {
    let secret = StaticSecret::from(*private.as_bytes());

    for (index, stanza) in stanzas.iter().enumerate() {
        if stanza.tag != X25519_TAG {
            continue;
        }
        match try_unwrap(&secret, public, stanza) {
            Some(file_key) => {
                tracing::debug!(index, "unwrapped X25519 stanza");
                return Ok(file_key);
            }
            None => tracing::debug!(index, "X25519 stanza not addressed to this identity"),
        }
    }

    Err(PhraseKeyError::IncorrectIdentity)
}

fn try_unwrap(
    secret: &StaticSecret,
    public: &PublicKey,
    stanza: &Stanza,
) -> Option<Zeroizing<Vec<u8>>> {
    let [arg] = stanza.args.as_slice() else {
        return None;
    };
    let ephemeral_public: [u8; KEY_SIZE] = STANDARD_NO_PAD.decode(arg).ok()?.try_into().ok()?;

    let shared = secret.diffie_hellman(&X25519PublicKey::from(ephemeral_public));
    if !shared.was_contributory() {
        return None;
    }

    let key = wrapping_key(shared.as_bytes(), &ephemeral_public, public).ok()?;
    ChaCha20Poly1305::new(Key::from_slice(&key[..]))
        .decrypt(&Nonce::default(), stanza.body.as_slice())
        .ok()
        .map(Zeroizing::new)
}

fn wrapping_key(
    shared: &[u8; KEY_SIZE],
    ephemeral_public: &PublicKey,
    recipient: &PublicKey,
) -> PhraseKeyResult<Zeroizing<[u8; KEY_SIZE]>> {
    let mut salt = [0u8; 2 * KEY_SIZE];
    salt[..KEY_SIZE].copy_from_slice(ephemeral_public);
    salt[KEY_SIZE..].copy_from_slice(recipient);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(X25519_LABEL.as_bytes(), &mut okm[..])
        .map_err(|e| PhraseKeyError::KeyDerivation(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

impl Stanza {
    /// Render in the age header form: `-> TAG ARGS…` then the body in
    /// 64-column base64 lines, ending with a shorter (possibly empty) line.
    pub fn to_text(&self) -> String {
        let mut out = String::from("->");
        for part in std::iter::once(&self.tag).chain(&self.args) {
            out.push(' ');
            out.push_str(part);
        }
        out.push('\n');

        let encoded = STANDARD_NO_PAD.encode(&self.body);
        let mut rest = encoded.as_str();
        while rest.len() >= BODY_COLUMNS {
            let (line, tail) = rest.split_at(BODY_COLUMNS);
            out.push_str(line);
            out.push('\n');
            rest = tail;
        }
        out.push_str(rest);
        out.push('\n');
        out
    }

    /// Parse a single stanza in the form produced by [`Stanza::to_text`].
    pub fn parse_text(text: &str) -> PhraseKeyResult<Self> {
        let invalid = |msg: &str| PhraseKeyError::InvalidStanza(msg.to_string());

        let mut lines = text.split('\n');
        let header = lines.next().unwrap_or_default();
        let header = header
            .strip_prefix("-> ")
            .ok_or_else(|| invalid("missing \"-> \" prefix"))?;

        let mut parts = header.split(' ');
        let tag = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("missing stanza type"))?
            .to_string();
        let args = parts
            .map(|arg| {
                if arg.is_empty() {
                    Err(invalid("empty stanza argument"))
                } else {
                    Ok(arg.to_string())
                }
            })
            .collect::<PhraseKeyResult<Vec<_>>>()?;

        let mut encoded = String::new();
        loop {
            let line = lines
                .next()
                .ok_or_else(|| invalid("body is missing its final short line"))?;
            if line.len() > BODY_COLUMNS {
                return Err(invalid("body line longer than 64 columns"));
            }
            encoded.push_str(line);
            if line.len() < BODY_COLUMNS {
                break;
            }
        }
        if lines.any(|line| !line.is_empty()) {
            return Err(invalid("unexpected data after stanza body"));
        }

        let body = STANDARD_NO_PAD
            .decode(&encoded)
            .map_err(|e| PhraseKeyError::InvalidStanza(format!("body is not base64: {e}")))?;

        Ok(Stanza { tag, args, body })
    }
}
