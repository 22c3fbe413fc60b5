//! Bech32 text forms of identities and recipients
//!
//! ```text
//! recipient: age1<bech32(public key)>                      (native age X25519)
//! identity:  AGE-PLUGIN-BIP39-1<bech32(public key)>        (age plugin identity)
//! ```
//!
//! Both carry only the 32-byte public key; the identity string tells age
//! which plugin owns it, the private key always comes from the phrase.

use bech32::{FromBase32, ToBase32, Variant};
use phrasekey_core::{PhraseKeyError, PhraseKeyResult};

use crate::{PublicKey, KEY_SIZE};

/// Human-readable part of an age X25519 recipient
pub const RECIPIENT_HRP: &str = "age";

/// Human-readable part of a bip39 plugin identity
pub const IDENTITY_HRP: &str = "age-plugin-bip39-";

/// Encode a public key as an `age1…` recipient.
pub fn encode_recipient(public: &PublicKey) -> PhraseKeyResult<String> {
    encode(RECIPIENT_HRP, public)
}

/// Encode a public key as an `AGE-PLUGIN-BIP39-1…` identity.
pub fn encode_identity(public: &PublicKey) -> PhraseKeyResult<String> {
    Ok(encode(IDENTITY_HRP, public)?.to_ascii_uppercase())
}

/// Decode an `age1…` recipient into its public key.
pub fn decode_recipient(s: &str) -> PhraseKeyResult<PublicKey> {
    decode(RECIPIENT_HRP, s).map_err(PhraseKeyError::InvalidRecipient)
}

/// Decode an `AGE-PLUGIN-BIP39-1…` identity into its public key.
pub fn decode_identity(s: &str) -> PhraseKeyResult<PublicKey> {
    decode(IDENTITY_HRP, s).map_err(PhraseKeyError::InvalidIdentity)
}

fn encode(hrp: &str, public: &PublicKey) -> PhraseKeyResult<String> {
    bech32::encode(hrp, public.to_base32(), Variant::Bech32)
        .map_err(|e| anyhow::anyhow!("bech32 encoding with prefix {hrp:?} failed: {e}").into())
}

fn decode(expected_hrp: &str, s: &str) -> Result<PublicKey, String> {
    let (hrp, data, variant) = bech32::decode(s.trim()).map_err(|e| format!("{e}"))?;
    if variant != Variant::Bech32 {
        return Err("expected bech32, found bech32m".into());
    }
    if hrp != expected_hrp {
        return Err(format!("expected prefix {expected_hrp:?}, found {hrp:?}"));
    }
    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| format!("{e}"))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| format!("expected {KEY_SIZE}-byte key, found {len} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::derive_keypair;

    const ZERO_RECIPIENT: &str = "age1t064cuac96lz905q7dpsvea02u86uf2k5eq4u6es6sr9xq92j37slzjpnt";
    const ZERO_IDENTITY: &str =
        "AGE-PLUGIN-BIP39-1T064CUAC96LZ905Q7DPSVEA02U86UF2K5EQ4U6ES6SR9XQ92J37SD7ERC9";

    #[test]
    fn test_known_answer_encodings() {
        let pair = derive_keypair(&[0u8; 32]).unwrap();
        assert_eq!(encode_recipient(&pair.public).unwrap(), ZERO_RECIPIENT);
        assert_eq!(encode_identity(&pair.public).unwrap(), ZERO_IDENTITY);
    }

    #[test]
    fn test_decode_known_answers() {
        let pair = derive_keypair(&[0u8; 32]).unwrap();
        assert_eq!(decode_recipient(ZERO_RECIPIENT).unwrap(), pair.public);
        assert_eq!(decode_identity(ZERO_IDENTITY).unwrap(), pair.public);
        assert_eq!(
            decode_identity(&ZERO_IDENTITY.to_ascii_lowercase()).unwrap(),
            pair.public
        );
    }

    #[test]
    fn test_prefixes_are_not_interchangeable() {
        assert!(matches!(
            decode_identity(ZERO_RECIPIENT),
            Err(PhraseKeyError::InvalidIdentity(_))
        ));
        assert!(matches!(
            decode_recipient(ZERO_IDENTITY),
            Err(PhraseKeyError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut corrupted = ZERO_RECIPIENT.to_string();
        corrupted.pop();
        corrupted.push('q');
        assert!(decode_recipient(&corrupted).is_err());
    }

    #[test]
    fn test_mixed_case_rejected() {
        let mixed = format!("AGE-PLUGIN-BIP39-1{}", &ZERO_IDENTITY[18..].to_ascii_lowercase());
        assert!(decode_identity(&mixed).is_err());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let short = bech32::encode(RECIPIENT_HRP, [7u8; 31].to_base32(), Variant::Bech32).unwrap();
        assert!(matches!(
            decode_recipient(&short),
            Err(PhraseKeyError::InvalidRecipient(_))
        ));
    }
}
