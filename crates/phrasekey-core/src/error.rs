use thiserror::Error;

pub type PhraseKeyResult<T> = Result<T, PhraseKeyError>;

#[derive(Debug, Error)]
pub enum PhraseKeyError {
    /// Unknown words or a bad BIP-39 checksum.
    #[error("invalid BIP39 mnemonic")]
    InvalidMnemonic,

    /// The phrase is valid but derives a different public key.
    #[error("seed phrase does not match this identity")]
    MnemonicMismatch,

    /// No stanza could be unwrapped with this identity.
    #[error("incorrect identity: no matching X25519 stanza")]
    IncorrectIdentity,

    #[error("system randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("X25519 key agreement produced a non-contributory shared secret")]
    EcdhFailure,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("seed phrase entry cancelled")]
    UserCancelled,

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid stanza: {0}")]
    InvalidStanza(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhraseKeyError {
    /// Whether asking the user for the phrase again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PhraseKeyError::InvalidMnemonic | PhraseKeyError::MnemonicMismatch
        )
    }
}
