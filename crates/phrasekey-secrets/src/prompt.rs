//! Phrase providers: where a seed phrase comes from when the cache is cold

use phrasekey_core::PhraseKeyResult;
use secrecy::SecretString;
use std::io::{self, BufRead, Write};
use zeroize::Zeroizing;

/// Label shown when asking for the phrase of an existing identity
pub const PHRASE_PROMPT: &str = "Enter your BIP39 seed phrase";

/// Source of seed phrases.
///
/// `Ok(None)` means the user cancelled; callers must not ask again.
pub trait PhraseProvider {
    fn acquire_phrase(&self, label: &str, mask_input: bool)
        -> PhraseKeyResult<Option<SecretString>>;
}

/// Line-based terminal prompt.
///
/// Masked input goes through `rpassword` (reads the controlling terminal);
/// unmasked input is a plain line from stdin. Empty input, EOF and Ctrl-C
/// all count as cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PhraseProvider for TerminalPrompt {
    fn acquire_phrase(
        &self,
        label: &str,
        mask_input: bool,
    ) -> PhraseKeyResult<Option<SecretString>> {
        let read = if mask_input {
            rpassword::prompt_password(format!("{label}: "))
        } else {
            read_visible_line(label)
        };

        match read {
            Ok(line) => Ok(normalize(Zeroizing::new(line))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof
                ) =>
            {
                tracing::debug!("phrase prompt cancelled: {e}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn read_visible_line(label: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{label}: ")?;
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(line)
}

/// Collapse runs of whitespace to single spaces; blank input is `None`.
pub(crate) fn normalize(line: Zeroizing<String>) -> Option<SecretString> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    Some(SecretString::from(words.join(" ")))
}
