//! age integration (age 0.11 API)
//!
//! [`PhraseRecipient`] is an `age::Recipient` and a bound [`UnlockingIdentity`]
//! is an `age::Identity`, so whole age files can be written and read
//! directly, without going through the plugin protocol.

use crate::identity::{PhraseIdentity, PhraseRecipient, Unlocker, UnlockingIdentity};
use age::armor::{ArmoredReader, ArmoredWriter, Format};
use age::{DecryptError, EncryptError};
use age_core::format::{FileKey, Stanza as AgeStanza, FILE_KEY_BYTES};
use anyhow::{Context, Result};
use phrasekey_core::PhraseKeyError;
use phrasekey_crypto::Stanza;
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::io::{self, BufRead, Read, Write};

impl age::Recipient for PhraseRecipient {
    fn wrap_file_key(
        &self,
        file_key: &FileKey,
    ) -> Result<(Vec<AgeStanza>, HashSet<String>), EncryptError> {
        let stanzas = self
            .wrap(&file_key.expose_secret()[..])
            .map_err(|e| EncryptError::Io(io::Error::other(e)))?;
        Ok((stanzas.into_iter().map(to_age_stanza).collect(), HashSet::new()))
    }
}

impl age::Identity for UnlockingIdentity<'_> {
    fn unwrap_stanza(&self, stanza: &AgeStanza) -> Option<Result<FileKey, DecryptError>> {
        self.unwrap_stanzas(std::slice::from_ref(stanza))
    }

    /// One unlock per header: the phrase is requested at most once no matter
    /// how many stanzas the file carries.
    fn unwrap_stanzas(&self, stanzas: &[AgeStanza]) -> Option<Result<FileKey, DecryptError>> {
        let stanzas: Vec<Stanza> = stanzas.iter().map(from_age_stanza).collect();
        match self.unlocker.unwrap(self.identity, &stanzas) {
            Ok(file_key) => Some(to_file_key(&file_key)),
            Err(PhraseKeyError::IncorrectIdentity) => None,
            Err(e) => Some(Err(DecryptError::Io(io::Error::other(e)))),
        }
    }
}

fn to_age_stanza(stanza: Stanza) -> AgeStanza {
    AgeStanza {
        tag: stanza.tag,
        args: stanza.args,
        body: stanza.body,
    }
}

fn from_age_stanza(stanza: &AgeStanza) -> Stanza {
    Stanza {
        tag: stanza.tag.clone(),
        args: stanza.args.clone(),
        body: stanza.body.clone(),
    }
}

fn to_file_key(bytes: &[u8]) -> Result<FileKey, DecryptError> {
    let key: [u8; FILE_KEY_BYTES] = bytes
        .try_into()
        .map_err(|_| DecryptError::DecryptionFailed)?;
    Ok(FileKey::new(Box::new(key)))
}

/// Encrypt `input` to `recipients`, returning the inner writer once the
/// age file is complete.
pub fn encrypt<R: Read, W: Write>(
    recipients: &[PhraseRecipient],
    mut input: R,
    output: W,
    armor: bool,
) -> Result<W> {
    if recipients.is_empty() {
        anyhow::bail!("at least one recipient is required");
    }

    let encryptor =
        age::Encryptor::with_recipients(recipients.iter().map(|r| r as &dyn age::Recipient))
            .context("creating age encryptor")?;

    let format = if armor {
        Format::AsciiArmor
    } else {
        Format::Binary
    };
    let armored = ArmoredWriter::wrap_output(output, format).context("creating armor writer")?;
    let mut writer = encryptor
        .wrap_output(armored)
        .context("writing age header")?;

    io::copy(&mut input, &mut writer).context("encrypting payload")?;
    let armored = writer.finish().context("finishing age stream")?;
    armored.finish().context("finishing armor")
}

/// Decrypt an age file (armored or binary) with phrase identities.
pub fn decrypt<R: BufRead, W: Write>(
    identities: &[PhraseIdentity],
    unlocker: &Unlocker,
    input: R,
    mut output: W,
) -> Result<W> {
    if identities.is_empty() {
        anyhow::bail!("at least one identity is required");
    }

    let decryptor =
        age::Decryptor::new(ArmoredReader::new(input)).context("reading age header")?;

    if decryptor.is_scrypt() {
        anyhow::bail!("passphrase-encrypted age files are not supported");
    }

    let bound: Vec<UnlockingIdentity<'_>> =
        identities.iter().map(|i| unlocker.bind(i)).collect();
    let mut reader = decryptor
        .decrypt(bound.iter().map(|i| i as &dyn age::Identity))
        .context("decrypting age file")?;

    io::copy(&mut reader, &mut output).context("reading decrypted payload")?;
    Ok(output)
}
