//! phrasekey: age encryption with identities derived from BIP-39 seed phrases
//!
//! Commands:
//!   keygen [--stdin] [-o FILE]          - create an identity from a new or existing phrase
//!   recipient -i FILE                   - print the age1… recipient of each identity
//!   encrypt (-r age1… | -i FILE)+ [-a]  - encrypt an age file
//!   decrypt -i FILE                     - decrypt an age file (cache, then phrase prompt)
//!   forget -i FILE                      - drop cached keys for the identities in FILE

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use phrasekey_core::config::default_config_path;
use phrasekey_core::PhraseKeyConfig;
use phrasekey_crypto::{derive_from_mnemonic, generate_mnemonic};
use phrasekey_secrets::{
    cache_from_config, read_identity_file, render_identity_file, store_from_config, KeyCache,
    PhraseIdentity, PhraseProvider, PhraseRecipient, TerminalPrompt, Unlocker,
};
use secrecy::{ExposeSecret, SecretString};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "phrasekey",
    version,
    about = "age encryption with BIP-39 seed phrase identities",
    long_about = "phrasekey: derive X25519 age identities from BIP-39 seed phrases and use them \
                  to encrypt and decrypt age files"
)]
struct Cli {
    /// Path to config.toml (default: $XDG_CONFIG_HOME/phrasekey/config.toml)
    #[arg(long, short = 'c', env = "PHRASEKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "PHRASEKEY_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "PHRASEKEY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an identity from a new 24-word phrase (or an existing one)
    ///
    /// Without --stdin a fresh phrase is shown on stderr and must be typed
    /// back to confirm it was written down. The identity file itself holds
    /// only the public key.
    Keygen {
        /// Read an existing phrase from stdin instead of generating one
        #[arg(long)]
        stdin: bool,
        /// Write the identity to FILE instead of stdout (must not exist)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the recipient for each identity in an identity file
    Recipient {
        /// Identity file
        #[arg(long, short = 'i')]
        identity: PathBuf,
    },

    /// Encrypt to phrase recipients (or identities used as recipients)
    Encrypt {
        /// Recipient (age1… or AGE-PLUGIN-BIP39-1…); may be repeated
        #[arg(long, short = 'r')]
        recipient: Vec<String>,
        /// Identity file whose identities become recipients; may be repeated
        #[arg(long, short = 'i')]
        identity: Vec<PathBuf>,
        /// ASCII-armor the output
        #[arg(long, short = 'a')]
        armor: bool,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Input file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Decrypt with phrase identities
    Decrypt {
        /// Identity file; may be repeated
        #[arg(long, short = 'i', required = true)]
        identity: Vec<PathBuf>,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Input file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Remove cached private keys for the identities in an identity file
    Forget {
        /// Identity file
        #[arg(long, short = 'i')]
        identity: PathBuf,
    },
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = PhraseKeyConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "phrasekey starting"
    );

    match cli.command {
        Commands::Keygen { stdin, output } => cmd_keygen(stdin, output.as_deref()),
        Commands::Recipient { identity } => cmd_recipient(&identity),
        Commands::Encrypt {
            recipient,
            identity,
            armor,
            output,
            input,
        } => cmd_encrypt(
            &recipient,
            &identity,
            armor,
            input.as_deref(),
            output.as_deref(),
        ),
        Commands::Decrypt {
            identity,
            output,
            input,
        } => cmd_decrypt(&config, &identity, input.as_deref(), output.as_deref()),
        Commands::Forget { identity } => cmd_forget(&config, &identity),
    }
}

/// Logs go to stderr; stdout carries identities and plaintext.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── I/O helpers ───────────────────────────────────────────────────────────────

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(p) if p != Path::new("-") => {
            let file = File::open(p).with_context(|| format!("opening input: {}", p.display()))?;
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(io::stdin().lock())),
    }
}

/// Command output. A file target is staged next to the destination and only
/// renamed into place by [`Output::commit`], so a failed run leaves any
/// existing file untouched.
enum Output {
    Stdout(io::StdoutLock<'static>),
    File {
        staged: NamedTempFile,
        target: PathBuf,
    },
}

impl Output {
    fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p != Path::new("-") => {
                let dir = match p.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    _ => Path::new("."),
                };
                let staged = NamedTempFile::new_in(dir)
                    .with_context(|| format!("staging output in {}", dir.display()))?;
                Ok(Self::File {
                    staged,
                    target: p.to_path_buf(),
                })
            }
            _ => Ok(Self::Stdout(io::stdout().lock())),
        }
    }

    fn commit(mut self) -> Result<()> {
        self.flush().context("flushing output")?;
        if let Self::File { staged, target } = self {
            staged
                .persist(&target)
                .with_context(|| format!("writing output: {}", target.display()))?;
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::File { staged, .. } => staged.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::File { staged, .. } => staged.flush(),
        }
    }
}

fn load_identities(paths: &[PathBuf]) -> Result<Vec<PhraseIdentity>> {
    let mut identities = Vec::new();
    for path in paths {
        identities.extend(read_identity_file(path)?);
    }
    Ok(identities)
}

fn same_phrase(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

// ── `phrasekey keygen` ────────────────────────────────────────────────────────

fn cmd_keygen(from_stdin: bool, output: Option<&Path>) -> Result<()> {
    let phrase = if from_stdin || !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading seed phrase from stdin")?;
        SecretString::from(buf.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        let phrase = generate_mnemonic()?;
        eprintln!("Your new seed phrase (write it down; it is never stored):\n");
        eprintln!("    {}\n", phrase.expose_secret());

        let confirmation = TerminalPrompt
            .acquire_phrase("Re-enter the seed phrase to confirm", true)?
            .context("seed phrase confirmation cancelled")?;
        if !same_phrase(phrase.expose_secret(), confirmation.expose_secret()) {
            anyhow::bail!("confirmation does not match the generated seed phrase");
        }
        phrase
    };

    let pair = derive_from_mnemonic(&phrase)?;
    let identity = PhraseIdentity::from_public_key(pair.public);
    let created = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let rendered = render_identity_file(&identity, &created);

    match output {
        Some(path) => {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .with_context(|| format!("creating identity file: {}", path.display()))?;
            file.write_all(rendered.as_bytes())
                .with_context(|| format!("writing identity file: {}", path.display()))?;
            eprintln!("Public key: {}", identity.to_recipient());
        }
        None => print!("{rendered}"),
    }

    tracing::info!(recipient = %identity.to_recipient(), "generated identity");
    Ok(())
}

// ── `phrasekey recipient` ─────────────────────────────────────────────────────

fn cmd_recipient(identity_file: &Path) -> Result<()> {
    for identity in read_identity_file(identity_file)? {
        println!("{}", identity.to_recipient());
    }
    Ok(())
}

// ── `phrasekey encrypt` ───────────────────────────────────────────────────────

fn cmd_encrypt(
    recipient_args: &[String],
    identity_files: &[PathBuf],
    armor: bool,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut recipients = recipient_args
        .iter()
        .map(|r| {
            r.parse::<PhraseRecipient>()
                .with_context(|| format!("parsing recipient {r:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    recipients.extend(
        load_identities(identity_files)?
            .iter()
            .map(PhraseIdentity::to_recipient),
    );
    if recipients.is_empty() {
        anyhow::bail!("no recipients: pass -r RECIPIENT or -i IDENTITY_FILE");
    }

    if !armor && output.is_none() && io::stdout().is_terminal() {
        anyhow::bail!("refusing to write binary output to a terminal; use -a or -o");
    }

    let reader = open_input(input)?;
    let writer = Output::open(output)?;
    phrasekey_secrets::encrypt(&recipients, reader, writer, armor)?.commit()?;

    tracing::debug!(recipients = recipients.len(), armor, "encrypted");
    Ok(())
}

// ── `phrasekey decrypt` ───────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &PhraseKeyConfig,
    identity_files: &[PathBuf],
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let identities = load_identities(identity_files)?;
    let unlocker = Unlocker::new(cache_from_config(config), Box::new(TerminalPrompt));
    decrypt_to(&identities, &unlocker, input, output)
}

fn decrypt_to(
    identities: &[PhraseIdentity],
    unlocker: &Unlocker,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let reader = BufReader::new(open_input(input)?);
    let writer = Output::open(output)?;
    phrasekey_secrets::decrypt(identities, unlocker, reader, writer)?.commit()
}

// ── `phrasekey forget` ────────────────────────────────────────────────────────

fn cmd_forget(config: &PhraseKeyConfig, identity_file: &Path) -> Result<()> {
    let Some(store) = store_from_config(config) else {
        eprintln!("key cache is disabled; nothing to forget");
        return Ok(());
    };
    let cache = KeyCache::new(store, Duration::ZERO);

    for identity in read_identity_file(identity_file)? {
        cache.forget(identity.public_key());
        eprintln!("forgot cached key for {}", identity.to_recipient());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phrasekey_core::PhraseKeyResult;
    use phrasekey_secrets::MemoryStore;

    const ZERO_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
         abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
         abandon abandon abandon abandon abandon art";
    const ZERO_IDENTITY: &str =
        "AGE-PLUGIN-BIP39-1T064CUAC96LZ905Q7DPSVEA02U86UF2K5EQ4U6ES6SR9XQ92J37SD7ERC9";

    /// Answers every prompt with `phrase`, or cancels when it is `None`.
    struct Answer(Option<&'static str>);

    impl PhraseProvider for Answer {
        fn acquire_phrase(&self, _: &str, _: bool) -> PhraseKeyResult<Option<SecretString>> {
            Ok(self.0.map(SecretString::from))
        }
    }

    fn unlocker(answer: Option<&'static str>) -> Unlocker {
        let cache = KeyCache::new(Box::new(MemoryStore::new()), Duration::from_secs(60));
        Unlocker::new(cache, Box::new(Answer(answer)))
    }

    fn encrypted_file(dir: &Path) -> PathBuf {
        let recipient: PhraseRecipient = ZERO_IDENTITY.parse().unwrap();
        let ciphertext =
            phrasekey_secrets::encrypt(&[recipient], &b"attack at dawn\n"[..], Vec::new(), false)
                .unwrap();
        let path = dir.join("secret.age");
        std::fs::write(&path, ciphertext).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_encrypt() {
        let cli = Cli::try_parse_from([
            "phrasekey",
            "encrypt",
            "-r",
            "age1t064cuac96lz905q7dpsvea02u86uf2k5eq4u6es6sr9xq92j37slzjpnt",
            "-a",
            "secret.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Encrypt {
                recipient,
                armor,
                input,
                ..
            } => {
                assert_eq!(recipient.len(), 1);
                assert!(armor);
                assert_eq!(input, Some(PathBuf::from("secret.txt")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_decrypt_requires_identity() {
        assert!(Cli::try_parse_from(["phrasekey", "decrypt", "file.age"]).is_err());
    }

    #[test]
    fn test_same_phrase_ignores_spacing() {
        assert!(same_phrase("abandon  abandon\nart", " abandon abandon art "));
        assert!(!same_phrase("abandon abandon art", "abandon art"));
    }

    #[test]
    fn test_load_identities_from_several_files() {
        let dir = tempfile::tempdir().unwrap();
        let identity = "AGE-PLUGIN-BIP39-1T064CUAC96LZ905Q7DPSVEA02U86UF2K5EQ4U6ES6SR9XQ92J37SD7ERC9";
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, format!("# first\n{identity}\n")).unwrap();
        std::fs::write(&b, format!("{identity}\n")).unwrap();

        let identities = load_identities(&[a, b]).unwrap();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0], identities[1]);
    }

    #[test]
    fn test_failed_decrypt_keeps_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = encrypted_file(dir.path());
        let target = dir.path().join("plain.txt");
        std::fs::write(&target, "keep me").unwrap();

        let identities = [ZERO_IDENTITY.parse::<PhraseIdentity>().unwrap()];
        assert!(decrypt_to(&identities, &unlocker(None), Some(&input), Some(&target)).is_err());

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep me");
        // The staged file is cleaned up too.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_successful_decrypt_replaces_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = encrypted_file(dir.path());
        let target = dir.path().join("plain.txt");
        std::fs::write(&target, "stale").unwrap();

        let identities = [ZERO_IDENTITY.parse::<PhraseIdentity>().unwrap()];
        decrypt_to(
            &identities,
            &unlocker(Some(ZERO_PHRASE)),
            Some(&input),
            Some(&target),
        )
        .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "attack at dawn\n");
    }
}
