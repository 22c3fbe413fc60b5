//! Time-limited cache of derived private keys.
//!
//! Caching is only an optimization: every store failure (missing entry,
//! corrupt payload, no keychain on this machine) reads as a cold cache, and
//! writes are best-effort. A TTL of zero disables the cache entirely.
//!
//! Stores:
//! - `KernelKeyringStore` (Linux): kernel user keyring with a native timeout
//! - [`KeyringStore`]: platform keychain via the `keyring` crate, expiry
//!   embedded in the payload (opt-in; entries persist until read or forgotten)
//! - [`MemoryStore`]: in-process map, gone when the process exits

use anyhow::{Context, Result};
use phrasekey_crypto::{PrivateKey, PublicKey, KEY_SIZE};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// Namespace prefix of cache entry names
pub const FINGERPRINT_PREFIX: &str = "age-plugin-bip39:";

const SERVICE_NAME: &str = "phrasekey";

/// Cache entry name for a public key: prefix plus lowercase hex.
pub fn fingerprint(public: &PublicKey) -> String {
    format!("{FINGERPRINT_PREFIX}{}", hex::encode(public))
}

/// A protected store for short-lived secrets.
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when no live entry exists under `name`.
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Store `value` under `name`, expiring after `ttl`.
    fn put(&self, name: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove `name`; removing a missing entry is not an error.
    fn delete(&self, name: &str) -> Result<()>;
}

/// Best-effort derived-key cache keyed by public-key fingerprint.
pub struct KeyCache {
    store: Option<Box<dyn SecretStore>>,
    ttl: Duration,
}

impl KeyCache {
    pub fn new(store: Box<dyn SecretStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn active_store(&self) -> Option<&dyn SecretStore> {
        if self.ttl.is_zero() {
            return None;
        }
        self.store.as_deref()
    }

    /// Cached private key for `public`, if a valid one exists.
    pub fn get(&self, public: &PublicKey) -> Option<PrivateKey> {
        let store = self.active_store()?;
        let name = fingerprint(public);

        let bytes = match store.get(&name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(entry = %name, "key cache miss");
                return None;
            }
            Err(e) => {
                tracing::debug!(entry = %name, "key cache unavailable: {e:#}");
                return None;
            }
        };

        let Ok(raw) = <[u8; KEY_SIZE]>::try_from(bytes.as_slice()) else {
            tracing::debug!(entry = %name, len = bytes.len(), "ignoring cached key of wrong length");
            return None;
        };
        let private = PrivateKey::from_bytes(raw);
        if private.public_key() != *public {
            tracing::debug!(entry = %name, "ignoring cached key for a different public key");
            return None;
        }

        tracing::debug!(entry = %name, "key cache hit");
        Some(private)
    }

    /// Remember `private` for `public`. Failures are logged and dropped.
    pub fn put(&self, public: &PublicKey, private: &PrivateKey) {
        let Some(store) = self.active_store() else {
            return;
        };
        let name = fingerprint(public);
        match store.put(&name, private.as_bytes(), self.ttl) {
            Ok(()) => tracing::debug!(entry = %name, ttl = ?self.ttl, "cached derived key"),
            Err(e) => tracing::debug!(entry = %name, "could not cache derived key: {e:#}"),
        }
    }

    /// Drop any cached key for `public`. Failures are logged and dropped.
    pub fn forget(&self, public: &PublicKey) {
        let Some(store) = self.store.as_deref() else {
            return;
        };
        let name = fingerprint(public);
        if let Err(e) = store.delete(&name) {
            tracing::debug!(entry = %name, "could not remove cached key: {e:#}");
        }
    }
}

/// Linux kernel user keyring store.
///
/// Each entry is a `user` key whose timeout is set to the TTL, so the kernel
/// destroys it on schedule whether or not it is ever read again. Nothing
/// touches disk.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct KernelKeyringStore;

#[cfg(target_os = "linux")]
impl KernelKeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn ring(&self) -> Result<linux_keyutils::KeyRing> {
        linux_keyutils::KeyRing::from_special_id(linux_keyutils::KeyRingIdentifier::User, false)
            .map_err(|e| anyhow::anyhow!("opening user keyring: {e}"))
    }
}

/// Largest value read back from the kernel keyring.
#[cfg(target_os = "linux")]
const KERNEL_READ_LIMIT: usize = 256;

#[cfg(target_os = "linux")]
fn is_absent(e: &linux_keyutils::KeyError) -> bool {
    use linux_keyutils::KeyError;
    matches!(
        e,
        KeyError::KeyDoesNotExist | KeyError::KeyExpired | KeyError::KeyRevoked
    )
}

#[cfg(target_os = "linux")]
impl SecretStore for KernelKeyringStore {
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let description = name.to_string();
        let key = match self.ring()?.search(&description) {
            Ok(key) => key,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("keyring search for '{name}': {e}")),
        };

        let mut buf = Zeroizing::new([0u8; KERNEL_READ_LIMIT]);
        let len = match key.read(&mut *buf) {
            Ok(len) => len,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("keyring read for '{name}': {e}")),
        };
        if len > KERNEL_READ_LIMIT {
            anyhow::bail!("keyring entry '{name}' is {len} bytes, larger than any cached key");
        }
        Ok(Some(Zeroizing::new(buf[..len].to_vec())))
    }

    fn put(&self, name: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let description = name.to_string();
        let secret = Zeroizing::new(value.to_vec());
        let key = self
            .ring()?
            .add_key(&description, &*secret)
            .map_err(|e| anyhow::anyhow!("keyring add for '{name}': {e}"))?;

        let timeout = usize::try_from(ttl_secs(ttl)).unwrap_or(usize::MAX);
        if let Err(e) = key.set_timeout(timeout) {
            // An entry without a timeout would outlive the TTL.
            let _ = key.invalidate();
            anyhow::bail!("keyring timeout for '{name}': {e}");
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let description = name.to_string();
        match self.ring()?.search(&description) {
            Ok(key) => match key.invalidate() {
                Ok(()) => Ok(()),
                Err(e) if is_absent(&e) => Ok(()),
                Err(e) => Err(anyhow::anyhow!("keyring invalidate for '{name}': {e}")),
            },
            Err(e) if is_absent(&e) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("keyring search for '{name}': {e}")),
        }
    }
}

/// Platform keychain store.
///
/// Keychains have no native expiry, so the payload carries its own deadline
/// (see [`encode_payload`]). An expired payload is deleted when it is next
/// read; until then it stays in the keychain, which is why this store is only
/// used when `[cache] backend = "keyring"` asks for it.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, name)
            .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}"))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let payload = match self.entry(name)?.get_password() {
            Ok(password) => Zeroizing::new(password),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("keychain get for '{name}': {e}")),
        };

        match decode_payload(&payload, now_epoch())? {
            Some(value) => Ok(Some(value)),
            None => {
                self.delete(name)?;
                Ok(None)
            }
        }
    }

    fn put(&self, name: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let payload = encode_payload(now_epoch() + ttl_secs(ttl), value);
        self.entry(name)?
            .set_password(&payload)
            .map_err(|e| anyhow::anyhow!("keychain store for '{name}': {e}"))
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("keychain delete for '{name}': {e}")),
        }
    }
}

/// Keychain payload: `<expires-at unix secs>:<lowercase hex value>`.
pub(crate) fn encode_payload(expires_at: u64, value: &[u8]) -> Zeroizing<String> {
    Zeroizing::new(format!("{expires_at}:{}", hex::encode(value)))
}

/// Parse a keychain payload. `Ok(None)` once `now` has reached the deadline.
pub(crate) fn decode_payload(payload: &str, now: u64) -> Result<Option<Zeroizing<Vec<u8>>>> {
    let (expires_at, value) = payload
        .split_once(':')
        .context("cached payload has no expiry")?;
    let expires_at: u64 = expires_at.parse().context("cached payload expiry")?;
    if now >= expires_at {
        return Ok(None);
    }

    let bytes = hex::decode(value).context("cached payload is not hex")?;
    Ok(Some(Zeroizing::new(bytes)))
}

/// In-process store with `Instant`-based expiry.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Zeroizing<Vec<u8>>, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Zeroizing<Vec<u8>>, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let mut map = self.lock()?;
        let Some((value, expires_at)) = map.get(name) else {
            return Ok(None);
        };
        if Instant::now() < *expires_at {
            return Ok(Some(value.clone()));
        }
        map.remove(name);
        Ok(None)
    }

    fn put(&self, name: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.lock()?
            .insert(name.to_string(), (Zeroizing::new(value.to_vec()), expires_at));
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.lock()?.remove(name);
        Ok(())
    }
}

/// Whole seconds for a persisted TTL; anything below a second rounds up.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use phrasekey_crypto::derive_keypair;
    use std::thread;

    /// A store whose every operation fails.
    struct BrokenStore;

    impl SecretStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            anyhow::bail!("no keychain")
        }
        fn put(&self, _: &str, _: &[u8], _: Duration) -> Result<()> {
            anyhow::bail!("no keychain")
        }
        fn delete(&self, _: &str) -> Result<()> {
            anyhow::bail!("no keychain")
        }
    }

    fn memory_cache(ttl: Duration) -> KeyCache {
        KeyCache::new(Box::new(MemoryStore::new()), ttl)
    }

    #[test]
    fn test_fingerprint_format() {
        let pair = derive_keypair(&[0u8; 32]).unwrap();
        assert_eq!(
            fingerprint(&pair.public),
            "age-plugin-bip39:5bf55c73b82ebe22be80f3430667af570fae2556a6415e6b30d4065300aa947d"
        );
    }

    #[test]
    fn test_put_then_get() {
        let cache = memory_cache(Duration::from_secs(600));
        let pair = derive_keypair(&[1u8; 32]).unwrap();

        cache.put(&pair.public, &pair.private);
        let cached = cache.get(&pair.public).unwrap();
        assert_eq!(cached.as_bytes(), pair.private.as_bytes());
    }

    #[test]
    fn test_miss_is_absent() {
        let cache = memory_cache(Duration::from_secs(600));
        let pair = derive_keypair(&[2u8; 32]).unwrap();
        assert!(cache.get(&pair.public).is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let cache = KeyCache::new(Box::new(SharedStore(store.clone())), Duration::ZERO);
        let pair = derive_keypair(&[3u8; 32]).unwrap();

        cache.put(&pair.public, &pair.private);
        assert!(cache.get(&pair.public).is_none());
        assert!(
            store.get(&fingerprint(&pair.public)).unwrap().is_none(),
            "nothing may be written when caching is disabled"
        );
    }

    #[test]
    fn test_disabled_cache() {
        let cache = KeyCache::disabled();
        let pair = derive_keypair(&[4u8; 32]).unwrap();
        cache.put(&pair.public, &pair.private);
        assert!(cache.get(&pair.public).is_none());
        cache.forget(&pair.public);
    }

    #[test]
    fn test_broken_store_reads_as_cold_cache() {
        let cache = KeyCache::new(Box::new(BrokenStore), Duration::from_secs(600));
        let pair = derive_keypair(&[5u8; 32]).unwrap();

        cache.put(&pair.public, &pair.private);
        assert!(cache.get(&pair.public).is_none());
        cache.forget(&pair.public);
    }

    #[test]
    fn test_wrong_length_payload_ignored() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let cache = KeyCache::new(Box::new(SharedStore(store.clone())), Duration::from_secs(600));
        let pair = derive_keypair(&[6u8; 32]).unwrap();

        store
            .put(&fingerprint(&pair.public), &[7u8; 31], Duration::from_secs(600))
            .unwrap();
        assert!(cache.get(&pair.public).is_none());
    }

    #[test]
    fn test_foreign_key_payload_ignored() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let cache = KeyCache::new(Box::new(SharedStore(store.clone())), Duration::from_secs(600));
        let pair = derive_keypair(&[8u8; 32]).unwrap();
        let other = derive_keypair(&[9u8; 32]).unwrap();

        store
            .put(
                &fingerprint(&pair.public),
                other.private.as_bytes(),
                Duration::from_secs(600),
            )
            .unwrap();
        assert!(cache.get(&pair.public).is_none());
    }

    #[test]
    fn test_forget_removes_entry() {
        let cache = memory_cache(Duration::from_secs(600));
        let pair = derive_keypair(&[10u8; 32]).unwrap();

        cache.put(&pair.public, &pair.private);
        cache.forget(&pair.public);
        assert!(cache.get(&pair.public).is_none());
    }

    #[test]
    fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store.put("k", b"v", Duration::from_millis(50)).unwrap();
        assert!(store.get("k").unwrap().is_some());
        thread::sleep(Duration::from_millis(80));
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_payload_round_trip() {
        let payload = encode_payload(1_000, &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(payload.as_str(), "1000:deadbeef");

        let value = decode_payload(&payload, 999).unwrap().unwrap();
        assert_eq!(value.as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_expired_payload_reads_as_absent() {
        let payload = encode_payload(1_000, &[7u8; 32]);
        assert!(decode_payload(&payload, 1_000).unwrap().is_none());
        assert!(decode_payload(&payload, 5_000).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        for bad in ["", "deadbeef", "soon:deadbeef", "-5:deadbeef", "4000000000:not-hex", "4000000000:abc"] {
            assert!(decode_payload(bad, 0).is_err(), "{bad:?} should not decode");
        }
    }

    #[test]
    fn test_ttl_secs_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_millis(1)), 1);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_secs(600)), 600);
    }

    /// Lets a test keep a handle on the store it hands to the cache.
    struct SharedStore(std::sync::Arc<MemoryStore>);

    impl SecretStore for SharedStore {
        fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            self.0.get(name)
        }
        fn put(&self, name: &str, value: &[u8], ttl: Duration) -> Result<()> {
            self.0.put(name, value, ttl)
        }
        fn delete(&self, name: &str) -> Result<()> {
            self.0.delete(name)
        }
    }
}
