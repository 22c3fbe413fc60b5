//! phrasekey-secrets: phrase identities, age integration, and the derived-key cache
//!
//! Unlock chain for an identity (stops at the first step that yields a key):
//!   1. [`KeyCache`] entry for the identity's fingerprint (kernel keyring,
//!      keychain or memory)
//!   2. [`PhraseProvider`] asks for the seed phrase, which is validated,
//!      derived, checked against the identity, then cached

pub mod age;
pub mod cache;
pub mod identity;
pub mod prompt;

pub use crate::age::{decrypt, encrypt};
#[cfg(target_os = "linux")]
pub use cache::KernelKeyringStore;
pub use cache::{fingerprint, KeyCache, KeyringStore, MemoryStore, SecretStore};
pub use identity::{
    parse_identity_file, read_identity_file, render_identity_file, PhraseIdentity,
    PhraseRecipient, Unlocker, UnlockingIdentity,
};
pub use prompt::{PhraseProvider, TerminalPrompt, PHRASE_PROMPT};

use phrasekey_core::{CacheBackend, PhraseKeyConfig};
use std::time::Duration;

/// The secret store behind `[cache] backend`, if any.
pub fn store_from_config(config: &PhraseKeyConfig) -> Option<Box<dyn SecretStore>> {
    match config.cache.backend {
        CacheBackend::Kernel => kernel_store(),
        CacheBackend::Keyring => Some(Box::new(KeyringStore::new())),
        CacheBackend::Memory => Some(Box::new(MemoryStore::new())),
        CacheBackend::Disabled => None,
    }
}

#[cfg(target_os = "linux")]
fn kernel_store() -> Option<Box<dyn SecretStore>> {
    Some(Box::new(KernelKeyringStore::new()))
}

#[cfg(not(target_os = "linux"))]
fn kernel_store() -> Option<Box<dyn SecretStore>> {
    tracing::warn!("kernel keyring is only available on Linux; key cache disabled");
    None
}

/// Build the key cache selected by `config`.
pub fn cache_from_config(config: &PhraseKeyConfig) -> KeyCache {
    build_cache(store_from_config(config), config.cache.effective_ttl())
}

fn build_cache(store: Option<Box<dyn SecretStore>>, ttl: Duration) -> KeyCache {
    match store {
        Some(store) if !ttl.is_zero() => KeyCache::new(store, ttl),
        _ => {
            tracing::debug!("key cache disabled");
            KeyCache::disabled()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phrasekey_core::config::CacheConfig;

    #[test]
    fn test_disabled_backend_has_zero_ttl() {
        let config = PhraseKeyConfig {
            cache: CacheConfig {
                ttl: Some("10m".into()),
                backend: CacheBackend::Disabled,
            },
            ..Default::default()
        };
        assert!(cache_from_config(&config).ttl().is_zero());
    }

    #[test]
    fn test_store_keeps_configured_ttl() {
        let cache = build_cache(Some(Box::new(MemoryStore::new())), Duration::from_secs(90));
        assert_eq!(cache.ttl(), Duration::from_secs(90));
    }

    #[test]
    fn test_zero_ttl_or_missing_store_disables_cache() {
        assert!(build_cache(Some(Box::new(MemoryStore::new())), Duration::ZERO)
            .ttl()
            .is_zero());
        assert!(build_cache(None, Duration::from_secs(90)).ttl().is_zero());
    }

    fn config_with(backend: CacheBackend) -> PhraseKeyConfig {
        PhraseKeyConfig {
            cache: CacheConfig {
                ttl: None,
                backend,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_backend_selection() {
        assert!(store_from_config(&config_with(CacheBackend::Memory)).is_some());
        assert!(store_from_config(&config_with(CacheBackend::Disabled)).is_none());
        assert_eq!(
            store_from_config(&config_with(CacheBackend::Kernel)).is_some(),
            cfg!(target_os = "linux")
        );
    }
}
