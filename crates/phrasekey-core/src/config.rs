use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration::parse_duration;
use crate::error::{PhraseKeyError, PhraseKeyResult};

/// Environment variable that overrides `[cache] ttl`.
pub const CACHE_TTL_ENV: &str = "AGE_PLUGIN_BIP39_CACHE";

/// Cache lifetime used when the setting is unset or unparseable.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseKeyConfig {
    pub cache: CacheConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Derived-key cache lifetime ("10m", "1h", "0" disables)
    pub ttl: Option<String>,
    /// Where cached keys live
    pub backend: CacheBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Linux kernel user keyring; the kernel destroys entries when the TTL ends
    Kernel,
    /// Platform keychain (macOS Keychain, Credential Manager). Entries persist
    /// until they are read after expiry or removed with `forget`.
    Keyring,
    /// In-process only; nothing outlives the command
    Memory,
    /// Never cache
    #[serde(rename = "none")]
    Disabled,
}

impl CacheBackend {
    /// The kernel keyring where it exists, memory elsewhere. A durable
    /// keychain is never chosen implicitly.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            CacheBackend::Kernel
        } else {
            CacheBackend::Memory
        }
    }
}

impl Default for CacheBackend {
    fn default() -> Self {
        Self::platform_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            backend: CacheBackend::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl CacheConfig {
    /// Effective TTL: the environment override wins over the config file.
    pub fn effective_ttl(&self) -> Duration {
        let env_value = std::env::var(CACHE_TTL_ENV).ok();
        self.effective_ttl_with(env_value.as_deref())
    }

    /// Effective TTL given the raw value of `AGE_PLUGIN_BIP39_CACHE`.
    pub fn effective_ttl_with(&self, env_value: Option<&str>) -> Duration {
        if self.backend == CacheBackend::Disabled {
            return Duration::ZERO;
        }
        resolve_cache_ttl(env_value.or(self.ttl.as_deref()))
    }
}

/// Apply the cache TTL policy to a raw setting.
///
/// Unset or empty → 10 minutes; any zero duration → disabled; a valid
/// duration → itself; anything else → 10 minutes. Never an error.
pub fn resolve_cache_ttl(raw: Option<&str>) -> Duration {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_CACHE_TTL;
    };
    match parse_duration(value) {
        Some(ttl) => ttl,
        None => {
            tracing::warn!(value, "unparseable cache TTL, using default of 10m");
            DEFAULT_CACHE_TTL
        }
    }
}

impl PhraseKeyConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> PhraseKeyResult<Self> {
        if !path.exists() {
            tracing::debug!("config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| PhraseKeyError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Default config file location: `$XDG_CONFIG_HOME/phrasekey/config.toml`
pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        })
        .join("phrasekey")
        .join("config.toml")
}
