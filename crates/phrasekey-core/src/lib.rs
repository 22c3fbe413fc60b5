pub mod config;
pub mod duration;
pub mod error;

pub use config::{CacheBackend, PhraseKeyConfig};
pub use error::{PhraseKeyError, PhraseKeyResult};
