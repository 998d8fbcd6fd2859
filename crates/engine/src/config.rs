//! Engine configuration via `stratadex.toml`
//!
//! All settings have defaults, so an empty file (or no file) is valid. To
//! change settings, edit the file and rebuild the engine from it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::extract::DEFAULT_EXTRACTION_THREADS;
use std::time::Duration;
use stratadex_core::{Error, Limits, Result};

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "stratadex.toml";

fn default_max_extraction_threads() -> usize {
    DEFAULT_EXTRACTION_THREADS
}

fn default_lock_stripes() -> usize {
    64
}

fn default_scan_batch_size() -> usize {
    256
}

fn default_max_key_bytes() -> usize {
    4096
}

fn default_max_keys_per_document() -> usize {
    10_000
}

/// Engine configuration loaded from `stratadex.toml`.
///
/// # Example
///
/// ```toml
/// # Abandon an extraction after this many milliseconds (unset = run inline)
/// extraction_timeout_ms = 50
/// max_extraction_threads = 64
/// lock_stripes = 64
/// scan_batch_size = 256
/// backfill_on_register = false
/// max_key_bytes = 4096
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-extraction timeout in milliseconds. When unset, extraction runs
    /// on the calling thread without a deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_timeout_ms: Option<u64>,
    /// Cap on timed extraction threads alive at once. A thread whose
    /// extraction timed out stays alive until the extractor returns and
    /// keeps its slot; calls past the cap fail as `Overloaded`.
    #[serde(default = "default_max_extraction_threads")]
    pub max_extraction_threads: usize,
    /// Number of per-document lock stripes (rounded up to a power of two).
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
    /// Entries a cursor fetches per read-lock acquisition.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
    /// Backfill choice used by the `*_default` registration helpers.
    #[serde(default)]
    pub backfill_on_register: bool,
    /// Largest encoded derived key accepted, in bytes.
    #[serde(default = "default_max_key_bytes")]
    pub max_key_bytes: usize,
    /// Most derived keys one document may produce for one definition.
    #[serde(default = "default_max_keys_per_document")]
    pub max_keys_per_document: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extraction_timeout_ms: None,
            max_extraction_threads: default_max_extraction_threads(),
            lock_stripes: default_lock_stripes(),
            scan_batch_size: default_scan_batch_size(),
            backfill_on_register: false,
            max_key_bytes: default_max_key_bytes(),
            max_keys_per_document: default_max_keys_per_document(),
        }
    }
}

impl EngineConfig {
    /// Set the extraction timeout.
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the cap on timed extraction threads.
    pub fn with_max_extraction_threads(mut self, threads: usize) -> Self {
        self.max_extraction_threads = threads;
        self
    }

    /// Set the cursor batch size.
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Set the number of lock stripes.
    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes;
        self
    }

    /// Extraction timeout as a `Duration`.
    pub fn extraction_timeout(&self) -> Option<Duration> {
        self.extraction_timeout_ms.map(Duration::from_millis)
    }

    /// Key limits derived from this config.
    pub fn limits(&self) -> Limits {
        Limits {
            max_key_bytes: self.max_key_bytes,
            max_keys_per_document: self.max_keys_per_document,
        }
    }

    /// Check that the values are usable.
    ///
    /// # Errors
    ///
    /// Returns `Config` for zero stripes, threads, batch size, or key limits.
    pub fn validate(&self) -> Result<()> {
        if self.lock_stripes == 0 {
            return Err(Error::Config("lock_stripes must be at least 1".into()));
        }
        if self.max_extraction_threads == 0 {
            return Err(Error::Config("max_extraction_threads must be at least 1".into()));
        }
        if self.scan_batch_size == 0 {
            return Err(Error::Config("scan_batch_size must be at least 1".into()));
        }
        if self.max_key_bytes == 0 || self.max_keys_per_document == 0 {
            return Err(Error::Config("key limits must be at least 1".into()));
        }
        if self.extraction_timeout_ms == Some(0) {
            return Err(Error::Config(
                "extraction_timeout_ms must be positive; omit it to disable".into(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Stratadex index engine configuration
#
# Abandon a single extraction after this many milliseconds.
# Unset (default) runs extraction inline on the writer's thread.
# extraction_timeout_ms = 50

# Timed extractions run on helper threads. One that times out keeps its
# thread until the extractor returns; past this many live threads new
# extractions fail instead of spawning (default: 64)
max_extraction_threads = 64

# Per-document lock stripes; mutations of documents on different stripes
# run in parallel (default: 64, rounded up to a power of two)
lock_stripes = 64

# Entries a query cursor reads per lock acquisition (default: 256)
scan_batch_size = 256

# Whether the *_default registration helpers backfill from existing
# documents (default: false)
backfill_on_register = false

# Largest encoded derived key in bytes (default: 4096)
max_key_bytes = 4096

# Most derived keys per document per definition (default: 10000)
max_keys_per_document = 10000
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
