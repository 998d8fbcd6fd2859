//! Size limits for derived keys
//!
//! Extraction output is bounded so a single misbehaving definition cannot
//! blow up an index. Violations are reported as extraction failures for the
//! offending definition only.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};

/// Size limits applied to extracted key sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum encoded size of one derived key in bytes (default: 4096)
    pub max_key_bytes: usize,

    /// Maximum number of derived keys one document may produce (default: 10,000)
    pub max_keys_per_document: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: 4096,
            max_keys_per_document: 10_000,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_key_bytes: 64,
            max_keys_per_document: 8,
        }
    }

    /// Validate the encoded size of one key
    pub fn validate_key_len(&self, len: usize) -> Result<(), ExtractError> {
        if len > self.max_key_bytes {
            return Err(ExtractError::KeyTooLarge {
                actual: len,
                max: self.max_key_bytes,
            });
        }
        Ok(())
    }

    /// Validate the number of keys one document produced
    pub fn validate_key_count(&self, count: usize) -> Result<(), ExtractError> {
        if count > self.max_keys_per_document {
            return Err(ExtractError::TooManyKeys {
                actual: count,
                max: self.max_keys_per_document,
            });
        }
        Ok(())
    }
}
