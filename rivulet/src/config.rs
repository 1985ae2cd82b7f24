//! Store configuration.
//!
//! A [`StoreConfig`] fixes the paging geometry of a store at construction
//! time: how many samples make up a slot (the unit of residency and
//! eviction), how many make up a block (the unit of min/max summarization),
//! how many slots stay in memory, and what happens to a slot when it leaves
//! memory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default number of samples per slot.
pub const DEFAULT_SLOT_SIZE: u32 = 1_048_576;

/// Default number of samples per block.
pub const DEFAULT_BLOCK_SIZE: u32 = 1_024;

/// Default number of slots kept in memory (the current one and its predecessor).
pub const DEFAULT_RESIDENT_SLOTS: usize = 2;

/// Default directory for backing files.
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// What happens to a slot's data when it is evicted from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Write the slot to the backing file and release it once the write is
    /// durable.
    #[default]
    PersistToDisk,

    /// Drop the slot without any I/O. Evicted samples are lost; intended for
    /// stress tests where disk throughput would be the bottleneck.
    DiscardOnEvict,
}

/// Paging geometry and eviction behavior of a store.
///
/// # Example
///
/// ```rust
/// use rivulet::config::{EvictionPolicy, StoreConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StoreConfig::default()
///     .with_geometry(4096, 64)
///     .with_eviction(EvictionPolicy::DiscardOnEvict);
/// config.validate()?;
/// assert_eq!(config.blocks_per_slot(), 64);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Samples per slot. Must be a non-zero multiple of `block_size`.
    pub slot_size: u32,

    /// Samples per block.
    pub block_size: u32,

    /// Number of most recent slots kept in memory, including the one being
    /// written. Starting slot `s` evicts slot `s - resident_slots`.
    pub resident_slots: usize,

    /// Maximum number of samples the store accepts. At most `u32::MAX`, the
    /// number of samples a [`SampleNumber`](crate::sample::SampleNumber) can
    /// address.
    pub max_samples: u64,

    /// Policy applied to slots leaving memory.
    pub eviction: EvictionPolicy,

    /// Directory holding backing files.
    pub cache_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            slot_size: DEFAULT_SLOT_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            resident_slots: DEFAULT_RESIDENT_SLOTS,
            max_samples: u64::from(u32::MAX),
            eviction: EvictionPolicy::default(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl StoreConfig {
    /// Returns a copy with the given slot and block sizes.
    #[must_use]
    pub fn with_geometry(mut self, slot_size: u32, block_size: u32) -> Self {
        self.slot_size = slot_size;
        self.block_size = block_size;
        self
    }

    /// Returns a copy with the given resident window.
    #[must_use]
    pub fn with_resident_slots(mut self, resident_slots: usize) -> Self {
        self.resident_slots = resident_slots;
        self
    }

    /// Returns a copy with the given eviction policy.
    #[must_use]
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Returns a copy storing backing files under `cache_dir`.
    #[must_use]
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Returns a copy accepting at most `max_samples` samples.
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: u64) -> Self {
        self.max_samples = max_samples.min(u64::from(u32::MAX));
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the block size is zero, the slot size is not
    /// a non-zero multiple of the block size, no slot would stay resident or
    /// `max_samples` is beyond `u32::MAX`.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize.into());
        }

        if self.slot_size == 0 || self.slot_size % self.block_size != 0 {
            return Err(ConfigError::SlotNotBlockAligned {
                slot_size: self.slot_size,
                block_size: self.block_size,
            }
            .into());
        }

        if self.resident_slots == 0 {
            return Err(ConfigError::ZeroResidentSlots.into());
        }

        if self.max_samples > u64::from(u32::MAX) {
            return Err(ConfigError::MaxSamplesTooLarge {
                max_samples: self.max_samples,
            }
            .into());
        }

        Ok(())
    }

    /// Number of blocks in one slot.
    pub fn blocks_per_slot(&self) -> u32 {
        self.slot_size / self.block_size
    }

    /// Loads a configuration from a JSON file, or returns the defaults if the
    /// file doesn't exist. Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: StoreConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Path of the backing file for the store named `identity`.
    pub fn backing_path(&self, identity: &str) -> PathBuf {
        self.cache_dir.join(format!("{identity}.bin"))
    }
}

/// Checks that a store identity is usable as a file stem.
pub(crate) fn validate_identity(identity: &str) -> Result<()> {
    let reason = if identity.is_empty() {
        Some("identity must not be empty")
    } else if identity.contains(['/', '\\']) {
        Some("identity must not contain path separators")
    } else if identity == "." || identity == ".." {
        Some("identity must not be a relative path component")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidIdentity {
            identity: identity.to_string(),
            reason: reason.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}
