//! Error types for the rivulet sample store.

use std::path::PathBuf;

use thiserror::Error;

use crate::sample::SampleNumber;

/// The main error type for all rivulet operations.
///
/// Each variant wraps the error family of one stage of the store: its
/// configuration, the backing file, the append path, and the read path.
#[derive(Error, Debug)]
pub enum RivuletError {
    /// Invalid or unreadable store configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error during backing file I/O.
    #[error("backing file error: {0}")]
    BackingFile(#[from] BackingFileError),

    /// Error during an append (write path).
    #[error("append error: {0}")]
    Append(#[from] AppendError),

    /// Error during a query (read path).
    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

/// Errors that can occur while validating or loading a [`StoreConfig`].
///
/// [`StoreConfig`]: crate::config::StoreConfig
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Block size must be at least one sample.
    #[error("block_size must be greater than zero")]
    ZeroBlockSize,

    /// Slot size must be a non-zero multiple of the block size.
    #[error("slot_size {slot_size} is not a non-zero multiple of block_size {block_size}")]
    SlotNotBlockAligned {
        /// The configured slot size.
        slot_size: u32,
        /// The configured block size.
        block_size: u32,
    },

    /// At least the slot being written must stay resident.
    #[error("resident_slots must be at least 1")]
    ZeroResidentSlots,

    /// More samples than a sample number can address.
    #[error("max_samples {max_samples} exceeds the addressable limit of {}", u32::MAX)]
    MaxSamplesTooLarge {
        /// The configured limit.
        max_samples: u64,
    },

    /// The store identity cannot be used as a file name.
    #[error("invalid store identity '{identity}': {reason}")]
    InvalidIdentity {
        /// The rejected identity.
        identity: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to read a configuration file.
    #[error("failed to load config from '{}': {source}", path.display())]
    Load {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config from '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while operating on a backing file.
#[derive(Error, Debug)]
pub enum BackingFileError {
    /// The cache directory or the file itself could not be created.
    #[error("failed to create backing file '{}': {source}", path.display())]
    Create {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A positioned read failed.
    #[error("failed to read '{}' at offset {offset}: {source}", path.display())]
    ReadFailed {
        /// The file path.
        path: PathBuf,
        /// The byte offset of the read.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A positioned write failed.
    #[error("failed to write '{}' at offset {offset}: {source}", path.display())]
    WriteFailed {
        /// The file path.
        path: PathBuf,
        /// The byte offset of the write.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Forcing written data to stable storage failed.
    #[error("failed to sync '{}' to disk: {source}", path.display())]
    SyncFailed {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Truncating the file on clear failed.
    #[error("failed to truncate '{}': {source}", path.display())]
    TruncateFailed {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Deleting the file on dispose failed.
    #[error("failed to remove '{}': {source}", path.display())]
    RemoveFailed {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur on the append path.
#[derive(Error, Debug)]
pub enum AppendError {
    /// A block append was requested while the counter is mid-block.
    #[error("block append at sample {sample} is not aligned to block_size {block_size}")]
    Unaligned {
        /// The current sample count.
        sample: u64,
        /// The configured block size.
        block_size: u32,
    },

    /// The store has reached its configured maximum sample count.
    #[error("store is full: {max_samples} samples")]
    CapacityExceeded {
        /// The configured maximum.
        max_samples: u64,
    },

    /// A channel row had the wrong number of values.
    #[error("row has {actual} values, channel has {expected} value stores")]
    RowWidth {
        /// Number of value stores in the channel.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}

/// Errors that can occur on the read path.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The range bounds are reversed.
    #[error("invalid range: first {first} > last {last}")]
    InvalidRange {
        /// The first requested sample.
        first: SampleNumber,
        /// The last requested sample.
        last: SampleNumber,
    },

    /// The requested sample has not been appended yet.
    #[error("sample {sample} is out of range (store holds {len} samples)")]
    OutOfRange {
        /// The offending sample number.
        sample: u64,
        /// The number of samples currently in the store.
        len: u64,
    },

    /// The sample lived in a slot dropped under `DiscardOnEvict`.
    #[error("sample {sample} was discarded on eviction of slot {slot}")]
    Discarded {
        /// The requested sample number.
        sample: SampleNumber,
        /// The slot that was discarded.
        slot: usize,
    },

    /// The store has been disposed and its backing file removed.
    #[error("store has been disposed")]
    Disposed,
}

/// Type alias for `Result<T, RivuletError>`.
pub type Result<T> = std::result::Result<T, RivuletError>;
