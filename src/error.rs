use std::{io, path::PathBuf};

use thiserror::Error;

/// Rejected cache or simulation parameters. Raised before any core starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} must be a power of two, got {value}")]
    NotPowerOfTwo { what: &'static str, value: usize },
    #[error("{what} must be non-zero")]
    Zero { what: &'static str },
    #[error("block size {block_size}B must be smaller than the cache size {size}B")]
    BlockTooLarge { block_size: usize, size: usize },
    #[error("cache size {size}B is not a multiple of the block size {block_size}B")]
    UnevenSize { size: usize, block_size: usize },
    #[error("associativity {ways} exceeds the number of lines {lines}")]
    AssociativityTooLarge { ways: usize, lines: usize },
    #[error("{lines} lines cannot be split into sets of {ways}")]
    UnevenSets { lines: usize, ways: usize },
    #[error("write-through cannot be combined with write-allocate")]
    WriteThroughAllocate,
    #[error("belady replacement needs the core's trace to look ahead")]
    MissingOracle,
    #[error("{requested} cores requested, between 1 and {max} are supported")]
    CoreCount { requested: usize, max: usize },
    #[error("{cores} cores configured but {traces} trace files given")]
    TraceCount { cores: usize, traces: usize },
    #[error("no {0} given")]
    Missing(&'static str),
    #[error("could not read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,
    #[error("invalid hex digit {0:?}")]
    InvalidDigit(char),
    #[error("address wider than 64 bits: {0}")]
    TooWide(String),
}

/// A trace line that cannot be turned into an instruction. The line is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
    #[error("line {line}: unknown instruction {found:?}")]
    UnknownInstruction { line: usize, found: String },
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: {source}")]
    Address { line: usize, source: AddressError },
}

#[derive(Debug, Error)]
pub enum BackingStoreError {
    #[error("backing store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("access of {len}B at {offset:#x} is outside the {size}B backing store")]
    OutOfRange { offset: u64, len: usize, size: u64 },
    #[error("backing store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open backing store {path}: {source}")]
    Store {
        path: PathBuf,
        source: BackingStoreError,
    },
    #[error("could not read trace {path}: {source}")]
    Trace { path: PathBuf, source: io::Error },
    #[error("core {0} panicked")]
    CorePanicked(usize),
    #[error("simulation thread panicked")]
    Panicked,
    #[error(transparent)]
    Io(#[from] io::Error),
}
