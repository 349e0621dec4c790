use std::path::PathBuf;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Mapping source open/read error.
    #[error("{0}: {1}")]
    Source(PathBuf, std::io::Error),

    /// Error when a line of the mapping source does not match the expected
    /// format.
    #[error("malformed mapping line: {0:?}")]
    MalformedLine(String),

    /// Error when no mapping contains the looked-up address, even after a
    /// refresh of the cache.
    #[error("no mapping contains address {0:#x}")]
    NoContainingMapping(usize),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
