use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Labeled failure reasons.
///
/// The parser and detector APIs fail softly (`Option` / empty `Vec`); these variants back the
/// `try_*` entry points for callers that want to know why something produced no result.
#[derive(Debug, Error)]
pub enum Error {
    /// Passthrough for IO errors (open/read/seek/metadata).
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The filename does not match the grammar of the parser that was asked to handle it.
    #[error("unsupported format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The embedded data stream could not be pulled out of the container.
    #[error("metadata extraction failed for {}: {reason}", path.display())]
    MetadataExtraction { path: PathBuf, reason: String },

    /// Date/time captures did not form a valid calendar timestamp.
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    /// No registered parser reached the confidence threshold for a directory.
    #[error("no vendor identified for {}", dir.display())]
    NoVendor { dir: PathBuf },

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// MP4 structure is malformed or violates expected ISO-BMFF invariants.
    #[error("mp4 parse error in {context}: box {box_type} at offset {offset}: {message}")]
    Mp4InvalidBox {
        context: String,
        box_type: String,
        offset: u64,
        message: String,
    },
}
