//! Error and warning types for the osu2saber library

use std::fmt;
use std::io;

/// Library error type for conversion operations.
///
/// Every variant is fatal for the beatmap set being converted, never for the
/// whole batch.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Malformed source chart
    #[error("parsing error in [{section}] at line {line}: {message}")]
    Parse {
        section: String,
        line: usize,
        message: String,
    },

    /// Declared `osu file format` version is not handled
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(String),

    /// No source difficulty could be assigned a Beat Saber difficulty
    #[error("no difficulty could be mapped")]
    NoDifficultyMapped,

    /// Internal invariant violated while rendering a level
    #[error("serialization error: {0}")]
    Serialization(String),

    /// External transcoder exceeded its deadline
    #[error("{asset} conversion timed out after {seconds}s")]
    AssetTimeout { asset: String, seconds: u64 },

    /// External transcoder or image conversion failed
    #[error("asset error: {0}")]
    Asset(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Background conversion task panicked or was cancelled
    #[error("task error: {0}")]
    Task(String),
}

impl ConvertError {
    pub fn parse(section: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            section: section.to_string(),
            line,
            message: message.into(),
        }
    }
}

impl From<io::Error> for ConvertError {
    fn from(error: io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Non-fatal issue recorded while placing notes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionWarning {
    /// A hit object could not be converted and was left out
    SkippedObject {
        index: usize,
        time: f64,
        reason: String,
    },
    /// A chord had more notes than free cells
    NoteOverload { beat: f64, column: u8, row: u8 },
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedObject {
                index,
                time,
                reason,
            } => write!(f, "skipped hit object #{index} at {time}ms: {reason}"),
            Self::NoteOverload { beat, column, row } => write!(
                f,
                "note overload at beat {beat}: no free cell near ({column}, {row})"
            ),
        }
    }
}
