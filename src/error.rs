use std::path::{Path, PathBuf};
use thiserror::Error;

/// Crate-wide error type.
///
/// Unknown motion-model versions are deliberately *not* represented here:
/// they degrade to "no spatial model" with a logged warning instead of
/// failing the read (forward compatibility for that one field).
#[derive(Error, Debug)]
pub enum MotionError {
    /// A file could not be opened or written.
    #[error("cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A required field is missing, a record count is off, or an index is
    /// outside its declared range. Names the offending block.
    #[error("block `{block}`: {reason}")]
    MalformedRecord { block: String, reason: String },
    /// A frame index outside `[1, n_frames]` was passed to a shift query or
    /// mutator.
    #[error("frame {frame} out of range [1, {n_frames}]")]
    FrameOutOfRange { frame: usize, n_frames: usize },
    /// Rejected before any expensive work is attempted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MotionError {
    pub(crate) fn file_access(path: &Path, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(block: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            block: block.to_string(),
            reason: reason.into(),
        }
    }
}
