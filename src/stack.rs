//! Movie-stack probing.
//!
//! Micrograph initialization only needs the pixel dimensions and frame
//! count of a movie, never its pixel data, so probing is a header read. The
//! trait keeps the estimator and micrograph code independent of the on-disk
//! container; [`MrcStackProbe`] covers the MRC2014 stacks produced by most
//! detectors.

use crate::error::MotionError;
use log::warn;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Dimensions reported by a stack probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StackInfo {
    pub width: usize,
    pub height: usize,
    pub n_frames: usize,
}

/// Reports a movie's dimensions without decoding pixel data.
pub trait StackProbe {
    fn probe(&self, path: &Path) -> Result<StackInfo, MotionError>;
}

/// Header size of an MRC2014 file, preceding any extended header and data.
const MRC_HEADER_LEN: usize = 1024;

/// Byte offset of the `MAP ` format stamp inside the header.
const MAP_STAMP_OFFSET: usize = 208;

/// Probe for MRC2014 movie stacks: reads `nx`, `ny`, `nz` from the fixed
/// 1024-byte header.
#[derive(Clone, Copy, Debug, Default)]
pub struct MrcStackProbe;

impl StackProbe for MrcStackProbe {
    fn probe(&self, path: &Path) -> Result<StackInfo, MotionError> {
        let mut file = File::open(path).map_err(|e| MotionError::file_access(path, e))?;
        let mut header = [0u8; MRC_HEADER_LEN];
        file.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                MotionError::malformed(
                    &path.to_string_lossy(),
                    format!("file shorter than the {MRC_HEADER_LEN}-byte MRC header"),
                )
            } else {
                MotionError::file_access(path, e)
            }
        })?;

        parse_mrc_header(&header, path)
    }
}

fn parse_mrc_header(header: &[u8; MRC_HEADER_LEN], path: &Path) -> Result<StackInfo, MotionError> {
    let word = |offset: usize| {
        i32::from_le_bytes(
            header[offset..offset + 4]
                .try_into()
                .expect("4-byte slice of the fixed header"),
        )
    };
    let nx = word(0);
    let ny = word(4);
    let nz = word(8);

    if nx <= 0 || ny <= 0 || nz <= 0 {
        return Err(MotionError::malformed(
            &path.to_string_lossy(),
            format!("non-positive MRC dimensions {nx}x{ny}x{nz}"),
        ));
    }

    if &header[MAP_STAMP_OFFSET..MAP_STAMP_OFFSET + 4] != b"MAP " {
        // Pre-2014 files lack the stamp; the dimension words still apply.
        warn!("{}: no MAP stamp in MRC header", path.display());
    }

    Ok(StackInfo {
        width: nx as usize,
        height: ny as usize,
        n_frames: nz as usize,
    })
}
