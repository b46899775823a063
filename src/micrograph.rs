//! Per-micrograph motion state: acquisition metadata, per-frame global
//! shifts and an optional spatially varying model.
//!
//! Frame numbers are 1-indexed at every public boundary (matching the
//! persisted `global_shift` table) and 0-indexed internally; the translation
//! happens in exactly one place, [`Micrograph::frame_index`]. The persisted
//! form is a STAR-style document with, in order, a `general` list block, a
//! `global_shift` loop block and, only when a spatial model is present, a
//! `local_motion_model` coefficient block.

use crate::error::MotionError;
use crate::model::MotionModel;
use crate::stack::StackProbe;
use crate::startab::{StarBlock, StarDocument};
use log::warn;
use nalgebra::Vector2;
use std::path::Path;

/// Sentinel shift value for frames that have not been aligned yet.
pub const NOT_OBSERVED: f64 = -9999.0;

/// Sentinel for optional scalar metadata that was never recorded.
const UNSET: f64 = -1.0;

pub(crate) const GENERAL_BLOCK: &str = "general";
pub(crate) const GLOBAL_SHIFT_BLOCK: &str = "global_shift";
pub(crate) const LOCAL_MOTION_MODEL_BLOCK: &str = "local_motion_model";

const IMAGE_SIZE_X: &str = "_rlnImageSizeX";
const IMAGE_SIZE_Y: &str = "_rlnImageSizeY";
const IMAGE_SIZE_Z: &str = "_rlnImageSizeZ";
const MOVIE_NAME: &str = "_rlnMicrographMovieName";
const GAIN_NAME: &str = "_rlnMicrographGainName";
const BINNING: &str = "_rlnMicrographBinning";
const ORIGINAL_PIXEL_SIZE: &str = "_rlnMicrographOriginalPixelSize";
const DOSE_RATE: &str = "_rlnMicrographDoseRate";
const PRE_EXPOSURE: &str = "_rlnMicrographPreExposure";
const VOLTAGE: &str = "_rlnVoltage";
const START_FRAME: &str = "_rlnMicrographStartFrame";
const MOTION_MODEL_VERSION: &str = "_rlnMotionModelVersion";
const FRAME_NUMBER: &str = "_rlnMicrographFrameNumber";
const SHIFT_X: &str = "_rlnMicrographShiftX";
const SHIFT_Y: &str = "_rlnMicrographShiftY";

/// Motion state of one movie.
#[derive(Clone, Debug, PartialEq)]
pub struct Micrograph {
    pub width: usize,
    pub height: usize,
    n_frames: usize,
    /// Downsampling applied when the movie was aligned (≥ 1).
    pub binning: f64,
    /// Pixel size in ångström; −1 when not recorded.
    pub angpix: f64,
    /// Accumulated dose before the first frame (e/Å²); −1 when not recorded.
    pub pre_exposure: f64,
    /// Dose per frame (e/Å²); −1 when not recorded.
    pub dose_per_frame: f64,
    /// Acceleration voltage (kV); −1 when not recorded.
    pub voltage: f64,
    /// First usable frame of the movie (1-indexed).
    pub start_frame: usize,
    pub movie_file: String,
    /// Empty when no gain reference was applied.
    pub gain_file: String,
    global_shift_x: Vec<f64>,
    global_shift_y: Vec<f64>,
    pub model: Option<MotionModel>,
}

impl Micrograph {
    /// Create a micrograph with known dimensions and all shifts unobserved.
    pub fn new(
        width: usize,
        height: usize,
        n_frames: usize,
        movie_file: impl Into<String>,
    ) -> Result<Self, MotionError> {
        if width == 0 || height == 0 || n_frames == 0 {
            return Err(MotionError::InvalidConfig(format!(
                "micrograph dimensions must be positive (got {width}x{height}, {n_frames} frames)"
            )));
        }
        Ok(Self {
            width,
            height,
            n_frames,
            binning: 1.0,
            angpix: UNSET,
            pre_exposure: UNSET,
            dose_per_frame: UNSET,
            voltage: UNSET,
            start_frame: 1,
            movie_file: movie_file.into(),
            gain_file: String::new(),
            global_shift_x: vec![NOT_OBSERVED; n_frames],
            global_shift_y: vec![NOT_OBSERVED; n_frames],
            model: None,
        })
    }

    /// Create a micrograph by probing a movie stack for its dimensions and
    /// frame count. Shifts are reset to unobserved and any model is dropped.
    pub fn from_movie(
        movie_file: &Path,
        gain_file: Option<&Path>,
        binning: f64,
        probe: &dyn StackProbe,
    ) -> Result<Self, MotionError> {
        let info = probe.probe(movie_file)?;
        let mut mg = Self::new(
            info.width,
            info.height,
            info.n_frames,
            movie_file.to_string_lossy(),
        )?;
        mg.binning = binning;
        if let Some(gain) = gain_file {
            mg.gain_file = gain.to_string_lossy().into_owned();
        }
        Ok(mg)
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// The single 1-indexed → 0-indexed translation point. Every public
    /// accessor and mutator goes through here exactly once.
    fn frame_index(&self, frame: usize) -> Result<usize, MotionError> {
        if frame == 0 || frame > self.n_frames {
            return Err(MotionError::FrameOutOfRange {
                frame,
                n_frames: self.n_frames,
            });
        }
        Ok(frame - 1)
    }

    /// Authoritative shift query: spatial model component (with the frame
    /// number as the z coordinate) plus the per-frame global shift.
    pub fn shift_at(&self, frame: usize, x: f64, y: f64) -> Result<Vector2<f64>, MotionError> {
        let idx = self.frame_index(frame)?;
        let local = match &self.model {
            Some(model) => model.shift_at(frame as f64, x, y),
            None => Vector2::zeros(),
        };
        Ok(local + Vector2::new(self.global_shift_x[idx], self.global_shift_y[idx]))
    }

    /// Overwrite the global shift of a frame (1-indexed), marking it
    /// observed.
    pub fn set_global_shift(
        &mut self,
        frame: usize,
        shift_x: f64,
        shift_y: f64,
    ) -> Result<(), MotionError> {
        let idx = self.frame_index(frame)?;
        self.global_shift_x[idx] = shift_x;
        self.global_shift_y[idx] = shift_y;
        Ok(())
    }

    /// Global shift of a frame (1-indexed), without any model component.
    pub fn global_shift(&self, frame: usize) -> Result<Vector2<f64>, MotionError> {
        let idx = self.frame_index(frame)?;
        Ok(Vector2::new(
            self.global_shift_x[idx],
            self.global_shift_y[idx],
        ))
    }

    /// Whether a frame's global shift has been set since initialization.
    pub fn observed(&self, frame: usize) -> Result<bool, MotionError> {
        let idx = self.frame_index(frame)?;
        Ok(self.global_shift_x[idx] != NOT_OBSERVED || self.global_shift_y[idx] != NOT_OBSERVED)
    }

    /// Read a persisted micrograph from `path`.
    pub fn read(path: &Path) -> Result<Self, MotionError> {
        Self::parse(&std::fs::read_to_string(path).map_err(|e| MotionError::file_access(path, e))?)
    }

    /// Parse a persisted micrograph from STAR-style text.
    pub fn parse(text: &str) -> Result<Self, MotionError> {
        let doc = StarDocument::parse(text)?;

        let general = doc
            .block(GENERAL_BLOCK)
            .ok_or_else(|| MotionError::malformed(GENERAL_BLOCK, "block not found"))?;

        let width = require_positive(general, IMAGE_SIZE_X)?;
        let height = require_positive(general, IMAGE_SIZE_Y)?;
        let n_frames = require_positive(general, IMAGE_SIZE_Z)?;
        let movie_file = general.require_str(0, MOVIE_NAME)?.to_string();

        let mut mg = Self::new(width, height, n_frames, movie_file)?;

        // Optional metadata defaults exactly mirror the writer's omission of
        // unset fields.
        mg.gain_file = general.get_str(0, GAIN_NAME).unwrap_or_default().to_string();
        mg.binning = general.get_f64(0, BINNING).unwrap_or(1.0);
        mg.angpix = general.get_f64(0, ORIGINAL_PIXEL_SIZE).unwrap_or(UNSET);
        mg.pre_exposure = general.get_f64(0, PRE_EXPOSURE).unwrap_or(UNSET);
        mg.dose_per_frame = general.get_f64(0, DOSE_RATE).unwrap_or(UNSET);
        mg.voltage = general.get_f64(0, VOLTAGE).unwrap_or(UNSET);
        mg.start_frame = match general.get_i64(0, START_FRAME) {
            Some(f) if f >= 1 => f as usize,
            _ => 1,
        };

        let version = general.require_i64(0, MOTION_MODEL_VERSION)?;
        mg.model = MotionModel::from_version(
            version,
            doc.block(LOCAL_MOTION_MODEL_BLOCK),
            LOCAL_MOTION_MODEL_BLOCK,
        )?;

        let shifts = doc
            .block(GLOBAL_SHIFT_BLOCK)
            .ok_or_else(|| MotionError::malformed(GLOBAL_SHIFT_BLOCK, "block not found"))?;
        for row in 0..shifts.n_rows() {
            let frame = shifts.require_i64(row, FRAME_NUMBER)?;
            let shift_x = shifts.require_f64(row, SHIFT_X)?;
            let shift_y = shifts.require_f64(row, SHIFT_Y)?;

            // Duplicate frame numbers overwrite, last write wins. A frame
            // number outside the declared range has no slot to overwrite.
            match usize::try_from(frame).ok().and_then(|f| mg.frame_index(f).ok()) {
                Some(idx) => {
                    mg.global_shift_x[idx] = shift_x;
                    mg.global_shift_y[idx] = shift_y;
                }
                None => warn!(
                    "{GLOBAL_SHIFT_BLOCK}: skipping frame {frame} outside [1, {n_frames}]"
                ),
            }
        }

        Ok(mg)
    }

    /// Serialize to the three-block persisted form.
    pub fn to_document(&self) -> StarDocument {
        let mut doc = StarDocument::new();

        let mut general = StarBlock::list(GENERAL_BLOCK);
        general.set(IMAGE_SIZE_X, self.width);
        general.set(IMAGE_SIZE_Y, self.height);
        general.set(IMAGE_SIZE_Z, self.n_frames);
        general.set(MOVIE_NAME, &self.movie_file);
        if !self.gain_file.is_empty() {
            general.set(GAIN_NAME, &self.gain_file);
        }
        general.set(BINNING, self.binning);
        if self.angpix != UNSET {
            general.set(ORIGINAL_PIXEL_SIZE, self.angpix);
        }
        if self.dose_per_frame != UNSET {
            general.set(DOSE_RATE, self.dose_per_frame);
        }
        if self.pre_exposure != UNSET {
            general.set(PRE_EXPOSURE, self.pre_exposure);
        }
        if self.voltage != UNSET {
            general.set(VOLTAGE, self.voltage);
        }
        general.set(START_FRAME, self.start_frame);
        general.set(
            MOTION_MODEL_VERSION,
            self.model
                .as_ref()
                .map_or(crate::model::MODEL_VERSION_NULL, MotionModel::version),
        );
        doc.push(general);

        let mut shifts = StarBlock::tabular(GLOBAL_SHIFT_BLOCK);
        for idx in 0..self.n_frames {
            shifts.add_row();
            shifts.set(FRAME_NUMBER, idx + 1); // 1-indexed on disk
            shifts.set(SHIFT_X, self.global_shift_x[idx]);
            shifts.set(SHIFT_Y, self.global_shift_y[idx]);
        }
        doc.push(shifts);

        if let Some(model) = &self.model {
            doc.push(model.write_block(LOCAL_MOTION_MODEL_BLOCK));
        }

        doc
    }

    /// Render the persisted form as text.
    pub fn to_star_string(&self) -> String {
        self.to_document().to_star_string()
    }

    /// Write an immutable snapshot to `path`.
    pub fn write(&self, path: &Path) -> Result<(), MotionError> {
        self.to_document().write_to(path)
    }
}

fn require_positive(block: &StarBlock, tag: &str) -> Result<usize, MotionError> {
    let value = block.require_i64(0, tag)?;
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| {
            MotionError::malformed(block.name(), format!("field {tag} must be positive"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_boundaries() {
        let mut mg = Micrograph::new(64, 64, 5, "m.mrcs").unwrap();
        assert!(mg.set_global_shift(1, 0.5, -0.5).is_ok());
        assert!(mg.set_global_shift(5, 1.0, 1.0).is_ok());
        assert!(matches!(
            mg.set_global_shift(0, 0.0, 0.0),
            Err(MotionError::FrameOutOfRange { frame: 0, .. })
        ));
        assert!(matches!(
            mg.set_global_shift(6, 0.0, 0.0),
            Err(MotionError::FrameOutOfRange { frame: 6, .. })
        ));
    }

    #[test]
    fn shift_query_without_model_is_global_only() {
        let mut mg = Micrograph::new(64, 64, 3, "m.mrcs").unwrap();
        mg.set_global_shift(2, 1.25, -3.5).unwrap();
        let s = mg.shift_at(2, 100.0, 200.0).unwrap();
        assert_eq!((s.x, s.y), (1.25, -3.5));
    }

    #[test]
    fn unobserved_frames_carry_the_sentinel() {
        let mg = Micrograph::new(64, 64, 2, "m.mrcs").unwrap();
        assert!(!mg.observed(1).unwrap());
        let s = mg.global_shift(2).unwrap();
        assert_eq!((s.x, s.y), (NOT_OBSERVED, NOT_OBSERVED));
    }

    #[test]
    fn duplicate_frames_last_write_wins() {
        let mut mg = Micrograph::new(32, 32, 2, "m.mrcs").unwrap();
        mg.set_global_shift(1, 1.0, 1.0).unwrap();
        mg.set_global_shift(2, 2.0, 2.0).unwrap();

        // Duplicate the frame-1 record with different values.
        let mut text = mg.to_star_string();
        text.push_str("\ndata_ignored\n\n_x 1\n");
        let dup_row = "           1          7.5         -7.5\n";
        let insert_at = text.find("data_ignored").unwrap();
        text.insert_str(insert_at, &format!("{dup_row}\n"));

        // The duplicate row was appended after the original global_shift
        // rows, so it must win.
        let reread = Micrograph::parse(&text).unwrap();
        let s = reread.global_shift(1).unwrap();
        assert_eq!((s.x, s.y), (7.5, -7.5));
    }
}
