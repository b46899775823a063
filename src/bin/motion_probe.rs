//! Read a persisted micrograph motion file and print its shifts.
//!
//! Usage: `motion_probe <micrograph.star> [--json <out.json>]`

use micromotion::{write_json_file, Micrograph, MotionError, NOT_OBSERVED};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct FrameShift {
    frame: usize,
    shift_x: f64,
    shift_y: f64,
    observed: bool,
}

#[derive(Serialize)]
struct ProbeReport {
    movie: String,
    width: usize,
    height: usize,
    n_frames: usize,
    has_model: bool,
    frames: Vec<FrameShift>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), MotionError> {
    let mut args = env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| MotionError::InvalidConfig("usage: motion_probe <micrograph.star> [--json <out.json>]".into()))?;
    let json_out = match (args.next().as_deref(), args.next()) {
        (Some("--json"), Some(path)) => Some(PathBuf::from(path)),
        (None, _) => None,
        _ => {
            return Err(MotionError::InvalidConfig(
                "usage: motion_probe <micrograph.star> [--json <out.json>]".into(),
            ))
        }
    };

    let mg = Micrograph::read(&input)?;
    let report = build_report(&mg)?;

    println!(
        "{}: {}x{} px, {} frames, model: {}",
        report.movie,
        report.width,
        report.height,
        report.n_frames,
        if report.has_model { "polynomial" } else { "none" }
    );
    for f in &report.frames {
        if f.observed {
            println!("  frame {:>3}: ({:>10.4}, {:>10.4})", f.frame, f.shift_x, f.shift_y);
        } else {
            println!("  frame {:>3}: not observed", f.frame);
        }
    }

    if let Some(path) = json_out {
        write_json_file(Path::new(&path), &report)?;
        println!("JSON report written to {}", path.display());
    }
    Ok(())
}

fn build_report(mg: &Micrograph) -> Result<ProbeReport, MotionError> {
    let mut frames = Vec::with_capacity(mg.n_frames());
    for frame in 1..=mg.n_frames() {
        let s = mg.global_shift(frame)?;
        frames.push(FrameShift {
            frame,
            shift_x: s.x,
            shift_y: s.y,
            observed: s.x != NOT_OBSERVED || s.y != NOT_OBSERVED,
        });
    }
    Ok(ProbeReport {
        movie: mg.movie_file.clone(),
        width: mg.width,
        height: mg.height,
        n_frames: mg.n_frames(),
        has_model: mg.model.is_some(),
        frames,
    })
}
