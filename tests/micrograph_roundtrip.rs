mod common;

use approx::assert_relative_eq;
use common::synthetic::sample_micrograph;
use micromotion::{Micrograph, MotionError};

#[test]
fn round_trip_without_model() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mg = sample_micrograph(24, false);

    let reread = Micrograph::parse(&mg.to_star_string()).expect("written document parses");
    assert_eq!(mg, reread);
}

#[test]
fn round_trip_with_model_preserves_evaluation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mg = sample_micrograph(40, true);

    let reread = Micrograph::parse(&mg.to_star_string()).expect("written document parses");
    assert_eq!(mg, reread);

    // Equivalent polynomial evaluation at sampled (frame, x, y).
    for (frame, x, y) in [(1, 0.0, 0.0), (7, 250.0, -120.0), (40, -1919.0, 1855.0)] {
        let a = mg.shift_at(frame, x, y).unwrap();
        let b = reread.shift_at(frame, x, y).unwrap();
        assert_relative_eq!(a.x, b.x);
        assert_relative_eq!(a.y, b.y);
    }
}

#[test]
fn round_trip_through_a_file() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mg = sample_micrograph(12, true);

    let dir = std::env::temp_dir().join("micromotion_roundtrip");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("mic001.star");

    mg.write(&path).expect("snapshot written");
    let reread = Micrograph::read(&path).expect("snapshot read back");
    assert_eq!(mg, reread);
}

#[test]
fn unset_fields_are_omitted_and_default_on_read() {
    let mut mg = sample_micrograph(8, false);
    mg.angpix = -1.0;
    mg.voltage = -1.0;
    mg.gain_file.clear();

    let text = mg.to_star_string();
    assert!(!text.contains("_rlnMicrographOriginalPixelSize"));
    assert!(!text.contains("_rlnVoltage"));
    assert!(!text.contains("_rlnMicrographGainName"));

    let reread = Micrograph::parse(&text).unwrap();
    assert_eq!(reread.angpix, -1.0);
    assert_eq!(reread.voltage, -1.0);
    assert!(reread.gain_file.is_empty());
}

#[test]
fn missing_required_general_field_fails() {
    let mg = sample_micrograph(4, false);
    let text = mg.to_star_string().replace("_rlnImageSizeZ", "_rlnIgnored");
    let err = Micrograph::parse(&text).unwrap_err();
    assert!(matches!(err, MotionError::MalformedRecord { .. }), "{err}");
    assert!(err.to_string().contains("_rlnImageSizeZ"), "{err}");
}

#[test]
fn malformed_global_shift_record_fails() {
    let mg = sample_micrograph(4, false);
    let text = mg.to_star_string().replace("_rlnMicrographShiftY", "_rlnSomethingElse");
    let err = Micrograph::parse(&text).unwrap_err();
    assert!(err.to_string().contains("global_shift"), "{err}");
}

/// Rewrites the model-version line of a rendered document.
fn with_model_version(text: &str, version: i64) -> String {
    let mut rewritten = 0;
    let out: Vec<String> = text
        .lines()
        .map(|line| {
            if line.starts_with("_rlnMotionModelVersion") {
                rewritten += 1;
                format!("_rlnMotionModelVersion {version}")
            } else {
                line.to_string()
            }
        })
        .collect();
    assert_eq!(rewritten, 1, "expected exactly one version line");
    out.join("\n")
}

#[test]
fn unknown_model_version_degrades_to_no_model() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mg = sample_micrograph(4, false);
    let text = with_model_version(&mg.to_star_string(), 99);

    let reread = Micrograph::parse(&text).expect("unknown model version is not fatal");
    assert!(reread.model.is_none());
}

#[test]
fn model_version_without_coefficient_block_fails() {
    let mg = sample_micrograph(4, false);
    let text = with_model_version(&mg.to_star_string(), 1);
    let err = Micrograph::parse(&text).unwrap_err();
    assert!(err.to_string().contains("local_motion_model"), "{err}");
}
