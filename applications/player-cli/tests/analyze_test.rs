//! Offline analysis of a generated WAV file

use aural_audio::SpectrumConfig;
use aural_core::EqualizerPreset;
use aural_player::{analyze, PlayerError};
use std::path::Path;
use std::time::Duration;

const RATE: u32 = 44_100;

fn write_tones(path: &Path, seconds: u32) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..RATE * seconds {
        let t = i as f32 / RATE as f32;
        let sample: f32 = [63.0_f32, 1_000.0, 4_000.0]
            .iter()
            .map(|f| 0.2 * (2.0 * std::f32::consts::PI * f * t).sin())
            .sum();
        let value = (sample * 32767.0) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn rock_lifts_bass_against_flat() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tones.wav");
    write_tones(&path, 4);

    let render = |preset: EqualizerPreset| {
        analyze(
            &path,
            &preset,
            Duration::from_secs(3),
            1024,
            SpectrumConfig::default(),
        )
        .unwrap()
    };
    let flat = render(EqualizerPreset::flat());
    let rock = render(EqualizerPreset::builtin("rock").unwrap());

    assert_eq!(flat.decoder, rock.decoder);
    assert_eq!(flat.sample_rate, RATE);
    assert!(flat.frames > 100, "{} frames", flat.frames);
    assert!(flat.rendered >= Duration::from_secs(3));
    assert_eq!(flat.skipped_blocks, 0);

    let lift = |report: &aural_player::AnalysisReport, hz: f32| {
        report.level_near(hz).unwrap() - report.level_near(1_000.0).unwrap()
    };
    assert!(lift(&rock, 63.0) > lift(&flat, 63.0) + 3.0);
    assert!(lift(&rock, 4_000.0) > lift(&flat, 4_000.0) + 3.0);
}

#[test]
fn short_file_stops_at_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.wav");
    write_tones(&path, 1);

    let report = analyze(
        &path,
        &EqualizerPreset::flat(),
        Duration::from_secs(60),
        1024,
        SpectrumConfig::default(),
    )
    .unwrap();
    assert!(report.rendered <= Duration::from_millis(1_100));
    assert_eq!(report.bands.len(), 10);
}

#[test]
fn unreadable_file_is_reported() {
    let err = analyze(
        Path::new("/nonexistent/track.flac"),
        &EqualizerPreset::flat(),
        Duration::from_secs(1),
        1024,
        SpectrumConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PlayerError::Audio(_)));
}
