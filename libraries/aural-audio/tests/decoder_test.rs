/// Integration tests for the streaming decoder
///
/// Fixtures are real WAV files written with hound into a temp dir.
use aural_audio::{AudioError, Decoder, DecoderFamily};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ===== Test Helpers =====

/// Write a 16-bit WAV holding a 440 Hz sine on every channel
fn create_test_wav(path: &Path, sample_rate: u32, frames: usize, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
        for _ in 0..channels {
            writer
                .write_sample((sample * f32::from(i16::MAX)) as i16)
                .expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
}

fn fixture(dir: &tempfile::TempDir, name: &str, rate: u32, frames: usize, channels: u16) -> PathBuf {
    let path = dir.path().join(name);
    create_test_wav(&path, rate, frames, channels);
    path
}

// ===== Opening =====

#[test]
fn opens_stereo_wav_as_pcm() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "stereo.wav", 44_100, 44_100, 2);

    let decoder = Decoder::open(&path, 1024).unwrap();
    let props = decoder.properties();

    assert_eq!(decoder.family(), DecoderFamily::Pcm);
    assert_eq!(props.sample_rate, 44_100);
    assert_eq!(props.channels, 2);
    let duration = props.duration.unwrap();
    assert!((duration.as_secs_f64() - 1.0).abs() < 1e-3);

    let shown = format!("{decoder:?}");
    assert!(shown.starts_with("Decoder") && shown.contains("sample_rate: 44100"));
}

#[test]
fn missing_file_is_unreadable() {
    let err = Decoder::open(Path::new("/definitely/not/here.wav"), 1024).unwrap_err();
    assert!(matches!(err, AudioError::FileUnreadable(_)));
}

#[test]
fn unknown_signature_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.wav");
    std::fs::write(&path, b"this is plain text, not audio at all").unwrap();

    let err = Decoder::open(&path, 1024).unwrap_err();
    assert!(matches!(err, AudioError::UnsupportedFormat(_)));
}

#[test]
fn family_comes_from_signature_not_extension() {
    let dir = tempfile::tempdir().unwrap();
    let wav = fixture(&dir, "real.wav", 22_050, 2_205, 1);
    let disguised = dir.path().join("disguised.mp3");
    std::fs::copy(&wav, &disguised).unwrap();

    assert_eq!(DecoderFamily::sniff(&disguised).unwrap(), DecoderFamily::Pcm);
}

// ===== Reading =====

#[test]
fn blocks_are_fixed_size_and_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    // 10.5 blocks of audio
    let path = fixture(&dir, "blocks.wav", 44_100, 10_752, 2);
    let mut decoder = Decoder::open(&path, 1024).unwrap();

    let mut blocks = Vec::new();
    while let Some(block) = decoder.read_block().unwrap() {
        blocks.push(block);
    }

    assert_eq!(blocks.len(), 11);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.frames(), 1024);
        assert_eq!(block.channels, 2);
        assert_eq!(block.frame_offset, Some(i as u64 * 1024));
        assert!(block.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    // Final block is padded, and says so
    let last = blocks.last().unwrap();
    assert_eq!(last.valid_frames, 512);
    assert!(last.samples[1024..].iter().all(|s| *s == 0.0));
    assert_eq!(last.end_offset(), Some(10_752));

    // Stream stays ended
    assert!(decoder.read_block().unwrap().is_none());
}

#[test]
fn mono_is_duplicated_to_stereo() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "mono.wav", 48_000, 4_800, 1);
    let mut decoder = Decoder::open(&path, 256).unwrap();

    assert_eq!(decoder.properties().channels, 1);
    let block = decoder.read_block().unwrap().unwrap();
    assert_eq!(block.channels, 2);
    for frame in block.samples.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
    assert!(block.peak() > 0.1);
}

#[test]
fn surround_is_folded_to_stereo() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "surround.wav", 48_000, 4_800, 6);
    let mut decoder = Decoder::open(&path, 512).unwrap();

    assert_eq!(decoder.properties().channels, 6);
    let block = decoder.read_block().unwrap().unwrap();
    assert_eq!(block.channels, 2);
    assert!(block.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
}

// ===== Seeking =====

#[test]
fn seek_restarts_at_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "seek.wav", 44_100, 44_100 * 3, 2);
    let mut decoder = Decoder::open(&path, 1024).unwrap();

    decoder.read_block().unwrap();
    let landed = decoder.seek(Duration::from_secs(2)).unwrap();
    assert!((landed.as_secs_f64() - 2.0).abs() < 0.01, "landed at {landed:?}");

    let block = decoder.read_block().unwrap().unwrap();
    let offset = block.frame_offset.unwrap();
    assert!((offset as i64 - 88_200).abs() < 1024, "offset {offset}");

    // Rewinding works too
    decoder.seek(Duration::ZERO).unwrap();
    assert_eq!(decoder.read_block().unwrap().unwrap().frame_offset, Some(0));
}

#[test]
fn seek_past_end_clamps_to_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(&dir, "short.wav", 44_100, 22_050, 2);
    let mut decoder = Decoder::open(&path, 1024).unwrap();

    let landed = decoder.seek(Duration::from_secs(60)).unwrap();
    assert!(landed <= Duration::from_millis(501));
    assert!(decoder.read_block().unwrap().is_none());
}
