//! Offline render: decode, equalize and analyze a file without a device

use crate::error::Result;
use aural_audio::{Decoder, GraphicEq, SpectrumAnalyzer, SpectrumConfig, OUTPUT_CHANNELS};
use aural_core::{EqualizerPreset, BAND_FREQUENCIES};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Consecutive undecodable blocks that abort the render
const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Average spectrum level around each equalizer band
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub preset: String,
    pub decoder: String,
    pub sample_rate: u32,
    /// Audio rendered
    pub rendered: Duration,
    pub frames: usize,
    /// Decode failures skipped along the way
    pub skipped_blocks: usize,
    /// (band center in Hz, mean peak level in dB)
    pub bands: Vec<(f32, f32)>,
}

impl AnalysisReport {
    /// Level of the band nearest `frequency`
    pub fn level_near(&self, frequency: f32) -> Option<f32> {
        self.bands
            .iter()
            .min_by(|a, b| {
                (a.0 - frequency)
                    .abs()
                    .total_cmp(&(b.0 - frequency).abs())
            })
            .map(|(_, level)| *level)
    }
}

/// Render up to `limit` of `path` through `preset` and average the spectrum
pub fn analyze(
    path: &Path,
    preset: &EqualizerPreset,
    limit: Duration,
    block_frames: usize,
    spectrum: SpectrumConfig,
) -> Result<AnalysisReport> {
    let mut decoder = Decoder::open(path, block_frames)?;
    let properties = decoder.properties();
    debug!(?properties, "Analyzing");

    let mut eq = GraphicEq::new(properties.sample_rate, OUTPUT_CHANNELS);
    eq.load_preset(preset);
    let mut analyzer = SpectrumAnalyzer::new(spectrum);
    let slot = analyzer.slot();

    let mut sums = [0.0_f64; BAND_FREQUENCIES.len()];
    let mut frames = 0;
    let mut skipped = 0;
    let mut consecutive = 0;
    let mut rendered = Duration::ZERO;

    while rendered < limit {
        let block = match decoder.read_block() {
            Ok(Some(block)) => block,
            Ok(None) => break,
            Err(e) if consecutive + 1 >= MAX_CONSECUTIVE_FAILURES => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable block");
                skipped += 1;
                consecutive += 1;
                continue;
            }
        };
        consecutive = 0;
        rendered += block.duration();
        let block = eq.apply(block);
        analyzer.feed(&block);

        if let Some(frame) = slot.take() {
            for (sum, center) in sums.iter_mut().zip(BAND_FREQUENCIES) {
                // One-third octave either side of the band center
                let low = center / 2f32.powf(1.0 / 3.0);
                let high = center * 2f32.powf(1.0 / 3.0);
                if let Some(level) = frame.peak_in_range(low, high) {
                    *sum += f64::from(level);
                }
            }
            frames += 1;
        }
    }

    let bands = BAND_FREQUENCIES
        .iter()
        .zip(sums)
        .map(|(center, sum)| {
            let mean = if frames == 0 {
                spectrum.floor_db
            } else {
                (sum / frames as f64) as f32
            };
            (*center, mean)
        })
        .collect();

    Ok(AnalysisReport {
        preset: preset.name().to_string(),
        decoder: properties.family.name().to_string(),
        sample_rate: properties.sample_rate,
        rendered,
        frames,
        skipped_blocks: skipped,
        bands,
    })
}
