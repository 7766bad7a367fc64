/// Streaming audio decoder built on Symphonia
use crate::error::{AudioError, Result};
use aural_core::AudioBlock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Channel count of every block the decoder produces
pub const OUTPUT_CHANNELS: u16 = 2;

/// Bytes read from the start of a file to pick a decoder family
const SIGNATURE_LEN: usize = 12;

/// ITU-R BS.775 coefficient for center and surround channels (-3 dB)
const CENTER_MIX: f32 = 0.707;

/// Codec family, chosen from the file signature
///
/// The set is closed: a file whose leading bytes match none of these is
/// rejected before Symphonia ever sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecoderFamily {
    /// MPEG audio (MP3), with or without an ID3v2 tag
    Mpeg,
    /// Uncompressed PCM in a RIFF/WAVE or AIFF container
    Pcm,
    /// FLAC
    Lossless,
    /// Ogg Vorbis
    Vorbis,
}

impl DecoderFamily {
    /// Identify the family from the first bytes of a file
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.len() >= 3 && &header[..3] == b"ID3" {
            return Some(Self::Mpeg);
        }
        if header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0 {
            return Some(Self::Mpeg);
        }
        if header.len() >= 12 {
            let (outer, inner) = (&header[..4], &header[8..12]);
            if (outer == b"RIFF" && inner == b"WAVE")
                || (outer == b"FORM" && (inner == b"AIFF" || inner == b"AIFC"))
            {
                return Some(Self::Pcm);
            }
        }
        if header.len() >= 4 {
            match &header[..4] {
                b"fLaC" => return Some(Self::Lossless),
                b"OggS" => return Some(Self::Vorbis),
                _ => {}
            }
        }
        None
    }

    /// Read the signature of a file and identify its family
    pub fn sniff(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| AudioError::FileUnreadable(format!("{}: {}", path.display(), e)))?;

        let mut header = [0u8; SIGNATURE_LEN];
        let mut filled = 0;
        while filled < SIGNATURE_LEN {
            match file.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(AudioError::FileUnreadable(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        Self::detect(&header[..filled]).ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "{}: unrecognized file signature",
                path.display()
            ))
        })
    }

    /// Extension handed to the Symphonia probe as a hint
    fn extension_hint(self) -> &'static str {
        match self {
            Self::Mpeg => "mp3",
            Self::Pcm => "wav",
            Self::Lossless => "flac",
            Self::Vorbis => "ogg",
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Mpeg => "MPEG audio",
            Self::Pcm => "PCM",
            Self::Lossless => "FLAC",
            Self::Vorbis => "Vorbis",
        }
    }
}

/// Properties of an opened stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamProperties {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source (blocks are always stereo)
    pub channels: u16,
    /// Total duration, when the container declares it
    pub duration: Option<Duration>,
    /// Codec family
    pub family: DecoderFamily,
}

/// Container and codec state for one open file
struct StreamState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
}

/// Streaming decoder producing fixed-size stereo blocks
///
/// The decoder is a lazy, finite, strictly forward sequence of blocks that
/// can be restarted at any position with [`Decoder::seek`].
pub struct Decoder {
    stream: StreamState,
    properties: StreamProperties,
    block_frames: usize,
    /// Decoded stereo samples not yet handed out
    pending: VecDeque<f32>,
    /// Stream frame of the first pending sample
    next_frame: u64,
    end_of_stream: bool,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("properties", &self.properties)
            .field("block_frames", &self.block_frames)
            .field("next_frame", &self.next_frame)
            .field("end_of_stream", &self.end_of_stream)
            .finish_non_exhaustive()
    }
}

impl Decoder {
    /// Open a file and prepare to decode `block_frames`-frame blocks
    ///
    /// # Errors
    /// `FileUnreadable` when the file is missing or unreadable, and
    /// `UnsupportedFormat` when the signature, container or codec is not supported.
    pub fn open(path: &Path, block_frames: usize) -> Result<Self> {
        if block_frames == 0 {
            return Err(AudioError::DecodeError("block size must be positive".to_string()));
        }
        if !path.exists() {
            return Err(AudioError::FileUnreadable(format!(
                "{}: no such file",
                path.display()
            )));
        }

        let family = DecoderFamily::sniff(path)?;
        let file = File::open(path)
            .map_err(|e| AudioError::FileUnreadable(format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => hint.with_extension(ext),
            None => hint.with_extension(family.extension_hint()),
        };

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::UnsupportedFormat(format!("failed to probe file: {}", e)))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| AudioError::UnsupportedFormat("no audio tracks found".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AudioError::UnsupportedFormat("unknown sample rate".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map_or(OUTPUT_CHANNELS, |c| c.count() as u16);
        let duration = track
            .codec_params
            .n_frames
            .map(|n| Duration::from_secs_f64(n as f64 / f64::from(sample_rate)));
        let track_id = track.id;
        let time_base = track.codec_params.time_base;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                AudioError::UnsupportedFormat(format!("no decoder for codec: {}", e))
            })?;

        debug!(
            path = %path.display(),
            family = family.name(),
            sample_rate,
            channels,
            "opened stream"
        );

        Ok(Self {
            stream: StreamState {
                format,
                decoder,
                track_id,
                time_base,
            },
            properties: StreamProperties {
                sample_rate,
                channels,
                duration,
                family,
            },
            block_frames,
            pending: VecDeque::with_capacity(block_frames * 4),
            next_frame: 0,
            end_of_stream: false,
        })
    }

    /// Properties of the open stream
    pub fn properties(&self) -> StreamProperties {
        self.properties
    }

    /// Codec family the file was opened as
    pub fn family(&self) -> DecoderFamily {
        self.properties.family
    }

    /// Frames per block
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Stream position of the next block to be returned
    pub fn position(&self) -> Duration {
        Duration::from_secs_f64(self.next_frame as f64 / f64::from(self.properties.sample_rate))
    }

    /// Decode the next block
    ///
    /// Returns `Ok(None)` at end of stream. The final block is zero-padded to
    /// full length with `valid_frames` marking the decoded part.
    ///
    /// # Errors
    /// `DecodeError` when a packet fails to decode. That packet is skipped and
    /// the next call continues with the following one.
    pub fn read_block(&mut self) -> Result<Option<AudioBlock>> {
        let block_samples = self.block_frames * usize::from(OUTPUT_CHANNELS);

        loop {
            if self.pending.len() >= block_samples {
                return Ok(Some(self.take_block(block_samples)));
            }
            if self.end_of_stream {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let available = self.pending.len();
                let mut block = self.take_block(available);
                block.pad_to(self.block_frames);
                return Ok(Some(block));
            }

            let packet = match self.stream.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.end_of_stream = true;
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.stream.decoder.reset();
                    continue;
                }
                Err(e) => {
                    warn!("Packet read failed: {}", e);
                    return Err(AudioError::DecodeError(format!("packet read failed: {}", e)));
                }
            };

            if packet.track_id() != self.stream.track_id {
                continue;
            }

            let packet_frame = self.ts_to_frame(packet.ts());
            let decoded = match self.stream.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.end_of_stream = true;
                    continue;
                }
                Err(e) => {
                    warn!(frame = packet_frame, "Skipping undecodable packet: {}", e);
                    return Err(AudioError::DecodeError(format!(
                        "packet at frame {}: {}",
                        packet_frame, e
                    )));
                }
            };

            if decoded.frames() == 0 {
                continue;
            }

            // Realign with the container clock whenever nothing is pending, so
            // skipped packets and seeks never shift later offsets.
            if self.pending.is_empty() {
                self.next_frame = packet_frame;
            }

            let mut converted = decoded.make_equivalent::<f32>();
            decoded.convert(&mut converted);
            downmix_to_stereo(&converted, &mut self.pending);
        }
    }

    /// Seek to a position, clamped to the stream duration
    ///
    /// Pending samples are discarded. Returns the position actually landed on.
    pub fn seek(&mut self, position: Duration) -> Result<Duration> {
        let target = match self.properties.duration {
            Some(duration) => position.min(duration),
            None => position,
        };

        let time = Time::new(target.as_secs(), f64::from(target.subsec_nanos()) / 1e9);
        let seeked = self
            .stream
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.stream.track_id),
                },
            )
            .map_err(|e| AudioError::SeekError(format!("seek to {:?} failed: {}", target, e)))?;

        self.stream.decoder.reset();
        self.pending.clear();
        self.end_of_stream = false;
        self.next_frame = self.ts_to_frame(seeked.actual_ts);

        let actual = self.position();
        debug!(requested = ?position, actual = ?actual, "seeked");
        Ok(actual)
    }

    fn take_block(&mut self, samples: usize) -> AudioBlock {
        let data: Vec<f32> = self.pending.drain(..samples).collect();
        let block = AudioBlock::new(
            data,
            self.properties.sample_rate,
            OUTPUT_CHANNELS,
            self.next_frame,
        );
        self.next_frame += block.valid_frames as u64;
        block
    }

    /// Convert a container timestamp to a frame index at the stream rate
    fn ts_to_frame(&self, ts: u64) -> u64 {
        match self.stream.time_base {
            Some(tb) if tb.denom != 0 => {
                let seconds = ts as f64 * f64::from(tb.numer) / f64::from(tb.denom);
                (seconds * f64::from(self.properties.sample_rate)).round() as u64
            }
            _ => ts,
        }
    }
}

/// Append a planar buffer to `out` as interleaved stereo
///
/// Mono is duplicated. Anything wider is folded down with ITU-R BS.775
/// coefficients, assuming the usual L, R, C, LFE, SL, SR ordering.
fn downmix_to_stereo(buf: &AudioBuffer<f32>, out: &mut VecDeque<f32>) {
    let frames = buf.frames();
    let channels = buf.spec().channels.count();

    match channels {
        0 => out.extend(std::iter::repeat(0.0).take(frames * 2)),
        1 => {
            for &s in buf.chan(0) {
                out.push_back(s);
                out.push_back(s);
            }
        }
        2 => {
            for (&l, &r) in buf.chan(0).iter().zip(buf.chan(1)) {
                out.push_back(l);
                out.push_back(r);
            }
        }
        _ => {
            // (left gain, right gain) per source channel
            let weights: Vec<(f32, f32)> = (0..channels)
                .map(|ch| match (channels, ch) {
                    (_, 0) => (1.0, 0.0),
                    (_, 1) => (0.0, 1.0),
                    // Quad: L, R, SL, SR
                    (4, 2) => (CENTER_MIX, 0.0),
                    (4, 3) => (0.0, CENTER_MIX),
                    (_, 2) | (6.., 3) => (CENTER_MIX, CENTER_MIX),
                    // 5.0: L, R, C, SL, SR
                    (5, 3) => (CENTER_MIX, 0.0),
                    (5, 4) => (0.0, CENTER_MIX),
                    (_, 4) => (CENTER_MIX, 0.0),
                    (_, 5) => (0.0, CENTER_MIX),
                    _ => (0.0, 0.0),
                })
                .collect();

            for frame in 0..frames {
                let (mut left, mut right) = (0.0_f32, 0.0_f32);
                for (ch, &(wl, wr)) in weights.iter().enumerate() {
                    let sample = buf.chan(ch)[frame];
                    left += sample * wl;
                    right += sample * wr;
                }
                out.push_back(left.clamp(-1.0, 1.0));
                out.push_back(right.clamp(-1.0, 1.0));
            }
        }
    }
}
