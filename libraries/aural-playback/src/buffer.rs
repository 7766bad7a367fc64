//! Playback buffer
//!
//! Bounded block queue between the decode worker and the device output.
//! The producer side may block (backpressure) or fail fast; the consumer side
//! never blocks and gets silence on underrun.
//!
//! Every block is tagged with the flush generation it was pushed in. A flush
//! bumps the generation and drains the queue, and any block from an older
//! generation that races past the drain is discarded on pop. Blocks therefore
//! reach the device in push order and never from before the last flush.

use crate::error::{PlaybackError, Result};
use crate::types::PushPolicy;
use aural_core::AudioBlock;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// How long a blocking push waits before re-checking its abort condition
const PUSH_POLL: Duration = Duration::from_millis(5);

/// A block the buffer did not take, handed back with the reason
#[derive(Debug)]
pub struct Rejected {
    /// The block, unchanged
    pub block: AudioBlock,
    /// `BufferFull`, `Cancelled` or `EngineShutDown`
    pub error: PlaybackError,
}

/// Bounded, generation-tagged block queue
#[derive(Debug)]
pub struct PlaybackBuffer {
    sender: Sender<(u64, AudioBlock)>,
    receiver: Receiver<(u64, AudioBlock)>,
    capacity: usize,
    policy: PushPolicy,
    generation: AtomicU64,
    underruns: AtomicU64,
    /// Stream frame just past the last popped block
    playhead: AtomicU64,
    playhead_rate: AtomicU32,
    /// Shape of the silence handed out on underrun
    silence_frames: AtomicUsize,
    silence_rate: AtomicU32,
    silence_channels: AtomicU32,
}

impl PlaybackBuffer {
    /// Create a buffer holding at most `capacity` blocks (minimum 1)
    pub fn new(capacity: usize, policy: PushPolicy) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            policy,
            generation: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            playhead: AtomicU64::new(0),
            playhead_rate: AtomicU32::new(0),
            silence_frames: AtomicUsize::new(1024),
            silence_rate: AtomicU32::new(44_100),
            silence_channels: AtomicU32::new(2),
        }
    }

    /// Configured capacity in blocks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Full-buffer policy
    pub fn policy(&self) -> PushPolicy {
        self.policy
    }

    /// Blocks currently queued (may include stale ones awaiting discard)
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Underruns counted since creation
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Current flush generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Set the stream format used for silence and position reporting
    pub fn set_format(&self, block_frames: usize, sample_rate: u32, channels: u16) {
        self.silence_frames.store(block_frames.max(1), Ordering::Relaxed);
        self.silence_rate.store(sample_rate, Ordering::Relaxed);
        self.silence_channels
            .store(u32::from(channels.max(1)), Ordering::Relaxed);
        self.playhead_rate.store(sample_rate, Ordering::Relaxed);
    }

    /// Sample rate of the current stream, 0 before the first `set_format`
    pub fn sample_rate(&self) -> u32 {
        self.playhead_rate.load(Ordering::Relaxed)
    }

    /// Queue a block according to the configured policy
    ///
    /// # Errors
    /// `BufferFull` when full under `FailFast`, `EngineShutDown` if the
    /// consumer side is gone.
    pub fn push(&self, block: AudioBlock) -> Result<()> {
        self.push_until(block, || false).map_err(|rejected| rejected.error)
    }

    /// Queue a block, giving up when `abort` returns `true`
    ///
    /// Under `Block` the producer waits for space in short slices and polls
    /// `abort` between them, so stop and seek are honored within one slice.
    /// A refused block is handed back so the caller can retry it later.
    pub fn push_until(
        &self,
        block: AudioBlock,
        mut abort: impl FnMut() -> bool,
    ) -> std::result::Result<(), Rejected> {
        let mut item = (self.generation(), block);
        let reject = |block, error| Err(Rejected { block, error });
        match self.policy {
            PushPolicy::FailFast => match self.sender.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full((_, block))) => reject(
                    block,
                    PlaybackError::BufferFull {
                        capacity: self.capacity,
                    },
                ),
                Err(TrySendError::Disconnected((_, block))) => {
                    reject(block, PlaybackError::EngineShutDown)
                }
            },
            PushPolicy::Block => loop {
                if abort() {
                    return reject(item.1, PlaybackError::Cancelled);
                }
                match self.sender.send_timeout(item, PUSH_POLL) {
                    Ok(()) => return Ok(()),
                    Err(SendTimeoutError::Timeout(returned)) => item = returned,
                    Err(SendTimeoutError::Disconnected((_, block))) => {
                        return reject(block, PlaybackError::EngineShutDown)
                    }
                }
            },
        }
    }

    /// Take the next current-generation block without blocking
    ///
    /// `None` means underrun; it is counted. Does not allocate.
    pub fn try_pop(&self) -> Option<AudioBlock> {
        let current = self.generation();
        while let Ok((generation, block)) = self.receiver.try_recv() {
            if generation != current {
                trace!(generation, current, "discarding stale block");
                continue;
            }
            if let Some(end) = block.end_offset() {
                self.playhead.store(end, Ordering::Release);
            }
            return Some(block);
        }
        self.underruns.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Take the next block, or a silence block on underrun
    pub fn pop(&self) -> AudioBlock {
        self.try_pop().unwrap_or_else(|| self.silence())
    }

    /// Silence block matching the current stream format
    pub fn silence(&self) -> AudioBlock {
        let channels = u16::try_from(self.silence_channels.load(Ordering::Relaxed)).unwrap_or(2);
        AudioBlock::silence(
            self.silence_frames.load(Ordering::Relaxed),
            self.silence_rate.load(Ordering::Relaxed),
            channels,
        )
    }

    /// Discard everything queued and invalidate blocks still in flight
    ///
    /// Returns the number of blocks dropped.
    pub fn flush(&self) -> usize {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let dropped = self.receiver.try_iter().count();
        debug!(generation, dropped, "playback buffer flushed");
        dropped
    }

    /// Move the playhead (after a seek or load)
    pub fn reset_playhead(&self, frame: u64) {
        self.playhead.store(frame, Ordering::Release);
    }

    /// Stream frame just past the last block handed to the device
    pub fn playhead_frame(&self) -> u64 {
        self.playhead.load(Ordering::Acquire)
    }

    /// Playback position of the last block handed to the device
    pub fn position(&self) -> Duration {
        let rate = self.playhead_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.playhead_frame() as f64 / f64::from(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn block(offset: u64) -> AudioBlock {
        AudioBlock::new(vec![0.25; 8], 44_100, 2, offset)
    }

    #[test]
    fn fifo_order() {
        let buffer = PlaybackBuffer::new(4, PushPolicy::FailFast);
        for i in 0..3 {
            buffer.push(block(i * 4)).unwrap();
        }
        let offsets: Vec<_> = (0..3)
            .map(|_| buffer.try_pop().unwrap().frame_offset.unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[test]
    fn fail_fast_when_full() {
        let buffer = PlaybackBuffer::new(2, PushPolicy::FailFast);
        buffer.push(block(0)).unwrap();
        buffer.push(block(4)).unwrap();
        assert!(matches!(
            buffer.push(block(8)),
            Err(PlaybackError::BufferFull { capacity: 2 })
        ));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn empty_pop_is_silence_and_counted() {
        let buffer = PlaybackBuffer::new(2, PushPolicy::Block);
        buffer.set_format(512, 48_000, 2);

        let silence = buffer.pop();
        assert!(silence.is_silence());
        assert_eq!(silence.frames(), 512);
        assert_eq!(silence.sample_rate, 48_000);
        assert_eq!(buffer.underruns(), 1);
    }

    #[test]
    fn flush_discards_queued_blocks() {
        let buffer = PlaybackBuffer::new(4, PushPolicy::Block);
        buffer.push(block(0)).unwrap();
        buffer.push(block(4)).unwrap();

        assert_eq!(buffer.flush(), 2);
        assert!(buffer.try_pop().is_none());

        buffer.push(block(100)).unwrap();
        assert_eq!(buffer.try_pop().unwrap().frame_offset, Some(100));
    }

    #[test]
    fn blocking_push_can_be_cancelled() {
        let buffer = PlaybackBuffer::new(1, PushPolicy::Block);
        buffer.push(block(0)).unwrap();

        let mut polls = 0;
        let rejected = buffer
            .push_until(block(4), || {
                polls += 1;
                polls > 3
            })
            .unwrap_err();
        assert!(matches!(rejected.error, PlaybackError::Cancelled));
        assert_eq!(rejected.block.frame_offset, Some(4));
    }

    #[test]
    fn blocking_push_waits_for_consumer() {
        let buffer = Arc::new(PlaybackBuffer::new(1, PushPolicy::Block));
        buffer.push(block(0)).unwrap();

        let consumer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            consumer.try_pop()
        });

        buffer.push(block(4)).unwrap();
        assert_eq!(handle.join().unwrap().unwrap().frame_offset, Some(0));
        assert_eq!(buffer.try_pop().unwrap().frame_offset, Some(4));
    }

    #[test]
    fn playhead_follows_pops() {
        let buffer = PlaybackBuffer::new(4, PushPolicy::Block);
        buffer.set_format(4, 44_100, 2);
        buffer.push(block(44_100)).unwrap();
        buffer.try_pop().unwrap();

        assert_eq!(buffer.playhead_frame(), 44_104);
        assert!((buffer.position().as_secs_f64() - 44_104.0 / 44_100.0).abs() < 1e-9);

        buffer.reset_playhead(0);
        assert_eq!(buffer.position(), Duration::ZERO);
    }
}
