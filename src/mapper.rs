//! Video frames as raw audio: one mono sample per pixel.
//!
//! The frame loop writes a whole new buffer per frame; the audio side loops
//! over whichever buffer it holds and only swaps at block boundaries, so
//! neither side ever sees a half-written buffer and neither blocks the other.

use crate::error::SoundscapeError;
use crate::types::Frame;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::trace;

/// Buffers allowed to wait for the reader; later frames are dropped until it catches up.
const HANDOFF_DEPTH: usize = 2;

/// Convert a frame to signed samples: `2 * avg / 255 - 1` per pixel.
pub fn frame_to_samples(frame: &Frame) -> Vec<f32> {
    frame.intensities().map(|avg| 2.0 * avg / 255.0 - 1.0).collect()
}

/// Create a connected writer/reader pair for buffers of `len` samples.
pub fn excitation_channel(len: usize) -> (FrameAudioMapper, ExcitationReader) {
    let (tx, rx) = bounded(HANDOFF_DEPTH);
    (
        FrameAudioMapper { tx, len },
        ExcitationReader {
            rx,
            buffer: vec![0.0; len],
            position: 0,
        },
    )
}

/// Writer side, owned by the frame loop.
pub struct FrameAudioMapper {
    tx: Sender<Vec<f32>>,
    len: usize,
}

impl FrameAudioMapper {
    pub fn buffer_len(&self) -> usize {
        self.len
    }

    /// Replace the excitation buffer with this frame's pixels.
    ///
    /// Never blocks: if the reader is behind, the frame is dropped and the
    /// reader keeps looping its current buffer.
    pub fn feed(&self, frame: &Frame) -> Result<(), SoundscapeError> {
        if frame.pixel_count() != self.len {
            return Err(SoundscapeError::FrameSize {
                expected: self.len * 4,
                actual: frame.data.len(),
            });
        }
        match self.tx.try_send(frame_to_samples(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Excitation hand-off full, frame skipped"),
            Err(TrySendError::Disconnected(_)) => trace!("Excitation reader gone"),
        }
        Ok(())
    }
}

/// Reader side, owned by the synth. Loops its buffer forever.
pub struct ExcitationReader {
    rx: Receiver<Vec<f32>>,
    buffer: Vec<f32>,
    position: usize,
}

impl ExcitationReader {
    /// Adopt the newest buffer the writer has published, if any.
    /// The read position carries over so the loop keeps running.
    pub fn swap_in_latest(&mut self) -> bool {
        let mut swapped = false;
        while let Ok(next) = self.rx.try_recv() {
            if !next.is_empty() {
                self.buffer = next;
                swapped = true;
            }
        }
        if swapped && self.position >= self.buffer.len() {
            self.position = 0;
        }
        swapped
    }

    /// Fill `out` with consecutive looped samples.
    pub fn read(&mut self, out: &mut [f32]) {
        if self.buffer.is_empty() {
            out.fill(0.0);
            return;
        }
        for sample in out.iter_mut() {
            *sample = self.buffer[self.position];
            self.position += 1;
            if self.position == self.buffer.len() {
                self.position = 0;
            }
        }
    }

    pub fn current(&self) -> &[f32] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_frame_is_full_scale() {
        let frame = Frame::filled(32, 24, [255, 255, 255, 255]);
        assert!(frame_to_samples(&frame).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_black_transparent_frame_is_negative_full_scale() {
        let frame = Frame::filled(32, 24, [0, 0, 0, 0]);
        let samples = frame_to_samples(&frame);
        assert_eq!(samples.len(), 32 * 24);
        assert!(samples.iter().all(|&s| s == -1.0));
    }

    #[test]
    fn test_reader_sees_new_buffer_at_swap() {
        let (mapper, mut reader) = excitation_channel(4);
        let mut out = [9.0; 6];
        reader.read(&mut out);
        assert_eq!(out, [0.0; 6]);

        mapper.feed(&Frame::filled(2, 2, [255, 255, 255, 255])).unwrap();
        // Not visible until the reader swaps
        reader.read(&mut out);
        assert_eq!(out, [0.0; 6]);
        assert!(reader.swap_in_latest());
        reader.read(&mut out);
        assert_eq!(out, [1.0; 6]);
    }

    #[test]
    fn test_feed_rejects_wrong_size_and_never_blocks() {
        let (mapper, mut reader) = excitation_channel(4);
        assert!(mapper.feed(&Frame::filled(3, 3, [0; 4])).is_err());
        for _ in 0..10 {
            mapper.feed(&Frame::filled(2, 2, [0, 0, 0, 0])).unwrap();
        }
        assert!(reader.swap_in_latest());
        assert_eq!(reader.current(), &[-1.0; 4]);
    }
}
