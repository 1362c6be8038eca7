use crate::error::SoundscapeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ─── Video frames ───────────────────────────────────────────────────────────

/// One RGBA video frame, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Microseconds since session start
    pub timestamp_us: u64,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap raw RGBA bytes. The buffer must hold exactly `width * height * 4` bytes.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, SoundscapeError> {
        let expected = width * height * 4;
        if data.len() != expected {
            return Err(SoundscapeError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            timestamp_us: 0,
            width,
            height,
            data,
        })
    }

    /// A frame where every pixel has the same RGBA value.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            timestamp_us: 0,
            width,
            height,
            data,
        }
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Unweighted average of the four channels of pixel `i`, on a 0–255 scale.
    #[inline]
    pub fn intensity(&self, i: usize) -> f32 {
        let p = &self.data[i * 4..i * 4 + 4];
        (p[0] as f32 + p[1] as f32 + p[2] as f32 + p[3] as f32) / 4.0
    }

    /// Per-pixel intensities in row-major order.
    pub fn intensities(&self) -> impl Iterator<Item = f32> + '_ {
        self.data
            .chunks_exact(4)
            .map(|p| (p[0] as f32 + p[1] as f32 + p[2] as f32 + p[3] as f32) / 4.0)
    }

    /// Flip left-to-right, as a selfie view. A malformed frame comes back
    /// unflipped.
    pub fn mirrored(&self) -> Self {
        if !self.is_well_formed() {
            return self.clone();
        }
        let mut data = vec![0u8; self.data.len()];
        let row_bytes = self.width * 4;
        for y in 0..self.height {
            let row = &self.data[y * row_bytes..(y + 1) * row_bytes];
            let out = &mut data[y * row_bytes..(y + 1) * row_bytes];
            for x in 0..self.width {
                let src = (self.width - 1 - x) * 4;
                out[x * 4..x * 4 + 4].copy_from_slice(&row[src..src + 4]);
            }
        }
        Self {
            timestamp_us: self.timestamp_us,
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Paint an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, rgba: [u8; 4]) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for py in y.min(self.height)..y_end {
            for px in x.min(self.width)..x_end {
                let i = (py * self.width + px) * 4;
                self.data[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// True when the byte length matches the dimensions. Fields are public,
    /// so a frame built by hand may not hold this.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width * self.height * 4
    }

    /// `FrameSize` error unless the frame is well formed.
    pub fn check_size(&self) -> Result<(), SoundscapeError> {
        if self.is_well_formed() {
            Ok(())
        } else {
            Err(SoundscapeError::FrameSize {
                expected: self.width * self.height * 4,
                actual: self.data.len(),
            })
        }
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>10}µs  {}x{} RGBA ({} bytes)",
            self.timestamp_us,
            self.width,
            self.height,
            self.data.len()
        )
    }
}

// ─── Motion grid ────────────────────────────────────────────────────────────

/// Grid partition and sensitivity for motion detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    /// Amplitude buckets, top of the frame first
    pub rows: usize,
    /// Pitch buckets, one per note
    pub columns: usize,
    /// Fraction of changed pixels (0..1) that counts as motion in a cell,
    /// and above which the whole frame is discarded as noise.
    pub threshold: f32,
}

/// Motion found in one grid cell. At most one per column per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Pitch bucket, 0 = leftmost
    pub column: usize,
    /// Amplitude bucket, 0 = top of frame (loudest)
    pub row: usize,
}

impl TriggerEvent {
    /// Velocity for this trigger: motion near the top is loud, near the bottom quiet.
    pub fn velocity(&self, rows: usize) -> f32 {
        if rows == 0 {
            return 0.0;
        }
        1.0 - self.row as f32 / rows as f32
    }
}

// ─── Instrument ─────────────────────────────────────────────────────────────

/// One pitch of the instrument, with the bounds of the range it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSpec {
    pub midi: i32,
    pub lowest_note: i32,
    pub highest_note: i32,
}

impl NoteSpec {
    /// Position of this note within the instrument's range, 0.0 (lowest) to 1.0 (highest).
    pub fn normalized_pitch(&self) -> f32 {
        let span = (self.highest_note - self.lowest_note) as f32;
        if span <= 0.0 {
            return 0.0;
        }
        (self.midi - self.lowest_note) as f32 / span
    }
}

// ─── Audio ──────────────────────────────────────────────────────────────────

/// Interleaved left/right sample pair.
pub type StereoSample = [f32; 2];

/// Monotonic audio clock: counts rendered sample frames.
///
/// The render thread (or output callback) is the only writer; envelope
/// scheduling reads `now()` to place ramps on the same timeline the
/// renderer evaluates them on.
#[derive(Clone)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far.
    pub fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Wall clock for the session, used for frame timestamps and drift ticks.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Per-pixel intensity change (0–255 scale) that marks a pixel as active.
pub const PIXEL_ACTIVITY_THRESHOLD: f32 = 25.0;

/// Resonance peaks per note: the fundamental and the 2nd harmonic.
pub const PEAKS_PER_NOTE: usize = 2;

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
