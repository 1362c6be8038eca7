//! Where rendered audio goes, and the thread that renders it.

use crate::dsp::amp_to_db;
use crate::error::SoundscapeError;
use crate::synth::{self, SharedSynth};
use crate::types::{AudioClock, StereoSample};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Frames rendered per block.
pub const RENDER_BLOCK: usize = 1024;

/// Consumer of rendered stereo blocks.
pub trait AudioSink: Send {
    fn name(&self) -> &str;
    fn write(&mut self, block: &[StereoSample]) -> Result<(), SoundscapeError>;
    /// Flush and close. Called once when rendering stops.
    fn finish(&mut self) -> Result<(), SoundscapeError>;
}

/// Discards everything. Keeps the audio clock running when nothing listens.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn write(&mut self, _block: &[StereoSample]) -> Result<(), SoundscapeError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SoundscapeError> {
        Ok(())
    }
}

/// Records to a stereo 32-bit float WAV, with a JSON stats file next to it.
pub struct WavRecorder {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    frames: u64,
    peak: f32,
    sum_squares: f64,
}

impl WavRecorder {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, SoundscapeError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)?;
        info!("Recording → {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            sample_rate,
            frames: 0,
            peak: 0.0,
            sum_squares: 0.0,
        })
    }

    pub fn stats_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl AudioSink for WavRecorder {
    fn name(&self) -> &str {
        "wav"
    }

    fn write(&mut self, block: &[StereoSample]) -> Result<(), SoundscapeError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        for &[l, r] in block {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
            self.peak = self.peak.max(l.abs()).max(r.abs());
            self.sum_squares += (l as f64 * l as f64 + r as f64 * r as f64) / 2.0;
        }
        self.frames += block.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SoundscapeError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        writer.finalize()?;

        let rms = if self.frames > 0 {
            (self.sum_squares / self.frames as f64).sqrt() as f32
        } else {
            0.0
        };
        let stats = json!({
            "file": self.path.file_name().map(|n| n.to_string_lossy().into_owned()),
            "sample_rate": self.sample_rate,
            "channels": 2,
            "frames": self.frames,
            "duration_s": self.frames as f64 / self.sample_rate as f64,
            "peak": self.peak,
            "peak_db": amp_to_db(self.peak),
            "rms_db": amp_to_db(rms),
        });
        fs::write(self.stats_path(), serde_json::to_string_pretty(&stats)?)?;
        info!(
            "Recording saved: {:.1}s, peak {:.1} dBFS → {:?}",
            self.frames as f64 / self.sample_rate as f64,
            amp_to_db(self.peak),
            self.path
        );
        Ok(())
    }
}

/// Render the synth block by block into `sink`, advancing `clock`.
///
/// With `paced`, blocks are produced in real time; otherwise as fast as the
/// synth allows (offline rendering and tests).
pub fn spawn_renderer(
    synth: SharedSynth,
    clock: AudioClock,
    mut sink: Box<dyn AudioSink>,
    running: Arc<AtomicBool>,
    paced: bool,
) -> Result<JoinHandle<()>, SoundscapeError> {
    thread::Builder::new()
        .name("audio-render".into())
        .spawn(move || {
            info!("Audio renderer → {} sink", sink.name());
            let block_time =
                Duration::from_secs_f64(RENDER_BLOCK as f64 / clock.sample_rate() as f64);
            let mut block = vec![[0.0f32; 2]; RENDER_BLOCK];
            let mut deadline = Instant::now();
            let mut blocks: u64 = 0;

            while running.load(Ordering::Acquire) {
                synth::lock(&synth).render(&mut block, clock.now());
                if let Err(e) = sink.write(&block) {
                    error!("Audio sink {} failed: {}", sink.name(), e);
                    break;
                }
                clock.advance(RENDER_BLOCK as u64);
                blocks += 1;

                if blocks % 500 == 0 {
                    debug!("Rendered {} blocks ({:.1}s)", blocks, clock.now());
                }

                if paced {
                    deadline += block_time;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
            }

            if let Err(e) = sink.finish() {
                error!("Audio sink {} did not close cleanly: {}", sink.name(), e);
            }
            debug!("Audio renderer exiting after {} blocks", blocks);
        })
        .map_err(|e| SoundscapeError::AudioOutput(format!("render thread: {e}")))
}
