use crate::config::{MasterBusConfig, SoundscapeConfig};
use crate::drift::{DriftSchedule, PeakId};
use crate::dsp::{Biquad, BiquadCoefficients, Compressor};
use crate::mapper::ExcitationReader;
use crate::note::{Instrument, InstrumentView};
use crate::types::StereoSample;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Synth shared between the frame loop, the drift driver and the audio renderer.
pub type SharedSynth = Arc<Mutex<Synth>>;

/// Lock the synth, recovering the data if another thread panicked while holding it.
pub fn lock(synth: &SharedSynth) -> MutexGuard<'_, Synth> {
    synth.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Output stage: input gain → high-shelf cut → compressor → output gain.
pub struct MasterBus {
    input_gain: f32,
    output_gain: f32,
    shelf: [Biquad; 2],
    compressor: Compressor,
}

impl MasterBus {
    pub fn new(cfg: &MasterBusConfig, sample_rate: f32) -> Self {
        let shelf =
            BiquadCoefficients::high_shelf(cfg.shelf_frequency_hz, cfg.shelf_gain_db, sample_rate);
        Self {
            input_gain: cfg.input_gain,
            output_gain: cfg.output_gain,
            shelf: [Biquad::new(shelf), Biquad::new(shelf)],
            compressor: Compressor::new(cfg.compressor_threshold_db, cfg.compressor_ratio, sample_rate),
        }
    }

    #[inline]
    pub fn process(&mut self, frame: StereoSample) -> StereoSample {
        let eq = [
            self.shelf[0].process(frame[0] * self.input_gain),
            self.shelf[1].process(frame[1] * self.input_gain),
        ];
        let [l, r] = self.compressor.process(eq);
        [l * self.output_gain, r * self.output_gain]
    }
}

/// The audio graph: shared excitation → every note's resonance peaks → master bus.
pub struct Synth {
    instrument: Instrument,
    excitation: ExcitationReader,
    drift: DriftSchedule,
    master: MasterBus,
    sample_rate: u32,
    rng: StdRng,
    scratch: Vec<f32>,
}

impl Synth {
    pub fn new(config: &SoundscapeConfig, excitation: ExcitationReader) -> Self {
        Self::with_rng(config, excitation, StdRng::from_os_rng())
    }

    /// Build with a caller-supplied generator, for reproducible runs.
    pub fn with_rng(config: &SoundscapeConfig, excitation: ExcitationReader, mut rng: StdRng) -> Self {
        let instrument = Instrument::new(
            config.lowest_note,
            config.highest_note,
            &config.scale,
            &mut rng,
        );

        let mut drift = DriftSchedule::new();
        for (n, note) in instrument.notes().iter().enumerate() {
            for p in 0..note.resonances().len() {
                drift.register(PeakId { note: n, peak: p }, config.drift_period(), Duration::ZERO);
            }
        }
        debug!(
            "Synth: {} notes, {} drifting peaks",
            instrument.len(),
            drift.len()
        );

        Self {
            instrument,
            excitation,
            drift,
            master: MasterBus::new(&config.master, config.sample_rate as f32),
            sample_rate: config.sample_rate,
            rng,
            scratch: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Trigger the note in pitch bucket `index` at audio time `now`.
    pub fn play(&mut self, index: usize, velocity: f32, now: f64) -> bool {
        self.instrument.play(index, velocity, now)
    }

    /// Tick every peak whose drift period has elapsed at session time `now`.
    pub fn run_drift(&mut self, now: Duration) -> usize {
        let due = self.drift.due(now);
        for id in &due {
            if let Some(peak) = self
                .instrument
                .notes_mut()
                .get_mut(id.note)
                .and_then(|n| n.resonance_mut(id.peak))
            {
                peak.tick(&mut self.rng);
            }
        }
        due.len()
    }

    pub fn next_drift_deadline(&mut self) -> Option<Duration> {
        self.drift.next_deadline()
    }

    /// Stop drifting a peak, e.g. when tearing the instrument down.
    pub fn stop_drift(&mut self, id: PeakId) -> bool {
        self.drift.deregister(id)
    }

    /// Render `out.len()` frames starting at audio time `start`.
    pub fn render(&mut self, out: &mut [StereoSample], start: f64) {
        self.excitation.swap_in_latest();
        self.scratch.resize(out.len(), 0.0);
        self.excitation.read(&mut self.scratch);

        out.fill([0.0, 0.0]);
        let sr = self.sample_rate as f32;
        for note in self.instrument.notes_mut() {
            note.render(&self.scratch, start, sr, out);
        }
        for frame in out.iter_mut() {
            *frame = self.master.process(*frame);
        }
    }

    pub fn view_at(&self, t: f64) -> InstrumentView {
        self.instrument.view_at(t)
    }
}
