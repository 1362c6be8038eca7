//! Session lifecycle: waits Idle for the start gesture, then wires up and
//! runs every thread until shutdown.

use crate::audio_sink::{spawn_renderer, AudioSink, NullSink, WavRecorder};
use crate::capture::{acquire, spawn_capture, SourceKind};
use crate::config::SoundscapeConfig;
use crate::console_display::ConsoleDisplay;
use crate::coordinator::{Coordinator, FrameReport};
use crate::error::SoundscapeError;
use crate::mapper::excitation_channel;
use crate::surface::Canvas;
use crate::synth::{self, SharedSynth, Synth};
use crate::types::{AudioClock, Frame, SessionClock};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest the drift driver sleeps, so shutdown is noticed promptly.
const DRIFT_MAX_SLEEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the start gesture
    Idle,
    Running,
}

/// Where audio goes and which optional outputs run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Write the soundscape to this WAV file
    pub record: Option<PathBuf>,
    /// Play on the default output device (needs the `audio` feature)
    pub live_audio: bool,
    /// Show the picture in the terminal
    pub console: bool,
    /// Seed every random generator for a reproducible session
    pub seed: Option<u64>,
    /// Run capture and audio as fast as possible instead of in real time
    pub unpaced: bool,
    /// Observer for per-frame results
    pub reports: Option<Sender<FrameReport>>,
    /// Viewport size changes for the canvas
    pub viewport: Option<Receiver<(usize, usize)>>,
}

pub struct Soundscape {
    config: SoundscapeConfig,
    options: RunOptions,
    state: SessionState,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    synth: Option<SharedSynth>,
    audio_clock: Option<AudioClock>,
}

impl Soundscape {
    pub fn new(config: SoundscapeConfig, options: RunOptions) -> Self {
        Self {
            config,
            options,
            state: SessionState::Idle,
            running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            synth: None,
            audio_clock: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SoundscapeConfig {
        &self.config
    }

    /// The running synth, for inspection.
    pub fn synth(&self) -> Option<&SharedSynth> {
        self.synth.as_ref()
    }

    pub fn audio_clock(&self) -> Option<&AudioClock> {
        self.audio_clock.as_ref()
    }

    /// The start gesture. Returns `Ok(true)` when this call started the
    /// session and `Ok(false)` if it was already running. On error the
    /// session stays Idle and the gesture may be repeated.
    pub fn start(&mut self, kind: SourceKind) -> Result<bool, SoundscapeError> {
        if self.state == SessionState::Running {
            info!("Already running, start ignored");
            return Ok(false);
        }
        match self.launch(kind) {
            Ok(()) => {
                self.state = SessionState::Running;
                info!("Soundscape running ({} source)", kind);
                Ok(true)
            }
            Err(e) => {
                error!("Start failed: {}", e);
                self.stop_threads();
                Err(e)
            }
        }
    }

    fn launch(&mut self, kind: SourceKind) -> Result<(), SoundscapeError> {
        self.config.validate()?;
        debug!("Config: {}", serde_json::to_string(&self.config)?);

        let session_clock = SessionClock::new();
        let seed = self.options.seed;
        let rng = |offset: u64| match seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(offset)),
            None => StdRng::from_os_rng(),
        };

        // Acquire the camera first: nothing else starts without it.
        let source = acquire(kind, &self.config, session_clock.clone(), seed)?;

        let (sink, device_rate) = self.open_sink()?;
        let mut config = self.config.clone();
        if let Some(rate) = device_rate {
            config.sample_rate = rate;
        }

        let (mapper, reader) = excitation_channel(config.frame_width * config.frame_height);
        let synth: SharedSynth = Arc::new(Mutex::new(Synth::with_rng(&config, reader, rng(1))));
        let audio_clock = AudioClock::new(config.sample_rate);
        self.running.store(true, Ordering::Release);
        let paced = !self.options.unpaced;

        // ─── Display (opt-in) ───────────────────────────────────────────
        let mut display_txs: Vec<Sender<Canvas>> = Vec::new();
        if self.options.console {
            let (tx, rx) = bounded::<Canvas>(2);
            display_txs.push(tx);
            let (fps, hz) = (config.frame_rate_hz, config.display_hz);
            self.handles.push(spawn_named("display", move || {
                ConsoleDisplay::new(rx, fps, hz, 96).run();
            })?);
        }

        // ─── Frame loop ─────────────────────────────────────────────────
        let (frame_tx, frame_rx) = bounded::<Frame>(4);
        let mut coordinator = Coordinator::new(
            frame_rx,
            synth.clone(),
            mapper,
            audio_clock.clone(),
            &config,
            rng(2),
        )
        .with_displays(display_txs);
        if let Some(tx) = self.options.reports.clone() {
            coordinator = coordinator.with_reports(tx);
        }
        if let Some(rx) = self.options.viewport.clone() {
            coordinator = coordinator.with_viewport(rx);
        }
        self.handles.push(spawn_named("coordinator", move || coordinator.run())?);

        // ─── Audio ──────────────────────────────────────────────────────
        // A device sink paces itself.
        let render_paced = paced && !self.options.live_audio;
        self.handles.push(spawn_renderer(
            synth.clone(),
            audio_clock.clone(),
            sink,
            self.running.clone(),
            render_paced,
        )?);

        // ─── Drift ──────────────────────────────────────────────────────
        let drift_synth = synth.clone();
        let drift_running = self.running.clone();
        let drift_clock = session_clock.clone();
        self.handles.push(spawn_named("drift", move || {
            run_drift(drift_synth, drift_clock, drift_running)
        })?);

        // ─── Capture ────────────────────────────────────────────────────
        self.handles
            .push(spawn_capture(source, frame_tx, self.running.clone(), paced)?);

        self.synth = Some(synth);
        self.audio_clock = Some(audio_clock);
        Ok(())
    }

    /// Pick the audio sink. The second value is a sample rate the sink
    /// imposes, if any.
    fn open_sink(&self) -> Result<(Box<dyn AudioSink>, Option<u32>), SoundscapeError> {
        if self.options.live_audio {
            return self.open_live_sink();
        }
        let sink: Box<dyn AudioSink> = match &self.options.record {
            Some(path) => Box::new(WavRecorder::create(path, self.config.sample_rate)?),
            None => Box::new(NullSink),
        };
        Ok((sink, None))
    }

    #[cfg(feature = "audio")]
    fn open_live_sink(&self) -> Result<(Box<dyn AudioSink>, Option<u32>), SoundscapeError> {
        if self.options.record.is_some() {
            warn!("Live audio selected, recording ignored");
        }
        let sink = crate::audio_output::CpalSink::open(self.config.sample_rate)?;
        let rate = sink.sample_rate();
        Ok((Box::new(sink), Some(rate)))
    }

    #[cfg(not(feature = "audio"))]
    fn open_live_sink(&self) -> Result<(Box<dyn AudioSink>, Option<u32>), SoundscapeError> {
        Err(SoundscapeError::CapabilityMissing {
            capability: crate::error::Capability::AudioOutput,
            detail: "built without the `audio` feature".into(),
        })
    }

    /// Stop every timing domain and wait for the threads to finish.
    pub fn shutdown(mut self) {
        self.stop_threads();
    }

    fn stop_threads(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        info!("Shutting down {} threads...", self.handles.len());
        self.running.store(false, Ordering::Release);
        for h in self.handles.drain(..) {
            let name = h.thread().name().unwrap_or("?").to_string();
            if h.join().is_err() {
                warn!("Thread {} panicked", name);
            }
        }
        info!("Shutdown complete");
    }
}

impl Drop for Soundscape {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<()>, SoundscapeError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| SoundscapeError::AcquisitionFailure {
            device: format!("{} thread", name),
            reason: e.to_string(),
        })
}

/// Drift driver: sleeps until the earliest peak is due, then ticks every
/// due peak. One thread for all peaks.
fn run_drift(synth: SharedSynth, clock: SessionClock, running: Arc<AtomicBool>) {
    let mut ticks: u64 = 0;
    while running.load(Ordering::Acquire) {
        let Some(deadline) = synth::lock(&synth).next_drift_deadline() else {
            debug!("Drift: nothing registered");
            break;
        };
        let now = clock.elapsed();
        if deadline > now {
            thread::sleep((deadline - now).min(DRIFT_MAX_SLEEP));
            continue;
        }
        ticks += synth::lock(&synth).run_drift(now) as u64;
    }
    debug!("Drift driver exiting after {} peak ticks", ticks);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SoundscapeConfig {
        SoundscapeConfig {
            frame_width: 32,
            frame_height: 24,
            lowest_note: 60,
            highest_note: 72,
            ..Default::default()
        }
    }

    #[test]
    fn test_camera_failure_stays_idle() {
        let mut app = Soundscape::new(small(), RunOptions::default());
        let err = app.start(SourceKind::Camera).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(app.state(), SessionState::Idle);
        assert!(app.synth().is_none());
        // The gesture can be repeated; still no camera
        assert!(app.start(SourceKind::Camera).is_err());
        assert_eq!(app.state(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_config_stays_idle() {
        let cfg = SoundscapeConfig {
            rows: 0,
            ..small()
        };
        let mut app = Soundscape::new(cfg, RunOptions::default());
        assert!(matches!(
            app.start(SourceKind::Simulated),
            Err(SoundscapeError::InvalidConfig(_))
        ));
        assert_eq!(app.state(), SessionState::Idle);
    }

    #[test]
    fn test_start_once_then_no_op() {
        let opts = RunOptions {
            seed: Some(1),
            ..Default::default()
        };
        let mut app = Soundscape::new(small(), opts);
        assert!(app.start(SourceKind::Simulated).unwrap());
        assert_eq!(app.state(), SessionState::Running);
        assert!(!app.start(SourceKind::Simulated).unwrap());
        assert!(!app.start(SourceKind::Camera).unwrap());
        app.shutdown();
    }

    #[cfg(not(feature = "audio"))]
    #[test]
    fn test_live_audio_needs_feature() {
        let opts = RunOptions {
            live_audio: true,
            ..Default::default()
        };
        let mut app = Soundscape::new(small(), opts);
        assert!(matches!(
            app.start(SourceKind::Simulated),
            Err(SoundscapeError::CapabilityMissing { .. })
        ));
        assert_eq!(app.state(), SessionState::Idle);
    }
}
