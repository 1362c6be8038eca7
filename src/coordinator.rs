use crate::config::SoundscapeConfig;
use crate::error::SoundscapeError;
use crate::mapper::FrameAudioMapper;
use crate::motion::{Detection, MotionDetector};
use crate::surface::{Canvas, DrawSurface};
use crate::synth::{self, SharedSynth};
use crate::types::*;
use crate::visualizer::Visualizer;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use serde::Serialize;

/// What happened to one frame, for observers and tests.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub timestamp_us: u64,
    pub triggers: Vec<TriggerEvent>,
    pub discarded: bool,
    pub active_peaks: usize,
    pub drawn: usize,
}

/// The per-frame loop: mirror → excitation → motion → triggers → picture.
///
/// Owns the detector, the excitation writer and the canvas outright; only
/// the synth is shared (with the drift driver and the audio renderer), and
/// it is locked once per frame, never while drawing.
pub struct Coordinator {
    frame_rx: Receiver<Frame>,
    synth: SharedSynth,
    clock: AudioClock,
    mapper: FrameAudioMapper,
    detector: MotionDetector,
    visualizer: Visualizer,
    canvas: Canvas,
    rng: StdRng,
    mirror: bool,
    display_txs: Vec<Sender<Canvas>>,
    report_tx: Option<Sender<FrameReport>>,
    viewport_rx: Option<Receiver<(usize, usize)>>,
}

impl Coordinator {
    pub fn new(
        frame_rx: Receiver<Frame>,
        synth: SharedSynth,
        mapper: FrameAudioMapper,
        clock: AudioClock,
        config: &SoundscapeConfig,
        rng: StdRng,
    ) -> Self {
        let columns = synth::lock(&synth).instrument().len();
        let grid = GridParams {
            rows: config.rows,
            columns,
            threshold: config.threshold,
        };
        Self {
            frame_rx,
            synth,
            clock,
            mapper,
            detector: MotionDetector::new(grid),
            visualizer: Visualizer::new(),
            canvas: Canvas::new(config.canvas_width, config.canvas_height),
            rng,
            mirror: config.mirror,
            display_txs: Vec::new(),
            report_tx: None,
            viewport_rx: None,
        }
    }

    /// Send a copy of the canvas to each display after every frame.
    pub fn with_displays(mut self, txs: Vec<Sender<Canvas>>) -> Self {
        self.display_txs = txs;
        self
    }

    /// Observer for per-frame results. A full or closed channel drops reports.
    pub fn with_reports(mut self, tx: Sender<FrameReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Viewport size changes, applied before the next frame is drawn.
    pub fn with_viewport(mut self, rx: Receiver<(usize, usize)>) -> Self {
        self.viewport_rx = Some(rx);
        self
    }

    pub fn grid(&self) -> &GridParams {
        self.detector.grid()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Follow a viewport change. The picture restarts from black.
    pub fn resize_canvas(&mut self, width: usize, height: usize) {
        if (width, height) == (self.canvas.width(), self.canvas.height()) {
            return;
        }
        info!("Canvas resized to {}x{}", width, height);
        self.canvas.resize(width, height);
    }

    /// Run one frame through the whole pipeline.
    pub fn process_frame(&mut self, frame: Frame) -> Result<FrameReport, SoundscapeError> {
        frame.check_size()?;
        let frame = if self.mirror { frame.mirrored() } else { frame };
        let timestamp_us = frame.timestamp_us;

        self.mapper.feed(&frame)?;
        let detection = self.detector.process(frame);

        let rows = self.detector.grid().rows;
        let now = self.clock.now();
        let view = {
            let mut synth = synth::lock(&self.synth);
            for event in detection.events() {
                let velocity = event.velocity(rows);
                trace!(
                    "Trigger col {} row {} → velocity {:.2} at {:.3}s",
                    event.column,
                    event.row,
                    velocity,
                    now
                );
                synth.play(event.column, velocity, now);
            }
            synth.view_at(now)
        };

        self.apply_viewport();
        let drawn = self.visualizer.render(&mut self.canvas, &view, &mut self.rng);
        for tx in &self.display_txs {
            // A slow display misses frames rather than stalling the loop
            if let Err(TrySendError::Full(_)) = tx.try_send(self.canvas.clone()) {
                trace!("Display behind, canvas dropped");
            }
        }

        let report = FrameReport {
            timestamp_us,
            discarded: detection.is_discarded(),
            triggers: match detection {
                Detection::Triggers(events) => events,
                Detection::Discarded { .. } => Vec::new(),
            },
            active_peaks: view.active_peaks(),
            drawn,
        };
        if let Some(tx) = &self.report_tx {
            match tx.try_send(report.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("Report observer behind, report dropped"),
                Err(TrySendError::Disconnected(_)) => trace!("Report observer gone"),
            }
        }
        Ok(report)
    }

    /// Follow the newest pending viewport size, if any.
    fn apply_viewport(&mut self) {
        let Some(rx) = &self.viewport_rx else {
            return;
        };
        let latest = rx.try_iter().last();
        if let Some((width, height)) = latest {
            if width > 0 && height > 0 {
                self.resize_canvas(width, height);
            } else {
                warn!("Ignoring empty viewport {}x{}", width, height);
            }
        }
    }

    /// Process frames until the capture side hangs up. A frame that fails
    /// is logged and skipped; the loop always moves on to the next one.
    pub fn run(&mut self) {
        info!(
            "Coordinator running ({} columns x {} rows, threshold {:.2}, mirror {})",
            self.grid().columns,
            self.grid().rows,
            self.grid().threshold,
            if self.mirror { "on" } else { "off" }
        );

        let mut frame_count: u64 = 0;
        let mut trigger_count: u64 = 0;
        let mut discard_count: u64 = 0;
        let mut error_count: u64 = 0;

        while let Ok(frame) = self.frame_rx.recv() {
            frame_count += 1;
            match self.process_frame(frame) {
                Ok(report) => {
                    trigger_count += report.triggers.len() as u64;
                    discard_count += report.discarded as u64;
                }
                Err(e) => {
                    error_count += 1;
                    warn!("Frame {} skipped: {}", frame_count, e);
                }
            }

            if frame_count % 300 == 0 {
                debug!(
                    "Coordinator: {} frames, {} triggers, {} discarded, {} errors",
                    frame_count, trigger_count, discard_count, error_count
                );
            }
        }

        info!(
            "Coordinator shutting down after {} frames ({} triggers)",
            frame_count, trigger_count
        );
    }
}
