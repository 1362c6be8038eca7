use crate::capture::FrameSource;
use crate::types::*;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;

/// Background level and sensor noise. Noise stays well under the pixel
/// activity threshold so a still scene never triggers.
const BACKGROUND: u8 = 18;
const NOISE: u8 = 10;
const BLOB: [u8; 4] = [235, 220, 200, 255];
/// Brightness jump of a flicker frame; enough to trip the global debounce.
const FLICKER_BOOST: u8 = 120;

/// Synthetic camera: a dark noisy room with one bright object that
/// appears, moves around and disappears, plus the occasional light flicker.
/// Exercises triggering, pitch sweeps and the global debounce without any
/// hardware.
pub struct Simulator {
    width: usize,
    height: usize,
    interval: Duration,
    clock: SessionClock,
    rng: StdRng,
    script: Vec<Gesture>,
    cursor: usize,
    tick: u32,
    sweep_from: (f32, f32),
    state: SimState,
    frames: u64,
}

/// Mutable scene state that evolves as gestures are applied.
#[derive(Clone, Default)]
struct SimState {
    /// Centre in 0..1 frame coordinates, `None` = nothing in view
    blob: Option<(f32, f32)>,
    /// Edge length as a fraction of the frame height
    size: f32,
}

impl Simulator {
    pub fn new(width: usize, height: usize, frame_rate_hz: u32, clock: SessionClock, rng: StdRng) -> Self {
        Self::with_script(width, height, frame_rate_hz, clock, rng, demo_sequence())
    }

    fn with_script(
        width: usize,
        height: usize,
        frame_rate_hz: u32,
        clock: SessionClock,
        rng: StdRng,
        script: Vec<Gesture>,
    ) -> Self {
        info!(
            "Simulator: {}x{} @ {} fps, {} gestures (looping)",
            width,
            height,
            frame_rate_hz,
            script.len()
        );
        Self {
            width,
            height,
            interval: Duration::from_secs_f64(1.0 / frame_rate_hz.max(1) as f64),
            clock,
            rng,
            script,
            cursor: 0,
            tick: 0,
            sweep_from: (0.5, 0.5),
            state: SimState::default(),
            frames: 0,
        }
    }

    fn ticks_for(&self, ms: u32) -> u32 {
        let ticks = ms as f64 / 1000.0 / self.interval.as_secs_f64();
        (ticks.round() as u32).max(1)
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.script.len();
        self.tick = 0;
        if self.cursor == 0 {
            debug!("Simulator: script looped after {} frames", self.frames);
        }
    }

    /// Apply gestures until one of them yields a frame. Returns whether the
    /// frame is a flicker frame.
    fn step(&mut self) -> bool {
        // Every full pass through the script yields at least one frame
        // unless it holds no timed gesture at all.
        for _ in 0..=self.script.len() {
            let gesture = self.script[self.cursor];
            match gesture {
                Gesture::Appear { x, y, size } => {
                    debug!("  appear at ({:.2}, {:.2})", x, y);
                    self.state.blob = Some((x, y));
                    self.state.size = size;
                    self.advance();
                }
                Gesture::Vanish => {
                    debug!("  vanish");
                    self.state.blob = None;
                    self.advance();
                }
                Gesture::Flicker => {
                    debug!("  flicker");
                    self.advance();
                    return true;
                }
                Gesture::Hold { ms } => {
                    if self.tick >= self.ticks_for(ms) {
                        self.advance();
                        continue;
                    }
                    self.tick += 1;
                    return false;
                }
                Gesture::Sweep { to_x, to_y, ms } => {
                    let ticks = self.ticks_for(ms);
                    if self.tick >= ticks {
                        self.state.blob = self.state.blob.map(|_| (to_x, to_y));
                        self.advance();
                        continue;
                    }
                    if self.tick == 0 {
                        self.sweep_from = self.state.blob.unwrap_or((to_x, to_y));
                    }
                    self.tick += 1;
                    let t = smoothstep(self.tick as f32 / ticks as f32);
                    let (fx, fy) = self.sweep_from;
                    if self.state.blob.is_some() {
                        self.state.blob = Some((lerp(fx, to_x, t), lerp(fy, to_y, t)));
                    }
                    return false;
                }
            }
        }
        false
    }

    fn render(&mut self, flicker: bool) -> Frame {
        let boost = if flicker { FLICKER_BOOST } else { 0 };
        let mut data = Vec::with_capacity(self.width * self.height * 4);
        for _ in 0..self.width * self.height {
            for _ in 0..3 {
                let n: u8 = self.rng.random_range(0..NOISE);
                data.push(BACKGROUND + n + boost);
            }
            data.push(255);
        }
        let mut frame = Frame {
            timestamp_us: self.clock.now_us(),
            width: self.width,
            height: self.height,
            data,
        };

        if let Some((cx, cy)) = self.state.blob {
            let edge = (self.state.size * self.height as f32).round() as usize;
            let x = (cx * self.width as f32 - edge as f32 / 2.0).max(0.0) as usize;
            let y = (cy * self.height as f32 - edge as f32 / 2.0).max(0.0) as usize;
            frame.fill_rect(x, y, edge, edge, BLOB);
        }
        frame
    }
}

impl FrameSource for Simulator {
    fn name(&self) -> &str {
        "simulated camera"
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.script.is_empty() {
            return None;
        }
        let flicker = self.step();
        self.frames += 1;
        Some(self.render(flicker))
    }
}

// ─── Gesture types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Gesture {
    /// Keep the scene as it is
    Hold { ms: u32 },
    /// Object enters view instantly (coordinates 0..1, size relative to height)
    Appear { x: f32, y: f32, size: f32 },
    /// Move the object in view to a new position
    Sweep { to_x: f32, to_y: f32, ms: u32 },
    /// Object leaves view instantly
    Vanish,
    /// One frame of room light flicker
    Flicker,
}

/// Roughly ten seconds of movement: slow and fast sweeps at several heights
/// so both pitch and loudness vary, with one flicker in the middle.
fn demo_sequence() -> Vec<Gesture> {
    vec![
        // Empty room
        Gesture::Hold { ms: 300 },

        // Hand enters low on the left, rises while moving right
        Gesture::Appear { x: 0.1, y: 0.8, size: 0.2 },
        Gesture::Hold { ms: 300 },
        Gesture::Sweep { to_x: 0.9, to_y: 0.3, ms: 1500 },
        Gesture::Hold { ms: 200 },

        // Fast swipe back along the top
        Gesture::Sweep { to_x: 0.15, to_y: 0.1, ms: 600 },

        Gesture::Flicker,
        Gesture::Hold { ms: 300 },

        // Slow descent in the middle
        Gesture::Sweep { to_x: 0.5, to_y: 0.9, ms: 2000 },
        Gesture::Vanish,
        Gesture::Hold { ms: 500 },

        // Second object, small and quick
        Gesture::Appear { x: 0.7, y: 0.5, size: 0.12 },
        Gesture::Sweep { to_x: 0.3, to_y: 0.4, ms: 800 },
        Gesture::Sweep { to_x: 0.8, to_y: 0.2, ms: 800 },
        Gesture::Vanish,
        Gesture::Hold { ms: 700 },
    ]
}

// ─── Math helpers ───────────────────────────────────────────────────────────

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{activity_mask, MotionDetector};
    use rand::SeedableRng;

    fn sim() -> Simulator {
        Simulator::new(320, 240, 30, SessionClock::new(), StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_frames_have_configured_size() {
        let mut s = sim();
        let f = s.next_frame().unwrap();
        assert_eq!((f.width, f.height), (320, 240));
        assert_eq!(f.data.len(), 320 * 240 * 4);
        assert_eq!(s.dimensions(), (320, 240));
    }

    #[test]
    fn test_noise_alone_is_not_motion() {
        let mut s = sim();
        // The script opens with an empty room
        let a = s.next_frame().unwrap();
        let b = s.next_frame().unwrap();
        assert_eq!(activity_mask(&a, &b).1, 0);
    }

    #[test]
    fn test_demo_triggers_and_flickers() {
        let mut s = sim();
        let mut det = MotionDetector::new(GridParams {
            rows: 10,
            columns: 51,
            threshold: 0.25,
        });
        let mut triggers = 0;
        let mut discards = 0;
        for _ in 0..300 {
            let d = det.process(s.next_frame().unwrap());
            triggers += d.events().len();
            discards += d.is_discarded() as usize;
        }
        assert!(triggers > 0);
        assert!(discards >= 1);
    }

    #[test]
    fn test_instant_only_script_still_yields_frames() {
        let script = vec![Gesture::Appear { x: 0.5, y: 0.5, size: 0.5 }, Gesture::Vanish];
        let mut s = Simulator::with_script(8, 8, 30, SessionClock::new(), StdRng::seed_from_u64(1), script);
        assert!(s.next_frame().is_some());
        assert!(s.next_frame().is_some());
    }
}
