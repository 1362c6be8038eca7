use crate::note::InstrumentView;
use crate::scale::mtof;
use crate::surface::{Circle, CompositeMode, DrawSurface, Hsl};
use rand::Rng;

/// Black laid over the previous picture each frame; lower keeps longer trails.
pub const FADE_ALPHA: f32 = 0.1;

/// Draws one glowing circle per resonance peak.
///
/// Column = pitch bucket, height = gain. Hue walks backwards round the
/// wheel as the peak's frequency rises; size shrinks with pitch.
pub struct Visualizer {
    fade_alpha: f32,
    mode: CompositeMode,
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            fade_alpha: FADE_ALPHA,
            mode: CompositeMode::Screen,
        }
    }

    /// Fade the surface then draw every peak. Silent peaks still get a
    /// (zero-sized) draw call so the call sequence only depends on the
    /// instrument layout.
    pub fn render<S, R>(&self, surface: &mut S, view: &InstrumentView, rng: &mut R) -> usize
    where
        S: DrawSurface + ?Sized,
        R: Rng + ?Sized,
    {
        surface.fade(self.fade_alpha);
        if view.notes.is_empty() {
            return 0;
        }

        let w = surface.width() as f32 / view.notes.len() as f32;
        let h = surface.height() as f32;
        let span = (view.highest_note - view.lowest_note) as f32;
        let lowest_hz = mtof(view.lowest_note as f64) as f32;
        let range_hz = mtof((view.highest_note - view.lowest_note) as f64) as f32;

        let mut drawn = 0;
        for (i, note) in view.notes.iter().enumerate() {
            let n = if span > 0.0 {
                (note.midi - view.lowest_note) as f32 / span
            } else {
                0.0
            };
            for peak in &note.peaks {
                let v = peak.current_gain.clamp(0.0, 1.0);
                let f = ((peak.center_frequency - lowest_hz) / range_hz).clamp(0.0, 1.0);
                let x = i as f32 * w;
                let y = h - v * h;
                let spread = w * n * v;

                let circle = Circle {
                    x: w / 2.0 + jitter(rng, x, spread),
                    y: jitter(rng, y, spread),
                    radius: w * (1.0 - n) * v,
                    glow: w * v,
                    color: Hsl {
                        h: 360.0 * (1.0 - f),
                        s: v,
                        l: n,
                    },
                };
                surface.fill_circle(&circle, self.mode);
                drawn += 1;
            }
        }
        drawn
    }
}

/// Uniform in `[center - spread, center + spread)`; exactly `center` when
/// the spread is zero.
fn jitter<R: Rng + ?Sized>(rng: &mut R, center: f32, spread: f32) -> f32 {
    center + spread * (rng.random::<f32>() * 2.0 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Instrument;
    use crate::scale::DIATONIC_MAJOR;
    use crate::surface::Canvas;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct RecordingSurface {
        fades: Vec<f32>,
        circles: Vec<(Circle, CompositeMode)>,
    }

    impl DrawSurface for RecordingSurface {
        fn width(&self) -> usize {
            700
        }
        fn height(&self) -> usize {
            400
        }
        fn resize(&mut self, _width: usize, _height: usize) {}
        fn fade(&mut self, alpha: f32) {
            self.fades.push(alpha);
        }
        fn fill_circle(&mut self, circle: &Circle, mode: CompositeMode) {
            self.circles.push((*circle, mode));
        }
    }

    fn instrument() -> Instrument {
        let mut rng = StdRng::seed_from_u64(11);
        Instrument::new(60, 72, &DIATONIC_MAJOR, &mut rng)
    }

    #[test]
    fn test_silent_instrument_draws_zero_sized_points() {
        let inst = instrument();
        let view = inst.view_at(0.0);
        let mut surface = RecordingSurface::default();
        let mut rng = StdRng::seed_from_u64(1);
        let drawn = Visualizer::new().render(&mut surface, &view, &mut rng);

        assert_eq!(surface.fades, vec![FADE_ALPHA]);
        assert_eq!(drawn, inst.len() * 2);
        assert_eq!(surface.circles.len(), drawn);
        let w = 700.0 / inst.len() as f32;
        for (i, (c, mode)) in surface.circles.iter().enumerate() {
            assert_eq!(*mode, CompositeMode::Screen);
            assert_eq!(c.radius, 0.0);
            assert_eq!(c.glow, 0.0);
            assert_eq!(c.y, 400.0);
            assert!((c.x - ((i / 2) as f32 * w + w / 2.0)).abs() < 1e-3);
            assert_eq!(c.color.s, 0.0);
        }
    }

    #[test]
    fn test_loud_peak_rises_and_grows() {
        let mut inst = instrument();
        inst.play(0, 1.0, 0.0);
        let view = inst.view_at(0.5);
        let mut surface = RecordingSurface::default();
        let mut rng = StdRng::seed_from_u64(1);
        Visualizer::new().render(&mut surface, &view, &mut rng);

        // Lowest note, fundamental at full gain: n = 0 so no jitter
        let (c, _) = surface.circles[0];
        let w = 700.0 / inst.len() as f32;
        assert!((c.radius - w).abs() < 1e-3);
        assert!((c.glow - w).abs() < 1e-3);
        assert!(c.y.abs() < 1e-3);
        assert!((c.x - w / 2.0).abs() < 1e-3);
        assert!((c.color.s - 1.0).abs() < 1e-5);
        // Fundamental sits at the bottom of the range: hue at the top of the wheel
        assert!((c.color.h - 360.0).abs() < 1e-2);
    }

    #[test]
    fn test_same_seed_same_picture() {
        let mut inst = instrument();
        for i in 0..inst.len() {
            inst.play(i, 0.7, 0.0);
        }
        let view = inst.view_at(0.3);
        let draw = || {
            let mut surface = RecordingSurface::default();
            let mut rng = StdRng::seed_from_u64(99);
            Visualizer::new().render(&mut surface, &view, &mut rng);
            surface.circles
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn test_canvas_lights_up() {
        let mut inst = instrument();
        inst.play(3, 1.0, 0.0);
        let view = inst.view_at(0.5);
        let mut canvas = Canvas::new(160, 90);
        let mut rng = StdRng::seed_from_u64(5);
        Visualizer::new().render(&mut canvas, &view, &mut rng);
        assert!(canvas.mean_luma() > 0.0);
    }
}
