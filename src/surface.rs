//! Drawing capability consumed by the visualizer, and a software raster
//! that provides it.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn to_u8(self) -> [u8; 3] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }
}

/// Hue in degrees, saturation and lightness in 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

impl Hsl {
    pub fn to_rgb(self) -> Rgb {
        let h = self.h.rem_euclid(360.0) / 360.0;
        let s = self.s.clamp(0.0, 1.0);
        let l = self.l.clamp(0.0, 1.0);
        if s == 0.0 {
            return Rgb { r: l, g: l, b: l };
        }
        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Rgb {
            r: hue_to_channel(p, q, h + 1.0 / 3.0),
            g: hue_to_channel(p, q, h),
            b: hue_to_channel(p, q, h - 1.0 / 3.0),
        }
    }
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// How a shape's colour combines with what is already on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompositeMode {
    SourceOver,
    /// `1 - (1 - dst)(1 - src)`: overlapping glyphs brighten and never darken
    Screen,
}

/// A filled circle with an optional soft glow around its edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub glow: f32,
    pub color: Hsl,
}

/// The drawing operations the visualizer needs.
pub trait DrawSurface {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn resize(&mut self, width: usize, height: usize);
    /// Composite black at `alpha` over the whole surface (motion trails).
    fn fade(&mut self, alpha: f32);
    fn fill_circle(&mut self, circle: &Circle, mode: CompositeMode);
}

/// Software RGB raster, starts black.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb::BLACK; width * height],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    /// Mean brightness over the surface, 0..1.
    pub fn mean_luma(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .pixels
            .iter()
            .map(|p| 0.2126 * p.r + 0.7152 * p.g + 0.0722 * p.b)
            .sum();
        sum / self.pixels.len() as f32
    }

    /// Nearest-neighbour downsample, e.g. for a terminal preview.
    pub fn downsample(&self, width: usize, height: usize) -> Canvas {
        let mut out = Canvas::new(width, height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        for y in 0..height {
            let sy = y * self.height / height.max(1);
            for x in 0..width {
                let sx = x * self.width / width.max(1);
                out.pixels[y * width + x] = self.pixel(sx, sy);
            }
        }
        out
    }

    fn blend(dst: &mut Rgb, src: Rgb, coverage: f32, mode: CompositeMode) {
        let mix = |d: f32, s: f32| match mode {
            CompositeMode::SourceOver => d * (1.0 - coverage) + s * coverage,
            CompositeMode::Screen => 1.0 - (1.0 - d) * (1.0 - s * coverage),
        };
        dst.r = mix(dst.r, src.r);
        dst.g = mix(dst.g, src.g);
        dst.b = mix(dst.b, src.b);
    }
}

impl DrawSurface for Canvas {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        *self = Canvas::new(width, height);
    }

    fn fade(&mut self, alpha: f32) {
        let keep = 1.0 - alpha.clamp(0.0, 1.0);
        for p in self.pixels.iter_mut() {
            p.r *= keep;
            p.g *= keep;
            p.b *= keep;
        }
    }

    fn fill_circle(&mut self, circle: &Circle, mode: CompositeMode) {
        let radius = circle.radius.max(0.0);
        let glow = circle.glow.max(0.0);
        let reach = radius + glow;
        if reach <= 0.0 || !circle.x.is_finite() || !circle.y.is_finite() {
            return;
        }
        let color = circle.color.to_rgb();

        let x0 = (circle.x - reach).floor().max(0.0) as usize;
        let y0 = (circle.y - reach).floor().max(0.0) as usize;
        let x1 = ((circle.x + reach).ceil().max(0.0) as usize).min(self.width);
        let y1 = ((circle.y + reach).ceil().max(0.0) as usize).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - circle.x;
                let dy = y as f32 + 0.5 - circle.y;
                let d = (dx * dx + dy * dy).sqrt();
                let coverage = if d <= radius {
                    1.0
                } else if glow > 0.0 && d <= reach {
                    let t = 1.0 - (d - radius) / glow;
                    0.5 * t * t
                } else {
                    continue;
                };
                let i = y * self.width + x;
                Canvas::blend(&mut self.pixels[i], color, coverage, mode);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Rgb, b: Rgb) -> bool {
        (a.r - b.r).abs() < 1e-4 && (a.g - b.g).abs() < 1e-4 && (a.b - b.b).abs() < 1e-4
    }

    #[test]
    fn test_hsl_primaries() {
        let red = Hsl { h: 0.0, s: 1.0, l: 0.5 }.to_rgb();
        assert!(close(red, Rgb { r: 1.0, g: 0.0, b: 0.0 }));
        let blue = Hsl { h: 240.0, s: 1.0, l: 0.5 }.to_rgb();
        assert!(close(blue, Rgb { r: 0.0, g: 0.0, b: 1.0 }));
        let grey = Hsl { h: 123.0, s: 0.0, l: 0.25 }.to_rgb();
        assert!(close(grey, Rgb { r: 0.25, g: 0.25, b: 0.25 }));
        let white = Hsl { h: 360.0, s: 1.0, l: 1.0 }.to_rgb();
        assert!(close(white, Rgb { r: 1.0, g: 1.0, b: 1.0 }));
    }

    #[test]
    fn test_fade_darkens() {
        let mut c = Canvas::new(4, 4);
        let white = Hsl { h: 0.0, s: 0.0, l: 1.0 };
        c.fill_circle(
            &Circle { x: 2.0, y: 2.0, radius: 10.0, glow: 0.0, color: white },
            CompositeMode::SourceOver,
        );
        assert!(close(c.pixel(0, 0), Rgb { r: 1.0, g: 1.0, b: 1.0 }));
        c.fade(0.1);
        assert!((c.pixel(3, 3).r - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_screen_never_darkens() {
        let mut c = Canvas::new(8, 8);
        let grey = Hsl { h: 0.0, s: 0.0, l: 0.5 };
        let circle = Circle { x: 4.0, y: 4.0, radius: 3.0, glow: 2.0, color: grey };
        c.fill_circle(&circle, CompositeMode::Screen);
        let once = c.pixel(4, 4).r;
        assert!((once - 0.5).abs() < 1e-5);
        c.fill_circle(&circle, CompositeMode::Screen);
        assert!((c.pixel(4, 4).r - 0.75).abs() < 1e-5);
        // Glow reaches past the radius but fades out
        assert!(c.pixel(4, 0).r > 0.0 && c.pixel(4, 0).r < once);
    }

    #[test]
    fn test_zero_radius_draws_nothing() {
        let mut c = Canvas::new(8, 8);
        let circle = Circle { x: 4.0, y: 4.0, radius: 0.0, glow: 0.0, color: Hsl { h: 0.0, s: 1.0, l: 0.5 } };
        c.fill_circle(&circle, CompositeMode::Screen);
        assert_eq!(c.mean_luma(), 0.0);
    }

    #[test]
    fn test_resize_clears() {
        let mut c = Canvas::new(4, 4);
        c.fill_circle(
            &Circle { x: 2.0, y: 2.0, radius: 5.0, glow: 0.0, color: Hsl { h: 0.0, s: 0.0, l: 1.0 } },
            CompositeMode::SourceOver,
        );
        c.resize(6, 3);
        assert_eq!((c.width(), c.height()), (6, 3));
        assert_eq!(c.mean_luma(), 0.0);
    }
}
