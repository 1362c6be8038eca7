//! Shared DSP primitives: biquad filters, equal-power panning, a master-bus
//! compressor, and level helpers.

use std::f32::consts::PI;

// ─── Biquad ─────────────────────────────────────────────────────────────────

/// Biquad coefficients normalized by a0 (cookbook formulas).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    pub fn passthrough() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    pub fn silent() -> Self {
        Self {
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Constant 0 dB peak band-pass. Higher `q` means a narrower band.
    /// A non-positive Q passes the signal through unfiltered; a centre at or
    /// beyond Nyquist passes nothing.
    pub fn band_pass(center_hz: f32, q: f32, sample_rate: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        if center_hz <= 0.0 || center_hz >= nyquist {
            return Self::silent();
        }
        if q <= 0.0 {
            return Self::passthrough();
        }
        let w0 = 2.0 * PI * center_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * w0.cos() / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// High shelf with unit slope: boosts or cuts everything above `corner_hz`.
    pub fn high_shelf(corner_hz: f32, gain_db: f32, sample_rate: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        let corner_hz = corner_hz.clamp(1.0, nyquist - 1.0);
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * corner_hz / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / 2.0 * 2f32.sqrt();
        let k = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos + k);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos - k);
        let a0 = (a + 1.0) - (a - 1.0) * cos + k;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos);
        let a2 = (a + 1.0) - (a - 1.0) * cos - k;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Transposed direct form II biquad.
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoefficients,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Swap coefficients without clearing state, so moving parameters don't click.
    pub fn set_coefficients(&mut self, coeffs: BiquadCoefficients) {
        self.coeffs = coeffs;
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coeffs
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        if !y.is_finite() {
            self.reset();
            return 0.0;
        }
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Frequency scaled by a detune in cents.
pub fn detuned(hz: f32, cents: f32) -> f32 {
    hz * 2f32.powf(cents / 1200.0)
}

// ─── Panning ────────────────────────────────────────────────────────────────

/// Equal-power gains (left, right) for a mono source at `position`, with the
/// listener at the origin facing -z. Only the azimuth matters: distance and
/// elevation are ignored, and a source at the origin sits in the centre.
pub fn equal_power_gains(position: [f32; 3]) -> (f32, f32) {
    let [x, _, z] = position;
    let len = (x * x + z * z).sqrt();
    let azimuth = if len <= f32::EPSILON {
        0.0
    } else {
        // Angle from the listener's right-hand axis, measured in the horizontal plane
        let mut a = (x / len).clamp(-1.0, 1.0).acos().to_degrees();
        if -z / len < 0.0 {
            a = 360.0 - a;
        }
        if (0.0..=270.0).contains(&a) {
            90.0 - a
        } else {
            450.0 - a
        }
    };

    // Fold sources behind the listener onto the front half
    let azimuth = if azimuth < -90.0 {
        -180.0 - azimuth
    } else if azimuth > 90.0 {
        180.0 - azimuth
    } else {
        azimuth
    };

    let p = (azimuth + 90.0) / 180.0 * PI / 2.0;
    (p.cos(), p.sin())
}

// ─── Dynamics ───────────────────────────────────────────────────────────────

/// Stereo-linked feed-forward compressor with a hard knee.
///
/// Level is tracked in dB by a one-pole envelope follower with separate
/// attack and release times; gain above the threshold is reduced by the ratio.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope_db: f32,
}

impl Compressor {
    pub fn new(threshold_db: f32, ratio: f32, sample_rate: f32) -> Self {
        Self::with_times(threshold_db, ratio, 0.003, 0.25, sample_rate)
    }

    pub fn with_times(
        threshold_db: f32,
        ratio: f32,
        attack_s: f32,
        release_s: f32,
        sample_rate: f32,
    ) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack_coeff: (-1.0 / (attack_s * sample_rate)).exp(),
            release_coeff: (-1.0 / (release_s * sample_rate)).exp(),
            envelope_db: -120.0,
        }
    }

    #[inline]
    pub fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let peak = frame[0].abs().max(frame[1].abs());
        let level_db = amp_to_db(peak);
        let coeff = if level_db > self.envelope_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope_db = level_db + coeff * (self.envelope_db - level_db);

        let over = self.envelope_db - self.threshold_db;
        if over <= 0.0 {
            return frame;
        }
        let reduction_db = over * (1.0 - 1.0 / self.ratio);
        let gain = db_to_amp(-reduction_db);
        [frame[0] * gain, frame[1] * gain]
    }
}

// ─── Levels ─────────────────────────────────────────────────────────────────

pub fn db_to_amp(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub fn amp_to_db(amp: f32) -> f32 {
    20.0 * amp.max(1e-6).log10()
}

/// Root mean square of an audio buffer.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Test signal generators for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::f64::consts::PI;

    /// Generate a mono sine wave.
    pub fn sine_wave(freq_hz: f64, amp: f64, sr: u32, ms: u32) -> Vec<f32> {
        let n = (sr as u64 * ms as u64 / 1000) as usize;
        (0..n)
            .map(|i| (amp * (2.0 * PI * freq_hz * i as f64 / sr as f64).sin()) as f32)
            .collect()
    }
}
