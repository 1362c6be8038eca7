use crate::dsp::{detuned, equal_power_gains, Biquad, BiquadCoefficients};
use crate::envelope::AutomatedParam;
use crate::types::StereoSample;
use rand::Rng;
use serde::Serialize;

/// Attack of the fundamental; partial `h` takes `h` times as long.
pub const BASE_ATTACK_S: f64 = 0.5;
/// Release of the fundamental; partial `h` takes `1/h` as long.
pub const BASE_RELEASE_S: f64 = 1.0;
/// Q while idle and at full velocity.
pub const RESTING_Q: f32 = 1000.0;
pub const MAX_Q: f32 = 1000.0;
/// Each drift tick picks a detune uniformly in ±this many cents.
pub const DETUNE_RANGE_CENTS: f32 = 25.0;
/// Each drift tick scales every pan axis by a factor in [1 - PAN_STEP, 1 + PAN_STEP].
pub const PAN_STEP: f32 = 0.2;
pub const PAN_LIMIT: f32 = 1.0;

/// Filter coefficients are refreshed once per control block.
const CONTROL_BLOCK: usize = 128;

/// Point-in-time view of a peak, for the visualizer and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResonancePeakState {
    pub center_frequency: f32,
    pub current_q: f32,
    pub current_gain: f32,
    pub pan_position: [f32; 3],
    pub detune_cents: f32,
    pub attack_time: f64,
    pub release_time: f64,
}

/// One harmonic of a note: band-pass filter over the shared excitation,
/// an equal-power panner that drifts, and an attack/release gain stage.
#[derive(Debug, Clone)]
pub struct ResonancePeak {
    center_frequency: f32,
    /// 1 = fundamental
    harmonic: u32,
    attack_time: f64,
    release_time: f64,
    q: AutomatedParam,
    gain: AutomatedParam,
    pan_position: [f32; 3],
    detune_cents: f32,
    filter: Biquad,
}

impl ResonancePeak {
    pub fn new<R: Rng + ?Sized>(frequency: f32, harmonic: u32, rng: &mut R) -> Self {
        let harmonic = harmonic.max(1);
        Self {
            center_frequency: frequency,
            harmonic,
            attack_time: BASE_ATTACK_S * harmonic as f64,
            release_time: BASE_RELEASE_S / harmonic as f64,
            q: AutomatedParam::new(RESTING_Q),
            gain: AutomatedParam::new(0.0),
            pan_position: [rng.random_range(-1.0..1.0), 0.0, 0.0],
            detune_cents: 0.0,
            filter: Biquad::new(BiquadCoefficients::passthrough()),
        }
    }

    pub fn center_frequency(&self) -> f32 {
        self.center_frequency
    }

    pub fn harmonic(&self) -> u32 {
        self.harmonic
    }

    pub fn attack_time(&self) -> f64 {
        self.attack_time
    }

    pub fn release_time(&self) -> f64 {
        self.release_time
    }

    pub fn pan_position(&self) -> [f32; 3] {
        self.pan_position
    }

    pub fn detune_cents(&self) -> f32 {
        self.detune_cents
    }

    pub fn gain_at(&self, t: f64) -> f32 {
        self.gain.value_at(t)
    }

    pub fn q_at(&self, t: f64) -> f32 {
        self.q.value_at(t)
    }

    /// Peak gain a trigger of `velocity` ramps to. Upper partials are quieter.
    pub fn target_gain(&self, velocity: f32) -> f32 {
        (clamp_velocity(velocity) / self.harmonic as f32).min(1.0)
    }

    /// Peak Q a trigger of `velocity` ramps to.
    pub fn target_q(velocity: f32) -> f32 {
        (clamp_velocity(velocity) * MAX_Q).min(MAX_Q)
    }

    /// Periodic drift: random-walk the pan position and pick a fresh detune.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for axis in self.pan_position.iter_mut() {
            *axis *= rng.random_range((1.0 - PAN_STEP)..(1.0 + PAN_STEP));
            *axis = axis.clamp(-PAN_LIMIT, PAN_LIMIT);
        }
        self.detune_cents = rng.random_range(-DETUNE_RANGE_CENTS..=DETUNE_RANGE_CENTS);
    }

    /// Attack/release envelope on Q and gain, starting at audio time `now`.
    /// Anything still scheduled is cancelled and the current values held first.
    pub fn trigger(&mut self, velocity: f32, now: f64) {
        let peak_q = Self::target_q(velocity);
        let peak_gain = self.target_gain(velocity);
        let attack_end = now + self.attack_time;
        let release_end = attack_end + self.release_time;

        self.q.cancel_and_hold_at_time(now);
        self.q.linear_ramp_to_value_at_time(peak_q, attack_end);
        self.q.linear_ramp_to_value_at_time(0.0, release_end);

        self.gain.cancel_and_hold_at_time(now);
        self.gain.linear_ramp_to_value_at_time(peak_gain, attack_end);
        self.gain.linear_ramp_to_value_at_time(0.0, release_end);
    }

    pub fn state_at(&self, t: f64) -> ResonancePeakState {
        ResonancePeakState {
            center_frequency: self.center_frequency,
            current_q: self.q_at(t),
            current_gain: self.gain_at(t),
            pan_position: self.pan_position,
            detune_cents: self.detune_cents,
            attack_time: self.attack_time,
            release_time: self.release_time,
        }
    }

    /// Filter `input` (excitation samples starting at audio time `start`)
    /// and mix the panned, enveloped result into `out`.
    pub fn render(&mut self, input: &[f32], start: f64, sample_rate: f32, out: &mut [StereoSample]) {
        let dt = 1.0 / sample_rate as f64;
        let (left, right) = equal_power_gains(self.pan_position);
        let center = detuned(self.center_frequency, self.detune_cents);

        for (block_idx, (inp, outp)) in input
            .chunks(CONTROL_BLOCK)
            .zip(out.chunks_mut(CONTROL_BLOCK))
            .enumerate()
        {
            let block_start = start + (block_idx * CONTROL_BLOCK) as f64 * dt;
            let block_end = block_start + inp.len() as f64 * dt;
            if self.gain_at(block_start) == 0.0 && self.gain_at(block_end) == 0.0 {
                // Silent: keep the filter warm but skip the mix
                for &x in inp {
                    self.filter.process(x);
                }
                continue;
            }

            let q = self.q_at(block_start);
            self.filter
                .set_coefficients(BiquadCoefficients::band_pass(center, q, sample_rate));

            for (i, (&x, o)) in inp.iter().zip(outp.iter_mut()).enumerate() {
                let g = self.gain_at(block_start + i as f64 * dt);
                let y = self.filter.process(x) * g;
                o[0] += y * left;
                o[1] += y * right;
            }
        }
    }
}

/// Out-of-range velocities are clamped, never rejected. NaN counts as silence.
pub fn clamp_velocity(velocity: f32) -> f32 {
    if velocity.is_nan() {
        0.0
    } else {
        velocity.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn peak(harmonic: u32) -> ResonancePeak {
        let mut rng = StdRng::seed_from_u64(7);
        ResonancePeak::new(440.0 * harmonic as f32, harmonic, &mut rng)
    }

    #[test]
    fn test_starts_silent_at_resting_q() {
        let p = peak(1);
        assert_eq!(p.gain_at(0.0), 0.0);
        assert_eq!(p.q_at(0.0), RESTING_Q);
        let x = p.pan_position()[0];
        assert!((-1.0..1.0).contains(&x));
    }

    #[test]
    fn test_timing_scales_with_harmonic() {
        let p1 = peak(1);
        let p2 = peak(2);
        assert_eq!(p1.attack_time(), 0.5);
        assert_eq!(p1.release_time(), 1.0);
        assert_eq!(p2.attack_time(), 1.0);
        assert_eq!(p2.release_time(), 0.5);
    }

    #[test]
    fn test_full_velocity_envelope_fundamental() {
        let mut p = peak(1);
        let now = 2.0;
        p.trigger(1.0, now);
        assert_eq!(p.gain_at(now), 0.0);
        assert!((p.gain_at(now + 0.25) - 0.5).abs() < 1e-5);
        assert!((p.gain_at(now + 0.5) - 1.0).abs() < 1e-5);
        assert!((p.gain_at(now + 1.0) - 0.5).abs() < 1e-5);
        assert_eq!(p.gain_at(now + 1.5), 0.0);
        assert!((p.q_at(now + 0.5) - 1000.0).abs() < 1e-3);
        assert_eq!(p.q_at(now + 1.5), 0.0);
    }

    #[test]
    fn test_full_velocity_envelope_second_harmonic() {
        let mut p = peak(2);
        p.trigger(1.0, 0.0);
        assert!((p.gain_at(1.0) - 0.5).abs() < 1e-5);
        assert_eq!(p.gain_at(1.5), 0.0);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let mut p = peak(1);
        p.trigger(3.0, 0.0);
        assert!((p.gain_at(0.5) - 1.0).abs() < 1e-5);
        assert!((p.q_at(0.5) - 1000.0).abs() < 1e-3);

        let mut p = peak(1);
        p.trigger(-2.0, 0.0);
        assert_eq!(p.gain_at(0.5), 0.0);
        assert_eq!(clamp_velocity(f32::NAN), 0.0);
    }

    #[test]
    fn test_retrigger_starts_from_current_value() {
        let mut p = peak(1);
        p.trigger(1.0, 0.0);
        // Halfway up the attack
        p.trigger(0.5, 0.25);
        assert!((p.gain_at(0.25) - 0.5).abs() < 1e-5);
        // Now ramps 0.5 -> 0.5 over the attack, then releases
        assert!((p.gain_at(0.75) - 0.5).abs() < 1e-5);
        assert_eq!(p.gain_at(1.75), 0.0);
    }

    #[test]
    fn test_tick_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut p = ResonancePeak::new(220.0, 1, &mut rng);
        for _ in 0..1000 {
            p.tick(&mut rng);
            assert!(p.detune_cents().abs() <= DETUNE_RANGE_CENTS);
            assert!(p.pan_position().iter().all(|a| a.abs() <= PAN_LIMIT));
        }
        // y and z start at zero and a multiplicative walk keeps them there
        assert_eq!(p.pan_position()[1], 0.0);
    }

    #[test]
    fn test_render_silent_until_triggered() {
        let mut p = peak(1);
        let input: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let mut out = vec![[0.0f32; 2]; 512];
        p.render(&input, 0.0, 48000.0, &mut out);
        assert!(out.iter().all(|s| s[0] == 0.0 && s[1] == 0.0));

        p.trigger(1.0, 0.0);
        let mut out = vec![[0.0f32; 2]; 512];
        let input: Vec<f32> = crate::dsp::test_helpers::sine_wave(440.0, 0.5, 48000, 100)
            [..512]
            .to_vec();
        p.render(&input, 0.4, 48000.0, &mut out);
        assert!(out.iter().any(|s| s[0] != 0.0 || s[1] != 0.0));
    }
}
