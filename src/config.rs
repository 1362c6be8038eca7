use crate::error::SoundscapeError;
use crate::scale::DIATONIC_MAJOR;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Master bus settings: input gain, high-shelf EQ, compressor, output gain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterBusConfig {
    pub input_gain: f32,
    pub output_gain: f32,
    pub shelf_frequency_hz: f32,
    pub shelf_gain_db: f32,
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
}

impl Default for MasterBusConfig {
    fn default() -> Self {
        Self {
            input_gain: 0.9,
            output_gain: 0.9,
            shelf_frequency_hz: 1000.0,
            shelf_gain_db: -24.0,
            compressor_threshold_db: -30.0,
            compressor_ratio: 20.0,
        }
    }
}

/// Every tunable of the soundscape. Defaults: a 320x240 mirrored camera,
/// a diatonic scale over the piano range, ten amplitude rows and a 25%
/// motion threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundscapeConfig {
    pub frame_width: usize,
    pub frame_height: usize,
    pub frame_rate_hz: u32,
    /// Flip frames left-to-right before processing
    pub mirror: bool,

    pub rows: usize,
    pub threshold: f32,

    pub lowest_note: i32,
    pub highest_note: i32,
    pub scale: Vec<i32>,

    pub sample_rate: u32,
    pub drift_period_ms: u64,
    pub master: MasterBusConfig,

    pub canvas_width: usize,
    pub canvas_height: usize,
    pub display_hz: u32,
}

impl Default for SoundscapeConfig {
    fn default() -> Self {
        Self {
            frame_width: 320,
            frame_height: 240,
            frame_rate_hz: 30,
            mirror: true,
            rows: 10,
            threshold: 0.25,
            lowest_note: 21,
            highest_note: 107,
            scale: DIATONIC_MAJOR.to_vec(),
            sample_rate: 48000,
            drift_period_ms: 33,
            master: MasterBusConfig::default(),
            canvas_width: 640,
            canvas_height: 360,
            display_hz: 15,
        }
    }
}

impl SoundscapeConfig {
    pub fn drift_period(&self) -> Duration {
        Duration::from_millis(self.drift_period_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }

    pub fn validate(&self) -> Result<(), SoundscapeError> {
        let fail = |msg: &str| Err(SoundscapeError::InvalidConfig(msg.to_string()));

        if self.frame_width == 0 || self.frame_height == 0 {
            return fail("frame dimensions must be non-zero");
        }
        if self.frame_rate_hz == 0 {
            return fail("frame rate must be non-zero");
        }
        if self.rows == 0 || self.rows > self.frame_height {
            return fail("rows must be between 1 and the frame height");
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return fail("threshold must be in (0, 1]");
        }
        if self.lowest_note > self.highest_note {
            return fail("lowest note is above highest note");
        }
        if self.scale.is_empty() {
            return fail("scale has no degrees");
        }
        if self.scale.iter().any(|d| !(0..12).contains(d))
            || self.scale.windows(2).any(|w| w[0] >= w[1])
        {
            return fail("scale degrees must be strictly increasing within [0, 12)");
        }
        if self.sample_rate == 0 || self.drift_period_ms == 0 {
            return fail("sample rate and drift period must be non-zero");
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return fail("canvas dimensions must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SoundscapeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unsorted_scale() {
        let cfg = SoundscapeConfig {
            scale: vec![0, 4, 2],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(SoundscapeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let cfg = SoundscapeConfig {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_keeps_master_bus() {
        let cfg = SoundscapeConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: SoundscapeConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.master.compressor_ratio, 20.0);
        assert_eq!(back.scale, cfg.scale);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: SoundscapeConfig =
            serde_json::from_str(r#"{"rows": 6, "master": {"output_gain": 0.5}}"#).unwrap();
        assert_eq!(cfg.rows, 6);
        assert_eq!(cfg.frame_width, 320);
        assert_eq!(cfg.master.output_gain, 0.5);
        assert_eq!(cfg.master.input_gain, 0.9);
    }
}
