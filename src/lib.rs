pub mod app;
pub mod audio_sink;
pub mod capture;
pub mod config;
pub mod console_display;
pub mod coordinator;
pub mod drift;
pub mod dsp;
pub mod envelope;
pub mod error;
pub mod mapper;
pub mod motion;
pub mod note;
pub mod resonance;
pub mod scale;
pub mod simulator;
pub mod surface;
pub mod synth;
pub mod types;
pub mod visualizer;

#[cfg(feature = "audio")]
pub mod audio_output;
