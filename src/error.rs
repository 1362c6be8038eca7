//! Error types for the soundscape.
use std::fmt;
use thiserror::Error;

/// A host capability the soundscape needs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Camera,
    AudioOutput,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Camera => write!(f, "camera capture"),
            Capability::AudioOutput => write!(f, "audio output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SoundscapeError {
    /// Required capability absent in this build or on this host. Not retried.
    #[error("{capability} is not supported: {detail}")]
    CapabilityMissing {
        capability: Capability,
        detail: String,
    },

    /// The device exists but could not be opened (permission, busy, spawn failure).
    #[error("could not acquire {device}: {reason}")]
    AcquisitionFailure { device: String, reason: String },

    /// A frame whose byte length does not match its dimensions.
    #[error("frame is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("audio output error: {0}")]
    AudioOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SoundscapeError {
    /// True for errors that end the session before it starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SoundscapeError::CapabilityMissing { .. }
                | SoundscapeError::AcquisitionFailure { .. }
                | SoundscapeError::InvalidConfig(_)
        )
    }

    /// Alert text for the person in front of the camera.
    pub fn user_message(&self) -> String {
        match self {
            SoundscapeError::CapabilityMissing {
                capability: Capability::Camera,
                ..
            } => "This build has no camera support. Run with the simulated camera instead."
                .to_string(),
            SoundscapeError::CapabilityMissing {
                capability: Capability::AudioOutput,
                ..
            } => "Audio output is not supported here. Rebuild with the `audio` feature or record to a file."
                .to_string(),
            SoundscapeError::AcquisitionFailure { reason, .. } => format!(
                "Motion detection not working ({}). A camera is required.",
                reason
            ),
            other => other.to_string(),
        }
    }
}
