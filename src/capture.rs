//! Frame sources and the capture thread that paces them.

use crate::config::SoundscapeConfig;
use crate::error::{Capability, SoundscapeError};
use crate::simulator::Simulator;
use crate::types::{Frame, SessionClock};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Anything that yields RGBA frames of a fixed size.
pub trait FrameSource: Send {
    fn name(&self) -> &str;
    fn dimensions(&self) -> (usize, usize);
    /// Nominal time between frames.
    fn frame_interval(&self) -> Duration;
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Simulated,
    Camera,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Simulated => write!(f, "simulated"),
            SourceKind::Camera => write!(f, "camera"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sim" | "simulated" | "simulator" => Ok(SourceKind::Simulated),
            "camera" | "webcam" => Ok(SourceKind::Camera),
            other => Err(format!("unknown source '{}' (expected simulated or camera)", other)),
        }
    }
}

/// Open a frame source. `seed` makes the simulated scene reproducible.
pub fn acquire(
    kind: SourceKind,
    config: &SoundscapeConfig,
    clock: SessionClock,
    seed: Option<u64>,
) -> Result<Box<dyn FrameSource>, SoundscapeError> {
    match kind {
        SourceKind::Simulated => {
            let rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_os_rng(),
            };
            Ok(Box::new(Simulator::new(
                config.frame_width,
                config.frame_height,
                config.frame_rate_hz,
                clock,
                rng,
            )))
        }
        SourceKind::Camera => Err(SoundscapeError::CapabilityMissing {
            capability: Capability::Camera,
            detail: "no camera backend is compiled into this build".into(),
        }),
    }
}

/// Pull frames from `source` on a dedicated thread and push them to `tx`.
///
/// With `paced`, frames are released no faster than the source's frame
/// interval; otherwise the bounded channel alone sets the pace. Stops when
/// `running` clears, the source ends, or the receiver hangs up.
pub fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    tx: Sender<Frame>,
    running: Arc<AtomicBool>,
    paced: bool,
) -> Result<JoinHandle<()>, SoundscapeError> {
    let name = source.name().to_string();
    let (w, h) = source.dimensions();
    info!("Capture: {} {}x{}", name, w, h);

    thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let interval = source.frame_interval();
            let mut deadline = Instant::now();
            let mut count: u64 = 0;

            while running.load(Ordering::Acquire) {
                let Some(frame) = source.next_frame() else {
                    info!("Capture: {} ended after {} frames", source.name(), count);
                    break;
                };
                if frame.width != w || frame.height != h {
                    warn!(
                        "Capture: {} produced {}x{}, expected {}x{}",
                        source.name(),
                        frame.width,
                        frame.height,
                        w,
                        h
                    );
                }
                if tx.send(frame).is_err() {
                    debug!("Capture: receiver gone, stopping");
                    break;
                }
                count += 1;

                if paced {
                    deadline += interval;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        // Fell behind; don't try to catch up with a burst
                        deadline = now;
                    }
                }
            }
            debug!("Capture thread exiting ({} frames)", count);
        })
        .map_err(|e| SoundscapeError::AcquisitionFailure {
            device: name,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_camera_is_missing_capability() {
        let cfg = SoundscapeConfig::default();
        match acquire(SourceKind::Camera, &cfg, SessionClock::new(), None) {
            Err(e @ SoundscapeError::CapabilityMissing { .. }) => {
                assert!(e.is_fatal());
                assert!(e.user_message().contains("no camera support"));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("camera should not be available"),
        }
    }

    #[test]
    fn test_source_kind_parses() {
        assert_eq!("sim".parse::<SourceKind>(), Ok(SourceKind::Simulated));
        assert_eq!("Camera".parse::<SourceKind>(), Ok(SourceKind::Camera));
        assert!("tape".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_capture_thread_delivers_and_stops() {
        let cfg = SoundscapeConfig {
            frame_width: 32,
            frame_height: 24,
            ..Default::default()
        };
        let source = acquire(SourceKind::Simulated, &cfg, SessionClock::new(), Some(7)).unwrap();
        let (tx, rx) = bounded(4);
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn_capture(source, tx, running.clone(), false).unwrap();

        for _ in 0..10 {
            let f = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!((f.width, f.height), (32, 24));
        }
        running.store(false, Ordering::Release);
        // Unblock a pending send
        drop(rx);
        handle.join().unwrap();
    }
}
