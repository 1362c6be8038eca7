use crate::audio_sink::AudioSink;
use crate::error::SoundscapeError;
use crate::types::StereoSample;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info, warn};
use std::thread;

/// Blocks queued ahead of the device. Small keeps triggers responsive.
const QUEUE_BLOCKS: usize = 4;

/// Live playback on the default output device via cpal.
///
/// The cpal stream lives on its own thread (streams are not `Send` on every
/// platform). `write` blocks once the queue is full, so the renderer is
/// paced by the device clock.
pub struct CpalSink {
    tx: Option<Sender<Vec<StereoSample>>>,
    stop_tx: Option<Sender<()>>,
    sample_rate: u32,
}

impl CpalSink {
    /// Open the default output device, preferring `preferred_rate`.
    pub fn open(preferred_rate: u32) -> Result<Self, SoundscapeError> {
        let (tx, rx) = bounded::<Vec<StereoSample>>(QUEUE_BLOCKS);
        let (ready_tx, ready_rx) = bounded::<Result<u32, String>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let stream = match build_stream(preferred_rate, rx) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Hold the stream until the sink finishes
                let _ = stop_rx.recv();
                drop(stream);
                info!("Audio output closed");
            })
            .map_err(|e| SoundscapeError::AudioOutput(e.to_string()))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| SoundscapeError::AudioOutput("output thread exited".into()))?
            .map_err(SoundscapeError::AudioOutput)?;

        Ok(Self {
            tx: Some(tx),
            stop_tx: Some(stop_tx),
            sample_rate,
        })
    }

    /// Rate the device actually runs at; the synth must be built for it.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_stream(
    preferred_rate: u32,
    rx: Receiver<Vec<StereoSample>>,
) -> Result<(cpal::Stream, u32), String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "No default audio output device found".to_string())?;

    info!(
        "Audio output: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| format!("No supported output config: {e}"))?;

    let preferred = cpal::SampleRate(preferred_rate);
    let matching = device.supported_output_configs().ok().and_then(|configs| {
        configs
            .filter(|c| c.min_sample_rate() <= preferred && c.max_sample_rate() >= preferred)
            .max_by_key(|c| c.channels())
            .map(|c| c.with_sample_rate(preferred))
    });

    let (config, sample_rate, format): (StreamConfig, u32, SampleFormat) = match matching {
        Some(cfg) => {
            let sr = cfg.sample_rate().0;
            let fmt = cfg.sample_format();
            (cfg.into(), sr, fmt)
        }
        None => {
            let sr = supported.sample_rate().0;
            warn!("Output device does not run at {}Hz, using {}Hz", preferred_rate, sr);
            let fmt = supported.sample_format();
            (supported.into(), sr, fmt)
        }
    };
    let channels = config.channels as usize;
    info!("Output config: {}Hz  {} ch  {:?}", sample_rate, channels, format);

    let err_fn = |e: cpal::StreamError| error!("Audio stream error: {e}");
    let mut feed = BlockFeed::new(rx);

    let stream = match format {
        SampleFormat::F32 => device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| feed.fill(data, channels, |s| s),
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        SampleFormat::I16 => device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    feed.fill(data, channels, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                },
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        fmt => {
            return Err(format!(
                "Unsupported sample format {fmt:?}. Use an F32 or I16 device."
            ))
        }
    };

    stream.play().map_err(|e| e.to_string())?;
    Ok((stream, sample_rate))
}

/// Callback-side reader: walks queued blocks, silence on underrun.
struct BlockFeed {
    rx: Receiver<Vec<StereoSample>>,
    current: Vec<StereoSample>,
    position: usize,
}

impl BlockFeed {
    fn new(rx: Receiver<Vec<StereoSample>>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            position: 0,
        }
    }

    fn next(&mut self) -> StereoSample {
        if self.position >= self.current.len() {
            match self.rx.try_recv() {
                Ok(block) => {
                    self.current = block;
                    self.position = 0;
                }
                Err(_) => return [0.0, 0.0],
            }
        }
        let frame = self.current.get(self.position).copied().unwrap_or([0.0, 0.0]);
        self.position += 1;
        frame
    }

    fn fill<T: Copy>(&mut self, data: &mut [T], channels: usize, convert: impl Fn(f32) -> T) {
        for out in data.chunks_mut(channels.max(1)) {
            let [l, r] = self.next();
            match out.len() {
                1 => out[0] = convert((l + r) * 0.5),
                _ => {
                    out[0] = convert(l);
                    out[1] = convert(r);
                    for extra in out.iter_mut().skip(2) {
                        *extra = convert(0.0);
                    }
                }
            }
        }
    }
}

impl AudioSink for CpalSink {
    fn name(&self) -> &str {
        "cpal"
    }

    fn write(&mut self, block: &[StereoSample]) -> Result<(), SoundscapeError> {
        match &self.tx {
            Some(tx) => tx
                .send(block.to_vec())
                .map_err(|_| SoundscapeError::AudioOutput("output stream closed".into())),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<(), SoundscapeError> {
        self.tx = None;
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}
