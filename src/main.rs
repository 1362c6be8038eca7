use motion_soundscape::app::{RunOptions, SessionState, Soundscape};
use motion_soundscape::capture::SourceKind;
use motion_soundscape::config::SoundscapeConfig;
use motion_soundscape::scale::{build_scale, named_scale, note_name};

use clap::Parser;
use log::{debug, error, info};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "motion-soundscape")]
#[command(about = "Turn camera motion into a generative audio-visual soundscape")]
struct Cli {
    /// Frame source: "simulated" or "camera"
    #[arg(long, default_value = "simulated")]
    source: SourceKind,

    /// Load settings from a JSON file (flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record the soundscape to a WAV file (stats written next to it)
    #[arg(long)]
    record: Option<PathBuf>,

    /// Play through the default audio device (requires the `audio` feature)
    #[arg(long)]
    live: bool,

    /// Show the visualization in the terminal
    #[arg(long)]
    console: bool,

    /// Canvas size in pixels, e.g. 1280x720
    #[arg(long, value_parser = parse_size)]
    canvas: Option<(usize, usize)>,

    /// Console display refresh rate (Hz)
    #[arg(long)]
    display_hz: Option<u32>,

    /// Amplitude rows in the motion grid
    #[arg(long)]
    rows: Option<usize>,

    /// Motion threshold, fraction of changed pixels (0..1]
    #[arg(long)]
    threshold: Option<f32>,

    /// Scale: "major", "pentatonic" or "chromatic"
    #[arg(long)]
    scale: Option<String>,

    /// Lowest MIDI note of the instrument
    #[arg(long)]
    lowest: Option<i32>,

    /// Highest MIDI note of the instrument
    #[arg(long)]
    highest: Option<i32>,

    /// Do not mirror the camera image
    #[arg(long)]
    no_mirror: bool,

    /// Wait for Enter on stdin before starting (the start gesture)
    #[arg(long)]
    wait_for_start: bool,

    /// Stop after this many seconds (finalizes any recording)
    #[arg(long)]
    duration: Option<f64>,

    /// Seed all randomness for a reproducible session
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(msg) => {
            error!("{}", msg);
            process::exit(2);
        }
    };

    let notes = build_scale(config.lowest_note, config.highest_note, &config.scale);
    info!("═══════════════════════════════════════════════");
    info!("  MOTION SOUNDSCAPE v{}", env!("CARGO_PKG_VERSION"));
    info!("  Source: {}", cli.source);
    info!(
        "  Instrument: {} notes, {} → {}",
        notes.len(),
        note_name(config.lowest_note),
        note_name(config.highest_note)
    );
    info!("  Grid: {} rows, threshold {:.2}", config.rows, config.threshold);
    if cli.live { info!("  Audio: live output"); }
    if let Some(path) = &cli.record { info!("  Audio: recording → {:?}", path); }
    if cli.console { info!("  UI: Console"); }
    info!("═══════════════════════════════════════════════");

    let options = RunOptions {
        record: cli.record.clone(),
        live_audio: cli.live,
        console: cli.console,
        seed: cli.seed,
        ..Default::default()
    };
    let mut soundscape = Soundscape::new(config, options);

    if cli.wait_for_start {
        info!("Press Enter to start.");
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() {
                break;
            }
            match soundscape.start(cli.source) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    info!("Press Enter to try again.");
                }
            }
        }
        if soundscape.state() == SessionState::Idle {
            info!("No start gesture received, exiting.");
            return;
        }
    } else if let Err(e) = soundscape.start(cli.source) {
        eprintln!("{}", e.user_message());
        process::exit(1);
    }

    match cli.duration {
        Some(secs) => {
            thread::sleep(Duration::from_secs_f64(secs.max(0.0)));
            soundscape.shutdown();
        }
        None => {
            info!("Running. Press Ctrl+C to stop.");
            // Later gestures are no-ops; keep reading so they are logged as such.
            if cli.wait_for_start {
                for line in io::stdin().lock().lines() {
                    if line.is_err() {
                        break;
                    }
                    match soundscape.start(cli.source) {
                        Ok(_) => debug!("Start gesture while running, ignored"),
                        Err(e) => debug!("Start gesture while running failed: {}", e),
                    }
                }
            }
            loop {
                thread::park();
            }
        }
    }
}

fn build_config(cli: &Cli) -> Result<SoundscapeConfig, String> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {:?}: {}", path, e))?;
            serde_json::from_str(&text).map_err(|e| format!("Bad config {:?}: {}", path, e))?
        }
        None => SoundscapeConfig::default(),
    };

    if let Some((w, h)) = cli.canvas {
        config.canvas_width = w;
        config.canvas_height = h;
    }
    if let Some(hz) = cli.display_hz { config.display_hz = hz; }
    if let Some(rows) = cli.rows { config.rows = rows; }
    if let Some(t) = cli.threshold { config.threshold = t; }
    if let Some(n) = cli.lowest { config.lowest_note = n; }
    if let Some(n) = cli.highest { config.highest_note = n; }
    if cli.no_mirror { config.mirror = false; }
    if let Some(name) = &cli.scale {
        config.scale = named_scale(name)
            .ok_or_else(|| format!("Unknown scale '{}'", name))?
            .to_vec();
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// "1280x720" → (1280, 720)
fn parse_size(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: usize = w.trim().parse().map_err(|e| format!("bad width '{}': {}", w, e))?;
    let h: usize = h.trim().parse().map_err(|e| format!("bad height '{}': {}", h, e))?;
    if w == 0 || h == 0 {
        return Err("canvas size must be non-zero".into());
    }
    Ok((w, h))
}
