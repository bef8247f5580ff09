use anyhow::{Context, Result};
use ascii_reel::utils::format_duration;
use ascii_reel::{
    extract_audio, load_video, AudioControl, AudioCoordinator, AudioSession, CancelToken, Cli,
    FrameConverter, PlaybackScheduler, PlaybackState, RawModeGuard, TerminalRenderer,
    VideoDecoder, VERSION,
};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use log::{debug, error, info, warn};
use std::io::{self, BufWriter};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Frames are scaled at decode time to this multiple of the output width
const DECODE_OVERSAMPLE: u32 = 4;

/// Exit status after a user interrupt (128 + SIGINT)
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    info!("Starting ASCII Reel v{}", VERSION);

    if cli.info_only {
        return print_info(&cli);
    }

    info!("Playing: {}", cli.file_path.display());
    let config = cli.config();
    debug!("Config: {}", serde_json::to_string(&config)?);

    if !atty::is(atty::Stream::Stdout) {
        warn!("stdout is not a terminal; frames will be written as raw escape sequences");
    }

    // Decode everything before playback starts so decoding never stalls the clock
    let max_width = u32::from(config.render.width) * DECODE_OVERSAMPLE;
    let video = load_video(&cli.file_path, Some(max_width))
        .with_context(|| format!("Failed to decode '{}'", cli.file_path.display()))?;
    info!(
        "Loaded {} frames, {:.2} FPS, {}",
        video.frame_count(),
        video.fps,
        format_duration(video.duration())
    );

    let cancel = CancelToken::new();
    let listener = spawn_input_listener(cancel.clone());
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let raw_mode = match RawModeGuard::enable() {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("Could not enable raw mode, keyboard controls disabled: {}", e);
            None
        }
    };

    let out = BufWriter::with_capacity(1 << 16, io::stdout());
    let mut scheduler = PlaybackScheduler::new(
        TerminalRenderer::new(out, config.clear_screen),
        FrameConverter::new(config.render.clone()),
        cancel.clone(),
    );

    // Audio comes up last so its start is as close as possible to the video clock's zero
    let mut audio = if config.audio {
        start_audio(&cli.file_path)
    } else {
        None
    };

    let result = scheduler
        .run(video, audio.as_mut().map(|s| s as &mut dyn AudioControl))
        .await;

    drop(scheduler);
    drop(raw_mode);
    drop(audio);

    // Release the input listener
    cancel.cancel();
    ctrl_c.abort();
    if listener.join().is_err() {
        warn!("Input listener panicked");
    }

    let report = result.context("Playback failed")?;
    if report.state == PlaybackState::Interrupted {
        info!("Stopped.");
        std::process::exit(EXIT_INTERRUPTED);
    }

    info!("Playback finished");
    Ok(())
}

/// Print stream metadata without playing
fn print_info(cli: &Cli) -> Result<()> {
    let decoder = VideoDecoder::new(&cli.file_path)
        .with_context(|| format!("Failed to open '{}'", cli.file_path.display()))?;
    let info = decoder.info();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(info)?);
        return Ok(());
    }

    println!("Video Information:");
    println!("  File: {}", cli.file_path.display());
    println!("  Dimensions: {}x{}", info.width, info.height);
    println!("  Frame Rate: {:.2} FPS", info.fps);
    println!("  Duration: {}", format_duration(info.duration));
    println!("  Aspect Ratio: {:.2}", info.width as f64 / info.height.max(1) as f64);
    println!("  Audio: {}", if info.has_audio { "yes" } else { "no" });
    Ok(())
}

/// Extract and start the audio track. Any failure degrades to muted playback.
fn start_audio(path: &Path) -> Option<AudioSession> {
    let track = match extract_audio(path) {
        Ok(Some(track)) => track,
        Ok(None) => {
            warn!("No audio track found, playing muted");
            return None;
        }
        Err(e) => {
            warn!("{}, playing muted", e);
            return None;
        }
    };

    match AudioCoordinator::new().start(track) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!("{}, playing muted", e);
            None
        }
    }
}

/// Watch for q, Esc or Ctrl+C until `cancel` is set
fn spawn_input_listener(cancel: CancelToken) -> JoinHandle<()> {
    thread::spawn(move || {
        while !cancel.is_cancelled() {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!("Input polling unavailable: {}", e);
                    return;
                }
            }

            match event::read() {
                Ok(Event::Key(key_event)) => match key_event.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        info!("Quit requested by user");
                        cancel.cancel();
                    }
                    KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                        info!("Ctrl+C pressed, exiting");
                        cancel.cancel();
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(e) => {
                    debug!("Input read failed: {}", e);
                    return;
                }
            }
        }
    })
}
