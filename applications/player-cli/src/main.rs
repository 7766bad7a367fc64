/// Aural Player - command-line audio player
use anyhow::{bail, Context};
use aural_audio_desktop::{CpalHost, DeviceHost, DeviceOutputManager};
use aural_core::{DeviceDescriptor, EqualizerPreset};
use aural_player::commands::{self, format_position, Command};
use aural_player::{analyze, PlayerConfig};
use aural_playback::{PlaybackEngine, PlaybackEvent, PlaybackState};
use clap::{Parser, Subcommand};
use crossbeam_channel::{never, select, unbounded, Receiver};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "aural-player")]
#[command(about = "Play and analyze audio files with a 10-band equalizer", long_about = None)]
struct Cli {
    /// Configuration file path (default: ./aural.toml when present)
    #[arg(short, long, global = true, env = "AURAL_CONFIG")]
    config: Option<PathBuf>,

    /// Print events and reports as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a file, reading transport commands from stdin
    Play {
        /// Audio file (MP3, WAV, FLAC or Ogg Vorbis)
        file: PathBuf,
        /// Equalizer preset name
        #[arg(short, long)]
        preset: Option<String>,
        /// Ten comma-separated band gains in dB
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        gains: Option<Vec<f32>>,
        /// Volume 0-100
        #[arg(short, long)]
        volume: Option<u8>,
        /// Output device name instead of the system default
        #[arg(short, long)]
        device: Option<String>,
        /// Start position (seconds or m:ss)
        #[arg(short, long)]
        start: Option<String>,
    },
    /// Render a file offline and print the level around each EQ band
    Analyze {
        /// Audio file
        file: PathBuf,
        /// Equalizer preset name
        #[arg(short, long, default_value = "flat")]
        preset: String,
        /// Seconds of audio to render
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
    /// List output devices
    Devices,
    /// List built-in and configured presets
    Presets,
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aural=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = PlayerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Play {
            file,
            preset,
            gains,
            volume,
            device,
            start,
        } => {
            let options = PlayOptions {
                preset,
                gains,
                volume,
                device,
                start,
                json: cli.json,
            };
            play(&config, file, options)?;
        }
        Commands::Analyze {
            file,
            preset,
            seconds,
        } => analyze_file(&config, &file, &preset, seconds, cli.json)?,
        Commands::Devices => list_devices(&config, cli.json)?,
        Commands::Presets => list_presets(&config, cli.json)?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

struct PlayOptions {
    preset: Option<String>,
    gains: Option<Vec<f32>>,
    volume: Option<u8>,
    device: Option<String>,
    start: Option<String>,
    json: bool,
}

fn play(config: &PlayerConfig, file: PathBuf, options: PlayOptions) -> anyhow::Result<()> {
    let mut engine_config = config.engine.clone();
    if let Some(volume) = options.volume {
        engine_config.volume = volume.min(100);
    }
    let start = match options.start.as_deref() {
        Some(text) => commands::parse_position(text)?,
        None => Duration::ZERO,
    };

    let output = DeviceOutputManager::new(CpalHost::new(), config.output.clone())?;
    let engine = PlaybackEngine::new(engine_config, Box::new(output))?;

    if let Some(name) = options.device.or_else(|| config.output.device.clone()) {
        let opened = engine.open_device(Some(DeviceDescriptor::new(name, 0, 0, false)))?;
        tracing::info!("Using output device {}", opened);
    }
    if let Some(name) = options.preset {
        engine.apply_preset(&config.preset(&name)?);
    }
    if let Some(gains) = options.gains {
        engine.set_gains(&gains)?;
    }

    let events = engine.events();
    let properties = engine
        .load(&file, start)
        .with_context(|| format!("cannot play {}", file.display()))?;
    if !options.json {
        println!(
            "Playing {} ({} Hz, {} ch, {}) - type 'help' for commands",
            file.display(),
            properties.sample_rate,
            properties.channels,
            properties.family.name()
        );
    }

    let lines = stdin_lines();
    let closed = never();
    let mut stdin_open = true;
    loop {
        let input = if stdin_open { &lines } else { &closed };
        select! {
            recv(input) -> line => match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = run_command(config, &engine, command) {
                            eprintln!("{e}");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                // stdin closed: keep playing until the track ends
                Err(_) => stdin_open = false,
            },
            recv(events) -> event => {
                let Ok(event) = event else { break };
                print_event(&event, options.json)?;
                match event {
                    PlaybackEvent::TrackFinished { .. } => break,
                    PlaybackEvent::TrackFailed { message, .. } if !stdin_open => bail!(message),
                    _ => {}
                }
            },
        }
    }

    engine.stop()?;
    Ok(())
}

/// Lines typed on stdin, on their own thread
fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name("aural-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map(|_| ())
        .unwrap_or_else(|e| tracing::warn!("stdin reader unavailable: {}", e));
    rx
}

fn run_command(
    config: &PlayerConfig,
    engine: &PlaybackEngine,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Play => engine.play()?,
        Command::Pause => engine.pause()?,
        Command::Resume => engine.resume()?,
        Command::Stop => engine.stop()?,
        Command::Seek(position) => {
            let landed = engine.seek(position)?;
            println!("at {}", format_position(landed));
        }
        Command::Eq(band, gain) => {
            let applied = engine.set_band_gain(band, gain)?;
            println!("band {band}: {applied:+.1} dB");
        }
        Command::Preset(name) => engine.apply_preset(&config.preset(&name)?),
        Command::Volume(level) => engine.set_volume(level)?,
        Command::Mute(muted) => engine.set_muted(muted)?,
        Command::Next(path) => {
            engine.next(&path)?;
        }
        Command::Status => print_status(engine),
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn print_status(engine: &PlaybackEngine) {
    let state = engine.state();
    print!("{state} {}", format_position(engine.position()));
    if let Some(path) = engine.current_path() {
        print!(" {}", path.display());
    }
    println!(
        " | vol {}{} | preset {} | buffered {} | underruns {}",
        engine.volume(),
        if engine.is_muted() { " (muted)" } else { "" },
        engine.preset_name(),
        engine.buffered(),
        engine.underruns()
    );
    if state == PlaybackState::Failed {
        if let Some(reason) = engine.failure() {
            println!("failed: {reason}");
        }
    }
}

fn print_event(event: &PlaybackEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        PlaybackEvent::StateChanged { state } => println!("[{state}]"),
        PlaybackEvent::TrackFinished { path } => println!("finished {}", path.display()),
        PlaybackEvent::TrackFailed { kind, message, .. } => eprintln!("failed ({kind}): {message}"),
        PlaybackEvent::Warning { kind, message } => eprintln!("warning ({kind}): {message}"),
        PlaybackEvent::DeviceChanged { device, gap_ms } if *gap_ms > 0 => {
            println!("output moved to {device} ({gap_ms} ms gap)");
        }
        PlaybackEvent::DeviceChanged { device, .. } => println!("output: {device}"),
        PlaybackEvent::VolumeChanged { level, is_muted } => {
            println!("volume {level}{}", if *is_muted { " (muted)" } else { "" });
        }
        PlaybackEvent::PresetChanged { name, gains } => println!("preset {name} {gains:?}"),
        PlaybackEvent::TrackLoaded { .. } | PlaybackEvent::PositionChanged { .. } => {}
    }
    Ok(())
}

fn analyze_file(
    config: &PlayerConfig,
    file: &std::path::Path,
    preset: &str,
    seconds: f64,
    json: bool,
) -> anyhow::Result<()> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let preset = config.preset(preset)?;
    let report = analyze(
        file,
        &preset,
        Duration::from_secs_f64(seconds),
        config.engine.block_frames,
        config.engine.spectrum,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "{} | {} {} Hz | preset {} | {:.1} s, {} frames, {} blocks skipped",
        file.display(),
        report.decoder,
        report.sample_rate,
        report.preset,
        report.rendered.as_secs_f64(),
        report.frames,
        report.skipped_blocks
    );
    for (center, level) in &report.bands {
        let bar = "#".repeat(((level + 100.0).max(0.0) / 2.5) as usize);
        println!("{center:>8.1} Hz {level:>7.1} dB {bar}");
    }
    Ok(())
}

fn list_devices(config: &PlayerConfig, json: bool) -> anyhow::Result<()> {
    let host = CpalHost::new();
    let devices = host.devices()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    println!("{} output devices ({} host):", devices.len(), host.name());
    for device in devices {
        let selected = config.output.device.as_deref() == Some(device.name.as_str());
        println!("  {}{}", device, if selected { " [configured]" } else { "" });
    }
    Ok(())
}

fn list_presets(config: &PlayerConfig, json: bool) -> anyhow::Result<()> {
    let mut presets = config.user_presets()?;
    presets.extend(EqualizerPreset::builtins());
    if json {
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }
    for preset in presets {
        let gains: Vec<String> = preset.gains().iter().map(|g| format!("{g:+.0}")).collect();
        println!("  {:<14} {}", preset.name(), gains.join(" "));
    }
    Ok(())
}
