//! cue-play - play a WAV cue on the configured output device
//!
//! ```text
//! cue-play [--config PATH] <file.wav> [volume] [pan] [speed] [loops]
//! cue-play --list-devices
//! ```
//!
//! The file must be 44100 Hz stereo 16-bit PCM. Device, buffer size, thread
//! priority and curves come from `~/.config/cuemix/cuemix.yaml` unless
//! `--config` names another file. Set RUST_LOG=debug for verbose output.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use cuemix_core::audio::get_output_devices;
use cuemix_core::config::{default_config_path, EngineConfig};
use cuemix_core::{InstanceEventKind, ListenerEvent, QueuedListener};

const USAGE: &str = "usage: cue-play [--config PATH] <file.wav> [volume] [pan] [speed] [loops]
       cue-play --list-devices";

struct Args {
    config: PathBuf,
    file: PathBuf,
    volume: f64,
    pan: f64,
    speed: f64,
    loops: i32,
}

enum Command {
    ListDevices,
    Play(Args),
}

fn parse_value<T: FromStr>(value: Option<&String>, name: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid {}: {:?}", name, raw)),
        None => Ok(default),
    }
}

fn parse_args() -> Result<Command> {
    let mut config = default_config_path();
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list-devices" => return Ok(Command::ListDevices),
            "--config" => {
                config = PathBuf::from(args.next().context("--config needs a path")?);
            }
            "-h" | "--help" => bail!("{}", USAGE),
            _ => positional.push(arg),
        }
    }

    let Some(file) = positional.first() else {
        bail!("{}", USAGE);
    };
    Ok(Command::Play(Args {
        config,
        file: PathBuf::from(file),
        volume: parse_value(positional.get(1), "volume", 1.0)?,
        pan: parse_value(positional.get(2), "pan", 0.0)?,
        speed: parse_value(positional.get(3), "speed", 1.0)?,
        loops: parse_value(positional.get(4), "loops", 0)?,
    }))
}

fn list_devices() -> Result<()> {
    let devices = get_output_devices().context("Failed to enumerate output devices")?;
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

fn play(args: Args) -> Result<()> {
    let config = EngineConfig::load(&args.config);
    let cue = config
        .load_cue(&args.file)
        .with_context(|| format!("Failed to load {:?}", args.file))?;
    log::info!(
        "Loaded '{}': {} frames ({:.2} s)",
        cue.name(),
        cue.frame_length(),
        cue.microsecond_length() as f64 / 1_000_000.0
    );

    let listener = QueuedListener::new(256);
    cue.add_listener(listener.clone());
    config.open_cue(&cue).context("Failed to open output")?;

    let Some(instance) = cue.play(args.volume, args.pan, args.speed, args.loops) else {
        bail!("no free instance on '{}'", cue.name());
    };

    let events = listener.receiver();
    loop {
        let event = events.recv().context("Listener channel closed")?;
        if let ListenerEvent::Instance(event) = event {
            log::info!(
                "{} instance {} {:?} at frame {:.1}",
                event.cue,
                event.instance,
                event.kind,
                event.frame
            );
            if event.instance == instance && event.kind == InstanceEventKind::Release {
                break;
            }
        }
    }

    cue.close()?;
    if listener.dropped() > 0 {
        log::warn!("{} events were dropped", listener.dropped());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match parse_args()? {
        Command::ListDevices => list_devices(),
        Command::Play(args) => play(args),
    }
}
