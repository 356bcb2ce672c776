mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use audio_stream_core::{AudioSubsystem, HostApiId, SubsystemConfig};
use audio_stream_cpal::CpalDriver;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SubsystemConfig::from_json(&json)?
        }
        None => SubsystemConfig::default(),
    };
    if let Some(host_api) = cli.host_api {
        config.host_api = Some(HostApiId(host_api));
    }

    let mut audio = AudioSubsystem::with_config(CpalDriver::new(), config)?;
    let result = match cli.command {
        Commands::Devices { json } => commands::list_devices(&mut audio, json),
        Commands::Record {
            device,
            seconds,
            buffer_secs,
            sample_rate,
            once,
            monitor,
            gain,
        } => commands::record(
            &mut audio,
            commands::RecordOptions {
                device,
                seconds,
                buffer_secs,
                sample_rate,
                looping: !once,
                monitor,
                gain,
            },
        ),
        Commands::Tone {
            device,
            frequency,
            seconds,
            sample_rate,
            channels,
            gain,
        } => commands::play_tone(
            &mut audio,
            commands::ToneOptions {
                device,
                frequency,
                seconds,
                sample_rate,
                channels,
                gain,
            },
        ),
    };

    audio.shutdown()?;
    result
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Record, monitor and play audio devices", long_about = None)]
struct Cli {
    /// JSON file with subsystem settings (frames_per_period, host_api).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host API used to resolve device names (see `devices`).
    #[arg(long, global = true)]
    host_api: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List host APIs and their devices.
    Devices {
        /// Print the device list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Record from an input device and draw its waveform.
    Record {
        /// Input device name; the host API's default input when omitted.
        #[arg(short, long)]
        device: Option<String>,
        /// How long to run.
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
        /// Length of the recording buffer.
        #[arg(long, default_value_t = 2)]
        buffer_secs: u32,
        #[arg(short = 'r', long, default_value_t = 48000)]
        sample_rate: u32,
        /// Stop once the buffer is full instead of looping.
        #[arg(long)]
        once: bool,
        /// Output device to monitor the input on.
        #[arg(short, long)]
        monitor: Option<String>,
        /// Monitor amplification.
        #[arg(short, long, default_value_t = 1.0)]
        gain: f32,
    },
    /// Play a sine tone on an output device.
    Tone {
        /// Output device name; the host API's default output when omitted.
        #[arg(short, long)]
        device: Option<String>,
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(short, long, default_value_t = 2)]
        seconds: u64,
        #[arg(short = 'r', long, default_value_t = 48000)]
        sample_rate: u32,
        #[arg(long, default_value_t = 2)]
        channels: u16,
        #[arg(short, long, default_value_t = 0.2)]
        gain: f32,
    },
}
