use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};

use audio_stream_core::processing::mixer::{peak_level, rms_level};
use audio_stream_core::processing::waveform::{min_max_columns, sample_to_row};
use audio_stream_core::{AudioDriver, AudioSubsystem, SampleProducer};

const REFRESH: Duration = Duration::from_millis(100);
const WAVEFORM_COLUMNS: usize = 64;
const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub struct RecordOptions {
    pub device: Option<String>,
    pub seconds: u64,
    pub buffer_secs: u32,
    pub sample_rate: u32,
    pub looping: bool,
    pub monitor: Option<String>,
    pub gain: f32,
}

pub struct ToneOptions {
    pub device: Option<String>,
    pub frequency: f32,
    pub seconds: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub gain: f32,
}

pub fn list_devices<D: AudioDriver>(audio: &mut AudioSubsystem<D>, json: bool) -> anyhow::Result<()> {
    if json {
        let devices = audio.devices()?;
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let selected = audio.host_api()?.id;
    for api in audio.host_apis()? {
        let marker = if api.id == selected { "*" } else { " " };
        println!("{} [{}] {}", marker, api.id.0, api.name);
        for device in audio.list_devices(api.id)? {
            let mut tags = Vec::new();
            if api.default_input_device == Some(device.global_device_index) {
                tags.push("default input");
            }
            if api.default_output_device == Some(device.global_device_index) {
                tags.push("default output");
            }
            println!(
                "    {:<40} in:{:<2} out:{:<2} {:>6} Hz {}",
                device.name,
                device.max_input_channels,
                device.max_output_channels,
                device.default_sample_rate,
                tags.join(", ")
            );
        }
    }
    Ok(())
}

pub fn record<D: AudioDriver>(audio: &mut AudioSubsystem<D>, options: RecordOptions) -> anyhow::Result<()> {
    let device = match options.device {
        Some(name) => name,
        None => audio
            .default_input_device()?
            .map(|d| d.name)
            .ok_or_else(|| anyhow!("no default input device"))?,
    };

    audio
        .start_recording(
            &device,
            options.looping,
            options.buffer_secs,
            options.sample_rate,
            options.monitor.as_deref(),
            options.gain,
        )
        .with_context(|| format!("starting capture on {}", device))?;
    log::info!("Recording from {}", device);

    // Draw the most recent fifth of a second.
    let mut window = vec![0.0f32; (options.sample_rate / 5).max(1) as usize];
    let deadline = Instant::now() + Duration::from_secs(options.seconds);
    while Instant::now() < deadline {
        thread::sleep(REFRESH);
        audio.recorded_samples(&device, 0, &mut window)?;
        println!(
            "{} rms {:.3} peak {:.3}",
            render_waveform(&window),
            rms_level(&window),
            peak_level(&window)
        );
        if !audio.is_recording(&device)? {
            log::info!("Buffer full after {} frames", audio.position(&device)?);
            break;
        }
    }

    audio.stop_recording(&device)?;
    Ok(())
}

pub fn play_tone<D: AudioDriver>(audio: &mut AudioSubsystem<D>, options: ToneOptions) -> anyhow::Result<()> {
    let device = match options.device {
        Some(name) => name,
        None => audio
            .default_output_device()?
            .map(|d| d.name)
            .ok_or_else(|| anyhow!("no default output device"))?,
    };

    let producer = sine_producer(options.frequency, options.sample_rate, options.channels, options.gain);
    audio
        .start_playback(&device, options.channels, 1, options.sample_rate, producer)
        .with_context(|| format!("starting playback on {}", device))?;
    log::info!("Playing {} Hz on {}", options.frequency, device);

    thread::sleep(Duration::from_secs(options.seconds));
    audio.stop_playback(&device)?;
    Ok(())
}

/// A sine wave written to every channel. The producer owns its play position.
fn sine_producer(frequency: f32, sample_rate: u32, channels: u16, gain: f32) -> SampleProducer {
    let position = Arc::new(AtomicU64::new(0));
    let channels = channels.max(1) as usize;
    let step = TAU * frequency / sample_rate as f32;
    Arc::new(move |buffer: &mut [f32]| {
        let frames = (buffer.len() / channels) as u64;
        let start = position.fetch_add(frames, Ordering::Relaxed);
        for (offset, frame) in buffer.chunks_mut(channels).enumerate() {
            let n = (start + offset as u64) % sample_rate as u64;
            frame.fill((step * n as f32).sin() * gain);
        }
    })
}

fn render_waveform(samples: &[f32]) -> String {
    min_max_columns(samples, WAVEFORM_COLUMNS)
        .iter()
        .map(|column| {
            let swing = (column.max - column.min).clamp(0.0, 2.0) - 1.0;
            LEVELS[sample_to_row(swing, LEVELS.len())]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sine_continues_across_calls() {
        let producer = sine_producer(1.0, 4, 2, 1.0);
        let mut first = [0.0f32; 4];
        let mut second = [0.0f32; 4];
        producer(&mut first);
        producer(&mut second);

        // Quarter-period steps: 0, 1, 0, -1 on both channels.
        assert_relative_eq!(first[0], 0.0);
        assert_relative_eq!(first[2], 1.0);
        assert_relative_eq!(first[3], 1.0);
        assert_relative_eq!(second[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(second[2], -1.0);
    }

    #[test]
    fn silence_draws_the_lowest_level() {
        let line = render_waveform(&[0.0; 128]);
        assert_eq!(line.chars().count(), WAVEFORM_COLUMNS);
        assert!(line.chars().all(|c| c == LEVELS[0]));
    }

    #[test]
    fn full_swing_draws_the_highest_level() {
        let samples: Vec<f32> = (0..128).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(render_waveform(&samples).chars().all(|c| c == LEVELS[7]));
    }
}
