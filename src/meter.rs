//! Standalone signal meter: one synchronous capture window, printed as the
//! same 0-100 level the monitoring gauge shows, plus RMS dBFS for people who
//! want to compare against their recording gear.

use crate::audio::{level_from_samples, MicSource};
use crate::config::{AppConfig, MAX_METER_WINDOW_MS, MIN_METER_WINDOW_MS};
use anyhow::{anyhow, Result};
use std::io::{self, Write};
use std::time::Duration;

const SILENCE_FLOOR_DB: f32 = -80.0;

fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENCE_FLOOR_DB;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}

pub fn run_signal_meter(config: &AppConfig) -> Result<()> {
    if !(MIN_METER_WINDOW_MS..=MAX_METER_WINDOW_MS).contains(&config.meter_window_ms) {
        return Err(anyhow!(
            "--meter-window-ms must be between {MIN_METER_WINDOW_MS} and {MAX_METER_WINDOW_MS} ms"
        ));
    }

    let source = MicSource::new(
        config.input_device.as_deref(),
        config.chunk_interval_ms,
        config.chunk_channel_capacity,
    )?;
    println!("Signal meter using input device: {}", source.device_name());
    println!(
        "Sampling for {:.1}s... make some noise near the microphone.",
        config.meter_window_ms as f32 / 1000.0
    );
    io::stdout().flush().ok();

    let samples = source.record_window(Duration::from_millis(config.meter_window_ms))?;
    let level = level_from_samples(&samples);
    let rms = rms_db(&samples);

    println!("\nResults");
    println!("Signal level: {level:.0} / 100");
    println!("RMS: {rms:.1} dBFS");

    if level < 1.0 {
        println!("Note: the input looks silent. Check the device selection and OS permissions.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_db_returns_zero_for_unity_signal() {
        let samples = vec![1.0_f32; 100];
        let rms = rms_db(&samples);
        assert!((rms - 0.0).abs() < 0.01);
    }

    #[test]
    fn rms_db_floors_on_empty_input() {
        assert!((rms_db(&[]) - SILENCE_FLOOR_DB).abs() < f32::EPSILON);
    }

    #[test]
    fn rms_db_drops_with_amplitude() {
        let loud = rms_db(&[0.5_f32; 100]);
        let quiet = rms_db(&[0.05_f32; 100]);
        assert!(quiet < loud);
    }
}
