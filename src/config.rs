//! Command-line parsing and validation helpers.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

/// Chunk lengths the backend's stream endpoint is tuned for.
pub const ALLOWED_CHUNK_INTERVALS_MS: &[u64] = &[1_000, 3_000, 5_000];

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_CHUNK_INTERVAL_MS: u64 = 3_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_ALERT_THRESHOLD: f32 = 95.0;
const DEFAULT_CHUNK_CHANNEL_CAPACITY: usize = 4;
const DEFAULT_METER_WINDOW_MS: u64 = 2_000;

pub const MIN_METER_WINDOW_MS: u64 = 500;
pub const MAX_METER_WINDOW_MS: u64 = 10_000;

/// CLI options for the monitoring console. Validated values keep the capture
/// loop and the HTTP client inside known-safe bounds.
#[derive(Debug, Parser, Clone)]
#[command(about = "Acoustic aircraft monitoring console", author, version)]
pub struct AppConfig {
    /// Base URL of the classification backend
    #[arg(long, default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Length of each captured audio chunk in milliseconds (1000, 3000 or 5000)
    #[arg(long = "chunk-interval-ms", default_value_t = DEFAULT_CHUNK_INTERVAL_MS)]
    pub chunk_interval_ms: u64,

    /// Model key forwarded to the backend; omit to use the backend's default
    #[arg(long)]
    pub model: Option<String>,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print the backend's active models and exit
    #[arg(long = "list-models", default_value_t = false)]
    pub list_models: bool,

    /// Analyze a single audio file via the backend and exit
    #[arg(long, value_name = "FILE")]
    pub analyze: Option<PathBuf>,

    /// Sample the microphone level once and exit
    #[arg(long = "signal-meter", default_value_t = false)]
    pub signal_meter: bool,

    /// Sampling window for --signal-meter (milliseconds)
    #[arg(long = "meter-window-ms", default_value_t = DEFAULT_METER_WINDOW_MS)]
    pub meter_window_ms: u64,

    /// Print an environment diagnostics report and exit
    #[arg(long, default_value_t = false)]
    pub doctor: bool,

    /// HTTP timeout for classification requests (milliseconds)
    #[arg(long = "http-timeout-ms", default_value_t = DEFAULT_HTTP_TIMEOUT_MS)]
    pub http_timeout_ms: u64,

    /// Confidence (0-100) at or above which a detection is highlighted
    #[arg(long = "alert-threshold", default_value_t = DEFAULT_ALERT_THRESHOLD)]
    pub alert_threshold: f32,

    /// Chunk channel capacity between the capture callback and the pump
    #[arg(
        long = "chunk-channel-capacity",
        default_value_t = DEFAULT_CHUNK_CHANNEL_CAPACITY
    )]
    pub chunk_channel_capacity: usize,
}

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the backend URL.
    pub fn validate(&mut self) -> Result<()> {
        let trimmed = self.backend_url.trim().trim_end_matches('/').to_string();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            bail!(
                "--backend-url must start with http:// or https://, got '{}'",
                self.backend_url
            );
        }
        if trimmed.len() <= "http://".len() {
            bail!("--backend-url is missing a host");
        }
        self.backend_url = trimmed;

        if !ALLOWED_CHUNK_INTERVALS_MS.contains(&self.chunk_interval_ms) {
            bail!(
                "--chunk-interval-ms must be one of {ALLOWED_CHUNK_INTERVALS_MS:?}, got {}",
                self.chunk_interval_ms
            );
        }

        if !(1_000..=120_000).contains(&self.http_timeout_ms) {
            bail!(
                "--http-timeout-ms must be between 1000 and 120000, got {}",
                self.http_timeout_ms
            );
        }

        if !(0.0..=100.0).contains(&self.alert_threshold) {
            bail!(
                "--alert-threshold must be between 0 and 100, got {}",
                self.alert_threshold
            );
        }

        if !(1..=64).contains(&self.chunk_channel_capacity) {
            bail!(
                "--chunk-channel-capacity must be between 1 and 64, got {}",
                self.chunk_channel_capacity
            );
        }

        if !(MIN_METER_WINDOW_MS..=MAX_METER_WINDOW_MS).contains(&self.meter_window_ms) {
            bail!(
                "--meter-window-ms must be between {MIN_METER_WINDOW_MS} and {MAX_METER_WINDOW_MS}, got {}",
                self.meter_window_ms
            );
        }

        if let Some(model) = &self.model {
            if model.trim().is_empty() || model.len() > 64 {
                bail!("--model must be a non-empty key of at most 64 characters");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn accepts_valid_defaults() {
        let mut cfg = AppConfig::parse_from(["test-app"]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.backend_url, "http://127.0.0.1:5000");
    }

    #[test]
    fn rejects_unsupported_chunk_interval() {
        let mut cfg = AppConfig::parse_from(["test-app", "--chunk-interval-ms", "2000"]);
        assert!(cfg.validate().is_err());

        for allowed in ["1000", "3000", "5000"] {
            let mut cfg = AppConfig::parse_from(["test-app", "--chunk-interval-ms", allowed]);
            assert!(cfg.validate().is_ok(), "{allowed} ms should be accepted");
        }
    }

    #[test]
    fn normalizes_backend_url_trailing_slash() {
        let mut cfg =
            AppConfig::parse_from(["test-app", "--backend-url", "http://localhost:5000/"]);
        cfg.validate().expect("url should validate");
        assert_eq!(cfg.backend_url, "http://localhost:5000");
    }

    #[test]
    fn rejects_backend_url_without_scheme() {
        let mut cfg = AppConfig::parse_from(["test-app", "--backend-url", "localhost:5000"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_alert_threshold_out_of_range() {
        let mut cfg = AppConfig::parse_from(["test-app", "--alert-threshold", "120"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_model_key() {
        let mut cfg = AppConfig::parse_from(["test-app", "--model", "  "]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_meter_window_out_of_bounds() {
        let mut cfg = AppConfig::parse_from(["test-app", "--meter-window-ms", "100"]);
        assert!(cfg.validate().is_err());
    }
}
