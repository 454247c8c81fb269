//! Terminal UI shell for the monitoring console: owns the session, the status
//! line, and the debug log file the rest of the crate writes to.

use std::{
    env, fs,
    io::Write,
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::audio::MicSource;
use crate::classify::HttpClassifier;
use crate::config::AppConfig;
use crate::monitor::{DetectionEvent, MonitorSession, SessionStats};
use std::time::Duration;

/// Path to the temp log file we rotate between runs.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("aeromon_tui.log")
}

/// Write debug messages to a temp file so we can troubleshoot without
/// corrupting the TUI. Per-chunk submission failures land here, not on screen.
pub fn log_debug(msg: &str) {
    use std::fs::OpenOptions;

    let log_path = log_file_path();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
        let _ = writeln!(file, "[{timestamp}] {msg}");
    }
}

/// Remove the log file if it grows past 5 MB between runs.
pub fn init_debug_log_file() {
    let log_path = log_file_path();
    if let Ok(metadata) = fs::metadata(&log_path) {
        const MAX_BYTES: u64 = 5 * 1024 * 1024;
        if metadata.len() > MAX_BYTES {
            let _ = fs::remove_file(&log_path);
        }
    }
}

/// Central application state shared between the event loop and the renderer.
pub struct App {
    config: AppConfig,
    session: Option<MonitorSession>,
    status: String,
    redraw: bool,
}

impl App {
    /// Create the application state with default status text.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            session: None,
            status: "Inactive. Press S to start monitoring.".into(),
            redraw: true,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map(MonitorSession::is_active)
            .unwrap_or(false)
    }

    pub fn signal_level(&self) -> f32 {
        self.session
            .as_ref()
            .map(MonitorSession::signal_level)
            .unwrap_or(0.0)
    }

    pub fn detections(&self) -> Vec<DetectionEvent> {
        self.session
            .as_ref()
            .map(MonitorSession::detections)
            .unwrap_or_default()
    }

    pub fn stats(&self) -> SessionStats {
        self.session
            .as_ref()
            .map(MonitorSession::stats)
            .unwrap_or_default()
    }

    pub fn alert_threshold(&self) -> f32 {
        self.config.alert_threshold
    }

    /// Build the device source and HTTP client lazily so simply opening the
    /// console never touches the microphone.
    fn ensure_session(&mut self) -> anyhow::Result<&mut MonitorSession> {
        if self.session.is_none() {
            let source = MicSource::new(
                self.config.input_device.as_deref(),
                self.config.chunk_interval_ms,
                self.config.chunk_channel_capacity,
            )?;
            let classifier = Arc::new(HttpClassifier::new(
                &self.config.backend_url,
                self.config.model.clone(),
                Duration::from_millis(self.config.http_timeout_ms),
            )?);
            self.session = Some(MonitorSession::new(Box::new(source), classifier));
        }
        Ok(self.session.as_mut().expect("session initialized"))
    }

    /// Start or stop monitoring depending on the current state.
    pub fn toggle_monitoring(&mut self) {
        if self.is_active() {
            self.stop_monitoring();
        } else {
            self.start_monitoring();
        }
    }

    pub fn start_monitoring(&mut self) {
        if self.is_active() {
            return;
        }
        let backend = self.config.backend_url.clone();
        let interval_s = self.config.chunk_interval_ms as f32 / 1000.0;
        let outcome = self
            .ensure_session()
            .and_then(|session| session.start().map_err(anyhow::Error::from));
        match outcome {
            Ok(()) => {
                self.status = format!("Active. Streaming {interval_s:.0}s chunks to {backend}.");
                log_debug("monitoring started");
            }
            Err(err) => {
                self.status = format!("Cannot start monitoring: {err:#}");
                log_debug(&format!("monitoring start failed: {err:#}"));
            }
        }
        self.redraw = true;
    }

    pub fn stop_monitoring(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        self.status = "Inactive. Press S to start monitoring.".into();
        self.redraw = true;
    }

    pub fn clear_detections(&mut self) {
        if let Some(session) = self.session.as_ref() {
            session.clear_detections();
        }
        self.redraw = true;
    }

    /// Final teardown before leaving the alternate screen.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }

    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }
}
