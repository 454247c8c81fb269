use crate::{audio::MicSource, classify::HttpClassifier, config::AppConfig, log_file_path};
use crossterm::terminal::size as terminal_size;
use std::time::Duration;
use std::{env, fmt::Display};

const BACKEND_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct DoctorReport {
    lines: Vec<String>,
}

impl DoctorReport {
    pub fn new(title: &str) -> Self {
        Self {
            lines: vec![title.to_string()],
        }
    }

    pub fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("{title}:"));
    }

    pub fn push_kv(&mut self, key: &str, value: impl Display) {
        self.lines.push(format!("  {key}: {value}"));
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

pub fn doctor_report(config: &AppConfig) -> DoctorReport {
    let mut report = DoctorReport::new("AeroMon Doctor");
    report.push_kv("version", env!("CARGO_PKG_VERSION"));
    report.push_kv("os", format!("{}/{}", env::consts::OS, env::consts::ARCH));

    let mut validated = config.clone();
    let validation_result = validated.validate();
    let resolved = validation_result
        .as_ref()
        .map(|_| &validated)
        .unwrap_or(config);

    report.section("Terminal");
    match terminal_size() {
        Ok((cols, rows)) => report.push_kv("size", format!("{cols}x{rows}")),
        Err(err) => report.push_kv("size", format!("error: {err}")),
    }
    if let Ok(term) = env::var("TERM") {
        report.push_kv("term", term);
    }

    report.section("Config");
    match &validation_result {
        Ok(()) => report.push_kv("validation", "ok"),
        Err(err) => report.push_kv("validation", format!("error: {err}")),
    }
    report.push_kv("backend_url", &resolved.backend_url);
    report.push_kv("chunk_interval_ms", resolved.chunk_interval_ms);
    report.push_kv("model", resolved.model.as_deref().unwrap_or("backend default"));
    report.push_kv("alert_threshold", resolved.alert_threshold);
    report.push_kv("http_timeout_ms", resolved.http_timeout_ms);
    report.push_kv("log_file", log_file_path().display());

    report.section("Audio");
    report.push_kv(
        "input_device",
        resolved.input_device.as_deref().unwrap_or("default"),
    );
    match MicSource::list_devices() {
        Ok(devices) => {
            report.push_kv("device_count", devices.len());
            if devices.is_empty() {
                report.push_kv("devices", "none");
            } else {
                report.push_line("  devices:");
                for name in devices {
                    report.push_line(format!("    - {name}"));
                }
            }
        }
        Err(err) => report.push_kv("devices", format!("error: {err}")),
    }

    report.section("Backend");
    match HttpClassifier::new(&resolved.backend_url, None, BACKEND_PROBE_TIMEOUT)
        .and_then(|client| client.active_models())
    {
        Ok(models) => {
            report.push_kv("reachable", "yes");
            report.push_kv("active_models", models.len());
            for model in models {
                report.push_line(format!("    - {} ({})", model.name, model.id));
            }
        }
        Err(err) => report.push_kv("reachable", format!("no ({err:#})")),
    }

    report
}
