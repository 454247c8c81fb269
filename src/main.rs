use aeromon::{
    audio::MicSource, classify::HttpClassifier, config::AppConfig, doctor::doctor_report,
    init_debug_log_file, log_debug, log_file_path, meter, ui, App,
};
use anyhow::Result;
use clap::Parser;
use std::env;
use std::time::Duration;

#[cfg(not(test))]
fn main() -> Result<()> {
    run_with_args(env::args_os())
}

#[cfg_attr(test, allow(dead_code))]
fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut config = AppConfig::parse_from(args);
    if config.doctor {
        let report = doctor_report(&config);
        println!("{}", report.render());
        return Ok(());
    }

    if config.list_input_devices {
        let output = list_input_devices()?;
        print!("{output}");
        return Ok(());
    }

    config.validate()?;

    if config.signal_meter {
        meter::run_signal_meter(&config)?;
        return Ok(());
    }

    if config.list_models {
        let output = list_models(&config)?;
        print!("{output}");
        return Ok(());
    }

    if let Some(path) = config.analyze.clone() {
        let client = classifier_for(&config)?;
        let analysis = client.classify_file(&path)?;
        println!("File: {}", path.display());
        println!("Result: {}", analysis.result);
        println!("Confidence: {:.1}%", analysis.confidence);
        if let Some(model) = analysis.model {
            println!("Model: {model}");
        }
        return Ok(());
    }

    init_debug_log_file();
    log_debug("=== AeroMon console started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let mut app = App::new(config);
    let result = ui::run_app(&mut app);

    log_debug("=== AeroMon console exiting ===");
    if let Err(ref e) = result {
        log_debug(&format!("Exit with error: {e:#}"));
    }

    result
}

fn classifier_for(config: &AppConfig) -> Result<HttpClassifier> {
    HttpClassifier::new(
        &config.backend_url,
        config.model.clone(),
        Duration::from_millis(config.http_timeout_ms),
    )
}

fn list_models(config: &AppConfig) -> Result<String> {
    let client = classifier_for(config)?;
    let models = client.active_models()?;
    let mut output = String::new();
    if models.is_empty() {
        output.push_str("The backend reports no active models.\n");
    } else {
        output.push_str("Active models:\n");
        for model in models {
            if model.description.is_empty() {
                output.push_str(&format!("  {} - {}\n", model.id, model.name));
            } else {
                output.push_str(&format!(
                    "  {} - {} ({})\n",
                    model.id, model.name, model.description
                ));
            }
        }
    }
    Ok(output)
}

fn list_input_devices() -> Result<String> {
    let devices = if let Ok(raw) = env::var("AEROMON_TEST_DEVICES") {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        }
    } else {
        MicSource::list_devices()?
    };
    let mut output = String::new();
    if devices.is_empty() {
        output.push_str("No audio input devices detected.\n");
    } else {
        output.push_str("Available audio input devices:\n");
        for name in devices {
            output.push_str(&format!("  - {name}\n"));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn with_test_devices(value: Option<&str>, action: impl FnOnce() -> Result<String>) -> String {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let previous = env::var("AEROMON_TEST_DEVICES").ok();
        if let Some(value) = value {
            env::set_var("AEROMON_TEST_DEVICES", value);
        } else {
            env::remove_var("AEROMON_TEST_DEVICES");
        }

        let output = action().expect("action should succeed");

        if let Some(previous) = previous {
            env::set_var("AEROMON_TEST_DEVICES", previous);
        } else {
            env::remove_var("AEROMON_TEST_DEVICES");
        }

        output
    }

    #[test]
    fn list_input_devices_outputs_devices() {
        let output = with_test_devices(Some("Mic A,Mic B"), list_input_devices);
        assert!(output.contains("Available audio input devices:"));
        assert!(output.contains("Mic A"));
        assert!(output.contains("Mic B"));
    }

    #[test]
    fn list_input_devices_outputs_empty_message() {
        let output = with_test_devices(Some(""), list_input_devices);
        assert!(output.contains("No audio input devices detected."));
    }
}
