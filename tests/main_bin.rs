use std::process::Command;

#[test]
fn main_lists_input_devices() {
    let bin = env!("CARGO_BIN_EXE_aeromon");
    let output = Command::new(bin)
        .arg("--list-input-devices")
        .env("AEROMON_TEST_DEVICES", "Mic A,Mic B")
        .output()
        .expect("run aeromon");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available audio input devices:"));
    assert!(stdout.contains("Mic A"));
    assert!(stdout.contains("Mic B"));
}

#[test]
fn main_reports_no_input_devices() {
    let bin = env!("CARGO_BIN_EXE_aeromon");
    let output = Command::new(bin)
        .arg("--list-input-devices")
        .env("AEROMON_TEST_DEVICES", "")
        .output()
        .expect("run aeromon");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No audio input devices detected."));
}

#[test]
fn main_rejects_invalid_chunk_interval() {
    let bin = env!("CARGO_BIN_EXE_aeromon");
    let output = Command::new(bin)
        .args(["--chunk-interval-ms", "2000", "--list-models"])
        .output()
        .expect("run aeromon");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--chunk-interval-ms"));
}
