//! HTTP client for the remote classification backend. Hides request plumbing
//! behind a small "classify these bytes" API so the capture loop never touches
//! reqwest directly, and so tests can swap in a scripted classifier.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Aircraft classes the backend distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AircraftKind {
    Drone,
    Airplane,
    Helicopter,
}

impl AircraftKind {
    /// Parse a backend label. The service emits singular labels but older
    /// deployments used plural table names, so both are accepted.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "drone" | "drones" => Some(Self::Drone),
            "airplane" | "airplanes" => Some(Self::Airplane),
            "helicopter" | "helicopters" => Some(Self::Helicopter),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Drone => "drone",
            Self::Airplane => "airplane",
            Self::Helicopter => "helicopter",
        }
    }
}

/// One classification outcome as returned by the backend.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub kind: AircraftKind,
    pub confidence: f32,
}

/// Classification capability used by the capture loop. Implemented by the
/// real HTTP client below and by scripted fakes in tests.
pub trait Classify: Send + Sync {
    fn classify_chunk(&self, wav: &[u8]) -> Result<Detection>;
}

/// Response body of `/analyze_stream`.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    result: String,
    confidence: f32,
}

/// Response body of `/analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileAnalysis {
    pub result: String,
    pub confidence: f32,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(rename = "aircraftTypeID", default)]
    pub aircraft_type_id: Option<i64>,
}

/// One entry of `/api/models/active`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Blocking HTTP classifier. Submissions run on a dedicated worker thread, so
/// the blocking flavor keeps the client free of an async runtime.
pub struct HttpClassifier {
    base_url: String,
    model: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpClassifier {
    pub fn new(base_url: &str, model: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Submit a whole audio file to `/analyze`.
    pub fn classify_file(&self, path: &Path) -> Result<FileAnalysis> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.wav")
            .to_string();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read audio file '{}'", path.display()))?;

        let part = Part::bytes(bytes).file_name(file_name);
        let mut form = Form::new().part("file", part);
        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        let response = self
            .client
            .post(self.endpoint("/analyze"))
            .multipart(form)
            .send()
            .context("file analysis request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "backend rejected file analysis: {}",
                response.status()
            ));
        }
        response
            .json::<FileAnalysis>()
            .context("failed to parse file analysis response")
    }

    /// Fetch the models the backend currently exposes.
    pub fn active_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.endpoint("/api/models/active"))
            .send()
            .context("model listing request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "backend rejected model listing: {}",
                response.status()
            ));
        }
        response
            .json::<Vec<ModelInfo>>()
            .context("failed to parse model listing")
    }
}

impl Classify for HttpClassifier {
    /// POST one WAV chunk to `/analyze_stream` and map the response onto a
    /// [`Detection`]. Any transport, status, or parse problem is one error;
    /// the caller decides what a failed chunk means.
    fn classify_chunk(&self, wav: &[u8]) -> Result<Detection> {
        let part = Part::bytes(wav.to_vec())
            .file_name("chunk.wav")
            .mime_str("audio/wav")
            .context("failed to build chunk part")?;
        let mut form = Form::new().part("audio", part);
        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        let response = self
            .client
            .post(self.endpoint("/analyze_stream"))
            .multipart(form)
            .send()
            .context("chunk submission failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("backend rejected chunk: {}", response.status()));
        }

        let body: StreamResponse = response
            .json()
            .context("failed to parse chunk response")?;
        let kind = AircraftKind::parse(&body.result)
            .ok_or_else(|| anyhow!("unrecognized aircraft label '{}'", body.result))?;
        Ok(Detection {
            kind,
            confidence: body.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singular_and_plural_labels() {
        assert_eq!(AircraftKind::parse("drone"), Some(AircraftKind::Drone));
        assert_eq!(AircraftKind::parse("Drones"), Some(AircraftKind::Drone));
        assert_eq!(AircraftKind::parse("AIRPLANE"), Some(AircraftKind::Airplane));
        assert_eq!(
            AircraftKind::parse(" helicopters "),
            Some(AircraftKind::Helicopter)
        );
        assert_eq!(AircraftKind::parse("balloon"), None);
        assert_eq!(AircraftKind::parse(""), None);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(AircraftKind::Drone.label(), "drone");
        assert_eq!(AircraftKind::Airplane.label(), "airplane");
        assert_eq!(AircraftKind::Helicopter.label(), "helicopter");
    }

    #[test]
    fn stream_response_deserializes_backend_payload() {
        let body = r#"{"model":"4","result":"drone","confidence":97.2}"#;
        let parsed: StreamResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.result, "drone");
        assert!((parsed.confidence - 97.2).abs() < f32::EPSILON);
    }

    #[test]
    fn file_analysis_tolerates_missing_optional_fields() {
        let body = r#"{"result":"helicopter","confidence":88.4}"#;
        let parsed: FileAnalysis = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.result, "helicopter");
        assert!(parsed.model.is_none());
        assert!(parsed.aircraft_type_id.is_none());

        let body = r#"{"result":"drone","confidence":91.0,"model":"4","aircraftTypeID":2}"#;
        let parsed: FileAnalysis = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.aircraft_type_id, Some(2));
    }

    #[test]
    fn model_listing_deserializes_description_default() {
        let body = r#"[{"id":4,"name":"custom"},{"id":6,"name":"yamnet","description":"audio event model"}]"#;
        let parsed: Vec<ModelInfo> = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].description, "");
        assert_eq!(parsed[1].name, "yamnet");
    }

    #[test]
    fn classify_chunk_errors_when_backend_unreachable() {
        // Nothing listens on this port; the submission must surface a
        // transport error rather than panic or hang.
        let classifier = HttpClassifier::new(
            "http://127.0.0.1:9",
            None,
            Duration::from_millis(250),
        )
        .expect("client");
        assert!(classifier.classify_chunk(b"not-really-wav").is_err());
    }
}
