//! Telemetry sinks: HTTP backend, JSON-lines file, stdout

use anyhow::Context;
use green_wave_core::{GreenWaveError, TelemetryPayload, TelemetrySink};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// POSTs each payload as JSON to the backend
pub struct HttpSink {
    client: reqwest::blocking::Client,
    endpoint: String,
}

/// Error body the backend returns on rejection
#[derive(Debug, Deserialize)]
struct BackendError {
    error: String,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl TelemetrySink for HttpSink {
    fn send(&mut self, payload: &TelemetryPayload) -> green_wave_core::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .map_err(|e| GreenWaveError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            log::trace!("Telemetry accepted by {}", self.endpoint);
            return Ok(());
        }

        // Prefer the backend's own message; fall back to the status code
        let message = response
            .json::<BackendError>()
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));

        Err(GreenWaveError::TransportFailure(message))
    }
}

/// Appends one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create telemetry output: {:?}", path))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn send(&mut self, payload: &TelemetryPayload) -> green_wave_core::Result<()> {
        let line = serde_json::to_string(payload)?;
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| GreenWaveError::TransportFailure(e.to_string()))
    }
}
