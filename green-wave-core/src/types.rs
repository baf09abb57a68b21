//! Core types for the green wave estimator
//!
//! This module defines the records that flow through the estimator: traffic
//! lights from the registry, raw position fixes, the samples kept in history,
//! and the light state the classifier produces.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for payloads and pass records
pub type Timestamp = DateTime<Utc>;

/// Result type for green wave operations
pub type Result<T> = std::result::Result<T, GreenWaveError>;

/// A point on the Earth's surface in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True if both components are finite and within WGS84 bounds
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A traffic light from the static registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLight {
    pub latitude: f64,
    pub longitude: f64,
    /// Display label (the registry's light number), if any
    #[serde(default)]
    pub label: Option<String>,
}

impl TrafficLight {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            label: None,
        }
    }

    pub fn with_label(latitude: f64, longitude: f64, label: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            label: Some(label.into()),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A raw reading as delivered by a position source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Device-reported speed in m/s
    #[serde(default)]
    pub speed_mps: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl PositionFix {
    /// Convert into a history sample (m/s → km/h)
    ///
    /// A fix whose time cannot be represented as a calendar timestamp is
    /// rejected with `InvalidPosition`.
    pub fn to_sample(&self) -> Result<PositionSample> {
        if DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms).is_none() {
            return Err(GreenWaveError::InvalidPosition(format!(
                "fix timestamp {} ms is out of range",
                self.timestamp_ms
            )));
        }

        let speed_kmh = self
            .speed_mps
            .filter(|speed| speed.is_finite())
            .map(|speed| speed * 3.6);

        Ok(PositionSample {
            latitude: self.latitude,
            longitude: self.longitude,
            speed_kmh,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

/// A position sample kept in the rolling history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: Option<f64>,
    pub timestamp_ms: i64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, speed_kmh: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed_kmh,
            timestamp_ms,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Sample time as a UTC timestamp, if representable
    pub fn timestamp(&self) -> Option<Timestamp> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)
    }

    /// Sample time formatted like `2024-05-01T12:00:00.000Z`
    pub fn iso_timestamp(&self) -> Option<String> {
        self.timestamp()
            .map(|timestamp| timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Predicted state of the nearest traffic light
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    /// Not within the pass radius, or no speed estimate yet
    #[default]
    Tracking,
    /// Passing without a significant slowdown
    Green,
    /// Rolling speed dropped sharply inside the pass radius
    Red,
}

impl LightState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightState::Tracking => "tracking",
            LightState::Green => "green",
            LightState::Red => "red",
        }
    }

    /// True for the states recorded as passes
    pub fn is_pass(&self) -> bool {
        matches!(self, LightState::Green | LightState::Red)
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why a position source could not deliver a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unknown,
}

impl fmt::Display for PositionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            PositionErrorKind::PermissionDenied => {
                "location access denied; allow it in the device settings"
            }
            PositionErrorKind::PositionUnavailable => {
                "location service unavailable; check the connection or settings"
            }
            PositionErrorKind::Timeout => "location request timed out; try again",
            PositionErrorKind::Unknown => "could not determine location; try again",
        };
        f.write_str(message)
    }
}

/// Errors surfaced by the estimator, session, and telemetry layers
#[derive(Debug, thiserror::Error)]
pub enum GreenWaveError {
    #[error("Position unavailable: {0}")]
    PositionUnavailable(PositionErrorKind),

    #[error("Traffic light registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Telemetry send failed: {0}")]
    TransportFailure(String),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Invalid position fix: {0}")]
    InvalidPosition(String),

    #[error("Cannot handle '{event}' while {phase}")]
    InvalidTransition { phase: String, event: &'static str },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GreenWaveError {
    /// Malformed driver input leaves the session running; everything else halts it
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            GreenWaveError::InvalidTransition { .. }
                | GreenWaveError::InvalidPayload(_)
                | GreenWaveError::InvalidPosition(_)
        )
    }
}
