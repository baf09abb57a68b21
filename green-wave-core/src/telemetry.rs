//! Telemetry payloads and sinks
//!
//! The payload is what the tracker reports after every evaluation. The
//! parsing side mirrors what the backend accepts, so the same rules can be
//! checked before anything is sent.

use crate::geo::nearest_light_distance;
use crate::passes::PassRecord;
use crate::types::{
    Coordinate, GreenWaveError, LightState, PositionSample, Result, Timestamp, TrafficLight,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys the inferred light identifier may appear under, in priority order
const INFERRED_LIGHT_KEYS: [&str; 3] = ["light_id", "light_identifier", "light_number"];

/// Keys the inferred pass time may appear under, in priority order
const INFERRED_TIME_KEYS: [&str; 2] = ["pass_timestamp", "timestamp"];

/// Position/speed report sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub lat: f64,
    pub lon: f64,
    /// Rolling average speed in km/h
    pub speed: Option<f64>,
    #[serde(default)]
    pub state: LightState,
    /// ISO-8601 UTC, millisecond precision
    pub timestamp: String,
    /// Pass the client inferred at a named light, recorded by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred_state: Option<InferredPass>,
}

impl TelemetryPayload {
    /// Build the payload for an evaluated sample
    pub fn from_sample(sample: &PositionSample, average_speed_kmh: Option<f64>, state: LightState) -> Result<Self> {
        let timestamp = sample.iso_timestamp().ok_or_else(|| {
            GreenWaveError::InvalidPosition(format!(
                "sample timestamp {} ms is out of range",
                sample.timestamp_ms
            ))
        })?;

        Ok(Self {
            lat: sample.latitude,
            lon: sample.longitude,
            speed: average_speed_kmh,
            state,
            timestamp,
            inferred_state: None,
        })
    }

    pub fn with_inferred_pass(mut self, pass: InferredPass) -> Self {
        self.inferred_state = Some(pass);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// Validate a raw JSON payload the way the backend does
    ///
    /// The timestamp must carry a timezone and is normalized to UTC.
    pub fn parse(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid("Missing required fields"))?;

        if ["lat", "lon", "timestamp"]
            .iter()
            .any(|field| !object.contains_key(*field))
        {
            return Err(invalid("Missing required fields"));
        }

        let lat = number_field(&object["lat"])?.ok_or_else(|| invalid("Invalid data format"))?;
        let lon = number_field(&object["lon"])?.ok_or_else(|| invalid("Invalid data format"))?;
        if !Coordinate::new(lat, lon).is_valid() {
            return Err(invalid("Invalid coordinates"));
        }

        let speed = match object.get("speed") {
            Some(value) => number_field(value)?,
            None => None,
        };

        let timestamp = object["timestamp"]
            .as_str()
            .and_then(parse_timestamp)
            .ok_or_else(|| invalid("Invalid data format"))?;

        let state = match object.get("state") {
            None | Some(Value::Null) => LightState::Tracking,
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|_| invalid("Invalid light state"))?,
        };

        let inferred_state = InferredPass::parse(object.get("inferred_state"))?;

        Ok(Self {
            lat,
            lon,
            speed,
            state,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            inferred_state,
        })
    }
}

/// A green or red pass the client attributes to a specific light
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredPass {
    pub light_identifier: String,
    pub color: LightState,
    /// Free-form speed context, stored as given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_profile: Option<Value>,
    pub pass_timestamp: Timestamp,
}

impl InferredPass {
    /// Validate the optional `inferred_state` object of a payload
    ///
    /// Absent or `null` means no pass. Identifier and time keys are tried in
    /// order and empty values fall through to the next key.
    pub fn parse(value: Option<&Value>) -> Result<Option<Self>> {
        let object = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(object)) => object,
            Some(_) => return Err(invalid("Invalid inferred_state payload")),
        };

        let light_identifier = first_present(object, &INFERRED_LIGHT_KEYS)
            .map(|raw| match raw {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        if light_identifier.is_empty() {
            return Err(invalid("Missing inferred light identifier"));
        }

        let color = match object.get("color").and_then(Value::as_str) {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "green" => LightState::Green,
                "red" => LightState::Red,
                _ => return Err(invalid("Invalid inferred pass color")),
            },
            None => return Err(invalid("Invalid inferred pass color")),
        };

        let speed_profile = match object.get("speed_profile") {
            None | Some(Value::Null) => None,
            Some(profile) => Some(profile.clone()),
        };

        let pass_timestamp = first_present(object, &INFERRED_TIME_KEYS)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .ok_or_else(|| invalid("Invalid inferred pass timestamp"))?;

        Ok(Some(Self {
            light_identifier,
            color,
            speed_profile,
            pass_timestamp,
        }))
    }

    pub fn to_pass_record(&self) -> PassRecord {
        PassRecord {
            light_identifier: self.light_identifier.clone(),
            color: self.color,
            timestamp: self.pass_timestamp,
            speed_profile: self.speed_profile.clone(),
        }
    }
}

/// First value under `keys` that is not null, false, zero, or empty
fn first_present<'a>(object: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(fields) => !fields.is_empty(),
        })
}

fn invalid(message: &str) -> GreenWaveError {
    GreenWaveError::InvalidPayload(message.to_string())
}

/// A numeric field that may be null, a number, or a numeric string
fn number_field(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| invalid("Invalid data format")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid("Invalid data format")),
        _ => Err(invalid("Invalid data format")),
    }
}

/// Parse a timezone-aware ISO-8601 timestamp into UTC
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Reject a payload reported too far from any known light
///
/// An empty registry disables the check.
pub fn validate_click_distance(
    payload: &TelemetryPayload,
    lights: &[TrafficLight],
    max_distance_m: f64,
) -> Result<()> {
    let nearest = match nearest_light_distance(payload.coordinate(), lights) {
        Some(distance) => distance,
        None => {
            log::warn!("Traffic lights data unavailable or empty; allowing payload without distance enforcement");
            return Ok(());
        }
    };

    if nearest > max_distance_m {
        return Err(GreenWaveError::InvalidPayload(format!(
            "Too far from the nearest traffic light to report ({:.1} m)",
            nearest
        )));
    }

    Ok(())
}

/// Destination for telemetry payloads
///
/// Implementations own the transport. A failed send is reported as
/// `GreenWaveError::TransportFailure` with a human-readable message.
pub trait TelemetrySink {
    fn send(&mut self, payload: &TelemetryPayload) -> Result<()>;
}

/// Collects payloads in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub payloads: Vec<TelemetryPayload>,
}

impl TelemetrySink for MemorySink {
    fn send(&mut self, payload: &TelemetryPayload) -> Result<()> {
        self.payloads.push(payload.clone());
        Ok(())
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn send(&mut self, payload: &TelemetryPayload) -> Result<()> {
        (**self).send(payload)
    }
}
