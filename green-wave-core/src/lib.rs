//! Green Wave Core Library
//!
//! Estimates whether a moving user will catch a green or a red traffic light
//! from a stream of position fixes and a static registry of light
//! coordinates.
//!
//! # Architecture
//!
//! - `geo`: haversine distance and nearest-light lookup
//! - `history`: fixed-capacity sample window with rolling speed average
//! - `estimator`: light-state classifier and adaptive polling interval
//! - `session`: the tracking state machine (idle / awaiting position /
//!   awaiting send)
//! - `tracker`: drives a session against a [`PositionSource`] and a
//!   [`TelemetrySink`]
//! - `registry`, `telemetry`, `passes`: light list loading, payload
//!   validation, and pass aggregation
//!
//! The library does NOT talk to a device or a network. Geolocation and
//! transport are supplied by the application through the two traits.
//!
//! # Example Usage
//!
//! ```no_run
//! use green_wave_core::{EstimatorConfig, LightRegistry, MemorySink, Tracker};
//! # use green_wave_core::{PositionErrorKind, PositionFix, PositionSource};
//! # struct Gps;
//! # impl PositionSource for Gps {
//! #     fn request_position(&mut self) -> Result<PositionFix, PositionErrorKind> {
//! #         Err(PositionErrorKind::Unknown)
//! #     }
//! # }
//! use std::path::Path;
//!
//! let registry = LightRegistry::from_file(Path::new("light_traffics.json")).unwrap();
//! let mut tracker = Tracker::new(EstimatorConfig::new(), registry, Gps, MemorySink::default());
//!
//! tracker.start().unwrap();
//! let cycle = tracker.poll_once().unwrap();
//! println!("{} (next poll in {} ms)", cycle.evaluation.state, cycle.next_poll_ms);
//! ```

// Public modules
pub mod config;
pub mod estimator;
pub mod geo;
pub mod history;
pub mod passes;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use config::EstimatorConfig;
pub use estimator::{Classification, Estimate, Estimator};
pub use geo::{distance_meters, format_distance, lights_within, nearest_light, nearest_light_distance, NearbyLight};
pub use history::PositionHistory;
pub use passes::{aggregate_ranges, previous_utc_day, ranges_for_light, LightRange, PassRecord};
pub use registry::{CachedRegistry, LightRegistry};
pub use session::{Evaluation, Phase, StartOutcome, TrackingSession};
pub use telemetry::{
    parse_timestamp, validate_click_distance, InferredPass, MemorySink, TelemetryPayload, TelemetrySink,
};
pub use tracker::{Cycle, PositionSource, RunSummary, Tracker};
pub use types::{
    Coordinate, GreenWaveError, LightState, PositionErrorKind, PositionFix, PositionSample,
    Result, Timestamp, TrafficLight,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
