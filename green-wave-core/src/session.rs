//! Tracking session state machine
//!
//! A session moves between three phases:
//!
//! ```text
//!            start                 on_position
//!   Idle ───────────► AwaitingPosition ──────────► AwaitingSend
//!    ▲                    ▲                           │
//!    │                    └──── on_send_complete(Ok) ─┘
//!    └──── stop / position error / send failure ──────┘
//! ```
//!
//! Every failure resets the session to `Idle`. Events that do not fit the
//! current phase are rejected without touching state, as are fixes whose
//! time cannot be represented.

use crate::config::EstimatorConfig;
use crate::estimator::Estimator;
use crate::history::PositionHistory;
use crate::telemetry::{InferredPass, TelemetryPayload};
use crate::types::{GreenWaveError, LightState, PositionErrorKind, PositionFix, Result, TrafficLight};
use serde_json::json;
use std::fmt;

/// Where the session is in its polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingPosition,
    AwaitingSend,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::AwaitingPosition => write!(f, "awaiting position"),
            Phase::AwaitingSend => write!(f, "awaiting send"),
        }
    }
}

/// Result of asking a session to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyTracking,
}

/// Per-sample output handed to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub distance_to_light_m: Option<f64>,
    pub nearest_light_label: Option<String>,
    pub average_speed_kmh: Option<f64>,
    pub state: LightState,
    pub next_interval_ms: u64,
    pub payload: TelemetryPayload,
}

/// The single live tracking session
#[derive(Debug)]
pub struct TrackingSession {
    estimator: Estimator,
    phase: Phase,
    lights: Vec<TrafficLight>,
    history: PositionHistory,
    previous_average_speed_kmh: Option<f64>,
    /// Interval computed by the last evaluation, waiting for its send to finish
    interval_after_send_ms: Option<u64>,
    pending_poll_ms: Option<u64>,
}

impl TrackingSession {
    pub fn new(config: EstimatorConfig) -> Self {
        let history = PositionHistory::new(config.history_capacity);
        Self {
            estimator: Estimator::new(config),
            phase: Phase::Idle,
            lights: Vec::new(),
            history,
            previous_average_speed_kmh: None,
            interval_after_send_ms: None,
            pending_poll_ms: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_tracking(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn previous_average_speed_kmh(&self) -> Option<f64> {
        self.previous_average_speed_kmh
    }

    /// Delay before the next position request, once a send has completed
    pub fn pending_poll_ms(&self) -> Option<u64> {
        self.pending_poll_ms
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Begin tracking against `lights`
    ///
    /// Starting an already-running session changes nothing. An empty light
    /// list cannot start a session.
    pub fn start(&mut self, lights: Vec<TrafficLight>) -> Result<StartOutcome> {
        if self.is_tracking() {
            log::info!("Already tracking");
            return Ok(StartOutcome::AlreadyTracking);
        }

        if lights.is_empty() {
            return Err(GreenWaveError::RegistryUnavailable(
                "no traffic light coordinates loaded".to_string(),
            ));
        }

        self.reset();
        self.lights = lights;
        self.phase = Phase::AwaitingPosition;
        log::info!("Tracking started with {} traffic lights", self.lights.len());
        Ok(StartOutcome::Started)
    }

    /// Stop tracking and clear all session state; safe to call at any time
    pub fn stop(&mut self) {
        if self.is_tracking() {
            log::info!("Tracking stopped");
        }
        self.reset();
    }

    /// Feed a new fix and evaluate it
    ///
    /// A fix with an unrepresentable timestamp is rejected with
    /// `InvalidPosition` and the session keeps waiting for the next one.
    pub fn on_position(&mut self, fix: PositionFix) -> Result<Evaluation> {
        self.expect_phase(Phase::AwaitingPosition, "position")?;

        let sample = fix.to_sample()?;
        self.history.push(sample);

        let previous_average_speed_kmh = self.previous_average_speed_kmh;
        let estimate = self.estimator.evaluate(&self.history, &self.lights, previous_average_speed_kmh);

        let mut payload =
            TelemetryPayload::from_sample(&sample, estimate.average_speed_kmh, estimate.state)?;
        if let (true, Some(label), Some(pass_timestamp)) = (
            estimate.state.is_pass(),
            &estimate.nearest_light_label,
            sample.timestamp(),
        ) {
            payload = payload.with_inferred_pass(InferredPass {
                light_identifier: label.clone(),
                color: estimate.state,
                speed_profile: Some(json!({
                    "average_kmh": estimate.average_speed_kmh,
                    "previous_average_kmh": previous_average_speed_kmh,
                })),
                pass_timestamp,
            });
        }
        self.previous_average_speed_kmh = estimate.next_previous_average_speed;

        log::debug!(
            "Evaluated fix at {}: state={} distance={:?} avg={:?} next={}ms",
            payload.timestamp,
            estimate.state,
            estimate.distance_to_light_m,
            estimate.average_speed_kmh,
            estimate.next_interval_ms
        );

        self.pending_poll_ms = None;
        self.interval_after_send_ms = Some(estimate.next_interval_ms);
        self.phase = Phase::AwaitingSend;

        Ok(Evaluation {
            distance_to_light_m: estimate.distance_to_light_m,
            nearest_light_label: estimate.nearest_light_label,
            average_speed_kmh: estimate.average_speed_kmh,
            state: estimate.state,
            next_interval_ms: estimate.next_interval_ms,
            payload,
        })
    }

    /// The position source failed while a fix was awaited; tracking halts
    ///
    /// Returns the error to surface. Outside `AwaitingPosition` the event is
    /// out of order: the session is left as is and `InvalidTransition` is
    /// returned instead.
    pub fn on_position_error(&mut self, kind: PositionErrorKind) -> GreenWaveError {
        if let Err(e) = self.expect_phase(Phase::AwaitingPosition, "position error") {
            return e;
        }

        log::warn!("Position request failed: {}", kind);
        self.reset();
        GreenWaveError::PositionUnavailable(kind)
    }

    /// The send for the last evaluation finished
    ///
    /// On success the session waits for the next fix and returns the delay
    /// before requesting it. On failure tracking halts.
    pub fn on_send_complete(&mut self, result: Result<()>) -> Result<u64> {
        self.expect_phase(Phase::AwaitingSend, "send result")?;

        match result {
            Ok(()) => {
                let delay = self
                    .interval_after_send_ms
                    .take()
                    .unwrap_or(self.estimator.config().base_interval_ms);
                self.pending_poll_ms = Some(delay);
                self.phase = Phase::AwaitingPosition;
                Ok(delay)
            }
            Err(e) => {
                let message = match e {
                    GreenWaveError::TransportFailure(message) => message,
                    other => other.to_string(),
                };
                log::warn!("Telemetry send failed: {}", message);
                self.reset();
                Err(GreenWaveError::TransportFailure(message))
            }
        }
    }

    pub(crate) fn expect_phase(&self, expected: Phase, event: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(GreenWaveError::InvalidTransition {
                phase: self.phase.to_string(),
                event,
            })
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.lights.clear();
        self.history.clear();
        self.previous_average_speed_kmh = None;
        self.interval_after_send_ms = None;
        self.pending_poll_ms = None;
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(latitude: f64, speed_mps: Option<f64>, timestamp_ms: i64) -> PositionFix {
        PositionFix {
            latitude,
            longitude: 0.0,
            speed_mps,
            timestamp_ms,
        }
    }

    fn lights() -> Vec<TrafficLight> {
        vec![TrafficLight::with_label(0.0, 0.0, "1")]
    }

    #[test]
    fn test_start_requires_lights() {
        let mut session = TrackingSession::default();
        let result = session.start(Vec::new());
        assert!(matches!(result, Err(GreenWaveError::RegistryUnavailable(_))));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut session = TrackingSession::default();
        assert_eq!(session.start(lights()).unwrap(), StartOutcome::Started);
        session.on_position(fix(0.01, Some(10.0), 0)).unwrap();

        assert_eq!(session.start(lights()).unwrap(), StartOutcome::AlreadyTracking);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.phase(), Phase::AwaitingSend);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = TrackingSession::default();
        session.stop();
        session.stop();
        assert_eq!(session.phase(), Phase::Idle);

        session.start(lights()).unwrap();
        session.stop();
        session.stop();
        assert!(!session.is_tracking());
        assert!(session.history().is_empty());
        assert_eq!(session.pending_poll_ms(), None);
    }

    #[test]
    fn test_full_cycle() {
        let mut session = TrackingSession::default();
        session.start(lights()).unwrap();

        let evaluation = session.on_position(fix(0.002, Some(10.0), 0)).unwrap();
        assert_eq!(evaluation.state, LightState::Tracking);
        assert_eq!(evaluation.next_interval_ms, 1500);
        assert_eq!(session.phase(), Phase::AwaitingSend);

        let delay = session.on_send_complete(Ok(())).unwrap();
        assert_eq!(delay, 1500);
        assert_eq!(session.pending_poll_ms(), Some(1500));
        assert_eq!(session.phase(), Phase::AwaitingPosition);
    }

    #[test]
    fn test_position_error_resets() {
        let mut session = TrackingSession::default();
        session.start(lights()).unwrap();

        let err = session.on_position_error(PositionErrorKind::Timeout);
        assert!(matches!(err, GreenWaveError::PositionUnavailable(PositionErrorKind::Timeout)));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_position_error_out_of_phase_leaves_state() {
        let mut session = TrackingSession::default();
        let err = session.on_position_error(PositionErrorKind::Unknown);
        assert!(matches!(err, GreenWaveError::InvalidTransition { .. }));
        assert_eq!(session.phase(), Phase::Idle);

        session.start(lights()).unwrap();
        session.on_position(fix(0.002, Some(10.0), 0)).unwrap();

        let err = session.on_position_error(PositionErrorKind::Timeout);
        assert!(matches!(err, GreenWaveError::InvalidTransition { .. }));
        assert!(!err.is_fatal());
        assert_eq!(session.phase(), Phase::AwaitingSend);
        assert_eq!(session.history().len(), 1);

        assert_eq!(session.on_send_complete(Ok(())).unwrap(), 1500);
    }

    #[test]
    fn test_unrepresentable_fix_time_rejected() {
        let mut session = TrackingSession::default();
        session.start(lights()).unwrap();

        let err = session.on_position(fix(0.002, Some(10.0), i64::MAX)).unwrap_err();
        assert!(matches!(err, GreenWaveError::InvalidPosition(_)));
        assert_eq!(session.phase(), Phase::AwaitingPosition);
        assert!(session.history().is_empty());

        assert!(session.on_position(fix(0.002, Some(10.0), 0)).is_ok());
    }

    #[test]
    fn test_pass_carries_inferred_state() {
        let mut session = TrackingSession::default();
        session.start(lights()).unwrap();

        let far = session.on_position(fix(0.002, Some(10.0), 0)).unwrap();
        assert!(far.payload.inferred_state.is_none());
        session.on_send_complete(Ok(())).unwrap();

        let near = session.on_position(fix(0.0002, Some(10.0), 10_000)).unwrap();
        assert_eq!(near.state, LightState::Green);
        let pass = near.payload.inferred_state.unwrap();
        assert_eq!(pass.light_identifier, "1");
        assert_eq!(pass.color, LightState::Green);
        assert_eq!(pass.pass_timestamp.timestamp_millis(), 10_000);
        assert_eq!(pass.speed_profile.unwrap()["previous_average_kmh"], 36.0);
    }

    #[test]
    fn test_send_failure_resets() {
        let mut session = TrackingSession::default();
        session.start(lights()).unwrap();
        session.on_position(fix(0.002, None, 0)).unwrap();

        let err = session
            .on_send_complete(Err(GreenWaveError::TransportFailure("HTTP 503".into())))
            .unwrap_err();
        assert_eq!(err.to_string(), "Telemetry send failed: HTTP 503");
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.history().is_empty());
        assert_eq!(session.previous_average_speed_kmh(), None);
    }

    #[test]
    fn test_out_of_order_events_rejected() {
        let mut session = TrackingSession::default();
        let err = session.on_position(fix(0.0, None, 0)).unwrap_err();
        assert!(!err.is_fatal());
        assert!(session.on_send_complete(Ok(())).is_err());

        session.start(lights()).unwrap();
        assert!(session.on_send_complete(Ok(())).is_err());
        assert_eq!(session.phase(), Phase::AwaitingPosition);
    }

    #[test]
    fn test_previous_speed_threaded_between_evaluations() {
        let mut session = TrackingSession::default();
        session.start(lights()).unwrap();

        // Approach at ~36 km/h, then crawl inside the pass radius
        session.on_position(fix(0.0009, Some(10.0), 0)).unwrap();
        session.on_send_complete(Ok(())).unwrap();
        let previous = session.previous_average_speed_kmh().unwrap();
        assert!((previous - 36.0).abs() < 1e-9, "got {}", previous);

        let evaluation = session.on_position(fix(0.0003, Some(1.0), 10_000)).unwrap();
        // 0.0006 deg ≈ 66.7 m in 10 s ≈ 24 km/h: a drop of ~12 km/h
        assert_eq!(evaluation.state, LightState::Red);
        assert!(evaluation.average_speed_kmh.unwrap() < 25.0);
    }
}
