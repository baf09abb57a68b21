//! Tracker: drives one session against a position source and a telemetry sink
//!
//! Each cycle requests a fix, evaluates it, sends the payload, and reports
//! the delay before the next request. Cycles never overlap: the session only
//! accepts a new fix once the previous send has completed.

use crate::config::EstimatorConfig;
use crate::registry::LightRegistry;
use crate::session::{Evaluation, Phase, StartOutcome, TrackingSession};
use crate::telemetry::TelemetrySink;
use crate::types::{LightState, PositionErrorKind, PositionFix, Result};
use std::time::Duration;

/// Supplier of position fixes (the device's geolocation)
pub trait PositionSource {
    /// Request the current position
    fn request_position(&mut self) -> std::result::Result<PositionFix, PositionErrorKind>;

    /// True once a finite source (e.g. a recorded track) has nothing left
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// One completed poll
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub evaluation: Evaluation,
    pub next_poll_ms: u64,
}

/// Totals over a tracker run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub cycles: usize,
    pub tracking: usize,
    pub green: usize,
    pub red: usize,
    /// Smallest distance to a light seen during the run
    pub closest_approach_m: Option<f64>,
    /// Fixes the session refused (e.g. unrepresentable timestamps)
    pub rejected: usize,
}

impl RunSummary {
    fn record(&mut self, cycle: &Cycle) {
        self.cycles += 1;
        match cycle.evaluation.state {
            LightState::Tracking => self.tracking += 1,
            LightState::Green => self.green += 1,
            LightState::Red => self.red += 1,
        }

        if let Some(distance) = cycle.evaluation.distance_to_light_m {
            self.closest_approach_m = Some(match self.closest_approach_m {
                Some(closest) => closest.min(distance),
                None => distance,
            });
        }
    }
}

pub struct Tracker<P, S>
where
    P: PositionSource,
    S: TelemetrySink,
{
    session: TrackingSession,
    registry: LightRegistry,
    source: P,
    sink: S,
}

impl<P, S> Tracker<P, S>
where
    P: PositionSource,
    S: TelemetrySink,
{
    pub fn new(config: EstimatorConfig, registry: LightRegistry, source: P, sink: S) -> Self {
        Self {
            session: TrackingSession::new(config),
            registry,
            source,
            sink,
        }
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Start the session with the registry's lights
    pub fn start(&mut self) -> Result<StartOutcome> {
        self.session.start(self.registry.lights().to_vec())
    }

    pub fn stop(&mut self) {
        self.session.stop();
    }

    /// Run a single position → evaluate → send cycle
    ///
    /// The source is only asked for a fix while the session awaits one.
    /// Fatal failures leave the session stopped; a rejected fix leaves it
    /// waiting for the next.
    pub fn poll_once(&mut self) -> Result<Cycle> {
        self.session.expect_phase(Phase::AwaitingPosition, "position")?;

        let fix = match self.source.request_position() {
            Ok(fix) => fix,
            Err(kind) => return Err(self.session.on_position_error(kind)),
        };

        let evaluation = self.session.on_position(fix)?;
        let sent = self.sink.send(&evaluation.payload);
        let next_poll_ms = self.session.on_send_complete(sent)?;

        Ok(Cycle {
            evaluation,
            next_poll_ms,
        })
    }

    /// Poll until the source is exhausted, `max_cycles` is reached, or an error occurs
    ///
    /// `on_cycle` sees every completed cycle; `sleep` is called with the
    /// adaptive delay before each request after the first.
    pub fn run<F, W>(&mut self, max_cycles: Option<usize>, mut on_cycle: F, mut sleep: W) -> Result<RunSummary>
    where
        F: FnMut(&Cycle),
        W: FnMut(Duration),
    {
        let mut summary = RunSummary::default();

        while self.session.is_tracking() {
            if self.source.is_exhausted() {
                log::info!("Position source exhausted after {} cycles", summary.cycles);
                break;
            }
            if max_cycles.is_some_and(|max| summary.cycles + summary.rejected >= max) {
                log::info!("Reached cycle limit ({})", summary.cycles);
                break;
            }

            if let Some(delay_ms) = self.session.pending_poll_ms() {
                sleep(Duration::from_millis(delay_ms));
            }

            let cycle = match self.poll_once() {
                Ok(cycle) => cycle,
                Err(e) if !e.is_fatal() => {
                    log::warn!("Skipping fix: {}", e);
                    summary.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.record(&cycle);
            on_cycle(&cycle);
        }

        self.session.stop();
        Ok(summary)
    }
}
