//! Light-state classification and adaptive polling
//!
//! The estimator itself is stateless. The only memory carried between
//! evaluations is the previous rolling speed, which callers receive in each
//! [`Classification`] and hand back on the next call.

use crate::config::EstimatorConfig;
use crate::geo::nearest_light;
use crate::history::PositionHistory;
use crate::types::{LightState, TrafficLight};

/// Outcome of one classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub state: LightState,
    /// Feed this back as `previous_average_speed` on the next call
    pub next_previous_average_speed: Option<f64>,
}

/// Everything the estimator derives from the current history
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub distance_to_light_m: Option<f64>,
    pub nearest_light_label: Option<String>,
    pub average_speed_kmh: Option<f64>,
    pub state: LightState,
    pub next_previous_average_speed: Option<f64>,
    pub next_interval_ms: u64,
}

/// Proximity and light-state estimator
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    config: EstimatorConfig,
}

impl Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Predict the light state from distance and speed trend
    ///
    /// Inside the pass radius a drop in rolling speed of at least the
    /// configured threshold reads as stopping for red; anything less is
    /// green. Outside the radius, or without a speed estimate, the state
    /// stays `Tracking`.
    pub fn classify_state(
        &self,
        distance_to_light_m: Option<f64>,
        average_speed_kmh: Option<f64>,
        previous_average_speed_kmh: Option<f64>,
    ) -> Classification {
        let mut state = LightState::Tracking;

        if let (Some(distance), Some(average)) = (distance_to_light_m, average_speed_kmh) {
            if distance <= self.config.pass_radius_m {
                let speed_drop = previous_average_speed_kmh
                    .map(|previous| previous - average)
                    .unwrap_or(0.0);

                state = if speed_drop >= self.config.speed_drop_threshold_kmh {
                    LightState::Red
                } else {
                    LightState::Green
                };
            }
        }

        Classification {
            state,
            next_previous_average_speed: average_speed_kmh.or(previous_average_speed_kmh),
        }
    }

    /// Delay before the next position request
    ///
    /// Far from any light this is the base interval; inside the trigger
    /// radius it shrinks by one step per step distance, down to the minimum.
    pub fn next_interval_ms(&self, distance_to_light_m: Option<f64>) -> u64 {
        let distance = match distance_to_light_m {
            Some(distance) if distance <= self.config.trigger_radius_m => distance,
            _ => return self.config.base_interval_ms,
        };

        let steps = (distance.max(0.0) / self.config.interval_step_m).ceil().max(1.0) as u64;
        steps
            .saturating_mul(self.config.interval_step_ms)
            .max(self.config.min_interval_ms)
    }

    /// Run the full estimate for the latest history
    pub fn evaluate(
        &self,
        history: &PositionHistory,
        lights: &[TrafficLight],
        previous_average_speed_kmh: Option<f64>,
    ) -> Estimate {
        let nearest = history
            .latest()
            .and_then(|sample| nearest_light(sample.coordinate(), lights));

        let distance_to_light_m = nearest.as_ref().map(|n| n.distance_m);
        let nearest_light_label = nearest.and_then(|n| n.light.label.clone());

        let average_speed_kmh = history.average_speed_kmh();
        let classification =
            self.classify_state(distance_to_light_m, average_speed_kmh, previous_average_speed_kmh);

        log::trace!(
            "estimate: distance={:?} avg={:?} prev={:?} -> {}",
            distance_to_light_m,
            average_speed_kmh,
            previous_average_speed_kmh,
            classification.state
        );

        Estimate {
            distance_to_light_m,
            nearest_light_label,
            average_speed_kmh,
            state: classification.state,
            next_previous_average_speed: classification.next_previous_average_speed,
            next_interval_ms: self.next_interval_ms(distance_to_light_m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionSample;

    #[test]
    fn test_classify_red_on_speed_drop() {
        let estimator = Estimator::default();
        let result = estimator.classify_state(Some(40.0), Some(10.0), Some(20.0));
        assert_eq!(result.state, LightState::Red);
        assert_eq!(result.next_previous_average_speed, Some(10.0));
    }

    #[test]
    fn test_classify_green_on_small_drop() {
        let estimator = Estimator::default();
        let result = estimator.classify_state(Some(40.0), Some(18.0), Some(20.0));
        assert_eq!(result.state, LightState::Green);
    }

    #[test]
    fn test_classify_tracking_outside_radius() {
        let estimator = Estimator::default();
        let result = estimator.classify_state(Some(200.0), Some(10.0), Some(20.0));
        assert_eq!(result.state, LightState::Tracking);
    }

    #[test]
    fn test_classify_without_previous_speed_is_green() {
        let estimator = Estimator::default();
        let result = estimator.classify_state(Some(10.0), Some(0.0), None);
        assert_eq!(result.state, LightState::Green);
    }

    #[test]
    fn test_classify_exact_threshold_is_red() {
        let estimator = Estimator::default();
        let result = estimator.classify_state(Some(50.0), Some(15.0), Some(20.0));
        assert_eq!(result.state, LightState::Red);
    }

    #[test]
    fn test_classify_keeps_previous_when_speed_missing() {
        let estimator = Estimator::default();
        let result = estimator.classify_state(Some(10.0), None, Some(20.0));
        assert_eq!(result.state, LightState::Tracking);
        assert_eq!(result.next_previous_average_speed, Some(20.0));

        let result = estimator.classify_state(None, None, None);
        assert_eq!(result.next_previous_average_speed, None);
    }

    #[test]
    fn test_interval_far_and_missing() {
        let estimator = Estimator::default();
        assert_eq!(estimator.next_interval_ms(Some(1500.0)), 5000);
        assert_eq!(estimator.next_interval_ms(None), 5000);
    }

    #[test]
    fn test_interval_steps() {
        let estimator = Estimator::default();
        assert_eq!(estimator.next_interval_ms(Some(250.0)), 1500);
        assert_eq!(estimator.next_interval_ms(Some(1000.0)), 5000);
        assert_eq!(estimator.next_interval_ms(Some(100.0)), 500);
        assert_eq!(estimator.next_interval_ms(Some(0.0)), 500);
        assert_eq!(estimator.next_interval_ms(Some(-20.0)), 500);
        assert_eq!(estimator.next_interval_ms(Some(101.0)), 1000);
    }

    #[test]
    fn test_interval_saturates_on_extreme_config() {
        let mut config = EstimatorConfig::default().with_trigger_radius(f64::MAX);
        config.interval_step_m = 1.0;
        config.interval_step_ms = u64::MAX;
        let estimator = Estimator::new(config);

        assert_eq!(estimator.next_interval_ms(Some(1.0e12)), u64::MAX);
    }

    #[test]
    fn test_evaluate_near_light() {
        let estimator = Estimator::default();
        let lights = vec![TrafficLight::with_label(0.0, 0.0, "17")];

        let mut history = PositionHistory::default();
        history.push(PositionSample::new(0.0003, 0.0, Some(30.0), 0));

        let estimate = estimator.evaluate(&history, &lights, None);
        let distance = estimate.distance_to_light_m.unwrap();
        assert!(distance < 50.0, "got {}", distance);
        assert_eq!(estimate.nearest_light_label.as_deref(), Some("17"));
        assert_eq!(estimate.average_speed_kmh, Some(30.0));
        assert_eq!(estimate.state, LightState::Green);
        assert_eq!(estimate.next_interval_ms, 500);
    }

    #[test]
    fn test_evaluate_without_lights() {
        let estimator = Estimator::default();
        let mut history = PositionHistory::default();
        history.push(PositionSample::new(0.0, 0.0, Some(30.0), 0));

        let estimate = estimator.evaluate(&history, &[], Some(40.0));
        assert_eq!(estimate.distance_to_light_m, None);
        assert_eq!(estimate.state, LightState::Tracking);
        assert_eq!(estimate.next_interval_ms, 5000);
        assert_eq!(estimate.next_previous_average_speed, Some(30.0));
    }
}
