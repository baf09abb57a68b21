//! Estimator configuration types
//!
//! Every threshold the estimator uses lives here so applications can tune
//! them from a config file. The defaults reproduce the deployed behavior.

use serde::{Deserialize, Serialize};

/// Configuration for the proximity and light-state estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Radius around a light in which the pass state is evaluated (meters)
    #[serde(default = "default_pass_radius")]
    pub pass_radius_m: f64,

    /// Beyond this distance polling falls back to the base interval (meters)
    #[serde(default = "default_trigger_radius")]
    pub trigger_radius_m: f64,

    /// Minimum drop in rolling speed that marks a red light (km/h)
    #[serde(default = "default_speed_drop_threshold")]
    pub speed_drop_threshold_kmh: f64,

    /// Polling interval when no light is near (milliseconds)
    #[serde(default = "default_base_interval")]
    pub base_interval_ms: u64,

    /// Distance covered by one interval step (meters)
    #[serde(default = "default_interval_step_distance")]
    pub interval_step_m: f64,

    /// Interval added per step (milliseconds)
    #[serde(default = "default_interval_step_duration")]
    pub interval_step_ms: u64,

    /// Lower bound on the adaptive interval (milliseconds)
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Number of samples kept for speed averaging
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Radius used when listing nearby lights (meters)
    #[serde(default = "default_nearby_radius")]
    pub nearby_radius_m: f64,

    /// Farthest a reported position may be from a light to be accepted (meters)
    #[serde(default = "default_max_click_distance")]
    pub max_click_distance_m: f64,
}

fn default_pass_radius() -> f64 {
    50.0
}

fn default_trigger_radius() -> f64 {
    1000.0
}

fn default_speed_drop_threshold() -> f64 {
    5.0
}

fn default_base_interval() -> u64 {
    5000
}

fn default_interval_step_distance() -> f64 {
    100.0
}

fn default_interval_step_duration() -> u64 {
    500
}

fn default_min_interval() -> u64 {
    500
}

fn default_history_capacity() -> usize {
    3
}

fn default_nearby_radius() -> f64 {
    5000.0
}

fn default_max_click_distance() -> f64 {
    50.0
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            pass_radius_m: default_pass_radius(),
            trigger_radius_m: default_trigger_radius(),
            speed_drop_threshold_kmh: default_speed_drop_threshold(),
            base_interval_ms: default_base_interval(),
            interval_step_m: default_interval_step_distance(),
            interval_step_ms: default_interval_step_duration(),
            min_interval_ms: default_min_interval(),
            history_capacity: default_history_capacity(),
            nearby_radius_m: default_nearby_radius(),
            max_click_distance_m: default_max_click_distance(),
        }
    }
}

impl EstimatorConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the pass radius
    pub fn with_pass_radius(mut self, meters: f64) -> Self {
        self.pass_radius_m = meters;
        self
    }

    /// Builder method: set the trigger radius
    pub fn with_trigger_radius(mut self, meters: f64) -> Self {
        self.trigger_radius_m = meters;
        self
    }

    /// Builder method: set the red-light speed drop threshold
    pub fn with_speed_drop_threshold(mut self, kmh: f64) -> Self {
        self.speed_drop_threshold_kmh = kmh;
        self
    }

    /// Builder method: set the base polling interval
    pub fn with_base_interval(mut self, ms: u64) -> Self {
        self.base_interval_ms = ms;
        self
    }

    /// Builder method: set the history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Builder method: set the nearby-lights radius
    pub fn with_nearby_radius(mut self, meters: f64) -> Self {
        self.nearby_radius_m = meters;
        self
    }

    /// Builder method: set the maximum accepted click distance
    pub fn with_max_click_distance(mut self, meters: f64) -> Self {
        self.max_click_distance_m = meters;
        self
    }

    /// Check thresholds for values the estimator cannot work with
    ///
    /// Returns a description of every problem found; an empty list means the
    /// configuration is usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let radii = [
            ("pass_radius_m", self.pass_radius_m),
            ("trigger_radius_m", self.trigger_radius_m),
            ("nearby_radius_m", self.nearby_radius_m),
            ("max_click_distance_m", self.max_click_distance_m),
            ("speed_drop_threshold_kmh", self.speed_drop_threshold_kmh),
        ];
        for (name, value) in radii {
            if !value.is_finite() || value < 0.0 {
                problems.push(format!("{} must be a non-negative number, got {}", name, value));
            }
        }

        if !self.interval_step_m.is_finite() || self.interval_step_m <= 0.0 {
            problems.push(format!(
                "interval_step_m must be positive, got {}",
                self.interval_step_m
            ));
        }

        if self.interval_step_ms == 0 {
            problems.push("interval_step_ms must be at least 1".to_string());
        }

        if self.history_capacity == 0 {
            problems.push("history_capacity must be at least 1".to_string());
        }

        problems
    }
}
