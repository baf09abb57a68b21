//! Great-circle distance and nearest-light lookup

use crate::types::{Coordinate, TrafficLight};

/// Mean Earth radius used by the haversine formula (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in meters
pub fn distance_meters(p1: Coordinate, p2: Coordinate) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let d_phi = (p2.latitude - p1.latitude).to_radians();
    let d_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` just outside [0, 1]
    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// A light paired with its distance from a query position
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyLight<'a> {
    pub light: &'a TrafficLight,
    pub distance_m: f64,
}

/// Distance to the closest light, ignoring lights that coincide with `position`
///
/// Returns `None` for an empty registry.
pub fn nearest_light_distance(position: Coordinate, lights: &[TrafficLight]) -> Option<f64> {
    nearest_light(position, lights).map(|nearby| nearby.distance_m)
}

/// The closest light with its distance
///
/// The first light at the minimal distance wins.
pub fn nearest_light(position: Coordinate, lights: &[TrafficLight]) -> Option<NearbyLight<'_>> {
    lights
        .iter()
        .map(|light| NearbyLight {
            light,
            distance_m: distance_meters(position, light.coordinate()),
        })
        .filter(|nearby| nearby.distance_m > 0.0)
        .fold(None, |best: Option<NearbyLight<'_>>, candidate| match best {
            Some(current) if current.distance_m <= candidate.distance_m => Some(current),
            _ => Some(candidate),
        })
}

/// All lights within `radius_m`, nearest first
pub fn lights_within(
    position: Coordinate,
    lights: &[TrafficLight],
    radius_m: f64,
) -> Vec<NearbyLight<'_>> {
    let mut nearby: Vec<NearbyLight<'_>> = lights
        .iter()
        .map(|light| NearbyLight {
            light,
            distance_m: distance_meters(position, light.coordinate()),
        })
        .filter(|nearby| {
            nearby.distance_m.is_finite() && nearby.distance_m > 0.0 && nearby.distance_m <= radius_m
        })
        .collect();

    nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    nearby
}

/// Human-readable distance: meters below 1 km, kilometers above
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() {
        return "-".to_string();
    }

    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(55.7558, 37.6173),
            Coordinate::new(-33.8688, 151.2093),
        ];
        for p in points {
            assert_eq!(distance_meters(p, p), 0.0);
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Coordinate::new(55.7558, 37.6173);
        let b = Coordinate::new(59.9343, 30.3351);
        assert!(approx_eq(distance_meters(a, b), distance_meters(b, a), 1e-6));
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0));
        assert!(approx_eq(d, 111_195.0, 111_195.0 * 0.01), "got {}", d);
    }

    #[test]
    fn test_antipodal_points_stay_finite() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!(d.is_finite());
        assert!(approx_eq(d, std::f64::consts::PI * EARTH_RADIUS_M, 1.0));
    }

    #[test]
    fn test_nearest_light_empty_registry() {
        assert_eq!(nearest_light_distance(Coordinate::new(0.0, 0.0), &[]), None);
    }

    #[test]
    fn test_nearest_light_single() {
        let lights = vec![TrafficLight::new(0.0, 0.0)];
        let d = nearest_light_distance(Coordinate::new(0.001, 0.0), &lights).unwrap();
        assert!(approx_eq(d, 111.2, 0.5), "got {}", d);
    }

    #[test]
    fn test_nearest_light_skips_coincident() {
        let lights = vec![TrafficLight::new(0.0, 0.0), TrafficLight::new(0.002, 0.0)];
        let d = nearest_light_distance(Coordinate::new(0.0, 0.0), &lights).unwrap();
        assert!(approx_eq(d, 222.4, 0.5), "got {}", d);

        let only_coincident = vec![TrafficLight::new(0.0, 0.0)];
        assert_eq!(nearest_light_distance(Coordinate::new(0.0, 0.0), &only_coincident), None);
    }

    #[test]
    fn test_nearest_light_first_tie_wins() {
        let lights = vec![
            TrafficLight::with_label(0.001, 0.0, "north"),
            TrafficLight::with_label(-0.001, 0.0, "south"),
        ];
        let nearest = nearest_light(Coordinate::new(0.0, 0.0), &lights).unwrap();
        assert_eq!(nearest.light.label.as_deref(), Some("north"));
    }

    #[test]
    fn test_lights_within_sorted_and_filtered() {
        let lights = vec![
            TrafficLight::with_label(0.02, 0.0, "far"),
            TrafficLight::with_label(0.001, 0.0, "near"),
            TrafficLight::with_label(0.1, 0.0, "outside"),
            TrafficLight::with_label(0.0, 0.0, "here"),
        ];
        let nearby = lights_within(Coordinate::new(0.0, 0.0), &lights, 5000.0);
        let labels: Vec<_> = nearby
            .iter()
            .map(|n| n.light.label.as_deref().unwrap())
            .collect();
        assert_eq!(labels, vec!["near", "far"]);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(249.6), "250 m");
        assert_eq!(format_distance(1500.0), "1.50 km");
        assert_eq!(format_distance(f64::NAN), "-");
    }
}
