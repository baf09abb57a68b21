//! Console output for tracker runs, nearby lights, and aggregated ranges

use green_wave_core::{format_distance, Cycle, LightRange, NearbyLight, RunSummary};

pub fn banner(title: &str) {
    println!("═══════════════════════════════════════════════");
    println!("  Green Wave - {}", title);
    println!("═══════════════════════════════════════════════\n");
}

fn speed_text(speed_kmh: Option<f64>) -> String {
    speed_kmh
        .map(|s| format!("{:.1} km/h", s))
        .unwrap_or_else(|| "-".to_string())
}

/// One line per evaluated fix
pub fn cycle_line(cycle: &Cycle) -> String {
    let evaluation = &cycle.evaluation;
    let light = match (&evaluation.nearest_light_label, evaluation.distance_to_light_m) {
        (Some(label), Some(distance)) => format!("#{} at {}", label, format_distance(distance)),
        (None, Some(distance)) => format_distance(distance),
        (_, None) => "no light".to_string(),
    };

    format!(
        "{}  {:<8}  {:<18}  {:>11}  next poll {} ms",
        evaluation.payload.timestamp,
        evaluation.state,
        light,
        speed_text(evaluation.average_speed_kmh),
        cycle.next_poll_ms
    )
}

pub fn print_summary(summary: &RunSummary) {
    println!("\n📊 Summary:");
    println!("  Cycles:   {}", summary.cycles);
    println!("  Tracking: {}", summary.tracking);
    println!("  Green:    {}", summary.green);
    println!("  Red:      {}", summary.red);
    if summary.rejected > 0 {
        println!("  Rejected: {}", summary.rejected);
    }
    if let Some(closest) = summary.closest_approach_m {
        println!("  Closest approach: {}", format_distance(closest));
    }
}

/// Nearby table, nearest first and marked
pub fn nearby_lines(nearby: &[NearbyLight<'_>], radius_m: f64) -> Vec<String> {
    let Some(nearest) = nearby.first() else {
        return vec![format!("No traffic lights within {}.", format_distance(radius_m))];
    };

    let mut lines = vec![
        format!("Nearest traffic light: {}", format_distance(nearest.distance_m)),
        format!("Lights within {}:", format_distance(radius_m)),
    ];
    for (idx, light) in nearby.iter().enumerate() {
        let marker = if idx == 0 { "▶" } else { " " };
        let label = light.light.label.as_deref().unwrap_or("(no ID)");
        lines.push(format!(
            "  {} {:<12} {:>10}   ({:.6}, {:.6})",
            marker,
            label,
            format_distance(light.distance_m),
            light.light.latitude,
            light.light.longitude
        ));
    }
    lines
}

pub fn print_nearby(nearby: &[NearbyLight<'_>], radius_m: f64) {
    for line in nearby_lines(nearby, radius_m) {
        println!("{}", line);
    }
}

pub fn range_lines(ranges: &[LightRange]) -> Vec<String> {
    if ranges.is_empty() {
        return vec!["No passes recorded for this day.".to_string()];
    }

    ranges
        .iter()
        .map(|range| {
            format!(
                "  {:<12} {:<6} {} → {}",
                range.light_identifier,
                range.color,
                range.start_time.format("%H:%M:%S"),
                range.end_time.format("%H:%M:%S")
            )
        })
        .collect()
}

pub fn print_ranges(ranges: &[LightRange]) {
    for line in range_lines(ranges) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use green_wave_core::{
        lights_within, Coordinate, Evaluation, LightState, PositionSample, TelemetryPayload,
        TrafficLight,
    };

    #[test]
    fn test_cycle_line() {
        let sample = PositionSample::new(0.0, 0.0, None, 0);
        let cycle = Cycle {
            evaluation: Evaluation {
                distance_to_light_m: Some(42.4),
                nearest_light_label: Some("17".to_string()),
                average_speed_kmh: Some(23.456),
                state: LightState::Green,
                next_interval_ms: 500,
                payload: TelemetryPayload::from_sample(&sample, Some(23.456), LightState::Green)
                    .unwrap(),
            },
            next_poll_ms: 500,
        };

        let line = cycle_line(&cycle);
        assert!(line.starts_with("1970-01-01T00:00:00.000Z"));
        assert!(line.contains("green"));
        assert!(line.contains("#17 at 42 m"));
        assert!(line.contains("23.5 km/h"));
        assert!(line.ends_with("next poll 500 ms"));
    }

    #[test]
    fn test_nearby_lines_mark_nearest() {
        let lights = vec![
            TrafficLight::with_label(0.009, 0.0, "far"),
            TrafficLight::new(0.0, 0.0),
            TrafficLight::with_label(0.001, 0.0, "near"),
        ];
        let nearby = lights_within(Coordinate::new(0.0001, 0.0), &lights, 5000.0);
        let lines = nearby_lines(&nearby, 5000.0);

        assert_eq!(lines[0], "Nearest traffic light: 11 m");
        assert_eq!(lines[1], "Lights within 5.00 km:");
        assert!(lines[2].starts_with("  ▶ (no ID)"));
        assert!(lines[3].starts_with("    near"));
        assert!(lines[4].starts_with("    far"));

        assert_eq!(nearby_lines(&[], 50.0), vec!["No traffic lights within 50 m.".to_string()]);
    }

    #[test]
    fn test_range_lines() {
        let range = LightRange {
            light_identifier: "7".to_string(),
            color: LightState::Red,
            start_time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 2, 30).unwrap(),
            day: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };
        assert_eq!(range_lines(&[range]), vec!["  7            red    08:00:00 → 08:02:30".to_string()]);
        assert_eq!(range_lines(&[]), vec!["No passes recorded for this day.".to_string()]);
    }
}
