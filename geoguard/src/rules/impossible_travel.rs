// geoguard/src/rules/impossible_travel.rs
//
// Impossible travel — two consecutive logins whose implied ground speed
// exceeds what any traveller could achieve.
//
//   distance = haversine(last, current)
//   speed    = distance / (now - last_timestamp)
//   fires when speed > impossible_travel_speed_kmh          → HIGH
//
// Non-detection window: when there is no previous login, or the previous one
// is no more than min_travel_elapsed_secs old, the rule stays silent.
// Near-simultaneous requests would otherwise divide by noise.
//
// A finding carries a SecurityAlert for the alert sink with distance, speed,
// elapsed seconds and both endpoints.

use std::collections::HashMap;

use chrono::Duration;
use serde_json::json;

use crate::events::{AlertSeverity, RiskLevel, RuleFinding, RuleKind, SecurityAlert};
use crate::geo::distance::{distance_km, is_impossible, speed_kmh};
use crate::rules::RuleContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelMeasurement {
    pub distance_km: f64,
    pub speed_kmh:   f64,
    pub elapsed:     Duration,
}

/// Distance and speed from the last recorded login to this one, or None
/// inside the non-detection window.
pub fn measure(ctx: &RuleContext<'_>) -> Option<TravelMeasurement> {
    let last = ctx.history.last_location()?;
    let last_ts = ctx.history.last_timestamp()?;

    let elapsed = ctx.now - last_ts;
    if elapsed.num_milliseconds() <= ctx.config.min_travel_elapsed_secs.saturating_mul(1000) {
        return None;
    }

    let distance = distance_km(last.coordinates, ctx.current.coordinates);
    Some(TravelMeasurement {
        distance_km: distance,
        speed_kmh:   speed_kmh(distance, elapsed),
        elapsed,
    })
}

pub fn analyze(ctx: &RuleContext<'_>) -> Option<RuleFinding> {
    let m = measure(ctx)?;
    if !is_impossible(m.speed_kmh, ctx.config.impossible_travel_speed_kmh) {
        return None;
    }
    let last = ctx.history.last_location()?;
    let current = ctx.current;

    let alert = format!(
        "Impossible travel detected: {:.0} km/h from {}, {} to {}, {}",
        m.speed_kmh,
        last.city_label(), last.country_label(),
        current.city_label(), current.country_label(),
    );

    let attributes: HashMap<String, String> = [
        ("distance_km",      format!("{:.1}", m.distance_km)),
        ("speed_kmh",        format!("{:.0}", m.speed_kmh)),
        ("elapsed_seconds",  m.elapsed.num_seconds().to_string()),
        ("previous_city",    last.city_label().to_string()),
        ("previous_country", last.country_label().to_string()),
        ("current_city",     current.city_label().to_string()),
        ("current_country",  current.country_label().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut finding = RuleFinding::new(RuleKind::ImpossibleTravel, RiskLevel::High, alert);
    finding.meta.insert("impossible_travel".into(), json!(true));
    finding.security_alert = Some(SecurityAlert {
        user_id:     ctx.user_id.to_string(),
        title:       "Impossible travel detected".to_string(),
        attributes,
        severity:    AlertSeverity::Critical,
        timestamp:   ctx.now,
        environment: ctx.config.environment.clone(),
    });
    Some(finding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::GeoLocation;
    use crate::state::history::LocationHistory;
    use chrono::{DateTime, Utc};

    fn tokyo() -> GeoLocation {
        GeoLocation::new("JP").with_city("Tokyo").with_coordinates(35.68, 139.69)
    }

    fn new_york() -> GeoLocation {
        GeoLocation::new("US").with_city("New York").with_coordinates(40.71, -74.0)
    }

    fn history_with(loc: GeoLocation, at: DateTime<Utc>) -> LocationHistory {
        let mut h = LocationHistory::new("u1", 10);
        h.record(loc, at);
        h
    }

    fn ctx<'a>(
        current: &'a GeoLocation,
        history: &'a LocationHistory,
        now: DateTime<Utc>,
        config: &'a EngineConfig,
    ) -> RuleContext<'a> {
        RuleContext { user_id: "u1", current, history, now, config }
    }

    #[test]
    fn tokyo_then_new_york_ten_minutes_later() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let history = history_with(tokyo(), t0);
        let current = new_york();
        let c = ctx(&current, &history, t0 + Duration::minutes(10), &cfg);

        let m = measure(&c).unwrap();
        assert!((m.distance_km - 10_850.0).abs() < 5.0);
        assert!((m.speed_kmh - 65_100.0).abs() < 50.0);

        let f = analyze(&c).unwrap();
        assert_eq!(f.level, RiskLevel::High);
        assert!(f.alert.contains("65102 km/h"), "{}", f.alert);
        assert!(f.alert.contains("Tokyo, JP"));
        assert!(f.alert.contains("New York, US"));

        let sa = f.security_alert.unwrap();
        assert_eq!(sa.user_id, "u1");
        assert_eq!(sa.severity, AlertSeverity::Critical);
        assert_eq!(sa.attributes["elapsed_seconds"], "600");
        assert_eq!(sa.attributes["previous_city"], "Tokyo");
        assert_eq!(sa.attributes["current_country"], "US");
    }

    #[test]
    fn ten_thousand_km_in_one_hour_is_impossible() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let history = history_with(GeoLocation::new("GA").with_coordinates(0.0, 0.0), t0);
        let current = GeoLocation::new("ID").with_coordinates(0.0, 89.93);
        let c = ctx(&current, &history, t0 + Duration::hours(1), &cfg);
        let m = measure(&c).unwrap();
        assert!((m.speed_kmh - 10_000.0).abs() < 5.0);
        assert!(analyze(&c).is_some());
    }

    #[test]
    fn within_one_second_is_skipped() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let history = history_with(GeoLocation::new("GA").with_coordinates(0.0, 0.0), t0);
        let current = GeoLocation::new("GA").with_coordinates(0.0, 0.0);
        let c = ctx(&current, &history, t0 + Duration::seconds(1), &cfg);
        assert!(measure(&c).is_none());
        assert!(analyze(&c).is_none());
    }

    #[test]
    fn far_location_within_one_second_is_skipped() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let history = history_with(tokyo(), t0);
        let current = new_york();
        let c = ctx(&current, &history, t0 + Duration::milliseconds(800), &cfg);
        assert!(analyze(&c).is_none());
    }

    #[test]
    fn huge_window_does_not_overflow() {
        let mut cfg = EngineConfig::default();
        cfg.min_travel_elapsed_secs = i64::MAX;
        let t0 = Utc::now();
        let history = history_with(tokyo(), t0);
        let current = new_york();
        let c = ctx(&current, &history, t0 + Duration::minutes(10), &cfg);
        assert!(analyze(&c).is_none());
    }

    #[test]
    fn empty_history_is_skipped() {
        let cfg = EngineConfig::default();
        let history = LocationHistory::new("u1", 10);
        let current = new_york();
        let c = ctx(&current, &history, Utc::now(), &cfg);
        assert!(analyze(&c).is_none());
    }

    #[test]
    fn plausible_flight_does_not_fire() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let history = history_with(tokyo(), t0);
        let current = new_york();
        let c = ctx(&current, &history, t0 + Duration::hours(14), &cfg);
        assert!(analyze(&c).is_none());
    }

    #[test]
    fn missing_coordinates_suppress_detection() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let history = history_with(GeoLocation::new("JP"), t0);
        let current = new_york();
        let c = ctx(&current, &history, t0 + Duration::minutes(1), &cfg);
        assert_eq!(measure(&c).unwrap().distance_km, 0.0);
        assert!(analyze(&c).is_none());
    }

    #[test]
    fn unknown_endpoint_labels() {
        let cfg = EngineConfig::default();
        let t0 = Utc::now();
        let mut prev = GeoLocation::new("").with_coordinates(35.68, 139.69);
        prev.city = None;
        let history = history_with(prev, t0);
        let current = new_york();
        let c = ctx(&current, &history, t0 + Duration::minutes(10), &cfg);
        let sa = analyze(&c).unwrap().security_alert.unwrap();
        assert_eq!(sa.attributes["previous_city"], "Unknown");
        assert_eq!(sa.attributes["previous_country"], "XX");
    }
}
