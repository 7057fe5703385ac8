/// Utility functions
use serde_json::Value;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate distance between two coordinates using Haversine formula
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rlat1 = lat1.to_radians();
    let rlat2 = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + rlat1.cos() * rlat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for near-antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Check a WGS84 coordinate pair, returning a reason when it is unusable
pub fn check_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(format!("non-finite coordinates ({}, {})", lat, lon));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {} outside [-90, 90]", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude {} outside [-180, 180]", lon));
    }
    Ok(())
}

/// Render a JSON value as a flat string (FCM data values must be strings)
pub fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Human-readable distance for notification copy
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as i64)
    } else if km < 10.0 {
        format!("{:.1} km", km)
    } else {
        format!("{} km", km.round() as i64)
    }
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_km_zero_distance() {
        let distance = haversine_km(37.7749, -122.4194, 37.7749, -122.4194);
        assert!(distance.abs() < 1e-9);
    }

    #[test]
    fn test_haversine_km_known_distance() {
        // London (51.5074°N, 0.1278°W) to Paris (48.8566°N, 2.3522°E)
        // Approximate distance: ~344 km
        let distance = haversine_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((distance - 344.0).abs() < 10.0); // Within 10km tolerance
    }

    #[test]
    fn test_haversine_km_symmetric() {
        let pairs = [
            ((37.7749, -122.4194), (34.0522, -118.2437)),
            ((-33.8688, 151.2093), (51.5074, -0.1278)),
            ((89.9, 0.0), (-89.9, 179.9)),
            ((0.0, -179.5), (0.0, 179.5)),
        ];
        for ((a_lat, a_lon), (b_lat, b_lon)) in pairs {
            let ab = haversine_km(a_lat, a_lon, b_lat, b_lon);
            let ba = haversine_km(b_lat, b_lon, a_lat, a_lon);
            assert!(ab >= 0.0);
            assert!((ab - ba).abs() < 1e-6, "{} != {}", ab, ba);
        }
    }

    #[test]
    fn test_haversine_km_antipodal_is_half_circumference() {
        let distance = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_check_coordinates() {
        assert!(check_coordinates(37.7749, -122.4194).is_ok());
        assert!(check_coordinates(90.0, 180.0).is_ok());
        assert!(check_coordinates(90.1, 0.0).is_err());
        assert!(check_coordinates(0.0, -180.5).is_err());
        assert!(check_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&serde_json::json!("abc")), "abc");
        assert_eq!(stringify(&serde_json::json!(12.5)), "12.5");
        assert_eq!(stringify(&serde_json::json!(true)), "true");
        assert_eq!(stringify(&Value::Null), "");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.25), "250 m");
        assert_eq!(format_distance(3.456), "3.5 km");
        assert_eq!(format_distance(42.4), "42 km");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("  short  ", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 5), "abcd…");
    }
}
