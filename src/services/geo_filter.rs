use crate::domain::{NearbyUser, SightingEvent, UserLocation};
use crate::utils::{check_coordinates, haversine_km};
use tracing::warn;

/// Users whose alert radius covers the sighting, paired with their distance.
///
/// Users with alerts disabled or with unusable coordinates are skipped. Output
/// follows input order.
pub fn find_nearby(sighting: &SightingEvent, users: &[UserLocation]) -> Vec<NearbyUser> {
    users
        .iter()
        .filter(|user| user.alert_notifications_enabled)
        .filter_map(|user| {
            if let Err(reason) = check_coordinates(user.latitude, user.longitude) {
                warn!(user_id = %user.user_id, %reason, "Skipping user with invalid location");
                return None;
            }
            let distance_km = haversine_km(
                sighting.latitude,
                sighting.longitude,
                user.latitude,
                user.longitude,
            );
            (distance_km <= user.alert_range_km).then(|| NearbyUser {
                user: user.clone(),
                distance_km,
            })
        })
        .collect()
}
