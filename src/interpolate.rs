use std::collections::HashMap;

use crate::models::{LatLon, VehicleId};
use crate::tracking::{TrackedEntitySet, TrackedVehicle, TrackerConfig};

/// Fraction of the poll window elapsed at `now_ms`, clamped to [0, 1].
pub fn progress(vehicle: &TrackedVehicle, now_ms: i64, poll_interval_ms: i64) -> f64 {
    if poll_interval_ms <= 0 {
        return 1.0;
    }
    let elapsed = (now_ms - vehicle.last_update) as f64;
    (elapsed / poll_interval_ms as f64).clamp(0.0, 1.0)
}

/// Linear position between the last two fixes. No extrapolation past the
/// latest fix, the ends return the stored fixes exactly.
pub fn position_of(vehicle: &TrackedVehicle, now_ms: i64, poll_interval_ms: i64) -> LatLon {
    let t = progress(vehicle, now_ms, poll_interval_ms);
    if t <= 0.0 {
        return vehicle.prev_pos;
    }
    if t >= 1.0 {
        return vehicle.next_pos;
    }

    let (from, to) = (vehicle.prev_pos, vehicle.next_pos);
    LatLon {
        lat: from.lat + (to.lat - from.lat) * t,
        lon: from.lon + (to.lon - from.lon) * t,
    }
}

/// Computes drawn positions for every tracked vehicle, once per frame
#[derive(Debug, Clone, Copy)]
pub struct MotionInterpolator {
    poll_interval_ms: i64,
}

impl MotionInterpolator {
    pub fn new(poll_interval_ms: i64) -> Self {
        Self { poll_interval_ms }
    }

    pub fn position_of(&self, vehicle: &TrackedVehicle, now_ms: i64) -> LatLon {
        position_of(vehicle, now_ms, self.poll_interval_ms)
    }

    pub fn tick(&self, set: &TrackedEntitySet, now_ms: i64) -> HashMap<VehicleId, LatLon> {
        set.iter()
            .map(|(id, vehicle)| (id.clone(), self.position_of(vehicle, now_ms)))
            .collect()
    }
}

impl From<&TrackerConfig> for MotionInterpolator {
    fn from(config: &TrackerConfig) -> Self {
        Self::new(config.poll_interval_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RouteId;

    fn vehicle() -> TrackedVehicle {
        TrackedVehicle {
            route_id: RouteId::from("900"),
            prev_pos: LatLon::new(43.70, -79.40),
            next_pos: LatLon::new(43.71, -79.41),
            last_update: 10_000,
            last_seen: 10_000,
        }
    }

    #[test]
    fn window_ends_are_exact() {
        let v = vehicle();
        let interp = MotionInterpolator::new(5_000);
        assert_eq!(interp.position_of(&v, 10_000), v.prev_pos);
        assert_eq!(interp.position_of(&v, 15_000), v.next_pos);
        assert_eq!(interp.position_of(&v, 60_000), v.next_pos);
        // clock skew before the window start stays at the previous fix
        assert_eq!(interp.position_of(&v, 9_000), v.prev_pos);
    }

    #[test]
    fn midpoint_is_mean() {
        let v = vehicle();
        let mid = MotionInterpolator::new(5_000).position_of(&v, 12_500);
        assert!((mid.lat - 43.705).abs() < 1e-9);
        assert!((mid.lon - -79.405).abs() < 1e-9);
    }

    #[test]
    fn zero_interval_snaps_to_latest_fix() {
        let v = vehicle();
        assert_eq!(position_of(&v, 10_000, 0), v.next_pos);
    }

    #[test]
    fn tick_covers_every_vehicle() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        set.reconcile(
            &[
                crate::models::VehicleFix::new("a", 1.0, 1.0, "1"),
                crate::models::VehicleFix::new("b", 2.0, 2.0, "2"),
            ],
            0,
        );
        let frame = MotionInterpolator::from(set.config()).tick(&set, 100);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[&VehicleId::from("b")], LatLon::new(2.0, 2.0));
    }
}
