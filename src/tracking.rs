use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::interpolate;
use crate::models::{LatLon, RouteId, VehicleFix, VehicleId};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_EVICTION_MULTIPLIER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Expected time between position snapshots, also the interpolation window
    pub poll_interval: Duration,
    /// A vehicle missing for longer than this many poll intervals is evicted
    pub eviction_multiplier: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            eviction_multiplier: DEFAULT_EVICTION_MULTIPLIER,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval_ms(&self) -> i64 {
        i64::try_from(self.poll_interval.as_millis()).unwrap_or(i64::MAX)
    }

    pub fn eviction_after_ms(&self) -> i64 {
        self.poll_interval_ms()
            .saturating_mul(i64::from(self.eviction_multiplier))
    }
}

/// A vehicle being animated between its last two observed fixes.
///
/// Timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedVehicle {
    pub route_id: RouteId,
    /// Where the vehicle was drawn when the latest fix arrived
    pub prev_pos: LatLon,
    /// The latest observed fix
    pub next_pos: LatLon,
    /// Start of the current interpolation window
    pub last_update: i64,
    /// Last snapshot that contained this vehicle
    pub last_seen: i64,
}

/// Issued before a poll starts. Results carrying an older ticket than one
/// already applied are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTicket(u64);

/// What a reconciliation changed. Evicted ids are handed back so the caller
/// can tear down whatever it rendered for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub created: Vec<VehicleId>,
    pub updated: Vec<VehicleId>,
    pub evicted: Vec<VehicleId>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.evicted.is_empty()
    }
}

/// Every tracked vehicle, keyed by id. Sole owner of the vehicle records.
#[derive(Debug, Default)]
pub struct TrackedEntitySet {
    vehicles: HashMap<VehicleId, TrackedVehicle>,
    config: TrackerConfig,
    issued: u64,
    applied: u64,
}

impl TrackedEntitySet {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            vehicles: HashMap::new(),
            config,
            issued: 0,
            applied: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, id: &VehicleId) -> Option<&TrackedVehicle> {
        self.vehicles.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VehicleId, &TrackedVehicle)> {
        self.vehicles.iter()
    }

    pub fn issue_ticket(&mut self) -> PollTicket {
        self.issued += 1;
        PollTicket(self.issued)
    }

    /// Apply a snapshot fetched under `ticket`, unless a newer poll already applied.
    pub fn reconcile_ticketed(
        &mut self,
        ticket: PollTicket,
        snapshot: &[VehicleFix],
        now_ms: i64,
    ) -> Option<Reconciliation> {
        if ticket.0 <= self.applied {
            tracing::debug!(ticket = ticket.0, applied = self.applied, "Dropping out-of-order snapshot");
            return None;
        }
        self.applied = ticket.0;
        Some(self.reconcile(snapshot, now_ms))
    }

    /// Merge a position snapshot taken at `now_ms`.
    ///
    /// New vehicles start stationary at their fix. Known vehicles restart
    /// their window from wherever they are currently drawn, so motion stays
    /// continuous. Vehicles absent for longer than the eviction window are
    /// removed. An empty snapshot is treated as a failed poll and changes nothing.
    pub fn reconcile(&mut self, snapshot: &[VehicleFix], now_ms: i64) -> Reconciliation {
        let mut result = Reconciliation::default();

        if snapshot.is_empty() {
            tracing::warn!("Received 0 vehicles, keeping previous positions");
            return result;
        }

        let poll_ms = self.config.poll_interval_ms();
        let mut seen = HashSet::with_capacity(snapshot.len());

        for fix in snapshot {
            // first fix per id wins
            if !seen.insert(fix.id.clone()) {
                tracing::debug!(vehicle_id = %fix.id, "Duplicate vehicle in snapshot, ignoring");
                continue;
            }
            let position = fix.position();

            match self.vehicles.get_mut(&fix.id) {
                Some(vehicle) => {
                    vehicle.prev_pos = interpolate::position_of(vehicle, now_ms, poll_ms);
                    vehicle.next_pos = position;
                    vehicle.route_id = fix.route_id.clone();
                    vehicle.last_update = now_ms;
                    vehicle.last_seen = now_ms;
                    result.updated.push(fix.id.clone());
                }
                None => {
                    self.vehicles.insert(
                        fix.id.clone(),
                        TrackedVehicle {
                            route_id: fix.route_id.clone(),
                            prev_pos: position,
                            next_pos: position,
                            last_update: now_ms,
                            last_seen: now_ms,
                        },
                    );
                    result.created.push(fix.id.clone());
                }
            }
        }

        let evict_after = self.config.eviction_after_ms();
        self.vehicles.retain(|id, vehicle| {
            let stale = !seen.contains(id) && now_ms - vehicle.last_seen > evict_after;
            if stale {
                result.evicted.push(id.clone());
            }
            !stale
        });
        result.evicted.sort();

        tracing::debug!(
            created = result.created.len(),
            updated = result.updated.len(),
            evicted = result.evicted.len(),
            tracked = self.vehicles.len(),
            "Reconciled vehicle snapshot"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(id: &str, lat: f64, lon: f64) -> VehicleFix {
        VehicleFix::new(id, lat, lon, "900")
    }

    fn id(s: &str) -> VehicleId {
        VehicleId::from(s)
    }

    #[test]
    fn first_sighting_is_stationary() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        let result = set.reconcile(&[fix("B1", 43.70, -79.40)], 1_000);

        assert_eq!(result.created, vec![id("B1")]);
        let vehicle = set.get(&id("B1")).unwrap();
        assert_eq!(vehicle.prev_pos, vehicle.next_pos);
        assert_eq!(vehicle.last_update, 1_000);
        assert_eq!(vehicle.last_seen, 1_000);
    }

    #[test]
    fn update_rebases_from_drawn_position() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        set.reconcile(&[fix("B1", 0.0, 0.0)], 0);
        set.reconcile(&[fix("B1", 10.0, 20.0)], 5_000);

        // halfway through the second window the vehicle is drawn at (5, 10)
        let result = set.reconcile(&[fix("B1", 30.0, 30.0)], 7_500);
        assert_eq!(result.updated, vec![id("B1")]);

        let vehicle = set.get(&id("B1")).unwrap();
        assert!((vehicle.prev_pos.lat - 5.0).abs() < 1e-9);
        assert!((vehicle.prev_pos.lon - 10.0).abs() < 1e-9);
        assert_eq!(vehicle.next_pos, LatLon::new(30.0, 30.0));
        assert_eq!(vehicle.last_update, 7_500);
    }

    #[test]
    fn empty_snapshot_changes_nothing() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        set.reconcile(&[fix("B1", 1.0, 1.0), fix("B2", 2.0, 2.0)], 0);
        let before: Vec<_> = {
            let mut v: Vec<_> = set.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            v.sort_by(|a, b| a.0.cmp(&b.0));
            v
        };

        let result = set.reconcile(&[], 60_000);
        assert!(result.is_noop());

        let mut after: Vec<_> = set.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        after.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(before, after);
    }

    #[test]
    fn eviction_waits_past_three_intervals() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        set.reconcile(&[fix("A", 1.0, 1.0), fix("B", 2.0, 2.0)], 0);

        let result = set.reconcile(&[fix("A", 1.0, 1.0)], 15_000);
        assert!(result.evicted.is_empty());
        assert!(set.get(&id("B")).is_some());

        let result = set.reconcile(&[fix("A", 1.0, 1.0)], 15_001);
        assert_eq!(result.evicted, vec![id("B")]);
        assert!(set.get(&id("B")).is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn eviction_multiplier_is_configurable() {
        let mut set = TrackedEntitySet::new(TrackerConfig {
            poll_interval: Duration::from_secs(10),
            eviction_multiplier: 1,
        });
        set.reconcile(&[fix("A", 1.0, 1.0), fix("B", 2.0, 2.0)], 0);
        let result = set.reconcile(&[fix("A", 1.0, 1.0)], 10_001);
        assert_eq!(result.evicted, vec![id("B")]);
    }

    #[test]
    fn repeated_id_reported_once() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        let result = set.reconcile(&[fix("B1", 1.0, 1.0), fix("B1", 9.0, 9.0)], 0);

        assert_eq!(result.created, vec![id("B1")]);
        assert!(result.updated.is_empty());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&id("B1")).unwrap().next_pos, LatLon::new(1.0, 1.0));
    }

    #[test]
    fn stale_ticket_is_dropped() {
        let mut set = TrackedEntitySet::new(TrackerConfig::default());
        let slow = set.issue_ticket();
        let fast = set.issue_ticket();

        assert!(set.reconcile_ticketed(fast, &[fix("B1", 2.0, 2.0)], 1_000).is_some());
        assert!(set.reconcile_ticketed(slow, &[fix("B1", 1.0, 1.0)], 1_200).is_none());
        assert_eq!(set.get(&id("B1")).unwrap().next_pos, LatLon::new(2.0, 2.0));
    }
}
