use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::api::{TRIP_UPDATES_URL, VEHICLE_POSITIONS_URL};
use crate::calendar::ServiceCalendar;
use crate::models::StopId;
use crate::resolver::{ResolverConfig, DEFAULT_ARRIVAL_COUNT, DEFAULT_FORWARD_SEARCH_DAYS};
use crate::time_codec::OVERNIGHT_END_HOUR;
use crate::tracking::{TrackerConfig, DEFAULT_EVICTION_MULTIPLIER};

/// Live bus map core: tracks vehicles and answers next-arrival queries
#[derive(Debug, Clone, Parser)]
#[command(version)]
pub struct Config {
    /// GTFS-RT VehiclePositions feed
    #[arg(long, env = "BUSMAP_VEHICLES_URL", default_value = VEHICLE_POSITIONS_URL)]
    pub vehicles_url: String,

    /// GTFS-RT TripUpdates feed
    #[arg(long, env = "BUSMAP_TRIP_UPDATES_URL", default_value = TRIP_UPDATES_URL)]
    pub trip_updates_url: String,

    /// Static timetable JSON, `{stop_id: [{arrival_time, route_id, service_id}]}`
    #[arg(long, env = "BUSMAP_STATIC_SCHEDULE", default_value = "static/stop_schedule.json")]
    pub static_schedule: PathBuf,

    /// Milliseconds between vehicle position polls
    #[arg(long, env = "BUSMAP_POLL_INTERVAL_MS", default_value_t = 5_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Evict a vehicle after this many poll intervals without a sighting
    #[arg(long, env = "BUSMAP_EVICTION_MULTIPLIER", default_value_t = DEFAULT_EVICTION_MULTIPLIER)]
    pub eviction_multiplier: u32,

    /// Seconds before a feed request is abandoned
    #[arg(long, env = "BUSMAP_FETCH_TIMEOUT_SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout_secs: u64,

    /// Seconds between live schedule (trip update) refreshes
    #[arg(long, env = "BUSMAP_SCHEDULE_REFRESH_SECS", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub schedule_refresh_secs: u64,

    /// Milliseconds between render ticks
    #[arg(long, env = "BUSMAP_TICK_MS", default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Days the static forward search looks ahead
    #[arg(long, env = "BUSMAP_FORWARD_SEARCH_DAYS", default_value_t = DEFAULT_FORWARD_SEARCH_DAYS)]
    pub forward_search_days: u32,

    /// Arrivals reported per stop
    #[arg(long, env = "BUSMAP_ARRIVAL_COUNT", default_value_t = DEFAULT_ARRIVAL_COUNT)]
    pub arrival_count: usize,

    /// Local hour before which overnight service applies
    #[arg(long, env = "BUSMAP_OVERNIGHT_END_HOUR", default_value_t = OVERNIGHT_END_HOUR)]
    pub overnight_end_hour: u32,

    #[arg(long, env = "BUSMAP_WEEKDAY_SERVICE", default_value = "Weekday")]
    pub weekday_service_id: String,

    #[arg(long, env = "BUSMAP_WEEKEND_SERVICE", default_value = "SatSun")]
    pub weekend_service_id: String,

    #[arg(long, env = "BUSMAP_OVERNIGHT_SERVICE", default_value = "Overnight")]
    pub overnight_service_id: String,

    /// Stops whose next arrivals are logged after every live schedule refresh
    #[arg(long = "watch-stop", env = "BUSMAP_WATCH_STOPS", value_delimiter = ',')]
    pub watch_stops: Vec<String>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn schedule_refresh(&self) -> Duration {
        Duration::from_secs(self.schedule_refresh_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: self.poll_interval(),
            eviction_multiplier: self.eviction_multiplier,
        }
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            forward_search_days: self.forward_search_days,
            calendar: ServiceCalendar {
                overnight_end_hour: self.overnight_end_hour,
                weekday_service_id: self.weekday_service_id.clone(),
                weekend_service_id: self.weekend_service_id.clone(),
                overnight_service_id: self.overnight_service_id.clone(),
            },
        }
    }

    pub fn watched_stops(&self) -> Vec<StopId> {
        self.watch_stops
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(StopId::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library_defaults() {
        let config = Config::try_parse_from(["busmap"]).unwrap();
        assert_eq!(config.tracker(), TrackerConfig::default());
        assert_eq!(config.resolver(), ResolverConfig::default());
        assert_eq!(config.arrival_count, 2);
        assert!(config.watched_stops().is_empty());
    }

    #[test]
    fn parses_overrides() {
        let config = Config::try_parse_from([
            "busmap",
            "--poll-interval-ms",
            "10000",
            "--forward-search-days",
            "7",
            "--watch-stop",
            "1001, 1002",
        ])
        .unwrap();
        assert_eq!(config.tracker().eviction_after_ms(), 30_000);
        assert_eq!(config.resolver().forward_search_days, 7);
        assert_eq!(config.watched_stops(), vec![StopId::from("1001"), StopId::from("1002")]);
    }

    #[test]
    fn rejects_zero_intervals() {
        for flag in [
            "--poll-interval-ms",
            "--fetch-timeout-secs",
            "--schedule-refresh-secs",
            "--tick-ms",
        ] {
            assert!(Config::try_parse_from(["busmap", flag, "0"]).is_err(), "{flag} accepted 0");
            assert!(Config::try_parse_from(["busmap", flag, "1"]).is_ok(), "{flag} rejected 1");
        }
    }
}
