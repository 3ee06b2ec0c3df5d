use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifiers arrive as JSON strings or numbers depending on the feed;
/// both become the same string so lookups compare exactly.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
    Float(f64),
}

fn coerce_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Integer(i) => i.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(#[serde(deserialize_with = "coerce_id")] String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Stop identifier, exact string match
    StopId
);
string_id!(
    /// Route identifier (e.g. "900")
    RouteId
);
string_id!(
    /// Vehicle identifier from the VehiclePositions feed
    VehicleId
);

/// A geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A predicted stop visit from the TripUpdates feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveArrival {
    /// Filled from the table key when loaded from a per-stop table
    #[serde(default)]
    pub stop_id: StopId,

    pub route_id: RouteId,

    /// Trip this visit belongs to; informational only, arrivals are not deduplicated by trip
    #[serde(default)]
    pub trip_id: Option<String>,

    /// Predicted arrival, Unix epoch seconds
    pub arrival: i64,
}

/// One row of the static timetable, repeated on every day its service runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticScheduleEntry {
    #[serde(default)]
    pub stop_id: StopId,

    pub route_id: RouteId,

    /// Calendar class ("Weekday", "SatSun", "Overnight"), not a trip reference
    pub service_id: String,

    /// "HH:MM:SS" local time, may exceed 24:00:00
    pub arrival_time: String,

    #[serde(default)]
    pub departure_time: Option<String>,
}

/// Where a vehicle is relative to its current stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
    #[default]
    Unknown,
}

impl VehicleStatus {
    /// Map the GTFS-RT `VehicleStopStatus` enum value
    pub fn from_raw(raw: Option<i32>) -> Self {
        match raw {
            Some(0) => Self::IncomingAt,
            Some(1) => Self::StoppedAt,
            Some(2) => Self::InTransitTo,
            _ => Self::Unknown,
        }
    }
}

/// One vehicle in a position snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleFix {
    pub id: VehicleId,

    pub lat: f64,

    pub lon: f64,

    #[serde(default)]
    pub route_id: RouteId,

    #[serde(default)]
    pub trip_id: Option<String>,

    /// Feed timestamp of the fix, Unix epoch seconds
    #[serde(default)]
    pub timestamp: Option<i64>,

    #[serde(default)]
    pub status: VehicleStatus,
}

impl VehicleFix {
    pub fn new(id: impl Into<VehicleId>, lat: f64, lon: f64, route_id: impl Into<RouteId>) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            route_id: route_id.into(),
            trip_id: None,
            timestamp: None,
            status: VehicleStatus::Unknown,
        }
    }

    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

impl fmt::Display for VehicleFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {} on Route {} at ({:.6}, {:.6}) [{}]",
            self.id,
            self.route_id,
            self.lat,
            self.lon,
            self.timestamp
                .and_then(|ts| chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "no timestamp".to_string())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        let from_number: StopId = serde_json::from_str("1024").unwrap();
        let from_text: StopId = serde_json::from_str("\"1024\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(from_number.as_str(), "1024");
    }

    #[test]
    fn static_entry_accepts_numeric_route() {
        let entry: StaticScheduleEntry = serde_json::from_str(
            r#"{"arrival_time": "06:05:00", "departure_time": "06:05:00", "route_id": 900, "service_id": "Weekday"}"#,
        )
        .unwrap();
        assert_eq!(entry.route_id, RouteId::from("900"));
        assert!(entry.stop_id.is_empty());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(VehicleStatus::from_raw(Some(1)), VehicleStatus::StoppedAt);
        assert_eq!(VehicleStatus::from_raw(Some(9)), VehicleStatus::Unknown);
        assert_eq!(VehicleStatus::from_raw(None), VehicleStatus::Unknown);
    }
}
