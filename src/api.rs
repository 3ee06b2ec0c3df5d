use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use prost::Message;

use crate::gtfs_realtime::FeedMessage;
use crate::models::{LiveArrival, RouteId, StopId, VehicleFix, VehicleId, VehicleStatus};
use crate::schedule::{self, LiveTable};

pub const VEHICLE_POSITIONS_URL: &str = "https://drtonline.durhamregiontransit.com/gtfsrealtime/VehiclePositions";
pub const TRIP_UPDATES_URL: &str = "https://drtonline.durhamregiontransit.com/gtfsrealtime/TripUpdates";

/// GTFS-RT client for the vehicle position and trip update feeds
pub struct GtfsClient {
    client: reqwest::Client,
    vehicle_positions_url: String,
    trip_updates_url: String,
}

impl GtfsClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(vehicle_positions_url: &str, trip_updates_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            vehicle_positions_url: vehicle_positions_url.to_string(),
            trip_updates_url: trip_updates_url.to_string(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        tracing::debug!(url, "Fetching feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("API returned error status: {}", response.status());
        }

        let bytes = response.bytes().await.context("Failed to read response body")?;

        tracing::debug!(bytes = bytes.len(), "Received data from API");
        Ok(bytes)
    }

    /// Current vehicle positions. An empty result is valid and left to the tracker to judge.
    pub async fn poll_vehicles(&self) -> Result<Vec<VehicleFix>> {
        let data = self.fetch(&self.vehicle_positions_url).await?;
        let feed = decode_feed(&data)?;
        Ok(vehicles_from_feed(&feed))
    }

    /// Predicted arrivals grouped by stop
    pub async fn poll_live_schedule(&self) -> Result<LiveTable> {
        let data = self.fetch(&self.trip_updates_url).await?;
        let feed = decode_feed(&data)?;
        Ok(live_table_from_feed(&feed))
    }

    /// Route ids with at least one vehicle reporting
    pub async fn poll_route_ids(&self) -> Result<Vec<RouteId>> {
        let data = self.fetch(&self.vehicle_positions_url).await?;
        let feed = decode_feed(&data)?;
        Ok(active_route_ids(&feed))
    }
}

pub fn decode_feed(data: &[u8]) -> Result<FeedMessage> {
    let feed = FeedMessage::decode(data).context("Failed to decode protobuf message")?;
    tracing::debug!(entities = feed.entity.len(), "Decoded protobuf feed");
    Ok(feed)
}

/// Extract one fix per vehicle entity that carries a usable position.
///
/// Entities without a vehicle id or with non-finite coordinates are skipped.
pub fn vehicles_from_feed(feed: &FeedMessage) -> Vec<VehicleFix> {
    let mut vehicles = Vec::with_capacity(feed.entity.len());
    let mut skipped = 0usize;

    for entity in &feed.entity {
        let Some(v) = &entity.vehicle else {
            continue;
        };
        let Some(position) = &v.position else {
            skipped += 1;
            continue;
        };

        let (lat, lon) = (f64::from(position.latitude), f64::from(position.longitude));
        let id = v.vehicle.as_ref().and_then(|d| d.id.clone()).unwrap_or_default();
        if id.is_empty() || !lat.is_finite() || !lon.is_finite() {
            tracing::debug!(entity = %entity.id, "Skipping vehicle without id or valid position");
            skipped += 1;
            continue;
        }

        let trip = v.trip.as_ref();
        vehicles.push(VehicleFix {
            id: VehicleId::new(id),
            lat,
            lon,
            route_id: RouteId::new(trip.and_then(|t| t.route_id.clone()).unwrap_or_default()),
            trip_id: trip.and_then(|t| t.trip_id.clone()),
            timestamp: v.timestamp.and_then(|ts| i64::try_from(ts).ok()),
            status: VehicleStatus::from_raw(v.current_status),
        });
    }

    if skipped > 0 {
        tracing::warn!(skipped, "Skipped vehicle entities");
    }
    tracing::info!(count = vehicles.len(), "Returned vehicles");
    vehicles
}

/// Group trip update stop visits by stop, preferring the arrival time and
/// falling back to the departure time.
pub fn live_table_from_feed(feed: &FeedMessage) -> LiveTable {
    let arrivals = feed
        .entity
        .iter()
        .filter_map(|entity| entity.trip_update.as_ref())
        .flat_map(|update| {
            let route_id = RouteId::new(update.trip.route_id.clone().unwrap_or_default());
            let trip_id = update.trip.trip_id.clone();

            update.stop_time_update.iter().filter_map(move |stu| {
                let stop_id = stu.stop_id.clone()?;
                let arrival = stu
                    .arrival
                    .as_ref()
                    .and_then(|a| a.time)
                    .or_else(|| stu.departure.as_ref().and_then(|d| d.time))?;

                Some(LiveArrival {
                    stop_id: StopId::new(stop_id),
                    route_id: route_id.clone(),
                    trip_id: trip_id.clone(),
                    arrival,
                })
            })
        });

    let table = schedule::group_by_stop(arrivals, |a| &a.stop_id);
    tracing::info!(stops = table.len(), "Built live schedule from trip updates");
    table
}

/// Sorted, de-duplicated route ids present in a VehiclePositions feed
pub fn active_route_ids(feed: &FeedMessage) -> Vec<RouteId> {
    let routes: BTreeSet<RouteId> = feed
        .entity
        .iter()
        .filter_map(|e| e.vehicle.as_ref()?.trip.as_ref()?.route_id.clone())
        .filter(|r| !r.is_empty())
        .map(RouteId::new)
        .collect();

    tracing::info!(routes = ?routes, "Detected route ids");
    routes.into_iter().collect()
}
