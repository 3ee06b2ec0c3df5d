use std::time::Duration;

use busmap::api::{self, TRIP_UPDATES_URL, VEHICLE_POSITIONS_URL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let vehicles_url = std::env::args().nth(1).unwrap_or_else(|| VEHICLE_POSITIONS_URL.to_string());
    let trip_updates_url = std::env::args().nth(2).unwrap_or_else(|| TRIP_UPDATES_URL.to_string());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    println!("Fetching from: {}", vehicles_url);
    let bytes = client.get(&vehicles_url).send().await?.bytes().await?;
    println!("Received {} bytes", bytes.len());

    let feed = api::decode_feed(&bytes)?;
    println!("Feed header version: {:?}", feed.header.gtfs_realtime_version);
    println!("Feed timestamp: {:?}", feed.header.timestamp);
    println!("Number of entities: {}", feed.entity.len());

    let vehicles = api::vehicles_from_feed(&feed);
    println!("\n--- {} usable vehicles ---", vehicles.len());
    for vehicle in &vehicles {
        println!("{} ({:?})", vehicle, vehicle.status);
    }

    let routes: Vec<String> = api::active_route_ids(&feed).iter().map(ToString::to_string).collect();
    println!("\nActive routes: {}", routes.join(", "));

    println!("\nFetching from: {}", trip_updates_url);
    let bytes = client.get(&trip_updates_url).send().await?.bytes().await?;
    let live = api::live_table_from_feed(&api::decode_feed(&bytes)?);

    let mut stops: Vec<_> = live.iter().collect();
    stops.sort_by(|a, b| a.0.cmp(b.0));
    println!("--- Live arrivals for {} stops ---", stops.len());
    for (stop, arrivals) in stops {
        let mut arrivals = arrivals.clone();
        arrivals.sort_by_key(|a| a.arrival);
        println!("Stop {}:", stop);
        for arrival in arrivals.iter().take(3) {
            println!("  Route {} at {} (trip {:?})", arrival.route_id, arrival.arrival, arrival.trip_id);
        }
        if arrivals.len() > 3 {
            println!("  ... and {} more", arrivals.len() - 3);
        }
    }

    Ok(())
}
