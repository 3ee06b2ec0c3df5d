use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use busmap::api::GtfsClient;
use busmap::config::Config;
use busmap::interpolate::MotionInterpolator;
use busmap::render::{MarkerSync, TracingLayer};
use busmap::resolver::ArrivalResolver;
use busmap::schedule::{self, ScheduleStore};
use busmap::tracking::TrackedEntitySet;
use clap::Parser;
use tokio::time::MissedTickBehavior;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    tracing::info!(
        poll_ms = config.poll_interval_ms,
        static_schedule = %config.static_schedule.display(),
        "Live bus map starting"
    );

    let client = Arc::new(GtfsClient::new(
        &config.vehicles_url,
        &config.trip_updates_url,
        config.fetch_timeout(),
    )?);
    match client.poll_route_ids().await {
        Ok(routes) => {
            let routes: Vec<String> = routes.iter().map(ToString::to_string).collect();
            tracing::info!(count = routes.len(), "Active routes: {}", routes.join(", "));
        }
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "Could not list active routes"),
    }

    let store = Arc::new(ScheduleStore::new());
    let resolver = Arc::new(ArrivalResolver::new(store.clone(), config.resolver()));

    // The static timetable loads in the background; arrivals report "loading" until then
    {
        let store = store.clone();
        let path = config.static_schedule.clone();
        tokio::spawn(async move {
            match schedule::load_static_table(&path).await {
                Ok(table) => store.replace_static(table),
                Err(e) => tracing::error!(error = %format!("{e:#}"), "Static schedule unavailable"),
            }
        });
    }

    // Live schedule refresh
    {
        let client = client.clone();
        let resolver = resolver.clone();
        let watched = config.watched_stops();
        let count = config.arrival_count;
        let mut interval = tokio::time::interval(config.schedule_refresh());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                match client.poll_live_schedule().await {
                    Ok(table) => resolver.store().replace_live(table),
                    Err(e) => tracing::warn!(error = %format!("{e:#}"), "Live schedule refresh failed, keeping previous table"),
                }

                let now = chrono::Utc::now().timestamp();
                for stop in &watched {
                    let arrivals = resolver.resolve(stop, now, count);
                    tracing::info!(stop_id = %stop, "Next arrivals: {}", arrivals.message().replace('\n', " | "));
                }
            }
        });
    }

    let tracker = Arc::new(Mutex::new(TrackedEntitySet::new(config.tracker())));
    let markers = Arc::new(Mutex::new(MarkerSync::new(TracingLayer)));

    // Render loop, never suspends while holding the tracker
    {
        let tracker = tracker.clone();
        let markers = markers.clone();
        let interpolator = MotionInterpolator::from(&config.tracker());
        let mut interval = tokio::time::interval(config.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                let frame = {
                    let set = tracker.lock().unwrap_or_else(PoisonError::into_inner);
                    interpolator.tick(&set, now_ms())
                };
                markers.lock().unwrap_or_else(PoisonError::into_inner).frame(&frame);
            }
        });
    }

    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll_count = 0u64;

    tracing::info!(interval_ms = config.poll_interval_ms, "Starting polling loop");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(polls = poll_count, "Shutting down");
                return Ok(());
            }
        }
        poll_count += 1;

        let ticket = tracker.lock().unwrap_or_else(PoisonError::into_inner).issue_ticket();
        let snapshot = match client.poll_vehicles().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(poll = poll_count, error = %format!("{e:#}"), "Poll failed, keeping previous positions");
                continue;
            }
        };

        let reconciliation = tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reconcile_ticketed(ticket, &snapshot, now_ms());

        if let Some(reconciliation) = reconciliation {
            if !reconciliation.evicted.is_empty() {
                markers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .release(&reconciliation.evicted);
            }
            tracing::info!(
                poll = poll_count,
                vehicles = snapshot.len(),
                created = reconciliation.created.len(),
                evicted = reconciliation.evicted.len(),
                "Applied vehicle snapshot"
            );
        }
    }
}
