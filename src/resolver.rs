use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate, NaiveDateTime, TimeZone};

use crate::calendar::ServiceCalendar;
use crate::models::{RouteId, StaticScheduleEntry, StopId};
use crate::schedule::{LiveTable, ScheduleStore, StaticTable};
use crate::time_codec::{self, ClockValue};

pub const DEFAULT_ARRIVAL_COUNT: usize = 2;
pub const DEFAULT_FORWARD_SEARCH_DAYS: u32 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Last day offset the forward search inspects (inclusive)
    pub forward_search_days: u32,
    pub calendar: ServiceCalendar,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            forward_search_days: DEFAULT_FORWARD_SEARCH_DAYS,
            calendar: ServiceCalendar::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalSource {
    Live,
    Scheduled,
}

/// One upcoming arrival, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayArrival {
    pub source: ArrivalSource,
    pub route_id: RouteId,
    /// Local calendar days after the query instant
    pub day_offset: i64,
    /// Seconds after local midnight of the arrival day (may exceed a day for GTFS times)
    pub seconds_since_midnight: i64,
    /// "Today", "Tomorrow" or a weekday name
    pub day_label: String,
    /// 12-hour clock text, e.g. "6:05 AM"
    pub time: String,
}

impl fmt::Display for DisplayArrival {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.day_offset == 0 {
            write!(f, "{} → Route {}", self.time, self.route_id)
        } else {
            write!(f, "{} at {} → Route {}", self.day_label, self.time, self.route_id)
        }
    }
}

/// Why a stop has nothing to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoArrivals {
    /// The stop is absent from the static timetable
    StopNotFound,
    /// The stop is present but has no entries at all
    EmptySchedule,
    /// Nothing runs within the forward-search window
    NoService { available_service_ids: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrivals {
    Found(Vec<DisplayArrival>),
    /// The static timetable has not loaded yet
    Loading,
    Unavailable(NoArrivals),
}

impl Arrivals {
    pub fn arrivals(&self) -> &[DisplayArrival] {
        match self {
            Arrivals::Found(found) => found,
            _ => &[],
        }
    }

    /// Human-readable text, never blank
    pub fn message(&self) -> String {
        match self {
            Arrivals::Found(found) if found.is_empty() => "No upcoming buses.".to_string(),
            Arrivals::Found(found) => found
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            Arrivals::Loading => "Schedule data still loading...".to_string(),
            Arrivals::Unavailable(NoArrivals::StopNotFound) => {
                "No schedule data available for this stop.".to_string()
            }
            Arrivals::Unavailable(NoArrivals::EmptySchedule) => {
                "No schedule entries for this stop.".to_string()
            }
            Arrivals::Unavailable(NoArrivals::NoService { available_service_ids }) => {
                if available_service_ids.is_empty() {
                    "No upcoming buses.".to_string()
                } else {
                    format!(
                        "No service in the coming days. Available service types: {}",
                        available_service_ids.join(", ")
                    )
                }
            }
        }
    }
}

impl fmt::Display for Arrivals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

struct Query<'a, Tz: TimeZone> {
    stop_id: &'a StopId,
    now_epoch: i64,
    /// Local wall-clock time of the query
    now: NaiveDateTime,
    count: usize,
    live: Option<&'a LiveTable>,
    timetable: Option<&'a StaticTable>,
    config: &'a ResolverConfig,
    tz: &'a Tz,
}

enum Step {
    Resolved(Arrivals),
    Continue,
}

/// Resolution stages, tried in order until one resolves
#[derive(Debug, Clone, Copy)]
enum Strategy {
    Live,
    StaticToday,
    ForwardSearch,
}

const CHAIN: [Strategy; 3] = [Strategy::Live, Strategy::StaticToday, Strategy::ForwardSearch];

impl Strategy {
    fn try_resolve<Tz: TimeZone>(self, query: &Query<'_, Tz>) -> Step {
        match self {
            Strategy::Live => live_arrivals(query),
            Strategy::StaticToday => static_today(query),
            Strategy::ForwardSearch => forward_search(query),
        }
    }
}

/// Answers "next arrivals at a stop" from the live and static tables in a
/// [`ScheduleStore`]. Holds no cache; every call reads the current tables.
pub struct ArrivalResolver<Tz: TimeZone = Local> {
    store: Arc<ScheduleStore>,
    config: ResolverConfig,
    tz: Tz,
}

impl ArrivalResolver<Local> {
    pub fn new(store: Arc<ScheduleStore>, config: ResolverConfig) -> Self {
        Self::with_timezone(store, config, Local)
    }
}

impl<Tz: TimeZone> ArrivalResolver<Tz> {
    pub fn with_timezone(store: Arc<ScheduleStore>, config: ResolverConfig, tz: Tz) -> Self {
        Self { store, config, tz }
    }

    pub fn store(&self) -> &Arc<ScheduleStore> {
        &self.store
    }

    /// Next `count` arrivals at `stop_id` as of `now_epoch` (Unix seconds).
    ///
    /// Live predictions win whenever any are upcoming; otherwise today's
    /// static service, then a day-by-day forward search.
    pub fn resolve(&self, stop_id: &StopId, now_epoch: i64, count: usize) -> Arrivals {
        let Some(now) = self.tz.timestamp_opt(now_epoch, 0).single() else {
            tracing::warn!(now_epoch, "Query time out of range");
            return Arrivals::Unavailable(NoArrivals::NoService {
                available_service_ids: Vec::new(),
            });
        };

        let live = self.store.live();
        let timetable = self.store.static_table();
        let query = Query {
            stop_id,
            now_epoch,
            now: now.naive_local(),
            count,
            live: live.as_deref(),
            timetable: timetable.as_deref(),
            config: &self.config,
            tz: &self.tz,
        };

        for strategy in CHAIN {
            if let Step::Resolved(arrivals) = strategy.try_resolve(&query) {
                tracing::debug!(stop_id = %stop_id, ?strategy, "Resolved arrivals");
                return arrivals;
            }
        }

        Arrivals::Unavailable(NoArrivals::NoService {
            available_service_ids: Vec::new(),
        })
    }
}

fn live_arrivals<Tz: TimeZone>(q: &Query<'_, Tz>) -> Step {
    let Some(updates) = q.live.and_then(|live| live.get(q.stop_id)) else {
        tracing::debug!(stop_id = %q.stop_id, "No live updates for stop");
        return Step::Continue;
    };

    let mut upcoming: Vec<_> = updates.iter().filter(|e| e.arrival >= q.now_epoch).collect();
    upcoming.sort_by_key(|e| e.arrival);
    upcoming.truncate(q.count);

    if upcoming.is_empty() {
        tracing::debug!(stop_id = %q.stop_id, "No upcoming live arrivals for stop");
        return Step::Continue;
    }

    let found = upcoming
        .into_iter()
        .filter_map(|entry| {
            let local = q.tz.timestamp_opt(entry.arrival, 0).single()?.naive_local();
            let day_offset = (local.date() - q.now.date()).num_days();
            Some(DisplayArrival {
                source: ArrivalSource::Live,
                route_id: entry.route_id.clone(),
                day_offset,
                seconds_since_midnight: time_codec::seconds_since_midnight(&local),
                day_label: time_codec::day_label(day_offset, local.date()),
                time: time_codec::seconds_to_clock_12h(ClockValue::Epoch(entry.arrival), q.tz),
            })
        })
        .collect();
    Step::Resolved(Arrivals::Found(found))
}

/// The stop's static entries, or the terminal result when there are none to search
fn stop_entries<'a, Tz: TimeZone>(q: &Query<'a, Tz>) -> Result<&'a [StaticScheduleEntry], Arrivals> {
    let Some(timetable) = q.timetable else {
        tracing::warn!("Static schedule not loaded yet");
        return Err(Arrivals::Loading);
    };

    match timetable.get(q.stop_id) {
        None => {
            tracing::info!(stop_id = %q.stop_id, "Stop not found in static schedule");
            Err(Arrivals::Unavailable(NoArrivals::StopNotFound))
        }
        Some(entries) if entries.is_empty() => {
            tracing::info!(stop_id = %q.stop_id, "Stop has an empty static schedule");
            Err(Arrivals::Unavailable(NoArrivals::EmptySchedule))
        }
        Some(entries) => Ok(entries.as_slice()),
    }
}

/// Entries running under `service_id` at or after `cutoff` seconds, sorted by time of day
fn arrivals_on_day<Tz: TimeZone>(
    entries: &[StaticScheduleEntry],
    service_id: &str,
    cutoff: i64,
    day_offset: i64,
    date: NaiveDate,
    tz: &Tz,
) -> Vec<DisplayArrival> {
    let mut day: Vec<(i64, &StaticScheduleEntry)> = entries
        .iter()
        .filter(|e| e.service_id == service_id)
        .map(|e| (time_codec::parse_clock_to_seconds(&e.arrival_time), e))
        .filter(|(seconds, _)| *seconds >= cutoff)
        .collect();
    day.sort_by_key(|(seconds, _)| *seconds);

    day.into_iter()
        .map(|(seconds, entry)| DisplayArrival {
            source: ArrivalSource::Scheduled,
            route_id: entry.route_id.clone(),
            day_offset,
            seconds_since_midnight: seconds,
            day_label: time_codec::day_label(day_offset, date),
            time: time_codec::seconds_to_clock_12h(ClockValue::SinceMidnight(seconds), tz),
        })
        .collect()
}

fn static_today<Tz: TimeZone>(q: &Query<'_, Tz>) -> Step {
    let entries = match stop_entries(q) {
        Ok(entries) => entries,
        Err(terminal) => return Step::Resolved(terminal),
    };

    let service_id = q.config.calendar.active_service_id(&q.now);
    let cutoff = time_codec::seconds_since_midnight(&q.now);
    let mut today = arrivals_on_day(entries, service_id, cutoff, 0, q.now.date(), q.tz);

    if today.is_empty() {
        tracing::debug!(stop_id = %q.stop_id, service_id, "No remaining service today, searching ahead");
        return Step::Continue;
    }

    today.truncate(q.count);
    Step::Resolved(Arrivals::Found(today))
}

fn forward_search<Tz: TimeZone>(q: &Query<'_, Tz>) -> Step {
    let entries = match stop_entries(q) {
        Ok(entries) => entries,
        Err(terminal) => return Step::Resolved(terminal),
    };

    let mut found = Vec::new();
    for offset in 0..=q.config.forward_search_days {
        // Same wall-clock time on each later day
        let Some(day) = q.now.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };
        let service_id = q.config.calendar.active_service_id(&day);
        let cutoff = if offset == 0 {
            time_codec::seconds_since_midnight(&q.now)
        } else {
            0
        };

        let on_day = arrivals_on_day(entries, service_id, cutoff, i64::from(offset), day.date(), q.tz);
        tracing::debug!(offset, service_id, arrivals = on_day.len(), "Forward search day");
        found.extend(on_day);

        // A day is always taken whole before stopping
        if found.len() >= q.count {
            break;
        }
    }

    found.sort_by_key(|a| (a.day_offset, a.seconds_since_midnight));
    found.truncate(q.count);

    if found.is_empty() {
        let available_service_ids: BTreeSet<&str> = entries.iter().map(|e| e.service_id.as_str()).collect();
        tracing::info!(
            stop_id = %q.stop_id,
            days = q.config.forward_search_days,
            available = ?available_service_ids,
            "No service found in forward search"
        );
        return Step::Resolved(Arrivals::Unavailable(NoArrivals::NoService {
            available_service_ids: available_service_ids.into_iter().map(str::to_string).collect(),
        }));
    }

    Step::Resolved(Arrivals::Found(found))
}
