use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::models::{LiveArrival, StaticScheduleEntry, StopId};

/// Per-stop schedule entries, order irrelevant
pub type ScheduleTable<E> = HashMap<StopId, Vec<E>>;
pub type LiveTable = ScheduleTable<LiveArrival>;
pub type StaticTable = ScheduleTable<StaticScheduleEntry>;

/// Entries that learn their stop from the table key they were filed under
pub trait StopKeyed {
    fn set_stop_id(&mut self, stop_id: StopId);
}

impl StopKeyed for LiveArrival {
    fn set_stop_id(&mut self, stop_id: StopId) {
        self.stop_id = stop_id;
    }
}

impl StopKeyed for StaticScheduleEntry {
    fn set_stop_id(&mut self, stop_id: StopId) {
        self.stop_id = stop_id;
    }
}

/// Holds the loaded live and static tables.
///
/// Each table is replaced wholesale, readers clone the `Arc` and never see a
/// partially loaded table. `None` means the table has not loaded yet.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    live: RwLock<Option<Arc<LiveTable>>>,
    timetable: RwLock<Option<Arc<StaticTable>>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_live(&self, table: LiveTable) {
        let stops = table.len();
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(table));
        tracing::debug!(stops, "Live schedule table replaced");
    }

    pub fn replace_static(&self, table: StaticTable) {
        let stops = table.len();
        *self.timetable.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(table));
        tracing::debug!(stops, "Static schedule table replaced");
    }

    pub fn live(&self) -> Option<Arc<LiveTable>> {
        self.live.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn static_table(&self) -> Option<Arc<StaticTable>> {
        self.timetable.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Parse a `{stop_id: [entry, ...]}` JSON table.
///
/// Only a non-object document is an error. Stops whose value is not an array
/// and entries that fail to deserialize are logged and skipped.
pub fn parse_table<E>(json: &str) -> Result<ScheduleTable<E>>
where
    E: DeserializeOwned + StopKeyed,
{
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_str(json).context("Schedule JSON is not an object keyed by stop id")?;

    let mut table = ScheduleTable::with_capacity(raw.len());
    let mut skipped = 0usize;

    for (stop, value) in raw {
        let serde_json::Value::Array(items) = value else {
            tracing::warn!(stop_id = %stop, "Stop schedule is not an array, skipping stop");
            continue;
        };

        let stop_id = StopId::new(stop);
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<E>(item) {
                Ok(mut entry) => {
                    entry.set_stop_id(stop_id.clone());
                    entries.push(entry);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(stop_id = %stop_id, error = %e, "Skipping malformed schedule entry");
                }
            }
        }
        table.insert(stop_id, entries);
    }

    if skipped > 0 {
        tracing::warn!(skipped, "Skipped malformed schedule entries");
    }
    tracing::info!(stops = table.len(), "Parsed schedule table");
    Ok(table)
}

pub fn parse_static_table(json: &str) -> Result<StaticTable> {
    parse_table(json)
}

pub fn parse_live_table(json: &str) -> Result<LiveTable> {
    parse_table(json)
}

/// Read and parse a static timetable file (`stop_schedule.json` layout)
pub async fn load_static_table(path: &Path) -> Result<StaticTable> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read static schedule {}", path.display()))?;
    parse_static_table(&json)
}

/// Group loose entries by their stop id
pub fn group_by_stop<E>(entries: impl IntoIterator<Item = E>, stop_of: impl Fn(&E) -> &StopId) -> ScheduleTable<E> {
    let mut table = ScheduleTable::new();
    for entry in entries {
        table.entry(stop_of(&entry).clone()).or_insert_with(Vec::new).push(entry);
    }
    table
}
