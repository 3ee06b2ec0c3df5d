pub mod api;
pub mod calendar;
pub mod config;
pub mod gtfs_realtime;
pub mod interpolate;
pub mod models;
pub mod render;
pub mod resolver;
pub mod schedule;
pub mod time_codec;
pub mod tracking;
