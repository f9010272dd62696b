pub mod config;
pub mod coords;
pub mod dedup;
pub mod errors;
pub mod geocode;
pub mod log;
pub mod normalization;
pub mod record;
pub mod routes;
pub mod sheet;
pub mod workflow;
