//! Microscopy analysis job queue
//!
//! Durably tracks analysis jobs for captured or uploaded images, admits at
//! most one job at a time to a single compute worker, recovers jobs
//! interrupted by a restart, and keeps observers in sync through full
//! queue snapshots.

pub mod app_state;
pub mod config;
pub mod db;
pub mod messages;
pub mod models;
pub mod queue;
pub mod routes;
pub mod store;
pub mod worker;
